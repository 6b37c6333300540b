use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::config::Config;
use crate::core::domain::{ReportKind, Schedule};
use crate::core::errors::SchedulerError;
use crate::core::reports::ReportGenerator;
use crate::core::store::Repository;
use crate::core::time::{ScheduleTime, next_occurrence};
use crate::core::workflow::{Trigger, Workflow};

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// When the weekly and monthly reports fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportTimes {
    /// 0 = Monday.
    pub weekly_day: u32,
    pub weekly_time: ScheduleTime,
    pub monthly_day: u32,
    pub monthly_time: ScheduleTime,
}

impl ReportTimes {
    pub fn from_config(config: &Config) -> Self {
        Self {
            weekly_day: config.weekly_report_day,
            weekly_time: config.weekly_report_time,
            monthly_day: config.monthly_report_day,
            monthly_time: config.monthly_report_time,
        }
    }

    pub fn weekly_cron(&self) -> String {
        let day = WEEKDAYS[(self.weekly_day as usize).min(6)];
        format!(
            "0 {} {} * * {}",
            self.weekly_time.minute(),
            self.weekly_time.hour(),
            day
        )
    }

    pub fn monthly_cron(&self) -> String {
        format!(
            "0 {} {} {} * *",
            self.monthly_time.minute(),
            self.monthly_time.hour(),
            self.monthly_day
        )
    }
}

/// Jobs to add and remove to make the registry match the active schedules.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub add: Vec<ScheduleTime>,
    pub remove: Vec<ScheduleTime>,
}

pub fn plan_reconcile(
    registered: impl IntoIterator<Item = ScheduleTime>,
    active: impl IntoIterator<Item = ScheduleTime>,
) -> ReconcilePlan {
    let registered: BTreeSet<ScheduleTime> = registered.into_iter().collect();
    let active: BTreeSet<ScheduleTime> = active.into_iter().collect();
    ReconcilePlan {
        add: active.difference(&registered).copied().collect(),
        remove: registered.difference(&active).copied().collect(),
    }
}

/// Earliest upcoming fire among `times`.
pub fn next_run(times: &[ScheduleTime], now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    times.iter().map(|t| next_occurrence(*t, now)).min()
}

/// Keeps one cron job per active schedule row, plus the report jobs.
#[derive(Clone)]
pub struct Scheduler {
    jobs: JobScheduler,
    repo: Repository,
    workflow: Workflow,
    reports: Arc<ReportGenerator>,
    timezone: Tz,
    registry: Arc<Mutex<HashMap<ScheduleTime, Uuid>>>,
}

impl Scheduler {
    pub fn new(
        jobs: JobScheduler,
        repo: Repository,
        workflow: Workflow,
        reports: Arc<ReportGenerator>,
        timezone: Tz,
    ) -> Self {
        Self {
            jobs,
            repo,
            workflow,
            reports,
            timezone,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Seeds the default time when no schedule exists yet.
    pub async fn ensure_default(
        &self,
        default_time: ScheduleTime,
    ) -> Result<Option<Schedule>, SchedulerError> {
        if !self.repo.list_schedules().await?.is_empty() {
            return Ok(None);
        }
        let schedule = self.repo.insert_schedule(default_time).await?;
        info!("Created default schedule at {}", default_time);
        Ok(Some(schedule))
    }

    /// Adds jobs for active schedules that lack one and removes jobs whose
    /// schedule is gone or paused.
    pub async fn reconcile(&self) -> Result<ReconcilePlan, SchedulerError> {
        let active = self.repo.active_schedules().await?;
        let mut registry = self.registry.lock().await;
        let plan = plan_reconcile(registry.keys().copied(), active.iter().map(|s| s.time));

        for time in &plan.remove {
            if let Some(job_id) = registry.remove(time)
                && let Err(e) = self.jobs.remove(&job_id).await
            {
                warn!("Failed to unschedule {} ({}): {}", time, job_id, e);
            }
        }

        for time in &plan.add {
            let job = self.content_job(*time)?;
            let job_id = self.jobs.add(job).await?;
            registry.insert(*time, job_id);
        }

        if !plan.add.is_empty() || !plan.remove.is_empty() {
            info!(
                "Scheduler reconciled: +{} -{} ({} active)",
                plan.add.len(),
                plan.remove.len(),
                registry.len()
            );
        }
        Ok(plan)
    }

    fn content_job(&self, time: ScheduleTime) -> Result<Job, SchedulerError> {
        let repo = self.repo.clone();
        let workflow = self.workflow.clone();
        let job = Job::new_async_tz(
            time.cron_expression().as_str(),
            self.timezone,
            move |_uuid, mut _l| {
                let repo = repo.clone();
                let workflow = workflow.clone();
                Box::pin(async move {
                    // Rows can be replaced under the same time; resolve at fire time.
                    let schedule_id = match repo.find_schedule(time).await {
                        Ok(found) => found.map(|s| s.id),
                        Err(e) => {
                            warn!("Schedule lookup for {} failed: {}", time, e);
                            None
                        }
                    };
                    info!("Scheduled run at {} firing", time);
                    workflow.spawn(Trigger::Scheduled { schedule_id });
                })
            },
        )?;
        Ok(job)
    }

    pub async fn schedule_reports(&self, times: ReportTimes) -> Result<(), SchedulerError> {
        for (kind, cron) in [
            (ReportKind::Weekly, times.weekly_cron()),
            (ReportKind::Monthly, times.monthly_cron()),
        ] {
            let reports = self.reports.clone();
            let job = Job::new_async_tz(cron.as_str(), self.timezone, move |_uuid, mut _l| {
                let reports = reports.clone();
                Box::pin(async move {
                    if reports.run(kind).await.is_none() {
                        error!("{} report cycle skipped", kind);
                    }
                })
            })?;
            self.jobs.add(job).await?;
            info!("Scheduled {} report ({})", kind, cron);
        }
        Ok(())
    }

    pub async fn registered_times(&self) -> Vec<ScheduleTime> {
        let mut times: Vec<ScheduleTime> = self.registry.lock().await.keys().copied().collect();
        times.sort();
        times
    }

    /// Next fire of any active schedule, in the configured timezone.
    pub async fn next_run(&self) -> Result<Option<DateTime<Tz>>, SchedulerError> {
        let times: Vec<ScheduleTime> = self
            .repo
            .active_schedules()
            .await?
            .into_iter()
            .map(|s| s.time)
            .collect();
        Ok(next_run(&times, Utc::now().with_timezone(&self.timezone)))
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }
}
