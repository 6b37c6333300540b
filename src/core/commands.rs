use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::core::domain::{ExecutionStatus, ScheduleStatus};
use crate::core::errors::{PersistenceError, SchedulerError};
use crate::core::scheduler::Scheduler;
use crate::core::time::{ScheduleTime, humanize_duration, next_occurrence};
use crate::core::workflow::{SpawnOutcome, Trigger};

pub const SLASH_COMMAND: &str = "/daily-bot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Time(ScheduleTime),
    Add(ScheduleTime),
    Remove(ScheduleTime),
    List,
    Pause,
    Resume,
    Now,
    Request(String),
    /// Recognised command with a bad argument; carries the reply.
    Invalid(String),
    Unknown(String),
}

fn time_arg(command: &str, args: &str, example: &str) -> Result<ScheduleTime, String> {
    if args.is_empty() {
        return Err(format!(
            "Please give a time.\nUsage: `{} {} {}`",
            SLASH_COMMAND, command, example
        ));
    }
    args.parse().map_err(|_| {
        format!(
            "Invalid time `{}`. Use 24-hour HH:MM, e.g. `{}`.",
            args, example
        )
    })
}

fn strip_quotes(raw: &str) -> &str {
    for (open, close) in [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')] {
        if let Some(inner) = raw
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
            && !inner.trim().is_empty()
        {
            return inner.trim();
        }
    }
    raw
}

impl Command {
    /// Parses the text after the slash command. Empty text is `help`.
    pub fn parse(text: &str) -> Command {
        let text = text.trim();
        if text.is_empty() {
            return Command::Help;
        }
        let (word, args) = match text.split_once(char::is_whitespace) {
            Some((word, args)) => (word, args.trim()),
            None => (text, ""),
        };
        let word = word.to_lowercase();

        let timed = |make: fn(ScheduleTime) -> Command, example: &str| {
            time_arg(&word, args, example).map_or_else(Command::Invalid, make)
        };

        match word.as_str() {
            "help" => Command::Help,
            "status" => Command::Status,
            "list" => Command::List,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "now" => Command::Now,
            "time" => timed(Command::Time, "07:00"),
            "add" => timed(Command::Add, "19:00"),
            "remove" => timed(Command::Remove, "19:00"),
            "request" => {
                let topic = strip_quotes(args);
                if topic.is_empty() {
                    Command::Invalid(format!(
                        "Please give a topic.\nUsage: `{} request \"TCP 3-way handshake\"`",
                        SLASH_COMMAND
                    ))
                } else {
                    Command::Request(topic.to_string())
                }
            }
            _ => Command::Unknown(word.clone()),
        }
    }
}

pub fn help_text() -> String {
    format!(
        "📖 *Daily-Bot commands*\n\n\
         *Schedules:*\n\
         • `{c} time <HH:MM>` - move the main schedule\n\
         • `{c} add <HH:MM>` - add a schedule\n\
         • `{c} remove <HH:MM>` - remove a schedule\n\
         • `{c} list` - list schedules\n\n\
         *Runs:*\n\
         • `{c} pause` - pause scheduled runs\n\
         • `{c} resume` - resume scheduled runs\n\
         • `{c} now` - run immediately\n\n\
         *Other:*\n\
         • `{c} request \"<topic>\"` - request a topic for the next run\n\
         • `{c} status` - show the current status\n\
         • `{c} help` - this help\n\n\
         💡 Times are 24-hour HH:MM.",
        c = SLASH_COMMAND
    )
}

/// Maps slash commands onto the scheduler, repository and workflow.
#[derive(Clone)]
pub struct CommandHandler {
    scheduler: Scheduler,
    started_at: DateTime<Utc>,
}

impl CommandHandler {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            started_at: Utc::now(),
        }
    }

    /// Handles one invocation and renders the reply. Never fails.
    pub async fn handle(&self, text: &str, user_id: &str) -> String {
        let command = Command::parse(text);
        info!("Command from {}: {:?}", user_id, command);
        match self.dispatch(command, user_id).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Command '{}' failed: {}", text.trim(), e);
                format!("❌ Command failed: {}", e)
            }
        }
    }

    async fn dispatch(&self, command: Command, user_id: &str) -> Result<String, SchedulerError> {
        let repo = self.scheduler.repository();
        let reply = match command {
            Command::Help => help_text(),
            Command::Invalid(message) => format!("❌ {}", message),
            Command::Unknown(word) => format!(
                "❌ Unknown command `{}`.\nSee `{} help` for the available commands.",
                word, SLASH_COMMAND
            ),
            Command::Time(time) => {
                let active = repo.active_schedules().await?;
                let reply = match active.first() {
                    Some(current) if current.time == time => {
                        format!("ℹ️ The schedule is already at `{}`.", time)
                    }
                    Some(current) => match repo.update_schedule_time(current.id, time).await {
                        Ok(()) => format!("✅ Schedule moved: `{}` → `{}`", current.time, time),
                        Err(PersistenceError::DuplicateSchedule(_)) => {
                            return Ok(format!("❌ A schedule at `{}` already exists.", time));
                        }
                        Err(e) => return Err(e.into()),
                    },
                    None => match repo.insert_schedule(time).await {
                        Ok(_) => format!("✅ New schedule created: `{}`", time),
                        Err(PersistenceError::DuplicateSchedule(_)) => {
                            return Ok(format!(
                                "❌ A paused schedule at `{}` already exists. Use `{} resume`.",
                                time, SLASH_COMMAND
                            ));
                        }
                        Err(e) => return Err(e.into()),
                    },
                };
                self.scheduler.reconcile().await?;
                reply
            }
            Command::Add(time) => match repo.insert_schedule(time).await {
                Ok(_) => {
                    self.scheduler.reconcile().await?;
                    format!("✅ Schedule added: `{}`", time)
                }
                Err(PersistenceError::DuplicateSchedule(_)) => {
                    format!("❌ A schedule at `{}` already exists.", time)
                }
                Err(e) => return Err(e.into()),
            },
            Command::Remove(time) => {
                if repo.delete_schedule(time).await? {
                    self.scheduler.reconcile().await?;
                    format!("✅ Schedule removed: `{}`", time)
                } else {
                    format!("❌ No schedule at `{}`.", time)
                }
            }
            Command::List => self.render_list().await?,
            Command::Pause => {
                if repo.active_schedules().await?.is_empty() {
                    "ℹ️ Scheduled runs are already paused.".to_string()
                } else {
                    repo.set_all_schedule_status(ScheduleStatus::Paused).await?;
                    self.scheduler.reconcile().await?;
                    format!(
                        "⏸️ Scheduled runs paused. Use `{} resume` to continue.",
                        SLASH_COMMAND
                    )
                }
            }
            Command::Resume => {
                if repo.set_all_schedule_status(ScheduleStatus::Active).await? == 0 {
                    "ℹ️ Scheduled runs are already active.".to_string()
                } else {
                    self.scheduler.reconcile().await?;
                    "▶️ Scheduled runs resumed.".to_string()
                }
            }
            Command::Now => match self.scheduler.workflow().spawn(Trigger::Manual) {
                SpawnOutcome::Started => {
                    "🚀 Generating content now. The result will be posted shortly.".to_string()
                }
                SpawnOutcome::AlreadyRunning => {
                    "⏳ A run is already in progress. Its result will be posted shortly."
                        .to_string()
                }
            },
            Command::Request(topic) => {
                repo.insert_request(&topic, user_id).await?;
                match self.scheduler.workflow().spawn(Trigger::Manual) {
                    SpawnOutcome::Started => format!(
                        "📝 Requested `{}`. The result will be posted shortly.",
                        topic
                    ),
                    SpawnOutcome::AlreadyRunning => format!(
                        "📝 Queued `{}`. A run is in progress, so it will be used for the next one.",
                        topic
                    ),
                }
            }
            Command::Status => self.render_status().await?,
        };
        Ok(reply)
    }

    async fn render_list(&self) -> Result<String, SchedulerError> {
        let schedules = self.scheduler.repository().list_schedules().await?;
        if schedules.is_empty() {
            return Ok("📋 No schedules registered.".to_string());
        }
        let now = Utc::now().with_timezone(&self.scheduler.timezone());
        let mut lines = vec!["📋 *Schedules*".to_string()];
        for schedule in schedules {
            let line = match schedule.status {
                ScheduleStatus::Active => format!(
                    "• `{}` ▶️ active (next {})",
                    schedule.time,
                    next_occurrence(schedule.time, now).format("%m-%d %H:%M")
                ),
                ScheduleStatus::Paused => format!("• `{}` ⏸️ paused", schedule.time),
            };
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    async fn render_status(&self) -> Result<String, SchedulerError> {
        let repo = self.scheduler.repository();
        let tz = self.scheduler.timezone();
        let schedules = repo.list_schedules().await?;
        let active: Vec<String> = schedules
            .iter()
            .filter(|s| s.status == ScheduleStatus::Active)
            .map(|s| format!("`{}`", s.time))
            .collect();
        let paused = !schedules.is_empty() && active.is_empty();

        let mut lines = vec!["📊 *Daily-Bot status*".to_string()];
        lines.push(format!(
            "• State: {}",
            if paused { "⏸️ paused" } else { "▶️ running" }
        ));
        let workflow = self.scheduler.workflow();
        if workflow.is_running() {
            lines.push(format!("• Current run: {}", workflow.state()));
        }
        lines.push(format!(
            "• Active schedules: {}",
            if active.is_empty() {
                "none".to_string()
            } else {
                active.join(", ")
            }
        ));
        let next = match self.scheduler.next_run().await? {
            Some(at) => format!(
                "{} (in {})",
                at.format("%Y-%m-%d %H:%M %Z"),
                humanize_duration(at.with_timezone(&Utc) - Utc::now())
            ),
            None => "-".to_string(),
        };
        lines.push(format!("• Next run: {}", next));
        lines.push(format!("• Total generated: {}", repo.count_content(None).await?));
        let pending = repo.pending_request_count().await?;
        if pending > 0 {
            lines.push(format!("• Pending requests: {}", pending));
        }

        match repo.recent_executions(1).await?.into_iter().next() {
            Some(last) => {
                let status = match last.status {
                    ExecutionStatus::Success => "✅ success",
                    ExecutionStatus::Failed => "❌ failed",
                    ExecutionStatus::Pending => "⏳ in progress",
                };
                lines.push(format!(
                    "• Last run: {} {} (attempts: {})",
                    last.started_at.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
                    status,
                    last.attempt_count
                ));
                if last.status == ExecutionStatus::Failed
                    && let Some(err) = last.error_message
                {
                    lines.push(format!("• Last error: {}", err));
                }
            }
            None => lines.push("• Last run: -".to_string()),
        }
        lines.push(format!(
            "• Uptime: {}",
            humanize_duration(Utc::now() - self.started_at)
        ));
        Ok(lines.join("\n"))
    }
}
