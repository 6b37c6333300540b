use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::JobScheduler;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    Listen,
    Ready,
    Shutdown,
}

#[async_trait::async_trait]
pub trait LifecycleComponent {
    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Drives attached components through init, start and shutdown, and owns
/// the cron runner the schedule jobs are registered on.
pub struct LifecycleManager {
    state: LifecycleState,
    components: Vec<Arc<Mutex<dyn LifecycleComponent + Send + Sync>>>,
    pub scheduler: JobScheduler,
}

impl LifecycleManager {
    pub fn new(scheduler: JobScheduler) -> Self {
        Self {
            state: LifecycleState::Init,
            components: Vec::new(),
            scheduler,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn attach(&mut self, component: Arc<Mutex<dyn LifecycleComponent + Send + Sync>>) {
        self.components.push(component);
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Lifecycle Phase: Init");
        self.state = LifecycleState::Init;
        for comp in &self.components {
            comp.lock().await.on_init().await?;
        }

        info!("Lifecycle Phase: Listen");
        self.state = LifecycleState::Listen;
        for comp in &self.components {
            comp.lock().await.on_start().await?;
        }

        info!("Lifecycle Phase: Ready (Starting Scheduler)");
        self.scheduler.start().await?;
        self.state = LifecycleState::Ready;

        Ok(())
    }

    /// Stops the cron runner first so no new run fires, then the components.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Lifecycle Phase: Shutdown");
        self.state = LifecycleState::Shutdown;

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Scheduler shutdown error: {}", e);
        }
        for comp in &self.components {
            if let Err(e) = comp.lock().await.on_shutdown().await {
                warn!("Component shutdown error: {}", e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Arc<std::sync::Mutex<Vec<&'static str>>>,
        fail_start: bool,
    }

    #[async_trait::async_trait]
    impl LifecycleComponent for Recorder {
        async fn on_init(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("init");
            Ok(())
        }
        async fn on_start(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("start");
            if self.fail_start {
                anyhow::bail!("port in use");
            }
            Ok(())
        }
        async fn on_shutdown(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("shutdown");
            Ok(())
        }
    }

    #[tokio::test]
    async fn components_see_every_phase_in_order() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = LifecycleManager::new(JobScheduler::new().await.unwrap());
        manager.attach(Arc::new(Mutex::new(Recorder {
            calls: calls.clone(),
            fail_start: false,
        })));

        manager.start().await.unwrap();
        assert_eq!(manager.state(), LifecycleState::Ready);
        manager.shutdown().await.unwrap();
        assert_eq!(manager.state(), LifecycleState::Shutdown);
        assert_eq!(*calls.lock().unwrap(), vec!["init", "start", "shutdown"]);
    }

    #[tokio::test]
    async fn failed_start_stops_before_ready() {
        let mut manager = LifecycleManager::new(JobScheduler::new().await.unwrap());
        manager.attach(Arc::new(Mutex::new(Recorder {
            fail_start: true,
            ..Default::default()
        })));

        let err = manager.start().await.unwrap_err();
        assert!(err.to_string().contains("port in use"));
        assert_eq!(manager.state(), LifecycleState::Listen);
    }
}
