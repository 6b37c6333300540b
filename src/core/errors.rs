use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while turning a topic into generated content.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator command `{0}` is not installed or not on PATH")]
    NotInstalled(String),
    #[error("generator timed out after {0}s")]
    Timeout(u64),
    #[error("generator exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("malformed generator output: {0}")]
    Malformed(String),
    #[error("topic catalog is empty")]
    NoTopics,
    #[error("generator I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("content titled \"{0}\" already exists")]
    DuplicateTitle(String),
    #[error("a schedule at {0} already exists")]
    DuplicateSchedule(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("stored value is invalid: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{adapter} rejected the credentials: {detail}")]
    Unauthorized {
        adapter: &'static str,
        detail: String,
    },
    #[error("{adapter} rate limited the request")]
    RateLimited {
        adapter: &'static str,
        retry_after_secs: Option<u64>,
    },
    #[error("{adapter} API error: {detail}")]
    Api {
        adapter: &'static str,
        detail: String,
    },
    #[error("{adapter} request failed: {source}")]
    Transport {
        adapter: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting {0} is missing")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job scheduler error: {0}")]
    Job(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Error surfaced by a single workflow attempt.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("run cancelled by shutdown")]
    Cancelled,
}

impl WorkflowError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Generation(GenerationError::NoTopics) => false,
            WorkflowError::Generation(_) => true,
            WorkflowError::Persistence(PersistenceError::DuplicateTitle(_)) => false,
            WorkflowError::Persistence(PersistenceError::Corrupt(_)) => false,
            WorkflowError::Persistence(_) => true,
            WorkflowError::Publish(PublishError::NotConfigured(_)) => false,
            WorkflowError::Publish(_) => true,
            WorkflowError::Cancelled => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Generation(_) => "generation",
            WorkflowError::Persistence(_) => "persistence",
            WorkflowError::Publish(_) => "publish",
            WorkflowError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_title_is_terminal() {
        let err = WorkflowError::from(PersistenceError::DuplicateTitle("TCP".into()));
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "persistence");
    }

    #[test]
    fn generation_and_transient_publish_errors_retry() {
        assert!(WorkflowError::from(GenerationError::Timeout(180)).is_retryable());
        assert!(
            WorkflowError::from(PublishError::RateLimited {
                adapter: "slack",
                retry_after_secs: Some(30)
            })
            .is_retryable()
        );
        assert!(!WorkflowError::from(PublishError::NotConfigured("notion")).is_retryable());
    }
}
