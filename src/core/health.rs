use std::fmt;

/// Outcome of probing one external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    /// Reachable in principle but the probe failed.
    Degraded(String),
    /// Not configured; not an error.
    Skipped(String),
}

impl HealthStatus {
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Degraded(_) => "FAILED",
            HealthStatus::Skipped(_) => "SKIPPED",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, HealthStatus::Degraded(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Ok => f.write_str("OK"),
            HealthStatus::Degraded(reason) => write!(f, "FAILED ({})", reason),
            HealthStatus::Skipped(reason) => write!(f, "SKIPPED ({})", reason),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub entries: Vec<(String, HealthStatus)>,
}

impl HealthReport {
    pub fn push(&mut self, component: impl Into<String>, status: HealthStatus) {
        self.entries.push((component.into(), status));
    }

    pub fn any_failed(&self) -> bool {
        self.entries.iter().any(|(_, status)| status.is_failed())
    }

    pub fn lines(&self) -> Vec<String> {
        let width = self
            .entries
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0);
        self.entries
            .iter()
            .map(|(name, status)| format!("  {:<width$}  {}", name, status, width = width))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_is_not_a_failure() {
        let mut report = HealthReport::default();
        report.push("slack", HealthStatus::Ok);
        report.push("notion", HealthStatus::Skipped("not configured".into()));
        assert!(!report.any_failed());

        report.push("generator", HealthStatus::Degraded("not installed".into()));
        assert!(report.any_failed());
        let lines = report.lines();
        assert_eq!(lines[1], "  notion     SKIPPED (not configured)");
        assert_eq!(lines[2], "  generator  FAILED (not installed)");
    }
}
