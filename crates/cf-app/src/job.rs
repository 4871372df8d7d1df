use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Any status string the service reports that we do not recognise.
    Unknown,
}

impl JobStatus {
    /// Map a remote `task_status` string. Unrecognised values are non-terminal.
    pub fn from_remote(raw: &str) -> Self {
        match raw.trim() {
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Pending => "⏳",
            Self::Running => "⚡",
            Self::Succeeded => "✅",
            Self::Failed => "❌",
            Self::Unknown => "❔",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_statuses() {
        assert_eq!(JobStatus::from_remote("PENDING"), JobStatus::Pending);
        assert_eq!(JobStatus::from_remote("RUNNING"), JobStatus::Running);
        assert_eq!(JobStatus::from_remote("SUCCEEDED"), JobStatus::Succeeded);
        assert_eq!(JobStatus::from_remote("FAILED"), JobStatus::Failed);
        assert_eq!(JobStatus::from_remote("CANCELED"), JobStatus::Unknown);
        assert_eq!(JobStatus::from_remote(""), JobStatus::Unknown);
    }

    #[test]
    fn unknown_is_not_terminal() {
        assert!(JobStatus::Unknown.is_active());
        assert!(!JobStatus::Unknown.is_terminal());
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Running.is_active());
    }
}
