use chrono::{DateTime, Utc};

use crate::error::RemoteFailure;
use crate::job::JobStatus;

/// Notifications produced by pollers and consumed by the foreground loop.
#[derive(Debug, Clone, PartialEq)]
pub enum GenEvent {
    StatusChanged {
        job_id: String,
        status: JobStatus,
        /// Status string as the service reported it.
        remote_status: String,
        attempt: u32,
    },
    Terminal {
        job_id: String,
        outcome: Outcome,
    },
    /// A single query failed. Polling continues.
    PollFailed {
        job_id: String,
        attempt: u32,
        error: String,
    },
    /// Polling ended before the job reached a terminal state.
    PollingStopped {
        job_id: String,
        reason: StopReason,
        last_status: JobStatus,
    },
}

impl GenEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::StatusChanged { job_id, .. }
            | Self::Terminal { job_id, .. }
            | Self::PollFailed { job_id, .. }
            | Self::PollingStopped { job_id, .. } => job_id,
        }
    }

    /// True once no further events will follow for this job.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Terminal { .. } | Self::PollingStopped { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded {
        video_url: String,
        /// The service keeps results for a limited time only.
        expires_at: DateTime<Utc>,
    },
    /// Reported as succeeded but carried no video URL.
    SucceededWithoutResult,
    Failed(RemoteFailure),
}

impl Outcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Succeeded { .. } | Self::SucceededWithoutResult => JobStatus::Succeeded,
            Self::Failed(_) => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    Exhausted,
}
