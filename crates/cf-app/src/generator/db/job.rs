use cf_core::{BuiltRequest, VideoModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// One row of submission history, keyed by the remote job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub model: VideoModel,
    pub prompt: String,
    pub status: JobStatus,
    #[serde(default)]
    pub remote_status: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Request document exactly as sent.
    pub raw_request: String,
    /// Most recent response body.
    pub raw_response: String,
    #[serde(default)]
    pub poll_attempt: u32,
}

impl JobRecord {
    pub fn pending(
        job_id: String,
        request: &BuiltRequest,
        raw_request: String,
        raw_response: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            model: request.spec.model(),
            prompt: request.spec.prompt().to_string(),
            status: JobStatus::Pending,
            remote_status: None,
            video_url: None,
            expires_at: None,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            raw_request,
            raw_response,
            poll_attempt: 0,
        }
    }
}
