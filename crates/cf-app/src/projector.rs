//! Turns a raw task snapshot into the record update and event it implies.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::error::RemoteFailure;
use crate::events::{GenEvent, Outcome};
use crate::generator::backend::TaskSnapshot;
use crate::generator::db::job::JobRecord;
use crate::job::JobStatus;

/// How long the service keeps a finished video available.
pub const RESULT_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub status: JobStatus,
    pub update: RecordUpdate,
    pub event: GenEvent,
}

/// Fields of a [`JobRecord`] touched by one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub status: JobStatus,
    pub remote_status: String,
    pub video_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub failure: Option<RemoteFailure>,
    pub raw_response: String,
    pub attempt: u32,
    pub observed_at: DateTime<Utc>,
}

impl RecordUpdate {
    /// Returns false, leaving the record untouched, if the record is already terminal.
    pub fn apply_to(&self, record: &mut JobRecord) -> bool {
        if record.status.is_terminal() {
            return false;
        }

        record.status = self.status;
        record.remote_status = Some(self.remote_status.clone());
        record.raw_response = self.raw_response.clone();
        record.updated_at = self.observed_at;
        record.poll_attempt = record.poll_attempt.max(self.attempt);

        if self.video_url.is_some() {
            record.video_url = self.video_url.clone();
            record.expires_at = self.expires_at;
        }
        if let Some(failure) = &self.failure {
            record.error_code = failure.code.clone();
            record.error_message = Some(failure.actionable_message());
        }
        true
    }
}

pub fn project(job_id: &str, attempt: u32, snapshot: &TaskSnapshot) -> Projection {
    project_at(job_id, attempt, snapshot, Utc::now())
}

pub fn project_at(
    job_id: &str,
    attempt: u32,
    snapshot: &TaskSnapshot,
    now: DateTime<Utc>,
) -> Projection {
    let status = JobStatus::from_remote(&snapshot.task_status);

    let mut update = RecordUpdate {
        status,
        remote_status: snapshot.task_status.clone(),
        video_url: None,
        expires_at: None,
        failure: None,
        raw_response: snapshot.raw.clone(),
        attempt,
        observed_at: now,
    };

    let event = match status {
        JobStatus::Succeeded => {
            let video_url = snapshot
                .video_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty());

            let outcome = match video_url {
                Some(url) => {
                    let expires_at = now + Duration::hours(RESULT_RETENTION_HOURS);
                    update.video_url = Some(url.to_string());
                    update.expires_at = Some(expires_at);
                    Outcome::Succeeded {
                        video_url: url.to_string(),
                        expires_at,
                    }
                }
                None => {
                    warn!(job_id, attempt, "Job reported SUCCEEDED without a video URL");
                    Outcome::SucceededWithoutResult
                }
            };

            GenEvent::Terminal {
                job_id: job_id.to_string(),
                outcome,
            }
        }
        JobStatus::Failed => {
            let failure = RemoteFailure::classify(snapshot.code.clone(), snapshot.message.clone());
            update.failure = Some(failure.clone());
            GenEvent::Terminal {
                job_id: job_id.to_string(),
                outcome: Outcome::Failed(failure),
            }
        }
        JobStatus::Pending | JobStatus::Running | JobStatus::Unknown => {
            if status == JobStatus::Unknown {
                warn!(job_id, status = %snapshot.task_status, "Unrecognised job status");
            }
            GenEvent::StatusChanged {
                job_id: job_id.to_string(),
                status,
                remote_status: snapshot.task_status.clone(),
                attempt,
            }
        }
    };

    Projection {
        status,
        update,
        event,
    }
}

#[cfg(test)]
mod tests {
    use cf_core::{JobForm, VideoModel};

    use super::*;
    use crate::error::RemoteErrorKind;

    fn snapshot(status: &str) -> TaskSnapshot {
        TaskSnapshot {
            task_status: status.to_string(),
            raw: format!(r#"{{"output":{{"task_status":"{status}"}}}}"#),
            ..Default::default()
        }
    }

    fn pending_record() -> JobRecord {
        let form = JobForm::new(VideoModel::TextToVideo, "waves");
        let built = cf_core::spec::build(&form).unwrap();
        JobRecord::pending("T1".into(), &built, "{}".into(), "{}".into())
    }

    #[test]
    fn running_is_a_status_change() {
        let projection = project("T1", 2, &snapshot("RUNNING"));
        assert_eq!(projection.status, JobStatus::Running);
        assert_eq!(
            projection.event,
            GenEvent::StatusChanged {
                job_id: "T1".into(),
                status: JobStatus::Running,
                remote_status: "RUNNING".into(),
                attempt: 2,
            }
        );
    }

    #[test]
    fn success_carries_url_and_expiry() {
        let now = Utc::now();
        let mut snap = snapshot("SUCCEEDED");
        snap.video_url = Some("https://cdn.example.com/out.mp4".into());

        let projection = project_at("T1", 5, &snap, now);
        match projection.event {
            GenEvent::Terminal {
                outcome: Outcome::Succeeded { video_url, expires_at },
                ..
            } => {
                assert_eq!(video_url, "https://cdn.example.com/out.mp4");
                assert_eq!(expires_at, now + Duration::hours(24));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn success_without_url_is_still_terminal() {
        let projection = project("T1", 1, &snapshot("SUCCEEDED"));
        assert!(projection.status.is_terminal());
        assert_eq!(
            projection.event,
            GenEvent::Terminal {
                job_id: "T1".into(),
                outcome: Outcome::SucceededWithoutResult,
            }
        );
    }

    #[test]
    fn failure_is_classified() {
        let mut snap = snapshot("FAILED");
        snap.code = Some("InvalidParameter.DataInspection".into());
        snap.message = Some("Download the media resource timed out.".into());

        let projection = project("T1", 3, &snap);
        let failure = projection.update.failure.clone().unwrap();
        assert_eq!(failure.kind, RemoteErrorKind::DataInspectionTimeout);

        let mut record = pending_record();
        assert!(projection.update.apply_to(&mut record));
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(
            record.error_code.as_deref(),
            Some("InvalidParameter.DataInspection")
        );
    }

    #[test]
    fn unknown_status_keeps_job_active() {
        let projection = project("T1", 1, &snapshot("CANCELED"));
        assert_eq!(projection.status, JobStatus::Unknown);
        assert!(!projection.event.is_final());
    }

    #[test]
    fn terminal_record_is_not_regressed() {
        let mut snap = snapshot("SUCCEEDED");
        snap.video_url = Some("https://cdn.example.com/out.mp4".into());

        let mut record = pending_record();
        assert!(project("T1", 4, &snap).update.apply_to(&mut record));

        let late = project("T1", 3, &snapshot("RUNNING"));
        assert!(!late.update.apply_to(&mut record));
        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(
            record.video_url.as_deref(),
            Some("https://cdn.example.com/out.mp4")
        );
        assert_eq!(record.poll_attempt, 4);
    }
}
