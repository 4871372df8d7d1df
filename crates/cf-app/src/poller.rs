//! Per-job status polling.
//!
//! Each job gets one sequential task. A status write completes before the next
//! query is issued, so observations reach the store and the event channel in
//! the order they were made.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Credentials, PollSettings};
use crate::events::{GenEvent, StopReason};
use crate::generator::backend::VideoService;
use crate::generator::db::HistoryStore;
use crate::job::JobStatus;
use crate::projector::project;

pub struct PollerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Poller task ended abnormally");
        }
    }
}

pub struct Poller {
    pub job_id: String,
    pub service: Arc<dyn VideoService>,
    pub credentials: Credentials,
    pub store: HistoryStore,
    pub events: UnboundedSender<GenEvent>,
    pub settings: PollSettings,
    /// Status known when polling starts.
    pub initial_status: JobStatus,
}

impl Poller {
    pub fn spawn(self) -> PollerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        PollerHandle { cancel, task }
    }

    async fn run(self, cancel: CancellationToken) {
        let job_id = self.job_id.as_str();
        let mut last_status = self.initial_status;
        let mut attempt = 0;

        info!(
            job_id,
            interval_secs = self.settings.interval.as_secs_f64(),
            max_attempts = self.settings.max_attempts,
            "Polling started"
        );

        while attempt < self.settings.max_attempts {
            if cancel.is_cancelled() {
                return self.stop(StopReason::Cancelled, last_status);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.stop(StopReason::Cancelled, last_status),
                _ = tokio::time::sleep(self.settings.interval) => {}
            }

            if cancel.is_cancelled() {
                return self.stop(StopReason::Cancelled, last_status);
            }

            // An in-flight query is never interrupted; cancellation is seen at the next check.
            attempt += 1;
            let snapshot = match self.service.fetch_status(&self.credentials, job_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(job_id, attempt, error = %e, "Status query failed");
                    self.emit(GenEvent::PollFailed {
                        job_id: job_id.to_string(),
                        attempt,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let projection = project(job_id, attempt, &snapshot);
            debug!(job_id, attempt, status = %projection.status, "Status observed");

            match self.store.apply_update(job_id, &projection.update).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    info!(job_id, "Job no longer in history");
                    return self.stop(StopReason::Cancelled, last_status);
                }
                Err(e) => warn!(job_id, attempt, error = %e, "Could not record status"),
            }

            last_status = projection.status;
            self.emit(projection.event);

            if last_status.is_terminal() {
                info!(job_id, attempt, status = %last_status, "Job finished");
                return;
            }
        }

        self.stop(StopReason::Exhausted, last_status);
    }

    fn stop(&self, reason: StopReason, last_status: JobStatus) {
        let job_id = self.job_id.as_str();
        match reason {
            StopReason::Cancelled => info!(job_id, status = %last_status, "Polling cancelled"),
            StopReason::Exhausted => warn!(
                job_id,
                max_attempts = self.settings.max_attempts,
                status = %last_status,
                "Max attempts reached; job still unfinished"
            ),
        }
        self.emit(GenEvent::PollingStopped {
            job_id: self.job_id.clone(),
            reason,
            last_status,
        });
    }

    fn emit(&self, event: GenEvent) {
        if self.events.send(event).is_err() {
            debug!(job_id = %self.job_id, "No listener for poller events");
        }
    }
}
