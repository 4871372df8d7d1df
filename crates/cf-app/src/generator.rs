use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use cf_core::{JobForm, JobSpec, RequestDocument, ValidationError};
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::config::{AppConfig, Credentials, PollSettings};
use crate::error::{JobError, StoreError};
use crate::events::GenEvent;
use crate::generator::backend::{DashScopeBackend, VideoService};
use crate::generator::db::HistoryStore;
use crate::generator::db::job::JobRecord;
use crate::job::JobStatus;
use crate::poller::{Poller, PollerHandle};
use crate::projector::{Projection, project};

pub mod backend;
pub mod db;

/// Result of a one-off status query.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub projection: Projection,
    /// The history record after the update, if the job is in history.
    pub record: Option<JobRecord>,
}

/// A history entry with its parameters rebuilt, ready to edit and resubmit.
#[derive(Debug, Clone)]
pub struct LoadedJob {
    pub record: JobRecord,
    pub spec: JobSpec,
}

pub struct Generator {
    service: Arc<dyn VideoService>,
    store: HistoryStore,
    credentials: Credentials,
    settings: PollSettings,
    events: UnboundedSender<GenEvent>,
    pollers: Mutex<HashMap<String, PollerHandle>>,
}

impl Generator {
    pub async fn new(config: &AppConfig, events: UnboundedSender<GenEvent>) -> anyhow::Result<Self> {
        let service = DashScopeBackend::new(&config.service)?;
        let store = HistoryStore::open(&config.history_path).await?;

        Ok(Self::with_parts(
            Arc::new(service),
            store,
            config.credentials.clone(),
            config.polling,
            events,
        ))
    }

    pub fn with_parts(
        service: Arc<dyn VideoService>,
        store: HistoryStore,
        credentials: Credentials,
        settings: PollSettings,
        events: UnboundedSender<GenEvent>,
    ) -> Self {
        Self {
            service,
            store,
            credentials,
            settings,
            events,
            pollers: Mutex::new(HashMap::new()),
        }
    }

    /// Validate, submit, record as pending, and start polling.
    pub async fn submit(&self, form: &JobForm) -> Result<JobRecord, JobError> {
        self.require_credentials()?;

        let request = cf_core::spec::build(form)?;
        let raw_request = request
            .document
            .to_pretty_json()
            .map_err(StoreError::from)?;

        let receipt = self
            .service
            .submit(&self.credentials, request.endpoint, &request.document)
            .await?;
        info!(job_id = %receipt.job_id, model = %request.spec.model(), "Job submitted");

        let record = JobRecord::pending(
            receipt.job_id.clone(),
            &request,
            raw_request,
            receipt.raw_response,
        );
        if let Err(e) = self.store.upsert(&record).await {
            warn!(
                job_id = %record.job_id,
                error = %e,
                "Job accepted remotely but could not be saved to history"
            );
            return Err(e.into());
        }

        self.start_polling(&record.job_id, record.status).await;
        Ok(record)
    }

    /// Query a job once, outside the polling schedule.
    pub async fn check_status(&self, job_id: &str) -> Result<StatusReport, JobError> {
        self.require_credentials()?;

        let snapshot = self.service.fetch_status(&self.credentials, job_id).await?;
        let attempt = match self.store.get(job_id).await {
            Ok(record) => record.map_or(0, |r| r.poll_attempt),
            Err(e) => {
                warn!(job_id, error = %e, "Could not read history");
                0
            }
        };
        let projection = project(job_id, attempt, &snapshot);

        let record = match self.store.apply_update(job_id, &projection.update).await {
            Ok(record) => record,
            Err(e) => {
                warn!(job_id, error = %e, "Could not record status");
                None
            }
        };

        Ok(StatusReport { projection, record })
    }

    /// Stop polling a job. Its stored status is left as last observed.
    pub async fn cancel(&self, job_id: &str) -> bool {
        match self.pollers.lock().await.remove(job_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn list_history(&self) -> Result<Vec<JobRecord>, JobError> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Remove a job from history, cancelling its poller first.
    pub async fn delete(&self, job_id: &str) -> Result<bool, JobError> {
        self.cancel(job_id).await;
        Ok(self.store.delete(job_id).await?)
    }

    /// Write the full history to `path` as JSON. Returns the number of entries.
    pub async fn export_history(&self, path: &Path) -> Result<usize, JobError> {
        let count = self.store.list().await?.len();
        let json = self.store.export().await?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::from)?;
        }
        std::fs::write(path, json).map_err(StoreError::from)?;

        info!("Exported {count} history entries to {}", path.display());
        Ok(count)
    }

    pub async fn load_from_history(&self, job_id: &str) -> Result<LoadedJob, JobError> {
        let record = self.get(job_id).await?;

        let document: RequestDocument =
            serde_json::from_str(&record.raw_request).map_err(StoreError::from)?;
        let spec = JobSpec::from_document(&document)?;

        Ok(LoadedJob { record, spec })
    }

    /// Restart polling for every job history still shows as active.
    pub async fn resume_active(&self) -> Result<Vec<String>, JobError> {
        let active: Vec<JobRecord> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| r.status.is_active())
            .collect();

        if !active.is_empty() {
            self.require_credentials()?;
        }

        let mut resumed = Vec::with_capacity(active.len());
        for record in active {
            if self.start_polling(&record.job_id, record.status).await {
                resumed.push(record.job_id);
            }
        }

        if !resumed.is_empty() {
            info!("Resumed polling for {} job(s)", resumed.len());
        }
        Ok(resumed)
    }

    /// Cancel every poller and wait for them to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<PollerHandle> = self.pollers.lock().await.drain().map(|(_, h)| h).collect();

        for handle in &handles {
            handle.cancel();
        }
        futures::future::join_all(handles.into_iter().map(PollerHandle::join)).await;
    }

    /// Returns false if the job already has a live poller.
    async fn start_polling(&self, job_id: &str, initial_status: JobStatus) -> bool {
        let mut pollers = self.pollers.lock().await;
        pollers.retain(|_, handle| !handle.is_finished());

        if pollers.contains_key(job_id) {
            return false;
        }

        let handle = Poller {
            job_id: job_id.to_string(),
            service: Arc::clone(&self.service),
            credentials: self.credentials.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            settings: self.settings,
            initial_status,
        }
        .spawn();

        pollers.insert(job_id.to_string(), handle);
        true
    }

    fn require_credentials(&self) -> Result<(), ValidationError> {
        if self.credentials.is_empty() {
            return Err(ValidationError::MissingCredentials);
        }
        Ok(())
    }
}
