pub mod job;

use std::path::Path;

use serde_json::Value;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem, SurrealKv};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::generator::db::job::JobRecord;
use crate::projector::RecordUpdate;

const HISTORY: &str = "history";

/// Durable job history.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    db: Surreal<Db>,
}

impl HistoryStore {
    /// Open (or create) the embedded file-backed store.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        info!("Opening history store at {}", path.display());

        std::fs::create_dir_all(path)?;

        let db = Surreal::new::<SurrealKv>(path.to_path_buf()).await?;
        Self::init(db).await
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        let db = Surreal::new::<Mem>(()).await?;
        Self::init(db).await
    }

    async fn init(db: Surreal<Db>) -> Result<Self, StoreError> {
        db.use_ns("clipforge").use_db("history").await?;
        Ok(Self { db })
    }

    /// Insert or replace the record for `record.job_id`.
    pub async fn upsert(&self, record: &JobRecord) -> Result<(), StoreError> {
        let _: Option<JobRecord> = self
            .db
            .upsert((HISTORY, record.job_id.clone()))
            .content(record.clone())
            .await?;

        debug!(job_id = %record.job_id, status = %record.status, "Record stored");
        Ok(())
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let record: Option<JobRecord> = self.db.select((HISTORY, job_id.to_string())).await?;
        Ok(record)
    }

    /// All records, newest submission first.
    pub async fn list(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut records: Vec<JobRecord> = self.db.select(HISTORY).await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Returns whether a record was removed.
    pub async fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        let removed: Option<JobRecord> = self.db.delete((HISTORY, job_id.to_string())).await?;
        Ok(removed.is_some())
    }

    /// Apply a status observation. Returns the stored record, or `None` if the
    /// job is no longer in history. Terminal records are never regressed.
    pub async fn apply_update(
        &self,
        job_id: &str,
        update: &RecordUpdate,
    ) -> Result<Option<JobRecord>, StoreError> {
        let Some(mut record) = self.get(job_id).await? else {
            debug!("{job_id} left history; dropping update");
            return Ok(None);
        };

        if update.apply_to(&mut record) {
            self.upsert(&record).await?;
        } else {
            debug!(
                "Ignoring {} for {job_id}: already {}",
                update.status, record.status
            );
        }

        Ok(Some(record))
    }

    /// Full history as a pretty-printed JSON array. Stored request and response
    /// bodies are embedded as JSON rather than as strings.
    pub async fn export(&self) -> Result<String, StoreError> {
        let records = self.list().await?;

        let entries = records
            .into_iter()
            .map(export_entry)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(serde_json::to_string_pretty(&entries)?)
    }
}

fn export_entry(record: JobRecord) -> Result<Value, serde_json::Error> {
    let request = embed(&record.raw_request);
    let response = embed(&record.raw_response);

    let mut entry = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut entry {
        map.remove("raw_request");
        map.remove("raw_response");
        map.insert("request".into(), request);
        map.insert("response".into(), response);
    }
    Ok(entry)
}

fn embed(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use cf_core::{JobForm, VideoModel};

    use super::*;
    use crate::job::JobStatus;

    fn record(job_id: &str, minutes_ago: i64) -> JobRecord {
        let form = JobForm::new(VideoModel::TextToVideo, format!("prompt for {job_id}"));
        let built = cf_core::spec::build(&form).unwrap();
        let raw_request = built.document.to_pretty_json().unwrap();
        let mut record = JobRecord::pending(
            job_id.to_string(),
            &built,
            raw_request,
            format!(r#"{{"output":{{"task_id":"{job_id}"}}}}"#),
        );
        record.created_at = Utc::now() - Duration::minutes(minutes_ago);
        record
    }

    #[tokio::test]
    async fn upsert_replaces_existing_record() {
        let store = HistoryStore::in_memory().await.unwrap();

        let mut rec = record("T1", 0);
        store.upsert(&rec).await.unwrap();
        rec.status = JobStatus::Running;
        store.upsert(&rec).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, JobStatus::Running);
        assert_eq!(all[0].model, VideoModel::TextToVideo);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = HistoryStore::in_memory().await.unwrap();
        store.upsert(&record("old", 30)).await.unwrap();
        store.upsert(&record("new", 1)).await.unwrap();
        store.upsert(&record("mid", 10)).await.unwrap();

        let ids: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.job_id)
            .collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let store = HistoryStore::in_memory().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_removed() {
        let store = HistoryStore::in_memory().await.unwrap();
        store.upsert(&record("T1", 0)).await.unwrap();

        assert!(store.delete("T1").await.unwrap());
        assert!(!store.delete("T1").await.unwrap());
        assert!(store.get("T1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn export_embeds_documents() {
        let store = HistoryStore::in_memory().await.unwrap();
        store.upsert(&record("T1", 0)).await.unwrap();

        let exported: Value = serde_json::from_str(&store.export().await.unwrap()).unwrap();
        let entry = &exported[0];
        assert_eq!(entry["job_id"], "T1");
        assert_eq!(entry["request"]["model"], "wanx2.1-t2v-turbo");
        assert_eq!(entry["response"]["output"]["task_id"], "T1");
        assert!(entry.get("raw_request").is_none());
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(&dir.path().join("history")).await.unwrap();
        store.upsert(&record("T1", 0)).await.unwrap();

        let loaded = store.get("T1").await.unwrap().unwrap();
        assert_eq!(loaded.prompt, "prompt for T1");
    }
}
