use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{doc, DateTime, Document};
use mongodb::options::{
    ClientOptions, CreateCollectionOptions, FindOptions, ResolverConfig, TimeseriesGranularity,
    TimeseriesOptions, UpdateOptions,
};
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::models::{StoredViolation, ViolationType};

const VIOLATIONS: &str = "cheating_violations";
const ATTEMPT_STATUS: &str = "attempt_status";

/// Where violations and submission state live.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Stores a violation and returns every violation of the attempt, oldest first.
    async fn record_violation(
        &self,
        attempt_id: &str,
        violation: StoredViolation,
    ) -> Result<Vec<StoredViolation>, AppError>;

    async fn violation_count(&self, attempt_id: &str) -> Result<usize, AppError>;

    async fn is_submitted(&self, attempt_id: &str) -> Result<bool, AppError>;

    async fn mark_submitted(&self, attempt_id: &str) -> Result<(), AppError>;
}

pub struct AppState {
    pub store: Arc<dyn AttemptStore>,
    pub max_warnings: u32,
}

impl AppState {
    pub fn new(store: Arc<dyn AttemptStore>, max_warnings: u32) -> Self {
        Self { store, max_warnings }
    }
}

#[derive(Default)]
struct AttemptRecord {
    violations: Vec<StoredViolation>,
    submitted: bool,
}

/// Keeps everything in process memory. Used when no MongoDB is configured.
#[derive(Default)]
pub struct MemoryStore {
    attempts: RwLock<HashMap<String, AttemptRecord>>,
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn record_violation(
        &self,
        attempt_id: &str,
        violation: StoredViolation,
    ) -> Result<Vec<StoredViolation>, AppError> {
        let mut attempts = self.attempts.write().await;
        let record = attempts.entry(attempt_id.to_string()).or_default();
        record.violations.push(violation);
        Ok(record.violations.clone())
    }

    async fn violation_count(&self, attempt_id: &str) -> Result<usize, AppError> {
        let attempts = self.attempts.read().await;
        Ok(attempts.get(attempt_id).map_or(0, |r| r.violations.len()))
    }

    async fn is_submitted(&self, attempt_id: &str) -> Result<bool, AppError> {
        let attempts = self.attempts.read().await;
        Ok(attempts.get(attempt_id).is_some_and(|r| r.submitted))
    }

    async fn mark_submitted(&self, attempt_id: &str) -> Result<(), AppError> {
        let mut attempts = self.attempts.write().await;
        attempts.entry(attempt_id.to_string()).or_default().submitted = true;
        Ok(())
    }
}

// one document per violation in the time-series collection
#[derive(Debug, Serialize, Deserialize)]
struct ViolationDoc {
    attempt_id: String,
    #[serde(rename = "type")]
    kind: ViolationType,
    description: String,
    metadata: serde_json::Value,
    timestamp_iso: DateTime,
}

impl ViolationDoc {
    fn new(attempt_id: &str, violation: StoredViolation) -> Self {
        Self {
            attempt_id: attempt_id.to_string(),
            kind: violation.kind,
            description: violation.description,
            metadata: violation.metadata,
            timestamp_iso: DateTime::from_millis(violation.recorded_at.timestamp_millis()),
        }
    }

    fn into_violation(self) -> Result<StoredViolation, AppError> {
        let millis = self.timestamp_iso.timestamp_millis();
        let recorded_at = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| AppError::Corrupt(format!("timestamp {millis} out of range")))?;
        Ok(StoredViolation {
            kind: self.kind,
            description: self.description,
            metadata: self.metadata,
            recorded_at,
        })
    }
}

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, AppError> {
        let options = ClientOptions::parse_with_resolver_config(uri, ResolverConfig::cloudflare()).await?;
        let client = Client::with_options(options)?;
        let db = client.database(db_name);

        let ts_options = TimeseriesOptions::builder()
            .time_field("timestamp_iso".to_string()) // must match ViolationDoc
            .meta_field(Some("attempt_id".to_string()))
            .granularity(Some(TimeseriesGranularity::Seconds))
            .build();

        let create_opts = CreateCollectionOptions::builder().timeseries(ts_options).build();

        // fails when the collection already exists, which is fine
        let _ = db.create_collection(VIOLATIONS, create_opts).await;

        tracing::info!("[server] connected to mongodb database {}", db_name);
        Ok(Self { db })
    }

    fn violations(&self) -> Collection<ViolationDoc> {
        self.db.collection(VIOLATIONS)
    }

    fn status(&self) -> Collection<Document> {
        self.db.collection(ATTEMPT_STATUS)
    }
}

#[async_trait]
impl AttemptStore for MongoStore {
    async fn record_violation(
        &self,
        attempt_id: &str,
        violation: StoredViolation,
    ) -> Result<Vec<StoredViolation>, AppError> {
        let collection = self.violations();
        collection
            .insert_one(ViolationDoc::new(attempt_id, violation), None)
            .await?;

        let options = FindOptions::builder().sort(doc! { "timestamp_iso": 1 }).build();
        let mut cursor = collection.find(doc! { "attempt_id": attempt_id }, options).await?;

        let mut violations = Vec::new();
        while cursor.advance().await? {
            violations.push(cursor.deserialize_current()?.into_violation()?);
        }
        Ok(violations)
    }

    async fn violation_count(&self, attempt_id: &str) -> Result<usize, AppError> {
        let count = self
            .violations()
            .count_documents(doc! { "attempt_id": attempt_id }, None)
            .await?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn is_submitted(&self, attempt_id: &str) -> Result<bool, AppError> {
        let found = self
            .status()
            .find_one(doc! { "attempt_id": attempt_id, "submitted": true }, None)
            .await?;
        Ok(found.is_some())
    }

    async fn mark_submitted(&self, attempt_id: &str) -> Result<(), AppError> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.status()
            .update_one(
                doc! { "attempt_id": attempt_id },
                doc! { "$set": { "submitted": true, "submitted_at": DateTime::now() } },
                options,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn violation(kind: ViolationType) -> StoredViolation {
        StoredViolation {
            kind,
            description: "test".to_string(),
            metadata: serde_json::json!({}),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_store_keeps_attempts_apart() {
        let store = MemoryStore::default();
        store.record_violation("a", violation(ViolationType::TabSwitch)).await.unwrap();
        let all = store.record_violation("a", violation(ViolationType::RightClick)).await.unwrap();
        store.record_violation("b", violation(ViolationType::TabClose)).await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(all[1].kind, ViolationType::RightClick);
        assert_eq!(store.violation_count("a").await.unwrap(), 2);
        assert_eq!(store.violation_count("b").await.unwrap(), 1);
        assert_eq!(store.violation_count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn memory_store_tracks_submission() {
        let store = MemoryStore::default();
        assert!(!store.is_submitted("a").await.unwrap());
        store.mark_submitted("a").await.unwrap();
        store.mark_submitted("a").await.unwrap();
        assert!(store.is_submitted("a").await.unwrap());
    }

    #[test]
    fn violation_doc_keeps_millisecond_timestamp() {
        let original = violation(ViolationType::PageRefresh);
        let restored = ViolationDoc::new("a", original.clone()).into_violation().unwrap();
        assert_eq!(
            restored.recorded_at.timestamp_millis(),
            original.recorded_at.timestamp_millis()
        );
        assert_eq!(restored.kind, ViolationType::PageRefresh);
    }
}
