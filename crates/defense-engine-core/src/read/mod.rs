// File: src/read/mod.rs
//
// Typed read-model storage: upserts keyed by (type, id), criteria queries
// with filter/sort/pagination, TTL expiry, and equality indexes

pub mod criteria;
pub mod memory;
pub mod registry;

pub use criteria::{lookup_field, FilterOp, FilterPredicate, QueryCriteria, SortDirection};
pub use memory::InMemoryReadStore;
pub use registry::ReadModelRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};

/// One stored read model.
///
/// `version` is the highest contributing event version per aggregate (the
/// projection checkpoint); `expires_at` makes the record invisible once
/// passed, with lazy reclamation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadModelRecord {
    pub id: String,
    pub model_type: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub body: serde_json::Value,
}

impl ReadModelRecord {
    pub fn new(
        model_type: impl Into<String>,
        id: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            model_type: model_type.into(),
            version: 0,
            updated_at: Utc::now(),
            expires_at: None,
            body,
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::zero());
        self.expires_at = Some(Utc::now() + ttl);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }

    /// Decode the body into its typed form.
    pub fn decode<T: DeserializeOwned>(&self) -> EngineResult<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| EngineError::Serialization {
            message: format!(
                "failed to decode read model {}/{}: {}",
                self.model_type, self.id, e
            ),
        })
    }
}

/// CRUD plus criteria queries over typed read models.
///
/// Read models are disposable: every one of them can be rebuilt from the
/// event log, so implementations optimize for query shape, not durability.
#[async_trait]
pub trait ReadStore: Send + Sync {
    /// Lifecycle hook; durable implementations open pools or verify schema.
    async fn start(&self, ctx: &RequestContext) -> EngineResult<()> {
        ctx.ensure_active()
    }

    async fn stop(&self, _ctx: &RequestContext) -> EngineResult<()> {
        Ok(())
    }

    /// Upsert by (type, id).
    async fn save(&self, ctx: &RequestContext, record: ReadModelRecord) -> EngineResult<()>;

    async fn save_batch(
        &self,
        ctx: &RequestContext,
        records: Vec<ReadModelRecord>,
    ) -> EngineResult<()>;

    async fn get(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        id: &str,
    ) -> EngineResult<Option<ReadModelRecord>>;

    async fn delete(&self, ctx: &RequestContext, model_type: &str, id: &str)
        -> EngineResult<bool>;

    async fn delete_batch(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        ids: &[String],
    ) -> EngineResult<usize>;

    /// Erase every record of one type; the projection rebuild path.
    async fn delete_by_type(&self, ctx: &RequestContext, model_type: &str) -> EngineResult<usize>;

    async fn query(
        &self,
        ctx: &RequestContext,
        criteria: &QueryCriteria,
    ) -> EngineResult<Vec<ReadModelRecord>>;

    async fn count(&self, ctx: &RequestContext, criteria: &QueryCriteria) -> EngineResult<usize>;

    async fn create_index(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        fields: &[String],
    ) -> EngineResult<()>;

    async fn drop_index(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        name: &str,
    ) -> EngineResult<bool>;
}

/// Typed convenience accessors over any [`ReadStore`].
#[async_trait]
pub trait ReadStoreExt: ReadStore {
    async fn get_as<T: DeserializeOwned + Send>(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        id: &str,
    ) -> EngineResult<Option<T>> {
        match self.get(ctx, model_type, id).await? {
            Some(record) => Ok(Some(record.decode()?)),
            None => Ok(None),
        }
    }

    async fn save_as<T: Serialize + Send + Sync>(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        id: &str,
        version: i64,
        model: &T,
    ) -> EngineResult<()> {
        let body = serde_json::to_value(model)?;
        self.save(
            ctx,
            ReadModelRecord::new(model_type, id, body).with_version(version),
        )
        .await
    }
}

impl<S: ReadStore + ?Sized> ReadStoreExt for S {}
