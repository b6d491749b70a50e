use crate::domain::errors::SinkError;
use crate::domain::types::Dimension;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of one accepted metering call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SinkResponse {
    pub http_status: u16,
    pub metering_record_id: Option<String>,
}

// Need async_trait for async functions in traits
#[async_trait]
pub trait DimensionSource: Send + Sync {
    /// Current best-known unreported usage. Must be cheap and free of
    /// side effects; called on every reporting cycle and health update.
    async fn list_dimensions(&self) -> Result<Vec<Dimension>>;
}

#[async_trait]
pub trait MeteringSink: Send + Sync {
    /// Report one dimension quantity. A `dry_run` call must have no
    /// observable effect on downstream billing state.
    async fn send(
        &self,
        name: &str,
        quantity: u64,
        timestamp: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<SinkResponse, SinkError>;
}
