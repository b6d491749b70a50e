//! Mock source and sink implementations for local development and tests.

use crate::domain::errors::SinkError;
use crate::domain::ports::{DimensionSource, MeteringSink, SinkResponse};
use crate::domain::types::Dimension;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::info;

/// Dimension source reporting one fixed quantity stamped at poll time.
pub struct StaticDimensionSource {
    name: String,
    quantity: u64,
}

impl StaticDimensionSource {
    pub fn new(name: impl Into<String>, quantity: u64) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}

#[async_trait]
impl DimensionSource for StaticDimensionSource {
    async fn list_dimensions(&self) -> Result<Vec<Dimension>> {
        Ok(vec![Dimension::new(
            self.name.clone(),
            self.quantity,
            Utc::now(),
        )])
    }
}

/// One metering call as observed by the mock sink.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub name: String,
    pub quantity: u64,
    pub dry_run: bool,
}

/// Metering sink that accepts everything and logs instead of billing.
/// Individual dimensions can be scripted to fail.
pub struct MockMeteringSink {
    calls: RwLock<Vec<RecordedSend>>,
    failing: RwLock<HashSet<String>>,
}

impl MockMeteringSink {
    pub fn new() -> Self {
        Self {
            calls: RwLock::new(Vec::new()),
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Make subsequent sends for `name` fail with a service error.
    pub async fn fail_dimension(&self, name: &str) {
        self.failing.write().await.insert(name.to_string());
    }

    /// Let subsequent sends for `name` succeed again.
    pub async fn recover_dimension(&self, name: &str) {
        self.failing.write().await.remove(name);
    }

    pub async fn calls(&self) -> Vec<RecordedSend> {
        self.calls.read().await.clone()
    }
}

impl Default for MockMeteringSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeteringSink for MockMeteringSink {
    async fn send(
        &self,
        name: &str,
        quantity: u64,
        _timestamp: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<SinkResponse, SinkError> {
        self.calls.write().await.push(RecordedSend {
            name: name.to_string(),
            quantity,
            dry_run,
        });

        if self.failing.read().await.contains(name) {
            return Err(SinkError::Service {
                code: "InternalServiceErrorException".to_string(),
                message: format!("metering service unavailable for {name}"),
            });
        }

        info!("MockMeteringSink: accepted {name} x{quantity} (dry_run={dry_run})");
        Ok(SinkResponse {
            http_status: 200,
            metering_record_id: Some(format!("mock-{name}-{quantity}")),
        })
    }
}
