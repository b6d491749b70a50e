use crate::domain::ports::DimensionSource;
use crate::domain::types::Dimension;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::debug;

/// In-process tally of distinct hosts seen by the product, reported as
/// a single usage dimension stamped with the last observation time.
pub struct UniqueHostLedger {
    dimension_name: String,
    inner: RwLock<LedgerInner>,
}

struct LedgerInner {
    hosts: HashSet<String>,
    last_observed: DateTime<Utc>,
}

impl UniqueHostLedger {
    pub fn new(dimension_name: impl Into<String>) -> Self {
        Self {
            dimension_name: dimension_name.into(),
            inner: RwLock::new(LedgerInner {
                hosts: HashSet::new(),
                last_observed: Utc::now(),
            }),
        }
    }

    /// Record one host observation. Re-observing a known host refreshes
    /// the measurement timestamp without changing the count.
    pub async fn record_host(&self, host_id: &str) {
        let mut inner = self.inner.write().await;
        if inner.hosts.insert(host_id.to_string()) {
            debug!(
                "UniqueHostLedger: new host {host_id} ({} total)",
                inner.hosts.len()
            );
        }
        inner.last_observed = Utc::now();
    }

    pub async fn host_count(&self) -> usize {
        self.inner.read().await.hosts.len()
    }
}

#[async_trait]
impl DimensionSource for UniqueHostLedger {
    async fn list_dimensions(&self) -> Result<Vec<Dimension>> {
        let inner = self.inner.read().await;
        Ok(vec![Dimension::new(
            self.dimension_name.clone(),
            inner.hosts.len() as u64,
            inner.last_observed,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hosts_are_deduplicated() {
        let ledger = UniqueHostLedger::new("unique-hosts");
        ledger.record_host("web-01").await;
        ledger.record_host("web-02").await;
        ledger.record_host("web-01").await;

        assert_eq!(ledger.host_count().await, 2);

        let dimensions = ledger
            .list_dimensions()
            .await
            .expect("Failed to list dimensions");
        assert_eq!(dimensions.len(), 1);
        assert_eq!(dimensions[0].name, "unique-hosts");
        assert_eq!(dimensions[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_empty_ledger_reports_zero() {
        let ledger = UniqueHostLedger::new("unique-hosts");

        let dimensions = ledger
            .list_dimensions()
            .await
            .expect("Failed to list dimensions");
        assert_eq!(dimensions[0].quantity, 0);
    }

    #[tokio::test]
    async fn test_observation_refreshes_timestamp() {
        let ledger = UniqueHostLedger::new("unique-hosts");
        let before = ledger.list_dimensions().await.unwrap()[0].timestamp;

        ledger.record_host("web-01").await;
        let after = ledger.list_dimensions().await.unwrap()[0].timestamp;

        assert!(after >= before);
    }
}
