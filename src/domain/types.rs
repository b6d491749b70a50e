use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One named, quantified usage measurement awaiting report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub quantity: u64,
    /// Epoch seconds at which the quantity was measured.
    pub timestamp: i64,
    /// Human-readable rendering of `timestamp`.
    #[serde(rename = "datetime")]
    pub iso_timestamp: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, quantity: u64, measured_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            quantity,
            timestamp: measured_at.timestamp(),
            iso_timestamp: measured_at.to_rfc3339(),
        }
    }
}

/// Usage not yet delivered to the metering service, as currently known
/// to the dimension source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumption {
    pub dimensions: Vec<Dimension>,
}
