use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;

/// Health classification derived from how stale the newest observed
/// measurement is relative to the reporting interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthClass {
    #[serde(rename = "")]
    Normal,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "stop")]
    Stop,
    /// The startup connectivity check failed. Terminal: the reporting
    /// loop never starts and no later transition applies.
    #[serde(rename = "init")]
    Init,
}

impl HealthClass {
    pub fn to_metric_value(&self) -> f64 {
        match self {
            HealthClass::Normal => 0.0,
            HealthClass::Warning => 1.0,
            HealthClass::Stop => 2.0,
            HealthClass::Init => 3.0,
        }
    }
}

/// Marker embedded in every per-dimension failure detail so all the
/// entries for one dimension can be discarded once it recovers.
pub fn dimension_marker(dimension_name: &str) -> String {
    format!("usageDimension: {dimension_name}")
}

/// Tracks unresolved delivery errors and classifies reporting health.
///
/// Classification is timestamp-driven, not counter-driven: it measures
/// the staleness of the most recent successfully-observed measurement
/// against configured multiples of the reporting interval.
#[derive(Debug)]
pub struct FailureState {
    details: HashSet<String>,
    class: HealthClass,
    max_send_stop: u64,
    max_send_warning: u64,
    send_interval_secs: u64,
}

/// Read-only copy of the failure state for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct FailureStateSnapshot {
    #[serde(rename = "type")]
    pub class: HealthClass,
    pub details: Vec<String>,
}

impl FailureState {
    pub fn new(max_send_stop: u64, max_send_warning: u64, send_interval_secs: u64) -> Self {
        Self {
            details: HashSet::new(),
            class: HealthClass::Normal,
            max_send_stop,
            max_send_warning,
            send_interval_secs,
        }
    }

    pub fn class(&self) -> HealthClass {
        self.class
    }

    /// Marks the terminal failure reached when the startup connectivity
    /// check cannot complete.
    pub fn fail_init(&mut self, message: impl Into<String>) {
        self.class = HealthClass::Init;
        self.record_error(message);
    }

    /// Records a delivery error. Duplicate messages collapse to one entry.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.details.insert(message.into());
    }

    /// Records a structured sink failure as `"<code>: <message>"`.
    pub fn record_sink_error(&mut self, code: &str, message: &str) {
        self.record_error(format!("{code}: {message}"));
    }

    /// Drops every detail referencing `dimension_name`. If that empties
    /// the set, the classification recovers to normal.
    pub fn discard_dimension_errors(&mut self, dimension_name: &str) {
        let marker = dimension_marker(dimension_name);
        self.details.retain(|detail| !detail.contains(&marker));
        if self.details.is_empty() && self.class != HealthClass::Init {
            self.class = HealthClass::Normal;
        }
    }

    pub fn has_outstanding_errors(&self) -> bool {
        !self.details.is_empty()
    }

    pub fn detail_count(&self) -> usize {
        self.details.len()
    }

    /// Re-derives the classification from the newest measurement
    /// timestamp seen this cycle. Terminal `Init` is never re-evaluated.
    pub fn update_classification(&mut self, latest_timestamp: i64) {
        self.classify(latest_timestamp, Utc::now().timestamp());
    }

    // Stop is checked before warning: a timestamp stale enough to
    // satisfy both always classifies as stop.
    fn classify(&mut self, latest_timestamp: i64, now: i64) {
        if self.class == HealthClass::Init {
            return;
        }
        let stop_horizon = now - (self.max_send_stop * self.send_interval_secs) as i64;
        let warning_horizon = now - (self.max_send_warning * self.send_interval_secs) as i64;

        if latest_timestamp <= stop_horizon {
            self.class = HealthClass::Stop;
        } else if latest_timestamp <= warning_horizon {
            self.class = HealthClass::Warning;
        } else {
            self.class = HealthClass::Normal;
            self.details.clear();
        }
    }

    pub fn snapshot(&self) -> FailureStateSnapshot {
        let mut details: Vec<String> = self.details.iter().cloned().collect();
        details.sort();
        FailureStateSnapshot {
            class: self.class,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const INTERVAL: u64 = 3600;

    fn state() -> FailureState {
        FailureState::new(2, 1, INTERVAL)
    }

    #[test]
    fn test_fresh_timestamp_classifies_normal() {
        let mut state = state();
        state.record_error("usageDimension: unique-hosts, stale failure");
        state.classify(NOW - 100, NOW);

        assert_eq!(state.class(), HealthClass::Normal);
        assert!(!state.has_outstanding_errors(), "normal clears details");
    }

    #[test]
    fn test_warning_at_one_interval() {
        let mut state = state();
        state.classify(NOW - 3600, NOW);
        assert_eq!(state.class(), HealthClass::Warning);
    }

    #[test]
    fn test_stop_at_two_intervals() {
        let mut state = state();
        state.classify(NOW - 7200, NOW);
        assert_eq!(state.class(), HealthClass::Stop);
    }

    #[test]
    fn test_stop_takes_precedence_over_warning() {
        // A timestamp past the stop horizon also satisfies the warning
        // condition; stop must win.
        let mut state = state();
        state.classify(NOW - 10 * 3600, NOW);
        assert_eq!(state.class(), HealthClass::Stop);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let mut state = state();
        state.classify(NOW - 3600, NOW);
        let first = state.class();
        state.classify(NOW - 3600, NOW);
        assert_eq!(state.class(), first);
    }

    #[test]
    fn test_init_is_terminal() {
        let mut state = state();
        state.fail_init("dry-run connectivity check failed");

        state.classify(NOW, NOW);
        assert_eq!(state.class(), HealthClass::Init);

        state.classify(NOW - 7200, NOW);
        assert_eq!(state.class(), HealthClass::Init);
    }

    #[test]
    fn test_duplicate_errors_collapse() {
        let mut state = state();
        state.record_error("usageDimension: unique-hosts, timeout");
        state.record_error("usageDimension: unique-hosts, timeout");

        assert_eq!(state.detail_count(), 1);
    }

    #[test]
    fn test_sink_error_composes_code_and_message() {
        let mut state = state();
        state.record_sink_error("ThrottlingException", "Rate exceeded");

        let snapshot = state.snapshot();
        assert_eq!(snapshot.details, vec!["ThrottlingException: Rate exceeded"]);
    }

    #[test]
    fn test_discard_removes_only_matching_dimension() {
        let mut state = state();
        state.record_error("Timeout (usageDimension: aap-unique-hosts)");
        state.record_error("Timeout again (usageDimension: aap-unique-hosts)");
        state.record_error("Timeout (usageDimension: aap-managed-nodes)");

        state.discard_dimension_errors("aap-unique-hosts");

        let snapshot = state.snapshot();
        assert_eq!(
            snapshot.details,
            vec!["Timeout (usageDimension: aap-managed-nodes)"]
        );
        assert!(state.has_outstanding_errors());
    }

    #[test]
    fn test_discard_to_empty_recovers_class() {
        let mut state = state();
        state.record_error("Timeout (usageDimension: unique-hosts)");
        state.classify(NOW - 3600, NOW);
        assert_eq!(state.class(), HealthClass::Warning);

        state.discard_dimension_errors("unique-hosts");

        assert!(!state.has_outstanding_errors());
        assert_eq!(state.class(), HealthClass::Normal);
    }

    #[test]
    fn test_snapshot_serializes_class_as_type() {
        let mut state = state();
        state.classify(NOW - 7200, NOW);

        let json = serde_json::to_string(&state.snapshot()).expect("Failed to serialize");
        assert!(json.contains("\"type\":\"stop\""));
    }
}
