//! Per-target outcomes of a synchronization pass and their aggregate.

use serde::{Deserialize, Serialize};

use crate::market::{MarketSnapshot, Provenance, SyncTarget};

/// Outcome for one target. Every target in a batch yields exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub target: SyncTarget,
    pub success: bool,
    /// Provenance of the snapshot the caller ends up with.
    pub source: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<MarketSnapshot>,
    /// Endpoint variant that produced live data; diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl SyncResult {
    pub fn new(target: SyncTarget, source: Provenance) -> Self {
        Self {
            target,
            success: source.is_success(),
            source,
            error: None,
            snapshot: None,
            variant: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Option<MarketSnapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn with_variant(mut self, variant: Option<String>) -> Self {
        self.variant = variant;
        self
    }
}

/// Aggregate of one batch run.
///
/// `results` holds live-data outcomes and `errors` holds everything else
/// (fallback, existing, exception), each in target order. For a run that was
/// not cancelled, `results.len() + errors.len()` equals the number of targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub results: Vec<SyncResult>,
    pub errors: Vec<SyncResult>,
    pub total_attempted: usize,
    pub total_success: usize,
    pub total_errors: usize,
    pub completion_rate: f64,
    #[serde(default)]
    pub cancelled: bool,
}

impl SyncSummary {
    /// Partition ordered per-target results into the summary shape.
    pub fn from_results(outcomes: Vec<SyncResult>, cancelled: bool) -> Self {
        let total_attempted = outcomes.len();
        let (results, errors): (Vec<_>, Vec<_>) = outcomes.into_iter().partition(|outcome| outcome.success);
        let total_success = results.len();
        let completion_rate = if total_attempted == 0 {
            0.0
        } else {
            total_success as f64 / total_attempted as f64
        };
        Self {
            total_errors: errors.len(),
            results,
            errors,
            total_attempted,
            total_success,
            completion_rate,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(city: &str, source: Provenance) -> SyncResult {
        SyncResult::new(SyncTarget::new(city, "GA", None), source)
    }

    #[test]
    fn partitions_by_success() {
        let summary = SyncSummary::from_results(
            vec![
                outcome("Canton", Provenance::Api),
                outcome("Macon", Provenance::Fallback),
                outcome("Athens", Provenance::Api),
                outcome("Rome", Provenance::Existing),
            ],
            false,
        );
        assert_eq!(summary.total_attempted, 4);
        assert_eq!(summary.total_success, 2);
        assert_eq!(summary.total_errors, 2);
        assert_eq!(summary.completion_rate, 0.5);
        assert_eq!(summary.results[0].target.city, "Canton");
        assert_eq!(summary.results[1].target.city, "Athens");
        assert_eq!(summary.errors[0].target.city, "Macon");
    }

    #[test]
    fn empty_batch_has_zero_completion() {
        let summary = SyncSummary::from_results(Vec::new(), false);
        assert_eq!(summary.total_attempted, 0);
        assert_eq!(summary.completion_rate, 0.0);
    }

    #[test]
    fn serializes_service_shape() {
        let summary = SyncSummary::from_results(vec![outcome("Canton", Provenance::Api)], false);
        let value = serde_json::to_value(&summary).unwrap();
        for key in ["results", "errors", "totalAttempted", "totalSuccess", "totalErrors", "completionRate"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["results"][0]["source"], "api");
    }
}
