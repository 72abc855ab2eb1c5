//! Observability module for metrics
//!
//! Metrics go through the `metrics` facade; the embedding application decides
//! whether to install an exporter. Without one every call is a no-op.
//!
//! ## Metrics Exposed:
//! - `featurewatch_stats_duration_seconds` - Feature statistics latency histogram
//! - `featurewatch_feature_views_created_total` - Registered feature views counter
//! - `featurewatch_validation_failures_total` - Features that failed validation
//! - `featurewatch_drift_detected_total` - Features flagged as drifting
//! - `featurewatch_drift_skipped_total` - Features skipped during a drift check
//! - `featurewatch_errors_total` - Manager operation failures, labelled by kind
//!
//! ## Usage:
//! ```rust,ignore
//! use featurewatch_core::observability::*;
//!
//! let _timer = time_stats_computation();
//! // ... run the aggregations ...
//! drop(_timer); // Automatically records duration
//! ```

use crate::error::ErrorKind;
use metrics::{counter, histogram};
use std::time::Instant;

// ==================== Statistics Metrics ====================

/// Timer for statistics computation (auto-records on drop)
pub struct StatsTimer {
    start: Instant,
}

impl Default for StatsTimer {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl StatsTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Drop for StatsTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        histogram!("featurewatch_stats_duration_seconds", duration);
    }
}

/// Start timing a statistics computation
pub fn time_stats_computation() -> StatsTimer {
    StatsTimer::new()
}

// ==================== Lifecycle Metrics ====================

pub fn increment_feature_views_created() {
    counter!("featurewatch_feature_views_created_total", 1);
}

pub fn increment_validation_failures() {
    counter!("featurewatch_validation_failures_total", 1);
}

pub fn increment_drift_detected() {
    counter!("featurewatch_drift_detected_total", 1);
}

pub fn increment_drift_skipped() {
    counter!("featurewatch_drift_skipped_total", 1);
}

/// Count a failed manager operation
pub fn increment_errors(kind: ErrorKind) {
    counter!("featurewatch_errors_total", 1, "kind" => kind_label(kind));
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Configuration => "configuration",
        ErrorKind::Connection => "connection",
        ErrorKind::Entity => "entity",
        ErrorKind::FeatureView => "feature_view",
        ErrorKind::Validation => "validation",
        ErrorKind::FeatureStore => "feature_store",
        ErrorKind::Engine => "engine",
        ErrorKind::Serialization => "serialization",
    }
}
