//! Feature statistics and drift detection
//!
//! A [`FeatureMonitor`] computes a [`FeatureStats`] snapshot for one column,
//! keeps a single baseline snapshot and diffs later snapshots against it.

use crate::config::FeatureConfig;
use crate::engine::{aggregate_one, Dataset};
use crate::expr::{AggExpr, Predicate};
use crate::observability;
use crate::types::FeatureValue;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Statistical snapshot of one feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub timestamp: DateTime<Utc>,
    pub row_count: u64,
    pub null_count: u64,
    /// `null_count / row_count`, or 1.0 for an empty dataset
    pub null_ratio: f64,
    pub unique_count: Option<u64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub mean_value: Option<f64>,
    pub std_value: Option<f64>,
}

impl FeatureStats {
    /// Snapshot with counts only
    pub fn from_counts(row_count: u64, null_count: u64) -> Self {
        let null_ratio = if row_count == 0 {
            1.0
        } else {
            null_count as f64 / row_count as f64
        };
        Self {
            timestamp: Utc::now(),
            row_count,
            null_count,
            null_ratio,
            unique_count: None,
            min_value: None,
            max_value: None,
            mean_value: None,
            std_value: None,
        }
    }

    /// `unique_count / row_count`, when both are meaningful
    pub fn unique_ratio(&self) -> Option<f64> {
        match (self.unique_count, self.row_count) {
            (Some(_), 0) | (None, _) => None,
            (Some(unique), rows) => Some(unique as f64 / rows as f64),
        }
    }

    pub fn has_numeric_stats(&self) -> bool {
        self.mean_value.is_some()
    }
}

impl fmt::Display for FeatureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Statistics as of {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "  Rows:    {}", self.row_count)?;
        write!(
            f,
            "  Nulls:   {} ({:.1}%)",
            self.null_count,
            self.null_ratio * 100.0
        )?;
        if let Some(unique) = self.unique_count {
            write!(f, "\n  Unique:  {}", unique)?;
        }
        if let (Some(min), Some(max), Some(mean), Some(std)) = (
            self.min_value,
            self.max_value,
            self.mean_value,
            self.std_value,
        ) {
            write!(f, "\n  Range:   [{:.4}, {:.4}]", min, max)?;
            write!(f, "\n  Mean:    {:.4}", mean)?;
            write!(f, "\n  Std Dev: {:.4}", std)?;
        }
        Ok(())
    }
}

/// Drift between a baseline and a current snapshot
///
/// Metrics that cannot be computed are absent rather than zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftMetrics {
    /// `current.null_ratio - baseline.null_ratio`
    pub null_ratio_change: f64,

    /// `current.mean - baseline.mean`, when both means exist
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mean_shift: Option<f64>,

    /// `current.std / baseline.std`, when both exist and the baseline std is non-zero
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub std_ratio: Option<f64>,
}

impl DriftMetrics {
    /// Present metrics as `(name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            Some(("null_ratio_change", self.null_ratio_change)),
            self.mean_shift.map(|v| ("mean_shift", v)),
            self.std_ratio.map(|v| ("std_ratio", v)),
        ]
        .into_iter()
        .flatten()
    }

    /// Whether any present metric has an absolute value above `threshold`
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.iter().any(|(_, value)| value.abs() > threshold)
    }
}

/// Statistics collector and drift detector for one feature
#[derive(Debug, Clone)]
pub struct FeatureMonitor {
    config: FeatureConfig,
    collect_detailed_stats: bool,
    baseline: Option<FeatureStats>,
}

impl FeatureMonitor {
    pub fn new(config: FeatureConfig, collect_detailed_stats: bool) -> Self {
        Self {
            config,
            collect_detailed_stats,
            baseline: None,
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn baseline(&self) -> Option<&FeatureStats> {
        self.baseline.as_ref()
    }

    /// Replace the baseline snapshot
    pub fn set_baseline(&mut self, stats: FeatureStats) {
        self.baseline = Some(stats);
    }

    /// Compute a snapshot of `column`
    ///
    /// The column must exist under its exact name. A case-insensitive match is
    /// only reported in the logs.
    pub async fn compute_stats(&self, dataset: &dyn Dataset, column: &str) -> Result<FeatureStats> {
        let _timer = observability::time_stats_computation();
        self.compute_stats_inner(dataset, column)
            .await
            .map_err(|e| Error::feature_view(format!("Stats computation failed: {}", e.message())))
    }

    async fn compute_stats_inner(&self, dataset: &dyn Dataset, column: &str) -> Result<FeatureStats> {
        let schema = dataset
            .schema()
            .ok_or_else(|| Error::validation("Dataset must have a schema"))?;

        let field = match schema.field(column) {
            Some(field) => field,
            None => {
                if let Some(similar) = schema.field_ignore_case(column) {
                    warn!(
                        "Column {} not found, but {} exists (case mismatch)",
                        column, similar.name
                    );
                }
                return Err(Error::engine(format!("Column {} not found in dataset", column)));
            }
        };

        let row_count = dataset.count().await? as u64;
        let null_count = dataset
            .filter(&Predicate::IsNull(column.to_string()))
            .await?
            .count()
            .await? as u64;
        let mut stats = FeatureStats::from_counts(row_count, null_count);

        if self.collect_detailed_stats {
            let unique = aggregate_one(dataset, AggExpr::count_distinct(column)).await?;
            stats.unique_count = as_count(&unique);

            if field.data_type.is_numeric() && null_count < row_count {
                let values = dataset
                    .aggregate(&[
                        AggExpr::min(column),
                        AggExpr::max(column),
                        AggExpr::avg(column),
                        AggExpr::stddev(column),
                    ])
                    .await?;
                let numeric = |i: usize| values.get(i).and_then(FeatureValue::as_f64);
                stats.min_value = numeric(0);
                stats.max_value = numeric(1);
                // Rounding in the engine's sum can land the mean just outside [min, max]
                stats.mean_value = match (numeric(2), stats.min_value, stats.max_value) {
                    (Some(mean), Some(min), Some(max)) if min <= max => Some(mean.clamp(min, max)),
                    (mean, _, _) => mean,
                };
                stats.std_value = numeric(3);
            }
        }

        debug!(
            "Computed stats for {}: rows={}, nulls={}, null_ratio={:.4}",
            column, stats.row_count, stats.null_count, stats.null_ratio
        );
        Ok(stats)
    }

    /// Compare `current` against the baseline
    pub fn detect_drift(&self, current: &FeatureStats) -> Result<DriftMetrics> {
        let baseline = self
            .baseline
            .as_ref()
            .ok_or_else(|| Error::feature_view("No baseline statistics set"))?;
        Ok(compare_stats(baseline, current))
    }
}

/// Drift of `current` relative to `baseline`
pub fn compare_stats(baseline: &FeatureStats, current: &FeatureStats) -> DriftMetrics {
    let mut metrics = DriftMetrics {
        null_ratio_change: current.null_ratio - baseline.null_ratio,
        mean_shift: None,
        std_ratio: None,
    };

    if let (Some(current_mean), Some(baseline_mean)) = (current.mean_value, baseline.mean_value) {
        metrics.mean_shift = Some(current_mean - baseline_mean);

        if let (Some(current_std), Some(baseline_std)) = (current.std_value, baseline.std_value) {
            if baseline_std != 0.0 {
                metrics.std_ratio = Some(current_std / baseline_std);
            }
        }
    }

    metrics
}

fn as_count(value: &FeatureValue) -> Option<u64> {
    match value {
        FeatureValue::Int(v) => u64::try_from(*v).ok(),
        FeatureValue::Float(v) if *v >= 0.0 => Some(*v as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryFrame;
    use crate::types::DataType;
    use crate::ErrorKind;

    fn monitor(name: &str) -> FeatureMonitor {
        FeatureMonitor::new(FeatureConfig::new(name, "test feature"), true)
    }

    fn frame() -> MemoryFrame {
        MemoryFrame::builder()
            .column(
                "SPEND",
                DataType::Float,
                vec![Some(1.0), Some(2.0), None, Some(3.0), None],
            )
            .column("SEGMENT", DataType::String, vec!["a", "b", "a", "a", "c"])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_numeric_stats() {
        let stats = monitor("SPEND")
            .compute_stats(&frame(), "SPEND")
            .await
            .unwrap();

        assert_eq!(stats.row_count, 5);
        assert_eq!(stats.null_count, 2);
        assert!((stats.null_ratio - 0.4).abs() < 1e-12);
        assert_eq!(stats.unique_count, Some(3));
        assert_eq!(stats.min_value, Some(1.0));
        assert_eq!(stats.max_value, Some(3.0));
        assert_eq!(stats.mean_value, Some(2.0));
        assert_eq!(stats.std_value, Some(1.0));
    }

    #[tokio::test]
    async fn test_mean_stays_within_min_and_max() {
        // Given: Constant values whose floating-point sum does not divide back exactly
        let frame = MemoryFrame::builder()
            .column("RATE", DataType::Float, vec![0.1, 0.1, 0.1])
            .build()
            .unwrap();

        // When: Computing stats
        let stats = monitor("RATE").compute_stats(&frame, "RATE").await.unwrap();

        // Then: min <= mean <= max holds
        let (min, mean, max) = (
            stats.min_value.unwrap(),
            stats.mean_value.unwrap(),
            stats.max_value.unwrap(),
        );
        assert!(min <= mean && mean <= max, "{} <= {} <= {}", min, mean, max);
        assert_eq!(mean, 0.1);
    }

    #[tokio::test]
    async fn test_non_numeric_column_has_no_numeric_stats() {
        let stats = monitor("SEGMENT")
            .compute_stats(&frame(), "SEGMENT")
            .await
            .unwrap();

        assert_eq!(stats.unique_count, Some(3));
        assert!(stats.min_value.is_none());
        assert!(stats.max_value.is_none());
        assert!(stats.mean_value.is_none());
        assert!(stats.std_value.is_none());
    }

    #[tokio::test]
    async fn test_counts_only_without_detailed_stats() {
        let monitor = FeatureMonitor::new(FeatureConfig::new("SPEND", ""), false);
        let stats = monitor.compute_stats(&frame(), "SPEND").await.unwrap();
        assert_eq!(stats.null_count, 2);
        assert!(stats.unique_count.is_none());
        assert!(stats.mean_value.is_none());
    }

    #[tokio::test]
    async fn test_all_null_numeric_column() {
        let frame = MemoryFrame::builder()
            .column("X", DataType::Float, vec![None::<f64>, None])
            .build()
            .unwrap();
        let stats = monitor("X").compute_stats(&frame, "X").await.unwrap();
        assert_eq!(stats.null_ratio, 1.0);
        assert_eq!(stats.unique_count, Some(0));
        assert!(stats.mean_value.is_none());
    }

    #[tokio::test]
    async fn test_empty_dataset_null_ratio_is_one() {
        let frame = MemoryFrame::builder()
            .column("X", DataType::Float, Vec::<f64>::new())
            .build()
            .unwrap();
        let stats = monitor("X").compute_stats(&frame, "X").await.unwrap();
        assert_eq!(stats.row_count, 0);
        assert_eq!(stats.null_ratio, 1.0);
    }

    #[tokio::test]
    async fn test_missing_column_fails() {
        let err = monitor("spend")
            .compute_stats(&frame(), "spend")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeatureView);
        assert!(err.to_string().contains("Stats computation failed"));
    }

    #[test]
    fn test_detect_drift_requires_baseline() {
        let err = monitor("X")
            .detect_drift(&FeatureStats::from_counts(10, 1))
            .unwrap_err();
        assert!(err.to_string().contains("No baseline statistics set"));
    }

    #[tokio::test]
    async fn test_drift_against_itself_is_neutral() {
        let mut monitor = monitor("SPEND");
        let stats = monitor.compute_stats(&frame(), "SPEND").await.unwrap();
        monitor.set_baseline(stats.clone());

        let drift = monitor.detect_drift(&stats).unwrap();
        assert_eq!(drift.null_ratio_change, 0.0);
        assert_eq!(drift.mean_shift, Some(0.0));
        assert_eq!(drift.std_ratio, Some(1.0));
    }

    #[test]
    fn test_drift_omits_uncomputable_metrics() {
        let mut baseline = FeatureStats::from_counts(100, 10);
        baseline.mean_value = Some(50.0);
        baseline.std_value = Some(0.0);
        let mut current = FeatureStats::from_counts(100, 20);
        current.mean_value = Some(56.0);
        current.std_value = Some(5.6);

        let drift = compare_stats(&baseline, &current);
        assert_eq!(drift.mean_shift, Some(6.0));
        assert_eq!(drift.std_ratio, None);
        assert_eq!(drift.iter().count(), 2);

        let json = serde_json::to_value(&drift).unwrap();
        assert!(json.get("std_ratio").is_none());
    }

    #[test]
    fn test_drift_threshold() {
        let drift = DriftMetrics {
            null_ratio_change: -0.05,
            mean_shift: None,
            std_ratio: None,
        };
        assert!(!drift.exceeds(0.1));

        let drift = DriftMetrics {
            null_ratio_change: -0.15,
            mean_shift: None,
            std_ratio: None,
        };
        assert!(drift.exceeds(0.1));
    }

    #[test]
    fn test_stats_display() {
        let mut stats = FeatureStats::from_counts(100, 10);
        stats.unique_count = Some(42);
        stats.min_value = Some(1.0);
        stats.max_value = Some(9.0);
        stats.mean_value = Some(5.0);
        stats.std_value = Some(2.0);

        let text = stats.to_string();
        assert!(text.contains("Rows:    100"));
        assert!(text.contains("(10.0%)"));
        assert!(text.contains("Unique:  42"));
        assert!(text.contains("Mean:    5.0000"));
    }
}
