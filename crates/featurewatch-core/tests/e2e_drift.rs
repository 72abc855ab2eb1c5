//! E2E tests for drift detection
//!
//! Tests drift re-checks end-to-end:
//! - Baseline snapshot at registration, drift metrics on new data
//! - Stored transforms re-applied to new data
//! - Per-feature failures skipped, callback failures propagated
//! - Metrics records persisted through MetricsCallback

use featurewatch_core::prelude::*;
use featurewatch_core::{FeatureStoreCallback, DRIFT_THRESHOLD};
use std::sync::Mutex;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

/// `rows` values with `nulls` missing; the rest split evenly around `mean`
/// so that the sample standard deviation is exactly `std`
fn values(rows: usize, nulls: usize, mean: f64, std: f64) -> Vec<Option<f64>> {
    let present = rows - nulls;
    let offset = std * ((present as f64 - 1.0) / present as f64).sqrt();
    (0..rows)
        .map(|i| {
            if i < nulls {
                None
            } else if i % 2 == 0 {
                Some(mean + offset)
            } else {
                Some(mean - offset)
            }
        })
        .collect()
}

fn dataset(x: Vec<Option<f64>>, segments: Vec<Option<&str>>) -> DatasetRef {
    let ids: Vec<String> = (0..x.len()).map(|i| format!("c{}", i)).collect();
    MemoryFrame::builder()
        .column("CUSTOMER_ID", DataType::String, ids)
        .column("X", DataType::Float, x)
        .column("SEGMENT", DataType::String, segments)
        .build()
        .unwrap()
        .into_ref()
}

fn baseline_data() -> DatasetRef {
    dataset(values(100, 10, 50.0, 5.0), vec![Some("gold"); 100])
}

fn drifted_data() -> DatasetRef {
    dataset(values(100, 20, 56.0, 5.6), vec![Some("gold"); 100])
}

fn config() -> FeatureViewConfig {
    FeatureViewConfig::new("scores")
        .with_feature(FeatureConfig::new("X", "Score"))
        .with_feature(FeatureConfig::new("SEGMENT", "Customer segment"))
}

#[derive(Default)]
struct DriftLog {
    drifted: Mutex<Vec<String>>,
    reject: bool,
}

impl FeatureStoreCallback for DriftLog {
    fn on_drift_detected(
        &self,
        feature_view: &str,
        feature: &str,
        _metrics: &DriftMetrics,
    ) -> Result<()> {
        if self.reject {
            return Err(Error::engine("alerting unavailable"));
        }
        self.drifted
            .lock()
            .unwrap()
            .push(format!("{}.{}", feature_view, feature));
        Ok(())
    }
}

async fn registered(
    options: ManagerOptions,
    transforms: &[Transform],
) -> FeatureStoreManager {
    let store = Arc::new(MemoryFeatureStore::new());
    let mut manager = FeatureStoreManager::new(store, options).unwrap();
    manager
        .add_entity(Entity::new("CUSTOMER", vec!["CUSTOMER_ID".to_string()]))
        .await
        .unwrap();
    manager
        .add_feature_view(config(), baseline_data(), "CUSTOMER", transforms, true)
        .await
        .unwrap();
    manager
}

// ============================================================================
// Drift Scenario Tests
// ============================================================================

#[tokio::test]
async fn test_e2e_baseline_snapshot() {
    // Given: 100 rows, 10 nulls, mean 50, std 5
    let manager = registered(ManagerOptions::default(), &[]).await;

    // When: Reading the stored stats
    let stats = &manager.feature_stats()["scores"]["X"];

    // Then: The baseline matches the data
    assert_eq!(stats.row_count, 100);
    assert_eq!(stats.null_count, 10);
    assert_close(stats.null_ratio, 0.1);
    assert_close(stats.mean_value.unwrap(), 50.0);
    assert_close(stats.std_value.unwrap(), 5.0);
}

#[tokio::test]
async fn test_e2e_drift_scenario() {
    // Given: A registered view and a callback collecting drift events
    let log = Arc::new(DriftLog::default());
    let manager = registered(ManagerOptions::new().with_callback(log.clone()), &[]).await;

    // When: New data has 20 nulls, mean 56, std 5.6
    let drift = manager
        .check_feature_drift("scores", drifted_data())
        .await
        .unwrap();

    // Then: X is flagged with the expected metrics
    let metrics = &drift["X"];
    assert_close(metrics.null_ratio_change, 0.1);
    assert_close(metrics.mean_shift.unwrap(), 6.0);
    assert_close(metrics.std_ratio.unwrap(), 1.12);
    assert!(metrics.exceeds(DRIFT_THRESHOLD));

    // And: SEGMENT has no numeric metrics and unchanged nulls, so it is not flagged
    assert!(!drift.contains_key("SEGMENT"));
    assert_eq!(log.drifted.lock().unwrap().as_slice(), &["scores.X".to_string()]);
}

#[tokio::test]
async fn test_e2e_same_data_flags_only_through_std_ratio() {
    // Given: A registered view
    let manager = registered(ManagerOptions::default(), &[]).await;

    // When: Re-checking the baseline data itself
    let drift = manager
        .check_feature_drift("scores", baseline_data())
        .await
        .unwrap();

    // Then: Differences are zero and the ratio is one; |1| > 0.1 still flags X
    let metrics = &drift["X"];
    assert_close(metrics.null_ratio_change, 0.0);
    assert_close(metrics.mean_shift.unwrap(), 0.0);
    assert_close(metrics.std_ratio.unwrap(), 1.0);
    assert!(!drift.contains_key("SEGMENT"));
}

#[tokio::test]
async fn test_e2e_stored_transforms_are_reapplied() {
    // Given: SEGMENT registered behind a fill_na transform
    let transforms = vec![Transform::fill_na(&["SEGMENT"], "unknown")];
    let manager = registered(ManagerOptions::default(), &transforms).await;

    // When: New data has half of SEGMENT missing
    let segments: Vec<Option<&str>> = (0..100)
        .map(|i| if i % 2 == 0 { None } else { Some("gold") })
        .collect();
    let new_data = dataset(values(100, 10, 50.0, 5.0), segments.clone());
    let drift = manager
        .check_feature_drift("scores", new_data)
        .await
        .unwrap();

    // Then: The fill runs first, so SEGMENT shows no null drift
    assert!(!drift.contains_key("SEGMENT"));

    // And: Without the transform the same data drifts
    let plain = registered(ManagerOptions::default(), &[]).await;
    let drift = plain
        .check_feature_drift("scores", dataset(values(100, 10, 50.0, 5.0), segments))
        .await
        .unwrap();
    assert_close(drift["SEGMENT"].null_ratio_change, 0.5);
}

#[tokio::test]
async fn test_e2e_missing_feature_is_skipped() {
    // Given: A registered view
    let manager = registered(ManagerOptions::default(), &[]).await;

    // When: New data no longer has X
    let new_data = MemoryFrame::builder()
        .column("CUSTOMER_ID", DataType::String, vec!["c1", "c2"])
        .column("SEGMENT", DataType::String, vec![None, Some("gold")])
        .build()
        .unwrap()
        .into_ref();
    let drift = manager
        .check_feature_drift("scores", new_data)
        .await
        .unwrap();

    // Then: X is skipped, SEGMENT is still checked
    assert!(!drift.contains_key("X"));
    assert_close(drift["SEGMENT"].null_ratio_change, 0.5);
}

#[tokio::test]
async fn test_e2e_failing_drift_callback_aborts_check() {
    // Given: A callback that rejects drift events
    let log = Arc::new(DriftLog {
        reject: true,
        ..Default::default()
    });
    let manager = registered(ManagerOptions::new().with_callback(log), &[]).await;

    // When: Drift is detected
    let err = manager
        .check_feature_drift("scores", drifted_data())
        .await
        .unwrap_err();

    // Then: The callback failure surfaces as a drift-check error
    assert_eq!(err.kind(), ErrorKind::FeatureView);
    assert_eq!(
        err.message(),
        "Error checking drift for scores: alerting unavailable"
    );
}

#[tokio::test]
async fn test_e2e_metrics_records_are_written() {
    // Given: A manager persisting metrics into a temp directory
    let temp_dir = TempDir::new().unwrap();
    let options = ManagerOptions::new().with_metrics_path(temp_dir.path());
    let manager = registered(options, &[]).await;

    // When: Drift is detected
    manager
        .check_feature_drift("scores", drifted_data())
        .await
        .unwrap();

    // Then: One creation record and one drift record exist
    let mut names: Vec<String> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("scores_X_drift_"));
    assert!(names[1].starts_with("scores_creation_"));

    let creation = std::fs::read_to_string(temp_dir.path().join(&names[1])).unwrap();
    let record: serde_json::Value = serde_json::from_str(&creation).unwrap();
    assert_eq!(record["name"], "scores");
    assert_eq!(record["feature_stats"]["X"]["null_count"], 10);
}
