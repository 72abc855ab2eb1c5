//! Lifecycle callbacks and metrics persistence
//!
//! The manager notifies every registered [`FeatureStoreCallback`] in
//! registration order, synchronously. A callback returning an error stops the
//! remaining notifications and fails the operation.
//!
//! [`MetricsCallback`] is the built-in callback: it logs every event and, with
//! a [`MetricsSink`], persists creation stats and drift events.

use crate::engine::Dataset;
use crate::monitor::{DriftMetrics, FeatureStats};
use crate::{Error, Result};
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Hooks fired by [`crate::FeatureStoreManager`]
///
/// Every method defaults to doing nothing.
pub trait FeatureStoreCallback: Send + Sync {
    fn on_feature_view_create(
        &self,
        _name: &str,
        _dataset: &dyn Dataset,
        _stats: &BTreeMap<String, FeatureStats>,
    ) -> Result<()> {
        Ok(())
    }

    fn on_entity_create(&self, _name: &str, _join_keys: &[String]) -> Result<()> {
        Ok(())
    }

    fn on_error(&self, _message: &str) -> Result<()> {
        Ok(())
    }

    fn on_drift_detected(
        &self,
        _feature_view: &str,
        _feature: &str,
        _metrics: &DriftMetrics,
    ) -> Result<()> {
        Ok(())
    }
}

/// Destination for structured metric records
pub trait MetricsSink: Send + Sync {
    /// Persist one record under `name` and the current time
    fn save(&self, name: &str, record: &JsonValue) -> Result<()>;
}

/// Writes each record to `{dir}/{name}_{YYYYMMDD_HHMMSS_micros}.json`
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    /// Create the sink, creating `dir` if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::configuration(format!(
                "Failed to create metrics directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target(&self, name: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let base = format!("{}_{}", name, stamp);
        let mut path = self.dir.join(format!("{}.json", base));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}_{}.json", base, n));
            n += 1;
        }
        path
    }
}

impl MetricsSink for JsonFileSink {
    fn save(&self, name: &str, record: &JsonValue) -> Result<()> {
        let path = self.target(name);
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, content).map_err(|e| {
            Error::engine(format!(
                "Failed to write metrics file '{}': {}",
                path.display(),
                e
            ))
        })?;
        debug!("Saved metrics record {}", path.display());
        Ok(())
    }
}

/// Logs every event and persists creation stats and drift events
#[derive(Clone, Default)]
pub struct MetricsCallback {
    sink: Option<Arc<dyn MetricsSink>>,
}

impl MetricsCallback {
    /// Log-only callback
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Persist records as JSON files under `dir`
    pub fn with_path(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_sink(Arc::new(JsonFileSink::new(dir)?)))
    }

    fn save(&self, name: &str, record: JsonValue) -> Result<()> {
        match &self.sink {
            Some(sink) => sink.save(name, &record),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for MetricsCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCallback")
            .field("persistent", &self.sink.is_some())
            .finish()
    }
}

impl FeatureStoreCallback for MetricsCallback {
    fn on_feature_view_create(
        &self,
        name: &str,
        dataset: &dyn Dataset,
        stats: &BTreeMap<String, FeatureStats>,
    ) -> Result<()> {
        info!(
            "Created feature view: {} with {} features",
            name,
            dataset.columns().len()
        );
        self.save(
            &format!("{}_creation", name),
            json!({
                "name": name,
                "timestamp": Utc::now().to_rfc3339(),
                "feature_stats": stats,
            }),
        )
    }

    fn on_entity_create(&self, name: &str, join_keys: &[String]) -> Result<()> {
        info!("Created entity: {} with keys: {:?}", name, join_keys);
        Ok(())
    }

    fn on_error(&self, message: &str) -> Result<()> {
        error!("Error: {}", message);
        Ok(())
    }

    fn on_drift_detected(
        &self,
        feature_view: &str,
        feature: &str,
        metrics: &DriftMetrics,
    ) -> Result<()> {
        warn!(
            "Drift detected in {}.{}: {:?}",
            feature_view, feature, metrics
        );
        self.save(
            &format!("{}_{}_drift", feature_view, feature),
            json!({
                "feature_view": feature_view,
                "feature": feature,
                "timestamp": Utc::now().to_rfc3339(),
                "metrics": metrics,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_sink_creates_directory_and_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("metrics");
        let sink = JsonFileSink::new(&dir).unwrap();

        sink.save("view_creation", &json!({"a": 1})).unwrap();
        sink.save("view_creation", &json!({"a": 2})).unwrap();

        let names = files(&dir);
        assert_eq!(names.len(), 2);
        assert!(names
            .iter()
            .all(|n| n.starts_with("view_creation_") && n.ends_with(".json")));
    }

    #[test]
    fn test_drift_record_contents() {
        let temp_dir = TempDir::new().unwrap();
        let callback = MetricsCallback::with_path(temp_dir.path()).unwrap();
        let metrics = DriftMetrics {
            null_ratio_change: 0.1,
            mean_shift: Some(6.0),
            std_ratio: None,
        };

        callback
            .on_drift_detected("customer_behavior", "SESSION_LENGTH", &metrics)
            .unwrap();

        let names = files(temp_dir.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("customer_behavior_SESSION_LENGTH_drift_"));

        let content = std::fs::read_to_string(temp_dir.path().join(&names[0])).unwrap();
        let record: JsonValue = serde_json::from_str(&content).unwrap();
        assert_eq!(record["feature"], "SESSION_LENGTH");
        assert_eq!(record["metrics"]["mean_shift"], 6.0);
        assert!(record["metrics"].get("std_ratio").is_none());
    }

    #[test]
    fn test_log_only_callback_writes_nothing() {
        let callback = MetricsCallback::new();
        let metrics = DriftMetrics {
            null_ratio_change: 0.5,
            mean_shift: None,
            std_ratio: None,
        };
        assert!(callback.on_drift_detected("v", "f", &metrics).is_ok());
        assert!(callback.on_error("boom").is_ok());
    }
}
