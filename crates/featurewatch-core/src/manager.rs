//! Feature store manager
//!
//! Orchestrates entity registration, the feature-view pipeline, drift
//! re-checks and dependency lookups on top of a [`FeatureStoreBackend`].
//!
//! ## Feature view lifecycle
//!
//! ```text
//! Unregistered → Transforming → Validating → Registering → Registered
//! ```
//!
//! Local state (handle, config, stats, transforms, dependency edges) is only
//! written once the backend accepted the view and its stats are computed. A
//! failure at any earlier step leaves the manager unchanged; `on_error`
//! callbacks have already fired when the error is returned.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let backend = Arc::new(MemoryFeatureStore::new());
//! let mut manager = FeatureStoreManager::new(backend, ManagerOptions::default())?;
//!
//! manager.add_entity(Entity::new("CUSTOMER", vec!["CUSTOMER_ID".into()])).await?;
//! manager.add_feature_view(config, dataset, "CUSTOMER", &transforms, true).await?;
//!
//! let drift = manager.check_feature_drift("customer_behavior", new_data).await?;
//! ```

use crate::backend::{DatasetRequest, FeatureStoreBackend, RegisteredFeatureView};
use crate::builder::FeatureViewBuilder;
use crate::callback::{FeatureStoreCallback, MetricsCallback};
use crate::config::{FeatureConfig, FeatureViewConfig};
use crate::dependency::DependencyGraph;
use crate::engine::{require_schema, DatasetRef};
use crate::monitor::{DriftMetrics, FeatureMonitor, FeatureStats};
use crate::observability;
use crate::transform::{apply_transforms, Transform};
use crate::types::Entity;
use crate::{Error, ErrorKind, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Absolute value above which any drift metric flags a feature
pub const DRIFT_THRESHOLD: f64 = 0.1;

/// Prefix of generated training dataset names
pub const DATASET_PREFIX: &str = "DATASET";

/// `{prefix}_{YYYYMMDD_HHMMSS}_{8 hex}` in UTC
pub fn unique_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        prefix,
        Utc::now().format("%Y%m%d_%H%M%S"),
        &id[..8]
    )
}

/// Where a feature view is in the registration pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureViewState {
    Unregistered,
    Transforming,
    Validating,
    Registering,
    Registered,
}

impl fmt::Display for FeatureViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unregistered => "unregistered",
            Self::Transforming => "transforming",
            Self::Validating => "validating",
            Self::Registering => "registering",
            Self::Registered => "registered",
        };
        write!(f, "{}", s)
    }
}

/// A feature view requested from [`FeatureStoreManager::get_features`]
#[derive(Debug, Clone)]
pub enum FeatureViewRef {
    /// Handle returned by a previous registration, used as-is
    Handle(RegisteredFeatureView),
    /// Looked up by the config's name and version
    Config(FeatureViewConfig),
    /// Looked up by name and version, parsed from `"name/version"`
    NameVersion { name: String, version: String },
}

impl FeatureViewRef {
    pub fn name_version(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::NameVersion {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl FromStr for FeatureViewRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((name, version))
                if !name.is_empty() && !version.is_empty() && !version.contains('/') =>
            {
                Ok(Self::name_version(name, version))
            }
            _ => Err(Error::configuration(format!(
                "Invalid feature view reference '{}', expected name/version",
                s
            ))),
        }
    }
}

impl From<RegisteredFeatureView> for FeatureViewRef {
    fn from(handle: RegisteredFeatureView) -> Self {
        Self::Handle(handle)
    }
}

impl From<FeatureViewConfig> for FeatureViewRef {
    fn from(config: FeatureViewConfig) -> Self {
        Self::Config(config)
    }
}

impl fmt::Display for FeatureViewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(handle) => write!(f, "{}", handle.reference()),
            Self::Config(config) => write!(f, "{}/{}", config.name, config.version()),
            Self::NameVersion { name, version } => write!(f, "{}/{}", name, version),
        }
    }
}

/// Construction options for [`FeatureStoreManager`]
#[derive(Clone, Default)]
pub struct ManagerOptions {
    /// Notified in order
    pub callbacks: Vec<Arc<dyn FeatureStoreCallback>>,
    /// When set, a [`MetricsCallback`] writing JSON records here is appended
    pub metrics_path: Option<PathBuf>,
    /// Replace an existing name/version on registration
    pub overwrite: bool,
}

impl ManagerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(mut self, callback: Arc<dyn FeatureStoreCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn with_metrics_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

impl fmt::Debug for ManagerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerOptions")
            .field("callbacks", &self.callbacks.len())
            .field("metrics_path", &self.metrics_path)
            .field("overwrite", &self.overwrite)
            .finish()
    }
}

/// Optional arguments of [`FeatureStoreManager::get_features`]
#[derive(Debug, Clone, Default)]
pub struct GetFeaturesOptions {
    pub label_cols: Vec<String>,
    /// Generated as `DATASET_{timestamp}_{id}` when absent
    pub dataset_name: Option<String>,
    pub spine_timestamp_col: Option<String>,
}

impl GetFeaturesOptions {
    pub fn with_label_cols(mut self, columns: &[&str]) -> Self {
        self.label_cols = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_dataset_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = Some(name.into());
        self
    }

    pub fn with_spine_timestamp_col(mut self, column: impl Into<String>) -> Self {
        self.spine_timestamp_col = Some(column.into());
        self
    }
}

/// Registry state and orchestration for one feature store
pub struct FeatureStoreManager {
    backend: Arc<dyn FeatureStoreBackend>,
    entities: BTreeMap<String, Entity>,
    feature_views: BTreeMap<String, RegisteredFeatureView>,
    feature_configs: BTreeMap<String, FeatureViewConfig>,
    feature_stats: BTreeMap<String, BTreeMap<String, FeatureStats>>,
    feature_transforms: BTreeMap<String, Vec<Transform>>,
    dependencies: DependencyGraph,
    callbacks: Vec<Arc<dyn FeatureStoreCallback>>,
    overwrite: bool,
}

impl FeatureStoreManager {
    pub fn new(backend: Arc<dyn FeatureStoreBackend>, options: ManagerOptions) -> Result<Self> {
        let ManagerOptions {
            mut callbacks,
            metrics_path,
            overwrite,
        } = options;

        if let Some(path) = metrics_path {
            callbacks.push(Arc::new(MetricsCallback::with_path(path)?));
        }

        info!(
            "FeatureStoreManager initialized ({} callbacks, overwrite={})",
            callbacks.len(),
            overwrite
        );
        Ok(Self {
            backend,
            entities: BTreeMap::new(),
            feature_views: BTreeMap::new(),
            feature_configs: BTreeMap::new(),
            feature_stats: BTreeMap::new(),
            feature_transforms: BTreeMap::new(),
            dependencies: DependencyGraph::new(),
            callbacks,
            overwrite,
        })
    }

    // ==================== Entities ====================

    /// Register an entity with the backend (tags included) and keep it locally
    /// once every callback accepts it
    ///
    /// Re-adding a name re-registers it.
    pub async fn add_entity(&mut self, entity: Entity) -> Result<Entity> {
        let name = entity.name.clone();
        if let Err(e) = self.register_entity(&entity).await {
            return Err(self.fail(
                ErrorKind::Entity,
                format!("Error creating entity {}: {}", name, e.message()),
            ));
        }
        if let Err(e) = self.notify(|cb| cb.on_entity_create(&name, &entity.join_keys)) {
            return Err(self.fail(
                ErrorKind::Entity,
                format!("Error creating entity {}: {}", name, e.message()),
            ));
        }
        self.entities.insert(name.clone(), entity.clone());

        info!("Added entity {} with keys {:?}", name, entity.join_keys);
        Ok(entity)
    }

    async fn register_entity(&self, entity: &Entity) -> Result<()> {
        self.backend.register_entity(entity).await?;
        for (key, value) in &entity.tags {
            self.backend.set_tag(&entity.name, key, value).await?;
        }
        Ok(())
    }

    // ==================== Feature views ====================

    /// Transform, validate, register and snapshot a feature view
    ///
    /// Schema and rule failures are returned as [`Error::Validation`], an
    /// unknown entity as [`Error::Entity`], anything else as
    /// [`Error::FeatureView`]. Every message reads
    /// `Error creating feature view {name}: ...`.
    pub async fn add_feature_view(
        &mut self,
        config: FeatureViewConfig,
        dataset: DatasetRef,
        entity_name: &str,
        transforms: &[Transform],
        collect_stats: bool,
    ) -> Result<RegisteredFeatureView> {
        let name = config.name.clone();

        let (handle, stats, dataset) = match self
            .create_feature_view(&config, dataset, entity_name, transforms, collect_stats)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                let kind = match e.kind() {
                    ErrorKind::Validation => ErrorKind::Validation,
                    ErrorKind::Entity => ErrorKind::Entity,
                    _ => ErrorKind::FeatureView,
                };
                return Err(self.fail(
                    kind,
                    format!("Error creating feature view {}: {}", name, e.message()),
                ));
            }
        };

        self.feature_views.insert(name.clone(), handle.clone());
        self.feature_configs.insert(name.clone(), config.clone());
        self.feature_stats.insert(name.clone(), stats);
        if transforms.is_empty() {
            self.feature_transforms.remove(&name);
        } else {
            self.feature_transforms
                .insert(name.clone(), transforms.to_vec());
        }
        self.dependencies.update(&config);
        observability::increment_feature_views_created();
        transition(&name, FeatureViewState::Registered);

        let notified = match self.feature_stats.get(&name) {
            Some(stats) => {
                self.notify(|cb| cb.on_feature_view_create(&name, dataset.as_ref(), stats))
            }
            None => Ok(()),
        };
        if let Err(e) = notified {
            return Err(self.fail(
                ErrorKind::FeatureView,
                format!("Error creating feature view {}: {}", name, e.message()),
            ));
        }

        info!(
            "Registered feature view {} ({} features monitored)",
            handle.reference(),
            self.feature_stats.get(&name).map_or(0, BTreeMap::len)
        );
        Ok(handle)
    }

    async fn create_feature_view(
        &self,
        config: &FeatureViewConfig,
        dataset: DatasetRef,
        entity_name: &str,
        transforms: &[Transform],
        collect_stats: bool,
    ) -> Result<(RegisteredFeatureView, BTreeMap<String, FeatureStats>, DatasetRef)> {
        transition(&config.name, FeatureViewState::Transforming);
        config.validate()?;
        require_schema(dataset.as_ref())?;
        let dataset = apply_transforms(dataset, transforms).await?;

        let entity = self
            .entities
            .get(entity_name)
            .cloned()
            .ok_or_else(|| Error::entity(format!("Entity {} not found", entity_name)))?;

        transition(&config.name, FeatureViewState::Validating);
        let mut builder =
            FeatureViewBuilder::new(config.clone(), dataset.clone(), [entity], collect_stats);
        let artifact = builder.build().await?;

        transition(&config.name, FeatureViewState::Registering);
        let handle = self
            .backend
            .register_feature_view(artifact, &config.version(), self.overwrite)
            .await?;

        let mut stats = BTreeMap::new();
        for (feature, monitor) in builder.monitors() {
            let snapshot = monitor.compute_stats(dataset.as_ref(), feature).await?;
            stats.insert(feature.clone(), snapshot);
        }
        Ok((handle, stats, dataset))
    }

    // ==================== Drift ====================

    /// Compare `new_data` against the stored baselines of a registered view
    ///
    /// Stored transforms are re-applied first. Only features with a metric
    /// whose absolute value exceeds [`DRIFT_THRESHOLD`] are returned; features
    /// whose stats cannot be computed are logged and skipped.
    pub async fn check_feature_drift(
        &self,
        view_name: &str,
        new_data: DatasetRef,
    ) -> Result<BTreeMap<String, DriftMetrics>> {
        match self.detect_view_drift(view_name, new_data).await {
            Ok(drifted) => Ok(drifted),
            Err(e) => Err(self.fail(
                ErrorKind::FeatureView,
                format!("Error checking drift for {}: {}", view_name, e.message()),
            )),
        }
    }

    async fn detect_view_drift(
        &self,
        view_name: &str,
        new_data: DatasetRef,
    ) -> Result<BTreeMap<String, DriftMetrics>> {
        let stored = self.feature_stats.get(view_name).ok_or_else(|| {
            Error::feature_view(format!("No baseline stats for feature view {}", view_name))
        })?;
        let config = self.feature_configs.get(view_name).ok_or_else(|| {
            Error::feature_view(format!("Feature view config {} not found", view_name))
        })?;

        let transforms = self
            .feature_transforms
            .get(view_name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if transforms.is_empty() {
            debug!("No transforms to apply for {}", view_name);
        }
        let data = apply_transforms(new_data, transforms).await?;

        let mut drifted = BTreeMap::new();
        for (feature, baseline) in stored {
            let feature_config = config.features.get(feature).cloned().unwrap_or_else(|| {
                FeatureConfig::new(feature.as_str(), format!("Temporary monitor for {}", feature))
            });
            let mut monitor = FeatureMonitor::new(feature_config, true);
            monitor.set_baseline(baseline.clone());

            let metrics = match monitor.compute_stats(data.as_ref(), feature).await {
                Ok(current) => monitor.detect_drift(&current),
                Err(e) => Err(e),
            };
            let metrics = match metrics {
                Ok(metrics) => metrics,
                Err(e) => {
                    warn!("Skipping drift detection for {}: {}", feature, e.message());
                    observability::increment_drift_skipped();
                    continue;
                }
            };

            if metrics.exceeds(DRIFT_THRESHOLD) {
                observability::increment_drift_detected();
                self.notify(|cb| cb.on_drift_detected(view_name, feature, &metrics))?;
                drifted.insert(feature.clone(), metrics);
            } else {
                debug!("No drift for {}.{}: {:?}", view_name, feature, metrics);
            }
        }

        info!(
            "Drift check for {}: {} of {} features drifted",
            view_name,
            drifted.len(),
            stored.len()
        );
        Ok(drifted)
    }

    // ==================== Dependencies ====================

    /// Views reachable from `view_name` through feature dependencies
    ///
    /// Includes `view_name` itself when it declares features.
    pub fn get_feature_dependencies(&self, view_name: &str) -> Result<BTreeSet<String>> {
        match self.dependencies.descendants(view_name) {
            Ok(views) => {
                info!("Dependencies for {}: {:?}", view_name, views);
                Ok(views)
            }
            Err(e) => Err(self.fail(
                ErrorKind::FeatureView,
                format!(
                    "Error getting dependencies for {}: {}",
                    view_name,
                    e.message()
                ),
            )),
        }
    }

    // ==================== Datasets ====================

    /// Point-in-time join of registered feature views onto `spine`
    pub async fn get_features(
        &self,
        spine: DatasetRef,
        feature_views: &[FeatureViewRef],
        options: GetFeaturesOptions,
    ) -> Result<DatasetRef> {
        match self.generate_dataset(spine, feature_views, options).await {
            Ok(dataset) => Ok(dataset),
            Err(e) => Err(self.fail(
                ErrorKind::FeatureStore,
                format!("Error generating dataset: {}", e.message()),
            )),
        }
    }

    async fn generate_dataset(
        &self,
        spine: DatasetRef,
        feature_views: &[FeatureViewRef],
        options: GetFeaturesOptions,
    ) -> Result<DatasetRef> {
        debug!("Spine columns: {:?}", spine.columns());

        let mut handles = Vec::with_capacity(feature_views.len());
        for reference in feature_views {
            handles.push(self.resolve(reference).await?);
        }

        let name = options
            .dataset_name
            .unwrap_or_else(|| unique_name(DATASET_PREFIX));
        info!(
            "Generating dataset {} from {} feature views (labels: {:?}, timestamp: {:?})",
            name,
            handles.len(),
            options.label_cols,
            options.spine_timestamp_col
        );

        self.backend
            .generate_dataset(DatasetRequest {
                name,
                spine,
                feature_views: handles,
                label_cols: options.label_cols,
                spine_timestamp_col: options.spine_timestamp_col,
            })
            .await
    }

    async fn resolve(&self, reference: &FeatureViewRef) -> Result<RegisteredFeatureView> {
        match reference {
            FeatureViewRef::Handle(handle) => Ok(handle.clone()),
            FeatureViewRef::Config(config) => {
                self.backend
                    .get_feature_view(&config.name, &config.version())
                    .await
            }
            FeatureViewRef::NameVersion { name, version } => {
                self.backend.get_feature_view(name, version).await
            }
        }
    }

    // ==================== Accessors ====================

    pub fn backend(&self) -> &Arc<dyn FeatureStoreBackend> {
        &self.backend
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn entities(&self) -> &BTreeMap<String, Entity> {
        &self.entities
    }

    pub fn feature_views(&self) -> &BTreeMap<String, RegisteredFeatureView> {
        &self.feature_views
    }

    pub fn feature_configs(&self) -> &BTreeMap<String, FeatureViewConfig> {
        &self.feature_configs
    }

    /// Stored per-feature stats by view
    pub fn feature_stats(&self) -> &BTreeMap<String, BTreeMap<String, FeatureStats>> {
        &self.feature_stats
    }

    /// Transforms recorded for drift re-checks, by view
    pub fn feature_transforms(&self) -> &BTreeMap<String, Vec<Transform>> {
        &self.feature_transforms
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    /// Lifecycle state visible to callers
    ///
    /// Intermediate states only exist inside a running `add_feature_view`, so
    /// a view is observed either unregistered or registered.
    pub fn view_state(&self, view_name: &str) -> FeatureViewState {
        if self.feature_views.contains_key(view_name) {
            FeatureViewState::Registered
        } else {
            FeatureViewState::Unregistered
        }
    }

    // ==================== Callbacks ====================

    /// Deliver an event to every callback in order, stopping at the first error
    fn notify<F>(&self, event: F) -> Result<()>
    where
        F: Fn(&dyn FeatureStoreCallback) -> Result<()>,
    {
        for callback in &self.callbacks {
            event(callback.as_ref())?;
        }
        Ok(())
    }

    /// Count the failure, notify `on_error` callbacks and build the error
    fn fail(&self, kind: ErrorKind, message: String) -> Error {
        observability::increment_errors(kind);
        if let Err(e) = self.notify(|cb| cb.on_error(&message)) {
            warn!("on_error callback failed: {}", e);
        }
        match kind {
            ErrorKind::Entity => Error::entity(message),
            ErrorKind::Validation => Error::validation(message),
            ErrorKind::FeatureStore => Error::feature_store(message),
            _ => Error::feature_view(message),
        }
    }
}

impl fmt::Debug for FeatureStoreManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureStoreManager")
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .field("feature_views", &self.feature_views.keys().collect::<Vec<_>>())
            .field("callbacks", &self.callbacks.len())
            .field("overwrite", &self.overwrite)
            .finish()
    }
}

fn transition(view_name: &str, state: FeatureViewState) {
    debug!("Feature view {}: {}", view_name, state);
}
