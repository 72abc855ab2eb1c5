//! Feature store backend abstraction
//!
//! The manager never persists anything itself. Entities, registered feature
//! views and generated training datasets live in an external registry reached
//! through [`FeatureStoreBackend`]; working namespaces are provisioned through
//! [`NamespaceProvider`].
//!
//! [`memory::MemoryFeatureStore`] implements both traits in-process.

use crate::config::{RefreshFrequency, RefreshMode};
use crate::engine::DatasetRef;
use crate::types::Entity;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod memory;

/// Everything the registry needs to persist a feature view
///
/// Produced by [`crate::FeatureViewBuilder::build`] only after every monitored
/// feature passed validation.
#[derive(Debug, Clone)]
pub struct FeatureViewArtifact {
    pub name: String,
    pub entities: Vec<Entity>,
    pub dataset: DatasetRef,
    pub refresh_freq: RefreshFrequency,
    pub refresh_mode: RefreshMode,
    pub timestamp_col: Option<String>,
    pub description: String,
    /// Per-feature description metadata
    pub feature_descriptions: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

impl FeatureViewArtifact {
    /// Join keys of all entities, in entity order
    pub fn join_keys(&self) -> Vec<String> {
        self.entities
            .iter()
            .flat_map(|e| e.join_keys.iter().cloned())
            .collect()
    }
}

/// Handle to a feature view persisted in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredFeatureView {
    pub name: String,
    pub version: String,
    pub entities: Vec<Entity>,
    /// Dataset columns other than join keys and the timestamp column
    pub feature_columns: Vec<String>,
    pub timestamp_col: Option<String>,
    pub description: String,
    pub refresh_freq: RefreshFrequency,
    pub refresh_mode: RefreshMode,
    pub feature_descriptions: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl RegisteredFeatureView {
    pub fn join_keys(&self) -> Vec<String> {
        self.entities
            .iter()
            .flat_map(|e| e.join_keys.iter().cloned())
            .collect()
    }

    /// `name/version` reference string
    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Request for a point-in-time correct training/inference dataset
#[derive(Debug, Clone)]
pub struct DatasetRequest {
    pub name: String,
    /// Keys (and optionally timestamps and labels) to join features onto
    pub spine: DatasetRef,
    pub feature_views: Vec<RegisteredFeatureView>,
    /// Spine columns carried through as labels
    pub label_cols: Vec<String>,
    pub spine_timestamp_col: Option<String>,
}

/// External entity/feature-view registry and dataset generator
///
/// Implementations report failures as [`crate::Error::Engine`] (or a more
/// specific kind when one applies); the manager wraps them before returning.
#[async_trait]
pub trait FeatureStoreBackend: Send + Sync {
    /// Register (or re-register) an entity
    async fn register_entity(&self, entity: &Entity) -> Result<()>;

    /// Attach a tag to a registered entity
    async fn set_tag(&self, entity: &str, key: &str, value: &str) -> Result<()>;

    /// Persist a feature view under `version`
    ///
    /// With `overwrite = false`, registering an existing name/version fails.
    async fn register_feature_view(
        &self,
        artifact: FeatureViewArtifact,
        version: &str,
        overwrite: bool,
    ) -> Result<RegisteredFeatureView>;

    /// Look up a registered feature view
    async fn get_feature_view(&self, name: &str, version: &str) -> Result<RegisteredFeatureView>;

    /// Join features onto a spine and materialize the result under `request.name`
    async fn generate_dataset(&self, request: DatasetRequest) -> Result<DatasetRef>;
}

/// Working-namespace (schema) management
#[async_trait]
pub trait NamespaceProvider: Send + Sync {
    /// Namespace currently in use, if any
    async fn current_namespace(&self) -> Result<Option<String>>;

    async fn create_namespace(&self, name: &str) -> Result<()>;

    async fn use_namespace(&self, name: &str) -> Result<()>;

    async fn drop_namespace(&self, name: &str) -> Result<()>;
}
