//! # FeatureWatch Core Library
//!
//! Feature-view registration with validation gates, statistics monitoring,
//! drift detection and dependency tracking.
//!
//! ## Key Components
//!
//! - **FeatureStoreManager**: entity and feature-view lifecycle, drift checks,
//!   dependency queries, training datasets
//! - **FeatureViewBuilder**: validates a dataset against a config before
//!   anything is registered
//! - **FeatureMonitor**: per-feature statistics and drift metrics
//! - **DependencyGraph**: which views a view depends on through its features
//! - **Dataset / FeatureStoreBackend**: the analytical engine and registry the
//!   manager talks to, with in-memory implementations
//! - **FeatureStoreSession**: a manager bound to a throwaway namespace
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use featurewatch_core::prelude::*;
//!
//! let store = Arc::new(MemoryFeatureStore::new());
//! let mut manager = FeatureStoreManager::new(store, ManagerOptions::default())?;
//! manager.add_entity(Entity::new("CUSTOMER", vec!["CUSTOMER_ID".into()])).await?;
//! let view = manager
//!     .add_feature_view(config, dataset, "CUSTOMER", &transforms, true)
//!     .await?;
//! ```

pub use backend::{
    DatasetRequest, FeatureStoreBackend, FeatureViewArtifact, NamespaceProvider,
    RegisteredFeatureView,
};
pub use builder::FeatureViewBuilder;
pub use callback::{FeatureStoreCallback, JsonFileSink, MetricsCallback, MetricsSink};
pub use config::{
    create_feature_view_name, create_version, FeatureConfig, FeatureValidationConfig,
    FeatureViewConfig, RefreshConfig, RefreshFrequency, RefreshMode, TimeUnit,
};
pub use dependency::{DependencyGraph, DependencyNode};
pub use engine::{Dataset, DatasetRef};
pub use error::{Error, ErrorKind, Result};
pub use manager::{
    FeatureStoreManager, FeatureViewRef, FeatureViewState, GetFeaturesOptions, ManagerOptions,
    DRIFT_THRESHOLD,
};
pub use monitor::{compare_stats, DriftMetrics, FeatureMonitor, FeatureStats};
pub use session::{with_session, FeatureStoreSession, SessionOptions};
pub use transform::{apply_transforms, DateReference, Transform, TransformConfig, TransformStep};
pub use types::{DataType, Entity, FeatureValue, Field, Schema};

pub mod backend;
pub mod builder;
pub mod callback;
pub mod config;
pub mod dependency;
pub mod engine;
mod error;
pub mod expr;
pub mod manager;
pub mod monitor;
pub mod observability;
pub mod session;
pub mod transform;
pub mod types;
pub mod validation;

use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Lock a mutex, recovering the guard if a previous holder panicked
pub(crate) fn recover_mutex<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    match mutex.lock() {
        Ok(guard) => Ok(guard),
        Err(poisoned) => {
            warn!("{} lock was poisoned, recovering", name);
            Ok(poisoned.into_inner())
        }
    }
}

// Users can do `use featurewatch_core::prelude::*` to get everything they need
pub mod prelude {
    pub use crate::backend::memory::MemoryFeatureStore;
    pub use crate::backend::{FeatureStoreBackend, NamespaceProvider, RegisteredFeatureView};
    pub use crate::config::{
        FeatureConfig, FeatureValidationConfig, FeatureViewConfig, RefreshConfig, RefreshMode,
    };
    pub use crate::engine::memory::MemoryFrame;
    pub use crate::engine::{Dataset, DatasetRef};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::expr::{AggKind, DateUnit};
    pub use crate::manager::{
        FeatureStoreManager, FeatureViewRef, GetFeaturesOptions, ManagerOptions,
    };
    pub use crate::monitor::{DriftMetrics, FeatureStats};
    pub use crate::session::{with_session, FeatureStoreSession, SessionOptions};
    pub use crate::transform::{DateReference, Transform, TransformConfig};
    pub use crate::types::{DataType, Entity, FeatureValue};
    pub use std::sync::Arc;
}
