//! Feature view builder
//!
//! Validates a dataset against a [`FeatureViewConfig`] and produces the
//! [`FeatureViewArtifact`] handed to the registry. `build` either returns a
//! complete artifact or an error; nothing reaches the registry from a failed
//! build.
//!
//! ## Build Steps
//!
//! 1. Every monitored feature: compute stats, check its rules, keep the stats
//!    as that feature's baseline
//! 2. Timestamp column: must exist; a non-temporal column is cast to `DATE`
//!    (a failed cast is logged and the original column kept)
//! 3. Assemble the artifact with per-feature descriptions
//!
//! Only configured features that are columns of the dataset are monitored.

use crate::backend::FeatureViewArtifact;
use crate::config::FeatureViewConfig;
use crate::engine::{require_schema, DatasetRef};
use crate::expr::Expr;
use crate::monitor::{FeatureMonitor, FeatureStats};
use crate::observability;
use crate::types::{DataType, Entity};
use crate::validation::FeatureRules;
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Builds a registrable feature view from a config and a dataset
#[derive(Debug)]
pub struct FeatureViewBuilder {
    config: FeatureViewConfig,
    dataset: DatasetRef,
    entities: Vec<Entity>,
    monitors: BTreeMap<String, FeatureMonitor>,
}

impl FeatureViewBuilder {
    /// Create a builder monitoring every configured feature present in `dataset`
    ///
    /// Detailed statistics are collected when `collect_stats` is set or when a
    /// feature's rules need them (range or uniqueness checks).
    pub fn new(
        config: FeatureViewConfig,
        dataset: DatasetRef,
        entities: impl IntoIterator<Item = Entity>,
        collect_stats: bool,
    ) -> Self {
        let columns = dataset.columns();
        let monitors = config
            .features
            .iter()
            .filter(|(name, _)| columns.contains(name))
            .map(|(name, feature)| {
                let detailed = collect_stats
                    || FeatureRules::from_config(name.as_str(), &feature.validation)
                        .needs_detailed_stats();
                (name.clone(), FeatureMonitor::new(feature.clone(), detailed))
            })
            .collect::<BTreeMap<_, _>>();

        let unmonitored: Vec<&String> = config
            .features
            .keys()
            .filter(|name| !monitors.contains_key(*name))
            .collect();
        if !unmonitored.is_empty() {
            debug!(
                "Feature view {}: features not in dataset, not monitored: {:?}",
                config.name, unmonitored
            );
        }

        Self {
            config,
            dataset,
            entities: entities.into_iter().collect(),
            monitors,
        }
    }

    pub fn config(&self) -> &FeatureViewConfig {
        &self.config
    }

    /// Monitors by feature name; baselines are set after a successful build
    pub fn monitors(&self) -> &BTreeMap<String, FeatureMonitor> {
        &self.monitors
    }

    /// Baseline stats of every monitored feature that has one
    pub fn baselines(&self) -> BTreeMap<String, FeatureStats> {
        self.monitors
            .iter()
            .filter_map(|(name, m)| m.baseline().map(|b| (name.clone(), b.clone())))
            .collect()
    }

    /// Validate and assemble the artifact
    pub async fn build(&mut self) -> Result<FeatureViewArtifact> {
        require_schema(self.dataset.as_ref())?;
        if self.entities.is_empty() {
            return Err(Error::validation(format!(
                "Feature view {} requires at least one entity",
                self.config.name
            )));
        }

        // 1. Validate monitored features
        for (name, monitor) in self.monitors.iter_mut() {
            let stats = monitor.compute_stats(self.dataset.as_ref(), name).await?;
            let rules = FeatureRules::from_config(name.as_str(), &monitor.config().validation);
            if let Err(e) = rules.validate(&stats) {
                observability::increment_validation_failures();
                error!("Feature view {}: {}", self.config.name, e.message());
                return Err(e);
            }
            monitor.set_baseline(stats);
        }

        // 2. Timestamp column
        let dataset = self.normalize_timestamp().await?;

        // 3. Artifact
        let feature_descriptions = self
            .monitors
            .iter()
            .map(|(name, m)| (name.clone(), m.config().description.clone()))
            .collect();

        let artifact = FeatureViewArtifact {
            name: self.config.name.clone(),
            entities: self.entities.clone(),
            dataset,
            refresh_freq: self.config.refresh.frequency.clone(),
            refresh_mode: self.config.refresh.mode,
            timestamp_col: self.config.timestamp_col.clone(),
            description: self
                .config
                .description
                .clone()
                .unwrap_or_else(|| format!("Feature view {}", self.config.name)),
            feature_descriptions,
            tags: self.config.tags.clone(),
        };

        info!(
            "Built feature view {} ({} monitored features)",
            artifact.name,
            self.monitors.len()
        );
        Ok(artifact)
    }

    async fn normalize_timestamp(&self) -> Result<DatasetRef> {
        let Some(column) = &self.config.timestamp_col else {
            return Ok(self.dataset.clone());
        };

        let schema = require_schema(self.dataset.as_ref())?;
        let field = schema.field(column).ok_or_else(|| {
            Error::validation(format!(
                "Timestamp column {} not found in dataset for feature view {}",
                column, self.config.name
            ))
        })?;

        if field.data_type.is_temporal() {
            return Ok(self.dataset.clone());
        }

        warn!(
            "Timestamp column {} has type {}, casting to DATE",
            column, field.data_type
        );
        let cast = self
            .dataset
            .with_columns(vec![(
                column.clone(),
                Expr::cast(Expr::column(column), DataType::Date),
            )])
            .await;
        match cast {
            Ok(dataset) => Ok(dataset),
            Err(e) => {
                warn!("Could not cast timestamp column {}: {}", column, e);
                Ok(self.dataset.clone())
            }
        }
    }
}
