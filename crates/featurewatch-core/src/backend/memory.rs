//! In-memory feature store backend
//!
//! Keeps entities, feature views and generated datasets per namespace behind
//! a `std::sync::Mutex`. A fresh store starts with the `PUBLIC` namespace in
//! use.
//!
//! ## Point-in-time joins
//!
//! `generate_dataset` attaches, for every spine row and every feature view,
//! the feature row with the same join keys whose timestamp is the latest one
//! not after the spine timestamp. Without timestamps on either side the latest
//! row for the key wins. Rows with no match get nulls.

use super::{
    DatasetRequest, FeatureStoreBackend, FeatureViewArtifact, NamespaceProvider,
    RegisteredFeatureView,
};
use crate::engine::memory::MemoryFrame;
use crate::engine::{Dataset, DatasetRef};
use crate::types::{Entity, FeatureValue, Field, Schema};
use crate::{recover_mutex, Error, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Namespace selected in a fresh store
pub const DEFAULT_NAMESPACE: &str = "PUBLIC";

#[derive(Debug, Clone)]
struct StoredView {
    handle: RegisteredFeatureView,
    data: MemoryFrame,
}

#[derive(Debug, Default)]
struct Namespace {
    entities: BTreeMap<String, Entity>,
    views: BTreeMap<(String, String), StoredView>,
    datasets: BTreeMap<String, MemoryFrame>,
}

#[derive(Debug)]
struct StoreState {
    current: Option<String>,
    namespaces: BTreeMap<String, Namespace>,
}

impl StoreState {
    fn current(&mut self) -> Result<&mut Namespace> {
        let name = self
            .current
            .clone()
            .ok_or_else(|| Error::engine("No namespace in use"))?;
        self.namespaces
            .get_mut(&name)
            .ok_or_else(|| Error::engine(format!("Namespace {} does not exist", name)))
    }
}

/// In-process registry and namespace provider
#[derive(Debug)]
pub struct MemoryFeatureStore {
    state: Mutex<StoreState>,
}

impl Default for MemoryFeatureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        let mut namespaces = BTreeMap::new();
        namespaces.insert(DEFAULT_NAMESPACE.to_string(), Namespace::default());
        Self {
            state: Mutex::new(StoreState {
                current: Some(DEFAULT_NAMESPACE.to_string()),
                namespaces,
            }),
        }
    }

    /// All namespaces, sorted
    pub fn namespaces(&self) -> Result<Vec<String>> {
        let state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        Ok(state.namespaces.keys().cloned().collect())
    }

    /// Entity registered in the current namespace
    pub fn entity(&self, name: &str) -> Result<Option<Entity>> {
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        Ok(state.current()?.entities.get(name).cloned())
    }

    /// `name/version` references of all views in the current namespace
    pub fn feature_views(&self) -> Result<Vec<String>> {
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        Ok(state
            .current()?
            .views
            .values()
            .map(|v| v.handle.reference())
            .collect())
    }

    /// Rows stored for a registered feature view
    pub fn feature_view_data(&self, name: &str, version: &str) -> Result<Option<MemoryFrame>> {
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        Ok(state
            .current()?
            .views
            .get(&(name.to_string(), version.to_string()))
            .map(|v| v.data.clone()))
    }

    /// A previously generated dataset
    pub fn dataset(&self, name: &str) -> Result<Option<MemoryFrame>> {
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        Ok(state.current()?.datasets.get(name).cloned())
    }
}

#[async_trait]
impl FeatureStoreBackend for MemoryFeatureStore {
    async fn register_entity(&self, entity: &Entity) -> Result<()> {
        if entity.join_keys.is_empty() {
            return Err(Error::engine(format!(
                "Entity {} must have at least one join key",
                entity.name
            )));
        }
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        state
            .current()?
            .entities
            .insert(entity.name.clone(), entity.clone());
        debug!("Registered entity: {}", entity.name);
        Ok(())
    }

    async fn set_tag(&self, entity: &str, key: &str, value: &str) -> Result<()> {
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        let stored = state
            .current()?
            .entities
            .get_mut(entity)
            .ok_or_else(|| Error::entity(format!("Entity {} is not registered", entity)))?;
        stored.tags.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn register_feature_view(
        &self,
        artifact: FeatureViewArtifact,
        version: &str,
        overwrite: bool,
    ) -> Result<RegisteredFeatureView> {
        let data = MemoryFrame::from_dataset(artifact.dataset.as_ref()).await?;
        let join_keys = artifact.join_keys();
        for key in &join_keys {
            if !data.schema_ref().contains(key) {
                return Err(Error::engine(format!(
                    "Join key {} is not a column of feature view {}",
                    key, artifact.name
                )));
            }
        }

        let feature_columns: Vec<String> = data
            .schema_ref()
            .names()
            .into_iter()
            .filter(|c| !join_keys.contains(c) && artifact.timestamp_col.as_ref() != Some(c))
            .collect();

        let handle = RegisteredFeatureView {
            name: artifact.name.clone(),
            version: version.to_string(),
            entities: artifact.entities.clone(),
            feature_columns,
            timestamp_col: artifact.timestamp_col.clone(),
            description: artifact.description.clone(),
            refresh_freq: artifact.refresh_freq.clone(),
            refresh_mode: artifact.refresh_mode,
            feature_descriptions: artifact.feature_descriptions.clone(),
            created_at: Utc::now(),
        };

        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        let namespace = state.current()?;
        for entity in &artifact.entities {
            if !namespace.entities.contains_key(&entity.name) {
                return Err(Error::entity(format!(
                    "Entity {} is not registered",
                    entity.name
                )));
            }
        }

        let key = (artifact.name.clone(), version.to_string());
        if !overwrite && namespace.views.contains_key(&key) {
            return Err(Error::feature_view(format!(
                "Feature view {}/{} already exists",
                artifact.name, version
            )));
        }
        namespace.views.insert(
            key,
            StoredView {
                handle: handle.clone(),
                data,
            },
        );

        debug!("Registered feature view: {}", handle.reference());
        Ok(handle)
    }

    async fn get_feature_view(&self, name: &str, version: &str) -> Result<RegisteredFeatureView> {
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        state
            .current()?
            .views
            .get(&(name.to_string(), version.to_string()))
            .map(|v| v.handle.clone())
            .ok_or_else(|| {
                Error::feature_view(format!("Feature view {}/{} not found", name, version))
            })
    }

    async fn generate_dataset(&self, request: DatasetRequest) -> Result<DatasetRef> {
        let spine = MemoryFrame::from_dataset(request.spine.as_ref()).await?;

        let views: Vec<StoredView> = {
            let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
            let namespace = state.current()?;
            if namespace.datasets.contains_key(&request.name) {
                return Err(Error::engine(format!(
                    "Dataset {} already exists",
                    request.name
                )));
            }
            request
                .feature_views
                .iter()
                .map(|fv| {
                    namespace
                        .views
                        .get(&(fv.name.clone(), fv.version.clone()))
                        .cloned()
                        .ok_or_else(|| {
                            Error::feature_view(format!(
                                "Feature view {} not found",
                                fv.reference()
                            ))
                        })
                })
                .collect::<Result<_>>()?
        };

        for label in &request.label_cols {
            if spine.column(label).is_none() {
                return Err(Error::engine(format!(
                    "Label column {} is not a column of the spine",
                    label
                )));
            }
        }
        let spine_times = match &request.spine_timestamp_col {
            Some(col) => Some(timestamps(&spine, col)?),
            None => None,
        };

        let mut fields = spine.schema_ref().fields.clone();
        let mut columns: Vec<Vec<FeatureValue>> = spine
            .schema_ref()
            .names()
            .iter()
            .map(|name| spine.column(name).map(<[FeatureValue]>::to_vec).unwrap_or_default())
            .collect();

        for view in &views {
            let joined = point_in_time_join(&spine, spine_times.as_deref(), view)?;
            for (name, values) in joined {
                let data_type = view
                    .data
                    .schema_ref()
                    .field(&name)
                    .map(|f| f.data_type)
                    .ok_or_else(|| Error::engine(format!("Column not found: {}", name)))?;
                let output = if fields.iter().any(|f| f.name == name) {
                    format!("{}_{}", view.handle.name, name)
                } else {
                    name
                };
                fields.push(Field::new(output, data_type));
                columns.push(values);
            }
        }

        let frame = MemoryFrame::new(Schema::new(fields), columns)?;
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        state
            .current()?
            .datasets
            .insert(request.name.clone(), frame.clone());

        debug!(
            "Generated dataset {} with {} rows",
            request.name,
            frame.num_rows()
        );
        Ok(Arc::new(frame))
    }
}

#[async_trait]
impl NamespaceProvider for MemoryFeatureStore {
    async fn current_namespace(&self) -> Result<Option<String>> {
        let state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        Ok(state.current.clone())
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        if state.namespaces.contains_key(name) {
            return Err(Error::engine(format!("Namespace {} already exists", name)));
        }
        state
            .namespaces
            .insert(name.to_string(), Namespace::default());
        Ok(())
    }

    async fn use_namespace(&self, name: &str) -> Result<()> {
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        if !state.namespaces.contains_key(name) {
            return Err(Error::engine(format!("Namespace {} does not exist", name)));
        }
        state.current = Some(name.to_string());
        Ok(())
    }

    async fn drop_namespace(&self, name: &str) -> Result<()> {
        let mut state = recover_mutex(&self.state, "MemoryFeatureStore")?;
        if state.namespaces.remove(name).is_none() {
            return Err(Error::engine(format!("Namespace {} does not exist", name)));
        }
        if state.current.as_deref() == Some(name) {
            state.current = None;
        }
        Ok(())
    }
}

fn timestamps(frame: &MemoryFrame, column: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    let values = frame
        .column(column)
        .ok_or_else(|| Error::engine(format!("Timestamp column {} not found", column)))?;
    Ok(values.iter().map(FeatureValue::as_datetime).collect())
}

fn row_key(frame: &MemoryFrame, keys: &[String], row: usize) -> Result<String> {
    keys.iter()
        .map(|k| {
            frame
                .column(k)
                .map(|col| col[row].group_key())
                .ok_or_else(|| Error::engine(format!("Join key {} not found", k)))
        })
        .collect::<Result<Vec<_>>>()
        .map(|parts| parts.join("\u{1}"))
}

/// Feature columns of `view` aligned to the spine rows
fn point_in_time_join(
    spine: &MemoryFrame,
    spine_times: Option<&[Option<NaiveDateTime>]>,
    view: &StoredView,
) -> Result<Vec<(String, Vec<FeatureValue>)>> {
    let keys = view.handle.join_keys();
    let data = &view.data;
    let view_times = match &view.handle.timestamp_col {
        Some(col) => Some(timestamps(data, col)?),
        None => None,
    };

    // key -> feature rows, ascending by timestamp
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for row in 0..data.num_rows() {
        index.entry(row_key(data, &keys, row)?).or_default().push(row);
    }
    if let Some(times) = &view_times {
        for rows in index.values_mut() {
            rows.sort_by_key(|&r| times[r]);
        }
    }

    let mut matches = Vec::with_capacity(spine.num_rows());
    for row in 0..spine.num_rows() {
        let candidates = index.get(&row_key(spine, &keys, row)?);
        let chosen = candidates.and_then(|rows| {
            match (spine_times.and_then(|t| t[row]), &view_times) {
                (Some(as_of), Some(times)) => rows
                    .iter()
                    .rev()
                    .find(|&&r| times[r].map_or(false, |ts| ts <= as_of))
                    .copied(),
                _ => rows.last().copied(),
            }
        });
        matches.push(chosen);
    }

    view.handle
        .feature_columns
        .iter()
        .map(|name| {
            let column = data
                .column(name)
                .ok_or_else(|| Error::engine(format!("Column not found: {}", name)))?;
            let values = matches
                .iter()
                .map(|m| m.map(|r| column[r].clone()).unwrap_or(FeatureValue::Null))
                .collect();
            Ok((name.clone(), values))
        })
        .collect()
}
