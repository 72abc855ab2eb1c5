//! CLI command implementations

pub mod drift;
pub mod profile;
pub mod validate;

use anyhow::{Context, Result};
use featurewatch_core::engine::memory::MemoryFrame;
use featurewatch_core::{DatasetRef, Entity, FeatureViewConfig, Transform};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A feature view definition file
///
/// The view config sits at the top level, next to the transforms that
/// produce its columns and the join keys of its entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDefinition {
    #[serde(flatten)]
    pub view: FeatureViewConfig,

    #[serde(default)]
    pub transforms: Vec<Transform>,

    /// Join keys of `view.entity`
    #[serde(default)]
    pub join_keys: Vec<String>,
}

impl ViewDefinition {
    /// The entity the view is keyed on
    pub fn entity(&self) -> Entity {
        Entity::new(self.view.entity.clone(), self.join_keys.clone())
    }
}

/// Load and validate a definition file
pub fn load_definition(path: &str) -> Result<ViewDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definition file: {}", path))?;
    parse_definition(&content).with_context(|| format!("Invalid definition file: {}", path))
}

fn parse_definition(content: &str) -> Result<ViewDefinition> {
    let definition: ViewDefinition = serde_yaml::from_str(content)?;
    definition.view.validate()?;
    if definition.join_keys.is_empty() {
        anyhow::bail!(
            "Entity {} needs at least one join key",
            definition.view.entity
        );
    }
    Ok(definition)
}

/// Load a JSON array of records as an in-memory dataset
pub fn load_records(path: impl AsRef<Path>) -> Result<DatasetRef> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file: {}", path.display()))?;
    let frame = MemoryFrame::from_json_str(&content)
        .with_context(|| format!("Failed to load records from {}", path.display()))?;
    Ok(frame.into_ref())
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const DEFINITION: &str = r#"
name: customer_behavior
domain: RETAIL
entity: CUSTOMER
feature_type: BEHAVIOR
major_version: 2
minor_version: 1
refresh:
  frequency: 1 day
  mode: INCREMENTAL
timestamp_col: SESSION_DATE
join_keys: [CUSTOMER_ID]
transforms:
  - name: fill_transactions
    kind: fill_na
    columns: [TRANSACTIONS]
    fill_value: 0
features:
  TRANSACTIONS:
    name: TRANSACTIONS
    description: Transactions per session
    validation:
      null_threshold: 0.2
      range_check: true
      min_value: 0
  CHANNEL:
    name: CHANNEL
    description: Acquisition channel
    dependencies: [FV_MARKETING.CHANNEL]
"#;
}
