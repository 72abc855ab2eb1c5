//! Transform pipeline
//!
//! Ordered, named data-shaping steps applied to a source dataset before it
//! becomes a feature view's content. Transforms are plain serde values, so a
//! pipeline can be declared in YAML next to the feature view config:
//!
//! ```yaml
//! transforms:
//!   - kind: fill_na
//!     columns: [SESSION_LENGTH]
//!     fill_value: 0
//!   - kind: moving_agg
//!     columns: [SESSION_LENGTH, TRANSACTIONS]
//!     window_sizes: [7]
//!     agg_funcs: [AVG, SUM]
//!     partition_by: [CUSTOMER_ID]
//!     order_by: [DATE]
//!     config:
//!       name: customer_metrics
//!       expected_types: [DECIMAL, DOUBLE, NUMBER]
//! ```
//!
//! `moving_agg` names its outputs `{FUNC}_{COLUMN}_{WINDOW}`, e.g.
//! `AVG_SESSION_LENGTH_7`.

use crate::engine::{require_schema, DatasetRef};
use crate::expr::{AggKind, DateUnit, Expr, Predicate, WindowSpec};
use crate::types::FeatureValue;
use crate::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Input checks run before a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    pub name: String,

    /// Maximum null ratio allowed in each input column
    #[serde(default = "default_null_threshold")]
    pub null_threshold: f64,

    /// Accepted type names for input columns (`DOUBLE`, `NUMBER`, ...)
    #[serde(default)]
    pub expected_types: Option<Vec<String>>,
}

fn default_null_threshold() -> f64 {
    0.1
}

impl TransformConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            null_threshold: default_null_threshold(),
            expected_types: None,
        }
    }

    pub fn with_null_threshold(mut self, threshold: f64) -> Self {
        self.null_threshold = threshold;
        self
    }

    pub fn with_expected_types(mut self, types: &[&str]) -> Self {
        self.expected_types = Some(types.iter().map(|t| t.to_string()).collect());
        self
    }
}

/// Reference point of a date difference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateReference {
    #[default]
    CurrentDate,
    Column(String),
}

/// What a transform does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformStep {
    /// Replace nulls in `columns` with `fill_value`
    FillNa {
        columns: Vec<String>,
        fill_value: FeatureValue,
    },

    /// Trailing-window aggregates for every column × window × function
    MovingAgg {
        columns: Vec<String>,
        window_sizes: Vec<usize>,
        agg_funcs: Vec<AggKind>,
        #[serde(default)]
        partition_by: Vec<String>,
        #[serde(default)]
        order_by: Vec<String>,
    },

    /// Whole units between `column` and `reference`
    DateDiff {
        column: String,
        #[serde(default)]
        reference: DateReference,
        #[serde(default = "default_unit")]
        unit: DateUnit,
        /// Defaults to `{UNIT}_SINCE_{COLUMN}`
        #[serde(default)]
        output: Option<String>,
    },
}

fn default_unit() -> DateUnit {
    DateUnit::Day
}

/// A named step with optional input checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    #[serde(flatten)]
    pub step: TransformStep,
    #[serde(default)]
    pub config: Option<TransformConfig>,
}

impl Transform {
    pub fn new(name: impl Into<String>, step: TransformStep) -> Self {
        Self {
            name: name.into(),
            step,
            config: None,
        }
    }

    /// Fill nulls in `columns` with `fill_value`
    pub fn fill_na<V: Into<FeatureValue>>(columns: &[&str], fill_value: V) -> Self {
        Self::new(
            "fill_na",
            TransformStep::FillNa {
                columns: to_strings(columns),
                fill_value: fill_value.into(),
            },
        )
    }

    /// Moving aggregates over trailing windows
    pub fn moving_agg(
        columns: &[&str],
        window_sizes: &[usize],
        agg_funcs: &[AggKind],
        partition_by: &[&str],
        order_by: &[&str],
    ) -> Self {
        Self::new(
            "moving_agg",
            TransformStep::MovingAgg {
                columns: to_strings(columns),
                window_sizes: window_sizes.to_vec(),
                agg_funcs: agg_funcs.to_vec(),
                partition_by: to_strings(partition_by),
                order_by: to_strings(order_by),
            },
        )
    }

    /// Units elapsed from `column` to `reference`
    pub fn date_diff(column: &str, reference: DateReference, unit: DateUnit) -> Self {
        Self::new(
            "date_diff",
            TransformStep::DateDiff {
                column: column.to_string(),
                reference,
                unit,
                output: None,
            },
        )
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: TransformConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Columns the step reads (and the config checks)
    pub fn input_columns(&self) -> Vec<String> {
        match &self.step {
            TransformStep::FillNa { columns, .. } | TransformStep::MovingAgg { columns, .. } => {
                columns.clone()
            }
            TransformStep::DateDiff {
                column, reference, ..
            } => match reference {
                DateReference::Column(other) => vec![column.clone(), other.clone()],
                DateReference::CurrentDate => vec![column.clone()],
            },
        }
    }

    /// Columns the step writes
    pub fn output_columns(&self) -> Vec<String> {
        match &self.step {
            TransformStep::FillNa { columns, .. } => columns.clone(),
            TransformStep::MovingAgg {
                columns,
                window_sizes,
                agg_funcs,
                ..
            } => columns
                .iter()
                .flat_map(|col| {
                    window_sizes.iter().flat_map(move |window| {
                        agg_funcs
                            .iter()
                            .map(move |func| moving_agg_name(*func, col, *window))
                    })
                })
                .collect(),
            TransformStep::DateDiff {
                column,
                unit,
                output,
                ..
            } => vec![output
                .clone()
                .unwrap_or_else(|| format!("{}_SINCE_{}", unit, column))],
        }
    }

    /// Run the config checks, then the step
    pub async fn apply(&self, dataset: DatasetRef) -> Result<DatasetRef> {
        if let Some(config) = &self.config {
            self.check_inputs(&dataset, config).await?;
        }

        let columns = self.expressions()?;
        debug!(
            "Applying transform {} -> {:?}",
            self.name,
            columns.iter().map(|(name, _)| name).collect::<Vec<_>>()
        );
        dataset.with_columns(columns).await
    }

    fn expressions(&self) -> Result<Vec<(String, Expr)>> {
        let outputs = self.output_columns();
        let exprs = match &self.step {
            TransformStep::FillNa {
                columns,
                fill_value,
            } => columns
                .iter()
                .map(|col| {
                    Expr::coalesce(vec![Expr::column(col), Expr::Literal(fill_value.clone())])
                })
                .collect::<Vec<_>>(),
            TransformStep::MovingAgg {
                columns,
                window_sizes,
                agg_funcs,
                partition_by,
                order_by,
            } => {
                if window_sizes.contains(&0) {
                    return Err(Error::configuration(format!(
                        "Transform {}: window sizes must be positive",
                        self.name
                    )));
                }
                columns
                    .iter()
                    .flat_map(|col| {
                        window_sizes.iter().flat_map(move |window| {
                            agg_funcs.iter().map(move |func| {
                                Expr::window(
                                    func.on(col),
                                    WindowSpec::trailing(
                                        *window,
                                        partition_by.clone(),
                                        order_by.clone(),
                                    ),
                                )
                            })
                        })
                    })
                    .collect()
            }
            TransformStep::DateDiff {
                column,
                reference,
                unit,
                ..
            } => {
                let end = match reference {
                    DateReference::CurrentDate => Expr::CurrentDate,
                    DateReference::Column(other) => Expr::column(other),
                };
                vec![Expr::date_diff(*unit, Expr::column(column), end)]
            }
        };
        Ok(outputs.into_iter().zip(exprs).collect())
    }

    async fn check_inputs(&self, dataset: &DatasetRef, config: &TransformConfig) -> Result<()> {
        let schema = require_schema(dataset.as_ref())?;
        let row_count = dataset.count().await?;

        for column in self.input_columns() {
            let field = schema.field(&column).ok_or_else(|| {
                Error::validation(format!(
                    "Transform {}: column {} not found",
                    config.name, column
                ))
            })?;

            if let Some(expected) = &config.expected_types {
                if !expected.iter().any(|t| field.data_type.matches_name(t)) {
                    return Err(Error::validation(format!(
                        "Transform {}: column {} has type {}, expected one of {:?}",
                        config.name, column, field.data_type, expected
                    )));
                }
            }

            if row_count > 0 {
                let nulls = dataset
                    .filter(&Predicate::IsNull(column.clone()))
                    .await?
                    .count()
                    .await?;
                let ratio = nulls as f64 / row_count as f64;
                if ratio > config.null_threshold {
                    return Err(Error::validation(format!(
                        "Transform {}: column {} has {:.1}% null values, exceeding threshold of {:.1}%",
                        config.name,
                        column,
                        ratio * 100.0,
                        config.null_threshold * 100.0
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Output name of a moving aggregate, e.g. `AVG_SESSION_LENGTH_7`
pub fn moving_agg_name(func: AggKind, column: &str, window: usize) -> String {
    format!("{}_{}_{}", func, column, window)
}

/// Apply transforms in order
///
/// Configuration and validation errors pass through; anything else is
/// reported as an engine error naming the failed transform.
pub async fn apply_transforms(dataset: DatasetRef, transforms: &[Transform]) -> Result<DatasetRef> {
    let mut current = dataset;
    for transform in transforms {
        current = transform.apply(current).await.map_err(|e| match e.kind() {
            ErrorKind::Configuration | ErrorKind::Validation => e,
            _ => Error::engine(format!("Transform {} failed: {}", transform.name, e.message())),
        })?;
    }
    if !transforms.is_empty() {
        info!("Applied {} transforms", transforms.len());
    }
    Ok(current)
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryFrame;
    use crate::engine::Dataset;
    use crate::types::DataType;
    use chrono::NaiveDate;

    fn sessions() -> DatasetRef {
        let dates: Vec<NaiveDate> = (1..=4)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        MemoryFrame::builder()
            .column("CUSTOMER_ID", DataType::String, vec!["c1"; 4])
            .column("DATE", DataType::Date, dates)
            .column(
                "SESSION_LENGTH",
                DataType::Float,
                vec![Some(10.0), None, Some(30.0), Some(40.0)],
            )
            .column("TRANSACTIONS", DataType::Int, vec![1i64, 2, 3, 4])
            .build()
            .unwrap()
            .into_ref()
    }

    fn pipeline() -> Vec<Transform> {
        vec![
            Transform::fill_na(&["SESSION_LENGTH"], 0i64),
            Transform::moving_agg(
                &["SESSION_LENGTH", "TRANSACTIONS"],
                &[2],
                &[AggKind::Avg, AggKind::Sum],
                &["CUSTOMER_ID"],
                &["DATE"],
            )
            .with_config(
                TransformConfig::new("customer_metrics")
                    .with_expected_types(&["DECIMAL", "DOUBLE", "NUMBER"]),
            ),
        ]
    }

    #[test]
    fn test_moving_agg_output_names() {
        let transform = &pipeline()[1];
        assert_eq!(
            transform.output_columns(),
            vec![
                "AVG_SESSION_LENGTH_2",
                "SUM_SESSION_LENGTH_2",
                "AVG_TRANSACTIONS_2",
                "SUM_TRANSACTIONS_2"
            ]
        );
    }

    #[tokio::test]
    async fn test_fill_then_moving_agg() {
        let out = apply_transforms(sessions(), &pipeline()).await.unwrap();
        let frame = MemoryFrame::from_dataset(out.as_ref()).await.unwrap();

        assert_eq!(frame.column("SESSION_LENGTH").unwrap()[1], FeatureValue::Float(0.0));
        let avg = frame.column("AVG_SESSION_LENGTH_2").unwrap();
        assert_eq!(avg[0], FeatureValue::Float(10.0));
        assert_eq!(avg[1], FeatureValue::Float(5.0));
        assert_eq!(avg[2], FeatureValue::Float(15.0));
        let sum = frame.column("SUM_TRANSACTIONS_2").unwrap();
        assert_eq!(sum[3], FeatureValue::Int(7));
    }

    #[tokio::test]
    async fn test_config_rejects_nulls_before_fill() {
        // moving_agg alone sees the raw 25% nulls
        let transforms = vec![pipeline().remove(1)];
        let err = apply_transforms(sessions(), &transforms).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.message().contains("customer_metrics"));
    }

    #[tokio::test]
    async fn test_config_rejects_unexpected_types() {
        let transform = Transform::fill_na(&["CUSTOMER_ID"], "unknown")
            .with_config(TransformConfig::new("ids").with_expected_types(&["NUMBER"]));
        let err = transform.apply(sessions()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_missing_column_is_engine_error() {
        let transforms = vec![Transform::fill_na(&["NOPE"], 0i64)];
        let err = apply_transforms(sessions(), &transforms).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert!(err.message().contains("Transform fill_na failed"));
    }

    #[tokio::test]
    async fn test_date_diff_between_columns() {
        let frame = MemoryFrame::builder()
            .column(
                "SIGNUP_DATE",
                DataType::Date,
                vec![NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()],
            )
            .column(
                "LAST_SEEN",
                DataType::Date,
                vec![NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()],
            )
            .build()
            .unwrap();
        let transform = Transform::date_diff(
            "SIGNUP_DATE",
            DateReference::Column("LAST_SEEN".into()),
            DateUnit::Day,
        );
        assert_eq!(transform.output_columns(), vec!["DAYS_SINCE_SIGNUP_DATE"]);

        let out = transform.apply(frame.into_ref()).await.unwrap();
        let rows = out.collect().await.unwrap();
        assert_eq!(rows[0][2], FeatureValue::Int(10));
    }

    #[test]
    fn test_yaml_declaration() {
        let yaml = r#"
- name: fill_sessions
  kind: fill_na
  columns: [SESSION_LENGTH]
  fill_value: 0
- name: rolling
  kind: moving_agg
  columns: [TRANSACTIONS]
  window_sizes: [7, 30]
  agg_funcs: [SUM]
  partition_by: [CUSTOMER_ID]
  order_by: [DATE]
  config:
    name: customer_metrics
    expected_types: [NUMBER]
- name: tenure
  kind: date_diff
  column: SIGNUP_DATE
"#;
        let transforms: Vec<Transform> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(transforms.len(), 3);
        assert_eq!(
            transforms[1].output_columns(),
            vec!["SUM_TRANSACTIONS_7", "SUM_TRANSACTIONS_30"]
        );
        assert_eq!(
            transforms[2].step,
            TransformStep::DateDiff {
                column: "SIGNUP_DATE".to_string(),
                reference: DateReference::CurrentDate,
                unit: DateUnit::Day,
                output: None,
            }
        );
        assert_eq!(transforms[1].config.as_ref().unwrap().null_threshold, 0.1);
    }
}
