//! Dataset abstraction
//!
//! This module defines the `Dataset` trait, the handle through which the
//! monitor, the transform pipeline and the builder talk to whatever engine
//! holds the actual rows.
//!
//! ## Design Philosophy
//!
//! The trait only carries what feature monitoring needs:
//! - A declared schema (column names and types)
//! - `IS NULL` / `IS NOT NULL` filtering and projection
//! - Aggregations over named columns
//! - Adding derived columns from an [`Expr`]
//!
//! Everything is async because a real engine answers over the network.
//! [`memory::MemoryFrame`] is the in-process implementation used by the CLI
//! and the test-suite.

use crate::expr::{AggExpr, Expr, Predicate};
use crate::types::{FeatureValue, Schema};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub mod memory;

/// Shared handle to a dataset
pub type DatasetRef = Arc<dyn Dataset>;

/// A tabular dataset living in some analytical engine
///
/// Implementations report their own failures as [`Error::Engine`].
///
/// ## Example Implementation
///
/// ```rust,ignore
/// #[async_trait]
/// impl Dataset for RemoteTable {
///     fn schema(&self) -> Option<&Schema> {
///         Some(&self.schema)
///     }
///
///     async fn aggregate(&self, aggs: &[AggExpr]) -> Result<Vec<FeatureValue>> {
///         let sql = render_select(&self.table, aggs);
///         self.client.query_one(&sql).await
///     }
///     // ... other methods
/// }
/// ```
#[async_trait]
pub trait Dataset: Send + Sync + fmt::Debug {
    /// Declared schema, `None` when the engine cannot describe the dataset
    fn schema(&self) -> Option<&Schema>;

    /// Column names in schema order (empty without a schema)
    fn columns(&self) -> Vec<String> {
        self.schema().map(Schema::names).unwrap_or_default()
    }

    /// Number of rows
    async fn count(&self) -> Result<usize>;

    /// Rows matching the predicate
    async fn filter(&self, predicate: &Predicate) -> Result<DatasetRef>;

    /// Projection onto the given columns, in the given order
    async fn select(&self, columns: &[String]) -> Result<DatasetRef>;

    /// Evaluate aggregations over the whole dataset
    ///
    /// Returns one value per requested aggregation, in request order. Empty
    /// inputs yield `Null` for everything except the counts.
    async fn aggregate(&self, aggs: &[AggExpr]) -> Result<Vec<FeatureValue>>;

    /// Add (or replace) columns, evaluated left to right
    ///
    /// Later expressions can read columns produced by earlier ones.
    async fn with_columns(&self, columns: Vec<(String, Expr)>) -> Result<DatasetRef>;

    /// Materialize all rows in schema order
    async fn collect(&self) -> Result<Vec<Vec<FeatureValue>>>;
}

/// Schema of a dataset or a validation error if it has none
pub fn require_schema(dataset: &dyn Dataset) -> Result<&Schema> {
    dataset
        .schema()
        .ok_or_else(|| Error::validation("Dataset must have a schema"))
}

/// Evaluate a single aggregation
pub async fn aggregate_one(dataset: &dyn Dataset, agg: AggExpr) -> Result<FeatureValue> {
    dataset
        .aggregate(std::slice::from_ref(&agg))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::engine("Aggregation returned no value"))
}
