//! Expression model handed to dataset engines
//!
//! Transforms and the monitor never touch rows directly. They describe what
//! they want as [`Expr`], [`AggExpr`] and [`Predicate`] values and the engine
//! behind a [`crate::Dataset`] evaluates them.

use crate::types::{DataType, FeatureValue};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column-level expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column reference
    Column(String),

    /// Literal value
    Literal(FeatureValue),

    /// First non-null argument
    Coalesce(Vec<Expr>),

    /// Type conversion
    Cast { expr: Box<Expr>, to: DataType },

    /// Whole `unit`s elapsed from `start` to `end`
    DateDiff {
        unit: DateUnit,
        start: Box<Expr>,
        end: Box<Expr>,
    },

    /// Today's date as seen by the engine
    CurrentDate,

    /// Aggregation over a row window
    Window {
        function: AggFunction,
        spec: WindowSpec,
    },
}

impl Expr {
    pub fn column(name: &str) -> Self {
        Self::Column(name.to_string())
    }

    pub fn literal<T: Into<FeatureValue>>(value: T) -> Self {
        Self::Literal(value.into())
    }

    pub fn coalesce(exprs: Vec<Expr>) -> Self {
        Self::Coalesce(exprs)
    }

    pub fn cast(expr: Expr, to: DataType) -> Self {
        Self::Cast {
            expr: Box::new(expr),
            to,
        }
    }

    pub fn date_diff(unit: DateUnit, start: Expr, end: Expr) -> Self {
        Self::DateDiff {
            unit,
            start: Box::new(start),
            end: Box::new(end),
        }
    }

    pub fn window(function: AggFunction, spec: WindowSpec) -> Self {
        Self::Window { function, spec }
    }

    /// Columns this expression reads
    pub fn referenced_columns(&self) -> Vec<String> {
        match self {
            Self::Column(name) => vec![name.clone()],
            Self::Literal(_) | Self::CurrentDate => vec![],
            Self::Coalesce(exprs) => exprs.iter().flat_map(|e| e.referenced_columns()).collect(),
            Self::Cast { expr, .. } => expr.referenced_columns(),
            Self::DateDiff { start, end, .. } => {
                let mut cols = start.referenced_columns();
                cols.extend(end.referenced_columns());
                cols
            }
            Self::Window { function, spec } => {
                let mut cols: Vec<String> = function.column().map(str::to_string).into_iter().collect();
                cols.extend(spec.partition_by.iter().cloned());
                cols.extend(spec.order_by.iter().cloned());
                cols
            }
        }
    }
}

/// Aggregation functions understood by every engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggFunction {
    /// COUNT(*)
    CountAll,
    /// COUNT(col), non-null rows only
    Count(String),
    /// COUNT(DISTINCT col), non-null values only
    CountDistinct(String),
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    /// Sample standard deviation
    Stddev(String),
}

impl AggFunction {
    /// Column the aggregation reads, if any
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::CountAll => None,
            Self::Count(c)
            | Self::CountDistinct(c)
            | Self::Sum(c)
            | Self::Avg(c)
            | Self::Min(c)
            | Self::Max(c)
            | Self::Stddev(c) => Some(c),
        }
    }
}

/// Aggregation with an optional output name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggExpr {
    pub function: AggFunction,
    pub alias: Option<String>,
}

impl AggExpr {
    pub fn new(function: AggFunction) -> Self {
        Self {
            function,
            alias: None,
        }
    }

    pub fn alias(mut self, name: &str) -> Self {
        self.alias = Some(name.to_string());
        self
    }

    pub fn count_all() -> Self {
        Self::new(AggFunction::CountAll)
    }

    pub fn count(column: &str) -> Self {
        Self::new(AggFunction::Count(column.to_string()))
    }

    pub fn count_distinct(column: &str) -> Self {
        Self::new(AggFunction::CountDistinct(column.to_string()))
    }

    pub fn min(column: &str) -> Self {
        Self::new(AggFunction::Min(column.to_string()))
    }

    pub fn max(column: &str) -> Self {
        Self::new(AggFunction::Max(column.to_string()))
    }

    pub fn avg(column: &str) -> Self {
        Self::new(AggFunction::Avg(column.to_string()))
    }

    pub fn stddev(column: &str) -> Self {
        Self::new(AggFunction::Stddev(column.to_string()))
    }
}

/// Aggregation kind without a column, as named in transform definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Stddev,
}

impl AggKind {
    /// Bind this kind to a column
    pub fn on(self, column: &str) -> AggFunction {
        let column = column.to_string();
        match self {
            Self::Count => AggFunction::Count(column),
            Self::Sum => AggFunction::Sum(column),
            Self::Avg => AggFunction::Avg(column),
            Self::Min => AggFunction::Min(column),
            Self::Max => AggFunction::Max(column),
            Self::Stddev => AggFunction::Stddev(column),
        }
    }
}

impl fmt::Display for AggKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Stddev => "STDDEV",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for AggKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "COUNT" => Ok(Self::Count),
            "SUM" => Ok(Self::Sum),
            "AVG" | "MEAN" => Ok(Self::Avg),
            "MIN" => Ok(Self::Min),
            "MAX" => Ok(Self::Max),
            "STDDEV" | "STD" => Ok(Self::Stddev),
            other => Err(Error::configuration(format!(
                "Unsupported aggregation function: {}",
                other
            ))),
        }
    }
}

/// Row window: `preceding` rows before the current one plus the current row,
/// within each partition, in `order_by` order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub partition_by: Vec<String>,
    pub order_by: Vec<String>,
    pub preceding: usize,
}

impl WindowSpec {
    /// Window covering the last `size` rows (including the current one)
    pub fn trailing(size: usize, partition_by: Vec<String>, order_by: Vec<String>) -> Self {
        Self {
            partition_by,
            order_by,
            preceding: size.saturating_sub(1),
        }
    }
}

/// Unit for date arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateUnit {
    Day,
    Week,
    Month,
    Year,
}

impl fmt::Display for DateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Day => "DAYS",
            Self::Week => "WEEKS",
            Self::Month => "MONTHS",
            Self::Year => "YEARS",
        };
        write!(f, "{}", name)
    }
}

/// Row filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    IsNull(String),
    IsNotNull(String),
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Self::IsNull(c) | Self::IsNotNull(c) => c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agg_kind_parse() {
        assert_eq!("avg".parse::<AggKind>().unwrap(), AggKind::Avg);
        assert_eq!("SUM".parse::<AggKind>().unwrap(), AggKind::Sum);
        assert!("median".parse::<AggKind>().is_err());
    }

    #[test]
    fn test_agg_kind_binds_column() {
        assert_eq!(
            AggKind::Max.on("TRANSACTIONS"),
            AggFunction::Max("TRANSACTIONS".to_string())
        );
    }

    #[test]
    fn test_trailing_window() {
        let spec = WindowSpec::trailing(7, vec!["CUSTOMER_ID".into()], vec!["DATE".into()]);
        assert_eq!(spec.preceding, 6);
    }

    #[test]
    fn test_referenced_columns() {
        let expr = Expr::window(
            AggFunction::Avg("SESSION_LENGTH".into()),
            WindowSpec::trailing(7, vec!["CUSTOMER_ID".into()], vec!["DATE".into()]),
        );
        assert_eq!(
            expr.referenced_columns(),
            vec!["SESSION_LENGTH", "CUSTOMER_ID", "DATE"]
        );
    }
}
