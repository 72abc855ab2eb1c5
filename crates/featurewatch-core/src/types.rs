//! Core data types for featurewatch
//!
//! Column types, cell values, schemas and entities. These are shared by the
//! dataset engine, the transform pipeline, the monitor and the backends.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a dataset column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 64-bit integer
    Int,
    /// 64-bit floating point
    Float,
    /// Fixed-point decimal
    Decimal { precision: u8, scale: u8 },
    /// Text
    String,
    /// Boolean flag
    Bool,
    /// Calendar date
    Date,
    /// Date and time without zone
    Timestamp,
}

impl DataType {
    /// Integer, floating and decimal families are numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::Decimal { .. })
    }

    /// Date and timestamp columns can serve as event-time columns
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }

    /// Check whether this type belongs to a named type family
    ///
    /// Accepts the usual warehouse spellings (`NUMBER`, `DOUBLE`, `VARCHAR`, ...),
    /// case-insensitively.
    pub fn matches_name(&self, name: &str) -> bool {
        let name = name.trim().to_uppercase();
        let aliases: &[&str] = match self {
            Self::Int => &["INT", "INTEGER", "BIGINT", "LONG", "NUMBER"],
            Self::Float => &["FLOAT", "DOUBLE", "REAL"],
            Self::Decimal { .. } => &["DECIMAL", "NUMERIC", "NUMBER"],
            Self::String => &["STRING", "VARCHAR", "TEXT"],
            Self::Bool => &["BOOL", "BOOLEAN"],
            Self::Date => &["DATE"],
            Self::Timestamp => &["TIMESTAMP", "DATETIME"],
        };
        aliases.iter().any(|alias| name == *alias)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "BIGINT"),
            Self::Float => write!(f, "DOUBLE"),
            Self::Decimal { precision, scale } => write!(f, "NUMBER({},{})", precision, scale),
            Self::String => write!(f, "VARCHAR"),
            Self::Bool => write!(f, "BOOLEAN"),
            Self::Date => write!(f, "DATE"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// A single cell value
///
/// Uses `#[serde(untagged)]` so values read naturally in YAML/JSON:
/// `42`, `0.5`, `"active"`, `null`, `"2024-01-31"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Must stay first so JSON `null` never lands in another variant
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Must stay last, any JSON string matches it
    String(String),
}

impl FeatureValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value (integers widen to f64)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Temporal view of the value (dates are taken at midnight)
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Date(d) => d.and_hms_opt(0, 0, 0),
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// The type a column holding this value would naturally have
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Int(_) => Some(DataType::Int),
            Self::Float(_) => Some(DataType::Float),
            Self::Bool(_) => Some(DataType::Bool),
            Self::Date(_) => Some(DataType::Date),
            Self::Timestamp(_) => Some(DataType::Timestamp),
            Self::String(_) => Some(DataType::String),
        }
    }

    /// Total-enough ordering used for sorting and min/max
    ///
    /// Numbers compare across Int/Float, dates compare across Date/Timestamp.
    /// Values of unrelated types (and nulls) are unordered.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        if let (Some(a), Some(b)) = (self.as_datetime(), other.as_datetime()) {
            return Some(a.cmp(&b));
        }
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Stable key for grouping and distinct counting
    pub fn group_key(&self) -> String {
        match self {
            Self::Null => "\u{0}null".to_string(),
            Self::Int(v) => format!("n:{}", *v as f64),
            Self::Float(v) => format!("n:{}", v),
            Self::Bool(v) => format!("b:{}", v),
            Self::Date(d) => format!("t:{} 00:00:00", d),
            Self::Timestamp(ts) => format!("t:{}", ts),
            Self::String(s) => format!("s:{}", s),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Date(d) => write!(f, "{}", d),
            Self::Timestamp(ts) => write!(f, "{}", ts),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NaiveDate> for FeatureValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl<T: Into<FeatureValue>> From<Option<T>> for FeatureValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// A named, typed column declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of column declarations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Exact-name lookup
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Case-insensitive lookup, preferring an exact match
    pub fn field_ignore_case(&self, name: &str) -> Option<&Field> {
        self.field(name).or_else(|| {
            self.fields
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// A join-key identity (e.g. a customer) that feature views attach to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub join_keys: Vec<String>,
    pub description: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Entity {
    /// Creates an entity with the default description `Entity {name}`
    pub fn new(name: impl Into<String>, join_keys: Vec<String>) -> Self {
        let name = name.into();
        Self {
            description: format!("Entity {}", name),
            name,
            join_keys,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}
