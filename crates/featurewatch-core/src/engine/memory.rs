//! In-memory dataset engine
//!
//! `MemoryFrame` keeps typed columns in memory and evaluates the full
//! expression model locally. It backs the CLI and every test that needs real
//! rows without a warehouse.
//!
//! ## Semantics
//!
//! - `COUNT(col)` and `COUNT(DISTINCT col)` skip nulls
//! - `AVG`, `SUM`, `MIN`, `MAX` over zero non-null values yield `Null`
//! - `STDDEV` is the sample standard deviation; a single value yields `0.0`
//! - Window frames are `preceding` rows plus the current row, in `order_by`
//!   order (nulls first) within each partition

use super::{Dataset, DatasetRef};
use crate::expr::{AggExpr, AggFunction, DateUnit, Expr, Predicate, WindowSpec};
use crate::types::{DataType, FeatureValue, Field, Schema};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Column-major table held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryFrame {
    schema: Schema,
    columns: Vec<Vec<FeatureValue>>,
    num_rows: usize,
}

impl MemoryFrame {
    /// Create a frame from a schema and one value vector per field
    ///
    /// Integer values in floating/decimal columns are widened; any other
    /// value whose type disagrees with its column is rejected.
    pub fn new(schema: Schema, columns: Vec<Vec<FeatureValue>>) -> Result<Self> {
        if schema.len() != columns.len() {
            return Err(Error::engine(format!(
                "Schema has {} fields but {} columns were given",
                schema.len(),
                columns.len()
            )));
        }

        let num_rows = columns.first().map(Vec::len).unwrap_or(0);
        let mut conformed = Vec::with_capacity(columns.len());
        for (field, values) in schema.fields.iter().zip(columns) {
            if values.len() != num_rows {
                return Err(Error::engine(format!(
                    "Column {} has {} rows, expected {}",
                    field.name,
                    values.len(),
                    num_rows
                )));
            }
            let values = values
                .into_iter()
                .map(|v| conform(v, field.data_type, &field.name))
                .collect::<Result<Vec<_>>>()?;
            conformed.push(values);
        }

        Ok(Self {
            schema,
            columns: conformed,
            num_rows,
        })
    }

    /// Create a frame from row-major values in schema order
    pub fn from_rows(schema: Schema, rows: Vec<Vec<FeatureValue>>) -> Result<Self> {
        let width = schema.len();
        let mut columns: Vec<Vec<FeatureValue>> = vec![Vec::with_capacity(rows.len()); width];
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(Error::engine(format!(
                    "Row {} has {} values, expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Self::new(schema, columns)
    }

    /// Create a frame from JSON objects, inferring column types
    ///
    /// Columns appear in first-seen key order. Missing keys read as null.
    /// Strings that all parse as `YYYY-MM-DD` become dates, strings that all
    /// parse as `YYYY-MM-DD HH:MM:SS` (or with a `T`) become timestamps.
    pub fn from_json_records(records: &[JsonValue]) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        let mut objects = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let object = record
                .as_object()
                .ok_or_else(|| Error::engine(format!("Record {} is not a JSON object", i)))?;
            for key in object.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
            objects.push(object);
        }

        let null = JsonValue::Null;
        let mut fields = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let raw: Vec<&JsonValue> = objects
                .iter()
                .map(|o| o.get(&name).unwrap_or(&null))
                .collect();
            let data_type = infer_json_type(&name, &raw)?;
            let values = raw
                .iter()
                .map(|v| json_to_value(v, data_type))
                .collect::<Result<Vec<_>>>()?;
            fields.push(Field::new(name, data_type));
            columns.push(values);
        }

        Self::new(Schema::new(fields), columns)
    }

    /// Parse a JSON array of objects
    pub fn from_json_str(content: &str) -> Result<Self> {
        let records: Vec<JsonValue> = serde_json::from_str(content)?;
        Self::from_json_records(&records)
    }

    /// Materialize any dataset into memory
    pub async fn from_dataset(dataset: &dyn Dataset) -> Result<Self> {
        let schema = dataset
            .schema()
            .cloned()
            .ok_or_else(|| Error::engine("Cannot materialize a dataset without a schema"))?;
        let rows = dataset.collect().await?;
        Self::from_rows(schema, rows)
    }

    pub fn builder() -> MemoryFrameBuilder {
        MemoryFrameBuilder::default()
    }

    pub fn into_ref(self) -> DatasetRef {
        Arc::new(self)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn schema_ref(&self) -> &Schema {
        &self.schema
    }

    /// Values of a column by exact name
    pub fn column(&self, name: &str) -> Option<&[FeatureValue]> {
        self.schema
            .fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| self.columns[i].as_slice())
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.schema
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| Error::engine(format!("Column not found: {}", name)))
    }

    fn take(&self, rows: &[usize]) -> Self {
        Self {
            schema: self.schema.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| rows.iter().map(|&r| col[r].clone()).collect())
                .collect(),
            num_rows: rows.len(),
        }
    }

    fn set_column(&mut self, name: String, data_type: DataType, values: Vec<FeatureValue>) {
        match self.schema.fields.iter().position(|f| f.name == name) {
            Some(i) => {
                self.schema.fields[i].data_type = data_type;
                self.columns[i] = values;
            }
            None => {
                self.schema.fields.push(Field::new(name, data_type));
                self.columns.push(values);
            }
        }
    }

    fn eval(&self, expr: &Expr) -> Result<(DataType, Vec<FeatureValue>)> {
        match expr {
            Expr::Column(name) => {
                let i = self.column_index(name)?;
                Ok((self.schema.fields[i].data_type, self.columns[i].clone()))
            }
            Expr::Literal(value) => Ok((
                value.data_type().unwrap_or(DataType::String),
                vec![value.clone(); self.num_rows],
            )),
            Expr::Coalesce(exprs) => {
                let evaluated = exprs
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<Vec<_>>>()?;
                let data_type = evaluated
                    .first()
                    .map(|(dt, _)| *dt)
                    .ok_or_else(|| Error::engine("COALESCE needs at least one argument"))?;
                let mut out = Vec::with_capacity(self.num_rows);
                for row in 0..self.num_rows {
                    let value = evaluated
                        .iter()
                        .map(|(_, values)| &values[row])
                        .find(|v| !v.is_null())
                        .cloned()
                        .unwrap_or(FeatureValue::Null);
                    out.push(conform(value, data_type, "COALESCE")?);
                }
                Ok((data_type, out))
            }
            Expr::Cast { expr, to } => {
                let (_, values) = self.eval(expr)?;
                let values = values
                    .iter()
                    .map(|v| cast_value(v, *to))
                    .collect::<Result<Vec<_>>>()?;
                Ok((*to, values))
            }
            Expr::DateDiff { unit, start, end } => {
                let (_, starts) = self.eval(start)?;
                let (_, ends) = self.eval(end)?;
                let values = starts
                    .iter()
                    .zip(&ends)
                    .map(|(s, e)| date_diff(*unit, s, e))
                    .collect::<Result<Vec<_>>>()?;
                Ok((DataType::Int, values))
            }
            Expr::CurrentDate => {
                let today = Utc::now().date_naive();
                Ok((DataType::Date, vec![FeatureValue::Date(today); self.num_rows]))
            }
            Expr::Window { function, spec } => self.eval_window(function, spec),
        }
    }

    fn eval_window(
        &self,
        function: &AggFunction,
        spec: &WindowSpec,
    ) -> Result<(DataType, Vec<FeatureValue>)> {
        let partition_idx = spec
            .partition_by
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>>>()?;
        let order_idx = spec
            .order_by
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>>>()?;

        let (input_type, input) = match function.column() {
            Some(name) => {
                let i = self.column_index(name)?;
                (self.schema.fields[i].data_type, Some(&self.columns[i]))
            }
            None => (DataType::Int, None),
        };

        let mut partitions: Vec<Vec<usize>> = Vec::new();
        let mut lookup: HashMap<String, usize> = HashMap::new();
        for row in 0..self.num_rows {
            let key = partition_idx
                .iter()
                .map(|&i| self.columns[i][row].group_key())
                .collect::<Vec<_>>()
                .join("\u{1}");
            let slot = *lookup.entry(key).or_insert_with(|| {
                partitions.push(Vec::new());
                partitions.len() - 1
            });
            partitions[slot].push(row);
        }

        let null = FeatureValue::Null;
        let mut out = vec![FeatureValue::Null; self.num_rows];
        for rows in partitions.iter_mut() {
            rows.sort_by(|&a, &b| {
                order_idx
                    .iter()
                    .map(|&i| order_values(&self.columns[i][a], &self.columns[i][b]))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
            for (pos, &row) in rows.iter().enumerate() {
                let start = pos.saturating_sub(spec.preceding);
                let frame: Vec<&FeatureValue> = rows[start..=pos]
                    .iter()
                    .map(|&r| input.map(|col| &col[r]).unwrap_or(&null))
                    .collect();
                out[row] = reduce(function, input_type, &frame)?;
            }
        }

        Ok((window_output_type(function, input_type), out))
    }
}

#[async_trait]
impl Dataset for MemoryFrame {
    fn schema(&self) -> Option<&Schema> {
        Some(&self.schema)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.num_rows)
    }

    async fn filter(&self, predicate: &Predicate) -> Result<DatasetRef> {
        let i = self.column_index(predicate.column())?;
        let rows: Vec<usize> = (0..self.num_rows)
            .filter(|&r| match predicate {
                Predicate::IsNull(_) => self.columns[i][r].is_null(),
                Predicate::IsNotNull(_) => !self.columns[i][r].is_null(),
            })
            .collect();
        Ok(Arc::new(self.take(&rows)))
    }

    async fn select(&self, columns: &[String]) -> Result<DatasetRef> {
        let mut fields = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for name in columns {
            let i = self.column_index(name)?;
            fields.push(self.schema.fields[i].clone());
            values.push(self.columns[i].clone());
        }
        Ok(Arc::new(Self {
            schema: Schema::new(fields),
            columns: values,
            num_rows: self.num_rows,
        }))
    }

    async fn aggregate(&self, aggs: &[AggExpr]) -> Result<Vec<FeatureValue>> {
        let null = FeatureValue::Null;
        aggs.iter()
            .map(|agg| match agg.function.column() {
                Some(name) => {
                    let i = self.column_index(name)?;
                    let values: Vec<&FeatureValue> = self.columns[i].iter().collect();
                    reduce(&agg.function, self.schema.fields[i].data_type, &values)
                }
                None => {
                    let values = vec![&null; self.num_rows];
                    reduce(&agg.function, DataType::Int, &values)
                }
            })
            .collect()
    }

    async fn with_columns(&self, columns: Vec<(String, Expr)>) -> Result<DatasetRef> {
        let mut frame = self.clone();
        for (name, expr) in columns {
            let (data_type, values) = frame.eval(&expr)?;
            frame.set_column(name, data_type, values);
        }
        Ok(Arc::new(frame))
    }

    async fn collect(&self) -> Result<Vec<Vec<FeatureValue>>> {
        Ok((0..self.num_rows)
            .map(|r| self.columns.iter().map(|col| col[r].clone()).collect())
            .collect())
    }
}

/// Incremental construction of a [`MemoryFrame`]
///
/// ```rust,ignore
/// let frame = MemoryFrame::builder()
///     .column("CUSTOMER_ID", DataType::String, vec!["c1", "c2"])
///     .column("SESSION_LENGTH", DataType::Float, vec![Some(12.5), None])
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryFrameBuilder {
    fields: Vec<Field>,
    columns: Vec<Vec<FeatureValue>>,
}

impl MemoryFrameBuilder {
    pub fn column<V: Into<FeatureValue>>(
        mut self,
        name: &str,
        data_type: DataType,
        values: Vec<V>,
    ) -> Self {
        self.fields.push(Field::new(name, data_type));
        self.columns
            .push(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<MemoryFrame> {
        MemoryFrame::new(Schema::new(self.fields), self.columns)
    }
}

fn conform(value: FeatureValue, data_type: DataType, column: &str) -> Result<FeatureValue> {
    let matches = match (&value, data_type) {
        (FeatureValue::Null, _) => true,
        (FeatureValue::Int(i), DataType::Float | DataType::Decimal { .. }) => {
            return Ok(FeatureValue::Float(*i as f64))
        }
        (FeatureValue::Float(_), DataType::Decimal { .. }) => true,
        (v, dt) => v.data_type() == Some(dt),
    };
    if matches {
        Ok(value)
    } else {
        Err(Error::engine(format!(
            "Value {} does not match type {} of column {}",
            value, data_type, column
        )))
    }
}

fn order_values(a: &FeatureValue, b: &FeatureValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

fn numeric<'a>(
    column: &str,
    data_type: DataType,
    values: impl Iterator<Item = &'a FeatureValue>,
) -> Result<Vec<f64>> {
    if !data_type.is_numeric() {
        return Err(Error::engine(format!(
            "Column {} of type {} is not numeric",
            column, data_type
        )));
    }
    Ok(values.filter_map(FeatureValue::as_f64).collect())
}

fn reduce(
    function: &AggFunction,
    data_type: DataType,
    values: &[&FeatureValue],
) -> Result<FeatureValue> {
    let non_null = || values.iter().copied().filter(|v| !v.is_null());

    match function {
        AggFunction::CountAll => Ok(FeatureValue::Int(values.len() as i64)),
        AggFunction::Count(_) => Ok(FeatureValue::Int(non_null().count() as i64)),
        AggFunction::CountDistinct(_) => {
            let keys: HashSet<String> = non_null().map(FeatureValue::group_key).collect();
            Ok(FeatureValue::Int(keys.len() as i64))
        }
        AggFunction::Sum(column) => {
            let nums = numeric(column, data_type, non_null())?;
            if nums.is_empty() {
                Ok(FeatureValue::Null)
            } else if data_type == DataType::Int {
                Ok(FeatureValue::Int(
                    non_null()
                        .filter_map(|v| match v {
                            FeatureValue::Int(i) => Some(*i),
                            _ => None,
                        })
                        .sum(),
                ))
            } else {
                Ok(FeatureValue::Float(nums.iter().sum()))
            }
        }
        AggFunction::Avg(column) => {
            let nums = numeric(column, data_type, non_null())?;
            if nums.is_empty() {
                Ok(FeatureValue::Null)
            } else {
                Ok(FeatureValue::Float(nums.iter().sum::<f64>() / nums.len() as f64))
            }
        }
        AggFunction::Min(_) | AggFunction::Max(_) => {
            let wanted = if matches!(function, AggFunction::Min(_)) {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<&FeatureValue> = None;
            for value in non_null() {
                best = match best {
                    Some(current) if value.compare(current) != Some(wanted) => Some(current),
                    _ => Some(value),
                };
            }
            Ok(best.cloned().unwrap_or(FeatureValue::Null))
        }
        AggFunction::Stddev(column) => {
            let nums = numeric(column, data_type, non_null())?;
            match nums.len() {
                0 => Ok(FeatureValue::Null),
                1 => Ok(FeatureValue::Float(0.0)),
                n => {
                    let mean = nums.iter().sum::<f64>() / n as f64;
                    let var = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
                    Ok(FeatureValue::Float(var.sqrt()))
                }
            }
        }
    }
}

fn window_output_type(function: &AggFunction, input_type: DataType) -> DataType {
    match function {
        AggFunction::CountAll | AggFunction::Count(_) | AggFunction::CountDistinct(_) => {
            DataType::Int
        }
        AggFunction::Sum(_) if input_type == DataType::Int => DataType::Int,
        AggFunction::Min(_) | AggFunction::Max(_) => input_type,
        AggFunction::Sum(_) | AggFunction::Avg(_) | AggFunction::Stddev(_) => DataType::Float,
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or a bare date
pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn to_f64(value: &FeatureValue) -> Option<f64> {
    value.as_f64().or_else(|| match value {
        FeatureValue::String(s) => s.trim().parse().ok(),
        FeatureValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    })
}

fn to_datetime(value: &FeatureValue) -> Option<NaiveDateTime> {
    value.as_datetime().or_else(|| match value {
        FeatureValue::String(s) => parse_datetime(s),
        _ => None,
    })
}

fn cast_value(value: &FeatureValue, to: DataType) -> Result<FeatureValue> {
    use FeatureValue as V;

    let fail = || Error::engine(format!("Cannot cast '{}' to {}", value, to));
    let cast = match (value, to) {
        (V::Null, _) => V::Null,
        (v, DataType::String) => V::String(v.to_string()),
        (V::Int(i), DataType::Int) => V::Int(*i),
        (V::Float(f), DataType::Int) => V::Int(f.round() as i64),
        (V::Bool(b), DataType::Int) => V::Int(i64::from(*b)),
        (V::String(s), DataType::Int) => V::Int(s.trim().parse().map_err(|_| fail())?),
        (v, DataType::Float) => V::Float(to_f64(v).ok_or_else(fail)?),
        (v, DataType::Decimal { scale, .. }) => {
            let factor = 10f64.powi(i32::from(scale));
            V::Float((to_f64(v).ok_or_else(fail)? * factor).round() / factor)
        }
        (V::Bool(b), DataType::Bool) => V::Bool(*b),
        (V::Int(i), DataType::Bool) => V::Bool(*i != 0),
        (V::String(s), DataType::Bool) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => V::Bool(true),
            "false" | "f" | "no" | "0" => V::Bool(false),
            _ => return Err(fail()),
        },
        (v, DataType::Date) => V::Date(to_datetime(v).ok_or_else(fail)?.date()),
        (v, DataType::Timestamp) => V::Timestamp(to_datetime(v).ok_or_else(fail)?),
        _ => return Err(fail()),
    };
    Ok(cast)
}

fn date_diff(unit: DateUnit, start: &FeatureValue, end: &FeatureValue) -> Result<FeatureValue> {
    if start.is_null() || end.is_null() {
        return Ok(FeatureValue::Null);
    }
    let as_date = |v: &FeatureValue| {
        to_datetime(v)
            .map(|dt| dt.date())
            .ok_or_else(|| Error::engine(format!("DATEDIFF argument '{}' is not a date", v)))
    };
    let (s, e) = (as_date(start)?, as_date(end)?);

    let diff = match unit {
        DateUnit::Day => (e - s).num_days(),
        DateUnit::Week => (e - s).num_days() / 7,
        DateUnit::Month => {
            i64::from(e.year() - s.year()) * 12 + i64::from(e.month()) - i64::from(s.month())
        }
        DateUnit::Year => i64::from(e.year() - s.year()),
    };
    Ok(FeatureValue::Int(diff))
}

fn infer_json_type(column: &str, values: &[&JsonValue]) -> Result<DataType> {
    let present: Vec<&JsonValue> = values.iter().copied().filter(|v| !v.is_null()).collect();
    if present.is_empty() {
        return Ok(DataType::String);
    }
    if present.iter().all(|v| v.is_i64()) {
        return Ok(DataType::Int);
    }
    if present.iter().all(|v| v.is_number()) {
        return Ok(DataType::Float);
    }
    if present.iter().all(|v| v.is_boolean()) {
        return Ok(DataType::Bool);
    }
    let strings: Option<Vec<&str>> = present.iter().map(|v| v.as_str()).collect();
    match strings {
        Some(strings) => {
            if strings
                .iter()
                .all(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok())
            {
                Ok(DataType::Date)
            } else if strings.iter().all(|s| parse_datetime(s).is_some()) {
                Ok(DataType::Timestamp)
            } else {
                Ok(DataType::String)
            }
        }
        None => Err(Error::engine(format!(
            "Column {} has mixed value types",
            column
        ))),
    }
}

fn json_to_value(value: &JsonValue, data_type: DataType) -> Result<FeatureValue> {
    if value.is_null() {
        return Ok(FeatureValue::Null);
    }
    let converted = match data_type {
        DataType::Int => value.as_i64().map(FeatureValue::Int),
        DataType::Float | DataType::Decimal { .. } => value.as_f64().map(FeatureValue::Float),
        DataType::Bool => value.as_bool().map(FeatureValue::Bool),
        DataType::Date => value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .map(FeatureValue::Date),
        DataType::Timestamp => value
            .as_str()
            .and_then(parse_datetime)
            .map(FeatureValue::Timestamp),
        DataType::String => value.as_str().map(|s| FeatureValue::String(s.to_string())),
    };
    converted.ok_or_else(|| Error::engine(format!("Cannot read {} as {}", value, data_type)))
}
