//! Feature view configuration model
//!
//! A [`FeatureViewConfig`] describes one feature view: its identity and
//! version, how often it refreshes, the validation rules for each feature and
//! the features each one depends on. Configs are plain serde types and can be
//! kept in YAML next to the pipeline that produces the data.
//!
//! ```yaml
//! name: customer_behavior
//! domain: RETAIL
//! entity: CUSTOMER
//! feature_type: BEHAVIOR
//! major_version: 2
//! refresh:
//!   frequency: 30 minutes
//!   mode: INCREMENTAL
//! timestamp_col: DATE
//! features:
//!   SESSION_LENGTH:
//!     name: SESSION_LENGTH
//!     description: Session length in minutes
//!     validation:
//!       null_threshold: 0.2
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Prefix of generated version strings
pub const VERSION_PREFIX: &str = "V";

/// Prefix of generated feature view names
pub const FEATURE_VIEW_PREFIX: &str = "FV";

/// Standard version string, e.g. `V1_0` for major=1, minor=0
pub fn create_version(major: u32, minor: u32) -> String {
    format!("{}{}_{}", VERSION_PREFIX, major, minor)
}

/// Standard feature view name, e.g. `FV_RETAIL_CUSTOMER_BEHAVIOR`
///
/// The domain part is skipped when empty.
pub fn create_feature_view_name(domain: &str, entity: &str, feature_type: &str) -> String {
    let mut parts = vec![FEATURE_VIEW_PREFIX];
    if !domain.is_empty() {
        parts.push(domain);
    }
    parts.push(entity);
    parts.push(feature_type);
    parts
        .iter()
        .map(|p| p.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Unit of a duration-style refresh frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    fn seconds(self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

/// How often a feature view refreshes
///
/// Either a 5-field cron expression or `"<int> <unit>"` where the unit is
/// minute(s), hour(s) or day(s). Anything else is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RefreshFrequency {
    Cron(String),
    Every { count: u64, unit: TimeUnit },
}

impl RefreshFrequency {
    /// Interval length for duration-style frequencies
    ///
    /// `None` for cron expressions and for intervals too long to count in seconds.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Cron(_) => None,
            Self::Every { count, unit } => count.checked_mul(unit.seconds()).map(Duration::from_secs),
        }
    }

    pub fn is_cron(&self) -> bool {
        matches!(self, Self::Cron(_))
    }
}

impl Default for RefreshFrequency {
    fn default() -> Self {
        Self::Every {
            count: 1,
            unit: TimeUnit::Day,
        }
    }
}

impl FromStr for RefreshFrequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::configuration(format!(
                "Invalid refresh frequency: {}. Use either cron expression or duration (e.g., '1 day', '30 minutes')",
                s
            ))
        };

        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() == 5 {
            return Ok(Self::Cron(parts.join(" ")));
        }
        if parts.len() != 2 {
            return Err(invalid());
        }

        let count: u64 = parts[0].parse().map_err(|_| invalid())?;
        let unit = match parts[1].to_lowercase().as_str() {
            "minute" | "minutes" => TimeUnit::Minute,
            "hour" | "hours" => TimeUnit::Hour,
            "day" | "days" => TimeUnit::Day,
            _ => return Err(invalid()),
        };
        if count.checked_mul(unit.seconds()).is_none() {
            return Err(Error::configuration(format!(
                "Invalid refresh frequency: {}. Interval is too long",
                s
            )));
        }
        Ok(Self::Every { count, unit })
    }
}

impl TryFrom<String> for RefreshFrequency {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RefreshFrequency> for String {
    fn from(value: RefreshFrequency) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RefreshFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron(expr) => write!(f, "{}", expr),
            Self::Every { count, unit } => {
                let plural = if *count == 1 { "" } else { "s" };
                write!(f, "{} {}{}", count, unit.name(), plural)
            }
        }
    }
}

/// Refresh strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefreshMode {
    #[default]
    Full,
    Incremental,
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "FULL"),
            Self::Incremental => write!(f, "INCREMENTAL"),
        }
    }
}

/// Refresh policy of a feature view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default)]
    pub frequency: RefreshFrequency,
    #[serde(default)]
    pub mode: RefreshMode,
}

impl RefreshConfig {
    /// Parses `frequency`, failing with a configuration error when malformed
    pub fn new(frequency: &str, mode: RefreshMode) -> Result<Self> {
        Ok(Self {
            frequency: frequency.parse()?,
            mode,
        })
    }
}

/// Quality rules for a single feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValidationConfig {
    /// Informational only; `null_threshold` is enforced either way
    #[serde(default = "default_true")]
    pub null_check: bool,

    /// Maximum allowed null ratio
    #[serde(default = "default_null_threshold")]
    pub null_threshold: f64,

    /// Require observed min/max within `min_value`/`max_value`
    #[serde(default)]
    pub range_check: bool,

    #[serde(default)]
    pub min_value: Option<f64>,

    #[serde(default)]
    pub max_value: Option<f64>,

    /// Require `unique_count / row_count >= unique_threshold`
    #[serde(default)]
    pub unique_check: bool,

    /// Minimum unique ratio
    #[serde(default = "default_unique_threshold")]
    pub unique_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_null_threshold() -> f64 {
    0.1
}

fn default_unique_threshold() -> f64 {
    0.9
}

impl Default for FeatureValidationConfig {
    fn default() -> Self {
        Self {
            null_check: true,
            null_threshold: default_null_threshold(),
            range_check: false,
            min_value: None,
            max_value: None,
            unique_check: false,
            unique_threshold: default_unique_threshold(),
        }
    }
}

impl FeatureValidationConfig {
    pub fn with_null_threshold(mut self, threshold: f64) -> Self {
        self.null_threshold = threshold;
        self
    }

    pub fn with_range(mut self, min_value: Option<f64>, max_value: Option<f64>) -> Self {
        self.range_check = true;
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }

    pub fn with_unique_threshold(mut self, threshold: f64) -> Self {
        self.unique_check = true;
        self.unique_threshold = threshold;
        self
    }
}

/// Configuration of one feature inside a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub validation: FeatureValidationConfig,

    /// Features this one logically depends on
    ///
    /// Bare names (`ORDERS`) match that feature in any view; qualified names
    /// (`FV_ORDERS.ORDERS`) match exactly one view.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl FeatureConfig {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            validation: FeatureValidationConfig::default(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_validation(mut self, validation: FeatureValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }
}

/// Full description of a feature view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureViewConfig {
    pub name: String,

    #[serde(default)]
    pub domain: String,

    #[serde(default = "default_entity")]
    pub entity: String,

    #[serde(default = "default_feature_type")]
    pub feature_type: String,

    #[serde(default = "default_major_version")]
    pub major_version: u32,

    #[serde(default)]
    pub minor_version: u32,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub timestamp_col: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub features: BTreeMap<String, FeatureConfig>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_entity() -> String {
    "CUSTOMER".to_string()
}

fn default_feature_type() -> String {
    "BASE".to_string()
}

fn default_major_version() -> u32 {
    1
}

impl FeatureViewConfig {
    /// Creates a config with all defaults and no features
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: String::new(),
            entity: default_entity(),
            feature_type: default_feature_type(),
            major_version: default_major_version(),
            minor_version: 0,
            refresh: RefreshConfig::default(),
            timestamp_col: None,
            description: None,
            features: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    pub fn with_feature_type(mut self, feature_type: impl Into<String>) -> Self {
        self.feature_type = feature_type.into();
        self
    }

    pub fn with_version(mut self, major: u32, minor: u32) -> Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }

    pub fn with_refresh(mut self, refresh: RefreshConfig) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_timestamp_col(mut self, column: impl Into<String>) -> Self {
        self.timestamp_col = Some(column.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a feature keyed by its own name (replacing any previous one)
    pub fn with_feature(mut self, feature: FeatureConfig) -> Self {
        self.features.insert(feature.name.clone(), feature);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Formatted version string, e.g. `V2_3`
    pub fn version(&self) -> String {
        create_version(self.major_version, self.minor_version)
    }

    /// Formatted full name, e.g. `FV_RETAIL_CUSTOMER_BEHAVIOR`
    pub fn full_name(&self) -> String {
        create_feature_view_name(&self.domain, &self.entity, &self.feature_type)
    }

    pub fn refresh_frequency(&self) -> &RefreshFrequency {
        &self.refresh.frequency
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration("Feature view name cannot be empty"));
        }
        if self.major_version < 1 {
            return Err(Error::configuration(format!(
                "Feature view {}: major_version must be >= 1, got {}",
                self.name, self.major_version
            )));
        }
        for (key, feature) in &self.features {
            if key != &feature.name {
                return Err(Error::configuration(format!(
                    "Feature view {}: feature key '{}' does not match feature name '{}'",
                    self.name, key, feature.name
                )));
            }
            let validation = &feature.validation;
            if !(0.0..=1.0).contains(&validation.null_threshold) {
                return Err(Error::configuration(format!(
                    "Feature {}: null_threshold must be within [0, 1], got {}",
                    key, validation.null_threshold
                )));
            }
            if let (Some(min), Some(max)) = (validation.min_value, validation.max_value) {
                if min > max {
                    return Err(Error::configuration(format!(
                        "Feature {}: min_value {} exceeds max_value {}",
                        key, min, max
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load and validate a config from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!(
                "Error loading config from {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content).map_err(|e| {
            Error::configuration(format!(
                "Error loading config from {}: {}",
                path.display(),
                e.message()
            ))
        })
    }

    /// Parse and validate a config from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Save the config as YAML
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_yaml_string()?;
        std::fs::write(path, content).map_err(|e| {
            Error::configuration(format!("Error saving config to {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_version_and_full_name() {
        let config = FeatureViewConfig::new("customer_behavior")
            .with_domain("retail")
            .with_entity("customer")
            .with_feature_type("behavior")
            .with_version(2, 3);

        assert_eq!(config.version(), "V2_3");
        assert_eq!(config.full_name(), "FV_RETAIL_CUSTOMER_BEHAVIOR");
    }

    #[test]
    fn test_full_name_without_domain() {
        let config = FeatureViewConfig::new("profile");
        assert_eq!(config.full_name(), "FV_CUSTOMER_BASE");
        assert_eq!(create_feature_view_name("", "product", "profile"), "FV_PRODUCT_PROFILE");
    }

    #[test]
    fn test_refresh_frequency_duration() {
        let freq: RefreshFrequency = "30 minutes".parse().unwrap();
        assert_eq!(freq.as_duration(), Some(Duration::from_secs(1800)));
        assert_eq!(freq.to_string(), "30 minutes");

        let freq: RefreshFrequency = "1 Day".parse().unwrap();
        assert_eq!(freq.to_string(), "1 day");
    }

    #[test]
    fn test_refresh_frequency_too_long() {
        let err = "18446744073709551615 days"
            .parse::<RefreshFrequency>()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("Interval is too long"));

        let freq = RefreshFrequency::Every {
            count: u64::MAX,
            unit: TimeUnit::Day,
        };
        assert_eq!(freq.as_duration(), None);
    }

    #[test]
    fn test_refresh_frequency_cron() {
        let freq: RefreshFrequency = "0 6 * * *".parse().unwrap();
        assert!(freq.is_cron());
        assert_eq!(freq.as_duration(), None);
    }

    #[test]
    fn test_refresh_frequency_invalid() {
        for bad in ["daily", "1 week", "x days", "1 2 3", "", "-1 day"] {
            let err = bad.parse::<RefreshFrequency>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "input: {:?}", bad);
        }
    }

    #[test]
    fn test_validation_defaults() {
        let validation = FeatureValidationConfig::default();
        assert!(validation.null_check);
        assert_eq!(validation.null_threshold, 0.1);
        assert!(!validation.range_check);
        assert!(!validation.unique_check);
        assert_eq!(validation.unique_threshold, 0.9);
    }

    #[test]
    fn test_yaml_defaults_applied() {
        let yaml = r#"
name: customer_behavior
features:
  SESSION_LENGTH:
    name: SESSION_LENGTH
    description: Session length in minutes
"#;
        let config = FeatureViewConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.entity, "CUSTOMER");
        assert_eq!(config.feature_type, "BASE");
        assert_eq!(config.version(), "V1_0");
        assert_eq!(config.refresh.mode, RefreshMode::Full);
        assert_eq!(config.refresh_frequency().to_string(), "1 day");
        assert_eq!(
            config.features["SESSION_LENGTH"].validation.null_threshold,
            0.1
        );
    }

    #[test]
    fn test_yaml_rejects_bad_frequency() {
        let yaml = r#"
name: customer_behavior
refresh:
  frequency: every tuesday
"#;
        let err = FeatureViewConfig::from_yaml_str(yaml).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("Invalid refresh frequency"));
    }

    #[test]
    fn test_yaml_rejects_zero_major_version() {
        let yaml = "name: v\nmajor_version: 0\n";
        let err = FeatureViewConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("major_version"));
    }

    #[test]
    fn test_validate_feature_key_mismatch() {
        let mut config = FeatureViewConfig::new("v");
        config
            .features
            .insert("A".to_string(), FeatureConfig::new("B", "mismatch"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("view.yaml");

        let config = FeatureViewConfig::new("customer_behavior")
            .with_domain("RETAIL")
            .with_refresh(RefreshConfig::new("12 hours", RefreshMode::Incremental).unwrap())
            .with_timestamp_col("DATE")
            .with_feature(
                FeatureConfig::new("AVG_SESSION_LENGTH_7", "7-day average")
                    .depends_on("SESSION_LENGTH"),
            )
            .with_tag("owner", "growth");

        config.to_yaml(&path).unwrap();
        let loaded = FeatureViewConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_yaml_missing_file() {
        let err = FeatureViewConfig::from_yaml("/nonexistent/view.yaml").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("Error loading config"));
    }
}
