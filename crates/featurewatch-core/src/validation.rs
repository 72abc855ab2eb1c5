//! Feature quality rules
//!
//! Turns a [`FeatureValidationConfig`] into a list of [`ValidationRule`]s and
//! checks a [`FeatureStats`] snapshot against them. The builder runs these
//! checks before anything is registered.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use featurewatch_core::validation::FeatureRules;
//!
//! let rules = FeatureRules::from_config("SESSION_LENGTH", &feature.validation);
//! rules.validate(&stats)?;  // Error::Validation on the first broken rule
//! ```

use crate::config::FeatureValidationConfig;
use crate::monitor::FeatureStats;
use crate::{Error, Result};

/// A single statistical constraint
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationRule {
    /// `null_ratio` must not exceed the threshold
    MaxNullRatio(f64),
    /// Observed min/max must lie within the bounds (either side optional)
    Range { min: Option<f64>, max: Option<f64> },
    /// `unique_count / row_count` must reach the threshold
    MinUniqueRatio(f64),
}

impl ValidationRule {
    /// Whether the rule needs unique/min/max statistics
    pub fn needs_detailed_stats(&self) -> bool {
        !matches!(self, Self::MaxNullRatio(_))
    }

    /// Check the rule, returning a description of the violation if any
    pub fn check(&self, feature: &str, stats: &FeatureStats) -> Option<String> {
        match self {
            Self::MaxNullRatio(threshold) => (stats.null_ratio > *threshold).then(|| {
                format!(
                    "Feature {} has {} null values, exceeding threshold of {}",
                    feature,
                    percent(stats.null_ratio),
                    percent(*threshold)
                )
            }),
            Self::Range { min, max } => match (stats.min_value, stats.max_value) {
                (Some(observed_min), Some(observed_max)) => {
                    if let Some(min) = min.filter(|m| observed_min < *m) {
                        Some(format!(
                            "Feature {} has minimum {} below allowed minimum {}",
                            feature, observed_min, min
                        ))
                    } else {
                        max.filter(|m| observed_max > *m).map(|max| {
                            format!(
                                "Feature {} has maximum {} above allowed maximum {}",
                                feature, observed_max, max
                            )
                        })
                    }
                }
                _ => Some(format!(
                    "Feature {} has no numeric statistics for a range check",
                    feature
                )),
            },
            Self::MinUniqueRatio(threshold) => match stats.unique_ratio() {
                Some(ratio) if ratio >= *threshold => None,
                Some(ratio) => Some(format!(
                    "Feature {} has {} unique values, below threshold of {}",
                    feature,
                    percent(ratio),
                    percent(*threshold)
                )),
                None => Some(format!(
                    "Feature {} has no uniqueness statistics",
                    feature
                )),
            },
        }
    }
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// All rules configured for one feature
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRules {
    feature: String,
    rules: Vec<ValidationRule>,
}

impl FeatureRules {
    /// Rules enabled by a validation config
    pub fn from_config(feature: impl Into<String>, config: &FeatureValidationConfig) -> Self {
        // The null-ratio gate always runs, whatever `null_check` says
        let mut rules = vec![ValidationRule::MaxNullRatio(config.null_threshold)];
        if config.range_check {
            rules.push(ValidationRule::Range {
                min: config.min_value,
                max: config.max_value,
            });
        }
        if config.unique_check {
            rules.push(ValidationRule::MinUniqueRatio(config.unique_threshold));
        }
        Self {
            feature: feature.into(),
            rules,
        }
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn needs_detailed_stats(&self) -> bool {
        self.rules.iter().any(ValidationRule::needs_detailed_stats)
    }

    /// Fail with a validation error on the first broken rule
    pub fn validate(&self, stats: &FeatureStats) -> Result<()> {
        match self.violations(stats).into_iter().next() {
            Some(message) => Err(Error::validation(message)),
            None => Ok(()),
        }
    }

    /// Every broken rule, in rule order
    pub fn violations(&self, stats: &FeatureStats) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|rule| rule.check(&self.feature, stats))
            .collect()
    }
}
