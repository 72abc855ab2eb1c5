//! CLI configuration handling

use anyhow::{Context, Result};
use featurewatch_core::{ManagerOptions, SessionOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Directory for creation and drift records (disabled when unset)
    #[serde(default)]
    pub metrics_path: Option<String>,

    /// Default output format when `--output` is not given
    #[serde(default = "default_output")]
    pub output: String,

    /// Session defaults
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Fixed namespace instead of a generated one
    #[serde(default)]
    pub namespace: Option<String>,

    /// Drop the namespace when the command finishes
    #[serde(default = "default_true")]
    pub cleanup: bool,

    /// Re-register views that already exist
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            cleanup: true,
            overwrite: true,
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            metrics_path: None,
            output: default_output(),
            session: SessionConfig::default(),
        }
    }
}

fn default_output() -> String {
    "table".to_string()
}

fn default_true() -> bool {
    true
}

impl CliConfig {
    /// Session options for one command run
    pub fn session_options(&self) -> SessionOptions {
        let mut manager = ManagerOptions::new().with_overwrite(self.session.overwrite);
        if let Some(path) = &self.metrics_path {
            manager = manager.with_metrics_path(path);
        }
        let mut options = SessionOptions::default()
            .with_cleanup(self.session.cleanup)
            .with_manager(manager);
        if let Some(namespace) = &self.session.namespace {
            options = options.with_namespace(namespace.clone());
        }
        options
    }
}

/// Load configuration from file or defaults
pub fn load_config(config_path: Option<&str>) -> Result<CliConfig> {
    if let Some(path) = config_path {
        load_from_file(path)
    } else {
        // Check for default config locations
        let default_locations = [
            ".featurewatch/config.yaml",
            ".featurewatch/config.yml",
            "featurewatch.yaml",
            "featurewatch.yml",
        ];

        for location in &default_locations {
            if Path::new(location).exists() {
                return load_from_file(location);
            }
        }

        Ok(CliConfig::default())
    }
}

fn load_from_file(path: &str) -> Result<CliConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path))?;

    if path.ends_with(".yaml") || path.ends_with(".yml") {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path))
    } else if path.ends_with(".json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config: {}", path))
    } else {
        // Try YAML first, then JSON
        serde_yaml::from_str(&content)
            .or_else(|_| serde_json::from_str(&content))
            .with_context(|| format!("Failed to parse config file: {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();

        assert_eq!(config.metrics_path, None);
        assert_eq!(config.output, "table");
        assert_eq!(config.session.namespace, None);
        assert!(config.session.cleanup);
        assert!(config.session.overwrite);
    }

    #[test]
    fn test_load_yaml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
metrics_path: /var/lib/featurewatch/metrics
output: json
session:
  namespace: FEATURE_STORE_NIGHTLY
  cleanup: false
  overwrite: false
"#;
        std::fs::write(&config_path, yaml_content).unwrap();

        let config = load_from_file(config_path.to_str().unwrap()).unwrap();

        assert_eq!(
            config.metrics_path.as_deref(),
            Some("/var/lib/featurewatch/metrics")
        );
        assert_eq!(config.output, "json");
        assert_eq!(
            config.session.namespace.as_deref(),
            Some("FEATURE_STORE_NIGHTLY")
        );
        assert!(!config.session.cleanup);
        assert!(!config.session.overwrite);
    }

    #[test]
    fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let json_content = r#"{
            "output": "yaml",
            "session": { "cleanup": false }
        }"#;
        std::fs::write(&config_path, json_content).unwrap();

        let config = load_from_file(config_path.to_str().unwrap()).unwrap();

        assert_eq!(config.output, "yaml");
        assert!(!config.session.cleanup);
        // Defaults should be applied for missing fields
        assert!(config.session.overwrite);
        assert_eq!(config.metrics_path, None);
    }

    #[test]
    fn test_empty_mapping_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("minimal.yml");
        std::fs::write(&config_path, "{}\n").unwrap();

        let config = load_from_file(config_path.to_str().unwrap()).unwrap();

        assert_eq!(config.output, "table");
        assert!(config.session.cleanup);
    }

    #[test]
    fn test_invalid_config_file_not_found() {
        let result = load_from_file("/nonexistent/config.yaml");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to read"));
    }

    #[test]
    fn test_invalid_yaml_syntax() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        std::fs::write(&config_path, "session:\n  cleanup: [invalid yaml").unwrap();

        let result = load_from_file(config_path.to_str().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_config_with_explicit_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("explicit.conf");
        std::fs::write(&config_path, r#"{"metrics_path": "/explicit/metrics"}"#).unwrap();

        // Unknown extension falls back through YAML to JSON
        let config = load_config(Some(config_path.to_str().unwrap())).unwrap();

        assert_eq!(config.metrics_path.as_deref(), Some("/explicit/metrics"));
    }
}
