//! Register a feature view on sample data and print its statistics

use anyhow::Result;
use comfy_table::Cell;
use featurewatch_core::backend::memory::MemoryFeatureStore;
use featurewatch_core::{with_session, DatasetRef, Error, FeatureStats};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

use crate::config::CliConfig;
use crate::output::{
    create_table, format_count, format_percent, format_stat, print_structured, print_success,
    OutputFormat,
};

use super::{load_definition, load_records, ViewDefinition};

#[derive(Debug, Serialize)]
pub struct ProfileReport {
    pub view: String,
    pub version: String,
    pub feature_columns: Vec<String>,
    pub dependencies: BTreeSet<String>,
    pub stats: BTreeMap<String, FeatureStats>,
}

pub async fn run(config: &CliConfig, file: &str, data: &str, format: OutputFormat) -> Result<()> {
    let definition = load_definition(file)?;
    let dataset = load_records(data)?;

    let report = profile(config, definition, dataset).await?;
    if print_structured(&report, format)? {
        return Ok(());
    }

    print_success(&format!(
        "Registered {}/{} with {} feature column(s)",
        report.view,
        report.version,
        report.feature_columns.len()
    ));
    println!();

    let mut table = create_table();
    table.set_header(vec![
        "Feature", "Rows", "Nulls", "Null %", "Unique", "Min", "Max", "Mean", "Std Dev",
    ]);
    for (feature, stats) in &report.stats {
        table.add_row(vec![
            Cell::new(feature),
            Cell::new(format_count(stats.row_count)),
            Cell::new(format_count(stats.null_count)),
            Cell::new(format_percent(stats.null_ratio)),
            Cell::new(
                stats
                    .unique_count
                    .map(format_count)
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(format_stat(stats.min_value)),
            Cell::new(format_stat(stats.max_value)),
            Cell::new(format_stat(stats.mean_value)),
            Cell::new(format_stat(stats.std_value)),
        ]);
    }
    println!("{table}");

    if report.dependencies.len() > 1 {
        println!();
        println!(
            "Depends on: {}",
            report
                .dependencies
                .iter()
                .filter(|v| **v != report.view)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(())
}

/// Run the registration pipeline in a throwaway session
pub async fn profile(
    config: &CliConfig,
    definition: ViewDefinition,
    dataset: DatasetRef,
) -> Result<ProfileReport> {
    let store = Arc::new(MemoryFeatureStore::new());
    let ViewDefinition {
        view, transforms, ..
    } = definition.clone();
    let entity = definition.entity();

    let report = with_session(
        store.clone(),
        store,
        config.session_options(),
        move |manager| {
            Box::pin(async move {
                manager.add_entity(entity.clone()).await?;
                let registered = manager
                    .add_feature_view(view, dataset, &entity.name, &transforms, true)
                    .await?;
                let dependencies = manager.get_feature_dependencies(&registered.name)?;
                let stats = manager
                    .feature_stats()
                    .get(&registered.name)
                    .cloned()
                    .unwrap_or_default();
                Ok::<_, Error>(ProfileReport {
                    view: registered.name,
                    version: registered.version,
                    feature_columns: registered.feature_columns,
                    dependencies,
                    stats,
                })
            })
        },
    )
    .await?;

    info!(
        "Profiled {} feature(s) of {}",
        report.stats.len(),
        report.view
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::DEFINITION;
    use featurewatch_core::engine::memory::MemoryFrame;
    use featurewatch_core::ErrorKind;

    fn definition() -> ViewDefinition {
        let definition: ViewDefinition = serde_yaml::from_str(DEFINITION).unwrap();
        definition
    }

    fn sessions(transactions: &str) -> DatasetRef {
        let json = format!(
            r#"[
                {{"CUSTOMER_ID": "c1", "SESSION_DATE": "2024-01-01", "TRANSACTIONS": {t}, "CHANNEL": "web"}},
                {{"CUSTOMER_ID": "c2", "SESSION_DATE": "2024-01-02", "TRANSACTIONS": 4, "CHANNEL": "store"}},
                {{"CUSTOMER_ID": "c3", "SESSION_DATE": "2024-01-03", "TRANSACTIONS": 6, "CHANNEL": "web"}},
                {{"CUSTOMER_ID": "c4", "SESSION_DATE": "2024-01-04", "TRANSACTIONS": 8, "CHANNEL": "web"}}
            ]"#,
            t = transactions
        );
        MemoryFrame::from_json_str(&json).unwrap().into_ref()
    }

    #[tokio::test]
    async fn test_profile_collects_stats() {
        // Given: Four sessions, one with missing transactions
        let dataset = sessions("null");

        // When: Profiling the definition
        let report = profile(&CliConfig::default(), definition(), dataset)
            .await
            .unwrap();

        // Then: The fill transform ran before the stats were collected
        assert_eq!(report.view, "customer_behavior");
        assert_eq!(report.version, "V2_1");
        let transactions = &report.stats["TRANSACTIONS"];
        assert_eq!(transactions.row_count, 4);
        assert_eq!(transactions.null_count, 0);
        assert_eq!(transactions.min_value, Some(0.0));
        assert_eq!(transactions.max_value, Some(8.0));
        assert_eq!(report.stats["CHANNEL"].unique_count, Some(2));

        // And: The qualified dependency names its view even before it is registered
        let expected: BTreeSet<String> = ["FV_MARKETING", "customer_behavior"]
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(report.dependencies, expected);
    }

    #[tokio::test]
    async fn test_profile_surfaces_validation_failures() {
        // Given: A negative transaction count below the configured minimum
        let dataset = sessions("-3");

        // When: Profiling the definition
        let err = profile(&CliConfig::default(), definition(), dataset)
            .await
            .unwrap_err();

        // Then: The range check rejects the dataset
        let core = err.downcast_ref::<Error>().unwrap();
        assert_eq!(core.kind(), ErrorKind::Validation);
    }
}
