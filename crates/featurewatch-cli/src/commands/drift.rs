//! Compare new data against a baseline registration

use anyhow::Result;
use comfy_table::Cell;
use featurewatch_core::backend::memory::MemoryFeatureStore;
use featurewatch_core::{with_session, DatasetRef, DriftMetrics, Error, DRIFT_THRESHOLD};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::CliConfig;
use crate::output::{
    create_table, format_drift, print_structured, print_success, print_warning, OutputFormat,
};

use super::{load_definition, load_records, ViewDefinition};

#[derive(Debug, Serialize)]
pub struct DriftReport {
    pub view: String,
    pub threshold: f64,
    /// Features whose drift exceeded the threshold
    pub drifted: BTreeMap<String, DriftMetrics>,
}

/// Returns whether any feature drifted
pub async fn run(
    config: &CliConfig,
    file: &str,
    baseline: &str,
    current: &str,
    format: OutputFormat,
) -> Result<bool> {
    let definition = load_definition(file)?;
    let baseline = load_records(baseline)?;
    let current = load_records(current)?;

    let report = check(config, definition, baseline, current).await?;
    let drifted = !report.drifted.is_empty();
    if print_structured(&report, format)? {
        return Ok(drifted);
    }

    if !drifted {
        print_success(&format!("No drift detected for {}", report.view));
        return Ok(false);
    }

    print_warning(&format!(
        "Drift detected in {} feature(s) of {} (threshold {})",
        report.drifted.len(),
        report.view,
        report.threshold
    ));
    let mut table = create_table();
    table.set_header(vec!["Feature", "Null Ratio Change", "Mean Shift", "Std Ratio"]);
    for (feature, metrics) in &report.drifted {
        table.add_row(vec![
            Cell::new(feature),
            format_drift(Some(metrics.null_ratio_change), report.threshold),
            format_drift(metrics.mean_shift, report.threshold),
            format_drift(metrics.std_ratio, report.threshold),
        ]);
    }
    println!("{table}");

    Ok(true)
}

/// Register on `baseline` in a throwaway session, then check `current`
pub async fn check(
    config: &CliConfig,
    definition: ViewDefinition,
    baseline: DatasetRef,
    current: DatasetRef,
) -> Result<DriftReport> {
    let store = Arc::new(MemoryFeatureStore::new());
    let entity = definition.entity();
    let ViewDefinition {
        view, transforms, ..
    } = definition;

    let report = with_session(
        store.clone(),
        store,
        config.session_options(),
        move |manager| {
            Box::pin(async move {
                manager.add_entity(entity.clone()).await?;
                let registered = manager
                    .add_feature_view(view, baseline, &entity.name, &transforms, true)
                    .await?;
                let drifted = manager
                    .check_feature_drift(&registered.name, current)
                    .await?;
                Ok::<_, Error>(DriftReport {
                    view: registered.name,
                    threshold: DRIFT_THRESHOLD,
                    drifted,
                })
            })
        },
    )
    .await?;

    Ok(report)
}
