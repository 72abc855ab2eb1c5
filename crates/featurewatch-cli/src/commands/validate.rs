//! Validate a feature view definition file

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;

use crate::output::{
    create_table, format_percent, print_error, print_info, print_structured, print_success,
    print_warning, OutputFormat,
};

use super::{load_definition, ViewDefinition};

/// What `validate` reports for a definition
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub name: String,
    pub full_name: String,
    pub version: String,
    pub entity: String,
    pub refresh: String,
    pub features: Vec<FeatureSummary>,
    pub transforms: Vec<TransformSummary>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FeatureSummary {
    pub name: String,
    pub description: String,
    pub null_threshold: f64,
    pub range: Option<String>,
    pub unique_threshold: Option<f64>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TransformSummary {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Returns whether the definition is valid
pub async fn run(file: &str, format: OutputFormat) -> Result<bool> {
    let definition = match load_definition(file) {
        Ok(definition) => definition,
        Err(e) => {
            print_error(&format!("{:#}", e));
            return Ok(false);
        }
    };

    let report = inspect(&definition);
    if print_structured(&report, format)? {
        return Ok(true);
    }

    print_success(&format!("{} is valid", file));
    println!();
    println!("Feature View: {}", report.name);
    println!("{}", "-".repeat(50));
    println!("  Full name: {}", report.full_name);
    println!("  Version:   {}", report.version);
    println!("  Entity:    {}", report.entity);
    println!("  Refresh:   {}", report.refresh);
    println!();

    let mut table = create_table();
    table.set_header(vec![
        "Feature",
        "Description",
        "Max Nulls",
        "Range",
        "Min Unique",
        "Depends On",
    ]);
    for feature in &report.features {
        table.add_row(vec![
            Cell::new(&feature.name),
            Cell::new(&feature.description),
            Cell::new(format_percent(feature.null_threshold)),
            Cell::new(feature.range.as_deref().unwrap_or("-")),
            Cell::new(feature.unique_threshold.map(format_percent).unwrap_or_else(|| "-".into())),
            Cell::new(feature.dependencies.join(", ")),
        ]);
    }
    println!("{table}");

    for transform in &report.transforms {
        print_info(&format!(
            "Transform {}: {} -> {}",
            transform.name,
            transform.inputs.join(", "),
            transform.outputs.join(", ")
        ));
    }
    for warning in &report.warnings {
        print_warning(warning);
    }

    Ok(true)
}

/// Summarize a parsed definition
pub fn inspect(definition: &ViewDefinition) -> ValidationReport {
    let view = &definition.view;
    let mut warnings = Vec::new();

    let features: Vec<FeatureSummary> = view
        .features
        .values()
        .map(|feature| {
            let validation = &feature.validation;
            let range = if validation.range_check {
                if validation.min_value.is_none() && validation.max_value.is_none() {
                    warnings.push(format!(
                        "Feature {} enables range_check without min_value or max_value",
                        feature.name
                    ));
                }
                Some(format!(
                    "[{}, {}]",
                    bound(validation.min_value),
                    bound(validation.max_value)
                ))
            } else {
                None
            };
            FeatureSummary {
                name: feature.name.clone(),
                description: feature.description.clone(),
                null_threshold: validation.null_threshold,
                range,
                unique_threshold: validation
                    .unique_check
                    .then_some(validation.unique_threshold),
                dependencies: feature.dependencies.clone(),
            }
        })
        .collect();

    if view.features.is_empty() {
        warnings.push(format!("Feature view {} declares no features", view.name));
    }
    if view.timestamp_col.is_none() {
        warnings.push(format!(
            "Feature view {} has no timestamp_col, point-in-time joins will use latest values",
            view.name
        ));
    }

    let transforms: Vec<TransformSummary> = definition
        .transforms
        .iter()
        .map(|t| TransformSummary {
            name: t.name.clone(),
            inputs: t.input_columns(),
            outputs: t.output_columns(),
        })
        .collect();

    ValidationReport {
        name: view.name.clone(),
        full_name: view.full_name(),
        version: view.version(),
        entity: format!("{} ({})", view.entity, definition.join_keys.join(", ")),
        refresh: format!("every {} ({})", view.refresh.frequency, view.refresh.mode),
        features,
        transforms,
        warnings,
    }
}

fn bound(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
