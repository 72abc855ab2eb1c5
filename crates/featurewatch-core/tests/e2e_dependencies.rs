//! E2E tests for feature dependency tracking
//!
//! Registers views through the manager and queries the dependency closure:
//! - Bare dependency names resolved to whichever view defines the feature
//! - Qualified `view.feature` dependencies resolved exactly
//! - Failed registrations leave the graph untouched

use featurewatch_core::prelude::*;
use std::collections::BTreeSet;

fn data(columns: &[&str]) -> DatasetRef {
    columns
        .iter()
        .fold(
            MemoryFrame::builder().column("CUSTOMER_ID", DataType::String, vec!["c1", "c2"]),
            |builder, column| builder.column(*column, DataType::Float, vec![1.0, 2.0]),
        )
        .build()
        .unwrap()
        .into_ref()
}

fn view(name: &str, features: &[(&str, &[&str])]) -> FeatureViewConfig {
    features
        .iter()
        .fold(FeatureViewConfig::new(name), |config, (feature, deps)| {
            let feature = deps
                .iter()
                .fold(FeatureConfig::new(*feature, ""), |f, d| f.depends_on(*d));
            config.with_feature(feature)
        })
}

async fn manager() -> FeatureStoreManager {
    let store = Arc::new(MemoryFeatureStore::new());
    let mut manager = FeatureStoreManager::new(store, ManagerOptions::default()).unwrap();
    manager
        .add_entity(Entity::new("CUSTOMER", vec!["CUSTOMER_ID".to_string()]))
        .await
        .unwrap();
    manager
}

async fn register(manager: &mut FeatureStoreManager, config: FeatureViewConfig, columns: &[&str]) {
    manager
        .add_feature_view(config, data(columns), "CUSTOMER", &[], false)
        .await
        .unwrap();
}

fn names(views: &[&str]) -> BTreeSet<String> {
    views.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_e2e_bare_dependency_across_views() {
    // Given: View A with f1 depending on g1, view B defining g1
    let mut manager = manager().await;
    register(&mut manager, view("A", &[("f1", &["g1"])]), &["f1"]).await;
    register(&mut manager, view("B", &[("g1", &[])]), &["g1"]).await;

    // When: Asking for A's dependencies
    let deps = manager.get_feature_dependencies("A").unwrap();

    // Then: B is reachable
    assert!(deps.contains("B"));
    assert_eq!(deps, names(&["A", "B"]));
    assert_eq!(manager.get_feature_dependencies("B").unwrap(), names(&["B"]));
}

#[tokio::test]
async fn test_e2e_transitive_and_qualified_dependencies() {
    // Given: A → B (bare), B → C.h1 (qualified), D also defines h1
    let mut manager = manager().await;
    register(&mut manager, view("C", &[("h1", &[])]), &["h1"]).await;
    register(&mut manager, view("D", &[("h1", &[])]), &["h1"]).await;
    register(&mut manager, view("B", &[("g1", &["C.h1"])]), &["g1"]).await;
    register(&mut manager, view("A", &[("f1", &["g1"])]), &["f1"]).await;

    // When: Asking for A's dependencies
    let deps = manager.get_feature_dependencies("A").unwrap();

    // Then: The closure follows B into C only
    assert_eq!(deps, names(&["A", "B", "C"]));
}

#[tokio::test]
async fn test_e2e_failed_registration_leaves_graph_untouched() {
    // Given: A view whose data breaks the null threshold
    let mut manager = manager().await;
    let broken = MemoryFrame::builder()
        .column("CUSTOMER_ID", DataType::String, vec!["c1", "c2"])
        .column("f1", DataType::Float, vec![None, Some(1.0)])
        .build()
        .unwrap()
        .into_ref();

    // When: Registration fails
    let result = manager
        .add_feature_view(view("A", &[("f1", &["g1"])]), broken, "CUSTOMER", &[], false)
        .await;

    // Then: The view never reaches the graph
    assert!(result.is_err());
    let err = manager.get_feature_dependencies("A").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FeatureView);
    assert_eq!(manager.dependencies().node_count(), 0);
}
