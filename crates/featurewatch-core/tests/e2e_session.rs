//! E2E tests for namespace-scoped sessions
//!
//! - Work inside a session lands in its own namespace
//! - The namespace is dropped and the previous one restored on every exit
//! - A partially provisioned namespace is rolled back

use async_trait::async_trait;
use featurewatch_core::backend::memory::DEFAULT_NAMESPACE;
use featurewatch_core::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Delegates to the in-memory store but refuses to switch into new namespaces
struct StubbornProvider {
    store: Arc<MemoryFeatureStore>,
    dropped: AtomicBool,
}

#[async_trait]
impl NamespaceProvider for StubbornProvider {
    async fn current_namespace(&self) -> Result<Option<String>> {
        self.store.current_namespace().await
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        self.store.create_namespace(name).await
    }

    async fn use_namespace(&self, name: &str) -> Result<()> {
        if name == DEFAULT_NAMESPACE {
            return self.store.use_namespace(name).await;
        }
        Err(Error::engine(format!("insufficient privileges on {}", name)))
    }

    async fn drop_namespace(&self, name: &str) -> Result<()> {
        self.dropped.store(true, Ordering::SeqCst);
        self.store.drop_namespace(name).await
    }
}

fn customers() -> DatasetRef {
    MemoryFrame::builder()
        .column("CUSTOMER_ID", DataType::String, vec!["c1", "c2", "c3"])
        .column("SPEND", DataType::Float, vec![10.0, 20.0, 30.0])
        .build()
        .unwrap()
        .into_ref()
}

#[tokio::test]
async fn test_e2e_session_work_is_isolated() {
    // Given: A store with the default namespace in use
    let store = Arc::new(MemoryFeatureStore::new());

    // When: Registering an entity and a view inside a session
    let views = with_session(
        store.clone(),
        store.clone(),
        SessionOptions::default(),
        |manager| {
            Box::pin(async move {
                manager
                    .add_entity(Entity::new("CUSTOMER", vec!["CUSTOMER_ID".to_string()]))
                    .await?;
                let config = FeatureViewConfig::new("spend")
                    .with_feature(FeatureConfig::new("SPEND", "Total spend"));
                manager
                    .add_feature_view(config, customers(), "CUSTOMER", &[], true)
                    .await?;
                Ok::<_, Error>(manager.feature_views().keys().cloned().collect::<Vec<_>>())
            })
        },
    )
    .await
    .unwrap();

    // Then: The work happened and the default namespace is back, untouched
    assert_eq!(views, vec!["spend".to_string()]);
    assert_eq!(
        store.current_namespace().await.unwrap().as_deref(),
        Some(DEFAULT_NAMESPACE)
    );
    assert_eq!(store.namespaces().unwrap(), vec![DEFAULT_NAMESPACE.to_string()]);
    assert!(store.entity("CUSTOMER").unwrap().is_none());
    assert!(store.feature_views().unwrap().is_empty());
}

#[tokio::test]
async fn test_e2e_session_sees_its_own_registrations() {
    // Given: An open session
    let store = Arc::new(MemoryFeatureStore::new());
    let mut session = FeatureStoreSession::open(
        store.clone(),
        store.clone(),
        SessionOptions::default().with_namespace("FEATURE_STORE_TEST"),
    )
    .await
    .unwrap();

    // When: Registering through its manager
    let manager = session.manager_mut();
    manager
        .add_entity(Entity::new("CUSTOMER", vec!["CUSTOMER_ID".to_string()]))
        .await
        .unwrap();
    let config =
        FeatureViewConfig::new("spend").with_feature(FeatureConfig::new("SPEND", "Total spend"));
    manager
        .add_feature_view(config, customers(), "CUSTOMER", &[], true)
        .await
        .unwrap();

    // Then: The store shows the view in the session namespace only
    assert_eq!(
        store.current_namespace().await.unwrap().as_deref(),
        Some("FEATURE_STORE_TEST")
    );
    assert_eq!(
        store.feature_views().unwrap(),
        vec!["spend/V1_0".to_string()]
    );

    // When: Closing the session
    session.close().await.unwrap();

    // Then: The namespace is gone
    assert!(!store
        .namespaces()
        .unwrap()
        .contains(&"FEATURE_STORE_TEST".to_string()));
    assert!(store.feature_views().unwrap().is_empty());
}

#[tokio::test]
async fn test_e2e_partial_provisioning_is_rolled_back() {
    // Given: A provider that creates namespaces but cannot switch into them
    let store = Arc::new(MemoryFeatureStore::new());
    let provider = Arc::new(StubbornProvider {
        store: store.clone(),
        dropped: AtomicBool::new(false),
    });

    // When: Opening a session
    let result = FeatureStoreSession::open(provider.clone(), store.clone(), SessionOptions::default()).await;

    // Then: A connection error, and the created namespace was dropped again
    let err = result.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.message().contains("insufficient privileges"));
    assert!(provider.dropped.load(Ordering::SeqCst));
    assert_eq!(store.namespaces().unwrap(), vec![DEFAULT_NAMESPACE.to_string()]);
    assert_eq!(
        store.current_namespace().await.unwrap().as_deref(),
        Some(DEFAULT_NAMESPACE)
    );
}
