//! Namespace-scoped feature store sessions
//!
//! A session creates a working namespace, switches to it and hands out a
//! [`FeatureStoreManager`] bound to it. Closing the session drops the
//! namespace (unless cleanup is disabled) and switches back to the namespace
//! that was in use before.
//!
//! Use [`with_session`] to get the release on every exit path; a session
//! opened with [`FeatureStoreSession::open`] must be closed explicitly.
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryFeatureStore::new());
//! let views = with_session(store.clone(), store, SessionOptions::default(), |manager| {
//!     Box::pin(async move {
//!         manager.add_entity(customer).await?;
//!         manager.add_feature_view(config, data, "CUSTOMER", &[], true).await?;
//!         Ok(manager.feature_views().len())
//!     })
//! })
//! .await?;
//! ```

use crate::backend::{FeatureStoreBackend, NamespaceProvider};
use crate::manager::{unique_name, FeatureStoreManager, ManagerOptions};
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Prefix of generated session namespaces
pub const NAMESPACE_PREFIX: &str = "FEATURE_STORE";

/// How a session is provisioned
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Working namespace; `FEATURE_STORE_{timestamp}_{id}` when absent
    pub namespace: Option<String>,
    /// Drop the working namespace on close
    pub cleanup: bool,
    pub manager: ManagerOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            cleanup: true,
            manager: ManagerOptions::new().with_overwrite(true),
        }
    }
}

impl SessionOptions {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_manager(mut self, manager: ManagerOptions) -> Self {
        self.manager = manager;
        self
    }
}

/// A manager bound to its own working namespace
pub struct FeatureStoreSession {
    provider: Arc<dyn NamespaceProvider>,
    namespace: String,
    original: Option<String>,
    cleanup: bool,
    manager: FeatureStoreManager,
    closed: bool,
}

impl FeatureStoreSession {
    /// Create and switch to the working namespace
    ///
    /// If the namespace was created but cannot be used, or the manager cannot
    /// be built, the namespace is dropped again before the error is returned.
    pub async fn open(
        provider: Arc<dyn NamespaceProvider>,
        backend: Arc<dyn FeatureStoreBackend>,
        options: SessionOptions,
    ) -> Result<Self> {
        let SessionOptions {
            namespace,
            cleanup,
            manager,
        } = options;
        let namespace = namespace.unwrap_or_else(|| unique_name(NAMESPACE_PREFIX));

        let original = provider.current_namespace().await.map_err(|e| {
            Error::connection(format!("Failed to read current namespace: {}", e.message()))
        })?;

        provider.create_namespace(&namespace).await.map_err(|e| {
            Error::connection(format!(
                "Failed to create namespace {}: {}",
                namespace,
                e.message()
            ))
        })?;

        if let Err(e) = provider.use_namespace(&namespace).await {
            teardown(provider.as_ref(), &namespace, original.as_deref(), true).await;
            return Err(Error::connection(format!(
                "Failed to use namespace {}: {}",
                namespace,
                e.message()
            )));
        }

        let manager = match FeatureStoreManager::new(backend, manager) {
            Ok(manager) => manager,
            Err(e) => {
                teardown(provider.as_ref(), &namespace, original.as_deref(), true).await;
                return Err(e);
            }
        };

        info!(
            "Opened feature store session in namespace {} (previous: {:?})",
            namespace, original
        );
        Ok(Self {
            provider,
            namespace,
            original,
            cleanup,
            manager,
            closed: false,
        })
    }

    /// The working namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Namespace restored on close
    pub fn original_namespace(&self) -> Option<&str> {
        self.original.as_deref()
    }

    pub fn manager(&self) -> &FeatureStoreManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut FeatureStoreManager {
        &mut self.manager
    }

    /// Drop the working namespace (if cleanup is on) and restore the previous one
    ///
    /// Both steps are always attempted. Fails with a connection error if
    /// either did.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        let ok = teardown(
            self.provider.as_ref(),
            &self.namespace,
            self.original.as_deref(),
            self.cleanup,
        )
        .await;
        if ok {
            info!("Closed feature store session {}", self.namespace);
            Ok(())
        } else {
            Err(Error::connection(format!(
                "Teardown of namespace {} did not complete",
                self.namespace
            )))
        }
    }
}

impl Drop for FeatureStoreSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "Feature store session {} dropped without close, namespace left in place",
                self.namespace
            );
        }
    }
}

/// Run `body` inside a session, closing it whatever the outcome
///
/// An error from `body` wins over a teardown error; the latter is only
/// logged in that case. A panic in `body` is resumed after the session closes.
pub async fn with_session<T, F>(
    provider: Arc<dyn NamespaceProvider>,
    backend: Arc<dyn FeatureStoreBackend>,
    options: SessionOptions,
    body: F,
) -> Result<T>
where
    F: for<'a> FnOnce(&'a mut FeatureStoreManager) -> BoxFuture<'a, Result<T>>,
{
    let mut session = FeatureStoreSession::open(provider, backend, options).await?;
    let result = AssertUnwindSafe(body(session.manager_mut()))
        .catch_unwind()
        .await;
    let closed = session.close().await;

    let result = match result {
        Ok(result) => result,
        Err(payload) => {
            if let Err(teardown_err) = closed {
                warn!("{}", teardown_err);
            }
            panic::resume_unwind(payload);
        }
    };
    match result {
        Ok(value) => closed.map(|()| value),
        Err(e) => {
            if let Err(teardown_err) = closed {
                warn!("{}", teardown_err);
            }
            Err(e)
        }
    }
}

/// Returns whether every step succeeded
async fn teardown(
    provider: &dyn NamespaceProvider,
    namespace: &str,
    original: Option<&str>,
    drop_namespace: bool,
) -> bool {
    let mut ok = true;

    if drop_namespace {
        match provider.drop_namespace(namespace).await {
            Ok(()) => info!("Cleaned up namespace {}", namespace),
            Err(e) => {
                error!("Cleanup of namespace {} failed: {}", namespace, e.message());
                ok = false;
            }
        }
    }

    if let Some(original) = original {
        if let Err(e) = provider.use_namespace(original).await {
            error!(
                "Failed to restore namespace {}: {}",
                original,
                e.message()
            );
            ok = false;
        }
    }
    ok
}
