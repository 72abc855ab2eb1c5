//! Error types for featurewatch
//!
//! Every failure that leaves the crate is one of a small set of kinds:
//! configuration, connection, entity, feature view, validation or
//! feature-store level. Collaborators (datasets, backends) report their own
//! failures as [`Error::Engine`]; the manager re-wraps those into one of the
//! user-facing kinds before returning.

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors that can occur in featurewatch
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration (bad refresh frequency, unreadable YAML, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The analytical engine or its namespace could not be reached or changed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Entity not found, or entity registration failed
    #[error("Entity error: {0}")]
    Entity(String),

    /// Build, registration, dependency lookup or drift check failure
    #[error("Feature view error: {0}")]
    FeatureView(String),

    /// A monitored feature breached its configured rules, or a dataset has no schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Training/inference dataset generation failed
    #[error("Feature store error: {0}")]
    FeatureStore(String),

    /// Failure reported by a dataset or backend implementation
    ///
    /// Never returned unwrapped from a manager operation.
    #[error("Engine error: {0}")]
    Engine(String),

    /// JSON encoding/decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Discriminant of [`Error`], handy for assertions and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Entity,
    FeatureView,
    Validation,
    FeatureStore,
    Engine,
    Serialization,
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn entity(msg: impl Into<String>) -> Self {
        Self::Entity(msg.into())
    }

    pub fn feature_view(msg: impl Into<String>) -> Self {
        Self::FeatureView(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn feature_store(msg: impl Into<String>) -> Self {
        Self::FeatureStore(msg.into())
    }

    /// Creates an Engine error from a message
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Which kind of failure this is
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Entity(_) => ErrorKind::Entity,
            Self::FeatureView(_) => ErrorKind::FeatureView,
            Self::Validation(_) => ErrorKind::Validation,
            Self::FeatureStore(_) => ErrorKind::FeatureStore,
            Self::Engine(_) => ErrorKind::Engine,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// The message carried by the error, without the kind prefix
    pub fn message(&self) -> String {
        match self {
            Self::Configuration(msg)
            | Self::Connection(msg)
            | Self::Entity(msg)
            | Self::FeatureView(msg)
            | Self::Validation(msg)
            | Self::FeatureStore(msg)
            | Self::Engine(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
        }
    }
}
