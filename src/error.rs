//! Error handling for listshare

use std::fmt;

use listshare_auth::AuthError;
use listshare_store::StoreError;
use thiserror::Error;

/// Unified error type for the list, task, notification and category layers
#[derive(Error, Debug)]
pub enum Error {
    /// The principal's effective permission is too low for the action
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A referenced list, task, notification, template or category does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Malformed input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The grantee already holds a grant on the list
    #[error("List {list_id} is already shared with {email}")]
    AlreadyShared { list_id: String, email: String },

    /// Transient connectivity or backend failure; safe to retry by hand
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The session has ended or no principal is signed in
    #[error("Not signed in")]
    Unauthenticated,

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity provider errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Any other store failure
    #[error("Store error: {0}")]
    Store(StoreError),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new permission error
    pub fn permission_denied<T: fmt::Display>(msg: T) -> Self {
        Error::PermissionDenied(msg.to_string())
    }

    /// Create a new not-found error
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        Error::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create a new invalid-argument error
    pub fn invalid_argument<T: fmt::Display>(msg: T) -> Self {
        Error::InvalidArgument(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Whether a manual retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

fn kind_of(collection: &str) -> &'static str {
    match collection {
        crate::collections::LISTS => "List",
        crate::collections::TASKS => "Task",
        crate::collections::NOTIFICATIONS => "Notification",
        crate::collections::CATEGORIES => "Category",
        crate::collections::TEMPLATES => "Template",
        _ => "Document",
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => Error::NotFound {
                kind: kind_of(&collection),
                id,
            },
            StoreError::Unavailable(msg) | StoreError::Http(msg) => Error::StoreUnavailable(msg),
            other => Error::Store(other),
        }
    }
}

/// Result type for listshare operations
pub type Result<T> = std::result::Result<T, Error>;
