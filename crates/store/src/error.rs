use thiserror::Error;

/// Errors surfaced by a [`DocumentStore`](crate::DocumentStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("precondition failed for {collection}/{id}")]
    PreconditionFailed { collection: String, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("URL parse error: {0}")]
    Url(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn precondition_failed(collection: &str, id: &str) -> Self {
        Self::PreconditionFailed {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

// reqwest/serde errors are not Clone, and watch events need to be, so they
// are flattened into their messages at the boundary.
impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<url::ParseError> for StoreError {
    fn from(err: url::ParseError) -> Self {
        Self::Url(err.to_string())
    }
}
