use std::{fmt, io};

use http::status::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ConceptError {
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Concept index write failed: {0}")]
    IndexWriteFailed(String),
    #[error("Note write failed: {0}")]
    NoteWriteFailed(String),
    #[error("Resource already deleted: {0}")]
    StaleDelete(String),
    #[error("Migration of '{name}' only partially applied: {reason}")]
    PartialMigration { name: String, reason: String },
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Note for '{name}' is stored at {stored_at}, outside the {scope} storage root")]
    ScopeMismatch {
        name: String,
        stored_at: String,
        scope: String,
    },
    #[error("Remote storage error: {0}")]
    Storage(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
}

impl ConceptError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConceptError::InvalidName(_) => StatusCode::BAD_REQUEST,
            ConceptError::IndexWriteFailed(_) => StatusCode::BAD_GATEWAY,
            ConceptError::NoteWriteFailed(_) => StatusCode::BAD_GATEWAY,
            ConceptError::StaleDelete(_) => StatusCode::GONE,
            ConceptError::PartialMigration { .. } => StatusCode::MULTI_STATUS,
            ConceptError::NotFound(_) => StatusCode::NOT_FOUND,
            ConceptError::ScopeMismatch { .. } => StatusCode::CONFLICT,
            ConceptError::Storage(_) => StatusCode::BAD_GATEWAY,
            ConceptError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ConceptError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ConceptError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ConceptError::PermissionDenied => StatusCode::FORBIDDEN,
        }
    }

    /// True for failures that leave a usable (if untidy) state behind: a stale or
    /// duplicated index entry, or an orphaned resource.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConceptError::IndexWriteFailed(_)
                | ConceptError::NoteWriteFailed(_)
                | ConceptError::StaleDelete(_)
                | ConceptError::PartialMigration { .. }
                | ConceptError::Storage(_)
        )
    }
}

impl From<toml::de::Error> for ConceptError {
    fn from(src: toml::de::Error) -> ConceptError {
        ConceptError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for ConceptError {
    fn from(src: toml::ser::Error) -> ConceptError {
        ConceptError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for ConceptError {
    fn from(src: JsonError) -> ConceptError {
        ConceptError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for ConceptError {
    fn from(src: UrlParseError) -> ConceptError {
        ConceptError::Serialization(format!("Invalid URL: {src}"))
    }
}

impl From<io::Error> for ConceptError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => ConceptError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => ConceptError::PermissionDenied,
            _ => ConceptError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for ConceptError {
    fn from(x: fmt::Error) -> Self {
        ConceptError::Serialization(format!("{x}"))
    }
}
