//! Error taxonomy shared across crates.

use thiserror::Error;

/// Why an inbound frame could not be turned into a routable unit.
///
/// Always recoverable: reported to the originating connection as an
/// `error` envelope while the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    /// Top-level kind or chat `message_type` outside the accepted set.
    #[error("Unsupported message type: {0}")]
    UnsupportedType(String),
    /// Not decodable as the expected envelope shape.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    /// A required field was absent or null.
    #[error("{0} is required")]
    MissingField(&'static str),
}

impl ClassificationError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => "unsupported_type",
            Self::MalformedFrame(_) => "malformed_frame",
            Self::MissingField(_) => "missing_field",
        }
    }
}

/// Failure reported by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage rejected message: {0}")]
    Rejected(String),
}

/// Failure reported by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token subject is not a user id: {0}")]
    InvalidSubject(String),
    #[error("token subject {token} does not match user {requested}")]
    SubjectMismatch { token: String, requested: String },
}
