//! Error types for visitrack
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in visitrack
#[derive(Debug, Error)]
pub enum VisitrackError {
    /// Malformed coordinates or form input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Site registry could not be read
    #[error("Site registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// GPS provider could not produce a fix
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// GPS access was refused
    #[error("Location access denied: {0}")]
    PermissionDenied(String),

    /// A collaborator did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Visit record store unreachable or rejected the request
    #[error("Visit store unavailable: {0}")]
    StoreUnavailable(String),

    /// Visit not found in the store
    #[error("Visit not found: {0}")]
    VisitNotFound(String),

    /// Site not found in the registry
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    /// Frequent visitor not found in the store
    #[error("Frequent visitor not found: {0}")]
    FrequentVisitorNotFound(String),

    /// Visit already has a checkout time
    #[error("Visit already checked out: {0}")]
    AlreadyCheckedOut(String),

    /// Local persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VisitrackError {
    /// Returns true for failures the caller should absorb ("no location detected",
    /// "auto-checkout deferred") rather than treat as fatal to the call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VisitrackError::RegistryUnavailable(_)
                | VisitrackError::PositionUnavailable(_)
                | VisitrackError::PermissionDenied(_)
                | VisitrackError::Timeout(_)
                | VisitrackError::StoreUnavailable(_)
        )
    }
}

/// Result type alias for visitrack operations
pub type Result<T> = std::result::Result<T, VisitrackError>;
