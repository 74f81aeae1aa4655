//! Error types for the composition engine
//!
//! This module defines the error taxonomy shared by every crate.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! | Kind | Variants | Handling |
//! |------|----------|----------|
//! | Not Found | `NotFound` | Recoverable, often means "first publish" or "no prior value" |
//! | Client | `Client` | Caller data violates an invariant, surfaced verbatim, never retried |
//! | Timeout | `Timeout` | Budget exceeded, commit status unknown |
//! | Defect | `Defect` | Misconfigured record type, fatal |
//! | Internal | `Serialization`, `Storage`, `Config` | Infrastructure errors |
//!
//! Errors raised while resolving a nested reference are wrapped in
//! [`Error::Reference`], which names the failing address without changing the
//! [`ErrorKind`] of the underlying error.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error category, seen through any reference enrichment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Storage miss
    NotFound,
    /// Caller-supplied data is invalid
    Client,
    /// Operation exceeded its time budget
    Timeout,
    /// A record type produced an impossible result
    Defect,
    /// Serialization, storage or configuration failure
    Internal,
}

/// Error types for the composition engine
#[derive(Debug, Error)]
pub enum Error {
    /// Key not found in storage
    #[error("key not found: {key}")]
    NotFound {
        /// The missing key
        key: String,
    },

    /// Caller-supplied data violates an invariant
    #[error("{reason}")]
    Client {
        /// Human readable reason, surfaced verbatim
        reason: String,
    },

    /// Operation exceeded its time budget; the underlying write may have committed
    #[error("{operation} timed out after {budget_ms}ms")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
        /// Budget in milliseconds
        budget_ms: u64,
    },

    /// A record type hook misbehaved
    #[error("defect: {reason}")]
    Defect {
        /// What went wrong
        reason: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {reason}")]
    Serialization {
        /// Underlying error message
        reason: String,
    },

    /// Storage engine error
    #[error("storage error: {reason}")]
    Storage {
        /// Underlying error message
        reason: String,
    },

    /// Invalid configuration
    #[error("configuration error: {reason}")]
    Config {
        /// What is wrong with the configuration
        reason: String,
    },

    /// Error raised while resolving the reference at `address`
    #[error("{source} (in reference {address})")]
    Reference {
        /// Address of the reference being resolved
        address: String,
        /// The original error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not-found error for `key`
    pub fn not_found(key: impl Into<String>) -> Self {
        Error::NotFound { key: key.into() }
    }

    /// Create a client error
    pub fn client(reason: impl Into<String>) -> Self {
        Error::Client {
            reason: reason.into(),
        }
    }

    /// Create a timeout error for `operation`
    pub fn timeout(operation: impl Into<String>, budget: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            budget_ms: budget.as_millis() as u64,
        }
    }

    /// Create a defect error
    pub fn defect(reason: impl Into<String>) -> Self {
        Error::Defect {
            reason: reason.into(),
        }
    }

    /// Create a storage error
    pub fn storage(reason: impl Into<String>) -> Self {
        Error::Storage {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }

    /// Wrap this error with the address of the reference that produced it
    pub fn in_reference(self, address: impl Into<String>) -> Self {
        Error::Reference {
            address: address.into(),
            source: Box::new(self),
        }
    }

    /// The category of this error, looking through reference enrichment
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Client { .. } => ErrorKind::Client,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Defect { .. } => ErrorKind::Defect,
            Error::Serialization { .. } | Error::Storage { .. } | Error::Config { .. } => {
                ErrorKind::Internal
            }
            Error::Reference { source, .. } => source.kind(),
        }
    }

    /// True if this is (or wraps) a storage miss
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// The innermost error, with all reference enrichment removed
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Reference { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Addresses of the references this error passed through, outermost first
    pub fn reference_trail(&self) -> Vec<&str> {
        let mut trail = Vec::new();
        let mut current = self;
        while let Error::Reference { address, source } = current {
            trail.push(address.as_str());
            current = source;
        }
        trail
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            reason: e.to_string(),
        }
    }
}
