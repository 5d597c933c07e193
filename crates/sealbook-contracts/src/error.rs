//! Error types for the Sealbook ledger core.
//!
//! All fallible operations return `SealResult<T>`.  Variants carry enough
//! context (entry numbers, event ids, reasons) for an operator to act on them
//! without re-running the failing command.

use thiserror::Error;

use crate::money::Cents;

/// Broad grouping of a `SealError`, used by callers that only need to decide
/// how to present or escalate a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any write; the caller can fix the input and retry.
    Validation,
    /// Sealed history does not match its seal.  Never repaired automatically.
    Integrity,
    /// Key derivation, encryption, or authentication failed.
    Crypto,
    /// The storage engine refused or failed a statement.
    Storage,
    /// Configuration, serialization, or artifact format problems.
    Format,
}

/// The unified error type for the Sealbook core.
#[derive(Debug, Error)]
pub enum SealError {
    /// Debit and credit totals of a journal draft differ.
    #[error("unbalanced entry: total debit {total_debit} does not equal total credit {total_credit}")]
    UnbalancedEntry { total_debit: Cents, total_credit: Cents },

    /// A single journal line violates the double-entry line rules.
    #[error("invalid journal line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },

    /// An amount is negative, overflows, or is not a whole number of cents.
    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Any other malformed input, e.g. an inverted reporting period.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// No active jurisdiction exists for the requested code.
    #[error("jurisdiction not found: '{code}'")]
    JurisdictionNotFound { code: String },

    /// A looked-up record does not exist.
    #[error("{kind} not found: '{id}'")]
    NotFound { kind: &'static str, id: String },

    /// An event's `previous_hash` does not point at its predecessor.
    #[error("broken chain link at event {event_id}: expected previous hash {expected}, found {found}")]
    BrokenLink {
        event_id: i64,
        expected: String,
        found: String,
    },

    /// An event's stored content no longer matches its seal.
    #[error("tamper detected at event {event_id}: stored content does not match its seal")]
    TamperDetected { event_id: i64 },

    /// A sealed event refers to a business record that cannot be found, or
    /// a business record has no sealing event.
    #[error("missing source record: {reason}")]
    MissingSource { reason: String },

    /// Any other mismatch between sealed data and what is stored.
    #[error("integrity violation: {reason}")]
    IntegrityViolation { reason: String },

    /// The storage engine rejected an UPDATE or DELETE on sealed history.
    #[error("ledger is append-only: {reason}")]
    AppendOnly { reason: String },

    /// AES-GCM authentication failed while opening a backup payload.
    #[error("invalid password or corrupted artifact")]
    AuthenticationFailed,

    /// Key derivation or cipher setup failed.
    #[error("cryptographic error: {reason}")]
    Crypto { reason: String },

    /// Any storage engine failure other than an append-only violation.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// Canonical serialization or deserialization failed.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// Compressing or decompressing a backup payload failed.
    #[error("compression error: {reason}")]
    Compression { reason: String },

    /// A backup artifact is malformed or incompatible.
    #[error("invalid backup artifact: {reason}")]
    InvalidArtifact { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

impl SealError {
    /// The category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnbalancedEntry { .. }
            | Self::InvalidLine { .. }
            | Self::InvalidAmount { .. }
            | Self::InvalidInput { .. }
            | Self::JurisdictionNotFound { .. }
            | Self::NotFound { .. } => ErrorCategory::Validation,

            Self::BrokenLink { .. }
            | Self::TamperDetected { .. }
            | Self::MissingSource { .. }
            | Self::IntegrityViolation { .. } => ErrorCategory::Integrity,

            Self::AuthenticationFailed | Self::Crypto { .. } => ErrorCategory::Crypto,

            Self::AppendOnly { .. } | Self::Storage { .. } => ErrorCategory::Storage,

            Self::Serialization { .. }
            | Self::Compression { .. }
            | Self::InvalidArtifact { .. }
            | Self::ConfigError { .. } => ErrorCategory::Format,
        }
    }

    /// Validation failures are the only ones a caller can fix by retrying
    /// with different input.
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }
}

impl From<serde_json::Error> for SealError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            reason: e.to_string(),
        }
    }
}

/// Convenience alias used throughout the Sealbook crates.
pub type SealResult<T> = Result<T, SealError>;
