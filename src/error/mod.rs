//! Error handling for guild-ladder.
//!
//! This module provides:
//! - [`LadderError`]: The main error enum for all ladder operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Rich error type with suggestion and context

mod codes;

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;

/// Main error type for guild-ladder operations.
#[derive(Error, Debug)]
pub enum LadderError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid credit amount {amount} from source '{source_type}'")]
    InvalidAmount { amount: i64, source_type: String },

    #[error("Invalid ladder: {0}")]
    InvalidLadder(String),

    #[error("Level {level} is not defined for {guild}/{skill}")]
    LevelNotDefined {
        guild: String,
        skill: String,
        level: u32,
    },

    #[error("Verification request not found: {0}")]
    VerificationNotFound(String),

    #[error("Verification {id} is {status}, votes are only accepted while pending")]
    InvalidState { id: String, status: String },

    #[error("Verifier '{verifier}' already voted on verification {id}")]
    DuplicateVote { id: String, verifier: String },

    #[error("Verifier '{0}' cannot vote on their own verification")]
    SelfVote(String),

    #[error("Verifier '{verifier}' is at level {actual}, level {required} is required to vote")]
    VerifierIneligible {
        verifier: String,
        actual: u32,
        required: u32,
    },

    #[error("Progress for {0} was modified concurrently")]
    ConcurrentModification(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

impl LadderError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) | Self::Serialization(_) => ErrorCode::SerializationError,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::InvalidAmount { .. } => ErrorCode::CreditAmountInvalid,
            Self::InvalidLadder(_) => ErrorCode::LadderInvalid,
            Self::LevelNotDefined { .. } => ErrorCode::LevelNotDefined,
            Self::VerificationNotFound(_) => ErrorCode::VerificationNotFound,
            Self::InvalidState { .. } => ErrorCode::VerificationClosed,
            Self::DuplicateVote { .. } => ErrorCode::DuplicateVote,
            Self::SelfVote(_) => ErrorCode::SelfVote,
            Self::VerifierIneligible { .. } => ErrorCode::VerifierIneligible,
            Self::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            Self::TransactionFailed(_) => ErrorCode::TransactionFailed,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::InvalidAmount {
                amount,
                source_type,
            } => Some(serde_json::json!({ "amount": amount, "source_type": source_type })),
            Self::LevelNotDefined {
                guild,
                skill,
                level,
            } => Some(serde_json::json!({ "guild": guild, "skill": skill, "level": level })),
            Self::VerificationNotFound(id) => Some(serde_json::json!({ "verification_id": id })),
            Self::InvalidState { id, status } => {
                Some(serde_json::json!({ "verification_id": id, "status": status }))
            }
            Self::DuplicateVote { id, verifier } => {
                Some(serde_json::json!({ "verification_id": id, "verifier": verifier }))
            }
            Self::SelfVote(verifier) => Some(serde_json::json!({ "verifier": verifier })),
            Self::VerifierIneligible {
                verifier,
                actual,
                required,
            } => Some(serde_json::json!({
                "verifier": verifier,
                "actual_level": actual,
                "required_level": required,
            })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_ladder_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
///
/// Emitted in robot mode so scripts can branch on `code` instead of
/// parsing messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "DUPLICATE_VOTE")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 403)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Error category (e.g., "verification", "config")
    pub category: String,
}

impl StructuredError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn from_ladder_error(err: &LadderError) -> Self {
        let mut structured = Self::new(err.code(), err.to_string());
        structured.context = err.context();
        structured
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<LadderError> for StructuredError {
    fn from(err: LadderError) -> Self {
        Self::from_ladder_error(&err)
    }
}

impl From<&LadderError> for StructuredError {
    fn from(err: &LadderError) -> Self {
        Self::from_ladder_error(err)
    }
}

impl From<toml::de::Error> for LadderError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias using `LadderError`.
pub type Result<T> = std::result::Result<T, LadderError>;
