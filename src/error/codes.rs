//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Ladder errors
//! - 2xx: Credit errors
//! - 3xx: Config errors
//! - 4xx: Verification errors
//! - 6xx: Storage errors
//! - 8xx: Validation errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for robot mode output.
///
/// Each variant maps to a numeric code (e.g., `LevelNotDefined` -> E101).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Ladder errors (1xx)
    // ========================================
    /// E101: No level definition for the requested (guild, skill, level)
    LevelNotDefined,
    /// E102: A level definition or ladder file is malformed
    LadderInvalid,

    // ========================================
    // Credit errors (2xx)
    // ========================================
    /// E201: Credit amount rejected for the given source
    CreditAmountInvalid,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E302: Config file has invalid syntax or values
    ConfigInvalid,

    // ========================================
    // Verification errors (4xx)
    // ========================================
    /// E401: Verification request does not exist
    VerificationNotFound,
    /// E402: Verification request is no longer pending
    VerificationClosed,
    /// E403: Verifier already voted on this request
    DuplicateVote,
    /// E404: Candidate tried to vote on their own request
    SelfVote,
    /// E405: Verifier level is below the level's minimum
    VerifierIneligible,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    DatabaseError,
    SerializationError,
    /// E606: Progress row changed underneath a read-modify-write
    ConcurrentModification,
    /// E607: Schema migration or transaction rolled back
    TransactionFailed,

    // ========================================
    // Validation errors (8xx)
    // ========================================
    ValidationFailed,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    IoError,
}

impl ErrorCode {
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            // Ladder errors (1xx)
            Self::LevelNotDefined => 101,
            Self::LadderInvalid => 102,

            // Credit errors (2xx)
            Self::CreditAmountInvalid => 201,

            // Config errors (3xx)
            Self::ConfigInvalid => 302,

            // Verification errors (4xx)
            Self::VerificationNotFound => 401,
            Self::VerificationClosed => 402,
            Self::DuplicateVote => 403,
            Self::SelfVote => 404,
            Self::VerifierIneligible => 405,

            // Storage errors (6xx)
            Self::DatabaseError => 604,
            Self::SerializationError => 605,
            Self::ConcurrentModification => 606,
            Self::TransactionFailed => 607,

            // Validation errors (8xx)
            Self::ValidationFailed => 801,

            // Internal errors (9xx)
            Self::IoError => 906,
        }
    }

    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::LevelNotDefined => "Run `gl ladder show <guild> <skill>` to list defined levels, or `gl ladder seed` to create the default ladder",
            Self::LadderInvalid => "Check level numbers start at 1, names are non-empty and voted strategies have a quorum of at least 1",

            Self::CreditAmountInvalid => "Use a positive amount. Negative corrections are only accepted from `manual` or `migration` sources",

            Self::ConfigInvalid => "Run `gl config` to see current values. Check TOML syntax in config file",

            Self::VerificationNotFound => "Run `gl pending <verifier>` to list open verification requests",
            Self::VerificationClosed => "The request was already resolved. Run `gl show <id>` to see its outcome",
            Self::DuplicateVote => "Each verifier votes once per request. Run `gl show <id>` to see recorded votes",
            Self::SelfVote => "Candidates cannot verify their own advancement. Ask another guild member to vote",
            Self::VerifierIneligible => "Only members at or above the level's verifier minimum may vote. Run `gl profile` to check levels",

            Self::DatabaseError => "Check that the database file is readable and not held by another writer. Retry the operation",
            Self::SerializationError => "The data format may be corrupted. Check input data for validity",
            Self::ConcurrentModification => "Another writer changed the same progress row. Retry the operation",
            Self::TransactionFailed => "The operation was rolled back. Check that the database was created by this version of gl",

            Self::ValidationFailed => "Review the input values. Guild, skill and user identifiers must be non-empty slugs",

            Self::IoError => "File operation failed. Check path exists and permissions are correct",
        }
    }

    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::LevelNotDefined
            | Self::LadderInvalid
            | Self::CreditAmountInvalid
            | Self::ConfigInvalid
            | Self::VerificationNotFound
            | Self::VerificationClosed
            | Self::DuplicateVote
            | Self::SelfVote
            | Self::VerifierIneligible
            | Self::ConcurrentModification
            | Self::ValidationFailed
            | Self::IoError => true,

            Self::DatabaseError | Self::SerializationError | Self::TransactionFailed => false,
        }
    }

    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "ladder",
            2 => "credits",
            3 => "config",
            4 => "verification",
            6 => "storage",
            8 => "validation",
            9 => "internal",
            _ => "unknown",
        }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::LevelNotDefined,
            Self::LadderInvalid,
            Self::CreditAmountInvalid,
            Self::ConfigInvalid,
            Self::VerificationNotFound,
            Self::VerificationClosed,
            Self::DuplicateVote,
            Self::SelfVote,
            Self::VerifierIneligible,
            Self::DatabaseError,
            Self::SerializationError,
            Self::ConcurrentModification,
            Self::TransactionFailed,
            Self::ValidationFailed,
            Self::IoError,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
