//! Error types for the certificate assignment engine.
//!
//! This module defines the error hierarchy for catalog, assignment and store
//! operations, configuration loading and snapshot persistence.

use std::path::PathBuf;

use certify_store::{CourseId, StoreError, StoreErrorKind, TemplateId};

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, CertifyError>;

/// Errors that can occur while managing certificate templates.
///
/// Validation and not-found errors abort a whole batch before any row is
/// written. Variants carry an actionable suggestion where one exists.
#[derive(Debug, thiserror::Error)]
pub enum CertifyError {
    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The request is malformed (empty course selection, missing field).
    #[error("Invalid request: {message}\n\nSuggestion: {suggestion}")]
    Validation {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the caller.
        suggestion: String,
    },

    /// The referenced template does not exist.
    #[error("Template not found: {id}\n\nSuggestion: Reload the template list; it may have been deleted by another session")]
    TemplateNotFound {
        /// Identifier that was looked up.
        id: TemplateId,
    },

    /// One or more referenced courses are unknown to the Course Registry.
    #[error("Unknown course(s): {}\n\nSuggestion: Refresh the course list before assigning certificates", format_ids(.ids))]
    CourseNotFound {
        /// Every unknown course in the request.
        ids: Vec<CourseId>,
    },

    /// The course is owned by another template and the caller asked not to
    /// take it over.
    #[error("Course {course} is already governed by template {owner}\n\nSuggestion: Remove it from template {owner} first, or allow reassignment")]
    Conflict {
        /// Course in dispute.
        course: CourseId,
        /// Template currently governing the course.
        owner: TemplateId,
    },

    // ========================================================================
    // Store Errors
    // ========================================================================
    /// The Template Store failed in a way that may succeed on retry.
    #[error("Template Store temporarily unavailable during {operation}: {message}\n\nSuggestion: Retry the operation; writes are idempotent")]
    TransientStore {
        /// Store operation that failed.
        operation: String,
        /// Message reported by the store.
        message: String,
    },

    /// The Template Store rejected the call.
    #[error("Template Store rejected {operation}: {message}")]
    Store {
        /// Store operation that failed.
        operation: String,
        /// Message reported by the store.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your certify.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// Snapshot file contains data that cannot be loaded.
    #[error("Corrupted snapshot file '{path}': {message}\n\nSuggestion: Restore the snapshot from backup or remove it to start empty")]
    SnapshotCorrupted {
        /// Path to the snapshot file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_ids(ids: &[CourseId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CertifyError {
    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `TemplateNotFound` error.
    #[must_use]
    pub const fn template_not_found(id: TemplateId) -> Self {
        Self::TemplateNotFound { id }
    }

    /// Creates a new `CourseNotFound` error.
    #[must_use]
    pub fn course_not_found(ids: impl IntoIterator<Item = CourseId>) -> Self {
        Self::CourseNotFound {
            ids: ids.into_iter().collect(),
        }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `SnapshotCorrupted` error.
    #[must_use]
    pub fn snapshot_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SnapshotCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wraps a store failure, keeping the name of the operation.
    #[must_use]
    pub fn from_store(operation: impl Into<String>, error: StoreError) -> Self {
        let operation = operation.into();
        match error.kind {
            StoreErrorKind::Transient => Self::TransientStore {
                operation,
                message: error.message,
            },
            StoreErrorKind::NotFound | StoreErrorKind::Rejected => Self::Store {
                operation,
                message: error.message,
            },
        }
    }

    /// Converts the error into the store taxonomy, for store implementations
    /// built on the engine.
    #[must_use]
    pub fn into_store_error(self) -> StoreError {
        match self {
            Self::TemplateNotFound { .. } | Self::CourseNotFound { .. } => {
                StoreError::not_found(self.to_string())
            }
            Self::TransientStore { message, .. } => StoreError::transient(message),
            other => StoreError::rejected(other.to_string()),
        }
    }

    /// Returns `true` if the failed operation may be retried as-is.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore { .. })
    }

    /// Returns `true` if the error rejects a whole batch before any write.
    #[must_use]
    pub const fn aborts_batch(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::TemplateNotFound { .. }
                | Self::CourseNotFound { .. }
                | Self::Conflict { .. }
        )
    }
}
