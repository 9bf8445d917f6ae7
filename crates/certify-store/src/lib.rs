//! Certify Store Contract
//!
//! Wire model and collaborator traits for the remote Template Store and
//! Course Registry.
//!
//! This crate defines the types exchanged with the store, the
//! `{success, data}` response envelope, the store error taxonomy and the
//! retry policy applied to idempotent store writes.

mod contract;
pub mod retry;

pub use contract::{CourseRegistry, StoreEnvelope, TemplateStore};
pub use retry::RetryPolicy;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a certificate template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub u64);

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a course in the Course Registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub u64);

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Store Errors
// ============================================================================

/// Category of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    /// Network failure or 5xx response; safe to retry.
    Transient,
    /// The referenced template or course does not exist on the store.
    NotFound,
    /// The store refused the request.
    Rejected,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::NotFound => write!(f, "not_found"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Error returned by a Template Store or Course Registry call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} store error: {message}")]
pub struct StoreError {
    /// Category of the failure.
    pub kind: StoreErrorKind,
    /// Message reported by the store.
    pub message: String,
}

impl StoreError {
    /// Creates a retryable error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::NotFound,
            message: message.into(),
        }
    }

    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Rejected,
            message: message.into(),
        }
    }

    /// Classifies an error message by the HTTP status it arrived with.
    ///
    /// Timeouts, rate limits and 5xx responses are transient; 404 is
    /// not-found; everything else is a rejection.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            404 => StoreErrorKind::NotFound,
            408 | 429 | 500..=599 => StoreErrorKind::Transient,
            _ => StoreErrorKind::Rejected,
        };
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` if the failed call may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, StoreErrorKind::Transient)
    }

    /// HTTP status code a server should answer this error with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self.kind {
            StoreErrorKind::Transient => 503,
            StoreErrorKind::NotFound => 404,
            StoreErrorKind::Rejected => 400,
        }
    }
}

// ============================================================================
// Templates
// ============================================================================

fn default_title() -> String {
    "Certificate of Completion".to_string()
}

fn default_primary_color() -> String {
    "#1F2937".to_string()
}

fn default_accent_color() -> String {
    "#B45309".to_string()
}

fn default_font() -> String {
    "Helvetica".to_string()
}

/// Editable visual and text configuration of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFields {
    /// Display name shown to administrators.
    pub name: String,

    /// Heading printed on the certificate.
    #[serde(default = "default_title")]
    pub title: String,

    /// Body text; may contain `{{student}}` and `{{course}}` placeholders.
    #[serde(default)]
    pub body_text: String,

    /// Name printed under the signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatory_name: Option<String>,

    /// Role printed under the signatory name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatory_title: Option<String>,

    /// Main color as `#RRGGBB`.
    #[serde(default = "default_primary_color")]
    pub primary_color: String,

    /// Accent color as `#RRGGBB`.
    #[serde(default = "default_accent_color")]
    pub accent_color: String,

    /// Font used for the title.
    #[serde(default = "default_font")]
    pub title_font: String,

    /// Font used for body text.
    #[serde(default = "default_font")]
    pub body_font: String,
}

impl TemplateFields {
    /// Creates fields with the given name and default styling.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: default_title(),
            body_text: String::new(),
            signatory_name: None,
            signatory_title: None,
            primary_color: default_primary_color(),
            accent_color: default_accent_color(),
            title_font: default_font(),
            body_font: default_font(),
        }
    }

    /// Sets the body text.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body_text = body.into();
        self
    }

    /// Sets the signatory name and title.
    #[must_use]
    pub fn with_signatory(mut self, name: impl Into<String>, title: impl Into<String>) -> Self {
        self.signatory_name = Some(name.into());
        self.signatory_title = Some(title.into());
        self
    }

    /// Sets both colors.
    #[must_use]
    pub fn with_colors(mut self, primary: impl Into<String>, accent: impl Into<String>) -> Self {
        self.primary_color = primary.into();
        self.accent_color = accent.into();
        self
    }
}

/// Kind of image attached to a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Full-page background image.
    Background,
    /// Signature image.
    Signature,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Background => write!(f, "background"),
            Self::Signature => write!(f, "signature"),
        }
    }
}

/// Reference to an uploaded image held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    /// What the image is used for.
    pub kind: AssetKind,
    /// Original file name.
    pub file_name: String,
    /// MIME type of the upload.
    pub content_type: String,
    /// Size of the upload in bytes.
    pub size_bytes: u64,
    /// Where the store serves the image from.
    pub url: String,
}

/// A file handed to the store for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Original file name.
    pub file_name: String,
    /// MIME type of the file.
    pub content_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Creates an upload, guessing the content type from the file extension.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        let content_type = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "svg" => "image/svg+xml",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        };
        Self {
            file_name,
            content_type: content_type.to_string(),
            bytes,
        }
    }
}

/// A certificate template as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Store-assigned identifier.
    pub id: TemplateId,

    /// Visual and text configuration.
    #[serde(flatten)]
    pub fields: TemplateFields,

    /// Whether this template is the global default.
    pub is_default: bool,

    /// Uploaded background image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<AssetRef>,

    /// Uploaded signature image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<AssetRef>,

    /// When the template was created.
    pub created_at: DateTime<Utc>,

    /// When the template was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Display name of the template.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.fields.name
    }
}

// ============================================================================
// Courses and Assignments
// ============================================================================

/// A course supplied by the Course Registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Registry identifier.
    pub id: CourseId,
    /// Display name.
    pub name: String,
}

impl Course {
    /// Creates a course.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: CourseId(id),
            name: name.into(),
        }
    }
}

/// Binding of a course to a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Template the course is bound to.
    pub template_id: TemplateId,
    /// Bound course.
    pub course_id: CourseId,
    /// Whether the binding currently governs the course.
    pub is_active: bool,
}

impl Assignment {
    /// Creates an active assignment.
    #[must_use]
    pub const fn active(template_id: TemplateId, course_id: CourseId) -> Self {
        Self {
            template_id,
            course_id,
            is_active: true,
        }
    }

    /// Creates an inactive assignment.
    #[must_use]
    pub const fn inactive(template_id: TemplateId, course_id: CourseId) -> Self {
        Self {
            template_id,
            course_id,
            is_active: false,
        }
    }
}
