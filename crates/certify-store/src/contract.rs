//! Collaborator traits and the response envelope shared by every store call.

use std::future::Future;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    AssetRef, Assignment, Course, CourseId, StoreError, StoreResult, Template, TemplateFields,
    TemplateId, UploadFile,
};

/// Response envelope used on the wire by the Template Store.
///
/// A call either succeeds with `{"success": true, "data": ...}` or fails with
/// `{"success": false, "error": "message"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEnvelope<T> {
    /// Whether the call succeeded.
    pub success: bool,

    /// Payload of a successful call. A present `null` decodes as
    /// `Some(null)` so payloads such as `Option<Template>` survive.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_payload",
        bound(deserialize = "T: Deserialize<'de>")
    )]
    pub data: Option<T>,

    /// Message of a failed call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Decodes a `data` field that is present, including an explicit `null`.
fn present_payload<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl<T> StoreEnvelope<T> {
    /// Wraps a successful payload.
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Wraps a failure message.
    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Unwraps the envelope into a result.
    ///
    /// Failures become [`StoreError`] rejections; callers that know the HTTP
    /// status should reclassify with [`StoreError::from_status`].
    pub fn into_result(self) -> StoreResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(StoreError::rejected(
                "store reported success without a data payload",
            )),
            (false, _) => Err(StoreError::rejected(
                self.error
                    .unwrap_or_else(|| "store reported failure without a message".to_string()),
            )),
        }
    }
}

impl<T> From<StoreResult<T>> for StoreEnvelope<T> {
    fn from(result: StoreResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.message),
        }
    }
}

/// Remote store holding certificate templates and their course assignments.
///
/// Implementations must make `activate_for_courses` an idempotent upsert
/// keyed on `(template, course)` that also revokes any other active binding
/// of the listed courses.
pub trait TemplateStore: Send + Sync {
    /// Lists every template.
    fn get_all(&self) -> impl Future<Output = StoreResult<Vec<Template>>> + Send;

    /// Returns the global default template, if one is set.
    fn get_active(&self) -> impl Future<Output = StoreResult<Option<Template>>> + Send;

    /// Returns the full assignment table.
    fn get_active_per_course(&self) -> impl Future<Output = StoreResult<Vec<Assignment>>> + Send;

    /// Creates a template from the given fields.
    fn create(&self, fields: TemplateFields) -> impl Future<Output = StoreResult<Template>> + Send;

    /// Replaces the fields of an existing template.
    fn update(
        &self,
        id: TemplateId,
        fields: TemplateFields,
    ) -> impl Future<Output = StoreResult<Template>> + Send;

    /// Makes the template the global default.
    fn activate(&self, id: TemplateId) -> impl Future<Output = StoreResult<Template>> + Send;

    /// Binds the template to every listed course, returning the rows written.
    fn activate_for_courses(
        &self,
        id: TemplateId,
        course_ids: &[CourseId],
    ) -> impl Future<Output = StoreResult<Vec<Assignment>>> + Send;

    /// Deletes the template and all its assignments.
    fn delete(&self, id: TemplateId) -> impl Future<Output = StoreResult<TemplateId>> + Send;

    /// Uploads the background image of a template.
    fn upload_background(
        &self,
        id: TemplateId,
        file: UploadFile,
    ) -> impl Future<Output = StoreResult<AssetRef>> + Send;

    /// Uploads the signature image of a template.
    fn upload_signature(
        &self,
        id: TemplateId,
        file: UploadFile,
    ) -> impl Future<Output = StoreResult<AssetRef>> + Send;

    /// Returns the URL of a rendered preview of the template.
    fn get_preview(&self, id: TemplateId) -> impl Future<Output = StoreResult<String>> + Send;
}

/// Source of the courses certificates can be assigned to.
pub trait CourseRegistry: Send + Sync {
    /// Lists every course.
    fn get_all_courses(&self) -> impl Future<Output = StoreResult<Vec<Course>>> + Send;
}
