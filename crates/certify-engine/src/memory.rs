//! In-process Template Store and Course Registry backed by the engine.
//!
//! `MemoryStore` is the authoritative store used by the CLI, the HTTP server
//! and the tests. It can be told to fail the next calls with transient
//! errors to exercise retry handling.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use certify_store::{
    AssetKind, AssetRef, Assignment, Course, CourseId, CourseRegistry, StoreError, StoreResult,
    Template, TemplateFields, TemplateId, TemplateStore, UploadFile,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::CertifyError;
use crate::lifecycle::NewTemplate;
use crate::state::CertificateState;

/// Template store keeping everything in a shared [`CertificateState`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<CertificateState>>,
    preview_base: String,
    promote_default_on_delete: bool,
    pending_failures: Arc<AtomicU32>,
}

impl MemoryStore {
    /// Creates a store around `state` using the preview URL and delete
    /// policy from `config`.
    #[must_use]
    pub fn new(state: CertificateState, config: &Config) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            preview_base: config.preview_base().to_string(),
            promote_default_on_delete: config.promote_default_on_delete,
            pending_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Creates an empty store with default configuration.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(CertificateState::new(), &Config::default())
    }

    /// The shared state, for callers that need several reads under one lock.
    #[must_use]
    pub fn shared(&self) -> Arc<Mutex<CertificateState>> {
        Arc::clone(&self.state)
    }

    /// A copy of the current state.
    pub async fn state(&self) -> CertificateState {
        self.state.lock().await.clone()
    }

    /// Registers a course with the store's course registry.
    pub async fn add_course(&self, course: Course) {
        self.state.lock().await.register_course(course);
    }

    /// Makes the next `count` store calls fail with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    fn injected_failure(&self, operation: &str) -> StoreResult<()> {
        let taken = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if taken.is_ok() {
            debug!(operation, "Injected transient failure");
            return Err(StoreError::transient(format!(
                "{operation}: service temporarily unavailable"
            )));
        }
        Ok(())
    }

    fn preview_url(&self, id: TemplateId) -> String {
        format!("{}/templates/{id}/preview", self.preview_base)
    }

    async fn upload(
        &self,
        id: TemplateId,
        kind: AssetKind,
        file: UploadFile,
    ) -> StoreResult<AssetRef> {
        self.injected_failure("upload")?;
        if file.bytes.is_empty() {
            return Err(StoreError::rejected(format!(
                "{kind} file '{}' is empty",
                file.file_name
            )));
        }
        if !file.content_type.starts_with("image/") {
            return Err(StoreError::rejected(format!(
                "{kind} file '{}' has type {}, expected an image",
                file.file_name, file.content_type
            )));
        }

        let asset = AssetRef {
            kind,
            url: format!(
                "{}/templates/{id}/assets/{kind}/{}",
                self.preview_base, file.file_name
            ),
            size_bytes: file.bytes.len() as u64,
            file_name: file.file_name,
            content_type: file.content_type,
        };
        self.state
            .lock()
            .await
            .attach_asset(id, asset.clone())
            .map_err(CertifyError::into_store_error)?;
        Ok(asset)
    }
}

impl TemplateStore for MemoryStore {
    async fn get_all(&self) -> StoreResult<Vec<Template>> {
        self.injected_failure("get_all")?;
        Ok(self.state.lock().await.catalog().all())
    }

    async fn get_active(&self) -> StoreResult<Option<Template>> {
        self.injected_failure("get_active")?;
        Ok(self.state.lock().await.catalog().default_template())
    }

    async fn get_active_per_course(&self) -> StoreResult<Vec<Assignment>> {
        self.injected_failure("get_active_per_course")?;
        Ok(self.state.lock().await.assignments().rows())
    }

    #[instrument(skip_all, fields(name = %fields.name))]
    async fn create(&self, fields: TemplateFields) -> StoreResult<Template> {
        self.injected_failure("create")?;
        self.state
            .lock()
            .await
            .create_template(NewTemplate::new(fields))
            .map(|created| created.template)
            .map_err(CertifyError::into_store_error)
    }

    #[instrument(skip_all, fields(template_id = %id))]
    async fn update(&self, id: TemplateId, fields: TemplateFields) -> StoreResult<Template> {
        self.injected_failure("update")?;
        self.state
            .lock()
            .await
            .update_template(id, fields)
            .map_err(CertifyError::into_store_error)
    }

    #[instrument(skip_all, fields(template_id = %id))]
    async fn activate(&self, id: TemplateId) -> StoreResult<Template> {
        self.injected_failure("activate")?;
        let mut state = self.state.lock().await;
        state
            .set_default(id)
            .and_then(|_| state.catalog().require(id))
            .map_err(CertifyError::into_store_error)
    }

    #[instrument(skip_all, fields(template_id = %id, courses = course_ids.len()))]
    async fn activate_for_courses(
        &self,
        id: TemplateId,
        course_ids: &[CourseId],
    ) -> StoreResult<Vec<Assignment>> {
        self.injected_failure("activate_for_courses")?;
        let mut state = self.state.lock().await;
        let report = state
            .activate_for_courses(id, course_ids)
            .map_err(CertifyError::into_store_error)?;

        let mut rows: Vec<Assignment> = report
            .revocations
            .iter()
            .map(|r| Assignment::inactive(r.previous_template, r.course_id))
            .collect();
        rows.extend(
            report
                .activated
                .iter()
                .chain(&report.unchanged)
                .map(|&course_id| Assignment::active(id, course_id)),
        );
        Ok(rows)
    }

    #[instrument(skip_all, fields(template_id = %id))]
    async fn delete(&self, id: TemplateId) -> StoreResult<TemplateId> {
        self.injected_failure("delete")?;
        self.state
            .lock()
            .await
            .delete_template(id, self.promote_default_on_delete)
            .map(|deleted| deleted.id)
            .map_err(CertifyError::into_store_error)
    }

    #[instrument(skip_all, fields(template_id = %id, file = %file.file_name))]
    async fn upload_background(&self, id: TemplateId, file: UploadFile) -> StoreResult<AssetRef> {
        self.upload(id, AssetKind::Background, file).await
    }

    #[instrument(skip_all, fields(template_id = %id, file = %file.file_name))]
    async fn upload_signature(&self, id: TemplateId, file: UploadFile) -> StoreResult<AssetRef> {
        self.upload(id, AssetKind::Signature, file).await
    }

    async fn get_preview(&self, id: TemplateId) -> StoreResult<String> {
        self.injected_failure("get_preview")?;
        self.state
            .lock()
            .await
            .catalog()
            .require(id)
            .map(|template| self.preview_url(template.id))
            .map_err(CertifyError::into_store_error)
    }
}

impl CourseRegistry for MemoryStore {
    async fn get_all_courses(&self) -> StoreResult<Vec<Course>> {
        self.injected_failure("get_all_courses")?;
        Ok(self.state.lock().await.courses())
    }
}
