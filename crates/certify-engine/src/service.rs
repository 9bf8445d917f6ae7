//! Admin-session service over a remote Template Store.
//!
//! The service keeps a local mirror of the store's templates, assignments and
//! courses. Every mutation is validated against the mirror first, sent to the
//! store, and applied to the mirror only once the store has committed it, so
//! `resolve` never observes a half-applied batch.

use certify_store::{
    AssetRef, Course, CourseId, CourseRegistry, RetryPolicy, StoreErrorKind, Template,
    TemplateFields, TemplateId, TemplateStore, UploadFile,
};
use tracing::{info, instrument, warn};

use crate::activation::{ActivationMode, ActivationReport};
use crate::eligibility::CourseAvailability;
use crate::error::{CertifyError, Result};
use crate::lifecycle::{validate_fields, CreatedTemplate, DeletedTemplate, NewTemplate};
use crate::resolver::Resolution;
use crate::state::CertificateState;

/// Certificate management for one admin session.
#[derive(Debug)]
pub struct CertificateService<S> {
    store: S,
    retry: RetryPolicy,
    mirror: CertificateState,
}

impl<S> CertificateService<S>
where
    S: TemplateStore + CourseRegistry,
{
    /// Creates a service with an empty mirror. Call [`Self::sync`] before use.
    #[must_use]
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            mirror: CertificateState::new(),
        }
    }

    /// Creates a service and loads the mirror from the store.
    pub async fn connect(store: S, retry: RetryPolicy) -> Result<Self> {
        let mut service = Self::new(store, retry);
        service.sync().await?;
        Ok(service)
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The local mirror of the store.
    pub const fn state(&self) -> &CertificateState {
        &self.mirror
    }

    /// Reloads templates, assignments and courses from the store.
    #[instrument(skip_all)]
    pub async fn sync(&mut self) -> Result<()> {
        let templates = self
            .retry
            .run("get_all", || self.store.get_all())
            .await
            .map_err(|e| CertifyError::from_store("get_all", e))?;
        let default = self
            .retry
            .run("get_active", || self.store.get_active())
            .await
            .map_err(|e| CertifyError::from_store("get_active", e))?;
        let assignments = self
            .retry
            .run("get_active_per_course", || self.store.get_active_per_course())
            .await
            .map_err(|e| CertifyError::from_store("get_active_per_course", e))?;
        let courses = self
            .retry
            .run("get_all_courses", || self.store.get_all_courses())
            .await
            .map_err(|e| CertifyError::from_store("get_all_courses", e))?;

        self.mirror = CertificateState::from_parts(
            templates,
            default.map(|t| t.id),
            assignments,
            courses,
        );
        for issue in self.mirror.integrity_issues() {
            warn!(%issue, "Data integrity issue in store");
        }
        info!(
            templates = self.mirror.catalog().len(),
            assignments = self.mirror.assignments().len(),
            "Synchronized with store"
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Resolves a course to its effective template.
    pub fn resolve(&self, course_id: CourseId) -> Option<Template> {
        self.mirror.resolve(course_id)
    }

    /// Resolves a course and reports which rule applied.
    pub fn resolve_detailed(&self, course_id: CourseId) -> Resolution {
        self.mirror.resolve_detailed(course_id)
    }

    /// Every known course tagged for the template's course picker.
    pub fn availability_for(&self, template_id: TemplateId) -> Result<Vec<CourseAvailability>> {
        self.mirror.availability_for(template_id)
    }

    /// Courses the template may be assigned to.
    pub fn available_courses_for(&self, template_id: TemplateId) -> Result<Vec<Course>> {
        self.mirror.available_courses_for(template_id)
    }

    /// Asks the store for a preview URL of the template.
    pub async fn preview(&self, id: TemplateId) -> Result<String> {
        self.mirror.catalog().require(id)?;
        self.retry
            .run("get_preview", || self.store.get_preview(id))
            .await
            .map_err(|e| CertifyError::from_store("get_preview", e))
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Creates a template, makes it default if asked, and activates it for
    /// its initial courses.
    ///
    /// Creation itself is not retried: a retry after a lost response could
    /// create a duplicate. Follow-up calls are idempotent and are retried.
    #[instrument(skip_all, fields(name = %request.fields.name))]
    pub async fn create(&mut self, request: NewTemplate) -> Result<CreatedTemplate> {
        validate_fields(&request.fields)?;
        let unknown = self.mirror.unknown_courses(&request.course_ids);
        if !unknown.is_empty() {
            return Err(CertifyError::course_not_found(unknown));
        }

        let was_empty = self.mirror.catalog().is_empty();
        let template = self
            .store
            .create(request.fields)
            .await
            .map_err(|e| CertifyError::from_store("create", e))?;
        let id = template.id;
        self.mirror.catalog.insert_existing(template);

        // The first template takes the default even if the store created a draft.
        if (request.is_default || was_empty) && self.mirror.catalog().default_id() != Some(id) {
            self.set_default(id).await?;
        }

        let activation = if request.course_ids.is_empty() {
            None
        } else {
            match self.activate_for_courses(id, &request.course_ids).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(
                        template_id = %id,
                        error = %e,
                        "Template created but course activation failed"
                    );
                    return Err(e);
                }
            }
        };

        let template = self.mirror.catalog().require(id)?;
        Ok(CreatedTemplate {
            template,
            activation,
        })
    }

    /// Replaces a template's visual fields.
    #[instrument(skip_all, fields(template_id = %id))]
    pub async fn update(&mut self, id: TemplateId, fields: TemplateFields) -> Result<Template> {
        validate_fields(&fields)?;
        self.mirror.catalog().require(id)?;

        let template = self
            .retry
            .run("update", || self.store.update(id, fields.clone()))
            .await
            .map_err(|e| CertifyError::from_store("update", e))?;
        self.mirror.catalog.insert_existing(template.clone());
        Ok(template)
    }

    /// Makes the template the global default.
    #[instrument(skip_all, fields(template_id = %id))]
    pub async fn set_default(&mut self, id: TemplateId) -> Result<Option<TemplateId>> {
        self.mirror.catalog().require(id)?;
        self.retry
            .run("activate", || self.store.activate(id))
            .await
            .map_err(|e| CertifyError::from_store("activate", e))?;
        self.mirror.set_default(id)
    }

    /// Activates the template for the courses, taking them over from other
    /// templates.
    ///
    /// The request is validated in full against the mirror before the store
    /// is called, so an invalid batch never reaches it.
    #[instrument(skip_all, fields(template_id = %id))]
    pub async fn activate_for_courses(
        &mut self,
        id: TemplateId,
        course_ids: &[CourseId],
    ) -> Result<ActivationReport> {
        let plan = self
            .mirror
            .plan_activation(id, course_ids, ActivationMode::Reassign)?;
        let courses = plan.courses();

        let rows = self
            .retry
            .run("activate_for_courses", || {
                self.store.activate_for_courses(id, &courses)
            })
            .await
            .map_err(|e| CertifyError::from_store("activate_for_courses", e))?;

        for &revocation in plan.revocations() {
            self.mirror
                .assignments
                .revoke(revocation.previous_template, revocation.course_id);
        }
        for row in rows {
            self.mirror
                .assignments
                .upsert(row.template_id, row.course_id, row.is_active);
        }

        let report = ActivationReport::from(&plan);
        info!(
            activated = report.activated.len(),
            unchanged = report.unchanged.len(),
            revoked = report.revocations.len(),
            "Activation committed"
        );
        Ok(report)
    }

    /// Deletes a template and its assignments.
    ///
    /// A store that no longer knows the template is treated as having
    /// already deleted it, so a retried delete succeeds.
    #[instrument(skip_all, fields(template_id = %id))]
    pub async fn delete(&mut self, id: TemplateId) -> Result<DeletedTemplate> {
        self.mirror.catalog().require(id)?;

        match self.retry.run("delete", || self.store.delete(id)).await {
            Ok(_) => {}
            Err(e) if e.kind == StoreErrorKind::NotFound => {
                warn!(error = %e, "Template already gone from store");
            }
            Err(e) => return Err(CertifyError::from_store("delete", e)),
        }

        let mut deleted = self.mirror.delete_template(id, false)?;

        // The store decides whether the default is promoted.
        let default = self
            .retry
            .run("get_active", || self.store.get_active())
            .await
            .map_err(|e| CertifyError::from_store("get_active", e))?;
        if let Some(template) = default {
            if self.mirror.catalog().default_id() != Some(template.id) {
                deleted.promoted = Some(template.id);
            }
            self.mirror.catalog.insert_existing(template);
        }
        Ok(deleted)
    }

    /// Uploads the background image of a template.
    pub async fn upload_background(
        &mut self,
        id: TemplateId,
        file: UploadFile,
    ) -> Result<AssetRef> {
        self.mirror.catalog().require(id)?;
        let asset = self
            .retry
            .run("upload_background", || {
                self.store.upload_background(id, file.clone())
            })
            .await
            .map_err(|e| CertifyError::from_store("upload_background", e))?;
        self.mirror.attach_asset(id, asset.clone())?;
        Ok(asset)
    }

    /// Uploads the signature image of a template.
    pub async fn upload_signature(&mut self, id: TemplateId, file: UploadFile) -> Result<AssetRef> {
        self.mirror.catalog().require(id)?;
        let asset = self
            .retry
            .run("upload_signature", || {
                self.store.upload_signature(id, file.clone())
            })
            .await
            .map_err(|e| CertifyError::from_store("upload_signature", e))?;
        self.mirror.attach_asset(id, asset.clone())?;
        Ok(asset)
    }
}
