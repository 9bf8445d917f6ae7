//! Template lifecycle: create, update, delete and the default swap.

use certify_store::{AssetRef, CourseId, Template, TemplateFields, TemplateId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::activation::{ActivationMode, ActivationReport};
use crate::error::{CertifyError, Result};
use crate::state::CertificateState;

static HEX_COLOR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").ok());

fn is_hex_color(value: &str) -> bool {
    HEX_COLOR.as_ref().is_some_and(|re| re.is_match(value))
}

/// Request to create a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    /// Visual fields of the template.
    #[serde(flatten)]
    pub fields: TemplateFields,
    /// Take the default register on creation.
    #[serde(default)]
    pub is_default: bool,
    /// Courses to activate the template for right away.
    #[serde(default)]
    pub course_ids: Vec<CourseId>,
}

impl NewTemplate {
    /// A request with no default flag and no courses.
    #[must_use]
    pub const fn new(fields: TemplateFields) -> Self {
        Self {
            fields,
            is_default: false,
            course_ids: Vec::new(),
        }
    }

    /// Requests the default register for the new template.
    #[must_use]
    pub const fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Sets the courses to activate after creation.
    #[must_use]
    pub fn for_courses(mut self, course_ids: impl IntoIterator<Item = CourseId>) -> Self {
        self.course_ids = course_ids.into_iter().collect();
        self
    }
}

/// Outcome of [`CertificateState::create_template`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTemplate {
    /// The new template, as stored after any default swap.
    pub template: Template,
    /// Activation of the initial courses, if any were given.
    pub activation: Option<ActivationReport>,
}

/// Outcome of [`CertificateState::delete_template`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedTemplate {
    /// The removed template.
    pub id: TemplateId,
    /// Whether it held the default register.
    pub was_default: bool,
    /// Courses it actively governed; they now resolve through the default.
    pub released_courses: Vec<CourseId>,
    /// Template promoted to default in its place, if promotion is enabled.
    pub promoted: Option<TemplateId>,
}

/// Checks the required template fields.
pub fn validate_fields(fields: &TemplateFields) -> Result<()> {
    if fields.name.trim().is_empty() {
        return Err(CertifyError::validation(
            "template name is empty",
            "Give the template a name so administrators can tell designs apart",
        ));
    }
    for (label, value) in [
        ("primaryColor", &fields.primary_color),
        ("accentColor", &fields.accent_color),
    ] {
        if !is_hex_color(value) {
            return Err(CertifyError::validation(
                format!("{label} '{value}' is not a hex color"),
                "Use the #RRGGBB form, e.g. #1F2937",
            ));
        }
    }
    Ok(())
}

impl CertificateState {
    /// Creates a template and activates it for its initial courses.
    ///
    /// The fields and the course list are validated before anything is
    /// written, so a bad request creates nothing. The first template of an
    /// empty catalog becomes the default regardless of `is_default`.
    #[instrument(skip_all, fields(name = %request.fields.name))]
    pub fn create_template(&mut self, request: NewTemplate) -> Result<CreatedTemplate> {
        validate_fields(&request.fields)?;
        let unknown = self.unknown_courses(&request.course_ids);
        if !unknown.is_empty() {
            return Err(CertifyError::course_not_found(unknown));
        }

        let previous_default = self.catalog.default_id();
        let template = self.catalog.insert(request.fields);
        if request.is_default && !template.is_default {
            self.catalog.set_default(template.id)?;
        }

        let activation = if request.course_ids.is_empty() {
            None
        } else {
            let plan = match self.plan_activation(
                template.id,
                &request.course_ids,
                ActivationMode::Reassign,
            ) {
                Ok(plan) => plan,
                Err(e) => {
                    self.discard_created(template.id, previous_default)?;
                    return Err(e);
                }
            };
            Some(self.apply_activation(&plan))
        };

        let template = self.catalog.require(template.id)?;
        info!(
            template_id = %template.id,
            is_default = template.is_default,
            courses = request.course_ids.len(),
            "Template created"
        );
        Ok(CreatedTemplate {
            template,
            activation,
        })
    }

    /// Rolls back a template inserted by a failed create, handing the
    /// default register back to its previous owner.
    fn discard_created(
        &mut self,
        id: TemplateId,
        previous_default: Option<TemplateId>,
    ) -> Result<()> {
        self.catalog.remove(id)?;
        if let Some(previous) = previous_default {
            self.catalog.set_default(previous)?;
        }
        warn!(template_id = %id, "Discarded template from failed create");
        Ok(())
    }

    /// Replaces a template's visual fields. The default register and the
    /// assignments are left alone.
    #[instrument(skip_all, fields(template_id = %id))]
    pub fn update_template(&mut self, id: TemplateId, fields: TemplateFields) -> Result<Template> {
        validate_fields(&fields)?;
        let template = self.catalog.update_fields(id, fields)?;
        info!("Template updated");
        Ok(template)
    }

    /// Moves the default register to `id`. Returns the previous owner.
    #[instrument(skip_all, fields(template_id = %id))]
    pub fn set_default(&mut self, id: TemplateId) -> Result<Option<TemplateId>> {
        let previous = self.catalog.set_default(id)?;
        if previous != Some(id) {
            info!(previous = ?previous, "Default template changed");
        }
        Ok(previous)
    }

    /// Deletes a template and every assignment row referencing it.
    ///
    /// Deleting the default leaves the register empty unless `promote` is
    /// set, in which case the lowest remaining template takes it.
    #[instrument(skip_all, fields(template_id = %id))]
    pub fn delete_template(&mut self, id: TemplateId, promote: bool) -> Result<DeletedTemplate> {
        self.catalog.require(id)?;

        let released_courses: Vec<CourseId> = self
            .assignments
            .remove_template(id)
            .into_iter()
            .filter(|row| row.is_active)
            .map(|row| row.course_id)
            .collect();
        let removed = self.catalog.remove(id)?;

        let promoted = if removed.was_default && promote {
            self.catalog.promote_lowest()
        } else {
            None
        };
        if removed.was_default && promoted.is_none() {
            warn!("Default template deleted, no default remains");
        }

        info!(
            was_default = removed.was_default,
            released = released_courses.len(),
            promoted = ?promoted,
            "Template deleted"
        );
        Ok(DeletedTemplate {
            id,
            was_default: removed.was_default,
            released_courses,
            promoted,
        })
    }

    /// Records an uploaded background or signature image on a template.
    pub fn attach_asset(&mut self, id: TemplateId, asset: AssetRef) -> Result<Template> {
        self.catalog.set_asset(id, asset)
    }
}
