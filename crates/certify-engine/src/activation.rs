//! Bulk activation of a template across many courses.
//!
//! Activation is split into a plan and an apply step. Planning validates the
//! whole request and computes every row change without touching the state;
//! applying a plan cannot fail. A rejected request therefore changes nothing.

use std::collections::BTreeSet;

use certify_store::{CourseId, TemplateId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{CertifyError, Result};
use crate::state::CertificateState;

/// What to do with courses already governed by another template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Revoke the other template's row and take the course over.
    #[default]
    Reassign,
    /// Fail with `Conflict` instead of taking the course over.
    RejectConflicts,
}

/// A course taken away from the template that governed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revocation {
    /// The course that changed owner.
    pub course_id: CourseId,
    /// Template whose row was flipped to inactive.
    pub previous_template: TemplateId,
}

/// Validated row changes for one activation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationPlan {
    template_id: TemplateId,
    activate: Vec<CourseId>,
    unchanged: Vec<CourseId>,
    revocations: Vec<Revocation>,
}

impl ActivationPlan {
    /// The template being activated.
    #[must_use]
    pub const fn template_id(&self) -> TemplateId {
        self.template_id
    }

    /// Courses that will gain an active row for the template.
    #[must_use]
    pub fn activate(&self) -> &[CourseId] {
        &self.activate
    }

    /// Courses whose row for the template is already active.
    #[must_use]
    pub fn unchanged(&self) -> &[CourseId] {
        &self.unchanged
    }

    /// Rows that will be flipped to inactive.
    #[must_use]
    pub fn revocations(&self) -> &[Revocation] {
        &self.revocations
    }

    /// Returns `true` if applying the plan writes nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.activate.is_empty() && self.revocations.is_empty()
    }

    /// Every course named by the request, ascending.
    #[must_use]
    pub fn courses(&self) -> Vec<CourseId> {
        let mut courses: Vec<_> = self
            .activate
            .iter()
            .chain(&self.unchanged)
            .copied()
            .collect();
        courses.sort_unstable();
        courses
    }
}

/// Result of an activation, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationReport {
    /// The template that was activated.
    pub template_id: TemplateId,
    /// Courses that gained an active row.
    pub activated: Vec<CourseId>,
    /// Courses that were already governed by the template.
    pub unchanged: Vec<CourseId>,
    /// Courses taken from other templates.
    pub revocations: Vec<Revocation>,
}

impl ActivationReport {
    /// Returns `true` if nothing was written.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.activated.is_empty() && self.revocations.is_empty()
    }
}

impl From<&ActivationPlan> for ActivationReport {
    fn from(plan: &ActivationPlan) -> Self {
        Self {
            template_id: plan.template_id,
            activated: plan.activate.clone(),
            unchanged: plan.unchanged.clone(),
            revocations: plan.revocations.clone(),
        }
    }
}

impl CertificateState {
    /// Validates an activation request and computes its row changes.
    ///
    /// Checks run in order: empty course list, unknown template, unknown
    /// courses (all of them reported at once), then conflicts when `mode` is
    /// [`ActivationMode::RejectConflicts`].
    pub fn plan_activation(
        &self,
        template_id: TemplateId,
        course_ids: &[CourseId],
        mode: ActivationMode,
    ) -> Result<ActivationPlan> {
        if course_ids.is_empty() {
            return Err(CertifyError::validation(
                "course selection is empty",
                "Select at least one course to assign the certificate to",
            ));
        }
        if !self.catalog.contains(template_id) {
            return Err(CertifyError::template_not_found(template_id));
        }
        let unknown = self.unknown_courses(course_ids);
        if !unknown.is_empty() {
            return Err(CertifyError::course_not_found(unknown));
        }

        let requested: BTreeSet<CourseId> = course_ids.iter().copied().collect();
        let mut plan = ActivationPlan {
            template_id,
            activate: Vec::new(),
            unchanged: Vec::new(),
            revocations: Vec::new(),
        };

        for course_id in requested {
            let owners = self.assignments.active_templates_for(course_id);
            let mut already_owned = false;
            for owner in owners {
                if owner == template_id {
                    already_owned = true;
                    continue;
                }
                if mode == ActivationMode::RejectConflicts {
                    return Err(CertifyError::Conflict {
                        course: course_id,
                        owner,
                    });
                }
                plan.revocations.push(Revocation {
                    course_id,
                    previous_template: owner,
                });
            }

            if already_owned {
                plan.unchanged.push(course_id);
            } else {
                plan.activate.push(course_id);
            }
        }

        debug!(
            template_id = %template_id,
            activate = ?plan.activate,
            unchanged = ?plan.unchanged,
            revocations = plan.revocations.len(),
            "Activation planned"
        );
        Ok(plan)
    }

    /// Writes a plan produced by [`Self::plan_activation`].
    pub fn apply_activation(&mut self, plan: &ActivationPlan) -> ActivationReport {
        for revocation in &plan.revocations {
            self.assignments
                .revoke(revocation.previous_template, revocation.course_id);
        }
        for &course_id in &plan.activate {
            self.assignments.upsert(plan.template_id, course_id, true);
        }
        ActivationReport::from(plan)
    }

    /// Activates `template_id` for every course in `course_ids`, taking
    /// courses over from other templates.
    #[instrument(skip_all, fields(template_id = %template_id))]
    pub fn activate_for_courses(
        &mut self,
        template_id: TemplateId,
        course_ids: &[CourseId],
    ) -> Result<ActivationReport> {
        let plan = self.plan_activation(template_id, course_ids, ActivationMode::Reassign)?;
        let report = self.apply_activation(&plan);
        if report.is_noop() {
            debug!("Activation changed nothing");
        } else {
            info!(
                activated = report.activated.len(),
                revoked = report.revocations.len(),
                "Template activated for courses"
            );
        }
        Ok(report)
    }
}
