//! Per-course availability as seen from one template's course picker.

use certify_store::{Course, TemplateId};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::CertificateState;

/// Whether a course can be assigned to the template being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Eligibility {
    /// No template governs the course.
    Available,
    /// The template being edited already governs the course.
    Owned,
    /// Another template governs the course.
    Locked {
        /// The governing template.
        owner: TemplateId,
    },
}

impl Eligibility {
    /// Returns `true` if the course may be selected for the template.
    #[must_use]
    pub const fn is_selectable(&self) -> bool {
        matches!(self, Self::Available | Self::Owned)
    }
}

/// A registry course tagged with its eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseAvailability {
    /// The course.
    #[serde(flatten)]
    pub course: Course,
    /// Its eligibility for the template.
    pub eligibility: Eligibility,
}

impl CertificateState {
    /// Tags every known course for the template's course picker.
    pub fn availability_for(&self, template_id: TemplateId) -> Result<Vec<CourseAvailability>> {
        self.catalog.require(template_id)?;
        Ok(self.tag_courses(Some(template_id)))
    }

    /// Tags every known course for a template that does not exist yet.
    #[must_use]
    pub fn availability_for_new(&self) -> Vec<CourseAvailability> {
        self.tag_courses(None)
    }

    /// Courses the template may be assigned to: free ones and those it owns.
    pub fn available_courses_for(&self, template_id: TemplateId) -> Result<Vec<Course>> {
        Ok(self
            .availability_for(template_id)?
            .into_iter()
            .filter(|entry| entry.eligibility.is_selectable())
            .map(|entry| entry.course)
            .collect())
    }

    fn tag_courses(&self, editing: Option<TemplateId>) -> Vec<CourseAvailability> {
        self.courses
            .values()
            .map(|course| {
                // Rows of deleted templates do not hold a course, as in resolution.
                let owner = self
                    .assignments
                    .active_templates_for(course.id)
                    .into_iter()
                    .find(|&id| self.catalog.contains(id));
                let eligibility = match owner {
                    None => Eligibility::Available,
                    Some(owner) if Some(owner) == editing => Eligibility::Owned,
                    Some(owner) => Eligibility::Locked { owner },
                };
                CourseAvailability {
                    course: course.clone(),
                    eligibility,
                }
            })
            .collect()
    }
}
