//! Course to effective template resolution.
//!
//! The resolver only reads the catalog and the assignment table. It is the
//! single entry point certificate generation uses to pick a design.

use certify_store::{CourseId, Template};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::assignment::AssignmentTable;
use crate::catalog::TemplateCatalog;
use crate::state::CertificateState;

/// Where a resolved template came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// An active per-course assignment.
    Assigned,
    /// The global default template.
    Default,
    /// Nothing applies; the caller uses its built-in design.
    Fallback,
}

/// A resolved course together with how it was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// The course that was resolved.
    pub course_id: CourseId,
    /// Effective template, `None` for [`ResolutionSource::Fallback`].
    pub template: Option<Template>,
    /// Rule that produced the template.
    pub source: ResolutionSource,
}

/// Resolves a course to its effective template.
pub fn resolve(
    catalog: &TemplateCatalog,
    assignments: &AssignmentTable,
    course_id: CourseId,
) -> Option<Template> {
    resolve_detailed(catalog, assignments, course_id).template
}

/// Resolves a course and reports which rule applied.
///
/// Active assignment first, then the default, then fallback. Several active
/// rows resolve to the lowest template id; rows pointing at a template the
/// catalog no longer holds are skipped.
pub fn resolve_detailed(
    catalog: &TemplateCatalog,
    assignments: &AssignmentTable,
    course_id: CourseId,
) -> Resolution {
    let owners = assignments.active_templates_for(course_id);
    if owners.len() > 1 {
        warn!(
            course_id = %course_id,
            templates = ?owners,
            "Data integrity: course has several active assignments, using lowest template id"
        );
    }

    for owner in owners {
        match catalog.get(owner) {
            Some(template) => {
                return Resolution {
                    course_id,
                    template: Some(template),
                    source: ResolutionSource::Assigned,
                };
            }
            None => warn!(
                course_id = %course_id,
                template_id = %owner,
                "Data integrity: active assignment references a missing template"
            ),
        }
    }

    match catalog.default_template() {
        Some(template) => Resolution {
            course_id,
            template: Some(template),
            source: ResolutionSource::Default,
        },
        None => Resolution {
            course_id,
            template: None,
            source: ResolutionSource::Fallback,
        },
    }
}

impl CertificateState {
    /// Resolves a course to its effective template.
    #[must_use]
    pub fn resolve(&self, course_id: CourseId) -> Option<Template> {
        resolve(&self.catalog, &self.assignments, course_id)
    }

    /// Resolves a course and reports which rule applied.
    #[must_use]
    pub fn resolve_detailed(&self, course_id: CourseId) -> Resolution {
        resolve_detailed(&self.catalog, &self.assignments, course_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use certify_store::{TemplateFields, TemplateId};

    use super::*;

    fn catalog_with(names: &[&str]) -> TemplateCatalog {
        let mut catalog = TemplateCatalog::new();
        for name in names {
            catalog.insert(TemplateFields::named(*name));
        }
        catalog
    }

    #[test]
    fn falls_back_to_default_without_assignment() {
        let catalog = catalog_with(&["Classic", "Modern"]);
        let table = AssignmentTable::new();

        let resolution = resolve_detailed(&catalog, &table, CourseId(5));

        assert_eq!(resolution.source, ResolutionSource::Default);
        assert_eq!(resolution.template.unwrap().id, TemplateId(1));
    }

    #[test]
    fn assignment_beats_default() {
        let catalog = catalog_with(&["Classic", "Modern"]);
        let mut table = AssignmentTable::new();
        table.upsert(TemplateId(2), CourseId(5), true);

        let resolution = resolve_detailed(&catalog, &table, CourseId(5));

        assert_eq!(resolution.source, ResolutionSource::Assigned);
        assert_eq!(resolution.template.unwrap().id, TemplateId(2));
    }

    #[test]
    fn inactive_rows_are_ignored() {
        let catalog = catalog_with(&["Classic", "Modern"]);
        let mut table = AssignmentTable::new();
        table.upsert(TemplateId(2), CourseId(5), false);

        let template = resolve(&catalog, &table, CourseId(5)).unwrap();
        assert_eq!(template.id, TemplateId(1));
    }

    #[test]
    fn no_default_and_no_assignment_is_fallback() {
        let mut catalog = catalog_with(&["Classic"]);
        catalog.remove(TemplateId(1)).unwrap();

        let resolution = resolve_detailed(&catalog, &AssignmentTable::new(), CourseId(1));

        assert_eq!(resolution.source, ResolutionSource::Fallback);
        assert!(resolution.template.is_none());
    }

    #[test]
    fn duplicate_active_rows_resolve_to_lowest_id() {
        let catalog = catalog_with(&["A", "B", "C"]);
        let mut table = AssignmentTable::new();
        table.upsert(TemplateId(3), CourseId(1), true);
        table.upsert(TemplateId(2), CourseId(1), true);

        let template = resolve(&catalog, &table, CourseId(1)).unwrap();
        assert_eq!(template.id, TemplateId(2));
    }

    #[test]
    fn dangling_assignment_is_skipped() {
        let catalog = catalog_with(&["A", "B"]);
        let mut table = AssignmentTable::new();
        table.upsert(TemplateId(9), CourseId(1), true);

        let resolution = resolve_detailed(&catalog, &table, CourseId(1));

        assert_eq!(resolution.source, ResolutionSource::Default);
        assert_eq!(resolution.template.unwrap().id, TemplateId(1));
    }

    #[test]
    fn resolution_serializes_source_snake_case() {
        let resolution = Resolution {
            course_id: CourseId(4),
            template: None,
            source: ResolutionSource::Fallback,
        };
        let json = serde_json::to_value(&resolution).unwrap();
        assert_eq!(json["courseId"], 4);
        assert_eq!(json["source"], "fallback");
        assert!(json["template"].is_null());
    }
}
