//! Normalized assignment table binding courses to templates.
//!
//! Rows are keyed on `(template, course)`, so writing the same binding twice
//! is an upsert. The table is the single place the "one active template per
//! course" invariant lives.

use std::collections::{BTreeMap, BTreeSet};

use certify_store::{Assignment, CourseId, TemplateId};
use tracing::warn;

/// Join table of `(template, course, is_active)` rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentTable {
    rows: BTreeMap<(TemplateId, CourseId), bool>,
}

impl AssignmentTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from store rows. Later rows for the same key win.
    #[must_use]
    pub fn from_rows(rows: impl IntoIterator<Item = Assignment>) -> Self {
        let mut table = Self::new();
        for row in rows {
            table.upsert(row.template_id, row.course_id, row.is_active);
        }
        table
    }

    /// Every row ordered by template then course.
    #[must_use]
    pub fn rows(&self) -> Vec<Assignment> {
        self.rows
            .iter()
            .map(|(&(template_id, course_id), &is_active)| Assignment {
                template_id,
                course_id,
                is_active,
            })
            .collect()
    }

    /// Number of rows, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up a single row.
    #[must_use]
    pub fn get(&self, template_id: TemplateId, course_id: CourseId) -> Option<Assignment> {
        self.rows
            .get(&(template_id, course_id))
            .map(|&is_active| Assignment {
                template_id,
                course_id,
                is_active,
            })
    }

    /// Writes a row, replacing any existing row for the same key.
    pub fn upsert(&mut self, template_id: TemplateId, course_id: CourseId, is_active: bool) {
        self.rows.insert((template_id, course_id), is_active);
    }

    /// Flips a row to inactive. Returns `true` if it was active.
    pub fn revoke(&mut self, template_id: TemplateId, course_id: CourseId) -> bool {
        match self.rows.get_mut(&(template_id, course_id)) {
            Some(active) if *active => {
                *active = false;
                true
            }
            _ => false,
        }
    }

    /// Deletes every row referencing the template and returns them.
    pub fn remove_template(&mut self, template_id: TemplateId) -> Vec<Assignment> {
        let keys: Vec<_> = self
            .rows
            .range((template_id, CourseId(0))..=(template_id, CourseId(u64::MAX)))
            .map(|(key, _)| *key)
            .collect();
        keys.into_iter()
            .filter_map(|key| {
                self.rows.remove(&key).map(|is_active| Assignment {
                    template_id: key.0,
                    course_id: key.1,
                    is_active,
                })
            })
            .collect()
    }

    /// Templates holding an active row for the course, ascending.
    ///
    /// More than one entry means the invariant was broken upstream.
    #[must_use]
    pub fn active_templates_for(&self, course_id: CourseId) -> Vec<TemplateId> {
        self.rows
            .iter()
            .filter(|&(&(_, course), &active)| active && course == course_id)
            .map(|(&(template, _), _)| template)
            .collect()
    }

    /// The template governing the course through an active row.
    ///
    /// Duplicates resolve to the lowest template id with a data-integrity
    /// warning.
    #[must_use]
    pub fn active_owner(&self, course_id: CourseId) -> Option<TemplateId> {
        let owners = self.active_templates_for(course_id);
        if owners.len() > 1 {
            warn!(
                course_id = %course_id,
                templates = ?owners,
                "Data integrity: course has several active assignments, using lowest template id"
            );
        }
        owners.first().copied()
    }

    /// Courses actively bound to the template.
    #[must_use]
    pub fn active_courses_of(&self, template_id: TemplateId) -> BTreeSet<CourseId> {
        self.rows
            .range((template_id, CourseId(0))..=(template_id, CourseId(u64::MAX)))
            .filter(|&(_, &active)| active)
            .map(|(&(_, course), _)| course)
            .collect()
    }

    /// Every course that has at least one active row.
    #[must_use]
    pub fn assigned_courses(&self) -> BTreeSet<CourseId> {
        self.rows
            .iter()
            .filter(|&(_, &active)| active)
            .map(|(&(_, course), _)| course)
            .collect()
    }

    /// Courses with more than one active row, with the templates involved.
    #[must_use]
    pub fn duplicate_active(&self) -> Vec<(CourseId, Vec<TemplateId>)> {
        let mut by_course: BTreeMap<CourseId, Vec<TemplateId>> = BTreeMap::new();
        for (&(template, course), &active) in &self.rows {
            if active {
                by_course.entry(course).or_default().push(template);
            }
        }
        by_course
            .into_iter()
            .filter(|(_, templates)| templates.len() > 1)
            .collect()
    }
}
