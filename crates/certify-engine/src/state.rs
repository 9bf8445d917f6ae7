//! Certificate state: catalog, assignment table and course registry mirror.
//!
//! The state is persisted to a JSON snapshot so the CLI and HTTP server can
//! share it across runs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use certify_store::{Assignment, Course, CourseId, Template, TemplateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assignment::AssignmentTable;
use crate::catalog::TemplateCatalog;
use crate::error::{CertifyError, Result};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Templates, assignments and known courses held together.
///
/// Every mutating operation on the state validates its whole input before
/// changing anything, so a failed call leaves the state untouched.
#[derive(Debug, Clone, Default)]
pub struct CertificateState {
    pub(crate) catalog: TemplateCatalog,
    pub(crate) assignments: AssignmentTable,
    pub(crate) courses: BTreeMap<CourseId, Course>,
}

impl CertificateState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty state that knows the given courses.
    #[must_use]
    pub fn with_courses(courses: impl IntoIterator<Item = Course>) -> Self {
        let mut state = Self::new();
        state.replace_courses(courses);
        state
    }

    /// Rebuilds a state from what a store reports.
    ///
    /// `default_id` is the store's answer to `get_active` and overrides the
    /// per-template flags when given.
    #[must_use]
    pub fn from_parts(
        templates: Vec<Template>,
        default_id: Option<TemplateId>,
        assignments: Vec<Assignment>,
        courses: Vec<Course>,
    ) -> Self {
        let mut catalog = TemplateCatalog::from_templates(templates);
        if let Some(id) = default_id {
            // The listed templates may predate the last default swap.
            if let Err(e) = catalog.set_default(id) {
                warn!(
                    template_id = %id,
                    error = %e,
                    "Data integrity: store default is missing from the template list"
                );
            }
        }
        let mut state = Self {
            catalog,
            assignments: AssignmentTable::from_rows(assignments),
            courses: BTreeMap::new(),
        };
        state.replace_courses(courses);
        state
    }

    /// The template catalog.
    #[must_use]
    pub const fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// The assignment table.
    #[must_use]
    pub const fn assignments(&self) -> &AssignmentTable {
        &self.assignments
    }

    /// Known courses ordered by id.
    #[must_use]
    pub fn courses(&self) -> Vec<Course> {
        self.courses.values().cloned().collect()
    }

    /// Looks up a course.
    #[must_use]
    pub fn course(&self, id: CourseId) -> Option<&Course> {
        self.courses.get(&id)
    }

    /// Adds a course or renames an existing one.
    pub fn register_course(&mut self, course: Course) {
        self.courses.insert(course.id, course);
    }

    /// Replaces the course registry mirror.
    pub fn replace_courses(&mut self, courses: impl IntoIterator<Item = Course>) {
        self.courses = courses.into_iter().map(|c| (c.id, c)).collect();
    }

    /// Course ids from `ids` that the registry does not know, ascending.
    #[must_use]
    pub fn unknown_courses(&self, ids: &[CourseId]) -> Vec<CourseId> {
        let mut unknown: Vec<_> = ids
            .iter()
            .copied()
            .filter(|id| !self.courses.contains_key(id))
            .collect();
        unknown.sort_unstable();
        unknown.dedup();
        unknown
    }

    /// Lists every broken invariant found in the data.
    #[must_use]
    pub fn integrity_issues(&self) -> Vec<IntegrityIssue> {
        let mut issues: Vec<IntegrityIssue> = self
            .assignments
            .duplicate_active()
            .into_iter()
            .map(|(course_id, templates)| IntegrityIssue::DuplicateActive {
                course_id,
                templates,
            })
            .collect();

        for row in self.assignments.rows() {
            if !self.catalog.contains(row.template_id) {
                issues.push(IntegrityIssue::DanglingAssignment {
                    template_id: row.template_id,
                    course_id: row.course_id,
                });
            } else if row.is_active && !self.courses.contains_key(&row.course_id) {
                issues.push(IntegrityIssue::UnregisteredCourse {
                    template_id: row.template_id,
                    course_id: row.course_id,
                });
            }
        }

        issues
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Captures the state as a serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            next_template_id: self.catalog.next_id(),
            templates: self.catalog.all(),
            assignments: self.assignments.rows(),
            courses: self.courses(),
        }
    }

    /// Restores a state from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        let mut state = Self::from_parts(
            snapshot.templates,
            None,
            snapshot.assignments,
            snapshot.courses,
        );
        state.catalog.reserve_ids(snapshot.next_template_id);
        state
    }

    /// Writes the snapshot to `path`, creating parent directories.
    ///
    /// The file is written to a sibling temporary file first and renamed into
    /// place so readers never observe a partial snapshot.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        debug!(path = %path.display(), "Snapshot saved");
        Ok(())
    }

    /// Loads a snapshot from `path`. Returns `None` if the file does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CertifyError::Io(e)),
        };

        let snapshot: StateSnapshot = serde_json::from_str(&contents)
            .map_err(|e| CertifyError::snapshot_corrupted(path, e.to_string()))?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(CertifyError::snapshot_corrupted(
                path,
                format!(
                    "snapshot version {} is newer than supported version {SNAPSHOT_VERSION}",
                    snapshot.version
                ),
            ));
        }

        let state = Self::from_snapshot(snapshot);
        info!(
            path = %path.display(),
            templates = state.catalog.len(),
            assignments = state.assignments.len(),
            courses = state.courses.len(),
            "Snapshot loaded"
        );
        Ok(Some(state))
    }
}

/// Serialized form of [`CertificateState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Snapshot format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,
    /// Next template id to hand out.
    pub next_template_id: u64,
    /// Every template, with its default flag.
    pub templates: Vec<Template>,
    /// Every assignment row.
    pub assignments: Vec<Assignment>,
    /// Known courses.
    pub courses: Vec<Course>,
}

/// A broken data invariant found by [`CertificateState::integrity_issues`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// A course has more than one active assignment.
    DuplicateActive {
        /// Affected course.
        course_id: CourseId,
        /// Templates holding active rows, ascending.
        templates: Vec<TemplateId>,
    },
    /// An assignment references a template that no longer exists.
    DanglingAssignment {
        /// Missing template.
        template_id: TemplateId,
        /// Course of the row.
        course_id: CourseId,
    },
    /// An active assignment references a course the registry does not list.
    UnregisteredCourse {
        /// Template of the row.
        template_id: TemplateId,
        /// Unknown course.
        course_id: CourseId,
    },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateActive {
                course_id,
                templates,
            } => {
                let ids: Vec<String> = templates.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "course {course_id} is actively assigned to templates {}",
                    ids.join(", ")
                )
            }
            Self::DanglingAssignment {
                template_id,
                course_id,
            } => write!(
                f,
                "course {course_id} references deleted template {template_id}"
            ),
            Self::UnregisteredCourse {
                template_id,
                course_id,
            } => write!(
                f,
                "template {template_id} is assigned to unknown course {course_id}"
            ),
        }
    }
}
