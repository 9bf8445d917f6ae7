//! Certify Coverage Reports
//!
//! Summarizes which certificate design every course will receive: courses
//! bound to a template, courses falling back to the default, and courses with
//! no design at all. Reports serialize to JSON for programmatic access or
//! render to Markdown for administrators.
//!
//! # Types
//!
//! - [`CoverageReport`] - The complete report
//! - [`CoverageSummary`] - Course and template counts
//! - [`TemplateCoverage`] - One template and the courses it governs
//! - [`CourseRef`] - A course as listed in the report
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use certify_engine::{CertificateState, NewTemplate};
//! use certify_report::{CoverageReport, MarkdownGenerator};
//! use certify_store::{Course, TemplateFields};
//!
//! let mut state = CertificateState::with_courses([Course::new(1, "Rust 101")]);
//! state
//!     .create_template(NewTemplate::new(TemplateFields::named("Classic")))
//!     .unwrap();
//!
//! let report = CoverageReport::from_state(&state);
//! assert_eq!(report.summary.defaulted_courses, 1);
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Certificate Coverage Report"));
//! ```

pub mod json;
mod markdown;

use std::path::{Path, PathBuf};

pub use markdown::MarkdownGenerator;

use certify_engine::{CertificateState, ResolutionSource};
use certify_store::{Course, CourseId, Template, TemplateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the JSON report written by [`write_reports`].
pub const JSON_REPORT_FILE: &str = "certify-report.json";

/// File name of the Markdown report written by [`write_reports`].
pub const MARKDOWN_REPORT_FILE: &str = "certify-report.md";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Report Types
// ============================================================================

/// A course as listed in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRef {
    /// Course identifier.
    pub id: CourseId,
    /// Course name.
    pub name: String,
}

impl From<&Course> for CourseRef {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id,
            name: course.name.clone(),
        }
    }
}

/// Counts across the whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageSummary {
    /// Number of templates.
    pub templates: usize,
    /// Number of known courses.
    pub courses: usize,
    /// Courses governed by an active assignment.
    pub assigned_courses: usize,
    /// Courses resolving to the default template.
    pub defaulted_courses: usize,
    /// Courses with no template at all.
    pub uncovered_courses: usize,
    /// The default template, if any.
    pub default_template: Option<TemplateId>,
}

impl CoverageSummary {
    /// Share of courses that resolve to some template, in percent.
    #[must_use]
    pub fn coverage_percent(&self) -> f64 {
        if self.courses == 0 {
            return 100.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let covered = (self.assigned_courses + self.defaulted_courses) as f64;
        #[allow(clippy::cast_precision_loss)]
        let total = self.courses as f64;
        covered * 100.0 / total
    }
}

/// One template and the courses it governs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateCoverage {
    /// Template identifier.
    pub id: TemplateId,
    /// Template name.
    pub name: String,
    /// Whether the template holds the default register.
    pub is_default: bool,
    /// Whether a background image is attached.
    pub has_background: bool,
    /// Whether a signature image is attached.
    pub has_signature: bool,
    /// Courses actively assigned to the template.
    pub courses: Vec<CourseRef>,
}

impl TemplateCoverage {
    fn new(template: &Template, courses: Vec<CourseRef>) -> Self {
        Self {
            id: template.id,
            name: template.name().to_string(),
            is_default: template.is_default,
            has_background: template.background.is_some(),
            has_signature: template.signature.is_some(),
            courses,
        }
    }
}

/// Certificate coverage of every known course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Counts across the catalog.
    pub summary: CoverageSummary,
    /// Every template ordered by id.
    pub templates: Vec<TemplateCoverage>,
    /// Courses resolving to the default template.
    pub defaulted_courses: Vec<CourseRef>,
    /// Courses that get the built-in fallback design.
    pub uncovered_courses: Vec<CourseRef>,
    /// Data integrity problems found in the state.
    pub warnings: Vec<String>,
}

impl CoverageReport {
    /// Builds the report by resolving every known course.
    #[must_use]
    pub fn from_state(state: &CertificateState) -> Self {
        let mut defaulted_courses = Vec::new();
        let mut uncovered_courses = Vec::new();
        let mut assigned = 0;
        let courses = state.courses();

        for course in &courses {
            match state.resolve_detailed(course.id).source {
                ResolutionSource::Assigned => assigned += 1,
                ResolutionSource::Default => defaulted_courses.push(CourseRef::from(course)),
                ResolutionSource::Fallback => uncovered_courses.push(CourseRef::from(course)),
            }
        }

        let templates: Vec<TemplateCoverage> = state
            .catalog()
            .all()
            .iter()
            .map(|template| {
                let governed = state
                    .assignments()
                    .active_courses_of(template.id)
                    .into_iter()
                    .map(|id| {
                        state.course(id).map_or_else(
                            || CourseRef {
                                id,
                                name: format!("Unknown course {id}"),
                            },
                            CourseRef::from,
                        )
                    })
                    .collect();
                TemplateCoverage::new(template, governed)
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            summary: CoverageSummary {
                templates: templates.len(),
                courses: courses.len(),
                assigned_courses: assigned,
                defaulted_courses: defaulted_courses.len(),
                uncovered_courses: uncovered_courses.len(),
                default_template: state.catalog().default_id(),
            },
            templates,
            defaulted_courses,
            uncovered_courses,
            warnings: state
                .integrity_issues()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Serializes the report to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        json::JsonGenerator::new(self).generate_pretty()
    }

    /// Returns `true` if the state had integrity problems.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Writes the JSON and Markdown reports into `dir`, creating it if needed.
///
/// Returns the paths of the JSON and Markdown files.
pub fn write_reports(report: &CoverageReport, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let json_path = dir.join(JSON_REPORT_FILE);
    let markdown_path = dir.join(MARKDOWN_REPORT_FILE);

    json::JsonGenerator::new(report).write_to_file(&json_path, true)?;
    std::fs::write(&markdown_path, MarkdownGenerator::new(report).generate())?;

    Ok((json_path, markdown_path))
}
