//! Markdown rendering of coverage reports.
//!
//! The document holds a summary table, one row per template with the courses
//! it governs, the courses relying on the default, the courses with no
//! certificate design, and any integrity warnings.

use std::fmt::Write;

use crate::{CourseRef, CoverageReport, TemplateCoverage};

/// Generates Markdown from a [`CoverageReport`].
pub struct MarkdownGenerator<'a> {
    report: &'a CoverageReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a CoverageReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "# Certificate Coverage Report\n");
        self.write_summary(&mut output);
        self.write_templates(&mut output);
        Self::write_course_list(
            &mut output,
            "Courses Using the Default",
            &self.report.defaulted_courses,
        );
        Self::write_course_list(
            &mut output,
            "Courses Without a Certificate",
            &self.report.uncovered_courses,
        );
        self.write_warnings(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;
        let default = summary.default_template.map_or_else(
            || "none".to_string(),
            |id| {
                self.report
                    .templates
                    .iter()
                    .find(|t| t.id == id)
                    .map_or_else(
                        || format!("#{id}"),
                        |t| format!("#{id} {}", escape_markdown(&t.name)),
                    )
            },
        );

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Templates | {} |", summary.templates);
        let _ = writeln!(output, "| Courses | {} |", summary.courses);
        let _ = writeln!(output, "| Assigned | {} |", summary.assigned_courses);
        let _ = writeln!(output, "| Using default | {} |", summary.defaulted_courses);
        let _ = writeln!(output, "| No certificate | {} |", summary.uncovered_courses);
        let _ = writeln!(output, "| Coverage | {:.1}% |", summary.coverage_percent());
        let _ = writeln!(output, "| Default template | {default} |");
        let _ = writeln!(output);
    }

    fn write_templates(&self, output: &mut String) {
        let _ = writeln!(output, "## Templates\n");
        if self.report.templates.is_empty() {
            let _ = writeln!(output, "_No templates._\n");
            return;
        }

        let _ = writeln!(output, "| ID | Name | Default | Courses | Assets |");
        let _ = writeln!(output, "|----|------|---------|---------|--------|");
        for template in &self.report.templates {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                template.id,
                escape_markdown(&template.name),
                if template.is_default { "yes" } else { "no" },
                course_names(&template.courses),
                assets(template),
            );
        }
        let _ = writeln!(output);
    }

    fn write_course_list(output: &mut String, heading: &str, courses: &[CourseRef]) {
        let _ = writeln!(output, "## {heading}\n");
        if courses.is_empty() {
            let _ = writeln!(output, "_None._\n");
            return;
        }
        for course in courses {
            let _ = writeln!(output, "- {} (#{})", escape_markdown(&course.name), course.id);
        }
        let _ = writeln!(output);
    }

    fn write_warnings(&self, output: &mut String) {
        if self.report.warnings.is_empty() {
            return;
        }
        let _ = writeln!(output, "## Warnings\n");
        for warning in &self.report.warnings {
            let _ = writeln!(output, "- {}", escape_markdown(warning));
        }
        let _ = writeln!(output);
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---\n");
        let _ = writeln!(
            output,
            "*Generated by Certify on {}*",
            self.report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

fn course_names(courses: &[CourseRef]) -> String {
    if courses.is_empty() {
        return "-".to_string();
    }
    courses
        .iter()
        .map(|c| escape_markdown(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn assets(template: &TemplateCoverage) -> String {
    match (template.has_background, template.has_signature) {
        (true, true) => "background, signature".to_string(),
        (true, false) => "background".to_string(),
        (false, true) => "signature".to_string(),
        (false, false) => "none".to_string(),
    }
}

/// Escapes characters that would break Markdown tables or formatting.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use certify_engine::CertificateState;
    use certify_store::{CourseId, TemplateId};

    use super::*;
    use crate::tests::sample_state;

    #[test]
    fn test_templates_section() {
        let report = CoverageReport::from_state(&sample_state());
        let mut output = String::new();
        MarkdownGenerator::new(&report).write_templates(&mut output);

        insta::assert_snapshot!(output, @r###"
        ## Templates

        | ID | Name | Default | Courses | Assets |
        |----|------|---------|---------|--------|
        | 1 | Classic | yes | Rust 101 | none |
        | 2 | Modern | no | Async Rust, Unsafe Rust | none |
        "###);
    }

    #[test]
    fn test_generate_contains_all_sections() {
        let report = CoverageReport::from_state(&sample_state());
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.starts_with("# Certificate Coverage Report"));
        assert!(markdown.contains("| Coverage | 100.0% |"));
        assert!(markdown.contains("| Default template | #1 Classic |"));
        assert!(markdown.contains("## Courses Using the Default\n\n- Embedded (#4)"));
        assert!(markdown.contains("## Courses Without a Certificate\n\n_None._"));
        assert!(!markdown.contains("## Warnings"));
        assert!(markdown.contains("*Generated by Certify on"));
    }

    #[test]
    fn test_warnings_are_listed() {
        let mut state = sample_state();
        state.delete_template(TemplateId(2), false).unwrap();
        // Point a course at a template that no longer exists.
        let mut snapshot = state.snapshot();
        snapshot
            .assignments
            .push(certify_store::Assignment::active(TemplateId(2), CourseId(4)));
        let state = CertificateState::from_snapshot(snapshot);

        let report = CoverageReport::from_state(&state);
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.contains("## Warnings"));
        assert!(markdown.contains("references deleted template 2"));
    }

    #[test]
    fn test_empty_report() {
        let report = CoverageReport::from_state(&CertificateState::new());
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.contains("_No templates._"));
        assert!(markdown.contains("| Default template | none |"));
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a|b"), "a\\|b");
        assert_eq!(escape_markdown("*bold*"), "\\*bold\\*");
        assert_eq!(escape_markdown("line\nbreak"), "line<br>break");
        assert_eq!(escape_markdown("Rust 101"), "Rust 101");
    }
}
