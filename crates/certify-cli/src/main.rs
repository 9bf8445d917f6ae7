//! Certify CLI
//!
//! Manages certificate templates and their course assignments, and serves
//! the certificate API.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use certify_engine::{
    create_router, AppState, CertificateService, CertificateState, Config, CourseAvailability,
    Eligibility, MemoryStore, NewTemplate, ResolutionSource,
};
use certify_report::{write_reports, CoverageReport};
use certify_store::{Course, CourseId, Template, TemplateFields, TemplateId, UploadFile};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Certify - Certificate Template Assignment
///
/// Decides which certificate template each course uses, and lets
/// administrators move templates across many courses at once.
#[derive(Parser, Debug)]
#[command(name = "certify")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: certify.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Snapshot file holding templates and assignments (overrides config)
    #[arg(short, long, value_name = "FILE", global = true)]
    snapshot: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the certificate API over HTTP
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List templates
    Templates,
    /// Create a template
    Create {
        /// Template name
        #[arg(long)]
        name: String,
        #[command(flatten)]
        style: StyleArgs,
        /// Make the new template the default
        #[arg(long)]
        default: bool,
        /// Course to activate the template for (repeatable)
        #[arg(long = "course", value_name = "COURSE_ID")]
        courses: Vec<u64>,
    },
    /// Change fields of a template; fields not given keep their values
    Update {
        /// Template to update
        id: u64,
        /// New template name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        style: StyleArgs,
    },
    /// Make a template the global default
    SetDefault {
        /// Template to make default
        id: u64,
    },
    /// Delete a template and its course assignments
    Delete {
        /// Template to delete
        id: u64,
    },
    /// Activate a template for one or more courses
    Activate {
        /// Template to activate
        id: u64,
        /// Courses to bind to the template
        #[arg(required = true, value_name = "COURSE_ID")]
        courses: Vec<u64>,
    },
    /// Show which template a course resolves to
    Resolve {
        /// Course to resolve
        course: u64,
    },
    /// Show which courses a template may be assigned to
    Availability {
        /// Template being edited
        id: u64,
    },
    /// Print the preview URL of a template
    Preview {
        /// Template to preview
        id: u64,
    },
    /// Upload a background or signature image
    Upload {
        /// Template receiving the image
        id: u64,
        /// Image file
        file: PathBuf,
        /// Upload as signature instead of background
        #[arg(long)]
        signature: bool,
    },
    /// Manage the course registry
    Courses {
        #[command(subcommand)]
        action: CourseAction,
    },
    /// Write the coverage report (JSON and Markdown)
    Report {
        /// Output directory (overrides config)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CourseAction {
    /// List known courses
    List,
    /// Register a course or rename an existing one
    Add {
        /// Course identifier
        id: u64,
        /// Course name
        name: String,
    },
}

#[derive(ClapArgs, Debug)]
struct StyleArgs {
    /// Certificate heading
    #[arg(long)]
    title: Option<String>,
    /// Body text
    #[arg(long)]
    body: Option<String>,
    /// Signatory name
    #[arg(long, requires = "signatory_title")]
    signatory_name: Option<String>,
    /// Signatory role
    #[arg(long, requires = "signatory_name")]
    signatory_title: Option<String>,
    /// Primary color as #RRGGBB
    #[arg(long)]
    primary_color: Option<String>,
    /// Accent color as #RRGGBB
    #[arg(long)]
    accent_color: Option<String>,
}

impl StyleArgs {
    /// Overrides the given fields with every option that was passed.
    fn apply_to(self, mut fields: TemplateFields) -> TemplateFields {
        if let Some(title) = self.title {
            fields.title = title;
        }
        if let Some(body) = self.body {
            fields = fields.with_body(body);
        }
        if let (Some(name), Some(title)) = (self.signatory_name, self.signatory_title) {
            fields = fields.with_signatory(name, title);
        }
        if let Some(primary) = self.primary_color {
            fields.primary_color = primary;
        }
        if let Some(accent) = self.accent_color {
            fields.accent_color = accent;
        }
        fields
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, snapshot = ?args.snapshot, "Starting certify");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(ref snapshot) = args.snapshot {
        config.snapshot_file.clone_from(snapshot);
    }
    config.validate()?;

    let snapshot_path = PathBuf::from(&config.snapshot_file);
    let state = load_state(&snapshot_path).await?;
    let store = MemoryStore::new(state, &config);

    if let Command::Serve { host, port } = args.command {
        return serve(store, config, host, port, &snapshot_path).await;
    }

    let mut service = CertificateService::connect(store.clone(), config.retry.policy()).await?;
    let json = args.json;

    match args.command {
        // Served before connecting.
        Command::Serve { .. } => {}
        Command::Templates => {
            let templates = service.state().catalog().all();
            output(json, &templates, || print_templates(&templates))?;
        }
        Command::Create {
            name,
            style,
            default,
            courses,
        } => {
            let fields = style.apply_to(TemplateFields::named(name));
            let mut request =
                NewTemplate::new(fields).for_courses(courses.into_iter().map(CourseId));
            request.is_default = default;
            let created = service.create(request).await?;
            save_state(&store, &snapshot_path).await?;
            output(json, &created, || {
                println!("Created template #{}", created.template.id);
                print_template(&created.template);
                if let Some(ref activation) = created.activation {
                    println!("  Activated for {} course(s)", activation.activated.len());
                }
            })?;
        }
        Command::Update { id, name, style } => {
            let mut fields = service.state().catalog().require(TemplateId(id))?.fields;
            if let Some(name) = name {
                fields.name = name;
            }
            let template = service.update(TemplateId(id), style.apply_to(fields)).await?;
            save_state(&store, &snapshot_path).await?;
            output(json, &template, || print_template(&template))?;
        }
        Command::SetDefault { id } => {
            let previous = service.set_default(TemplateId(id)).await?;
            save_state(&store, &snapshot_path).await?;
            output(json, &previous, || match previous {
                Some(previous) if previous != TemplateId(id) => {
                    println!("Template #{id} is now the default (was #{previous})");
                }
                Some(_) => println!("Template #{id} is already the default"),
                None => println!("Template #{id} is now the default"),
            })?;
        }
        Command::Delete { id } => {
            let deleted = service.delete(TemplateId(id)).await?;
            save_state(&store, &snapshot_path).await?;
            output(json, &deleted, || {
                println!("Deleted template #{id}");
                if !deleted.released_courses.is_empty() {
                    println!(
                        "  {} course(s) now use the default",
                        deleted.released_courses.len()
                    );
                }
                if let Some(promoted) = deleted.promoted {
                    println!("  Template #{promoted} promoted to default");
                } else if deleted.was_default {
                    println!("  No default template remains");
                }
            })?;
        }
        Command::Activate { id, courses } => {
            let courses: Vec<CourseId> = courses.into_iter().map(CourseId).collect();
            let report = service.activate_for_courses(TemplateId(id), &courses).await?;
            save_state(&store, &snapshot_path).await?;
            output(json, &report, || {
                println!("Template #{id} activated");
                println!("  Activated: {}", format_ids(&report.activated));
                println!("  Unchanged: {}", format_ids(&report.unchanged));
                for revocation in &report.revocations {
                    println!(
                        "  Course {} taken from template #{}",
                        revocation.course_id, revocation.previous_template
                    );
                }
            })?;
        }
        Command::Resolve { course } => {
            let resolution = service.resolve_detailed(CourseId(course));
            output(json, &resolution, || match (&resolution.template, resolution.source) {
                (Some(template), ResolutionSource::Assigned) => {
                    println!("Course {course}: #{} {} (assigned)", template.id, template.name());
                }
                (Some(template), _) => {
                    println!("Course {course}: #{} {} (default)", template.id, template.name());
                }
                (None, _) => println!("Course {course}: built-in fallback design"),
            })?;
        }
        Command::Availability { id } => {
            let availability = service.availability_for(TemplateId(id))?;
            output(json, &availability, || print_availability(&availability))?;
        }
        Command::Preview { id } => {
            let url = service.preview(TemplateId(id)).await?;
            output(json, &url, || println!("{url}"))?;
        }
        Command::Upload {
            id,
            file,
            signature,
        } => {
            let upload = read_upload(&file).await?;
            let asset = if signature {
                service.upload_signature(TemplateId(id), upload).await?
            } else {
                service.upload_background(TemplateId(id), upload).await?
            };
            save_state(&store, &snapshot_path).await?;
            output(json, &asset, || {
                println!("Uploaded {} ({} bytes): {}", asset.kind, asset.size_bytes, asset.url);
            })?;
        }
        Command::Courses { action } => match action {
            CourseAction::List => {
                let courses = service.state().courses();
                output(json, &courses, || {
                    for course in &courses {
                        println!("{:>6}  {}", course.id, course.name);
                    }
                })?;
            }
            CourseAction::Add { id, name } => {
                let course = Course::new(id, name);
                store.add_course(course.clone()).await;
                save_state(&store, &snapshot_path).await?;
                output(json, &course, || println!("Registered course {}", course.id))?;
            }
        },
        Command::Report { output_dir } => {
            let dir = PathBuf::from(output_dir.unwrap_or_else(|| config.report_dir.clone()));
            let report = CoverageReport::from_state(service.state());
            let (json_path, markdown_path) = write_reports(&report, &dir)?;
            output(json, &report.summary, || {
                println!("Reports written:");
                println!("  JSON: {}", json_path.display());
                println!("  Markdown: {}", markdown_path.display());
                println!("  Coverage: {:.1}%", report.summary.coverage_percent());
                if report.has_warnings() {
                    println!("  Warnings: {}", report.warnings.len());
                }
            })?;
        }
    }

    Ok(())
}

/// Runs the HTTP server until Ctrl+C, then saves the snapshot.
async fn serve(
    store: MemoryStore,
    config: Config,
    host: Option<String>,
    port: Option<u16>,
    snapshot_path: &Path,
) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}").parse().map_err(|e| {
        anyhow::anyhow!("Invalid bind address '{host}:{port}': {e}\n\nSuggestion: Use an IP address such as 127.0.0.1")
    })?;

    let router = create_router(AppState::new(store.clone(), config));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port")
    })?;

    println!("Certificate API running on http://{addr}/api/certificates");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    save_state(&store, snapshot_path).await?;
    println!("Snapshot saved to {}", snapshot_path.display());
    Ok(())
}

/// Loads configuration from file or uses defaults.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads the snapshot, or starts empty if none exists yet.
async fn load_state(path: &Path) -> anyhow::Result<CertificateState> {
    match CertificateState::load(path).await? {
        Some(state) => {
            for issue in state.integrity_issues() {
                tracing::warn!(%issue, "Data integrity issue in snapshot");
            }
            Ok(state)
        }
        None => {
            tracing::info!(path = %path.display(), "No snapshot found, starting empty");
            Ok(CertificateState::new())
        }
    }
}

async fn save_state(store: &MemoryStore, path: &Path) -> anyhow::Result<()> {
    store.state().await.save(path).await?;
    Ok(())
}

async fn read_upload(path: &Path) -> anyhow::Result<UploadFile> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        anyhow::anyhow!("Failed to read '{}': {e}", path.display())
    })?;
    let file_name = path
        .file_name()
        .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
    Ok(UploadFile::new(file_name, bytes))
}

/// Prints `value` as JSON when requested, otherwise runs the text printer.
fn output<T: Serialize>(json: bool, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text();
    }
    Ok(())
}

fn print_templates(templates: &[Template]) {
    if templates.is_empty() {
        println!("No templates yet. Create one with `certify create --name <NAME>`.");
        return;
    }
    for template in templates {
        print_template(template);
    }
}

fn print_template(template: &Template) {
    let marker = if template.is_default { " (default)" } else { "" };
    println!("#{} {}{marker}", template.id, template.name());
    println!("  Title: {}", template.fields.title);
    println!(
        "  Colors: {} / {}",
        template.fields.primary_color, template.fields.accent_color
    );
}

fn print_availability(availability: &[CourseAvailability]) {
    for entry in availability {
        let state = match entry.eligibility {
            Eligibility::Available => "available".to_string(),
            Eligibility::Owned => "owned".to_string(),
            Eligibility::Locked { owner } => format!("locked by #{owner}"),
        };
        println!("{:>6}  {:<40} {state}", entry.course.id, entry.course.name);
    }
}

fn format_ids(ids: &[CourseId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn activate_takes_course_list() {
        let args = Args::try_parse_from(["certify", "--json", "activate", "2", "1", "3"]).unwrap();
        assert!(args.json);
        match args.command {
            Command::Activate { id, courses } => {
                assert_eq!(id, 2);
                assert_eq!(courses, vec![1, 3]);
            }
            other => panic!("Unexpected command {other:?}"),
        }
    }

    #[test]
    fn field_args_apply_overrides() {
        let args = Args::try_parse_from([
            "certify",
            "create",
            "--name",
            "Modern",
            "--primary-color",
            "#112233",
            "--course",
            "4",
        ])
        .unwrap();
        let Command::Create {
            name,
            style,
            courses,
            default,
        } = args.command
        else {
            panic!("Expected create");
        };
        let fields = style.apply_to(TemplateFields::named(name));
        assert_eq!(fields.name, "Modern");
        assert_eq!(fields.primary_color, "#112233");
        assert_eq!(courses, vec![4]);
        assert!(!default);
    }

    #[test]
    fn update_keeps_fields_not_passed() {
        let args =
            Args::try_parse_from(["certify", "update", "3", "--accent-color", "#445566"]).unwrap();
        let Command::Update { id, name, style } = args.command else {
            panic!("Expected update");
        };
        let current = TemplateFields::named("Classic")
            .with_body("Awarded to {{student}}")
            .with_signatory("Ada Lovelace", "Dean")
            .with_colors("#101010", "#202020");

        let updated = style.apply_to(current.clone());

        assert_eq!(id, 3);
        assert_eq!(name, None);
        assert_eq!(updated.name, "Classic");
        assert_eq!(updated.body_text, current.body_text);
        assert_eq!(updated.signatory_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(updated.primary_color, "#101010");
        assert_eq!(updated.accent_color, "#445566");
    }

    #[test]
    fn format_ids_joins_or_dashes() {
        assert_eq!(format_ids(&[]), "-");
        assert_eq!(format_ids(&[CourseId(1), CourseId(7)]), "1, 7");
    }
}
