//! CLI command definitions for reportforge.
//!
//! Each subcommand is a thin mapping onto the template engine or the report
//! query service. Generation itself needs the domain collaborators and is
//! only available through the library.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ConfigError, ReportingConfig};
use crate::error::{ErrorKind, ReportError, TemplateError};
use crate::report::{ReportQueries, ReportServices};
use crate::template::{
    MemoryTemplateRepository, NewTemplate, RenderOptions, RenderRequest, ReportPayload,
    TemplateEngine,
};
use crate::types::{Language, Page, ReportFilter, ReportFormat, ReportStatus, ReportType};

/// Template id used for ad hoc renders from a file.
const CLI_TEMPLATE_ID: &str = "cli-render";

/// Patent analytics report generation and management.
#[derive(Parser)]
#[command(name = "reportforge")]
#[command(about = "Render, inspect and export patent analytics reports")]
#[command(version)]
#[command(
    long_about = "reportforge renders FTO, infringement and portfolio reports through Tera templates and manages generated artifacts.\n\nExample usage:\n  reportforge lint templates/fto.html\n  reportforge status 5f0c...\n  reportforge export 5f0c... --format PDF --out report.pdf"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Dry-compile a template and list its placeholders.
    Lint(LintArgs),

    /// Render a template file against a JSON payload.
    Render(RenderArgs),

    /// Show the status of a report.
    Status(StatusArgs),

    /// List reports.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Write a completed report's artifact to a file or stdout.
    Export(ExportArgs),

    /// Delete a finished report and its artifacts.
    #[command(alias = "rm")]
    Delete(DeleteArgs),
}

/// Arguments for `reportforge lint`.
#[derive(Parser, Debug)]
pub struct LintArgs {
    /// Template source file.
    pub file: PathBuf,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `reportforge render`.
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Template source file.
    #[arg(short = 't', long)]
    pub template_file: PathBuf,

    /// JSON payload file. Tagged payloads (`{"kind": "fto", "data": {...}}`)
    /// are bound as `report`; anything else is bound at the top level.
    #[arg(short = 'd', long)]
    pub data: PathBuf,

    /// Output format (HTML, PDF, DOCX, PPTX).
    #[arg(short = 'f', long, default_value = "HTML")]
    pub format: String,

    /// Report language (en, zh).
    #[arg(long, default_value = "en")]
    pub language: String,

    /// Skip embedded charts.
    #[arg(long)]
    pub no_charts: bool,

    /// Output file; stdout when omitted.
    #[arg(short = 'o', long)]
    pub out: Option<PathBuf>,
}

/// Arguments for `reportforge status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    pub report_id: String,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `reportforge list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Owning entity (requester or portfolio id).
    #[arg(long)]
    pub owner: Option<String>,

    /// Report type (fto, infringement, portfolio).
    #[arg(long = "type")]
    pub report_type: Option<String>,

    /// Status (queued, processing, completed, failed).
    #[arg(long)]
    pub status: Option<String>,

    /// 1-based page number.
    #[arg(long, default_value = "1")]
    pub page: u32,

    #[arg(long, default_value = "20")]
    pub page_size: u32,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `reportforge export`.
#[derive(Parser, Debug)]
pub struct ExportArgs {
    pub report_id: String,

    /// Artifact format (HTML, PDF, DOCX, PPTX).
    #[arg(short = 'f', long, default_value = "HTML")]
    pub format: String,

    /// Output file; stdout when omitted.
    #[arg(short = 'o', long)]
    pub out: Option<PathBuf>,
}

/// Arguments for `reportforge delete`.
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    pub report_id: String,
}

/// JSON output of `lint`.
#[derive(Debug, Serialize)]
struct LintOutput {
    file: String,
    valid: bool,
    errors: Vec<String>,
    placeholders: Vec<String>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Lint(args) => run_lint_command(args),
        Commands::Render(args) => run_render_command(args).await,
        Commands::Status(args) => run_status_command(args).await,
        Commands::List(args) => run_list_command(args).await,
        Commands::Export(args) => run_export_command(args).await,
        Commands::Delete(args) => run_delete_command(args).await,
    }
}

/// Process exit code for a failed command.
///
/// Validation 2, Conflict 3, NotFound 4, Timeout 5, anything else 1.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    let kind = if let Some(e) = error.downcast_ref::<ReportError>() {
        e.kind()
    } else if error.downcast_ref::<ConfigError>().is_some() {
        ErrorKind::Validation
    } else {
        ErrorKind::Internal
    };
    match kind {
        ErrorKind::Validation => 2,
        ErrorKind::Conflict => 3,
        ErrorKind::NotFound => 4,
        ErrorKind::Timeout => 5,
        ErrorKind::Internal => 1,
    }
}

fn load_config() -> Result<ReportingConfig, ConfigError> {
    let config = ReportingConfig::from_env()?;
    config.validate()?;
    Ok(config)
}

async fn connect() -> anyhow::Result<ReportQueries> {
    let config = load_config()?;
    let services = ReportServices::connect(config).await?;
    Ok(ReportQueries::new(Arc::new(services)))
}

fn read_source(path: &Path) -> Result<String, ReportError> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ReportError::NotFound(format!("file '{}'", path.display()))
        } else {
            ReportError::Internal(format!("failed to read '{}': {}", path.display(), e))
        }
    })
}

fn write_output(out: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, bytes)?;
            info!(path = %path.display(), bytes = bytes.len(), "Wrote output");
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(bytes)?;
        }
    }
    Ok(())
}

// ============================================================================
// Template commands
// ============================================================================

fn run_lint_command(args: LintArgs) -> anyhow::Result<()> {
    let source = read_source(&args.file)?;
    let validation = crate::template::validate_source(&source);
    let output = LintOutput {
        file: args.file.display().to_string(),
        valid: validation.valid,
        errors: validation.errors,
        placeholders: validation.placeholders,
    };

    if args.json {
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else if output.valid {
        println!("{}: ok", output.file);
        println!("placeholders: {}", output.placeholders.join(", "));
    } else {
        println!("{}: invalid", output.file);
        for error in &output.errors {
            println!("  {}", error);
        }
    }

    if output.valid {
        Ok(())
    } else {
        Err(ReportError::from(TemplateError::Invalid {
            id: output.file,
            errors: output.errors,
        })
        .into())
    }
}

async fn run_render_command(args: RenderArgs) -> anyhow::Result<()> {
    let format: ReportFormat = args.format.parse()?;
    let language: Language = args.language.parse()?;
    let source = read_source(&args.template_file)?;
    let raw = read_source(&args.data)?;
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
        ReportError::Validation(format!("{} is not valid JSON: {}", args.data.display(), e))
    })?;

    let engine = TemplateEngine::new(Arc::new(MemoryTemplateRepository::new()));
    engine
        .register(NewTemplate::new(CLI_TEMPLATE_ID, "CLI render", source))
        .await
        .map_err(ReportError::from)?;

    let request = RenderRequest::new(CLI_TEMPLATE_ID, ReportPayload::from_json(value), format)
        .with_options(RenderOptions {
            language,
            title: None,
            include_charts: !args.no_charts,
        });
    let result = engine.render(request).await.map_err(ReportError::from)?;
    for warning in &result.warnings {
        warn!(warning = %warning, "Render warning");
    }
    info!(
        format = %result.format,
        bytes = result.content.len(),
        duration_ms = result.duration.as_millis() as u64,
        "Rendered template"
    );
    write_output(args.out.as_deref(), &result.content)
}

// ============================================================================
// Report commands
// ============================================================================

async fn run_status_command(args: StatusArgs) -> anyhow::Result<()> {
    let queries = connect().await?;
    let status = queries.get_status(&args.report_id).await?;

    if args.json {
        let json_output = serde_json::to_string_pretty(&status)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else {
        print!("{}: {} ({}%)", status.report_id, status.status, status.progress);
        match &status.message {
            Some(message) => println!(" {}", message),
            None => println!(),
        }
    }
    Ok(())
}

async fn run_list_command(args: ListArgs) -> anyhow::Result<()> {
    let mut filter = ReportFilter::new();
    if let Some(owner) = args.owner {
        filter = filter.with_owner(owner);
    }
    if let Some(report_type) = args.report_type {
        filter = filter.with_type(report_type.parse::<ReportType>()?);
    }
    if let Some(status) = args.status {
        filter = filter.with_status(status.parse::<ReportStatus>()?);
    }

    let queries = connect().await?;
    let page = queries
        .list(&filter, Page::new(args.page, args.page_size))
        .await?;

    if args.json {
        let json_output = serde_json::to_string_pretty(&page)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    for meta in &page.items {
        println!(
            "{}  {:<12}  {:<10}  {}  {}",
            meta.report_id,
            meta.report_type.as_str(),
            meta.status.as_str(),
            meta.created_at.format("%Y-%m-%d %H:%M"),
            meta.title
        );
    }
    println!(
        "page {} ({} per page), {} total",
        page.page, page.page_size, page.total
    );
    Ok(())
}

async fn run_export_command(args: ExportArgs) -> anyhow::Result<()> {
    use tokio::io::AsyncReadExt;

    let format: ReportFormat = args.format.parse()?;
    let queries = connect().await?;
    let mut exported = queries.export(&args.report_id, format).await?;

    let mut bytes = Vec::new();
    exported.stream.read_to_end(&mut bytes).await?;
    info!(
        report_id = %exported.report_id,
        content_type = %exported.content_type,
        "Exporting report"
    );
    write_output(args.out.as_deref(), &bytes)
}

async fn run_delete_command(args: DeleteArgs) -> anyhow::Result<()> {
    let queries = connect().await?;
    queries.delete(&args.report_id).await?;
    println!("deleted {}", args.report_id);
    Ok(())
}
