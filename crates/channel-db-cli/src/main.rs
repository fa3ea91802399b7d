use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use channel_db_core::{
    apply_requests, validate, DataStore, ExtensionProbe, ImageProbe, LoadError, RowDefect,
    ValidationReport,
};
use channel_db_store_csv::{export_json, CsvStore};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

mod issues;
mod probe;

use probe::HttpImageProbe;

#[derive(Debug, Parser)]
#[command(name = "chdb")]
#[command(about = "Channel database maintenance CLI")]
struct Cli {
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply approved change requests to the data directory.
    Update(DbUpdateArgs),
    /// Check every table and report violations.
    Validate,
    /// Write every table as JSON plus a digest manifest.
    Export(DbExportArgs),
}

#[derive(Debug, Args)]
struct DbUpdateArgs {
    /// JSON batch of change requests; takes precedence over `--github-repo`.
    #[arg(long)]
    requests: Option<PathBuf>,
    #[arg(long, env = "GITHUB_REPOSITORY")]
    github_repo: Option<String>,
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Do not download logos; infer the format from the URL only.
    #[arg(long, default_value_t = false)]
    no_probe: bool,
}

#[derive(Debug, Args)]
struct DbExportArgs {
    #[arg(long, env = "API_DIR", default_value = "./.api")]
    out: PathBuf,
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn emit_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);
    match cli.command {
        Command::Db { command } => {
            let store = CsvStore::open(&cli.data_dir)?;
            run_db(*command, &store)
        }
    }
}

fn run_db(command: DbCommand, store: &CsvStore) -> Result<ExitCode> {
    let data = match store.load() {
        Ok(data) => data,
        Err(err) => {
            let Some(load_error) = err.downcast_ref::<LoadError>() else {
                return Err(err);
            };
            print_defects(load_error.file(), &load_error.defects());
            println!("\r\n{} error(s)", load_error.defects().len());
            return Ok(ExitCode::FAILURE);
        }
    };

    match command {
        DbCommand::Update(args) => run_db_update(&args, store, data),
        DbCommand::Validate => Ok(run_db_validate(&data)),
        DbCommand::Export(args) => run_db_export(&args, &data),
    }
}

fn run_db_update(args: &DbUpdateArgs, store: &CsvStore, mut data: DataStore) -> Result<ExitCode> {
    let requests = if let Some(path) = args.requests.as_deref() {
        issues::load_batch_file(path)?
    } else if let Some(repo) = args.github_repo.as_deref() {
        issues::load_github_issues(repo, args.github_token.as_deref())?
    } else {
        return Err(anyhow!("no change requests: pass --requests or --github-repo"));
    };
    info!(requests = requests.len(), "loaded change requests");

    let probe: Box<dyn ImageProbe> =
        if args.no_probe { Box::new(ExtensionProbe) } else { Box::new(HttpImageProbe::new()) };

    let before = data.clone();
    let report = apply_requests(&mut data, requests, &*probe);
    let changed = data.changed_tables(&before);
    store.save(&data, &changed)?;
    info!(
        processed = report.processed.len(),
        skipped = report.skipped.len(),
        tables = changed.len(),
        "update finished"
    );

    if let Some(path) = args.log_file.as_deref() {
        write_run_log(path, &report.log)?;
    }
    println!("{}", report.output_line());
    Ok(ExitCode::SUCCESS)
}

fn write_run_log(path: &Path, entries: &[channel_db_core::LogEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let mut text = String::new();
    for entry in entries {
        text.push_str(&entry.to_string());
        text.push('\n');
    }
    fs::write(path, text).with_context(|| format!("failed to write run log {}", path.display()))
}

fn run_db_validate(data: &DataStore) -> ExitCode {
    let report = validate(data);
    print_report(&report);
    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        warn!(violations = report.len(), "validation failed");
        ExitCode::FAILURE
    }
}

fn print_report(report: &ValidationReport) {
    if report.is_clean() {
        return;
    }
    for table in channel_db_core::Table::ALL {
        let defects: Vec<RowDefect> = report
            .for_table(table)
            .map(|violation| RowDefect { line: violation.line, message: violation.message.clone() })
            .collect();
        if !defects.is_empty() {
            print_defects(&table.file_name(), &defects);
        }
    }
    println!("\r\n{} error(s)", report.len());
}

fn print_defects(file: &str, defects: &[RowDefect]) {
    println!("\r\n{file}");
    for defect in defects {
        println!(" {:<6}{}", defect.line, defect.message);
    }
}

fn run_db_export(args: &DbExportArgs, data: &DataStore) -> Result<ExitCode> {
    let manifest = export_json(data, &args.out)?;
    emit_json(&serde_json::json!({
        "out": args.out.display().to_string(),
        "manifest": serde_json::to_value(&manifest).context("failed to serialize export manifest")?
    }))?;
    Ok(ExitCode::SUCCESS)
}
