mod config;
mod fs_events;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::CliConfig;
use fs_events::FsEventSource;
use scour_indexer::IndexService;
use scour_protocol::{
    AggregateProgress, BulkSummary, CaseMode, FileSearchMode, FileSearchRequest, TextSearchRequest,
    WorkspaceStatus,
};
use scour_search::QueryEngine;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scour",
    version,
    about = "Workspace code-search indexing and query service driving an external engine"
)]
struct Cli {
    /// Configuration file (defaults to ./scour.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root, repeatable; defaults to configured roots, then the
    /// current directory
    #[arg(long = "root", global = true)]
    roots: Vec<PathBuf>,

    /// Emit JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build indexes for every workspace root that lacks one
    Init,
    /// Force a full rebuild of every workspace index
    Rebuild,
    /// Delete every workspace index
    Clear,
    /// Show per-root readiness and progress
    Status,
    /// Regex text search across workspace indexes
    Search {
        query: String,
        /// Scope: absolute path, WorkspaceName/relative, relative, or glob
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        max_results: Option<usize>,
        /// Force case handling instead of smart-case
        #[arg(long, value_enum)]
        case: Option<CaseArg>,
    },
    /// File search across workspace indexes
    Files {
        query: String,
        #[arg(long, value_enum, default_value = "fuzzy")]
        mode: ModeArg,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Keep indexes fresh: watch roots and config until interrupted
    Serve,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CaseArg {
    Sensitive,
    Insensitive,
}

impl From<CaseArg> for CaseMode {
    fn from(value: CaseArg) -> Self {
        match value {
            CaseArg::Sensitive => Self::Sensitive,
            CaseArg::Insensitive => Self::Insensitive,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Path,
    Name,
    Plain,
    Fuzzy,
}

impl From<ModeArg> for FileSearchMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Path => Self::PathRegex,
            ModeArg::Name => Self::NameRegex,
            ModeArg::Plain => Self::Plain,
            ModeArg::Fuzzy => Self::Fuzzy,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let cli = Cli::parse();

    let (config, config_path) = CliConfig::load(cli.config.as_deref())?;
    let roots = resolve_roots(&cli.roots, &config)?;

    let service = IndexService::start(config.to_service_config())?;
    for root in &roots {
        service.add_root(root)?;
    }

    let result = run_command(&cli, &service, &roots, config_path).await;
    service.shutdown();
    result
}

async fn run_command(
    cli: &Cli,
    service: &IndexService,
    roots: &[PathBuf],
    config_path: Option<PathBuf>,
) -> Result<()> {
    match &cli.command {
        Command::Init => {
            let summary = service.init_all().await?;
            report_bulk(cli.json, "init", &summary)
        }
        Command::Rebuild => {
            let summary = service.rebuild_all().await?;
            report_bulk(cli.json, "rebuild", &summary)
        }
        Command::Clear => {
            let summary = service.clear_all().await?;
            report_bulk(cli.json, "clear", &summary)
        }
        Command::Status => {
            let status = service.status();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
            Ok(())
        }
        Command::Search {
            query,
            path,
            max_results,
            case,
        } => {
            let engine = QueryEngine::new(service.clone());
            let response = engine
                .text_search(&TextSearchRequest {
                    query: query.clone(),
                    search_path: path.clone(),
                    max_results: *max_results,
                    case: case.map(Into::into),
                })
                .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                for item in &response.matches {
                    println!("{}:{}:{}", item.path, item.line, item.preview);
                }
                let suffix = if response.capped {
                    format!(" (capped at {})", response.max_results_applied)
                } else {
                    String::new()
                };
                println!(
                    "{} of {} matches{suffix}",
                    response.count, response.total_available
                );
            }
            Ok(())
        }
        Command::Files {
            query,
            mode,
            path,
            max_results,
        } => {
            let engine = QueryEngine::new(service.clone());
            let response = engine
                .file_search(&FileSearchRequest {
                    query: query.clone(),
                    mode: (*mode).into(),
                    search_path: path.clone(),
                    max_results: *max_results,
                })
                .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                for file in &response.files {
                    println!("{}", file.path);
                }
                let suffix = if response.capped {
                    format!(" (capped at {})", response.max_results_applied)
                } else {
                    String::new()
                };
                println!("{} of {} files{suffix}", response.count, response.total_available);
            }
            Ok(())
        }
        Command::Serve => {
            let _events = FsEventSource::start(service.clone(), roots, config_path)?;
            let summary = service.init_all().await?;
            // A root that failed to init should not stop the others from
            // being served.
            if let Err(err) = report_bulk(cli.json, "init", &summary) {
                log::warn!("{err:#}");
            }
            log::info!("serving; press ctrl-c to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to wait for shutdown signal")?;
            log::info!("shutting down");
            Ok(())
        }
    }
}

fn resolve_roots(cli_roots: &[PathBuf], config: &CliConfig) -> Result<Vec<PathBuf>> {
    let candidates: Vec<PathBuf> = if !cli_roots.is_empty() {
        cli_roots.to_vec()
    } else if !config.roots.is_empty() {
        config.roots.clone()
    } else {
        vec![std::env::current_dir().context("failed to resolve current directory")?]
    };

    let mut roots = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !candidate.is_dir() {
            bail!("workspace root is not a directory: {}", candidate.display());
        }
        roots.push(candidate.canonicalize().unwrap_or(candidate));
    }
    Ok(roots)
}

fn report_bulk(json: bool, action: &str, summary: &BulkSummary) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!(
            "{action}: {} of {} workspaces processed, {} failed",
            summary.processed, summary.total_workspaces, summary.failed
        );
        for failure in &summary.failures {
            println!("  {}: {}", failure.root, failure.message);
        }
    }
    if summary.failed > 0 {
        bail!(
            "{action} failed for {} of {} workspaces",
            summary.failed,
            summary.total_workspaces
        );
    }
    Ok(())
}

fn print_status(status: &WorkspaceStatus) {
    for root in &status.roots {
        let readiness = if root.initialized {
            "initialized"
        } else {
            "not initialized"
        };
        let watch = if root.watch_alive { "watching" } else { "idle" };
        let progress = &root.progress;
        let detail = match (progress.indexed, progress.total) {
            (Some(indexed), Some(total)) => {
                format!("{indexed}/{total} files ({}%)", progress.percent.unwrap_or(0))
            }
            (Some(indexed), None) => format!("{indexed} files indexed"),
            _ => "progress unknown".to_string(),
        };
        let activity = if progress.indexing { ", indexing" } else { "" };
        println!("{} [{readiness}, {watch}{activity}] {detail}", root.name);
    }

    match &status.aggregate {
        AggregateProgress::Counted {
            indexed,
            total,
            remaining,
            percent,
        } => println!("total: {indexed}/{total} files, {remaining} remaining ({percent}%)"),
        AggregateProgress::Averaged { percent } => println!("total: ~{percent}%"),
        AggregateProgress::Unknown => println!("total: unknown"),
    }
}
