//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use url::Url;

use siteforge_core::{
    AgentTask, Generator, LedgerObserver, Orchestrator, PipelineError, PipelinePolicy,
    SavedLedger, TaskStatus, TemplateGenerator,
};
use siteforge_providers::OpenRouterGenerator;
use siteforge_shared::{
    AppConfig, BriefPayload, RawBrief, SiteForgeError, init_config, load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteForge: brief in, landing-site blueprint out.
#[derive(Parser)]
#[command(
    name = "siteforge",
    version,
    about = "Generate a landing-site blueprint (structure, copy, visuals, integrations) from a business brief.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Generation backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum GeneratorKind {
    /// Offline templates; no API keys needed.
    Template,
    /// Chat model via OpenRouter, plus Stripe when requested.
    Openrouter,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline for a brief (JSON or TOML).
    Forge {
        /// Path to the brief file.
        brief: PathBuf,

        /// Generation backend (defaults to `defaults.generator` from config).
        #[arg(short, long)]
        generator: Option<GeneratorKind>,

        /// Model id for the openrouter backend.
        #[arg(short, long)]
        model: Option<String>,

        /// Write the result JSON here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write the final ledger (per-stage status and outputs) as JSON.
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Resume from a ledger written by an earlier `--ledger` run.
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// Brief utilities.
    Brief {
        #[command(subcommand)]
        action: BriefAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Brief subcommands.
#[derive(Subcommand)]
pub(crate) enum BriefAction {
    /// Validate a brief and print its normalized form.
    Check {
        /// Path to the brief file.
        brief: PathBuf,
    },
    /// Print a sample brief as JSON.
    Sample,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "siteforge=info",
        1 => "siteforge=debug",
        _ => "siteforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Forge {
            brief,
            generator,
            model,
            out,
            ledger,
            resume,
        } => {
            let opts = ForgeOptions {
                brief,
                generator,
                model,
                out,
                ledger,
                resume,
            };
            cmd_forge(opts).await
        }
        Command::Brief { action } => match action {
            BriefAction::Check { brief } => cmd_brief_check(&brief),
            BriefAction::Sample => cmd_brief_sample(),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// forge
// ---------------------------------------------------------------------------

struct ForgeOptions {
    brief: PathBuf,
    generator: Option<GeneratorKind>,
    model: Option<String>,
    out: Option<PathBuf>,
    ledger: Option<PathBuf>,
    resume: Option<PathBuf>,
}

async fn cmd_forge(opts: ForgeOptions) -> Result<()> {
    let config = load_config()?;

    // Invalid input is reported before any stage runs.
    let brief = read_brief(&opts.brief)?;
    let digest = brief.digest();

    let kind = match opts.generator {
        Some(kind) => kind,
        None => GeneratorKind::from_str(&config.defaults.generator, true).map_err(|_| {
            eyre!(
                "defaults.generator '{}' must be 'template' or 'openrouter'",
                config.defaults.generator
            )
        })?,
    };
    let generator = build_generator(kind, &config, opts.model.as_deref())?;
    let policy = PipelinePolicy::from_settings(&config.retry)?;
    let orchestrator = Orchestrator::new(generator, policy);

    let run = match &opts.resume {
        Some(path) => {
            let previous = read_ledger(path)?;
            if !previous.matches(&brief) {
                warn!(
                    ledger = %path.display(),
                    "ledger was written for a different brief, running every stage"
                );
            }
            orchestrator.resume(brief, &previous)
        }
        None => orchestrator.start(brief),
    };

    info!(run_id = %run.id(), generator = ?kind, "forging site blueprint");

    let observer = run.observer();
    let progress = tokio::spawn(show_progress(observer.clone()));

    let cancel = run.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let outcome = run.run().await;
    // The ledger is dropped with the run, which ends the progress task.
    let _ = progress.await;

    let tasks = observer.snapshot();
    print_ledger(&tasks);
    if let Some(path) = &opts.ledger {
        let saved = SavedLedger {
            brief_digest: digest,
            tasks,
        };
        let json = serde_json::to_string_pretty(&saved)?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        eprintln!("  Ledger written to {}", path.display());
    }

    match outcome {
        Ok(result) => {
            let json = serde_json::to_string_pretty(&result)?;
            match &opts.out {
                Some(path) => {
                    std::fs::write(path, json)
                        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
                    eprintln!("  Blueprint written to {}", path.display());
                }
                None => println!("{json}"),
            }
            Ok(())
        }
        Err(err) => Err(describe_failure(&err)),
    }
}

fn build_generator(
    kind: GeneratorKind,
    config: &AppConfig,
    model: Option<&str>,
) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match kind {
        GeneratorKind::Template => {
            let base = Url::parse(&config.calendar.booking_base_url).wrap_err_with(|| {
                format!(
                    "calendar.booking_base_url '{}' is not a valid URL",
                    config.calendar.booking_base_url
                )
            })?;
            Arc::new(TemplateGenerator::new(base))
        }
        GeneratorKind::Openrouter => Arc::new(OpenRouterGenerator::from_config(config, model)?),
    };
    Ok(generator)
}

fn describe_failure(err: &PipelineError) -> color_eyre::eyre::Report {
    match err.stage {
        Some(stage) => eyre!("{} failed ({:?}): {}", stage.title(), err.kind, err.message),
        None => eyre!("pipeline failed ({:?}): {}", err.kind, err.message),
    }
}

/// Mirror the ledger onto a spinner until the run finishes.
async fn show_progress(mut observer: LedgerObserver) {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message("Starting");

    while observer.changed().await {
        let tasks = observer.snapshot();
        let done = tasks.iter().filter(|t| t.status == TaskStatus::Success).count();
        if let Some(stage) = observer.active() {
            spinner.set_message(format!(
                "[{}/{}] {}: {}",
                done + 1,
                tasks.len(),
                stage.title(),
                stage.description()
            ));
        }
    }
    spinner.finish_and_clear();
}

fn print_ledger(tasks: &[AgentTask]) {
    eprintln!();
    for task in tasks {
        let mark = match task.status {
            TaskStatus::Success => "✔",
            TaskStatus::Error => "✘",
            TaskStatus::Running => "…",
            TaskStatus::Pending => "·",
        };
        let attempts = if task.attempts > 1 {
            format!(" ({} attempts)", task.attempts)
        } else {
            String::new()
        };
        eprintln!("  {mark} {:<18} {:?}{attempts}", task.title, task.status);
        if let Some(error) = &task.error {
            eprintln!("      {error}");
        }
    }
    eprintln!();
}

// ---------------------------------------------------------------------------
// brief / config
// ---------------------------------------------------------------------------

fn cmd_brief_check(path: &Path) -> Result<()> {
    let brief = read_brief(path)?;
    println!("{}", serde_json::to_string_pretty(&brief)?);
    Ok(())
}

fn cmd_brief_sample() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&RawBrief::sample())?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Read and validate a brief. `.toml` files are parsed as TOML, anything else as JSON.
fn read_brief(path: &Path) -> std::result::Result<BriefPayload, PipelineError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::invalid_input(SiteForgeError::io(path, e))
    })?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let raw: RawBrief = if is_toml {
        toml::from_str(&content).map_err(|e| {
            PipelineError::invalid_input(SiteForgeError::invalid_brief(
                e.to_string(),
            ))
        })?
    } else {
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::invalid_input(SiteForgeError::invalid_brief(
                e.to_string(),
            ))
        })?
    };

    raw.validate().map_err(PipelineError::invalid_input)
}

fn read_ledger(path: &Path) -> Result<SavedLedger> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read ledger {}", path.display()))?;
    serde_json::from_str(&content)
        .wrap_err_with(|| format!("{} is not a SiteForge ledger", path.display()))
}

