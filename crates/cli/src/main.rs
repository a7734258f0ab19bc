//! langsync command-line tool.
//!
//! Provides subcommands for running a full batch sync across every
//! configured language (`run`), syncing a single language (`sync`), and
//! generating / validating configuration files (`init`, `validate`).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use langsync_core::batch::BatchDriver;
use langsync_core::config::AppConfig;
use langsync_core::models::{BatchReport, SyncTarget, TargetResult};
use langsync_core::sync_engine::SyncEngine;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Synchronize per-language translation repositories with their upstream
/// source.
#[derive(Parser, Debug)]
#[command(
    name = "langsync",
    version,
    about = "Mirror an upstream repository into per-language translation forks"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "langsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync every configured language.
    Run {
        /// Maximum number of languages synced concurrently (overrides the
        /// config file; default is sequential).
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Delete each language's local clone after a successful sync.
        #[arg(long)]
        cleanup: bool,

        /// Restrict the batch to these language codes (repeatable).
        #[arg(long = "lang")]
        langs: Vec<String>,

        /// Print the batch report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Sync a single language.
    Sync {
        /// Language code (the translation repository is `<code>.<repo>`).
        lang: String,

        /// Reviewers for a conflict pull request, comma-separated.
        /// Defaults to the reviewers configured for this language.
        #[arg(short, long, value_delimiter = ',')]
        reviewers: Vec<String>,

        /// Account name for clone authentication and commit authorship.
        #[arg(long, env = "LANGSYNC_USERNAME")]
        username: Option<String>,

        /// Commit author email.
        #[arg(long, env = "LANGSYNC_EMAIL")]
        email: Option<String>,

        /// Access token (prefer the environment variable over the flag).
        #[arg(long, env = "LANGSYNC_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Delete the local clone after a successful sync.
        #[arg(long)]
        cleanup: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./langsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Init { output } => {
            cmd_init(&output)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate => {
            cmd_validate(&cli.config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            concurrency,
            cleanup,
            langs,
            json,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(n) = concurrency {
                config.batch.concurrency = n;
            }
            if cleanup {
                config.batch.cleanup = true;
            }
            config.validate().context("configuration validation failed")?;

            let targets = select_targets(&config, &langs)?;
            let _guard = init_logging(&config.batch.log_dir, &config.batch.log_level)?;
            cmd_batch(config, targets, json).await
        }
        Commands::Sync {
            lang,
            reviewers,
            username,
            email,
            token,
            cleanup,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(username) = username {
                config.github.username = username;
            }
            if let Some(email) = email {
                config.github.email = email;
            }
            if let Some(token) = token {
                config.github.token = Some(token);
            }
            if cleanup {
                config.batch.cleanup = true;
            }
            config.batch.concurrency = 1;
            config.validate().context("configuration validation failed")?;

            let target = match config.target_for(&lang) {
                Some(mut target) => {
                    if !reviewers.is_empty() {
                        target.reviewers = reviewers;
                    }
                    target
                }
                None => {
                    warn!(lang = %lang, "language not in config file, syncing ad hoc");
                    SyncTarget {
                        language: lang,
                        reviewers,
                    }
                }
            };

            let _guard = init_logging(&config.batch.log_dir, &config.batch.log_level)?;
            cmd_batch(config, vec![target], false).await
        }
    }
}

// ---------------------------------------------------------------------------
// Config & logging helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config =
        AppConfig::load_from_file(path).context("failed to load configuration file")?;
    config.resolve_env_vars();
    Ok(config)
}

/// Console output plus a file-backed append log per invocation.
fn init_logging(
    log_dir: &Path,
    level: &str,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir).context("failed to create log directory")?;
    let file_appender = tracing_appender::rolling::never(log_dir, "langsync.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

fn select_targets(config: &AppConfig, langs: &[String]) -> Result<Vec<SyncTarget>> {
    if langs.is_empty() {
        return Ok(config.targets());
    }
    langs
        .iter()
        .map(|code| {
            config
                .target_for(code)
                .ok_or_else(|| anyhow::anyhow!("language '{}' is not configured", code))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_batch(config: AppConfig, targets: Vec<SyncTarget>, json: bool) -> Result<ExitCode> {
    let config = Arc::new(config);

    info!("========================================");
    info!("  langsync v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Upstream     : {}/{}", config.upstream.owner, config.upstream.repo);
    info!("Branch       : {}", config.upstream.default_branch);
    info!("Languages    : {}", targets.len());
    info!("Concurrency  : {}", config.batch.concurrency);
    info!("Work root    : {}", config.batch.work_root.display());
    info!("Cleanup      : {}", config.batch.cleanup);
    info!("========================================");

    let engine =
        Arc::new(SyncEngine::new(config.clone()).context("failed to initialize sync engine")?);
    let driver = BatchDriver::new(engine, config.clone());

    // Ctrl-C stops the batch at the next per-target checkpoint; the
    // in-flight sync finishes so no clone is left half-written by us.
    let cancel = driver.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight targets, skipping the rest");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = driver.run(targets).await;
    print_report(&report, json)?;

    if report
        .targets
        .iter()
        .any(|t| matches!(t, TargetResult::Failed { .. }))
    {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_report(report: &BatchReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!("Sync results");
    println!("============");
    for result in &report.targets {
        match result {
            TargetResult::Completed(r) => {
                println!(
                    "  {}  {:<12} {}",
                    style("ok").green().bold(),
                    r.language,
                    r.outcome
                );
                for file in &r.conflict_files {
                    println!("       conflict: {}", file);
                }
            }
            TargetResult::Failed { language, error } => {
                println!(
                    "  {} {:<12} {}",
                    style("err").red().bold(),
                    language,
                    error
                );
            }
            TargetResult::Skipped { language } => {
                println!("  {}  {:<12} skipped", style("--").dim(), language);
            }
        }
    }
    println!();
    println!(
        "{} target(s), started {}, finished {}",
        report.targets.len(),
        report.started_at.format("%H:%M:%S"),
        report.completed_at.format("%H:%M:%S"),
    );

    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# langsync configuration
# See documentation for all available options.

[batch]
# Directory holding one clone per translation repository.
work_root = "repo"
# Languages synced concurrently. 1 = sequential.
concurrency = 1
# Delete each clone after a successful sync.
cleanup = false
log_dir = "logs"
log_level = "info"
# fail_fast aborts a language on any git failure; best_effort tolerates
# failures of idempotent setup commands.
command_policy = "fail_fast"

[upstream]
owner = "single-spa"
repo = "single-spa.js.org"
default_branch = "master"

[github]
api_url = "https://api.github.com"
username = "sync-bot"
email = "sync-bot@example.com"
# Environment variable holding the access token.
token_env = "LANGSYNC_TOKEN"

[[languages]]
code = "zh-hans"
reviewers = ["some-reviewer"]
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your upstream repository and languages");
    println!("  2. Set the access token environment variable (LANGSYNC_TOKEN)");
    println!(
        "  3. Validate with: langsync validate --config {}",
        output.display()
    );
    println!(
        "  4. Run the batch: langsync run --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!(
        "  Upstream     : {}/{} ({})",
        config.upstream.owner, config.upstream.repo, config.upstream.default_branch
    );
    println!("  API URL      : {}", config.github.api_url);
    println!("  Username     : {}", config.github.username);
    println!(
        "  Access token : {}",
        if config.github.token.is_some() {
            "set"
        } else {
            "NOT SET"
        }
    );
    println!("  Work root    : {}", config.batch.work_root.display());
    println!("  Concurrency  : {}", config.batch.concurrency);
    println!("  Languages    : {}", config.languages.len());
    for lang in &config.languages {
        println!("    {:<10} reviewers: {}", lang.code, lang.reviewers.join(", "));
    }
    println!();
    println!("Configuration is valid.");

    Ok(())
}
