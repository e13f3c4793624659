use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sitesorter::{
    Config, ConsoleClient, DailyLog, Emit, EnvSettings, OutputSink, Pipeline, PromptConfirm,
    RuleSet, RunMode, RunOptions, RunOutcome, Settings, SorterError,
};
use sitesorter::config::RUN_MODE_VAR;

#[derive(Parser)]
#[command(name = "sitesorter")]
#[command(about = "Moves console agents out of the default site into their group's site")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Rule file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify default-site agents and move them (default)
    Run {
        /// Show what would be moved without prompting or moving
        #[arg(long)]
        dry_run: bool,
    },

    /// Check that console sites and configured groups agree
    Sites,

    /// Show which group each name would be sorted into
    Match {
        /// Agent display names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Write an example rule file
    Init {
        /// Overwrite an existing rule file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    info!("Starting sitesorter v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Some(Commands::Init { force }) => cmd_init(cli.config, force),
        Some(Commands::Match { names }) => cmd_match(cli.config, &names),
        Some(Commands::Sites) => cmd_sites(cli.config).await,
        Some(Commands::Run { dry_run }) => cmd_run(cli.config, RunOptions { dry_run }).await,
        None => cmd_run(cli.config, RunOptions::default()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()?;

    Ok(())
}

/// Load the rule file from the given path or the default location
fn load_rules(config_path: Option<PathBuf>) -> sitesorter::error::Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_default(),
    }
}

/// Resolve everything a console-facing command needs
///
/// Errors raised before a sink exists go to stderr. Unless the run is known
/// to be local, they also go to today's log file when the rule file was
/// readable.
fn load_settings(config_path: Option<PathBuf>) -> Result<(Settings, OutputSink)> {
    let rules = load_rules(config_path).map_err(|e| report_without_sink(e, None))?;

    let env = EnvSettings::from_env().map_err(|e| {
        let log = fallback_log(&rules);
        report_without_sink(e, log.as_ref())
    })?;

    let settings = Settings::new(rules, env);
    let sink = OutputSink::from_settings(&settings);
    Ok((settings, sink))
}

/// Log file for errors raised before the environment is complete
///
/// None when the mode parses as local, since local runs never write logs.
fn fallback_log(rules: &Config) -> Option<DailyLog> {
    let mode = std::env::var(RUN_MODE_VAR)
        .ok()
        .and_then(|raw| raw.parse::<RunMode>().ok());
    match mode {
        Some(RunMode::Local) => None,
        Some(RunMode::Prod) | None => Some(DailyLog::new(rules.logs_path(), 0)),
    }
}

fn report_without_sink(err: SorterError, log: Option<&DailyLog>) -> anyhow::Error {
    let message = format!("FATAL ERROR: {}", err);
    eprintln!("{}", message);
    if let Some(log) = log {
        // Best effort, stderr already has the message
        let _ = log.append(&message);
    }
    err.into()
}

/// Emit a fatal error through the sink before handing it to the top level
fn report(sink: &dyn Emit, err: SorterError) -> anyhow::Error {
    if let Err(sink_err) = sink.emit(&format!("ERROR: {}", err)) {
        eprintln!("ERROR: {}", err);
        eprintln!("Failed to write to output: {}", sink_err);
    }
    err.into()
}

/// Classify default-site agents and move them
async fn cmd_run(config_path: Option<PathBuf>, options: RunOptions) -> Result<()> {
    let (settings, sink) = load_settings(config_path)?;
    let client = ConsoleClient::new(&settings).map_err(|e| report(&sink, e))?;
    let pipeline = Pipeline::new(&settings, &client, &sink).map_err(|e| report(&sink, e))?;

    let mut confirm = PromptConfirm::stdio();
    let outcome = pipeline
        .run(&mut confirm, options)
        .await
        .map_err(|e| report(&sink, e))?;

    match outcome {
        RunOutcome::Moved(report) => info!(
            "Run complete: {} agents moved into {} groups",
            report.moved_endpoints(),
            report.moves.len()
        ),
        RunOutcome::NothingToMove => info!("Run complete: nothing to move"),
        RunOutcome::Declined => info!("Run complete: declined by operator"),
        RunOutcome::DryRun(result) => info!(
            "Dry run complete: {} agents would be moved, {} unmatched",
            result.moved_count(),
            result.unmatched().len()
        ),
    }

    Ok(())
}

/// Resolve the site directory and print it
async fn cmd_sites(config_path: Option<PathBuf>) -> Result<()> {
    let (settings, sink) = load_settings(config_path)?;
    let client = ConsoleClient::new(&settings).map_err(|e| report(&sink, e))?;
    let pipeline = Pipeline::new(&settings, &client, &sink).map_err(|e| report(&sink, e))?;

    let directory = pipeline
        .resolve_sites()
        .await
        .map_err(|e| report(&sink, e))?;

    for (group, site_id) in directory.iter() {
        let marker = if group == settings.rules.default_site {
            " (default)"
        } else {
            ""
        };
        sink.emit(&format!("{} -> {}{}", group, site_id, marker))
            .map_err(|e| report(&sink, e))?;
    }

    Ok(())
}

/// Classify names offline against the rule file
fn cmd_match(config_path: Option<PathBuf>, names: &[String]) -> Result<()> {
    let rules = load_rules(config_path)?;
    let rule_set = RuleSet::compile(&rules)?;

    for name in names {
        match rule_set
            .groups()
            .iter()
            .find_map(|group| group.first_match(name).map(|p| (group, p)))
        {
            Some((group, pattern)) => {
                println!("{} -> {} (pattern {})", name, group.name, pattern.source())
            }
            None => println!("{} -> no match", name),
        }
    }

    Ok(())
}

/// Write an example rule file to the default location
fn cmd_init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    if path.exists() && !force {
        anyhow::bail!(
            "rule file already exists at {}. Use --force to overwrite it",
            path.display()
        );
    }

    Config::default().save(&path)?;

    println!("✅ Example rule file written to {}", path.display());
    println!("   Edit the groups to match your console sites, then set");
    println!("   API_TOKEN, CONSOLE_URL, ENV (local|prod) and RETENTION_LOGS_DAYS");

    Ok(())
}
