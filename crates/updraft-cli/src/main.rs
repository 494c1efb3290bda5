mod cmd;
mod output;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use cmd::serve::ServeArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "updraft",
    about = "Unattended update agent and delivery server",
    version,
    propagate_version = true
)]
struct Cli {
    /// Agent configuration file
    #[arg(long, global = true, env = "UPDRAFT_CONFIG", default_value = "updraft.yaml")]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the update agent until stopped
    Agent {
        /// No console banner (used when relaunched after a self-update)
        #[arg(long)]
        silent: bool,

        /// Append logs to this file instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Run a single update cycle and exit
    Cycle {
        /// Evaluate as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        on: Option<NaiveDate>,
    },

    /// Start the delivery server
    Serve(ServeArgs),

    /// Download a URL, resuming a partial destination file
    Fetch { url: String, dest: PathBuf },

    /// Print the SHA-256 digest of a file
    Digest { path: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Agent { .. } | Commands::Serve(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };
    let log_file = match &cli.command {
        Commands::Agent { log_file, .. } => log_file
            .clone()
            .or_else(|| cmd::load_config(&cli.config).ok()?.log_file),
        _ => None,
    };
    if let Err(e) = init_logging(default_level, log_file.as_deref()) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Agent { silent, .. } => cmd::agent::run(&cli.config, silent),
        Commands::Cycle { on } => cmd::cycle::run(&cli.config, on, cli.json),
        Commands::Serve(args) => cmd::serve::run(args),
        Commands::Fetch { url, dest } => cmd::fetch::run(&cli.config, &url, &dest, cli.json),
        Commands::Digest { path } => cmd::digest::run(&path, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(level: tracing::Level, file: Option<&std::path::Path>) -> anyhow::Result<()> {
    use anyhow::Context;

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    match file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
