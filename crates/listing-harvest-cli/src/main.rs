//! ListingHarvest command-line entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio::sync::broadcast::error::RecvError;

use listing_harvest::{
    BackgroundRequest, HarvestConfig, Harvester, RunState, SourceSelection,
};
use listing_harvest_cli::{progress_line, sources_table, stats_text, status_summary};

#[derive(Parser)]
#[command(
    name = "listing-harvest",
    about = "Collect, deduplicate and store business listings from many sources",
    version
)]
struct Cli {
    /// SQLite database path. Also reads LISTING_HARVEST_DB.
    #[arg(long, global = true)]
    db: Option<String>,

    /// Source catalog JSON file. Also reads LISTING_HARVEST_CATALOG.
    #[arg(long, global = true)]
    catalog: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog sources in run order.
    Sources,

    /// Run sources now, printing progress until done. Ctrl-C stops after
    /// the current source.
    Run {
        /// Only run these sources (repeatable).
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Give up on the whole run after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show statistics over stored listings.
    Stats {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Write stored listings as JSON.
    Export {
        /// Output file (stdout when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove seeded demo listings.
    PurgeSamples,

    /// Remove every stored listing.
    Clear,

    /// Start the HTTP control surface.
    #[cfg(feature = "http")]
    Serve {
        /// Listen address (host:port).
        #[arg(long, default_value = "127.0.0.1:3200")]
        addr: String,
    },

    /// Generate shell completion scripts.
    ///
    /// Example:
    ///   listing-harvest completions bash > ~/.local/share/bash-completion/completions/listing-harvest
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "listing-harvest", &mut std::io::stdout());
        return Ok(());
    }

    let config = HarvestConfig::resolve(cli.db.as_deref(), cli.catalog.as_deref())?;
    let harvester = Harvester::from_config(&config)
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;

    match cli.command {
        Commands::Sources => {
            print!("{}", sources_table(&harvester.orchestrator().list_sources()));
        }

        Commands::Run { sources, timeout } => {
            let selection = if sources.is_empty() {
                SourceSelection::All
            } else {
                SourceSelection::Named(sources)
            };
            run_foreground(
                &harvester,
                BackgroundRequest {
                    selection,
                    timeout: timeout.map(Duration::from_secs),
                },
            )
            .await?;
        }

        Commands::Stats { json } => {
            let stats = harvester.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", stats_text(&stats));
            }
        }

        Commands::Export { output } => {
            let json = serde_json::to_string_pretty(&harvester.records())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    eprintln!("Exported {} listing(s) to {}", harvester.records().len(), path.display());
                }
                None => println!("{json}"),
            }
        }

        Commands::PurgeSamples => {
            let removed = harvester.purge_samples()?;
            println!("Removed {removed} sample listing(s)");
        }

        Commands::Clear => {
            harvester.clear()?;
            println!("Cleared all listings");
        }

        #[cfg(feature = "http")]
        Commands::Serve { addr } => {
            listing_harvest_cli::server::serve(&addr, harvester).await?;
        }

        Commands::Completions { .. } => unreachable!("handled before opening the store"),
    }

    Ok(())
}

/// Start a background run and follow it until it ends.
async fn run_foreground(harvester: &Harvester, request: BackgroundRequest) -> anyhow::Result<()> {
    let mut events = harvester.orchestrator().subscribe();
    if !harvester.start(request) {
        bail!("a run is already in progress");
    }

    let mut stopping = false;
    loop {
        tokio::select! {
            _ = harvester.wait() => break,
            event = events.recv() => match event {
                Ok(event) => println!("{}", progress_line(&event)),
                Err(RecvError::Lagged(n)) => tracing::debug!("skipped {n} progress event(s)"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c(), if !stopping => {
                eprintln!("Stopping after the current source...");
                harvester.stop();
                stopping = true;
            }
        }
    }
    while let Ok(event) = events.try_recv() {
        println!("{}", progress_line(&event));
    }

    let status = harvester.status();
    eprint!("{}", status_summary(&status, 5));
    if status.state == RunState::Failed {
        bail!("run failed");
    }
    Ok(())
}
