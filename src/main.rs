use std::io::{BufRead as _, Write as _};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{error, warn};

use miniapp_merge::config::CONFIG_FILE;
use miniapp_merge::manifest::merge_manifests;
use miniapp_merge::patch::EntryScriptPatcher;
use miniapp_merge::{ArtifactMerger, MergeConfig, MergeOptions, MergeSession, Notification};

/// Merge two compiled mini-program trees into one deployable tree
///
/// The primary tree (`output`) is copied into `target`, its entry script is
/// patched into a lifecycle bridge, and an optional secondary tree
/// (`copy_dir`) is overlaid on top with its entry script chained behind the
/// bridge and both app manifests merged.
///
/// CONFIG:
///
///   Settings are read from miniapp-merge.toml in the working directory
///   (or --config). `target` is required; everything else has defaults.
///
/// WATCH PROTOCOL:
///
///   `miniapp-merge watch` reads one JSON notification per stdin line,
///   e.g. {"file": "/proj/src/pages/a.wxml", "type": "markup"}, and answers
///   each with a `next <file>` line on stdout once it has been recorded.
#[derive(Parser)]
#[command(name = "miniapp-merge")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, env = "MINIAPP_MERGE_CONFIG", default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full-tree merge now
    Run,

    /// Merge on debounced change notifications read from stdin
    Watch,

    /// Merge two manifests into a third file
    Manifest {
        /// Primary manifest (its scalars lose to the secondary's)
        primary: PathBuf,
        /// Secondary manifest
        secondary: PathBuf,
        /// Where to write the merged manifest
        dest: PathBuf,
    },

    /// Print the bridge file patched from an entry script
    Patch {
        /// Compiled entry script
        entry: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry = miniapp_merge::telemetry::init();

    let config = MergeConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Run => run(config),
        Commands::Watch => watch(config),
        Commands::Manifest {
            primary,
            secondary,
            dest,
        } => {
            let merged = merge_manifests(&primary, &secondary, &dest, None)?;
            let pages = merged["pages"].as_array().map_or(0, Vec::len);
            println!("wrote {} ({pages} pages)", dest.display());
            Ok(())
        }
        Commands::Patch { entry } => {
            let patched = EntryScriptPatcher::new(&config.bridge).patch_file(&entry)?;
            print!("{patched}");
            Ok(())
        }
    }
}

fn run(config: MergeConfig) -> Result<()> {
    let merger = ArtifactMerger::new(MergeOptions::new(config)?);
    let report = merger.run_full_tree()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn watch(config: MergeConfig) -> Result<()> {
    let mut session = MergeSession::new(MergeOptions::new(config)?);

    let (tx, rx) = mpsc::channel::<std::io::Result<String>>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stdout = std::io::stdout().lock();
    loop {
        let received = match session.next_deadline() {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                rx.recv_timeout(wait)
            }
            None => rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Ok(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Notification>(line) {
                    Ok(notification) => {
                        let mut acked = Ok(());
                        session.notify(&notification, Instant::now(), || {
                            acked = writeln!(stdout, "next {}", notification.file.display())
                                .and_then(|()| stdout.flush());
                        });
                        acked.with_context(|| {
                            format!("acknowledging {}", notification.file.display())
                        })?;
                    }
                    Err(e) => warn!(error = %e, line, "malformed notification ignored"),
                }
            }
            Ok(Err(e)) => return Err(e).context("reading notifications from stdin"),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Err(e) = session.poll(Instant::now()) {
                    error!("{e}");
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Err(e) = session.flush(Instant::now()) {
                    error!("{e}");
                }
                return Ok(());
            }
        }
    }
}
