//! CLI binary for replaying navigation scripts and inspecting backstack merges.

mod script;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use script::{Replay, Script};

#[derive(Parser)]
#[command(name = "enro", version, about = "Navigation core playground")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON navigation script against an in-memory runtime
    Replay {
        /// Path to the script .json file
        script: PathBuf,

        /// Controller config .json file (overrides the script's config)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory to save the final navigation snapshot in
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Restore the snapshot from --snapshot before replaying
        #[arg(long, requires = "snapshot")]
        restore: bool,
    },

    /// Show how an old backstack merges into a new one
    Merge {
        /// Old backstack, comma separated
        #[arg(long, value_delimiter = ',')]
        old: Vec<String>,

        /// New backstack, comma separated
        #[arg(long, value_delimiter = ',')]
        new: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Replay {
            script,
            config,
            snapshot,
            restore,
        } => {
            cmd_replay(&script, config.as_deref(), snapshot.as_deref(), restore).await?;
        }
        Commands::Merge { old, new } => {
            cmd_merge(&old, &new);
        }
    }

    Ok(())
}

async fn cmd_replay(
    path: &Path,
    config: Option<&Path>,
    snapshot_dir: Option<&Path>,
    restore: bool,
) -> anyhow::Result<()> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let mut script = Script::from_json(&source)?;
    if let Some(config_path) = config {
        script.config = enro_core::ControllerConfig::load(config_path).await?;
    }

    let mut replay = Replay::new(&script)?;

    if restore {
        if let Some(dir) = snapshot_dir {
            match enro_core::load_snapshot(dir).await? {
                Some(saved) => {
                    let missing = replay.restore(&saved)?;
                    for key in missing {
                        tracing::warn!(container = %key, "Saved container is not in the script");
                    }
                }
                None => tracing::info!(dir = %dir.display(), "No snapshot to restore"),
            }
        }
    }

    for printed in replay.run(&script.steps)? {
        print!("{}", printed);
    }

    println!("Final tree:");
    print!("{}", replay.tree_dump());
    println!("Events: {}", replay.events().len());

    if let Some(dir) = snapshot_dir {
        let saved = enro_core::save_snapshot(&replay.runtime().snapshot(), dir).await?;
        println!("Snapshot: {}", saved.display());
    }

    Ok(())
}

fn cmd_merge(old: &[String], new: &[String]) {
    let merged = enro_core::merge(old, new, |s| s.clone());
    let removed: Vec<&str> = merged
        .iter()
        .filter(|s| !new.contains(*s))
        .map(String::as_str)
        .collect();

    println!("Merged:  {}", merged.join(","));
    println!("Removed: {}", removed.join(","));
}
