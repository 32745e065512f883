//! Offline inspection of agent-state documents.
//!
//! Reads a snapshot mirrored to disk and prints the same tree and interrupt
//! status the console would show for it.

use std::path::{Path, PathBuf};

use agent_state::core::interrupt::{ConfirmationPrompt, InterruptMachine};
use agent_state::core::snapshot::Snapshot;
use agent_state::core::tree_view::{TreeNode, build_tree};
use agent_state::exit_codes;
use agent_state::io::config::{ConsoleConfig, DEFAULT_CONFIG_PATH, write_config};
use agent_state::io::snapshot_file::read_snapshot_file;
use agent_state::logging;
use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "agent-state",
    version,
    about = "Inspect data-orchestration agent state documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the state tree (queries, datasets, query results).
    Tree {
        /// Snapshot JSON file.
        snapshot: PathBuf,
        /// Emit the tree as JSON instead of an outline.
        #[arg(long)]
        json: bool,
    },
    /// Report recovered fields, session info and any pending interrupt.
    Inspect {
        /// Snapshot JSON file.
        snapshot: PathBuf,
    },
    /// Write a default console config for `state-ui`.
    InitConfig {
        /// Config file to create.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        path: PathBuf,
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Tree { snapshot, json } => cmd_tree(&snapshot, json),
        Command::Inspect { snapshot } => cmd_inspect(&snapshot),
        Command::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        eprintln!("{} already exists (use --force to replace it)", path.display());
        return Ok(exit_codes::INVALID);
    }
    write_config(path, &ConsoleConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_tree(path: &Path, json: bool) -> Result<i32> {
    let parsed = Snapshot::from_value(read_snapshot_file(path)?);
    let tree = build_tree(&parsed.snapshot.collections);
    if json {
        let payload = serde_json::to_string_pretty(&tree).context("serialize tree")?;
        println!("{payload}");
    } else {
        print!("{}", render_outline(&tree));
    }
    Ok(exit_codes::OK)
}

fn cmd_inspect(path: &Path) -> Result<i32> {
    let parsed = Snapshot::from_value(read_snapshot_file(path)?);
    for field in &parsed.recovered {
        println!("recovered: {} ({})", field.key, field.reason);
    }

    let snapshot = &parsed.snapshot;
    let session = &snapshot.session;
    println!("mode: {}", session.current_mode.as_str());
    println!(
        "planning_complete: {}",
        if session.planning_complete { "yes" } else { "no" }
    );
    println!(
        "action_step: {}",
        session.action_step.as_deref().unwrap_or("N/A")
    );
    let collections = &snapshot.collections;
    println!(
        "queries={} datasets={} query_results={}",
        collections.queries.len(),
        collections.datasets.len(),
        collections.query_results.len()
    );

    let mut machine = InterruptMachine::new();
    machine.observe(snapshot.active_interrupt());
    let Some(prompt) = ConfirmationPrompt::for_view(&machine.view()) else {
        println!("interrupt: none");
        return Ok(exit_codes::OK);
    };
    println!("interrupt: pending");
    println!("message: {}", prompt.message);
    if let Some(preview) = prompt.query_preview {
        println!("query_preview:\n{preview}");
    }
    let queued = snapshot.interrupt_payload.len().saturating_sub(1);
    if queued > 0 {
        println!("queued: {queued}");
    }
    Ok(exit_codes::INTERRUPTED)
}

/// Indented outline: folders, then leaves with their date when parsable.
fn render_outline(tree: &[TreeNode]) -> String {
    let mut out = String::new();
    for folder in tree {
        out.push_str(&folder.label);
        out.push('\n');
        for leaf in &folder.children {
            out.push_str("  ");
            out.push_str(&leaf.label);
            if let Some(ts) = &leaf.timestamp {
                out.push_str("  ");
                out.push_str(&display_date(ts));
            }
            out.push('\n');
        }
    }
    out
}

fn display_date(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_state::core::snapshot::Collections;
    use agent_state::core::types::Query;

    #[test]
    fn parse_tree_json_flag() {
        let cli = Cli::parse_from(["agent-state", "tree", "state.json", "--json"]);
        assert!(matches!(cli.command, Command::Tree { json: true, .. }));
    }

    #[test]
    fn parse_inspect() {
        let cli = Cli::parse_from(["agent-state", "inspect", "state.json"]);
        assert!(
            matches!(cli.command, Command::Inspect { snapshot } if snapshot == Path::new("state.json"))
        );
    }

    #[test]
    fn parse_init_config_defaults_path() {
        let cli = Cli::parse_from(["agent-state", "init-config"]);
        assert!(matches!(
            cli.command,
            Command::InitConfig { path, force: false } if path == Path::new(DEFAULT_CONFIG_PATH)
        ));
    }

    #[test]
    fn outline_shows_dates_or_raw_timestamps() {
        let collections = Collections {
            queries: vec![
                Query {
                    querysummary: "Count orders".to_string(),
                    timestamp: "2024-05-01T10:00:00Z".to_string(),
                    ..Query::default()
                },
                Query {
                    timestamp: "yesterday".to_string(),
                    ..Query::default()
                },
            ],
            ..Collections::default()
        };
        let outline = render_outline(&build_tree(&collections));
        assert_eq!(
            outline,
            "Queries (2)\n  Count orders  2024-05-01\n  Query 2  yesterday\n"
        );
    }
}
