use crate::engine::FolderPlacementEngine;
use crate::errors::FilingError;
use crate::models::{DriveSnapshot, Node};
use crate::settings::load_settings;
use crate::store::{DriveStore, MemoryDriveStore};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "drive-filer", version, about = "Files expense reports into year folders")]
struct Cli {
    /// Settings file (.yaml, .yml or .json).
    #[arg(long, global = true, env = "DRIVE_FILER_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the placement engine over a drive snapshot until nothing is left to do.
    Reconcile {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, default_value_t = 16)]
        max_passes: usize,
        /// Write the resulting snapshot here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the folder tree of a drive snapshot.
    Tree {
        #[arg(long)]
        snapshot: PathBuf,
    },
}

pub(crate) fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    if let Err(error) = crate::init_tracing(settings.log_dir.as_deref()) {
        eprintln!("logging disabled: {}", error);
    }

    match cli.command {
        Command::Reconcile {
            snapshot,
            max_passes,
            output,
        } => {
            let drive = read_snapshot(&snapshot)?;
            let store = MemoryDriveStore::new(drive);
            let engine = FolderPlacementEngine::new(Arc::new(store.clone()), settings);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start runtime")?;
            let passes = runtime.block_on(engine.settle(max_passes))?;
            tracing::info!(passes, "drive settled");

            let rendered = serde_json::to_string_pretty(&store.snapshot())?;
            match output {
                Some(path) => std::fs::write(&path, rendered)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{}", rendered),
            }
        }
        Command::Tree { snapshot } => {
            let drive = read_snapshot(&snapshot)?;
            print!("{}", render_tree(&drive));
        }
    }
    Ok(())
}

fn read_snapshot(path: &Path) -> anyhow::Result<DriveSnapshot> {
    let raw = std::fs::read_to_string(path).map_err(FilingError::from)?;
    serde_json::from_str(&raw).with_context(|| format!("invalid drive snapshot {}", path.display()))
}

/// Indented outline of the drive, folders before files, each level sorted by
/// name. Nodes whose parent is missing are listed at the top level.
fn render_tree(snapshot: &DriveSnapshot) -> String {
    let known: HashSet<&str> = snapshot.nodes.iter().map(Node::id).collect();
    let mut children: BTreeMap<Option<&str>, Vec<&Node>> = BTreeMap::new();
    for node in &snapshot.nodes {
        let parent = node.parent_folder().filter(|parent| known.contains(parent));
        children.entry(parent).or_default().push(node);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| {
            a.as_file()
                .is_some()
                .cmp(&b.as_file().is_some())
                .then_with(|| a.name().cmp(b.name()))
        });
    }

    let mut out = String::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<(&Node, usize)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|node| (*node, 0)).collect())
        .unwrap_or_default();

    while let Some((node, depth)) = stack.pop() {
        if !visited.insert(node.id()) {
            continue;
        }
        let marker = if node.as_folder().is_some() { "/" } else { "" };
        out.push_str(&format!("{}{}{}\n", "  ".repeat(depth), node.name(), marker));
        if let Some(kids) = children.get(&Some(node.id())) {
            stack.extend(kids.iter().rev().map(|kid| (*kid, depth + 1)));
        }
    }
    out
}
