//! triedb CLI - Command line interface for trienode_db
//!
//! Stages small tries through the memory database into a file store and
//! inspects what ended up on disk.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use trienode_db::{ChildRef, Database, DatabaseConfig, FileStore, Hash, TrieNode};

#[derive(Parser)]
#[command(name = "triedb")]
#[command(about = "A write-back memory database for Merkle trie nodes")]
#[command(version)]
struct Cli {
    /// Path to the node store file
    #[arg(short, long, default_value = "nodes.triedb")]
    database: PathBuf,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Log flushes and garbage collection to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new node store
    Init,

    /// Build a trie over the given values and commit it
    Insert {
        /// One leaf is created per value, at most 256
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Show a stored node
    Get {
        /// Node hash (hex)
        hash: String,
    },

    /// Check that every node below a root is stored
    Verify {
        /// Root hash (hex)
        root: String,
    },

    /// Show store statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Init => {
            let store = FileStore::create(&cli.database)?;
            store.sync()?;
            DatabaseConfig::load(&cli.database)?.save(&cli.database)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created node store at {}", cli.database.display())
                }),
            );
        }

        Commands::Insert { values } => {
            anyhow::ensure!(values.len() <= 256, "at most 256 values per trie");
            let db = open_db(&cli.database)?;

            let mut root = TrieNode::branch(Vec::new());
            for (i, value) in values.iter().enumerate() {
                let leaf = TrieNode::leaf(vec![i as u8], value.as_bytes().to_vec());
                let hash = db.insert_node(leaf)?;
                root = root.with_child(i as u8, ChildRef::Hash(hash));
            }
            let root_hash = db.insert_node(root)?;
            db.reference(root_hash, Hash::ZERO)?;
            db.commit(root_hash, cli.verbose)?;
            db.dereference(root_hash)?;

            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "root": root_hash.to_hex(),
                    "nodes": values.len() + 1
                }),
            );
        }

        Commands::Get { hash } => {
            let db = open_db(&cli.database)?;
            let hash = parse_hash(&hash)?;
            match db.node(&hash) {
                Ok(encoded) => {
                    let node = TrieNode::decode(&encoded).ok();
                    output(
                        &cli.format,
                        &serde_json::json!({
                            "hash": hash.to_hex(),
                            "size": encoded.len(),
                            "encoded": hex::encode(&encoded),
                            "node": node
                        }),
                    );
                }
                Err(err) if err.is_not_found() => {
                    output(
                        &cli.format,
                        &serde_json::json!({
                            "status": "error",
                            "message": format!("Node not found: {}", hash)
                        }),
                    );
                    std::process::exit(1);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Commands::Verify { root } => {
            let db = open_db(&cli.database)?;
            let root = parse_hash(&root)?;
            let (nodes, missing) = walk(&db, root)?;
            let ok = missing.is_empty();
            output(
                &cli.format,
                &serde_json::json!({
                    "status": if ok { "ok" } else { "error" },
                    "root": root.to_hex(),
                    "nodes": nodes,
                    "missing": missing.iter().map(Hash::to_hex).collect::<Vec<_>>()
                }),
            );
            if !ok {
                std::process::exit(1);
            }
        }

        Commands::Stats => {
            let store = FileStore::open(&cli.database)?;
            let file_size = std::fs::metadata(store.path())?.len();
            let config = DatabaseConfig::load(&cli.database)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "path": store.path().display().to_string(),
                    "objects": store.object_count(),
                    "file_size": file_size,
                    "config": config
                }),
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "trienode_db=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_db(path: &Path) -> anyhow::Result<Database> {
    let config = DatabaseConfig::load(path)?;
    let store = FileStore::open_or_create(path)
        .with_context(|| format!("opening node store {}", path.display()))?;
    Ok(Database::with_config(Arc::new(store), config)?)
}

fn parse_hash(s: &str) -> anyhow::Result<Hash> {
    Hash::from_hex(s).map_err(|_| anyhow::anyhow!("Invalid hash: {}", s))
}

/// Count the nodes reachable from `root`, collecting any that are missing
fn walk(db: &Database, root: Hash) -> anyhow::Result<(usize, Vec<Hash>)> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    let mut missing = Vec::new();

    while let Some(hash) = stack.pop() {
        if !seen.insert(hash) {
            continue;
        }
        match db.trie_node(&hash) {
            Ok(node) => stack.extend(node.child_hashes()),
            Err(err) if err.is_not_found() => missing.push(hash),
            Err(err) => return Err(err.into()),
        }
    }
    Ok((seen.len() - missing.len(), missing))
}

fn output(format: &OutputFormat, value: &serde_json::Value) {
    match format {
        OutputFormat::Json => println!("{}", value),
        OutputFormat::Text => match serde_json::to_string_pretty(value) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("{}", value),
        },
    }
}
