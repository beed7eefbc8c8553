//! Command-line interface for metags.
//!
//! Provides commands for tagging files into storage, querying by content
//! id, url or metadata, and printing identifiers.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, Backend, ResolvedConfig};
use crate::core::{EventBus, Identifier};
use crate::domain::Item;
use crate::ingest::{FileFactory, WalkOptions};
use crate::plugins;
use crate::storage::{MemoryStorage, Query, RelationalStorage, StorageEngine};

/// metags - Searchable metadata for content-addressed files
#[derive(Parser, Debug)]
#[command(name = "metags")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Override the configured storage backend
    #[arg(long, global = true, env = "METAGS_BACKEND")]
    pub backend: Option<Backend>,

    /// Override the configured database connection string
    #[arg(long, global = true, env = "METAGS_DATABASE")]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a file, or every file below a directory
    Add {
        /// File or directory to add
        path: PathBuf,

        /// Only add files whose full path matches this glob
        #[arg(short, long)]
        pattern: Option<String>,

        /// Do not expand directories
        #[arg(long)]
        no_recursive: bool,

        /// Extra tags to apply (key=value, repeatable)
        #[arg(short, long = "tag", value_parser = parse_key_value)]
        tags: Vec<(String, String)>,
    },

    /// Query stored items (one selector is honored: content id, then url,
    /// then metadata)
    Get {
        /// Content id or `*` pattern
        #[arg(short, long)]
        content_id: Option<String>,

        /// Url or `*` pattern
        #[arg(short, long)]
        url: Option<String>,

        /// Metadata filter (key=value, repeatable, all must match)
        #[arg(short, long = "meta", value_parser = parse_key_value)]
        meta: Vec<(String, String)>,

        /// Print items as JSON
        #[arg(long)]
        json: bool,
    },

    /// List every stored item
    List {
        /// Print items as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the content id of a file
    Id {
        /// File to identify
        path: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Parse a `key=value` argument
fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let mut cfg = config::config()?.clone();
        if let Some(backend) = self.backend {
            cfg.backend = backend;
        }
        if let Some(database) = self.database {
            cfg.database = database;
        }

        match self.command {
            Commands::Add {
                path,
                pattern,
                no_recursive,
                tags,
            } => add_path(&cfg, &path, pattern, no_recursive, tags),
            Commands::Get {
                content_id,
                url,
                meta,
                json,
            } => {
                let mut query = Query::new();
                query.content_id = content_id;
                query.url = url;
                for (k, v) in meta {
                    query = query.meta(k, v);
                }
                query_items(&cfg, &query, json)
            }
            Commands::List { json } => query_items(&cfg, &Query::new(), json),
            Commands::Id { path } => print_id(&path),
            Commands::Config => show_config(&cfg),
        }
    }
}

/// Open the configured engine with the default plugins on a fresh bus
pub fn open_storage(
    cfg: &ResolvedConfig,
    identifier: Arc<Identifier>,
) -> Result<Box<dyn StorageEngine>> {
    let bus = EventBus::shared();
    plugins::register_defaults(&bus)?;

    let storage: Box<dyn StorageEngine> = match cfg.backend {
        Backend::Memory => Box::new(MemoryStorage::new(bus).with_identifier(identifier)),
        Backend::Sqlite => Box::new(
            RelationalStorage::connect(&cfg.database, bus)
                .with_context(|| format!("Failed to open database: {}", cfg.database))?
                .with_identifier(identifier),
        ),
    };
    Ok(storage)
}

/// Add a path through the file factory
fn add_path(
    cfg: &ResolvedConfig,
    path: &Path,
    pattern: Option<String>,
    no_recursive: bool,
    tags: Vec<(String, String)>,
) -> Result<()> {
    let identifier = Arc::new(Identifier::new());
    let storage = open_storage(cfg, Arc::clone(&identifier))?;
    let factory = FileFactory::new(storage.as_ref(), identifier);

    let mut options = WalkOptions::default().recursive(cfg.recursive && !no_recursive);
    if let Some(pattern) = pattern.as_deref().or(cfg.pattern.as_deref()) {
        options = options.with_pattern(pattern)?;
    }

    let items = factory
        .generate(path, &options)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut added = 0;
    for mut item in items {
        for (k, v) in &tags {
            item.tag_one(k.as_str(), v.as_str());
        }
        let item = storage.add(item)?;
        if let Some(id) = &item.content_id {
            println!("{}  {}", id, item.url);
        }
        added += 1;
    }

    eprintln!("[{} item(s) added]", added);
    Ok(())
}

/// Run a query and print the results
fn query_items(cfg: &ResolvedConfig, query: &Query, json: bool) -> Result<()> {
    let storage = open_storage(cfg, Arc::new(Identifier::new()))?;
    let items = storage.get(query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No items found");
        return Ok(());
    }

    for item in &items {
        print_item(item);
    }
    Ok(())
}

fn print_item(item: &Item) {
    let id = item
        .content_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("{}", item.url);
    println!("  id: {}", id);
    for (key, values) in &item.metadata {
        println!("  {}: {}", key, values.join(", "));
    }
}

/// Print the identifier of a file without storing it
fn print_id(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let id = crate::core::identify(file)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    println!("{}", id);
    Ok(())
}

fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("metags configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Home:      {}", cfg.home.display());
    println!("Backend:   {}", cfg.backend);
    println!("Database:  {}", cfg.database);
    println!("Recursive: {}", cfg.recursive);
    println!(
        "Pattern:   {}",
        cfg.pattern.as_deref().unwrap_or("(none)")
    );
    Ok(())
}
