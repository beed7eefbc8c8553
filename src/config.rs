//! Configuration for metags storage and traversal.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (METAGS_HOME, METAGS_BACKEND, METAGS_DATABASE)
//! 2. Config file (.metags/config.yaml)
//! 3. Defaults (~/.metags, sqlite database at ~/.metags/metags.db)
//!
//! Config file discovery:
//! - Searches current directory and parents for .metags/config.yaml
//! - Relative database paths are resolved against the project root (the
//!   parent of `.metags/`)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub factory: FactoryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Which engine to open
    pub backend: Option<Backend>,
    /// Connection string or path (relative to the project root)
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactoryConfig {
    /// Expand directories when adding paths
    pub recursive: Option<bool>,
    /// Glob that added file paths must match
    pub pattern: Option<String>,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Process-local list, lost on exit
    Memory,

    /// SQLite database
    #[default]
    Sqlite,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(Backend::Memory),
            "sqlite" | "sql" | "db" => Ok(Backend::Sqlite),
            _ => anyhow::bail!("Unknown storage backend: {}", s),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Memory => write!(f, "memory"),
            Backend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to metags home
    pub home: PathBuf,
    /// Storage backend
    pub backend: Backend,
    /// Database connection string (sqlite backend)
    pub database: String,
    /// Expand directories when adding paths
    pub recursive: bool,
    /// Glob that added file paths must match
    pub pattern: Option<String>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".metags").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Default connection string for a home directory
fn default_database(home: &Path) -> String {
    format!("sqlite:///{}", home.join("metags.db").display())
}

/// Resolve configuration from an optional parsed file and an environment
/// lookup
fn resolve(
    file: Option<(PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let home = env("METAGS_HOME").map(PathBuf::from).unwrap_or(default_home);

    let (config_file, config) = match file {
        Some((path, config)) => (Some(path), Some(config)),
        None => (None, None),
    };

    // Project root is the parent of .metags/ (grandparent of config.yaml)
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));

    let backend = match env("METAGS_BACKEND") {
        Some(raw) => raw.parse()?,
        None => config
            .as_ref()
            .and_then(|c| c.storage.backend)
            .unwrap_or_default(),
    };

    let database = if let Some(db) = env("METAGS_DATABASE") {
        db
    } else if let Some(db) = config.as_ref().and_then(|c| c.storage.database.as_deref()) {
        if db.contains("://") {
            db.to_string()
        } else {
            resolve_path(base_dir, db).display().to_string()
        }
    } else {
        default_database(&home)
    };

    let recursive = config
        .as_ref()
        .and_then(|c| c.factory.recursive)
        .unwrap_or(true);
    let pattern = config.and_then(|c| c.factory.pattern);

    Ok(ResolvedConfig {
        home,
        backend,
        database,
        recursive,
        pattern,
        config_file,
    })
}

/// Discover the config file above `start` and resolve against it
fn load_config_from(
    start: &Path,
    env: impl Fn(&str) -> Option<String>,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let file = match find_config_file(start) {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    resolve(file, env, default_home)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".metags");
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    load_config_from(&cwd, |key| std::env::var(key).ok(), default_home)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
