use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::services::storage_service::{DEFAULT_CHUNK_SIZE, DEFAULT_PIPE_DEPTH, StorageOptions};

pub const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_CONFIG_FILE: &str = ".mini-s3.toml";
const DEFAULT_CONFIG_CONTENTS: &str = r#"# mini-s3 configuration
data-dir = "./data"

# Save pipeline tuning (optional)
# chunk-size = 65536
# pipe-depth = 8
"#;

/// Resolved application configuration.
/// Merges CLI flags, environment variables, and the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub storage: StorageOptions,
}

/// On-disk configuration file (`~/.mini-s3.toml` unless `--config` is given).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub pipe_depth: Option<usize>,
}

/// Environment overrides, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub data_dir: Option<String>,
    pub chunk_size: Option<String>,
    pub pipe_depth: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var("MINI_S3_DATA_DIR").ok(),
            chunk_size: env::var("MINI_S3_CHUNK_SIZE").ok(),
            pipe_depth: env::var("MINI_S3_PIPE_DEPTH").ok(),
        }
    }
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "mini-s3",
    author,
    version,
    about = "A minimal local object store with checksum-verified reads"
)]
pub struct Cli {
    /// Config file (default is $HOME/.mini-s3.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory where buckets are stored (overrides MINI_S3_DATA_DIR and the config file)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a local file to a bucket
    Put {
        bucket: String,
        file: PathBuf,
        /// Object key (defaults to the file's base name)
        #[arg(long)]
        key: Option<String>,
        /// Print the stored object as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify an object and save it into a local directory
    Get {
        bucket: String,
        key: String,
        out_dir: PathBuf,
        /// Expected SHA-256 (hex) as printed by `put`
        #[arg(long)]
        checksum: String,
    },
    /// List objects in a bucket
    List {
        bucket: String,
        /// Print objects as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an object from a bucket
    Delete { bucket: String, key: String },
    /// Check whether an object exists
    Exists { bucket: String, key: String },
}

impl AppConfig {
    /// Load the config file named by `--config` (or the default one) and merge
    /// it with the environment and CLI flags.
    ///
    /// Priority: CLI flag > environment > config file > default.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => read_config_file(path)?,
            None => match default_config_path() {
                Some(path) => {
                    if !path.exists() {
                        bootstrap_config_file(&path);
                    }
                    if path.exists() {
                        read_config_file(&path)?
                    } else {
                        FileConfig::default()
                    }
                }
                None => FileConfig::default(),
            },
        };

        Self::merge(cli.data_dir.clone(), EnvConfig::from_env(), file)
    }

    pub fn merge(flag_data_dir: Option<PathBuf>, env: EnvConfig, file: FileConfig) -> Result<Self> {
        let data_dir = flag_data_dir
            .or(env.data_dir.filter(|v| !v.is_empty()).map(PathBuf::from))
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let chunk_size = match env.chunk_size {
            Some(value) => parse_positive("MINI_S3_CHUNK_SIZE", &value)?,
            None => positive_or_default("chunk-size", file.chunk_size, DEFAULT_CHUNK_SIZE)?,
        };
        let pipe_depth = match env.pipe_depth {
            Some(value) => parse_positive("MINI_S3_PIPE_DEPTH", &value)?,
            None => positive_or_default("pipe-depth", file.pipe_depth, DEFAULT_PIPE_DEPTH)?,
        };

        Ok(Self {
            data_dir,
            storage: StorageOptions {
                chunk_size,
                pipe_depth,
            },
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_CONFIG_FILE))
}

/// Write the commented default config. Failure only costs the file, so it is
/// logged and ignored.
fn bootstrap_config_file(path: &Path) {
    match fs::write(path, DEFAULT_CONFIG_CONTENTS) {
        Ok(()) => tracing::info!("Created default config at {}", path.display()),
        Err(err) => tracing::warn!(
            "Could not create default config at {}: {}",
            path.display(),
            err
        ),
    }
}

fn read_config_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

fn parse_positive(name: &str, value: &str) -> Result<usize> {
    let parsed = value
        .trim()
        .parse::<usize>()
        .with_context(|| format!("parsing {} value `{}`", name, value))?;
    if parsed == 0 {
        bail!("{} must be greater than zero", name);
    }
    Ok(parsed)
}

fn positive_or_default(name: &str, value: Option<usize>, default: usize) -> Result<usize> {
    match value {
        Some(0) => bail!("{} must be greater than zero", name),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}
