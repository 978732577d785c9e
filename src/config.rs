//! Client configuration: optional TOML file merged under the command line

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::cli::Args;
use crate::conn::Endpoint;
use crate::session::SessionConfig;

/// Everything a config file may set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub id: Option<String>,
    pub block_workers: Option<usize>,
    pub retries: Option<u32>,
    pub log_file: Option<PathBuf>,
    pub json_log: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: FileConfig =
            toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
        Ok(cfg)
    }
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub identifier: String,
    pub block_workers: usize,
    pub retries: u32,
    pub files: Vec<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub json_log: Option<PathBuf>,
    pub quiet: bool,
    pub progress: bool,
}

impl ClientConfig {
    /// Merge command line over file config; command line wins
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let server = args
            .server_ip
            .clone()
            .or(file.server)
            .ok_or_else(|| anyhow!("server address required (--server-ip or `server` in config)"))?;
        let mut endpoint =
            Endpoint::parse(&server).ok_or_else(|| anyhow!("invalid server address: {}", server))?;
        if let Some(port) = args.port.or(file.port) {
            endpoint.port = port;
        }

        let identifier = args
            .id
            .clone()
            .or(file.id)
            .ok_or_else(|| anyhow!("identifier required (--id or `id` in config)"))?;

        // --files first, then --f; duplicates dropped keeping first position
        let mut seen = HashSet::new();
        let files: Vec<PathBuf> = args
            .files
            .iter()
            .chain(args.file.iter())
            .filter(|p| seen.insert((*p).clone()))
            .cloned()
            .collect();
        if files.is_empty() {
            bail!("You must provide at least one file via --f or --files.");
        }

        Ok(ClientConfig {
            endpoint,
            identifier,
            block_workers: args.block_workers.or(file.block_workers).unwrap_or(1).max(1),
            retries: args.retries.or(file.retries).unwrap_or(0),
            files,
            log_file: args.log_file.clone().or(file.log_file),
            json_log: args.json_log.clone().or(file.json_log),
            quiet: args.quiet,
            progress: !args.no_progress && !args.quiet,
        })
    }

    /// Read `--config` if given, then resolve
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(p) => FileConfig::load(p)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            endpoint: self.endpoint.clone(),
            identifier: self.identifier.clone(),
            block_workers: self.block_workers,
        }
    }
}
