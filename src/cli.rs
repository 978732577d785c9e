//! Command-line arguments
//!
//! Underscore spellings (`--server_ip`, `--block_workers`) are accepted
//! as aliases of the dashed flags.

use clap::Parser;
use std::path::PathBuf;

#[derive(Clone, Debug, Default, Parser)]
#[command(
    author,
    version,
    about = "STEP client - block upload with pooled connections and MD5 verification"
)]
pub struct Args {
    /// Server address (host or host:port)
    #[arg(long = "server-ip", alias = "server_ip")]
    pub server_ip: Option<String>,

    /// Server port (default 1379)
    #[arg(long)]
    pub port: Option<u16>,

    /// Login identifier; the password is derived from it
    #[arg(long)]
    pub id: Option<String>,

    /// Path to the file to upload
    #[arg(long = "f")]
    pub file: Option<PathBuf>,

    /// Paths to multiple files to upload, one session each
    #[arg(long, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Number of connections for block-level parallel upload (1 = sequential)
    #[arg(long = "block-workers", alias = "block_workers")]
    pub block_workers: Option<usize>,

    /// Retry a failed session this many times
    #[arg(long)]
    pub retries: Option<u32>,

    /// TOML config file (command-line values win)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append a text log to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Append one JSON line per session to this file
    #[arg(long = "json-log")]
    pub json_log: Option<PathBuf>,

    /// Only print the final results
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}
