//! STEP upload client library
//!
//! Length-framed JSON request/response protocol: login, negotiate a block
//! plan, upload blocks over one or several connections, verify by MD5.

pub mod auth;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod conn;
pub mod error;
pub mod frame;
pub mod log;
pub mod logger;
pub mod metrics;
pub mod plan;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod upload;
pub mod validate;
pub mod verify;

pub use cli::Args;
pub use session::{upload_file, Outcome, Session, SessionConfig, SessionReport, SessionState, Step};
