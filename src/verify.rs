//! GET-based end-to-end verification

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::auth::Token;
use crate::checksum::md5_file;
use crate::conn::Connection;
use crate::protocol::{field, request, Operation, ResourceType};
use crate::validate::{str_field, Expectation};

/// Server and local digests of the uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub server: String,
    pub local: String,
}

impl Verification {
    pub fn matches(&self) -> bool {
        self.server.eq_ignore_ascii_case(&self.local)
    }
}

/// Ask the server for its digest of `key` and compute ours.
/// A mismatch is not an error here; callers inspect `matches()`.
pub fn verify(conn: &mut Connection, token: &Token, key: &str, path: &Path) -> Result<Verification> {
    let mut req = request(Operation::Get, ResourceType::File);
    req.insert(field::TOKEN.into(), Value::from(token));
    req.insert(field::KEY.into(), Value::from(key));

    let reply = conn.exchange(&req, None).context("GET")?;
    let h = Expectation::new(Operation::Get, ResourceType::File)
        .require(&[field::KEY, field::MD5])
        .matching(field::KEY, key)
        .check_reply(&reply)
        .context("GET verification failed")?;
    let server = str_field(h, field::MD5).context("GET verification failed")?;

    let local = md5_file(path)?;
    Ok(Verification { server, local })
}
