//! SAVE negotiation and block geometry

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::auth::Token;
use crate::conn::Connection;
use crate::protocol::{field, request, Operation, ResourceType};
use crate::validate::{str_field, u64_field, Expectation};

/// Server-issued upload plan; fixed once received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    pub key: String,
    pub block_size: u64,
    pub total_block: u64,
}

impl UploadPlan {
    /// Byte offset of a block
    pub fn offset(&self, index: u64) -> u64 {
        index.saturating_mul(self.block_size)
    }

    /// Length of a block: block_size, except the remainder for the last one
    pub fn block_len(&self, index: u64, file_size: u64) -> u64 {
        self.block_size.min(file_size.saturating_sub(self.offset(index)))
    }

    /// Whether the indices 0..total_block partition a file of this size exactly
    pub fn covers(&self, file_size: u64) -> bool {
        if self.block_size == 0 {
            return self.total_block == 0 && file_size == 0;
        }
        self.total_block == file_size.div_ceil(self.block_size)
    }
}

/// File name sent as the SAVE key
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Ask the server how to split `path` into blocks
pub fn request_plan(conn: &mut Connection, token: &Token, path: &Path, size: u64) -> Result<UploadPlan> {
    let mut req = request(Operation::Save, ResourceType::File);
    req.insert(field::TOKEN.into(), Value::from(token));
    req.insert(field::KEY.into(), Value::from(basename(path)));
    req.insert(field::SIZE.into(), Value::from(size));

    let reply = conn.exchange(&req, None).context("SAVE")?;
    let h = Expectation::new(Operation::Save, ResourceType::File)
        .require(&[field::KEY, field::BLOCK_SIZE, field::TOTAL_BLOCK])
        .check_reply(&reply)
        .context("SAVE response invalid")?;

    let plan = UploadPlan {
        key: str_field(h, field::KEY).context("SAVE response invalid")?,
        block_size: u64_field(h, field::BLOCK_SIZE).context("SAVE response invalid")?,
        total_block: u64_field(h, field::TOTAL_BLOCK).context("SAVE response invalid")?,
    };
    if plan.total_block > 0 && plan.block_size == 0 {
        bail!("SAVE response invalid: block_size 0 for {} blocks", plan.total_block);
    }
    Ok(plan)
}
