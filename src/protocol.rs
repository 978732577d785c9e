//! Shared protocol constants for the STEP framed transport

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Default STEP server port
pub const DEFAULT_PORT: u16 = 1379;

// Maximum inbound header size (1MB) - response headers are small flat JSON documents
pub const MAX_HEADER_SIZE: usize = 1024 * 1024;

// Maximum inbound payload size (64MB) - prevents DoS via memory exhaustion.
// Outgoing frames are bounded only by the u32 length fields.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Length prefix: header length (u32 BE) | payload length (u32 BE)
pub const PREFIX_LEN: usize = 8;

/// Default status code for a successful response
pub const STATUS_OK: i64 = 200;

// Header field names (keep stable, the server matches on these)
pub mod field {
    pub const OPERATION: &str = "operation";
    pub const DIRECTION: &str = "direction";
    pub const TYPE: &str = "type";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const TOKEN: &str = "token";
    pub const KEY: &str = "key";
    pub const SIZE: &str = "size";
    pub const TOTAL_BLOCK: &str = "total_block";
    pub const MD5: &str = "md5";
    pub const BLOCK_SIZE: &str = "block_size";
    pub const STATUS: &str = "status";
    pub const STATUS_MSG: &str = "status_msg";
    pub const BLOCK_INDEX: &str = "block_index";
}

/// Header document exchanged with every frame
pub type Header = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Login,
    Save,
    Upload,
    Get,
    Bye,
    Delete,
    Download,
    Error,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Login => "LOGIN",
            Operation::Save => "SAVE",
            Operation::Upload => "UPLOAD",
            Operation::Get => "GET",
            Operation::Bye => "BYE",
            Operation::Delete => "DELETE",
            Operation::Download => "DOWNLOAD",
            Operation::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Request => "REQUEST",
            Direction::Response => "RESPONSE",
        }
    }
}

/// Resource type carried in the `type` field.
/// `Earth` is a fixed sentinel value the protocol reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    Auth,
    File,
    Data,
    Earth,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Auth => "AUTH",
            ResourceType::File => "FILE",
            ResourceType::Data => "DATA",
            ResourceType::Earth => "EARTH",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start a REQUEST header for the given operation and resource type
pub fn request(op: Operation, kind: ResourceType) -> Header {
    let mut h = Header::new();
    h.insert(field::TYPE.into(), Value::from(kind.as_str()));
    h.insert(field::OPERATION.into(), Value::from(op.as_str()));
    h.insert(field::DIRECTION.into(), Value::from(Direction::Request.as_str()));
    h
}
