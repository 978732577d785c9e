//! LOGIN exchange

use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt;

use crate::conn::Connection;
use crate::protocol::{field, request, Operation, ResourceType};
use crate::validate::{str_field, Expectation};

/// Protocol password rule: lowercase hex MD5 of the identifier
pub fn derive_secret(identifier: &str) -> String {
    format!("{:x}", md5::compute(identifier.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub identifier: String,
    pub secret: String,
}

impl Credential {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            secret: derive_secret(identifier),
        }
    }
}

/// Opaque session token issued by LOGIN
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Token> for Value {
    fn from(t: &Token) -> Value {
        Value::from(t.0.as_str())
    }
}

// Keep tokens out of debug dumps
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(len={})", self.0.len())
    }
}

/// Log in once on `conn` and return the token
pub fn login(conn: &mut Connection, identifier: &str) -> Result<Token> {
    let cred = Credential::new(identifier);
    let mut req = request(Operation::Login, ResourceType::Auth);
    req.insert(field::USERNAME.into(), Value::from(cred.identifier.as_str()));
    req.insert(field::PASSWORD.into(), Value::from(cred.secret.as_str()));

    let reply = conn.exchange(&req, None).context("LOGIN")?;
    let header = Expectation::new(Operation::Login, ResourceType::Auth)
        .require(&[field::TOKEN])
        .check_reply(&reply)
        .context("LOGIN rejected")?;
    let token = str_field(header, field::TOKEN).context("LOGIN rejected")?;
    Ok(Token(token))
}
