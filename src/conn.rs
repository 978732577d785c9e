//! Blocking TCP connection to a STEP server

use anyhow::{Context, Result};
use std::fmt;
use std::net::{Shutdown, TcpStream};

use crate::error::FrameError;
use crate::frame::{read_frame, write_frame, Frame};
use crate::protocol::{Header, DEFAULT_PORT};

/// Where the server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, a bare IPv6 literal or `[v6]:port`;
    /// the port defaults to 1379
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']')?;
            if host.is_empty() {
                return None;
            }
            let port = match tail {
                "" => DEFAULT_PORT,
                t => t.strip_prefix(':')?.parse().ok()?,
            };
            return Some(Self::new(host, port));
        }
        match s.rsplit_once(':') {
            // bare IPv6 literals contain ':' too; only split when the tail is a port
            Some((h, p)) if !h.is_empty() && !h.contains(':') => {
                Some(Self::new(h, p.parse().ok()?))
            }
            _ => Some(Self::new(s, DEFAULT_PORT)),
        }
    }

    pub fn connect(&self) -> Result<Connection> {
        let addr = self.to_string();
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .with_context(|| format!("connect {}", addr))?;
        tune_socket(&stream);
        Ok(Connection { stream, peer: addr })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// Disable Nagle: every request waits on a small response frame
fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
}

/// One request/response channel. Never shared between threads.
pub struct Connection {
    stream: TcpStream,
    peer: String,
}

impl Connection {
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn send(&mut self, header: &Header, payload: Option<&[u8]>) -> Result<()> {
        write_frame(&mut self.stream, header, payload)
            .with_context(|| format!("send to {}", self.peer))
    }

    /// Blocks until a whole frame arrives or the peer goes away
    pub fn recv(&mut self) -> Result<Frame, FrameError> {
        read_frame(&mut self.stream)
    }

    /// Send a request and wait for its reply. Send failures are transport
    /// errors; receive failures are handed back for the validator.
    pub fn exchange(
        &mut self,
        header: &Header,
        payload: Option<&[u8]>,
    ) -> Result<Result<Frame, FrameError>> {
        self.send(header, payload)?;
        Ok(self.recv())
    }

    pub fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
