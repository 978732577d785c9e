//! STEP frame codec
//!
//! Format: HEADER_LEN u32 BE | PAYLOAD_LEN u32 BE | header JSON | payload bytes

use anyhow::{Context, Result};
use std::io::{ErrorKind, Read, Write};

use crate::error::FrameError;
use crate::protocol::{Header, MAX_FRAME_SIZE, MAX_HEADER_SIZE, PREFIX_LEN};

/// One decoded protocol message
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(header: Header, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }
}

/// Build the 8-byte length prefix
pub fn build_prefix(header_len: u32, payload_len: u32) -> [u8; PREFIX_LEN] {
    let mut prefix = [0u8; PREFIX_LEN];
    prefix[0..4].copy_from_slice(&header_len.to_be_bytes());
    prefix[4..8].copy_from_slice(&payload_len.to_be_bytes());
    prefix
}

/// Parse the length prefix
/// Returns: (header_length, payload_length)
pub fn parse_prefix(prefix: &[u8; PREFIX_LEN]) -> (usize, usize) {
    let header_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    let payload_len = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    (header_len as usize, payload_len as usize)
}

fn check_len(part: &'static str, size: usize, max: usize) -> Result<(), FrameError> {
    if size > max {
        return Err(FrameError::TooLarge { part, size, max });
    }
    Ok(())
}

fn wire_len(part: &str, len: usize) -> Result<u32> {
    u32::try_from(len).with_context(|| format!("{} of {} bytes does not fit a u32 length", part, len))
}

/// Length prefix followed by the header JSON; the payload is not included
fn encode_head(header: &Header, payload_len: usize) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(header)?;
    let prefix = build_prefix(wire_len("header", json.len())?, wire_len("payload", payload_len)?);
    let mut buf = Vec::with_capacity(PREFIX_LEN + json.len());
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Encode a complete frame into one buffer
pub fn encode(header: &Header, payload: Option<&[u8]>) -> Result<Vec<u8>> {
    let payload = payload.unwrap_or(&[]);
    let mut buf = encode_head(header, payload.len())?;
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Send one frame, flushing the writer. The payload is written straight
/// from the caller's buffer.
pub fn write_frame<W: Write>(w: &mut W, header: &Header, payload: Option<&[u8]>) -> Result<()> {
    let payload = payload.unwrap_or(&[]);
    let head = encode_head(header, payload.len())?;
    w.write_all(&head)?;
    if !payload.is_empty() {
        w.write_all(payload)?;
    }
    w.flush()?;
    Ok(())
}

/// Read until `buf` is full. Short reads are re-read; a zero-length read
/// means the peer closed the stream.
fn fill<R: Read>(r: &mut R, buf: &mut [u8], part: &'static str) -> Result<(), FrameError> {
    let mut got = 0;
    while got < buf.len() {
        match r.read(&mut buf[got..]) {
            Ok(0) => {
                return Err(FrameError::Closed {
                    part,
                    expected: buf.len(),
                    got,
                })
            }
            Ok(n) => got += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
    Ok(())
}

/// Parse header bytes into a JSON object
pub fn parse_header(bytes: &[u8]) -> Result<Header, FrameError> {
    let text = std::str::from_utf8(bytes).map_err(|e| FrameError::Header(e.to_string()))?;
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(FrameError::Header(format!("expected JSON object, got {}", other))),
        Err(e) => Err(FrameError::Header(e.to_string())),
    }
}

/// Read one complete frame off a blocking stream
pub fn read_frame<R: Read>(r: &mut R) -> Result<Frame, FrameError> {
    read_frame_limited(r, MAX_HEADER_SIZE, MAX_FRAME_SIZE)
}

/// `read_frame` with caller-chosen caps on the declared lengths
pub fn read_frame_limited<R: Read>(r: &mut R, max_header: usize, max_payload: usize) -> Result<Frame, FrameError> {
    let mut prefix = [0u8; PREFIX_LEN];
    fill(r, &mut prefix, "length prefix")?;
    let (header_len, payload_len) = parse_prefix(&prefix);
    check_len("header", header_len, max_header)?;
    check_len("payload", payload_len, max_payload)?;

    let mut header_bytes = vec![0u8; header_len];
    fill(r, &mut header_bytes, "header")?;
    let mut payload = vec![0u8; payload_len];
    fill(r, &mut payload, "payload")?;

    // Parse after the payload is consumed so the stream stays frame-aligned
    let header = parse_header(&header_bytes)?;
    Ok(Frame { header, payload })
}

/// Decode a frame held entirely in memory
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    let mut cursor = bytes;
    read_frame(&mut cursor)
}
