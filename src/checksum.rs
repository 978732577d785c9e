//! MD5 digests for upload verification

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Read chunk for streaming digests
const DIGEST_CHUNK: usize = 64 * 1024;

/// Lowercase hex MD5 of a byte slice
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Lowercase hex MD5 of any reader, consumed in fixed-size chunks
pub fn md5_reader<R: Read>(mut r: R) -> std::io::Result<String> {
    let mut ctx = md5::Context::new();
    let mut buffer = vec![0u8; DIGEST_CHUNK];
    loop {
        let n = match r.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        ctx.consume(&buffer[..n]);
    }
    Ok(format!("{:x}", ctx.compute()))
}

/// Lowercase hex MD5 of a file without loading it into memory
pub fn md5_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    md5_reader(file).with_context(|| format!("read {}", path.display()))
}
