//! In-process STEP server for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use step_client::frame::{read_frame_limited, write_frame, Frame};
use step_client::protocol::{field, Header, MAX_HEADER_SIZE};

/// Knobs for misbehaving servers
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    pub block_size: u64,
    /// Answer this block index with status 408
    pub reject_block: Option<u64>,
    /// Close the connection instead of answering this block index
    pub drop_on_block: Option<u64>,
    /// Report a digest that cannot match
    pub corrupt_digest: bool,
    /// Reject this many logins before accepting
    pub reject_logins: usize,
    /// Close the listener after accepting this many connections
    pub max_connections: Option<usize>,
}

#[derive(Debug, Default)]
pub struct StoredFile {
    pub size: u64,
    pub blocks: BTreeMap<u64, Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub behavior: Behavior,
    pub tokens: HashSet<String>,
    pub files: HashMap<String, StoredFile>,
    /// Every UPLOAD block index received, in arrival order
    pub received: Vec<u64>,
    pub connections: usize,
    pub logins: usize,
}

pub struct MockServer {
    pub port: u16,
    pub state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(ServerState {
            behavior,
            ..Default::default()
        }));
        let shared = Arc::clone(&state);
        let limit = shared.lock().behavior.max_connections;
        thread::spawn(move || {
            let mut accepted = 0;
            loop {
                let Ok((stream, _)) = listener.accept() else { continue };
                accepted += 1;
                let state = Arc::clone(&shared);
                if limit == Some(accepted) {
                    // listener is gone before this connection sees a reply
                    drop(listener);
                    handle_conn(stream, &state);
                    return;
                }
                thread::spawn(move || handle_conn(stream, &state));
            }
        });
        MockServer { port, state }
    }

    pub fn received(&self) -> Vec<u64> {
        self.state.lock().received.clone()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    /// Bytes the server assembled for `key`
    pub fn stored(&self, key: &str) -> Vec<u8> {
        let st = self.state.lock();
        st.files
            .get(key)
            .map(|f| f.blocks.values().flatten().copied().collect())
            .unwrap_or_default()
    }
}

fn handle_conn(mut stream: TcpStream, state: &Mutex<ServerState>) {
    state.lock().connections += 1;
    loop {
        let frame = match read_frame_limited(&mut stream, MAX_HEADER_SIZE, u32::MAX as usize) {
            Ok(f) => f,
            Err(_) => return,
        };
        let Some(resp) = handle(state, frame) else {
            return;
        };
        if write_frame(&mut stream, &resp, None).is_err() {
            return;
        }
    }
}

fn reply(req: &Header, status: i64, msg: &str) -> Header {
    let mut h = Header::new();
    h.insert(field::OPERATION.into(), req.get(field::OPERATION).cloned().unwrap_or(Value::Null));
    h.insert(field::TYPE.into(), req.get(field::TYPE).cloned().unwrap_or(Value::Null));
    h.insert(field::DIRECTION.into(), json!("RESPONSE"));
    h.insert(field::STATUS.into(), json!(status));
    h.insert(field::STATUS_MSG.into(), json!(msg));
    h
}

fn text<'a>(h: &'a Header, name: &str) -> &'a str {
    h.get(name).and_then(Value::as_str).unwrap_or("")
}

/// Returns None to drop the connection
fn handle(state: &Mutex<ServerState>, frame: Frame) -> Option<Header> {
    let req = frame.header;
    let mut st = state.lock();
    let op = text(&req, field::OPERATION).to_string();

    if op == "LOGIN" {
        let user = text(&req, field::USERNAME);
        let password = text(&req, field::PASSWORD);
        st.logins += 1;
        if st.logins <= st.behavior.reject_logins {
            return Some(reply(&req, 401, "Login temporarily refused"));
        }
        if password != format!("{:x}", md5::compute(user.as_bytes())) {
            return Some(reply(&req, 401, "Incorrect password"));
        }
        let token = format!("{}.{}", user, st.logins);
        st.tokens.insert(token.clone());
        let mut h = reply(&req, 200, "Login successfully");
        h.insert(field::TOKEN.into(), json!(token));
        return Some(h);
    }

    if !st.tokens.contains(text(&req, field::TOKEN)) {
        return Some(reply(&req, 403, "Invalid token"));
    }
    let key = text(&req, field::KEY).to_string();

    match op.as_str() {
        "SAVE" => {
            let size = req.get(field::SIZE).and_then(Value::as_u64).unwrap_or(0);
            let block_size = st.behavior.block_size;
            st.files.insert(key.clone(), StoredFile { size, ..Default::default() });
            let mut h = reply(&req, 200, "File can be uploaded");
            h.insert(field::KEY.into(), json!(key));
            h.insert(field::BLOCK_SIZE.into(), json!(block_size));
            h.insert(field::TOTAL_BLOCK.into(), json!(size.div_ceil(block_size)));
            Some(h)
        }
        "UPLOAD" => {
            let index = req.get(field::BLOCK_INDEX).and_then(Value::as_u64).unwrap_or(u64::MAX);
            st.received.push(index);
            if st.behavior.drop_on_block == Some(index) {
                return None;
            }
            let mut h = if st.behavior.reject_block == Some(index) {
                reply(&req, 408, "Block rejected")
            } else {
                match st.files.get_mut(&key) {
                    Some(f) => {
                        f.blocks.insert(index, frame.payload);
                        reply(&req, 200, "Block uploaded")
                    }
                    None => reply(&req, 404, "No such key"),
                }
            };
            h.insert(field::KEY.into(), json!(key));
            h.insert(field::BLOCK_INDEX.into(), json!(index));
            Some(h)
        }
        "GET" => {
            let Some(f) = st.files.get(&key) else {
                return Some(reply(&req, 404, "No such key"));
            };
            let data: Vec<u8> = f.blocks.values().flatten().copied().collect();
            let digest = if st.behavior.corrupt_digest {
                format!("{:x}", md5::compute(b"corrupted"))
            } else {
                format!("{:x}", md5::compute(&data))
            };
            let mut h = reply(&req, 200, "OK");
            h.insert(field::KEY.into(), json!(key));
            h.insert(field::MD5.into(), json!(digest));
            Some(h)
        }
        _ => Some(reply(&req, 400, "Unsupported operation")),
    }
}

/// Write `size` patterned bytes to `dir/name`
pub fn write_file(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    let data: Vec<u8> = (0..size).map(|i| (i * 7 % 256) as u8).collect();
    f.write_all(&data).unwrap();
    path
}
