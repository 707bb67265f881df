//! ZDBKV - In-Memory Store
//! An in-process stand-in for the remote store, speaking the same command
//! set over [`Transport`]. Backs the test suite, the benchmarks and the
//! binary's `--memory` mode.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use super::resp::Reply;
use super::{Transport, KEY_NOT_FOUND, NO_MORE_DATA};
use crate::error::{Result, ZdbError};
use crate::types::{Direction, Key, Value};

/// Keys returned per `SCAN`/`RSCAN` page unless overridden.
pub const DEFAULT_PAGE_SIZE: usize = 8;

const DEFAULT_NAMESPACE: &str = "default";

struct Stored {
    value: Value,
    timestamp: i64,
}

/// Sorted key-value map of one namespace, with approximate size tracking.
#[derive(Default)]
struct Namespace {
    entries: BTreeMap<Key, Stored>,
    size_bytes: usize,
    password: Option<String>,
}

impl Namespace {
    fn insert(&mut self, key: Key, value: Value) {
        let entry_size = key.len() + value.len();
        if let Some(old) = self.entries.get(&key) {
            self.size_bytes = self.size_bytes.saturating_sub(key.len() + old.value.len());
        }
        self.size_bytes += entry_size;
        self.entries.insert(
            key,
            Stored {
                value,
                timestamp: now_secs(),
            },
        );
    }

    fn remove(&mut self, key: &[u8]) -> bool {
        match self.entries.remove(key) {
            Some(old) => {
                self.size_bytes = self.size_bytes.saturating_sub(key.len() + old.value.len());
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.size_bytes = 0;
    }
}

#[derive(Clone, Copy)]
enum Fault {
    /// The call fails with an I/O error.
    Io,
    /// The call succeeds with a reply of the wrong shape.
    Malformed,
}

struct Failure {
    command: String,
    remaining: u64,
    fault: Fault,
}

struct MemoryState {
    namespaces: BTreeMap<String, Namespace>,
    current: String,
    page_size: usize,
    password: Option<String>,
    calls: HashMap<String, u64>,
    failures: Vec<Failure>,
    offline: bool,
    closed: bool,
}

/// In-memory store. Clones share the same data, counters and fault switches,
/// so a test can keep one clone while a client owns another.
#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Create an empty store with only the default namespace.
    pub fn new() -> Self {
        let mut namespaces = BTreeMap::new();
        namespaces.insert(DEFAULT_NAMESPACE.to_string(), Namespace::default());
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                namespaces,
                current: DEFAULT_NAMESPACE.to_string(),
                page_size: DEFAULT_PAGE_SIZE,
                password: None,
                calls: HashMap::new(),
                failures: Vec::new(),
                offline: false,
                closed: false,
            })),
        }
    }

    /// Set how many keys one scan page carries (at least one).
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = page_size.max(1);
        self
    }

    /// Require `AUTH password` to succeed.
    pub fn with_password(self, password: impl Into<String>) -> Self {
        self.lock().password = Some(password.into());
        self
    }

    /// Make the `n`-th upcoming call of `command` (1-based) fail once with an I/O error.
    pub fn fail_nth(&self, command: &str, n: u64) {
        self.inject(command, n, Fault::Io);
    }

    /// Make the `n`-th upcoming call of `command` (1-based) answer once with
    /// a reply no command produces: a single-element array holding a status.
    pub fn corrupt_nth(&self, command: &str, n: u64) {
        self.inject(command, n, Fault::Malformed);
    }

    /// While offline every command fails with an I/O error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Whether a client closed this transport.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of times `command` has been received.
    pub fn calls(&self, command: &str) -> u64 {
        self.lock().calls.get(command).copied().unwrap_or(0)
    }

    /// Write directly into the selected namespace without going through a command.
    pub fn insert(&self, key: &[u8], value: &[u8]) {
        let mut state = self.lock();
        state.namespace_mut().insert(key.to_vec(), value.to_vec());
    }

    /// Remove directly from the selected namespace, as another writer would.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.lock().namespace_mut().remove(key)
    }

    /// Number of keys in the selected namespace.
    pub fn len(&self) -> usize {
        self.lock().namespace().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_namespace(&self) -> String {
        self.lock().current.clone()
    }

    fn inject(&self, command: &str, n: u64, fault: Fault) {
        self.lock().failures.push(Failure {
            command: command.to_string(),
            remaining: n.max(1),
            fault,
        });
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn call(&mut self, command: &str, args: &[&[u8]]) -> Result<Reply> {
        let mut state = self.lock();
        *state.calls.entry(command.to_string()).or_default() += 1;

        if state.closed {
            return Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "connection closed").into());
        }
        if state.offline {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "store offline").into());
        }
        match state.take_failure(command) {
            Some(Fault::Io) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    format!("injected failure on {}", command),
                )
                .into())
            }
            Some(Fault::Malformed) => return Ok(Reply::Array(vec![Reply::Status("garbled".into())])),
            None => {}
        }

        state.dispatch(command, args)
    }

    fn close(&mut self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

impl MemoryState {
    fn namespace(&self) -> &Namespace {
        // The selected namespace can't be deleted, so it is always present.
        &self.namespaces[&self.current]
    }

    fn namespace_mut(&mut self) -> &mut Namespace {
        self.namespaces.entry(self.current.clone()).or_default()
    }

    fn take_failure(&mut self, command: &str) -> Option<Fault> {
        let idx = self.failures.iter().position(|f| f.command == command)?;
        self.failures[idx].remaining -= 1;
        if self.failures[idx].remaining == 0 {
            return Some(self.failures.remove(idx).fault);
        }
        None
    }

    fn dispatch(&mut self, command: &str, args: &[&[u8]]) -> Result<Reply> {
        match command {
            "PING" => Ok(Reply::Status("PONG".into())),
            "GET" => {
                let key = arg(args, 0)?;
                Ok(match self.namespace().entries.get(key) {
                    Some(stored) => Reply::Bulk(Bytes::copy_from_slice(&stored.value)),
                    None => Reply::Nil,
                })
            }
            "SET" => {
                let key = arg(args, 0)?;
                let value = arg(args, 1)?;
                self.namespace_mut().insert(key.to_vec(), value.to_vec());
                Ok(Reply::Bulk(Bytes::copy_from_slice(key)))
            }
            "DEL" => {
                if self.namespace_mut().remove(arg(args, 0)?) {
                    Ok(Reply::Status("OK".into()))
                } else {
                    Err(ZdbError::Server(KEY_NOT_FOUND.into()))
                }
            }
            "EXISTS" => {
                let found = self.namespace().entries.contains_key(arg(args, 0)?);
                Ok(Reply::Integer(i64::from(found)))
            }
            "LENGTH" => match self.namespace().entries.get(arg(args, 0)?) {
                Some(stored) => Ok(Reply::Integer(stored.value.len() as i64)),
                None => Err(ZdbError::Server(KEY_NOT_FOUND.into())),
            },
            "MGET" => {
                let entries = &self.namespace().entries;
                Ok(Reply::Array(
                    args.iter()
                        .map(|k| match entries.get(*k) {
                            Some(stored) => Reply::Bulk(Bytes::copy_from_slice(&stored.value)),
                            None => Reply::Nil,
                        })
                        .collect(),
                ))
            }
            "KEYCUR" => {
                let key = arg(args, 0)?;
                if self.namespace().entries.contains_key(key) {
                    Ok(Reply::Bulk(encode_cursor(key)))
                } else {
                    Err(ZdbError::Server(KEY_NOT_FOUND.into()))
                }
            }
            "SCAN" => self.scan(Direction::Forward, args.first().copied()),
            "RSCAN" => self.scan(Direction::Reverse, args.first().copied()),
            "INFO" => {
                let ns = self.namespace();
                let text = format!(
                    "# server\r\nversion: memory\r\nmode: user\r\nnamespace: {}\r\nkeys: {}\r\ndata_size_bytes: {}\r\n",
                    self.current,
                    ns.entries.len(),
                    ns.size_bytes
                );
                Ok(Reply::Bulk(Bytes::from(text)))
            }
            "DBSIZE" => Ok(Reply::Integer(self.namespace().size_bytes as i64)),
            "FLUSH" => {
                self.namespace_mut().clear();
                Ok(Reply::Status("OK".into()))
            }
            "AUTH" => {
                let given = text_arg(args, 0)?;
                match &self.password {
                    Some(pw) if *pw != given => Err(ZdbError::Server("Access denied".into())),
                    _ => Ok(Reply::Status("OK".into())),
                }
            }
            "NSNEW" => {
                let ns = text_arg(args, 0)?;
                if self.namespaces.contains_key(&ns) {
                    return Err(ZdbError::Server("This namespace is not available".into()));
                }
                self.namespaces.insert(ns, Namespace::default());
                Ok(Reply::Status("OK".into()))
            }
            "NSDEL" => {
                let ns = text_arg(args, 0)?;
                if ns == DEFAULT_NAMESPACE || ns == self.current {
                    return Err(ZdbError::Server("Cannot remove namespace in use".into()));
                }
                match self.namespaces.remove(&ns) {
                    Some(_) => Ok(Reply::Status("OK".into())),
                    None => Err(ZdbError::Server("Namespace not found".into())),
                }
            }
            "NSLIST" => Ok(Reply::Array(
                self.namespaces
                    .keys()
                    .map(|name| Reply::Bulk(Bytes::copy_from_slice(name.as_bytes())))
                    .collect(),
            )),
            "NSINFO" => {
                let name = text_arg(args, 0)?;
                let ns = self
                    .namespaces
                    .get(&name)
                    .ok_or_else(|| ZdbError::Server("Namespace not found".into()))?;
                let text = format!(
                    "# namespace\nname: {}\nentries: {}\ndata_size_bytes: {}\npassword: {}\n",
                    name,
                    ns.entries.len(),
                    ns.size_bytes,
                    if ns.password.is_some() { "yes" } else { "no" }
                );
                Ok(Reply::Bulk(Bytes::from(text)))
            }
            "NSSET" => {
                let name = text_arg(args, 0)?;
                let property = text_arg(args, 1)?;
                let value = text_arg(args, 2)?;
                let ns = self
                    .namespaces
                    .get_mut(&name)
                    .ok_or_else(|| ZdbError::Server("Namespace not found".into()))?;
                if property == "password" {
                    ns.password = if value == "*" { None } else { Some(value) };
                }
                Ok(Reply::Status("OK".into()))
            }
            "SELECT" => {
                let name = text_arg(args, 0)?;
                let ns = self
                    .namespaces
                    .get(&name)
                    .ok_or_else(|| ZdbError::Server("Namespace not found".into()))?;
                if let Some(pw) = &ns.password {
                    let secure = args.get(1).map(|a| a.eq_ignore_ascii_case(b"SECURE"));
                    let given = args.get(2).map(|a| String::from_utf8_lossy(a).into_owned());
                    if secure != Some(true) || given.as_deref() != Some(pw.as_str()) {
                        return Err(ZdbError::Server("Access denied".into()));
                    }
                }
                self.current = name;
                Ok(Reply::Status("OK".into()))
            }
            _ => Err(ZdbError::Server("Command not supported".into())),
        }
    }

    fn scan(&self, direction: Direction, cursor: Option<&[u8]>) -> Result<Reply> {
        let entries = &self.namespace().entries;
        let after = cursor.map(decode_cursor).transpose()?;
        let n = self.page_size;

        let page: Vec<(&Key, &Stored)> = match (direction, after.as_deref()) {
            (Direction::Forward, None) => entries.iter().take(n).collect(),
            (Direction::Forward, Some(k)) => entries
                .range::<[u8], _>((Bound::Excluded(k), Bound::Unbounded))
                .take(n)
                .collect(),
            (Direction::Reverse, None) => entries.iter().rev().take(n).collect(),
            (Direction::Reverse, Some(k)) => entries
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(k)))
                .rev()
                .take(n)
                .collect(),
        };

        let Some((last, _)) = page.last() else {
            return Err(ZdbError::Server(NO_MORE_DATA.into()));
        };
        let next = encode_cursor(last);

        let keys = page
            .iter()
            .map(|(key, stored)| {
                Reply::Array(vec![
                    Reply::Bulk(Bytes::copy_from_slice(key)),
                    Reply::Integer(stored.value.len() as i64),
                    Reply::Integer(stored.timestamp),
                ])
            })
            .collect();

        Ok(Reply::Array(vec![Reply::Bulk(next), Reply::Array(keys)]))
    }
}

fn arg<'a>(args: &[&'a [u8]], idx: usize) -> Result<&'a [u8]> {
    args.get(idx)
        .copied()
        .ok_or_else(|| ZdbError::Server("Invalid argument".into()))
}

fn text_arg(args: &[&[u8]], idx: usize) -> Result<String> {
    Ok(String::from_utf8_lossy(arg(args, idx)?).into_owned())
}

fn encode_cursor(key: &[u8]) -> Bytes {
    Bytes::from(format!("c:{}", hex::encode(key)))
}

fn decode_cursor(raw: &[u8]) -> Result<Key> {
    raw.strip_prefix(b"c:")
        .and_then(|encoded| hex::decode(encoded).ok())
        .ok_or_else(|| ZdbError::Server("Invalid cursor".into()))
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
