//! ZDBKV - Command Client
//! Typed request/response calls against the store's command set.
//!
//! The wire itself sits behind [`Transport`]; [`Client`] turns raw replies
//! into keys, values, cursors and scan pages, and is shared by the store
//! handle, its iterators and its batches.

pub mod memory;
pub mod metrics;
pub mod resp;
pub mod tcp;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::Config;
use crate::error::{Result, ZdbError};
use crate::types::{Cursor, Direction, KeyInfo, ScanPage, Value};

use self::metrics::ClientMetrics;
use self::resp::Reply;
use self::tcp::TcpTransport;

/// Error text the store uses when a key or cursor target does not exist.
const KEY_NOT_FOUND: &str = "Key not found";
/// Error text the store uses when a scan has nothing past the cursor.
const NO_MORE_DATA: &str = "No more data";

/// Synchronous request/response channel to the store.
///
/// An error reply from the store must come back as `Err(ZdbError::Server)`.
pub trait Transport {
    fn call(&mut self, command: &str, args: &[&[u8]]) -> Result<Reply>;

    /// Release the connection. Later calls fail.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Shared handle to one transport.
///
/// Clones talk over the same connection; calls are serialized, so there is
/// at most one request in flight per handle.
pub struct Client<T: Transport> {
    transport: Arc<Mutex<T>>,
    metrics: Arc<ClientMetrics>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl Client<TcpTransport> {
    /// Dial the store and run the configured `AUTH` / `SELECT`.
    pub fn connect(config: &Config) -> Result<Self> {
        let client = Self::new(TcpTransport::connect(config)?);
        client.login(config)?;
        Ok(client)
    }
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            metrics: Arc::new(ClientMetrics::new()),
        }
    }

    /// Authenticate and select the namespace named in `config`, if any.
    pub fn login(&self, config: &Config) -> Result<()> {
        match (&config.namespace, &config.password) {
            (Some(ns), Some(pw)) => self.select_secure(ns, pw),
            (Some(ns), None) => self.select(ns),
            (None, Some(pw)) => self.auth(pw),
            (None, None) => Ok(()),
        }
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// Send one raw command.
    pub fn call(&self, command: &str, args: &[&[u8]]) -> Result<Reply> {
        self.metrics
            .record_command(command, args.iter().map(|a| a.len()).sum());

        let result = {
            let mut transport = self
                .transport
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            transport.call(command, args)
        };

        result.map_err(|err| {
            let err = classify(err);
            if !matches!(err, ZdbError::KeyNotFound | ZdbError::NoMoreData) {
                self.metrics.record_error();
            }
            err
        })
    }

    /// Close the underlying transport for every clone of this handle.
    pub fn close(&self) -> Result<()> {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close()
    }

    pub fn ping(&self) -> Result<()> {
        self.call("PING", &[]).map(|_| ())
    }

    /// Fetch a value, or `None` if the key does not exist.
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        let value = match self.call("GET", &[key]) {
            Ok(reply) => reply.into_optional_bytes()?,
            Err(ZdbError::KeyNotFound) => None,
            Err(err) => return Err(err),
        };
        if let Some(v) = &value {
            self.metrics.record_read(v.len());
        }
        Ok(value.map(|v| v.to_vec()))
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.call("SET", &[key, value]).map(|_| ())
    }

    /// Delete a key. Deleting a missing key is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        match self.call("DEL", &[key]) {
            Ok(_) | Err(ZdbError::KeyNotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.call("EXISTS", &[key])?.into_integer()? == 1)
    }

    /// Resolve a key to the cursor positioned on it.
    ///
    /// Fails with `ZdbError::KeyNotFound` if the key is absent.
    pub fn key_cursor(&self, key: &[u8]) -> Result<Cursor> {
        let raw = self.call("KEYCUR", &[key])?.into_bytes()?;
        Ok(Cursor::new(raw))
    }

    /// Fetch one page in `direction`, starting after `cursor` or at the
    /// edge of the keyspace when no cursor is given.
    ///
    /// Fails with `ZdbError::NoMoreData` once the scan is exhausted.
    pub fn scan_page(&self, direction: Direction, cursor: Option<&Cursor>) -> Result<ScanPage> {
        let command = match direction {
            Direction::Forward => "SCAN",
            Direction::Reverse => "RSCAN",
        };
        let reply = match cursor {
            Some(c) => self.call(command, &[c.as_bytes()])?,
            None => self.call(command, &[])?,
        };
        parse_scan_page(reply)
    }

    pub fn scan(&self) -> Result<ScanPage> {
        self.scan_page(Direction::Forward, None)
    }

    pub fn scan_cursor(&self, cursor: &Cursor) -> Result<ScanPage> {
        self.scan_page(Direction::Forward, Some(cursor))
    }

    pub fn rscan(&self) -> Result<ScanPage> {
        self.scan_page(Direction::Reverse, None)
    }

    pub fn rscan_cursor(&self, cursor: &Cursor) -> Result<ScanPage> {
        self.scan_page(Direction::Reverse, Some(cursor))
    }

    /// Server information as `key -> value` pairs.
    pub fn info(&self) -> Result<HashMap<String, String>> {
        let text = self.call("INFO", &[])?.into_text()?;
        Ok(parse_info(&text))
    }

    /// Fetch several values at once; missing keys come back as `None`.
    pub fn mget(&self, keys: &[&[u8]]) -> Result<Vec<Option<Value>>> {
        self.call("MGET", keys)?
            .into_array()?
            .into_iter()
            .map(|r| Ok(r.into_optional_bytes()?.map(|v| v.to_vec())))
            .collect()
    }

    /// Length of the stored value, or `None` if the key is absent.
    pub fn length(&self, key: &[u8]) -> Result<Option<u64>> {
        match self.call("LENGTH", &[key]) {
            Ok(Reply::Nil) | Err(ZdbError::KeyNotFound) => Ok(None),
            Ok(reply) => Ok(Some(non_negative(reply.into_integer()?, "length")?)),
            Err(err) => Err(err),
        }
    }

    /// Size of the selected namespace in bytes, as reported by the store.
    pub fn dbsize(&self) -> Result<u64> {
        non_negative(self.call("DBSIZE", &[])?.into_integer()?, "database size")
    }

    /// Remove every key of the selected namespace.
    pub fn flush(&self) -> Result<()> {
        self.call("FLUSH", &[]).map(|_| ())
    }

    pub fn auth(&self, password: &str) -> Result<()> {
        self.call("AUTH", &[password.as_bytes()]).map(|_| ())
    }

    pub fn new_namespace(&self, ns: &str) -> Result<()> {
        self.call("NSNEW", &[ns.as_bytes()]).map(|_| ())
    }

    pub fn delete_namespace(&self, ns: &str) -> Result<()> {
        self.call("NSDEL", &[ns.as_bytes()]).map(|_| ())
    }

    pub fn select(&self, ns: &str) -> Result<()> {
        self.call("SELECT", &[ns.as_bytes()]).map(|_| ())
    }

    /// Select a password-protected namespace.
    pub fn select_secure(&self, ns: &str, password: &str) -> Result<()> {
        self.call("SELECT", &[ns.as_bytes(), b"SECURE", password.as_bytes()])
            .map(|_| ())
    }

    /// Raw description of a namespace, as text.
    pub fn namespace_info(&self, ns: &str) -> Result<String> {
        self.call("NSINFO", &[ns.as_bytes()])?.into_text()
    }

    pub fn list_namespaces(&self) -> Result<Vec<String>> {
        self.call("NSLIST", &[])?
            .into_array()?
            .into_iter()
            .map(Reply::into_text)
            .collect()
    }

    /// Change a namespace property (`password`, `public`, `maxsize`, ...).
    pub fn set_namespace(&self, ns: &str, property: &str, value: &str) -> Result<()> {
        self.call(
            "NSSET",
            &[ns.as_bytes(), property.as_bytes(), value.as_bytes()],
        )
        .map(|_| ())
    }
}

/// Map the store's well-known error replies onto dedicated variants.
fn classify(err: ZdbError) -> ZdbError {
    match err {
        ZdbError::Server(msg) if msg == KEY_NOT_FOUND => ZdbError::KeyNotFound,
        ZdbError::Server(msg) if msg == NO_MORE_DATA => ZdbError::NoMoreData,
        other => other,
    }
}

fn non_negative(n: i64, what: &str) -> Result<u64> {
    u64::try_from(n)
        .map_err(|_| ZdbError::Protocol(format!("invalid response, negative {}: {}", what, n)))
}

/// Parse a `SCAN`/`RSCAN` reply: `[next-cursor, [[key, size, timestamp], ...]]`.
///
/// Any deviation from that shape is a protocol error.
pub fn parse_scan_page(reply: Reply) -> Result<ScanPage> {
    let mut top = reply.into_array()?;
    if top.len() != 2 {
        return Err(ZdbError::Protocol(format!(
            "invalid response, scan operations should return two elements, but {} were returned",
            top.len()
        )));
    }

    let entries = top.pop().map(Reply::into_array).transpose()?.unwrap_or_default();
    let next = match top.pop() {
        Some(Reply::Bulk(raw)) if !raw.is_empty() => Some(Cursor::new(raw)),
        Some(Reply::Bulk(_)) => None,
        Some(other) => {
            return Err(ZdbError::Protocol(format!(
                "invalid response, expected next cursor to be a string, but a {} was returned",
                other.kind()
            )))
        }
        None => None,
    };

    let keys = entries
        .into_iter()
        .map(parse_key_info)
        .collect::<Result<Vec<_>>>()?;

    Ok(ScanPage { next, keys })
}

fn parse_key_info(entry: Reply) -> Result<KeyInfo> {
    let fields = entry.into_array()?;
    let [key, size, timestamp]: [Reply; 3] = fields.try_into().map_err(|f: Vec<Reply>| {
        ZdbError::Protocol(format!(
            "invalid response, expected key information to have 3 elements, but {} were returned",
            f.len()
        ))
    })?;

    let key = match key {
        Reply::Bulk(raw) => raw.to_vec(),
        other => {
            return Err(ZdbError::Protocol(format!(
                "invalid response, expected key to be a string, but a {} was returned",
                other.kind()
            )))
        }
    };

    Ok(KeyInfo {
        key,
        size: non_negative(size.into_integer()?, "key size")?,
        timestamp: timestamp.into_integer()?,
    })
}

/// Parse `INFO` text into a map. Lines without a `:` are skipped; values
/// are trimmed of spaces and line endings.
pub fn parse_info(text: &str) -> HashMap<String, String> {
    text.split('\n')
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| {
            (
                key.to_string(),
                value.trim_matches(|c: char| c == ' ' || c == '\r' || c == '\n').to_string(),
            )
        })
        .collect()
}
