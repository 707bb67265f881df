//! ZDBKV - Core Type Definitions
//! Defines the keys, cursors and scan pages exchanged with the store.

use bytes::Bytes;

/// Key type for the adapter.
/// Using Vec<u8> allows arbitrary binary keys.
pub type Key = Vec<u8>;

/// Value type for the adapter.
pub type Value = Vec<u8>;

/// Opaque scan position issued by the store.
///
/// Only ever handed back to the store unmodified; never parsed or compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(Bytes);

impl Cursor {
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self(raw.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Scan order over the keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// One entry of a scan page.
/// `size` and `timestamp` are carried through but unused by iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub key: Key,
    pub size: u64,
    pub timestamp: i64,
}

/// One page of a scan: the cursor to resume from and the keys in scan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    pub next: Option<Cursor>,
    pub keys: Vec<KeyInfo>,
}

impl ScanPage {
    /// A page signalling that the keyspace is exhausted in this direction.
    pub fn exhausted() -> Self {
        Self {
            next: None,
            keys: Vec::new(),
        }
    }

    /// Returns true if the page carries no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
