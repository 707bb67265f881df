//! ZDBKV - Embedded Database Contract
//! The interface an embedding application programs against: point reads
//! and writes, grouped writes and ordered range iteration.

use std::collections::HashMap;

use crate::error::{Result, ZdbError};
use crate::types::{Key, Value};

/// Ordered cursor over a `[start, end)` key domain.
///
/// Once `valid()` returns false it never returns true again. Positional
/// calls (`next`, `key`, `value`) on an invalid iterator fail with an error
/// of [`crate::error::Severity::Fatal`].
pub trait KvIterator {
    /// The `(start, end)` bounds given at construction.
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>);
    fn valid(&mut self) -> bool;
    fn next(&mut self) -> Result<()>;
    fn key(&mut self) -> Result<Key>;
    fn value(&mut self) -> Result<Value>;
    /// Why the iterator became invalid, if it did so for a reason.
    fn error(&self) -> Option<&ZdbError>;
    fn close(&mut self) -> Result<()>;
}

/// A group of writes submitted together.
pub trait KvBatch {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
    fn write(&self) -> Result<()>;
    fn write_sync(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// A key-value database.
pub trait KvStore {
    type Iter: KvIterator;
    type Batch: KvBatch;

    /// Fetch the value of a key, or `None` if it does not exist.
    fn get(&self, key: &[u8]) -> Result<Option<Value>>;
    fn has(&self, key: &[u8]) -> Result<bool>;
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn set_sync(&self, key: &[u8], value: &[u8]) -> Result<()>;
    /// Delete a key; a missing key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;
    fn delete_sync(&self, key: &[u8]) -> Result<()>;
    /// Ascending iterator. `None` bounds run to the edges of the keyspace.
    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<Self::Iter>;
    /// Descending iterator over the same domain semantics.
    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<Self::Iter>;
    fn new_batch(&self) -> Self::Batch;
    fn close(&self) -> Result<()>;
    /// Diagnostic properties. Empty if they can't be fetched.
    fn stats(&self) -> HashMap<String, String>;
}

/// Reject the zero-length key, which is never a valid position.
pub(crate) fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(ZdbError::InvalidArgument("key cannot be empty".into()));
    }
    Ok(())
}
