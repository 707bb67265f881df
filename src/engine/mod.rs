//! ZDBKV - Store Handle
//! Binds the command client, range iterators and batches into the
//! embedded-database contract.

pub mod batch;
pub mod iterator;
pub mod pager;

use std::collections::HashMap;

use crate::client::tcp::TcpTransport;
use crate::client::{Client, Transport};
use crate::config::Config;
use crate::error::Result;
use crate::kv::{check_key, KvStore};
use crate::types::{Direction, Value};

use self::batch::Batch;
use self::iterator::RangeIterator;

/// A key-value database backed by a remote store.
///
/// Point operations are forwarded as single commands. Iterators and
/// batches created from this handle share its connection.
///
/// ## Example
/// ```no_run
/// use zdbkv::{config::Config, engine::ZdbStore};
///
/// let store = ZdbStore::connect(Config::new("127.0.0.1:9900")).unwrap();
///
/// store.set(b"key", b"value").unwrap();
/// assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
/// ```
pub struct ZdbStore<T: Transport = TcpTransport> {
    client: Client<T>,
}

impl<T: Transport> Clone for ZdbStore<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl ZdbStore<TcpTransport> {
    /// Connect to the store described by `config`.
    pub fn connect(config: Config) -> Result<Self> {
        let client = Client::connect(&config)?;
        log::info!(
            "zdbkv store opened at {} (namespace: {})",
            config.address,
            config.namespace.as_deref().unwrap_or("default")
        );
        Ok(Self::new(client))
    }
}

impl<T: Transport> ZdbStore<T> {
    /// Wrap an existing client.
    pub fn new(client: Client<T>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client<T> {
        &self.client
    }

    /// Fetch the value of a key, or `None` if it does not exist.
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        check_key(key)?;
        self.client.get(key)
    }

    pub fn has(&self, key: &[u8]) -> Result<bool> {
        check_key(key)?;
        self.client.exists(key)
    }

    /// Set a key, replacing any previous value.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        check_key(key)?;
        self.client.set(key, value)
    }

    /// Same as [`ZdbStore::set`]; the store acknowledges writes once stored.
    pub fn set_sync(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.set(key, value)
    }

    /// Delete a key. Deleting a missing key does nothing.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        check_key(key)?;
        self.client.delete(key)
    }

    pub fn delete_sync(&self, key: &[u8]) -> Result<()> {
        self.delete(key)
    }

    /// Iterate `[start, end)` in ascending order.
    ///
    /// CONTRACT: no writes may happen within the domain while the iterator exists.
    pub fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<RangeIterator<T>> {
        RangeIterator::open(self.client.clone(), start, end, Direction::Forward)
    }

    /// Iterate `[start, end)` in descending order.
    ///
    /// CONTRACT: no writes may happen within the domain while the iterator exists.
    pub fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<RangeIterator<T>> {
        RangeIterator::open(self.client.clone(), start, end, Direction::Reverse)
    }

    /// Start a batch of writes. See [`Batch`] for its (non-atomic) guarantees.
    pub fn new_batch(&self) -> Batch<T> {
        Batch::new(self.client.clone())
    }

    /// Close the connection. Iterators and batches sharing it stop working.
    pub fn close(&self) -> Result<()> {
        self.client.close()
    }

    /// Server properties from `INFO`. Failures are logged and yield an empty map.
    pub fn stats(&self) -> HashMap<String, String> {
        match self.client.info() {
            Ok(stats) => stats,
            Err(err) => {
                log::warn!("failed to get db info: {}", err);
                HashMap::new()
            }
        }
    }
}

impl<T: Transport> KvStore for ZdbStore<T> {
    type Iter = RangeIterator<T>;
    type Batch = Batch<T>;

    fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        ZdbStore::get(self, key)
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        ZdbStore::has(self, key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        ZdbStore::set(self, key, value)
    }

    fn set_sync(&self, key: &[u8], value: &[u8]) -> Result<()> {
        ZdbStore::set_sync(self, key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        ZdbStore::delete(self, key)
    }

    fn delete_sync(&self, key: &[u8]) -> Result<()> {
        ZdbStore::delete_sync(self, key)
    }

    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<Self::Iter> {
        ZdbStore::iterator(self, start, end)
    }

    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<Self::Iter> {
        ZdbStore::reverse_iterator(self, start, end)
    }

    fn new_batch(&self) -> Self::Batch {
        ZdbStore::new_batch(self)
    }

    fn close(&self) -> Result<()> {
        ZdbStore::close(self)
    }

    fn stats(&self) -> HashMap<String, String> {
        ZdbStore::stats(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryTransport;
    use crate::error::ZdbError;

    fn store() -> (MemoryTransport, ZdbStore<MemoryTransport>) {
        let transport = MemoryTransport::new();
        (transport.clone(), ZdbStore::new(Client::new(transport)))
    }

    #[test]
    fn test_point_round_trip() {
        let (_, db) = store();
        db.set(b"k", b"v").unwrap();
        assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(db.has(b"k").unwrap());

        db.delete_sync(b"k").unwrap();
        assert_eq!(db.get(b"k").unwrap(), None);
        assert!(!db.has(b"k").unwrap());
    }

    #[test]
    fn test_empty_key_rejected() {
        let (_, db) = store();
        assert!(matches!(db.get(b""), Err(ZdbError::InvalidArgument(_))));
        assert!(matches!(db.set(b"", b"v"), Err(ZdbError::InvalidArgument(_))));
        assert!(matches!(db.delete(b""), Err(ZdbError::InvalidArgument(_))));
    }

    #[test]
    fn test_stats() {
        let (transport, db) = store();
        db.set(b"k", b"v").unwrap();
        let stats = db.stats();
        assert_eq!(stats.get("keys").map(String::as_str), Some("1"));

        transport.set_offline(true);
        assert!(db.stats().is_empty());
    }

    #[test]
    fn test_close_disconnects() {
        let (transport, db) = store();
        db.close().unwrap();
        assert!(db.get(b"k").is_err());
        assert!(transport.is_closed());
    }
}
