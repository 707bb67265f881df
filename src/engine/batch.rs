//! ZDBKV - Batch
//! Buffered writes replayed one command at a time.
//!
//! The store has no multi-key transaction, so a batch is **not atomic** and
//! not isolated. `write()` sends every buffered set in the order it was
//! added, then every buffered delete in the order it was added. Sets and
//! deletes are not interleaved: a `delete(k)` followed by `set(k, v)` in the
//! same batch still ends with `k` deleted.
//!
//! Each operation leaves the log once the store accepts it. If one fails,
//! `write()` stops and returns [`ZdbError::TryAgain`]; what was applied stays
//! applied and a later `write()` resumes with the operation that failed.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::client::{Client, Transport};
use crate::error::{Result, ZdbError};
use crate::kv::{check_key, KvBatch};
use crate::types::{Key, Value};

#[derive(Default)]
struct BatchLog {
    set_ops: VecDeque<(Key, Value)>,
    del_keys: VecDeque<Key>,
    closed: bool,
}

/// Ordered log of pending writes against one store handle.
pub struct Batch<T: Transport> {
    client: Client<T>,
    log: Mutex<BatchLog>,
}

impl<T: Transport> Batch<T> {
    pub fn new(client: Client<T>) -> Self {
        Self {
            client,
            log: Mutex::new(BatchLog::default()),
        }
    }

    /// Queue a key-value pair.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut log = self.open_log()?;
        check_key(key)?;
        log.set_ops.push_back((key.to_vec(), value.to_vec()));
        Ok(())
    }

    /// Queue a deletion.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut log = self.open_log()?;
        check_key(key)?;
        log.del_keys.push_back(key.to_vec());
        Ok(())
    }

    /// Replay the log: all sets, then all deletes. Not atomic.
    pub fn write(&self) -> Result<()> {
        let mut log = self.open_log()?;

        while let Some((key, value)) = log.set_ops.front() {
            if let Err(err) = self.client.set(key, value) {
                log::warn!("batch set failed, {} ops still pending: {}", log.pending(), err);
                return Err(ZdbError::TryAgain);
            }
            log.set_ops.pop_front();
        }

        while let Some(key) = log.del_keys.front() {
            if let Err(err) = self.client.delete(key) {
                log::warn!("batch delete failed, {} ops still pending: {}", log.pending(), err);
                return Err(ZdbError::TryAgain);
            }
            log.del_keys.pop_front();
        }

        Ok(())
    }

    /// Same as [`Batch::write`]; the store exposes no separate durable flush.
    pub fn write_sync(&self) -> Result<()> {
        self.write()
    }

    /// Close the batch. Further calls other than `close` fail.
    pub fn close(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }

    /// Number of operations not yet applied.
    pub fn len(&self) -> usize {
        self.lock().pending()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, BatchLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_log(&self) -> Result<MutexGuard<'_, BatchLog>> {
        let log = self.lock();
        if log.closed {
            return Err(ZdbError::Closed("batch"));
        }
        Ok(log)
    }
}

impl BatchLog {
    fn pending(&self) -> usize {
        self.set_ops.len() + self.del_keys.len()
    }
}

impl<T: Transport> KvBatch for Batch<T> {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Batch::set(self, key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        Batch::delete(self, key)
    }

    fn write(&self) -> Result<()> {
        Batch::write(self)
    }

    fn write_sync(&self) -> Result<()> {
        Batch::write_sync(self)
    }

    fn close(&self) -> Result<()> {
        Batch::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryTransport;

    fn batch() -> (MemoryTransport, Batch<MemoryTransport>) {
        let transport = MemoryTransport::new();
        let batch = Batch::new(Client::new(transport.clone()));
        (transport, batch)
    }

    #[test]
    fn test_sets_before_deletes() {
        let (transport, batch) = batch();
        batch.set(b"a", b"1").unwrap();
        batch.set(b"b", b"2").unwrap();
        batch.delete(b"a").unwrap();
        assert_eq!(batch.len(), 3);

        batch.write().unwrap();
        assert!(batch.is_empty());

        let client = Client::new(transport);
        assert_eq!(client.get(b"a").unwrap(), None);
        assert_eq!(client.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_delete_then_set_ends_deleted() {
        let (transport, batch) = batch();
        batch.delete(b"k").unwrap();
        batch.set(b"k", b"v").unwrap();
        batch.write().unwrap();
        assert_eq!(transport.len(), 0);
    }

    #[test]
    fn test_partial_failure_resumes() {
        let (transport, batch) = batch();
        batch.set(b"a", b"1").unwrap();
        batch.set(b"b", b"2").unwrap();
        batch.set(b"c", b"3").unwrap();
        transport.fail_nth("SET", 3);

        assert!(matches!(batch.write(), Err(ZdbError::TryAgain)));
        assert_eq!(transport.len(), 2);
        assert_eq!(batch.len(), 1);

        batch.write().unwrap();
        assert_eq!(transport.len(), 3);
        // 2 applied + 1 failed + 1 retried
        assert_eq!(transport.calls("SET"), 4);
    }

    #[test]
    fn test_delete_failure_keeps_sets() {
        let (transport, batch) = batch();
        transport.insert(b"old", b"x");
        batch.set(b"new", b"y").unwrap();
        batch.delete(b"old").unwrap();
        transport.fail_nth("DEL", 1);

        assert!(matches!(batch.write(), Err(ZdbError::TryAgain)));
        assert_eq!(transport.len(), 2);
        batch.write().unwrap();
        assert_eq!(transport.len(), 1);
        assert_eq!(transport.calls("SET"), 1);
    }

    #[test]
    fn test_write_does_not_close() {
        let (_, batch) = batch();
        batch.set(b"a", b"1").unwrap();
        batch.write_sync().unwrap();
        batch.set(b"b", b"2").unwrap();
        batch.write().unwrap();
    }

    #[test]
    fn test_closed_batch_rejects_everything() {
        let (transport, batch) = batch();
        batch.set(b"a", b"1").unwrap();
        batch.close().unwrap();
        batch.close().unwrap();

        assert!(batch.set(b"b", b"2").unwrap_err().is_closed());
        assert!(batch.delete(b"a").unwrap_err().is_closed());
        assert!(batch.write().unwrap_err().is_closed());
        assert!(batch.write_sync().unwrap_err().is_closed());
        assert_eq!(transport.calls("SET"), 0);
    }

    #[test]
    fn test_rejects_empty_key() {
        let (_, batch) = batch();
        assert!(matches!(batch.set(b"", b"v"), Err(ZdbError::InvalidArgument(_))));
        assert!(matches!(batch.delete(b""), Err(ZdbError::InvalidArgument(_))));
        assert!(batch.is_empty());
    }
}
