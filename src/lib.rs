//! ZDBKV - Embedded Key-Value Contract over 0-db
//!
//! Adapts a remote, order-preserving key-value store that speaks a small
//! command protocol (`GET`/`SET`/`DEL`/`EXISTS`/`KEYCUR`/`SCAN`/`RSCAN`) to
//! an embedded-database interface with point operations, batches and
//! bidirectional range iteration.
//!
//! ## Features
//! - **Command Client**: typed calls over a pluggable [`client::Transport`] (TCP or in-memory)
//! - **Cursor Pager**: turns cursor-paginated scans into clipped key runs
//! - **Range Iterator**: `[start, end)` iteration, forward or reverse, re-validated on every step
//! - **Batch**: ordered, best-effort replay of buffered writes (not atomic)
//! - **Metrics**: lock-free per-client command counters
//!
//! ## Example
//! ```no_run
//! use zdbkv::{config::Config, engine::ZdbStore};
//!
//! let store = ZdbStore::connect(Config::default()).unwrap();
//!
//! let batch = store.new_batch();
//! batch.set(b"a", b"1").unwrap();
//! batch.set(b"b", b"2").unwrap();
//! batch.write().unwrap();
//!
//! let mut iter = store.iterator(Some(b"a".as_slice()), None).unwrap();
//! while iter.valid() {
//!     println!("{:?}", iter.key().unwrap());
//!     iter.next().unwrap();
//! }
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod kv;
pub mod types;
