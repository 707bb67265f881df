//! ZDBKV - Range Iterator
//! A directional cursor over a `[start, end)` key domain, built on scan
//! pages fetched lazily from the store.
//!
//! ## Validity
//! The protocol has no change notifications, so every positional call
//! re-checks the store: a `PING`, then an `EXISTS` on the current key.
//! Any failure, or the key vanishing, invalidates the iterator for good and
//! the cause is kept for [`RangeIterator::error`]. Running off the end of
//! the domain invalidates it with [`ZdbError::EndOfData`].
//!
//! Only keys are buffered; `value()` always reads the store.

use std::collections::VecDeque;

use crate::client::{Client, Transport};
use crate::error::{Result, ZdbError};
use crate::kv::KvIterator;
use crate::types::{Cursor, Direction, Key, ScanPage, Value};

use super::pager::CursorPager;

/// Iterator over a key domain, forward or reverse.
///
/// While valid, `keys` is non-empty and its head is the current position.
pub struct RangeIterator<T: Transport> {
    pager: CursorPager<T>,
    start: Option<Key>,
    end: Option<Key>,
    keys: VecDeque<Key>,
    next_cursor: Option<Cursor>,
    /// No further page can contribute keys to the domain.
    exhausted: bool,
    valid: bool,
    err: Option<ZdbError>,
}

impl<T: Transport> RangeIterator<T> {
    /// Position a new iterator over `[start, end)`.
    ///
    /// Forward iteration resolves `start`, reverse iteration resolves `end`.
    /// If that key is not in the store the iterator starts out invalid with
    /// no error. Empty keys are rejected.
    pub fn open(
        client: Client<T>,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        direction: Direction,
    ) -> Result<Self> {
        if start.is_some_and(<[u8]>::is_empty) || end.is_some_and(<[u8]>::is_empty) {
            return Err(ZdbError::InvalidArgument("key cannot be empty".into()));
        }

        log::debug!(
            "{:?} iterator start: {:?}, end: {:?}",
            direction,
            start.map(String::from_utf8_lossy),
            end.map(String::from_utf8_lossy)
        );

        let (origin, bound) = match direction {
            Direction::Forward => (start, end),
            Direction::Reverse => (end, start),
        };
        let pager = CursorPager::new(client, direction, bound.map(<[u8]>::to_vec));

        let mut iter = Self {
            pager,
            start: start.map(<[u8]>::to_vec),
            end: end.map(<[u8]>::to_vec),
            keys: VecDeque::new(),
            next_cursor: None,
            exhausted: false,
            valid: false,
            err: None,
        };

        let (seed, page) = match origin {
            None => (None, iter.pager.fetch(None)?),
            Some(key) => match iter.pager.resolve(key)? {
                None => {
                    log::debug!("iterator origin {:?} not found", String::from_utf8_lossy(key));
                    return Ok(iter);
                }
                Some(cursor) => {
                    let page = iter.pager.fetch(Some(&cursor))?;
                    // A scan resumes after its cursor. Going forward the
                    // resolved start is itself the first key; going in reverse
                    // the resolved end is excluded from the domain.
                    let seed = match direction {
                        Direction::Forward => Some(key.to_vec()),
                        Direction::Reverse => None,
                    };
                    (seed, page)
                }
            },
        };

        iter.valid = true;
        iter.absorb(seed, page);
        Ok(iter)
    }

    /// The bounds given at construction, verbatim.
    pub fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        (self.start.as_deref(), self.end.as_deref())
    }

    pub fn direction(&self) -> Direction {
        self.pager.direction()
    }

    /// Whether the current position is usable. Round-trips to the store.
    pub fn valid(&mut self) -> bool {
        if !self.valid {
            return false;
        }

        if let Err(err) = self.pager.client().ping() {
            self.invalidate(err);
            return false;
        }

        let Some(head) = self.keys.front() else {
            self.invalidate(ZdbError::EndOfData);
            return false;
        };

        match self.pager.client().exists(head) {
            Ok(true) => true,
            Ok(false) => {
                self.invalidate(ZdbError::KeyNotFound);
                false
            }
            Err(err) => {
                self.invalidate(err);
                false
            }
        }
    }

    /// Move to the next key in iteration order, fetching a page if needed.
    ///
    /// Fails with `PreconditionViolated` if the iterator is not valid.
    /// Running out of keys is not an error here; it shows up as `valid()`
    /// turning false with `error()` reporting end of data.
    pub fn next(&mut self) -> Result<()> {
        self.ensure_valid("next")?;

        self.keys.pop_front();
        if self.keys.is_empty() {
            self.refill();
        }
        Ok(())
    }

    /// Key at the current position.
    pub fn key(&mut self) -> Result<Key> {
        self.ensure_valid("key")?;
        self.head("key").cloned()
    }

    /// Value at the current position, read fresh from the store.
    pub fn value(&mut self) -> Result<Value> {
        self.ensure_valid("value")?;
        let key = self.head("value")?.clone();

        match self.pager.client().get(&key) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => {
                self.invalidate(ZdbError::KeyNotFound);
                Err(ZdbError::KeyNotFound)
            }
            Err(err) => {
                self.invalidate(err.clone());
                Err(err)
            }
        }
    }

    /// The error that invalidated the iterator, if any.
    pub fn error(&self) -> Option<&ZdbError> {
        self.err.as_ref()
    }

    /// Invalidate the iterator. Calling it again is harmless.
    pub fn close(&mut self) -> Result<()> {
        self.invalidate(ZdbError::Closed("iterator"));
        Ok(())
    }

    /// Drain the remaining domain as `(key, value)` pairs.
    pub fn entries(self) -> Entries<T> {
        Entries {
            iter: self,
            done: false,
        }
    }

    fn head(&self, op: &str) -> Result<&Key> {
        self.keys.front().ok_or_else(|| {
            ZdbError::PreconditionViolated(format!("{} called with no current key", op))
        })
    }

    fn ensure_valid(&mut self, op: &str) -> Result<()> {
        if self.valid() {
            return Ok(());
        }
        let cause = self
            .err
            .as_ref()
            .map(|e| format!(": {}", e))
            .unwrap_or_default();
        Err(ZdbError::PreconditionViolated(format!(
            "{} called on invalid iterator{}",
            op, cause
        )))
    }

    fn refill(&mut self) {
        if self.exhausted {
            self.invalidate(ZdbError::EndOfData);
            return;
        }

        log::debug!("{:?} iterator fetching next page", self.direction());
        match self.pager.fetch(self.next_cursor.as_ref()) {
            Ok(page) => self.absorb(None, page),
            Err(err) => self.invalidate(err),
        }
    }

    /// Take the usable keys of a freshly fetched page.
    fn absorb(&mut self, seed: Option<Key>, page: ScanPage) {
        let store_done = page.is_empty() || page.next.is_none();
        let clipped = self
            .pager
            .clip(seed.into_iter().chain(page.keys.into_iter().map(|k| k.key)));

        self.keys = clipped.keys;
        self.next_cursor = page.next;
        self.exhausted = clipped.reached_bound || store_done;

        if self.keys.is_empty() {
            self.invalidate(ZdbError::EndOfData);
        }
    }

    fn invalidate(&mut self, err: ZdbError) {
        if !matches!(err, ZdbError::EndOfData | ZdbError::Closed(_)) {
            log::debug!("iterator invalidated: {}", err);
        }
        self.valid = false;
        self.keys.clear();
        self.err = Some(err);
    }
}

impl<T: Transport> KvIterator for RangeIterator<T> {
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        RangeIterator::domain(self)
    }

    fn valid(&mut self) -> bool {
        RangeIterator::valid(self)
    }

    fn next(&mut self) -> Result<()> {
        RangeIterator::next(self)
    }

    fn key(&mut self) -> Result<Key> {
        RangeIterator::key(self)
    }

    fn value(&mut self) -> Result<Value> {
        RangeIterator::value(self)
    }

    fn error(&self) -> Option<&ZdbError> {
        RangeIterator::error(self)
    }

    fn close(&mut self) -> Result<()> {
        RangeIterator::close(self)
    }
}

/// Std iterator over what is left of a [`RangeIterator`].
///
/// Yields an `Err` once if iteration stopped for any reason other than
/// reaching the end of the domain.
pub struct Entries<T: Transport> {
    iter: RangeIterator<T>,
    done: bool,
}

impl<T: Transport> Iterator for Entries<T> {
    type Item = Result<(Key, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if !self.iter.valid() {
            self.done = true;
            return match self.iter.error() {
                Some(err) if !err.is_end_of_data() => Some(Err(err.clone())),
                _ => None,
            };
        }

        let step = self
            .iter
            .key()
            .and_then(|k| self.iter.value().map(|v| (k, v)))
            .and_then(|pair| self.iter.next().map(|_| pair));

        if step.is_err() {
            self.done = true;
        }
        Some(step)
    }
}
