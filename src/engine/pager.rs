//! ZDBKV - Cursor Pager
//! Turns the store's "next page after this cursor" primitive into clipped
//! runs of keys for one iteration direction.

use std::collections::VecDeque;

use crate::client::{Client, Transport};
use crate::error::{Result, ZdbError};
use crate::types::{Cursor, Direction, Key, ScanPage};

/// Keys of one page that fall inside the iterator's domain.
#[derive(Debug, Default)]
pub struct Clipped {
    pub keys: VecDeque<Key>,
    /// The far bound of the domain was met; later pages can't contribute.
    pub reached_bound: bool,
}

/// Fetches and clips scan pages for one direction.
///
/// The far bound is the domain edge iteration runs towards: the exclusive
/// `end` going forward, the inclusive `start` going in reverse.
pub struct CursorPager<T: Transport> {
    client: Client<T>,
    direction: Direction,
    bound: Option<Key>,
}

impl<T: Transport> CursorPager<T> {
    pub fn new(client: Client<T>, direction: Direction, bound: Option<Key>) -> Self {
        Self {
            client,
            direction,
            bound,
        }
    }

    pub fn client(&self) -> &Client<T> {
        &self.client
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Resolve a key to the cursor positioned on it.
    /// Returns `None` if the key does not exist.
    pub fn resolve(&self, key: &[u8]) -> Result<Option<Cursor>> {
        match self.client.key_cursor(key) {
            Ok(cursor) => Ok(Some(cursor)),
            Err(ZdbError::KeyNotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Fetch the page after `cursor`, or the first page from the edge of
    /// the keyspace when there is no cursor.
    ///
    /// Store exhaustion comes back as an empty page, not an error.
    pub fn fetch(&self, cursor: Option<&Cursor>) -> Result<ScanPage> {
        match self.client.scan_page(self.direction, cursor) {
            Ok(page) => Ok(page),
            Err(ZdbError::NoMoreData) => Ok(ScanPage::exhausted()),
            Err(err) => Err(err),
        }
    }

    /// Keep the keys that lie before the far bound, in scan order.
    pub fn clip(&self, keys: impl IntoIterator<Item = Key>) -> Clipped {
        let mut clipped = Clipped::default();
        for key in keys {
            match self.position(&key) {
                Placement::Inside => clipped.keys.push_back(key),
                Placement::Last => {
                    clipped.keys.push_back(key);
                    clipped.reached_bound = true;
                    break;
                }
                Placement::Outside => {
                    clipped.reached_bound = true;
                    break;
                }
            }
        }
        clipped
    }

    fn position(&self, key: &[u8]) -> Placement {
        let Some(bound) = self.bound.as_deref() else {
            return Placement::Inside;
        };
        match self.direction {
            Direction::Forward if key >= bound => Placement::Outside,
            Direction::Reverse if key < bound => Placement::Outside,
            Direction::Reverse if key == bound => Placement::Last,
            _ => Placement::Inside,
        }
    }
}

enum Placement {
    Inside,
    Last,
    Outside,
}
