use serde::Serialize;
use thiserror::Error;

use crate::cursor::SortKey;

pub const MIN_LIMIT: i64 = 1;
pub const MAX_LIMIT: i64 = 100;

/// Page size already checked against `[MIN_LIMIT, MAX_LIMIT]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(u32);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("limit must be between {MIN_LIMIT} and {MAX_LIMIT}, got {0}")]
pub struct LimitError(pub i64);

impl Limit {
    pub fn new(value: i64) -> Result<Self, LimitError> {
        if (MIN_LIMIT..=MAX_LIMIT).contains(&value) {
            Ok(Self(value as u32))
        } else {
            Err(LimitError(value))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Rows to fetch so we can tell whether another page exists.
    pub fn probe(self) -> i64 {
        i64::from(self.0) + 1
    }
}

impl TryFrom<i64> for Limit {
    type Error = LimitError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// One page of a keyset listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Sort key of the last kept row, present only when more rows exist.
    pub next_cursor: Option<SortKey>,
}

impl<T> Page<T> {
    /// Trim a `limit + 1` fetch down to `limit` rows and derive the cursor.
    /// A row whose key cannot be derived fails the page rather than
    /// producing a cursor that would skip rows.
    pub fn from_probe<E>(
        mut rows: Vec<T>,
        limit: Limit,
        key_of: impl Fn(&T) -> Result<SortKey, E>,
    ) -> Result<Self, E> {
        let limit = limit.get() as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let next_cursor = match rows.last() {
            Some(last) if has_more => Some(key_of(last)?),
            _ => None,
        };
        Ok(Self {
            items: rows,
            next_cursor,
        })
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Wire form of [`Page`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            items: page.items,
            next_cursor: page.next_cursor.map(|key| key.encode()),
        }
    }
}
