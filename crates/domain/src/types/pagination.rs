//! Cursor pagination types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque pointer to an adjacent page.
///
/// Cursors come from response metadata and are forwarded verbatim; the
/// client never builds one itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a cursor taken from a response.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The cursor exactly as the server sent it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which neighbour of the current page to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards newer items (`rel="prev"`).
    Before,
    /// Towards older items (`rel="next"`).
    After,
}

impl Direction {
    /// Amount the page index moves by when fetching in this direction.
    pub const fn step(self) -> i64 {
        match self {
            Self::Before => -1,
            Self::After => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => f.write_str("before the current page"),
            Self::After => f.write_str("after the current page"),
        }
    }
}

/// Position of a fetched page and the cursors around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Pages moved from the start. `-1` before the first fetch.
    pub index: i64,
    /// The last response linked a previous page.
    pub has_previous: bool,
    /// The last response linked a next page.
    pub has_next: bool,
    /// Target of `rel="prev"`, if any.
    pub previous_cursor: Option<Cursor>,
    /// Target of `rel="next"`, if any.
    pub next_cursor: Option<Cursor>,
}

impl PageInfo {
    /// Build page info, deriving the `has_*` flags from cursor presence.
    pub fn new(index: i64, previous_cursor: Option<Cursor>, next_cursor: Option<Cursor>) -> Self {
        Self {
            index,
            has_previous: previous_cursor.is_some(),
            has_next: next_cursor.is_some(),
            previous_cursor,
            next_cursor,
        }
    }

    /// Cursor leading in `direction`, if the server provided one.
    pub const fn cursor(&self, direction: Direction) -> Option<&Cursor> {
        match direction {
            Direction::Before => self.previous_cursor.as_ref(),
            Direction::After => self.next_cursor.as_ref(),
        }
    }
}

/// One fetched page. Merging pages is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedResult<T> {
    /// Position after this page was fetched.
    pub info: PageInfo,
    /// Items in server order.
    pub items: Vec<T>,
}
