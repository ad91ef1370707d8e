//! Stateful page walker
//!
//! Each fetch moves the page index by exactly one and replaces the stored
//! cursors with the ones the response advertised.

use std::marker::PhantomData;
use std::sync::Arc;

use pelagic_domain::{
    Authentication, Cursor, Direction, Method, PageInfo, PagedResult, PelagicError, Request,
    Result,
};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::link::{parse_link_header, PageLinks};
use crate::request::{RequestBody, Requester};

/// Index before the first page has been fetched.
const START_INDEX: i64 = -1;

/// Walks a paginated collection of `T`.
pub struct Paginator<T> {
    requester: Arc<Requester>,
    route: String,
    authentication: Authentication,
    info: PageInfo,
    started: bool,
    _items: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Paginator<T> {
    /// Paginator over the collection at `route`. Nothing is fetched yet.
    pub fn new(
        requester: Arc<Requester>,
        route: impl Into<String>,
        authentication: Authentication,
    ) -> Self {
        Self {
            requester,
            route: route.into(),
            authentication,
            info: PageInfo::new(START_INDEX, None, None),
            started: false,
            _items: PhantomData,
        }
    }

    /// Position and cursors of the last fetched page.
    pub const fn info(&self) -> &PageInfo {
        &self.info
    }

    /// Fetch the page adjacent to the current one.
    ///
    /// An explicit `cursor` overrides the stored one. Before anything has
    /// been fetched, `Direction::After` loads the first page from the
    /// collection route.
    ///
    /// # Errors
    ///
    /// Returns `PelagicError::NoSuchPage` when no cursor leads in
    /// `direction`, and any error from the requester or from decoding items.
    #[instrument(skip(self, cursor), fields(route = %self.route, index = self.info.index))]
    pub async fn fetch(
        &mut self,
        direction: Direction,
        cursor: Option<Cursor>,
    ) -> Result<PagedResult<T>> {
        let target = match cursor {
            Some(cursor) => cursor.as_str().to_string(),
            None if !self.started && direction == Direction::After => self.route.clone(),
            None => self
                .info
                .cursor(direction)
                .map(|cursor| cursor.as_str().to_string())
                .ok_or(PelagicError::NoSuchPage(direction))?,
        };

        let body = RequestBody::Empty.encode().await?;
        let request = Request::new(Method::Get, target, self.authentication, body);
        let response = self.requester.send(request).await?;

        let items: Vec<T> = response.json()?;
        let links = response.header("link").map(parse_link_header).unwrap_or_default();
        let PageLinks { previous, next } = links;

        self.info = PageInfo::new(self.info.index + direction.step(), previous, next);
        self.started = true;
        debug!(index = self.info.index, items = items.len(), "page fetched");

        Ok(PagedResult { info: self.info.clone(), items })
    }

    /// Step one page at a time until the current index equals `target`.
    ///
    /// Returns every page fetched on the way, in fetch order.
    ///
    /// # Errors
    ///
    /// Stops at the first failure. Pages already fetched stay applied to
    /// [`Self::info`].
    pub async fn paginate_to(&mut self, target: i64) -> Result<Vec<PagedResult<T>>> {
        let mut pages = Vec::new();
        while self.info.index != target {
            let direction =
                if target > self.info.index { Direction::After } else { Direction::Before };
            pages.push(self.fetch(direction, None).await?);
        }
        Ok(pages)
    }
}
