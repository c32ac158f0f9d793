//! Uniform pagination over cursor-based and unpaginated APIs
//!
//! [`PaginationController::collect`] drives a page-fetching closure until the
//! requested number of items is reached, the upstream runs out of pages, the
//! page budget is spent or the abort signal is raised. Platforms without
//! native pagination go through [`single_page`] instead.

use crate::HarvestError;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Cursor state of one logical multi-page query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Forward cursor for the next page
    pub after: Option<String>,
    pub before: Option<String>,
    pub items_so_far: usize,
    pub has_more: bool,
}

impl PaginationState {
    /// State of a fresh query, optionally resuming from `cursor`
    pub fn start(cursor: Option<String>) -> Self {
        Self {
            after: cursor,
            before: None,
            items_so_far: 0,
            has_more: true,
        }
    }

    /// Folds one received page into the state
    ///
    /// The query is exhausted when the upstream returns no forward cursor or
    /// fewer items than requested.
    fn advance(&mut self, received: usize, requested: usize, after: Option<String>, before: Option<String>) {
        self.items_so_far += received;
        self.has_more = after.is_some() && received >= requested;
        self.after = after;
        self.before = before;
    }
}

/// Parameters of a single page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub after: Option<String>,
    pub page_size: usize,
    /// 1-based page number within the query
    pub page_number: usize,
}

/// One page returned by the upstream
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub after: Option<String>,
    pub before: Option<String>,
    /// Entries the upstream sent, including ones that failed to decode
    pub received: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, after: Option<String>, before: Option<String>) -> Self {
        let received = items.len();
        Self {
            items,
            after,
            before,
            received,
        }
    }

    /// Overrides the upstream entry count when some entries were dropped
    pub fn with_received(mut self, received: usize) -> Self {
        self.received = received.max(self.items.len());
        self
    }
}

/// Items gathered by a paginated query
#[derive(Debug)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub state: PaginationState,
    /// Number of page requests that succeeded
    pub pages: usize,
    /// Failure that stopped the query early, if any
    pub error: Option<HarvestError>,
    pub cancelled: bool,
}

/// Drives cursor-based pagination for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationController {
    limit: usize,
    max_per_request: usize,
    max_pages: usize,
}

impl PaginationController {
    pub fn new(limit: usize, max_per_request: usize, max_pages: usize) -> Self {
        Self {
            limit,
            max_per_request: max_per_request.max(1),
            max_pages,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Size of the next page given how many items were already collected
    pub fn page_size(&self, collected: usize) -> usize {
        self.limit
            .saturating_sub(collected)
            .min(self.max_per_request)
    }

    /// Issues page requests until the query is satisfied
    pub async fn collect<T, F, Fut>(
        &self,
        cursor: Option<String>,
        cancel: &CancellationToken,
        mut fetch_page: F,
    ) -> Collected<T>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = Result<Page<T>, HarvestError>>,
    {
        let mut state = PaginationState::start(cursor);
        let mut items = Vec::new();
        let mut pages = 0;
        let mut error = None;
        let mut cancelled = false;

        while state.has_more && items.len() < self.limit && pages < self.max_pages {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let page_size = self.page_size(items.len());
            let request = PageRequest {
                after: state.after.clone(),
                page_size,
                page_number: pages + 1,
            };

            match fetch_page(request).await {
                Ok(page) => {
                    pages += 1;
                    let received = page.received;
                    items.extend(page.items);
                    state.advance(received, page_size, page.after, page.before);
                    tracing::debug!(
                        page = pages,
                        received,
                        total = items.len(),
                        has_more = state.has_more,
                        "Fetched page"
                    );
                }
                Err(err) => {
                    error = Some(err);
                    break;
                }
            }
        }

        items.truncate(self.limit);
        state.items_so_far = items.len();

        Collected {
            items,
            state,
            pages,
            error,
            cancelled,
        }
    }
}

/// Wraps the outcome of a single full request as an exhausted query
pub fn single_page<T>(mut items: Vec<T>, limit: usize) -> Collected<T> {
    items.truncate(limit);
    Collected {
        state: PaginationState {
            after: None,
            before: None,
            items_so_far: items.len(),
            has_more: false,
        },
        items,
        pages: 1,
        error: None,
        cancelled: false,
    }
}
