//! Cursor-paginated changefeed draining.
//!
//! A changefeed is pulled one page at a time. Each page carries the cursor
//! to use for the next request; the loop stops on the first page that
//! reports `has_more == false`. Pages are merged append-only, so the result
//! is the plain concatenation of every page in fetch order.

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Opaque position in a changefeed.
///
/// `Start` means "no prior position" and is kept apart from any token:
/// some providers hand out an empty string as a real cursor, so `At("")`
/// is a valid position and must not be confused with the start of the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncCursor {
    #[default]
    Start,
    At(String),
}

impl SyncCursor {
    /// Token to send to the provider, `None` for the start of the feed.
    pub fn token(&self) -> Option<&str> {
        match self {
            SyncCursor::Start => None,
            SyncCursor::At(token) => Some(token),
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, SyncCursor::Start)
    }
}

impl From<String> for SyncCursor {
    fn from(token: String) -> Self {
        SyncCursor::At(token)
    }
}

/// One fetched slice of the changefeed.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, R> {
    pub added: Vec<T>,
    pub modified: Vec<T>,
    pub removed: Vec<R>,
    pub has_more: bool,
    pub next_cursor: SyncCursor,
}

/// Everything accumulated by a fully drained sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult<T, R> {
    pub added: Vec<T>,
    pub modified: Vec<T>,
    pub removed: Vec<R>,
    /// Cursor returned by the last page; resume from here next time.
    pub cursor: SyncCursor,
    pub pages: usize,
}

impl<T, R> SyncResult<T, R> {
    fn empty(cursor: SyncCursor) -> Self {
        Self {
            added: Vec::new(),
            modified: Vec::new(),
            removed: Vec::new(),
            cursor,
            pages: 0,
        }
    }

    fn merge(&mut self, page: Page<T, R>) -> bool {
        self.added.extend(page.added);
        self.modified.extend(page.modified);
        self.removed.extend(page.removed);
        self.cursor = page.next_cursor;
        self.pages += 1;
        page.has_more
    }
}

#[derive(Debug, Error)]
pub enum SyncError<E> {
    /// A page fetch failed. Pages merged before the failure are dropped.
    #[error("sync aborted after {pages_fetched} pages: {source}")]
    Aborted {
        pages_fetched: usize,
        #[source]
        source: E,
    },
    #[error("sync cancelled")]
    Cancelled,
}

impl<E> SyncError<E> {
    /// Underlying fetch failure, if any.
    pub fn fetch_error(&self) -> Option<&E> {
        match self {
            SyncError::Aborted { source, .. } => Some(source),
            SyncError::Cancelled => None,
        }
    }
}

/// Drains the changefeed from its start.
pub async fn sync_changes<F, Fut, T, R, E>(
    fetch_page: F,
    cancel: &CancellationToken,
) -> Result<SyncResult<T, R>, SyncError<E>>
where
    F: FnMut(SyncCursor) -> Fut,
    Fut: Future<Output = Result<Page<T, R>, E>>,
{
    sync_changes_from(SyncCursor::Start, fetch_page, cancel).await
}

/// Drains the changefeed starting at `cursor`.
///
/// The cursor for fetch N+1 is exactly the `next_cursor` of fetch N. A
/// provider that never reports `has_more == false` keeps this looping; that
/// is the caller's trust boundary. Either the whole feed is returned or an
/// error, never a partial result.
pub async fn sync_changes_from<F, Fut, T, R, E>(
    cursor: SyncCursor,
    mut fetch_page: F,
    cancel: &CancellationToken,
) -> Result<SyncResult<T, R>, SyncError<E>>
where
    F: FnMut(SyncCursor) -> Fut,
    Fut: Future<Output = Result<Page<T, R>, E>>,
{
    let mut result = SyncResult::empty(cursor);
    loop {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            fetched = fetch_page(result.cursor.clone()) => fetched,
        };
        let page = fetched.map_err(|source| SyncError::Aborted {
            pages_fetched: result.pages,
            source,
        })?;
        if !result.merge(page) {
            return Ok(result);
        }
    }
}
