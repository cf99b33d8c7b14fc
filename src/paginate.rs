// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Paginated read resolution.
//!
//! Drives repeated page fetches across cursor boundaries until the caller's
//! item limit is met or the store reports no further cursor.
//!
//! # Continuation rule
//!
//! ```text
//! continue  ⇔  page.cursor.is_some() && (remaining.is_none() || remaining - page.len() > 0)
//! ```
//!
//! The check runs before `remaining` is decremented, so a limit that is met
//! exactly by the current page stops without an extra round trip. Empty pages
//! that still carry a cursor continue. The page size sent to the store is
//! whatever the caller's request says; the resolver never changes it.

use serde_json::Value;
use tracing::{debug, instrument};

use crate::backend::StoreBackend;
use crate::record::{Page, Record};
use crate::storage::traits::StorageError;

/// State threaded through successive page fetches.
#[derive(Debug, Default)]
pub struct PaginationState {
    pub accumulated: Vec<Record>,
    /// Items still wanted. `None` means unbounded.
    pub remaining: Option<usize>,
    pub cursor: Option<Value>,
    pub pages: usize,
}

impl PaginationState {
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            remaining: limit,
            ..Default::default()
        }
    }

    /// Fold one page in. Returns `true` when another fetch is needed.
    pub fn absorb(&mut self, page: Page) -> bool {
        self.pages += 1;
        let Page { mut items, cursor } = page;
        let wants_more = match self.remaining {
            None => true,
            Some(remaining) => remaining > items.len(),
        };

        match cursor {
            Some(cursor) if wants_more => {
                self.remaining = self.remaining.map(|remaining| remaining - items.len());
                self.cursor = Some(cursor);
                self.accumulated.append(&mut items);
                true
            }
            _ => {
                let take = self.remaining.unwrap_or(items.len());
                items.truncate(take);
                self.accumulated.append(&mut items);
                self.cursor = None;
                false
            }
        }
    }
}

/// Read `request` to exhaustion or until `limit` items are collected.
#[instrument(skip(backend, request), fields(engine = backend.engine()))]
pub async fn resolve<B>(
    backend: &B,
    request: &B::PageRequest,
    limit: Option<usize>,
) -> Result<Vec<Record>, StorageError>
where
    B: StoreBackend + ?Sized,
{
    let mut state = PaginationState::new(limit);
    loop {
        let page = backend.fetch_page(request, state.cursor.as_ref()).await?;
        debug!(
            page = state.pages + 1,
            items = page.items.len(),
            has_cursor = page.cursor.is_some(),
            remaining = ?state.remaining,
            "Fetched page"
        );
        if !state.absorb(page) {
            break;
        }
    }
    crate::metrics::record_pages(backend.engine(), state.pages);
    Ok(state.accumulated)
}
