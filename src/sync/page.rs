use anyhow::Result;

use crate::db::ProjectStore;
use crate::model::Project;

/// Walks the project registry in fixed-size pages.
///
/// The total is read once when the fetcher starts; paging stops when the
/// offset reaches it, even if the registry changes underneath.
pub struct PageFetcher<'a> {
    store: &'a dyn ProjectStore,
    page_size: u32,
    total: u64,
    offset: u64,
}

impl<'a> PageFetcher<'a> {
    pub async fn start(store: &'a dyn ProjectStore, page_size: u32) -> Result<Self> {
        anyhow::ensure!(page_size > 0, "page size must be > 0");
        let total = store.count().await?;
        Ok(Self {
            store,
            page_size,
            total,
            offset: 0,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Read the page starting at `offset`.
    pub async fn fetch_page(&self, offset: u64) -> Result<Vec<Project>> {
        self.store.find_page(offset, self.page_size).await
    }

    /// Fetch the next page, or `None` once the total is exhausted. A failed
    /// read still advances the offset.
    pub async fn next_page(&mut self) -> Option<(u64, Result<Vec<Project>>)> {
        if self.offset >= self.total {
            return None;
        }
        let offset = self.offset;
        self.offset += u64::from(self.page_size);
        Some((offset, self.fetch_page(offset).await))
    }
}
