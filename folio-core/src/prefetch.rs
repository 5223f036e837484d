use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::cache::PageCache;

/// Renders pages into the cache on the rayon pool, off the UI thread.
#[derive(Clone)]
pub struct Prefetcher {
    cache: Arc<PageCache>,
    in_flight: Arc<Mutex<HashSet<usize>>>,
}

impl Prefetcher {
    pub fn new(cache: Arc<PageCache>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Queues `pages` for rendering, skipping ones already cached or queued.
    /// Returns the pages actually queued.
    pub fn request(&self, pages: &[usize]) -> Vec<usize> {
        let queued: Vec<usize> = {
            let mut in_flight = self.in_flight.lock();
            pages
                .iter()
                .copied()
                .filter(|&page| !self.cache.contains(page) && in_flight.insert(page))
                .collect()
        };
        if queued.is_empty() {
            return queued;
        }

        trace!(?queued, "prefetching pages");
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let pages = queued.clone();
        rayon::spawn(move || {
            for page in pages {
                let _ = cache.get(page);
                in_flight.lock().remove(&page);
            }
        });
        queued
    }

    pub fn pending(&self) -> usize {
        self.in_flight.lock().len()
    }
}
