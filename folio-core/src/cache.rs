use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::coords::Resolution;
use crate::document::{Document, RenderedPage};

pub const DEFAULT_MAX_COST: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub cost: usize,
    pub max_cost: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: HashMap<usize, Arc<RenderedPage>>,
    lru: VecDeque<usize>,
    resolution: Resolution,
    /// Bumped on every invalidation; renders started under an older generation
    /// are returned to their caller but never inserted.
    generation: u64,
    /// Same guard for single-page invalidation.
    page_epochs: HashMap<usize, u64>,
    stats: CacheStats,
}

impl CacheState {
    fn touch(&mut self, page: usize) {
        self.lru.retain(|&p| p != page);
        self.lru.push_back(page);
    }

    fn evict_to_fit(&mut self, incoming: usize) {
        while self.entries.len() + incoming > self.stats.max_cost {
            let Some(page) = self.lru.pop_front() else {
                break;
            };
            if self.entries.remove(&page).is_some() {
                self.stats.evictions += 1;
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.page_epochs.clear();
        self.generation += 1;
    }

    fn epoch(&self, page: usize) -> u64 {
        self.page_epochs.get(&page).copied().unwrap_or(0)
    }

    fn refresh_stats(&mut self) {
        self.stats.entries = self.entries.len();
        self.stats.cost = self.entries.len();
    }
}

/// Page bitmap cache shared between the UI thread and prefetch workers.
///
/// Each page costs one unit. Rendering happens outside the lock; the result is
/// inserted under a fresh acquisition, so the lock is never re-entered.
pub struct PageCache {
    document: Arc<dyn Document>,
    state: Mutex<CacheState>,
}

impl PageCache {
    pub fn new(document: Arc<dyn Document>, resolution: Resolution) -> Self {
        Self::with_max_cost(document, resolution, DEFAULT_MAX_COST)
    }

    pub fn with_max_cost(
        document: Arc<dyn Document>,
        resolution: Resolution,
        max_cost: usize,
    ) -> Self {
        Self {
            document,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                lru: VecDeque::new(),
                resolution,
                generation: 0,
                page_epochs: HashMap::new(),
                stats: CacheStats {
                    max_cost: max_cost.max(1),
                    ..CacheStats::default()
                },
            }),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.state.lock().resolution
    }

    pub fn set_resolution(&self, resolution: Resolution) {
        let mut state = self.state.lock();
        if state.resolution != resolution {
            state.resolution = resolution;
            state.clear();
            state.refresh_stats();
        }
    }

    /// Returns the bitmap for `page`, rendering it on a miss.
    ///
    /// `None` means the page could not be rendered; callers skip the image and
    /// still draw the page frame.
    #[instrument(skip(self))]
    pub fn get(&self, page: usize) -> Option<Arc<RenderedPage>> {
        if page >= self.document.num_pages() {
            debug!(page, "ignoring cache lookup for page out of range");
            return None;
        }

        let (resolution, generation, epoch) = {
            let mut state = self.state.lock();
            if let Some(image) = state.entries.get(&page).cloned() {
                state.touch(page);
                state.stats.hits += 1;
                return Some(image);
            }
            state.stats.misses += 1;
            (state.resolution, state.generation, state.epoch(page))
        };

        let image = match self.document.render_page(
            page,
            resolution.render_dpi_x(),
            resolution.render_dpi_y(),
        ) {
            Ok(image) => Arc::new(image),
            Err(err) => {
                warn!(?err, page, "failed to render page");
                return None;
            }
        };

        let mut state = self.state.lock();
        if state.generation != generation || state.epoch(page) != epoch {
            debug!(page, "dropping render finished after invalidation");
            return Some(image);
        }
        if let Some(existing) = state.entries.get(&page).cloned() {
            state.touch(page);
            return Some(existing);
        }
        state.evict_to_fit(1);
        state.entries.insert(page, Arc::clone(&image));
        state.touch(page);
        state.refresh_stats();
        Some(image)
    }

    pub fn contains(&self, page: usize) -> bool {
        self.state.lock().entries.contains_key(&page)
    }

    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.clear();
        state.refresh_stats();
    }

    pub fn invalidate_page(&self, page: usize) {
        let mut state = self.state.lock();
        *state.page_epochs.entry(page).or_insert(0) += 1;
        if state.entries.remove(&page).is_some() {
            state.lru.retain(|&p| p != page);
            state.refresh_stats();
        }
    }

    pub fn resident_pages(&self) -> Vec<usize> {
        self.state.lock().lru.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }
}
