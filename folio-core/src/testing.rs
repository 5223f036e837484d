use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

use crate::document::{
    Destination, Document, DocumentInfo, DocumentMetadata, Link, RenderedPage, SearchFlags,
};
use crate::geometry::{RectF, SizeF};

pub struct FakeDocument {
    info: DocumentInfo,
    sizes: Vec<SizeF>,
    words: HashMap<usize, Vec<(RectF, String)>>,
    links: HashMap<usize, Vec<Link>>,
    destinations: HashMap<String, Destination>,
    failing: Mutex<HashSet<usize>>,
    renders: AtomicUsize,
    render_gate: RwLock<()>,
    searches: Mutex<Vec<usize>>,
}

impl FakeDocument {
    pub fn new(sizes: Vec<SizeF>) -> Self {
        Self {
            info: DocumentInfo {
                path: PathBuf::from("/tmp/fake.pdf"),
                page_count: sizes.len(),
                metadata: DocumentMetadata::default(),
            },
            sizes,
            words: HashMap::new(),
            links: HashMap::new(),
            destinations: HashMap::new(),
            failing: Mutex::new(HashSet::new()),
            renders: AtomicUsize::new(0),
            render_gate: RwLock::new(()),
            searches: Mutex::new(Vec::new()),
        }
    }

    /// `count` US-letter pages (612 x 792 points).
    pub fn letter(count: usize) -> Self {
        Self::new(vec![SizeF::new(612.0, 792.0); count])
    }

    pub fn with_word(mut self, page: usize, rect: RectF, word: &str) -> Self {
        self.words
            .entry(page)
            .or_default()
            .push((rect, word.to_string()));
        self
    }

    pub fn with_link(mut self, page: usize, link: Link) -> Self {
        self.links.entry(page).or_default().push(link);
        self
    }

    pub fn with_destination(mut self, name: &str, destination: Destination) -> Self {
        self.destinations.insert(name.to_string(), destination);
        self
    }

    pub fn fail_render(&self, page: usize) {
        self.failing.lock().insert(page);
    }

    /// Renders block while the returned guard is alive. They are counted
    /// before blocking.
    pub fn hold_renders(&self) -> RwLockWriteGuard<'_, ()> {
        self.render_gate.write()
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    /// Pages passed to `search_page_text`, in call order.
    pub fn searched_pages(&self) -> Vec<usize> {
        self.searches.lock().clone()
    }
}

/// Polls `done` until it holds or five seconds pass.
pub fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

fn matches_word(word: &str, query: &str, flags: SearchFlags) -> bool {
    let (word, query) = if flags.case_sensitive {
        (word.to_string(), query.to_string())
    } else {
        (word.to_lowercase(), query.to_lowercase())
    };
    if flags.whole_word {
        word == query
    } else {
        word.contains(&query)
    }
}

impl Document for FakeDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, index: usize) -> Option<SizeF> {
        self.sizes.get(index).copied()
    }

    fn links(&self, index: usize) -> Result<Vec<Link>> {
        Ok(self.links.get(&index).cloned().unwrap_or_default())
    }

    fn render_page(&self, index: usize, dpi_x: f64, dpi_y: f64) -> Result<RenderedPage> {
        let size = self
            .sizes
            .get(index)
            .ok_or_else(|| anyhow!("page {} out of range", index))?;
        if self.failing.lock().contains(&index) {
            return Err(anyhow!("page {} failed to render", index));
        }
        self.renders.fetch_add(1, Ordering::SeqCst);
        let _gate = self.render_gate.read();
        Ok(RenderedPage {
            page_index: index,
            width: (size.width * dpi_x / 72.0).round() as u32,
            height: (size.height * dpi_y / 72.0).round() as u32,
            dpi_x,
            dpi_y,
            pixels: vec![index as u8; 4],
        })
    }

    fn search_page_text(
        &self,
        index: usize,
        query: &str,
        flags: SearchFlags,
    ) -> Result<Vec<RectF>> {
        self.searches.lock().push(index);
        Ok(self
            .words
            .get(&index)
            .map(|words| {
                words
                    .iter()
                    .filter(|(_, word)| matches_word(word, query, flags))
                    .map(|(rect, _)| *rect)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn page_text(&self, index: usize, rect: RectF) -> Result<String> {
        Ok(self
            .words
            .get(&index)
            .map(|words| {
                words
                    .iter()
                    .filter(|(word_rect, _)| word_rect.intersects(&rect))
                    .map(|(_, word)| word.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default())
    }

    fn link_destination(&self, name: &str) -> Result<Option<Destination>> {
        Ok(self.destinations.get(name).cloned())
    }
}
