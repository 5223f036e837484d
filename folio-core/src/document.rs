use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::geometry::{NormalizedRect, PointF, RectF, SizeF};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    pub dpi_x: f64,
    pub dpi_y: f64,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct SearchFlags {
    pub case_sensitive: bool,
    pub whole_word: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub page: usize,
    /// Page-local position (points) to bring to the top-left of the viewport.
    pub offset: Option<PointF>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LinkTarget {
    Goto(Destination),
    Browse { url: String },
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub boundary: NormalizedRect,
    pub target: LinkTarget,
}

/// The page-rendering library as seen by the viewer core.
///
/// All rectangles are page-local points with a top-left origin. Implementations
/// must be safe to call from the prefetch workers as well as the UI thread.
pub trait Document: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn num_pages(&self) -> usize {
        self.info().page_count
    }

    fn page_size(&self, index: usize) -> Option<SizeF>;
    fn links(&self, index: usize) -> Result<Vec<Link>>;
    fn render_page(&self, index: usize, dpi_x: f64, dpi_y: f64) -> Result<RenderedPage>;
    fn search_page_text(&self, index: usize, query: &str, flags: SearchFlags)
        -> Result<Vec<RectF>>;
    fn page_text(&self, index: usize, rect: RectF) -> Result<String>;
    fn link_destination(&self, name: &str) -> Result<Option<Destination>>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn Document>>;
}
