pub mod cache;
pub mod config;
pub mod coords;
pub mod debounce;
pub mod document;
pub mod error;
pub mod geometry;
pub mod history;
pub mod layout;
pub mod prefetch;
pub mod search;
pub mod tracker;
pub mod viewer;
pub mod viewport;

#[cfg(test)]
mod testing;

pub use cache::{CacheStats, PageCache};
pub use config::{ViewerConfig, ZoomMode};
pub use coords::Resolution;
pub use document::{
    Destination, Document, DocumentInfo, DocumentMetadata, DocumentProvider, Link, LinkTarget,
    RenderedPage, SearchFlags,
};
pub use error::ConfigError;
pub use geometry::{NormalizedRect, Point, PointF, Rect, RectF, Size, SizeF};
pub use history::{HistoryEntry, HistoryStack};
pub use layout::PageLayout;
pub use search::{MatchLocation, SearchEngine, SearchEvent};
pub use tracker::CurrentPageTracker;
pub use viewer::{Command, Viewer, ViewerContext};
pub use viewport::{
    CursorShape, HighlightFrame, Interaction, Modifiers, MouseButton, PagePaint, ViewEvent,
    ViewportController,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDocument;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Instant;

    struct FakeProvider;

    #[async_trait]
    impl DocumentProvider for FakeProvider {
        async fn open(&self, _path: &Path) -> anyhow::Result<Arc<dyn Document>> {
            Ok(Arc::new(FakeDocument::letter(12)))
        }
    }

    #[tokio::test]
    async fn provider_opens_into_a_viewer() {
        let document = FakeProvider
            .open(Path::new("/tmp/fake.pdf"))
            .await
            .unwrap();
        assert_eq!(document.num_pages(), 12);

        let context = ViewerContext::new(document, ViewerConfig::default());
        let mut viewer = Viewer::new(context, Size::new(800, 600));
        assert_eq!(viewer.current_page(), Some(0));
        viewer.apply(Command::GotoPage { page: 7 }, Instant::now());
        assert_eq!(viewer.current_page(), Some(7));
    }
}
