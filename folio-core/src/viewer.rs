use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::cache::PageCache;
use crate::config::{clamp_zoom, ViewerConfig, ZoomMode};
use crate::document::{Document, SearchFlags};
use crate::geometry::{Point, RectF, Size};
use crate::history::{HistoryEntry, HistoryStack};
use crate::prefetch::Prefetcher;
use crate::search::{MatchLocation, SearchEngine, SearchEvent};
use crate::viewport::{
    destination_rect, Modifiers, MouseButton, ViewEvent, ViewportController,
};

#[derive(Clone)]
pub struct ViewerContext {
    pub document: Arc<dyn Document>,
    pub cache: Arc<PageCache>,
    pub prefetcher: Prefetcher,
    pub config: Arc<ViewerConfig>,
}

impl ViewerContext {
    pub fn new(document: Arc<dyn Document>, config: ViewerConfig) -> Self {
        let resolution = config.resolution(clamp_zoom(config.zoom));
        let cache = Arc::new(PageCache::with_max_cost(
            Arc::clone(&document),
            resolution,
            config.cache_max_cost,
        ));
        let prefetcher = Prefetcher::new(Arc::clone(&cache));
        Self {
            document,
            cache,
            prefetcher,
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage,
    PrevPage,
    Advance,
    StepBack,
    GotoPage { page: usize },
    GotoDestination { name: String },
    ScrollBy { dx: i32, dy: i32 },
    SetZoom { factor: f64 },
    ScaleBy { factor: f64 },
    SetZoomMode { mode: ZoomMode },
    ToggleFacingPages,
    Resize { size: Size },
    HistoryBack,
    HistoryForward,
    Find { text: String, flags: SearchFlags },
    NextMatch,
    PreviousMatch,
}

pub struct Viewer {
    context: ViewerContext,
    viewport: ViewportController,
    search: SearchEngine,
    history: HistoryStack,
    search_events: Vec<SearchEvent>,
}

impl Viewer {
    pub fn new(context: ViewerContext, viewport: Size) -> Self {
        let controller = ViewportController::new(&context, viewport);
        let search = SearchEngine::new(
            Arc::clone(&context.document),
            context.config.search_batch_pages,
        );
        let history = HistoryStack::new(context.config.history_limit);
        Self {
            context,
            viewport: controller,
            search,
            history,
            search_events: Vec::new(),
        }
    }

    pub fn context(&self) -> &ViewerContext {
        &self.context
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    pub fn search(&self) -> &SearchEngine {
        &self.search
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn current_page(&self) -> Option<usize> {
        self.viewport.current_page()
    }

    pub fn apply(&mut self, command: Command, now: Instant) {
        match command {
            Command::NextPage => self.viewport.goto_next_page(now),
            Command::PrevPage => self.viewport.goto_previous_page(now),
            Command::Advance => self.viewport.advance(),
            Command::StepBack => self.viewport.step_back(),
            Command::GotoPage { page } => self.jump(page, RectF::default(), false, now),
            Command::GotoDestination { name } => {
                self.goto_destination(&name, now);
            }
            Command::ScrollBy { dx, dy } => {
                self.viewport.scroll_by(dx, dy);
            }
            Command::SetZoom { factor } => self.viewport.set_zoom(factor, now),
            Command::ScaleBy { factor } => {
                let zoom = self.viewport.zoom() * factor;
                self.viewport.set_zoom(zoom, now);
            }
            Command::SetZoomMode { mode } => self.viewport.set_zoom_mode(mode, now),
            Command::ToggleFacingPages => {
                let facing = !self.viewport.double_sided();
                self.viewport.set_double_sided(facing, now);
            }
            Command::Resize { size } => self.viewport.resize(size, now),
            Command::HistoryBack => {
                self.history_back(now);
            }
            Command::HistoryForward => {
                self.history_forward(now);
            }
            Command::Find { text, flags } => self.find(&text, flags, now),
            Command::NextMatch => {
                self.next_match(now);
            }
            Command::PreviousMatch => {
                self.previous_match(now);
            }
        }
    }

    /// Runs one slice of pending work: a search tick and the viewport timers.
    /// Returns `true` while there is something new to show.
    pub fn pump(&mut self, now: Instant) -> bool {
        let mut busy = false;
        if let Some(tick) = self.search.pending_tick() {
            busy = self.search.run_tick(tick);
            self.route_search_events(true, now);
        }
        let repaint = self.viewport.poll_timers(now);
        busy || repaint
    }

    pub fn goto_page(
        &mut self,
        page: usize,
        rect: RectF,
        highlight: bool,
        downwards: bool,
        now: Instant,
    ) {
        self.viewport
            .goto_page(page, rect, highlight, downwards, now);
    }

    /// Navigates to `rect` of `page`, recording where the jump started.
    fn jump(&mut self, page: usize, rect: RectF, highlight: bool, now: Instant) {
        if page >= self.viewport.page_count() {
            debug!(page, "ignoring jump to page out of range");
            return;
        }
        if let Some((origin, visible)) = self.viewport.location() {
            self.history.add_page(origin, visible);
        }
        self.history.add_page(page, rect);
        self.viewport.goto_page(page, rect, highlight, true, now);
    }

    pub fn goto_destination(&mut self, name: &str, now: Instant) -> bool {
        let Some((page, rect)) = self.resolve_destination(name) else {
            return false;
        };
        if let Some((origin, visible)) = self.viewport.location() {
            self.history.add_page(origin, visible);
        }
        self.history.add_destination(name);
        self.viewport.goto_page(page, rect, true, true, now);
        true
    }

    fn resolve_destination(&self, name: &str) -> Option<(usize, RectF)> {
        let destination = match self.context.document.link_destination(name) {
            Ok(Some(destination)) => destination,
            Ok(None) => {
                debug!(name, "unknown destination");
                return None;
            }
            Err(err) => {
                warn!(?err, name, "failed to resolve destination");
                return None;
            }
        };
        let Some(page_rect) = self.viewport.layout().page_rect(destination.page) else {
            debug!(name, page = destination.page, "destination outside the document");
            return None;
        };
        Some((destination.page, destination_rect(&destination, page_rect.size())))
    }

    pub fn history_back(&mut self, now: Instant) -> bool {
        match self.history.previous().cloned() {
            Some(entry) => {
                self.visit(&entry, now);
                true
            }
            None => false,
        }
    }

    pub fn history_forward(&mut self, now: Instant) -> bool {
        match self.history.next().cloned() {
            Some(entry) => {
                self.visit(&entry, now);
                true
            }
            None => false,
        }
    }

    fn visit(&mut self, entry: &HistoryEntry, now: Instant) {
        match entry {
            HistoryEntry::Page { page, rect } => {
                self.viewport.goto_page(*page, *rect, false, true, now);
            }
            HistoryEntry::Destination(name) => {
                if let Some((page, rect)) = self.resolve_destination(name) {
                    self.viewport.goto_page(page, rect, true, true, now);
                }
            }
        }
    }

    pub fn find(&mut self, text: &str, flags: SearchFlags, now: Instant) {
        self.search
            .find(text, flags, self.viewport.current_page());
        // A repeated find steps to the next match like `next_match`.
        let record = self.search.is_scanning();
        self.route_search_events(record, now);
    }

    pub fn next_match(&mut self, now: Instant) -> Option<MatchLocation> {
        let location = self.search.next_match();
        self.route_search_events(false, now);
        location
    }

    pub fn previous_match(&mut self, now: Instant) -> Option<MatchLocation> {
        let location = self.search.previous_match();
        self.route_search_events(false, now);
        location
    }

    /// Moves search events to the caller's queue, navigating to highlighted
    /// matches on the way. Only the first match a scan lands on is recorded
    /// in history; stepping between matches is not.
    fn route_search_events(&mut self, record: bool, now: Instant) {
        for event in self.search.drain_events() {
            if let SearchEvent::HighlightMatch { page, rect } = event {
                if record {
                    self.jump(page, rect, true, now);
                } else {
                    self.viewport.goto_page(page, rect, true, true, now);
                }
            }
            self.search_events.push(event);
        }
    }

    pub fn set_zoom(&mut self, factor: f64, now: Instant) {
        self.viewport.set_zoom(factor, now);
    }

    pub fn set_zoom_mode(&mut self, mode: ZoomMode, now: Instant) {
        self.viewport.set_zoom_mode(mode, now);
    }

    pub fn mouse_press(&mut self, position: Point, button: MouseButton, modifiers: Modifiers) {
        self.viewport.mouse_press(position, button, modifiers);
    }

    pub fn mouse_move(&mut self, position: Point) {
        self.viewport.mouse_move(position);
    }

    pub fn mouse_release(&mut self, position: Point, now: Instant) {
        self.viewport
            .mouse_release(position, &mut self.history, now);
    }

    pub fn drain_view_events(&mut self) -> Vec<ViewEvent> {
        self.viewport.drain_events()
    }

    pub fn drain_search_events(&mut self) -> Vec<SearchEvent> {
        std::mem::take(&mut self.search_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Destination;
    use crate::geometry::PointF;
    use crate::testing::FakeDocument;

    fn viewer(document: FakeDocument) -> Viewer {
        let config = ViewerConfig {
            dpi_x: 72.0,
            dpi_y: 72.0,
            zoom_mode: ZoomMode::Absolute,
            prefetch_distance: 0,
            ..ViewerConfig::default()
        };
        Viewer::new(
            ViewerContext::new(Arc::new(document), config),
            Size::new(612, 800),
        )
    }

    fn pump_until_idle(viewer: &mut Viewer, now: Instant) {
        while viewer.search().is_scanning() {
            viewer.pump(now);
        }
    }

    #[test]
    fn commands_navigate_pages() {
        let now = Instant::now();
        let mut viewer = viewer(FakeDocument::letter(6));
        viewer.apply(Command::NextPage, now);
        assert_eq!(viewer.current_page(), Some(1));
        viewer.apply(Command::GotoPage { page: 4 }, now);
        assert_eq!(viewer.current_page(), Some(4));
        viewer.apply(Command::PrevPage, now);
        assert_eq!(viewer.current_page(), Some(3));
        viewer.apply(Command::GotoPage { page: 60 }, now);
        assert_eq!(viewer.current_page(), Some(3));

        let events = viewer.drain_view_events();
        assert!(events.contains(&ViewEvent::PageRequested(4)));
        assert!(events.contains(&ViewEvent::PageChanged(Some(3))));
    }

    #[test]
    fn zoom_commands() {
        let now = Instant::now();
        let mut viewer = viewer(FakeDocument::letter(2));
        viewer.apply(Command::SetZoom { factor: 1.5 }, now);
        viewer.apply(Command::ScaleBy { factor: 2.0 }, now);
        assert_eq!(viewer.viewport().zoom(), 3.0);
        viewer.apply(
            Command::SetZoomMode {
                mode: ZoomMode::FitWidth,
            },
            now,
        );
        assert!((viewer.viewport().zoom() - 1.0).abs() < 1e-9);
        viewer.apply(Command::ToggleFacingPages, now);
        assert!(viewer.viewport().double_sided());
    }

    #[test]
    fn search_match_is_navigated_and_recorded() {
        let now = Instant::now();
        let rect = RectF::new(72.0, 300.0, 40.0, 12.0);
        let mut viewer = viewer(FakeDocument::letter(10).with_word(4, rect, "foo"));

        viewer.find("foo", SearchFlags::default(), now);
        pump_until_idle(&mut viewer, now);

        assert_eq!(viewer.current_page(), Some(4));
        assert!(viewer.viewport().highlight_frame(now).is_some());
        let events = viewer.drain_search_events();
        let highlight = events
            .iter()
            .position(|e| matches!(e, SearchEvent::HighlightMatch { page: 4, .. }))
            .unwrap();
        let finished = events
            .iter()
            .position(|e| *e == SearchEvent::Finished)
            .unwrap();
        assert!(highlight < finished);

        assert!(viewer.history_back(now));
        assert_eq!(viewer.current_page(), Some(0));
        assert!(viewer.history_forward(now));
        assert_eq!(viewer.current_page(), Some(4));
    }

    #[test]
    fn next_match_moves_the_view() {
        let now = Instant::now();
        let mut viewer = viewer(
            FakeDocument::letter(8)
                .with_word(2, RectF::new(72.0, 72.0, 40.0, 12.0), "foo")
                .with_word(6, RectF::new(72.0, 72.0, 40.0, 12.0), "foo"),
        );
        viewer.apply(
            Command::Find {
                text: "foo".to_string(),
                flags: SearchFlags::default(),
            },
            now,
        );
        pump_until_idle(&mut viewer, now);
        assert_eq!(viewer.current_page(), Some(2));

        let location = viewer.next_match(now).unwrap();
        assert_eq!((location.page, location.ordinal), (6, 2));
        assert_eq!(viewer.current_page(), Some(6));
        viewer.apply(Command::PreviousMatch, now);
        assert_eq!(viewer.current_page(), Some(2));
    }

    #[test]
    fn stepping_through_matches_does_not_grow_history() {
        let now = Instant::now();
        let mut document = FakeDocument::letter(12);
        for page in [2, 5, 9] {
            document = document.with_word(page, RectF::new(72.0, 72.0, 40.0, 12.0), "foo");
        }
        let mut viewer = viewer(document);
        viewer.find("foo", SearchFlags::default(), now);
        pump_until_idle(&mut viewer, now);
        assert_eq!(viewer.current_page(), Some(2));
        let recorded = viewer.history().len();
        assert_eq!(recorded, 2);

        for _ in 0..5 {
            viewer.next_match(now);
        }
        viewer.previous_match(now);
        viewer.find("foo", SearchFlags::default(), now);
        assert_eq!(viewer.search().current_index(), 3);
        assert_eq!(viewer.current_page(), Some(9));
        assert_eq!(viewer.history().len(), recorded);

        assert!(viewer.history_back(now));
        assert_eq!(viewer.current_page(), Some(0));
    }

    #[test]
    fn named_destinations_use_history() {
        let now = Instant::now();
        let destination = Destination {
            page: 3,
            offset: Some(PointF::new(0.0, 50.0)),
        };
        let mut viewer = viewer(FakeDocument::letter(6).with_destination("chapter-2", destination));

        assert!(viewer.goto_destination("chapter-2", now));
        assert_eq!(viewer.current_page(), Some(3));
        assert_eq!(
            viewer.history().current(),
            Some(&HistoryEntry::Destination("chapter-2".to_string()))
        );

        viewer.apply(Command::HistoryBack, now);
        assert_eq!(viewer.current_page(), Some(0));
        viewer.apply(Command::HistoryForward, now);
        assert_eq!(viewer.current_page(), Some(3));
        assert!(!viewer.history_forward(now));
    }

    #[test]
    fn unknown_destination_is_ignored() {
        let now = Instant::now();
        let mut viewer = viewer(FakeDocument::letter(3));
        assert!(!viewer.goto_destination("missing", now));
        assert!(viewer.history().is_empty());
        assert_eq!(viewer.current_page(), Some(0));
    }

    #[test]
    fn pump_fires_deferred_cache_refresh() {
        let now = Instant::now();
        let mut viewer = viewer(FakeDocument::letter(3));
        viewer.set_zoom(2.0, now);
        assert!(!viewer.pump(now));
        assert!(viewer.pump(now + viewer.context().config.invalidate_delay));
        assert_eq!(viewer.context().cache.resolution().zoom, 2.0);
    }
}
