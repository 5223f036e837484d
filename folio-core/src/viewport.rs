use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::cache::PageCache;
use crate::config::{clamp_zoom, ViewerConfig, ZoomMode};
use crate::coords::POINTS_PER_INCH;
use crate::debounce::Debouncer;
use crate::document::{Destination, Document, Link, LinkTarget, RenderedPage};
use crate::geometry::{Point, PointF, Rect, RectF, Size, SizeF};
use crate::history::HistoryStack;
use crate::layout::PageLayout;
use crate::prefetch::Prefetcher;
use crate::tracker::CurrentPageTracker;
use crate::viewer::ViewerContext;

/// Highest step, in points, tried when looking for text near a highlight.
const MAX_HIGHLIGHT_PROBE: u32 = 99;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    ZoomChanged(f64),
    PageChanged(Option<usize>),
    PageRequested(usize),
    CursorChanged(CursorShape),
    /// The pointer should be moved to this viewport position.
    WarpCursor(Point),
    OpenUrl(String),
    TextSelected {
        page: usize,
        rect: RectF,
        text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Arrow,
    PointingHand,
    ClosedHand,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        control: false,
    };

    fn selects_text(&self) -> bool {
        self.shift || self.control
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    Panning {
        last: Point,
    },
    RubberBanding {
        page: usize,
        origin: Point,
        current: Point,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Highlight {
    page: usize,
    rect: RectF,
    started: Instant,
}

#[derive(Debug, Clone)]
pub struct PagePaint {
    pub page: usize,
    pub frame: Rect,
    /// `None` when the page could not be rendered; draw the frame only.
    pub image: Option<Arc<RenderedPage>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightFrame {
    pub page: usize,
    pub frame: Rect,
    pub progress: u8,
}

/// Page-local rectangle a destination asks to bring into view.
///
/// A destination with an offset covers the page from that point to its
/// bottom-right corner; without one the whole page is meant (empty rect).
pub fn destination_rect(destination: &Destination, page_size: SizeF) -> RectF {
    match destination.offset {
        Some(offset) => RectF::new(
            offset.x,
            offset.y,
            (page_size.width - offset.x).max(0.0),
            (page_size.height - offset.y).max(0.0),
        ),
        None => RectF::default(),
    }
}

pub struct ViewportController {
    document: Arc<dyn Document>,
    cache: Arc<PageCache>,
    prefetcher: Prefetcher,
    config: Arc<ViewerConfig>,
    page_sizes: Vec<SizeF>,
    tracker: CurrentPageTracker,
    zoom_mode: ZoomMode,
    zoom: f64,
    double_sided: bool,
    interaction: Interaction,
    pressed_link: Option<Link>,
    cursor: CursorShape,
    links: HashMap<usize, Vec<Link>>,
    invalidate: Debouncer,
    highlight: Option<Highlight>,
    events: Vec<ViewEvent>,
}

impl ViewportController {
    pub fn new(context: &ViewerContext, viewport: Size) -> Self {
        let config = Arc::clone(&context.config);
        let document = Arc::clone(&context.document);
        let page_sizes: Vec<SizeF> = (0..document.num_pages())
            .map(|page| document.page_size(page).unwrap_or_default())
            .collect();
        let layout = PageLayout::compute(&page_sizes, config.double_sided, config.page_spacing);
        let zoom = clamp_zoom(config.zoom);
        let tracker = CurrentPageTracker::new(layout, config.resolution(zoom), viewport);

        let mut controller = Self {
            document,
            cache: Arc::clone(&context.cache),
            prefetcher: context.prefetcher.clone(),
            page_sizes,
            tracker,
            zoom_mode: config.zoom_mode,
            zoom,
            double_sided: config.double_sided,
            interaction: Interaction::Idle,
            pressed_link: None,
            cursor: CursorShape::Arrow,
            links: HashMap::new(),
            invalidate: Debouncer::new(config.invalidate_delay),
            highlight: None,
            events: Vec::new(),
            config,
        };
        if let Some(zoom) = controller.fit_zoom() {
            controller.zoom = zoom;
            controller
                .tracker
                .set_resolution(controller.config.resolution(zoom));
        }
        controller.tracker.update();
        controller.cache.set_resolution(controller.tracker.resolution());
        controller
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn zoom_mode(&self) -> ZoomMode {
        self.zoom_mode
    }

    pub fn double_sided(&self) -> bool {
        self.double_sided
    }

    pub fn current_page(&self) -> Option<usize> {
        self.tracker.current_page()
    }

    pub fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    pub fn tracker(&self) -> &CurrentPageTracker {
        &self.tracker
    }

    pub fn layout(&self) -> &PageLayout {
        self.tracker.layout()
    }

    pub fn offset(&self) -> Point {
        self.tracker.offset()
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    pub fn cursor_shape(&self) -> CursorShape {
        self.cursor
    }

    pub fn drain_events(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.events)
    }

    /// The current page and the part of it inside the viewport, in
    /// page-local points.
    pub fn location(&self) -> Option<(usize, RectF)> {
        let page = self.tracker.current_page()?;
        let page_rect = self.tracker.layout().page_rect(page)?;
        let visible = self
            .tracker
            .viewport_rect_points()
            .intersected(&page_rect)
            .translated(-page_rect.x, -page_rect.y);
        Some((page, visible))
    }

    pub fn set_zoom(&mut self, factor: f64, now: Instant) {
        self.zoom_mode = ZoomMode::Absolute;
        self.apply_zoom(clamp_zoom(factor), now);
    }

    pub fn set_zoom_mode(&mut self, mode: ZoomMode, now: Instant) {
        self.zoom_mode = mode;
        self.refit(now);
    }

    pub fn set_double_sided(&mut self, double_sided: bool, now: Instant) {
        if self.double_sided == double_sided {
            return;
        }
        let current = self.tracker.current_page();
        self.double_sided = double_sided;
        self.tracker.set_layout(PageLayout::compute(
            &self.page_sizes,
            double_sided,
            self.config.page_spacing,
        ));
        self.refit(now);
        if let Some(page) = current {
            self.goto_page(page, RectF::default(), false, true, now);
        }
    }

    pub fn resize(&mut self, viewport: Size, now: Instant) {
        self.tracker.set_viewport_size(viewport);
        self.refit(now);
        self.refresh_current_page();
    }

    fn refit(&mut self, now: Instant) {
        if let Some(zoom) = self.fit_zoom() {
            self.apply_zoom(zoom, now);
        }
    }

    fn fit_zoom(&self) -> Option<f64> {
        let reference = self.tracker.layout().reference_size()?;
        let viewport = self.tracker.viewport_size();
        if reference.is_empty() || viewport.is_empty() {
            return None;
        }
        let width = f64::from(viewport.width) * POINTS_PER_INCH / (reference.width * self.config.dpi_x);
        let height =
            f64::from(viewport.height) * POINTS_PER_INCH / (reference.height * self.config.dpi_y);
        match self.zoom_mode {
            ZoomMode::FitWidth => Some(clamp_zoom(width)),
            ZoomMode::FitPage => Some(clamp_zoom(width.min(height))),
            ZoomMode::Absolute => None,
        }
    }

    fn apply_zoom(&mut self, zoom: f64, now: Instant) {
        if (zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }
        let center = self.tracker.viewport_rect_points().center();
        self.zoom = zoom;
        self.tracker.set_resolution(self.config.resolution(zoom));

        let anchor = self.tracker.resolution().point_to_pixels(center);
        let viewport = self.tracker.viewport_size();
        self.tracker.set_offset(Point::new(
            anchor.x - viewport.width / 2,
            anchor.y - viewport.height / 2,
        ));
        self.invalidate.trigger(now);
        debug!(zoom, mode = ?self.zoom_mode, "zoom changed");
        self.events.push(ViewEvent::ZoomChanged(zoom));
        self.refresh_current_page();
    }

    pub fn scroll_to(&mut self, offset: Point) -> bool {
        let moved = self.tracker.set_offset(offset);
        if moved {
            self.refresh_current_page();
        }
        moved
    }

    pub fn scroll_by(&mut self, dx: i32, dy: i32) -> bool {
        let offset = self.tracker.offset();
        self.scroll_to(Point::new(offset.x + dx, offset.y + dy))
    }

    fn refresh_current_page(&mut self) {
        if self.tracker.update() {
            self.events
                .push(ViewEvent::PageChanged(self.tracker.current_page()));
            self.prefetch();
        }
    }

    fn prefetch(&self) {
        let candidates = self
            .tracker
            .prefetch_candidates(self.config.prefetch_distance);
        self.prefetcher.request(&candidates);
    }

    /// Brings `rect` (page-local points) of `page` into view.
    ///
    /// An empty `rect` means the whole page. With `highlight` set, the
    /// rectangle is nudged vertically onto nearby text and then faded out.
    pub fn goto_page(
        &mut self,
        page: usize,
        rect: RectF,
        highlight: bool,
        downwards: bool,
        now: Instant,
    ) {
        let (Some(page_rect), Some(page_pixels)) = (
            self.tracker.layout().page_rect(page),
            self.tracker.page_pixel_rect(page),
        ) else {
            debug!(page, "ignoring goto for page out of range");
            return;
        };

        let local = if rect.area() > 0.0 {
            rect
        } else {
            RectF::from_origin_size(PointF::default(), page_rect.size())
        };
        let margin = self.config.goto_margin;
        let target = self
            .tracker
            .resolution()
            .rect_to_pixels(local.translated(page_rect.x, page_rect.y))
            .adjusted(
                if local.left() > 0.0 { margin } else { 0 },
                if local.top() > 0.0 { margin } else { 0 },
                margin,
                margin,
            )
            .intersected(&page_pixels);
        let target = if target.is_empty() { page_pixels } else { target };

        self.events.push(ViewEvent::PageRequested(page));
        self.reveal(target);
        if self.tracker.set_current(page) {
            self.events.push(ViewEvent::PageChanged(Some(page)));
            self.prefetch();
        }

        if highlight && rect.area() > 0.0 {
            let rect = self.probe_highlight(page, rect, downwards);
            self.highlight = Some(Highlight {
                page,
                rect,
                started: now,
            });
        }
    }

    fn reveal(&mut self, target: Rect) {
        let view = self.tracker.viewport_rect();
        let viewport = self.tracker.viewport_size();
        let x = if target.width > viewport.width || target.left() < view.left() {
            target.left()
        } else if target.right() > view.right() {
            target.right() - viewport.width
        } else {
            self.tracker.offset().x
        };
        self.tracker.set_offset(Point::new(x, target.top()));
    }

    fn probe_highlight(&self, page: usize, rect: RectF, downwards: bool) -> RectF {
        if !self.text_in(page, rect).trim().is_empty() {
            return rect;
        }
        let direction = if downwards { 1.0 } else { -1.0 };
        (1..=MAX_HIGHLIGHT_PROBE)
            .map(|step| rect.translated(0.0, direction * f64::from(step)))
            .find(|probe| !self.text_in(page, *probe).trim().is_empty())
            .unwrap_or(rect)
    }

    fn text_in(&self, page: usize, rect: RectF) -> String {
        match self.document.page_text(page, rect) {
            Ok(text) => text,
            Err(err) => {
                warn!(?err, page, "failed to extract page text");
                String::new()
            }
        }
    }

    /// In facing mode with no horizontal scrolling a whole row is stepped at
    /// once; otherwise one page.
    pub fn goto_next_page(&mut self, now: Instant) {
        let Some(current) = self.tracker.current_page() else {
            return;
        };
        let target = if self.steps_by_row() {
            let layout = self.tracker.layout();
            layout
                .row_of(current)
                .and_then(|row| layout.rows().get(row + 1))
                .map(|row| row.start)
        } else {
            Some(current + 1)
        };
        if let Some(page) = target {
            self.goto_page(page, RectF::default(), false, true, now);
        }
    }

    pub fn goto_previous_page(&mut self, now: Instant) {
        let Some(current) = self.tracker.current_page() else {
            return;
        };
        let target = if self.steps_by_row() {
            let layout = self.tracker.layout();
            layout
                .row_of(current)
                .and_then(|row| row.checked_sub(1))
                .and_then(|row| layout.rows().get(row))
                .map(|row| row.start)
        } else {
            current.checked_sub(1)
        };
        if let Some(page) = target {
            self.goto_page(page, RectF::default(), false, false, now);
        }
    }

    fn steps_by_row(&self) -> bool {
        self.double_sided && self.tracker.scroll_range().width == 0
    }

    fn current_row_pixels(&self, offset: isize) -> Option<Rect> {
        let layout = self.tracker.layout();
        let row = layout.row_of(self.tracker.current_page()?)?;
        let row = row.checked_add_signed(offset)?;
        let first = layout.rows().get(row)?.start;
        let rect = layout.row_rect(first)?;
        Some(self.tracker.resolution().rect_to_pixels(rect))
    }

    /// Scrolls down by about a screenful without skipping a page edge.
    pub fn advance(&mut self) {
        let Some(row) = self.current_row_pixels(0) else {
            return;
        };
        let view = self.tracker.viewport_rect();
        let offset = self.tracker.offset();
        if view.bottom() >= row.bottom() {
            if let Some(next) = self.current_row_pixels(1) {
                self.scroll_to(Point::new(offset.x, next.top()));
            }
        } else {
            let step = view.height.min(row.bottom() - view.bottom());
            self.scroll_by(0, step);
        }
    }

    pub fn step_back(&mut self) {
        let Some(row) = self.current_row_pixels(0) else {
            return;
        };
        let view = self.tracker.viewport_rect();
        let offset = self.tracker.offset();
        if view.top() <= row.top() {
            if let Some(previous) = self.current_row_pixels(-1) {
                self.scroll_to(Point::new(offset.x, previous.bottom() - view.height));
            }
        } else {
            let step = view.height.min(view.top() - row.top());
            self.scroll_by(0, -step);
        }
    }

    fn link_at(&mut self, position: Point) -> Option<Link> {
        let (page, local) = self.tracker.page_at(position)?;
        let size = self.tracker.layout().page_rect(page)?.size();
        if size.is_empty() {
            return None;
        }
        let (x, y) = (local.x / size.width, local.y / size.height);
        let document = &self.document;
        self.links
            .entry(page)
            .or_insert_with(|| match document.links(page) {
                Ok(links) => links,
                Err(err) => {
                    warn!(?err, page, "failed to load page links");
                    Vec::new()
                }
            })
            .iter()
            .find(|link| link.boundary.contains(x, y))
            .cloned()
    }

    fn set_cursor(&mut self, cursor: CursorShape) {
        if self.cursor != cursor {
            self.cursor = cursor;
            self.events.push(ViewEvent::CursorChanged(cursor));
        }
    }

    fn update_hover(&mut self, position: Point) {
        let cursor = if self.link_at(position).is_some() {
            CursorShape::PointingHand
        } else {
            CursorShape::Arrow
        };
        self.set_cursor(cursor);
    }

    pub fn mouse_press(&mut self, position: Point, button: MouseButton, modifiers: Modifiers) {
        if button == MouseButton::Secondary || modifiers.selects_text() {
            if let Some((page, _)) = self.tracker.page_at(position) {
                self.interaction = Interaction::RubberBanding {
                    page,
                    origin: position,
                    current: position,
                };
                self.set_cursor(CursorShape::Cross);
            }
            return;
        }
        if button != MouseButton::Primary {
            return;
        }

        if let Some(link) = self.link_at(position) {
            self.pressed_link = Some(link);
            self.set_cursor(CursorShape::PointingHand);
            return;
        }
        self.interaction = Interaction::Panning { last: position };
        self.set_cursor(CursorShape::ClosedHand);
    }

    pub fn mouse_move(&mut self, position: Point) {
        match self.interaction {
            Interaction::Idle => self.update_hover(position),
            Interaction::Panning { last } => {
                self.scroll_by(last.x - position.x, last.y - position.y);
                let wrapped = self.wrap_cursor(position);
                if wrapped != position {
                    self.events.push(ViewEvent::WarpCursor(wrapped));
                }
                self.interaction = Interaction::Panning { last: wrapped };
            }
            Interaction::RubberBanding { page, origin, .. } => {
                self.interaction = Interaction::RubberBanding {
                    page,
                    origin,
                    current: self.clamp_to_page(page, position),
                };
            }
        }
    }

    /// Ends the current gesture. Following a goto link records both ends of
    /// the jump in `history`.
    pub fn mouse_release(&mut self, position: Point, history: &mut HistoryStack, now: Instant) {
        match std::mem::take(&mut self.interaction) {
            Interaction::Panning { .. } => self.update_hover(position),
            Interaction::RubberBanding { page, origin, .. } => {
                let current = self.clamp_to_page(page, position);
                self.finish_selection(page, origin, current);
                self.update_hover(position);
            }
            Interaction::Idle => {
                let Some(pressed) = self.pressed_link.take() else {
                    return;
                };
                if self.link_at(position).as_ref() == Some(&pressed) {
                    self.follow_link(pressed.target, history, now);
                }
            }
        }
    }

    fn follow_link(&mut self, target: LinkTarget, history: &mut HistoryStack, now: Instant) {
        match target {
            LinkTarget::Goto(destination) => {
                let Some(page_rect) = self.tracker.layout().page_rect(destination.page) else {
                    debug!(page = destination.page, "link points outside the document");
                    return;
                };
                let rect = destination_rect(&destination, page_rect.size());
                if let Some((page, visible)) = self.location() {
                    history.add_page(page, visible);
                }
                history.add_page(destination.page, rect);
                self.goto_page(destination.page, rect, false, true, now);
            }
            LinkTarget::Browse { url } => {
                debug!(%url, "opening external link");
                self.events.push(ViewEvent::OpenUrl(url));
            }
            LinkTarget::Unsupported => debug!("ignoring unsupported link"),
        }
    }

    fn clamp_to_page(&self, page: usize, position: Point) -> Point {
        self.tracker
            .page_viewport_rect(page)
            .map_or(position, |frame| frame.clamp_point(position))
    }

    fn wrap_cursor(&self, position: Point) -> Point {
        let size = self.tracker.viewport_size();
        let wrap = |value: i32, extent: i32| {
            if extent < 3 {
                value
            } else if value <= 0 {
                extent - 2
            } else if value >= extent - 1 {
                1
            } else {
                value
            }
        };
        Point::new(wrap(position.x, size.width), wrap(position.y, size.height))
    }

    fn finish_selection(&mut self, page: usize, origin: Point, current: Point) {
        let Some(frame) = self.tracker.page_viewport_rect(page) else {
            return;
        };
        let selection = Rect::from_corners(origin, current).translated(-frame.x, -frame.y);
        if selection.is_empty() {
            return;
        }
        let rect = self.tracker.resolution().rect_to_points(selection);
        let text = self.text_in(page, rect);
        trace!(page, ?rect, "text selected");
        self.events
            .push(ViewEvent::TextSelected { page, rect, text });
    }

    pub fn selection_rect(&self) -> Option<Rect> {
        match self.interaction {
            Interaction::RubberBanding {
                origin, current, ..
            } => Some(Rect::from_corners(origin, current)),
            _ => None,
        }
    }

    /// Visible pages with their frames and bitmaps, rendering misses on the
    /// calling thread.
    pub fn paint_plan(&self) -> Vec<PagePaint> {
        self.tracker
            .visible_pages(self.tracker.viewport_rect_points())
            .into_iter()
            .filter_map(|page| {
                Some(PagePaint {
                    page,
                    frame: self.tracker.page_viewport_rect(page)?,
                    image: self.cache.get(page),
                })
            })
            .collect()
    }

    pub fn highlight_frame(&self, now: Instant) -> Option<HighlightFrame> {
        let highlight = self.highlight?;
        let elapsed = now.saturating_duration_since(highlight.started);
        let duration = self.config.highlight_duration;
        if elapsed >= duration {
            return None;
        }
        let page_rect = self.tracker.layout().page_rect(highlight.page)?;
        let origin = self.tracker.internal_offset();
        let frame = self
            .tracker
            .resolution()
            .rect_to_pixels(highlight.rect.translated(page_rect.x, page_rect.y))
            .translated(-origin.x, -origin.y);
        let progress = (elapsed.as_secs_f64() / duration.as_secs_f64() * 100.0) as u8;
        Some(HighlightFrame {
            page: highlight.page,
            frame,
            progress: progress.min(100),
        })
    }

    pub fn poll_timers(&mut self, now: Instant) -> bool {
        let mut repaint = false;
        if self.invalidate.poll(now) {
            debug!(zoom = self.zoom, "refreshing cached pages");
            self.cache.set_resolution(self.tracker.resolution());
            self.prefetch();
            repaint = true;
        }
        if let Some(highlight) = self.highlight {
            if now.saturating_duration_since(highlight.started) >= self.config.highlight_duration {
                self.highlight = None;
                repaint = true;
            }
        }
        repaint
    }
}
