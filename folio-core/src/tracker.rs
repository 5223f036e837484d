use crate::coords::Resolution;
use crate::geometry::{Point, PointF, Rect, RectF, Size};
use crate::layout::PageLayout;

#[derive(Debug, Clone)]
pub struct CurrentPageTracker {
    layout: PageLayout,
    resolution: Resolution,
    viewport: Size,
    offset: Point,
    current: Option<usize>,
}

impl CurrentPageTracker {
    pub fn new(layout: PageLayout, resolution: Resolution, viewport: Size) -> Self {
        let mut tracker = Self {
            layout,
            resolution,
            viewport,
            offset: Point::default(),
            current: None,
        };
        tracker.update();
        tracker
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn viewport_size(&self) -> Size {
        self.viewport
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn current_page(&self) -> Option<usize> {
        self.current
    }

    pub fn set_layout(&mut self, layout: PageLayout) {
        self.layout = layout;
        self.clamp_offset();
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = resolution;
        self.clamp_offset();
    }

    pub fn set_viewport_size(&mut self, viewport: Size) {
        self.viewport = Size::new(viewport.width.max(0), viewport.height.max(0));
        self.clamp_offset();
    }

    pub fn set_offset(&mut self, offset: Point) -> bool {
        let range = self.scroll_range();
        let clamped = Point::new(
            offset.x.clamp(0, range.width),
            offset.y.clamp(0, range.height),
        );
        let moved = clamped != self.offset;
        self.offset = clamped;
        moved
    }

    fn clamp_offset(&mut self) {
        self.set_offset(self.offset);
    }

    pub fn layout_pixel_size(&self) -> Size {
        self.resolution.size_to_pixels(self.layout.size())
    }

    pub fn scroll_range(&self) -> Size {
        let content = self.layout_pixel_size();
        Size::new(
            (content.width - self.viewport.width).max(0),
            (content.height - self.viewport.height).max(0),
        )
    }

    /// Offset of the viewport's top-left corner in layout pixels.
    ///
    /// Negative along an axis where the content is smaller than the viewport,
    /// which centers the content.
    pub fn internal_offset(&self) -> Point {
        let content = self.layout_pixel_size();
        let axis = |content: i32, viewport: i32, offset: i32| {
            if content < viewport {
                -((viewport - content) / 2)
            } else {
                offset
            }
        };
        Point::new(
            axis(content.width, self.viewport.width, self.offset.x),
            axis(content.height, self.viewport.height, self.offset.y),
        )
    }

    pub fn viewport_rect(&self) -> Rect {
        let origin = self.internal_offset();
        Rect::new(origin.x, origin.y, self.viewport.width, self.viewport.height)
    }

    pub fn viewport_rect_points(&self) -> RectF {
        self.resolution.rect_to_points(self.viewport_rect())
    }

    pub fn page_pixel_rect(&self, page: usize) -> Option<Rect> {
        self.layout
            .page_rect(page)
            .map(|rect| self.resolution.rect_to_pixels(rect))
    }

    pub fn page_viewport_rect(&self, page: usize) -> Option<Rect> {
        let origin = self.internal_offset();
        self.page_pixel_rect(page)
            .map(|rect| rect.translated(-origin.x, -origin.y))
    }

    pub fn visible_pages(&self, viewport: RectF) -> Vec<usize> {
        self.layout
            .page_rects()
            .iter()
            .enumerate()
            .filter(|(_, rect)| rect.intersects(&viewport))
            .map(|(page, _)| page)
            .collect()
    }

    /// The page with the largest overlap with `viewport`, ties going to the
    /// topmost page. Falls back to the page nearest the viewport's vertical
    /// center when nothing overlaps.
    pub fn current_page_in(&self, viewport: RectF) -> Option<usize> {
        let rects = self.layout.page_rects();
        if rects.is_empty() {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        for (page, rect) in rects.iter().enumerate() {
            let overlap = rect.intersected(&viewport).area();
            if overlap > 0.0 && best.map_or(true, |(_, area)| overlap > area) {
                best = Some((page, overlap));
            }
        }
        if let Some((page, _)) = best {
            return Some(page);
        }

        let center = viewport.center().y;
        let mut nearest = (0, f64::INFINITY);
        for (page, rect) in rects.iter().enumerate() {
            let distance = if center < rect.top() {
                rect.top() - center
            } else if center > rect.bottom() {
                center - rect.bottom()
            } else {
                0.0
            };
            if distance < nearest.1 {
                nearest = (page, distance);
            }
        }
        Some(nearest.0)
    }

    pub fn update(&mut self) -> bool {
        let current = self.current_page_in(self.viewport_rect_points());
        let changed = current != self.current;
        self.current = current;
        changed
    }

    pub fn set_current(&mut self, page: usize) -> bool {
        if page >= self.layout.page_count() || self.current == Some(page) {
            return false;
        }
        self.current = Some(page);
        true
    }

    pub fn page_at(&self, position: Point) -> Option<(usize, PointF)> {
        let origin = self.internal_offset();
        let layout_point = self
            .resolution
            .point_to_points(Point::new(position.x + origin.x, position.y + origin.y));
        self.layout
            .page_rects()
            .iter()
            .position(|rect| rect.contains(layout_point))
            .and_then(|page| {
                let rect = self.layout.page_rect(page)?;
                Some((
                    page,
                    PointF::new(layout_point.x - rect.x, layout_point.y - rect.y),
                ))
            })
    }

    /// Pages worth rendering ahead of time: up to `distance` after the visible
    /// range, then up to `distance` before it, nearest first.
    pub fn prefetch_candidates(&self, distance: usize) -> Vec<usize> {
        let count = self.layout.page_count();
        if distance == 0 || count == 0 {
            return Vec::new();
        }
        let visible = self.visible_pages(self.viewport_rect_points());
        let (first, last) = match (visible.first(), visible.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => match self.current {
                Some(page) => (page, page),
                None => return Vec::new(),
            },
        };

        let after = (last + 1..count).take(distance);
        let before = (first.saturating_sub(distance)..first).rev();
        after.chain(before).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SizeF;

    fn tracker(pages: usize, double_sided: bool, viewport: Size) -> CurrentPageTracker {
        let layout = PageLayout::compute(
            &vec![SizeF::new(612.0, 792.0); pages],
            double_sided,
            10.0,
        );
        CurrentPageTracker::new(layout, Resolution::new(72.0, 72.0, 1.0), viewport)
    }

    #[test]
    fn visible_pages_intersecting_viewport() {
        let mut tracker = tracker(5, false, Size::new(612, 900));
        assert_eq!(tracker.visible_pages(tracker.viewport_rect_points()), vec![0, 1]);
        tracker.set_offset(Point::new(0, 1700));
        assert_eq!(tracker.visible_pages(tracker.viewport_rect_points()), vec![2, 3]);
    }

    #[test]
    fn current_page_maximizes_overlap() {
        let mut tracker = tracker(5, false, Size::new(612, 800));
        assert_eq!(tracker.current_page(), Some(0));
        // page 0 spans 0..792, page 1 spans 802..1594
        tracker.set_offset(Point::new(0, 500));
        tracker.update();
        assert_eq!(tracker.current_page(), Some(1));
        tracker.set_offset(Point::new(0, 300));
        tracker.update();
        assert_eq!(tracker.current_page(), Some(0));
    }

    #[test]
    fn equal_overlap_prefers_topmost() {
        let tracker = tracker(3, false, Size::new(612, 800));
        // 100 points of page 0 and 100 points of page 1
        let viewport = RectF::new(0.0, 692.0, 612.0, 210.0);
        assert_eq!(tracker.current_page_in(viewport), Some(0));
    }

    #[test]
    fn current_page_is_clamped_outside_the_layout() {
        let tracker = tracker(3, false, Size::new(612, 800));
        let above = RectF::new(0.0, -5000.0, 612.0, 100.0);
        let below = RectF::new(0.0, 50_000.0, 612.0, 100.0);
        assert_eq!(tracker.current_page_in(above), Some(0));
        assert_eq!(tracker.current_page_in(below), Some(2));
    }

    #[test]
    fn scroll_range_and_centering() {
        let mut tracker = tracker(2, false, Size::new(1000, 500));
        assert_eq!(tracker.scroll_range(), Size::new(0, 1594 - 500));
        assert_eq!(tracker.internal_offset().x, -194);
        tracker.set_offset(Point::new(300, 10_000));
        assert_eq!(tracker.offset(), Point::new(0, 1094));
    }

    #[test]
    fn page_at_returns_page_local_points() {
        let mut tracker = tracker(3, false, Size::new(612, 800));
        tracker.set_offset(Point::new(0, 802));
        let (page, local) = tracker.page_at(Point::new(100, 50)).unwrap();
        assert_eq!(page, 1);
        assert_eq!(local, PointF::new(100.0, 50.0));
        // the gap between pages belongs to no page
        tracker.set_offset(Point::new(0, 0));
        assert!(tracker.page_at(Point::new(100, 795)).is_none());
    }

    #[test]
    fn prefetch_surrounds_visible_range() {
        let mut tracker = tracker(20, false, Size::new(612, 800));
        tracker.set_offset(Point::new(0, 802 * 10));
        tracker.update();
        assert_eq!(tracker.visible_pages(tracker.viewport_rect_points()), vec![10]);
        assert_eq!(tracker.prefetch_candidates(3), vec![11, 12, 13, 9, 8, 7]);

        tracker.set_offset(Point::new(0, 0));
        assert_eq!(tracker.prefetch_candidates(3), vec![1, 2, 3]);
    }

    #[test]
    fn empty_document_is_neutral() {
        let tracker = tracker(0, false, Size::new(800, 600));
        assert_eq!(tracker.current_page(), None);
        assert_eq!(tracker.offset(), Point::default());
        assert_eq!(tracker.scroll_range(), Size::default());
        assert!(tracker.visible_pages(tracker.viewport_rect_points()).is_empty());
        assert!(tracker.prefetch_candidates(3).is_empty());
        assert!(tracker.page_at(Point::new(10, 10)).is_none());
    }
}
