use std::ops::Range;

use crate::geometry::{RectF, SizeF};

pub const DEFAULT_PAGE_SPACING: f64 = 10.0;

/// Page rectangles (points) of the whole document laid out top to bottom.
///
/// In facing mode page 0 stands alone and the remaining pages are paired as
/// (1, 2), (3, 4), ... side by side. Every row is centered horizontally in the
/// layout width and its pages share the same top edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    rects: Vec<RectF>,
    rows: Vec<Range<usize>>,
    size: SizeF,
    double_sided: bool,
}

impl PageLayout {
    pub fn compute(page_sizes: &[SizeF], double_sided: bool, spacing: f64) -> Self {
        let rows = row_ranges(page_sizes.len(), double_sided);
        let row_width = |row: &Range<usize>| -> f64 {
            let pages = &page_sizes[row.clone()];
            let widths: f64 = pages.iter().map(|size| size.width.max(0.0)).sum();
            widths + spacing * (pages.len().saturating_sub(1)) as f64
        };

        let layout_width = rows.iter().map(row_width).fold(0.0, f64::max);
        let mut rects = Vec::with_capacity(page_sizes.len());
        let mut y = 0.0;
        for (row_index, row) in rows.iter().enumerate() {
            if row_index > 0 {
                y += spacing;
            }
            let mut x = (layout_width - row_width(row)) / 2.0;
            let mut row_height: f64 = 0.0;
            for size in &page_sizes[row.clone()] {
                let width = size.width.max(0.0);
                let height = size.height.max(0.0);
                rects.push(RectF::new(x, y, width, height));
                x += width + spacing;
                row_height = row_height.max(height);
            }
            y += row_height;
        }

        Self {
            rects,
            rows,
            size: SizeF::new(layout_width, y),
            double_sided,
        }
    }

    pub fn page_count(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn double_sided(&self) -> bool {
        self.double_sided
    }

    pub fn size(&self) -> SizeF {
        self.size
    }

    pub fn page_rect(&self, page: usize) -> Option<RectF> {
        self.rects.get(page).copied()
    }

    pub fn page_rects(&self) -> &[RectF] {
        &self.rects
    }

    pub fn rows(&self) -> &[Range<usize>] {
        &self.rows
    }

    pub fn row_of(&self, page: usize) -> Option<usize> {
        if page >= self.rects.len() {
            return None;
        }
        self.rows.iter().position(|row| row.contains(&page))
    }

    pub fn row_rect(&self, page: usize) -> Option<RectF> {
        let row = self.rows.get(self.row_of(page)?)?;
        let first = self.rects[row.start];
        let last = self.rects[row.end - 1];
        let height = self.rects[row.clone()]
            .iter()
            .map(|rect| rect.height)
            .fold(0.0, f64::max);
        Some(RectF::new(first.x, first.y, last.right() - first.x, height))
    }

    /// Size the fit-width and fit-page zoom modes scale against.
    ///
    /// Single mode uses the first page; facing mode uses the widest row so a pair
    /// fits side by side.
    pub fn reference_size(&self) -> Option<SizeF> {
        let first = self.rects.first()?;
        if self.double_sided {
            Some(SizeF::new(self.size.width, first.height))
        } else {
            Some(first.size())
        }
    }
}

fn row_ranges(page_count: usize, double_sided: bool) -> Vec<Range<usize>> {
    if !double_sided {
        return (0..page_count).map(|page| page..page + 1).collect();
    }
    let mut rows = Vec::with_capacity(page_count / 2 + 1);
    if page_count > 0 {
        rows.push(0..1);
    }
    let mut start = 1;
    while start < page_count {
        let end = (start + 2).min(page_count);
        rows.push(start..end);
        start = end;
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter_pages(count: usize) -> Vec<SizeF> {
        vec![SizeF::new(612.0, 792.0); count]
    }

    #[test]
    fn single_mode_stacks_pages_vertically() {
        let layout = PageLayout::compute(&letter_pages(3), false, 10.0);
        assert_eq!(layout.page_rect(0), Some(RectF::new(0.0, 0.0, 612.0, 792.0)));
        assert_eq!(layout.page_rect(1), Some(RectF::new(0.0, 802.0, 612.0, 792.0)));
        assert_eq!(layout.page_rect(2), Some(RectF::new(0.0, 1604.0, 612.0, 792.0)));
        assert_eq!(layout.size(), SizeF::new(612.0, 2396.0));
    }

    #[test]
    fn page_rects_are_monotonic_and_disjoint() {
        let sizes = vec![
            SizeF::new(612.0, 792.0),
            SizeF::new(300.0, 400.0),
            SizeF::new(800.0, 600.0),
            SizeF::new(612.0, 792.0),
            SizeF::new(612.0, 792.0),
        ];
        for double_sided in [false, true] {
            let layout = PageLayout::compute(&sizes, double_sided, 10.0);
            let rects = layout.page_rects();
            for pair in rects.windows(2) {
                assert!(pair[1].y >= pair[0].y);
                assert!(!pair[0].intersects(&pair[1]));
            }
        }
    }

    #[test]
    fn facing_mode_pairs_after_first_page() {
        let layout = PageLayout::compute(&letter_pages(5), true, 10.0);
        assert_eq!(layout.rows(), &[0..1, 1..3, 3..5]);

        let first = layout.page_rect(0).unwrap();
        let left = layout.page_rect(1).unwrap();
        let right = layout.page_rect(2).unwrap();
        assert_eq!(left.y, right.y);
        assert!(left.right() < right.left());
        assert!(first.bottom() < left.top());
        assert_eq!(layout.row_of(4), Some(2));
        assert_eq!(layout.size().width, 612.0 * 2.0 + 10.0);
        // the lone first page is centered over the pair
        assert_eq!(first.x, (layout.size().width - 612.0) / 2.0);
    }

    #[test]
    fn facing_mode_odd_tail_stands_alone() {
        let layout = PageLayout::compute(&letter_pages(4), true, 10.0);
        assert_eq!(layout.rows(), &[0..1, 1..3, 3..4]);
    }

    #[test]
    fn facing_reference_size_spans_the_pair() {
        let layout = PageLayout::compute(&letter_pages(3), true, 10.0);
        assert_eq!(layout.reference_size(), Some(SizeF::new(1234.0, 792.0)));
        let single = PageLayout::compute(&letter_pages(3), false, 10.0);
        assert_eq!(single.reference_size(), Some(SizeF::new(612.0, 792.0)));
    }

    #[test]
    fn row_rect_covers_both_pages() {
        let layout = PageLayout::compute(&letter_pages(3), true, 10.0);
        let row = layout.row_rect(2).unwrap();
        assert_eq!(row.x, 0.0);
        assert_eq!(row.width, 1234.0);
    }

    #[test]
    fn empty_document_has_empty_layout() {
        let layout = PageLayout::compute(&[], true, 10.0);
        assert!(layout.is_empty());
        assert_eq!(layout.size(), SizeF::default());
        assert_eq!(layout.reference_size(), None);
        assert_eq!(layout.row_of(0), None);
    }
}
