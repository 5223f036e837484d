use std::path::Path;

use anyhow::{anyhow, Context, Result};
use folio_core::{NormalizedRect, RectF, RenderedPage};
use image::{ImageFormat, RgbaImage};

#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumProvider;

/// Converts PDF user-space edges (bottom-left origin) into a page-local
/// rectangle with a top-left origin.
pub fn top_left_rect(left: f32, top: f32, right: f32, bottom: f32, page_height: f32) -> RectF {
    RectF::new(
        f64::from(left),
        f64::from(page_height - top),
        f64::from((right - left).max(0.0)),
        f64::from((top - bottom).max(0.0)),
    )
}

pub fn pdf_edges(rect: RectF, page_height: f32) -> (f32, f32, f32, f32) {
    let top = page_height - rect.top() as f32;
    let bottom = page_height - rect.bottom() as f32;
    (bottom, rect.left() as f32, top, rect.right() as f32)
}

pub fn normalized_rect(
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    page_width: f32,
    page_height: f32,
) -> NormalizedRect {
    NormalizedRect {
        left: f64::from((left / page_width).clamp(0.0, 1.0)),
        top: f64::from((1.0 - top / page_height).clamp(0.0, 1.0)),
        right: f64::from((right / page_width).clamp(0.0, 1.0)),
        bottom: f64::from((1.0 - bottom / page_height).clamp(0.0, 1.0)),
    }
    .clamp()
}

pub fn save_png(page: &RenderedPage, path: &Path) -> Result<()> {
    let image = RgbaImage::from_raw(page.width, page.height, page.pixels.clone()).ok_or_else(
        || {
            anyhow!(
                "bitmap for page {} does not match {}x{}",
                page.page_index,
                page.width,
                page.height
            )
        },
    )?;
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pdf_edges_flip_the_vertical_axis() {
        let rect = top_left_rect(72.0, 720.0, 144.0, 700.0, 792.0);
        assert_eq!(rect, RectF::new(72.0, 72.0, 72.0, 20.0));
        assert_eq!(pdf_edges(rect, 792.0), (700.0, 72.0, 720.0, 144.0));
    }

    #[test]
    fn normalized_rect_is_top_down() {
        let rect = normalized_rect(0.0, 792.0, 306.0, 396.0, 612.0, 792.0);
        assert_eq!(rect.left, 0.0);
        assert_eq!(rect.top, 0.0);
        assert_eq!(rect.right, 0.5);
        assert_eq!(rect.bottom, 0.5);
        assert!(rect.is_valid());
    }

    #[test]
    fn save_png_writes_a_readable_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.png");
        let page = RenderedPage {
            page_index: 0,
            width: 2,
            height: 2,
            dpi_x: 72.0,
            dpi_y: 72.0,
            pixels: vec![255; 16],
        };
        save_png(&page, &path).unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (2, 2));
    }

    #[test]
    fn save_png_rejects_short_buffers() {
        let dir = tempdir().unwrap();
        let page = RenderedPage {
            page_index: 3,
            width: 10,
            height: 10,
            dpi_x: 72.0,
            dpi_y: 72.0,
            pixels: vec![0; 4],
        };
        assert!(save_png(&page, &dir.path().join("bad.png")).is_err());
    }
}
