use serde::{Deserialize, Serialize};

use crate::geometry::{Point, PointF, Rect, RectF, Size, SizeF};

pub const POINTS_PER_INCH: f64 = 72.0;

/// Screen resolution and zoom used to map points onto pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub dpi_x: f64,
    pub dpi_y: f64,
    pub zoom: f64,
    pub device_pixel_ratio: f64,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            dpi_x: POINTS_PER_INCH,
            dpi_y: POINTS_PER_INCH,
            zoom: 1.0,
            device_pixel_ratio: 1.0,
        }
    }
}

impl Resolution {
    pub fn new(dpi_x: f64, dpi_y: f64, zoom: f64) -> Self {
        Self {
            dpi_x,
            dpi_y,
            zoom,
            device_pixel_ratio: 1.0,
        }
    }

    pub fn with_device_pixel_ratio(self, device_pixel_ratio: f64) -> Self {
        Self {
            device_pixel_ratio,
            ..self
        }
    }

    /// Horizontal DPI a bitmap must be rendered at to look sharp on screen.
    pub fn render_dpi_x(&self) -> f64 {
        self.dpi_x * self.zoom * self.device_pixel_ratio
    }

    pub fn render_dpi_y(&self) -> f64 {
        self.dpi_y * self.zoom * self.device_pixel_ratio
    }

    pub fn point_to_pixels(&self, point: PointF) -> Point {
        Point::new(
            to_pixels(point.x, self.dpi_x, self.zoom),
            to_pixels(point.y, self.dpi_y, self.zoom),
        )
    }

    pub fn size_to_pixels(&self, size: SizeF) -> Size {
        Size::new(
            to_pixels(size.width, self.dpi_x, self.zoom),
            to_pixels(size.height, self.dpi_y, self.zoom),
        )
    }

    pub fn rect_to_pixels(&self, rect: RectF) -> Rect {
        Rect::new(
            to_pixels(rect.x, self.dpi_x, self.zoom),
            to_pixels(rect.y, self.dpi_y, self.zoom),
            to_pixels(rect.width, self.dpi_x, self.zoom),
            to_pixels(rect.height, self.dpi_y, self.zoom),
        )
    }

    pub fn point_to_points(&self, point: Point) -> PointF {
        PointF::new(
            to_points(point.x, self.dpi_x, self.zoom),
            to_points(point.y, self.dpi_y, self.zoom),
        )
    }

    pub fn size_to_points(&self, size: Size) -> SizeF {
        SizeF::new(
            to_points(size.width, self.dpi_x, self.zoom),
            to_points(size.height, self.dpi_y, self.zoom),
        )
    }

    pub fn rect_to_points(&self, rect: Rect) -> RectF {
        RectF::new(
            to_points(rect.x, self.dpi_x, self.zoom),
            to_points(rect.y, self.dpi_y, self.zoom),
            to_points(rect.width, self.dpi_x, self.zoom),
            to_points(rect.height, self.dpi_y, self.zoom),
        )
    }
}

pub fn to_pixels(points: f64, dpi: f64, zoom: f64) -> i32 {
    let pixels = (points * dpi * zoom / POINTS_PER_INCH).trunc();
    if !pixels.is_finite() {
        0
    } else {
        pixels.clamp(i32::MIN as f64, i32::MAX as f64) as i32
    }
}

pub fn to_points(pixels: i32, dpi: f64, zoom: f64) -> f64 {
    let scale = dpi * zoom;
    if scale <= 0.0 || !scale.is_finite() {
        return 0.0;
    }
    f64::from(pixels) * POINTS_PER_INCH / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn one_inch_at_96_dpi_is_96_pixels() {
        let res = Resolution::new(96.0, 96.0, 1.0);
        assert_eq!(res.size_to_pixels(SizeF::new(72.0, 144.0)), Size::new(96, 192));
    }

    #[test]
    fn zoom_scales_both_axes() {
        let res = Resolution::new(72.0, 144.0, 2.0);
        let rect = res.rect_to_pixels(RectF::new(10.0, 10.0, 36.0, 36.0));
        assert_eq!(rect, Rect::new(20, 40, 72, 144));
    }

    #[test]
    fn pixel_conversion_truncates() {
        assert_eq!(to_pixels(10.9, 72.0, 1.0), 10);
        assert_eq!(to_pixels(-10.9, 72.0, 1.0), -10);
    }

    #[test]
    fn degenerate_scale_maps_to_origin() {
        assert_eq!(to_points(100, 0.0, 1.0), 0.0);
        assert_eq!(to_points(100, 96.0, 0.0), 0.0);
    }

    #[test]
    fn render_dpi_includes_device_pixel_ratio() {
        let res = Resolution::new(96.0, 96.0, 1.5).with_device_pixel_ratio(2.0);
        assert_eq!(res.render_dpi_x(), 288.0);
        assert_eq!(res.render_dpi_y(), 288.0);
    }

    proptest! {
        #[test]
        fn round_trip_stays_within_one_pixel(
            x in -5000.0f64..5000.0,
            y in -5000.0f64..5000.0,
            w in 0.0f64..2000.0,
            h in 0.0f64..2000.0,
            dpi in 50.0f64..300.0,
            zoom in 0.1f64..4.0,
        ) {
            let res = Resolution::new(dpi, dpi, zoom);
            let rect = RectF::new(x, y, w, h);
            let back = res.rect_to_points(res.rect_to_pixels(rect));
            let tolerance = POINTS_PER_INCH / (dpi * zoom) + 1e-6;
            prop_assert!((back.x - rect.x).abs() <= tolerance);
            prop_assert!((back.y - rect.y).abs() <= tolerance);
            prop_assert!((back.width - rect.width).abs() <= tolerance);
            prop_assert!((back.height - rect.height).abs() <= tolerance);
        }

        #[test]
        fn round_trip_within_one_point_at_screen_resolution(
            x in 0.0f64..5000.0,
            w in 0.0f64..2000.0,
            zoom in 1.0f64..4.0,
        ) {
            let res = Resolution::new(96.0, 96.0, zoom);
            let rect = RectF::new(x, x, w, w);
            let back = res.rect_to_points(res.rect_to_pixels(rect));
            prop_assert!((back.x - rect.x).abs() <= 1.0);
            prop_assert!((back.width - rect.width).abs() <= 1.0);
        }
    }
}
