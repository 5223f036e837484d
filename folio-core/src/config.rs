use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::cache::DEFAULT_MAX_COST;
use crate::coords::Resolution;
use crate::error::ConfigError;
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::layout::DEFAULT_PAGE_SPACING;

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 4.0;
pub const MAX_GOTO_MARGIN: i32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZoomMode {
    #[default]
    FitWidth,
    FitPage,
    Absolute,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub dpi_x: f64,
    pub dpi_y: f64,
    pub device_pixel_ratio: f64,
    pub zoom_mode: ZoomMode,
    pub zoom: f64,
    pub double_sided: bool,
    pub page_spacing: f64,
    pub cache_max_cost: usize,
    pub prefetch_distance: usize,
    pub search_batch_pages: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub invalidate_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub highlight_duration: Duration,
    pub goto_margin: i32,
    pub history_limit: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            dpi_x: 96.0,
            dpi_y: 96.0,
            device_pixel_ratio: 1.0,
            zoom_mode: ZoomMode::FitWidth,
            zoom: 1.0,
            double_sided: false,
            page_spacing: DEFAULT_PAGE_SPACING,
            cache_max_cost: DEFAULT_MAX_COST,
            prefetch_distance: 3,
            search_batch_pages: 20,
            invalidate_delay: Duration::from_millis(100),
            highlight_duration: Duration::from_secs(1),
            goto_margin: 100,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, falling back to defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(positive(self.dpi_x) && positive(self.dpi_y)) {
            return Err(ConfigError::Invalid(format!(
                "dpi must be positive, got {}x{}",
                self.dpi_x, self.dpi_y
            )));
        }
        if !positive(self.device_pixel_ratio) {
            return Err(ConfigError::Invalid(format!(
                "device_pixel_ratio must be positive, got {}",
                self.device_pixel_ratio
            )));
        }
        if !(self.page_spacing >= 0.0 && self.page_spacing.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "page_spacing must be a non-negative number, got {}",
                self.page_spacing
            )));
        }
        if !(0..=MAX_GOTO_MARGIN).contains(&self.goto_margin) {
            return Err(ConfigError::Invalid(format!(
                "goto_margin must be within 0..={}, got {}",
                MAX_GOTO_MARGIN, self.goto_margin
            )));
        }
        if self.search_batch_pages == 0 {
            return Err(ConfigError::Invalid(
                "search_batch_pages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resolution(&self, zoom: f64) -> Resolution {
        Resolution::new(self.dpi_x, self.dpi_y, zoom)
            .with_device_pixel_ratio(self.device_pixel_ratio)
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}
