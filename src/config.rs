//! Viewer configuration loaded from JSON.

use std::path::Path;

use serde::Deserialize;

use crate::error::{ViewerError, ViewerResult};

/// Fraction of the container width a fit-width page occupies.
const FIT_WIDTH_FRACTION: f64 = 0.9;

/// Narrowest width a fit-width page is laid out at, in pixels.
const MIN_FIT_WIDTH: f64 = 400.0;

/// Render configuration for a document session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Render scale (1.0 = natural page size). With `fit_width` set this is a multiplier
    /// on the fit scale.
    pub scale: f64,
    /// Pages beyond the visible window that are rendered ahead of scrolling.
    pub prefetch_radius: u32,
    /// Rendered pages farther than this from the visible window are evicted.
    pub eviction_distance: u32,
    /// Cap on simultaneously running renders. `None` = unbounded.
    ///
    /// Pages inside the visible window are never held back by the cap.
    pub max_concurrent_renders: Option<usize>,
    /// Worker threads in the render pool (0 = rayon default).
    pub render_threads: usize,
    /// Container width in pixels; when set, pages are scaled to fit it.
    pub fit_width: Option<f64>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scale: 1.2,
            prefetch_radius: 1,
            eviction_distance: 3,
            max_concurrent_renders: None,
            render_threads: 0,
            fit_width: None,
        }
    }
}

impl ViewerConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> ViewerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON configuration. Missing fields take their defaults.
    pub fn from_json(content: &str) -> ViewerResult<Self> {
        let config: ViewerConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ViewerResult<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ViewerError::ConfigError(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        if self.eviction_distance < self.prefetch_radius {
            return Err(ViewerError::ConfigError(format!(
                "eviction_distance ({}) must not be smaller than prefetch_radius ({})",
                self.eviction_distance, self.prefetch_radius
            )));
        }
        if self.max_concurrent_renders == Some(0) {
            return Err(ViewerError::ConfigError(
                "max_concurrent_renders must be at least 1".to_string(),
            ));
        }
        if let Some(width) = self.fit_width {
            if !width.is_finite() || width <= 0.0 {
                return Err(ViewerError::ConfigError(format!(
                    "fit_width must be a positive number, got {width}"
                )));
            }
        }
        Ok(())
    }

    /// Scale used to rasterize a page of the given natural width.
    ///
    /// Falls back to the plain `scale` when either the container or the page width is unknown.
    pub fn effective_scale(&self, page_width: Option<f64>) -> f64 {
        match (self.fit_width, page_width) {
            (Some(container), Some(page)) if page > 0.0 => {
                let target = (container * FIT_WIDTH_FRACTION).max(MIN_FIT_WIDTH);
                target / page * self.scale
            }
            _ => self.scale,
        }
    }
}
