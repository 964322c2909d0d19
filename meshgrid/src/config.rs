//! Configuration types for the mesh grid engine.
//!
//! A flat [`MeshConfig`] describes the tile geometry and worker pool; each
//! optional post-processing step carries its own section. Every struct has a
//! `Default` and a `validate()` that reports configuration errors before any
//! work starts.

use serde::{Deserialize, Serialize};

use crate::convolve::Kernel;
use crate::error::{Error, Result};
use crate::interpolate::MIN_ACCEPTABLE_NEAREST;

// ============================================================================
// Enums
// ============================================================================

/// Whether a post-processing step is confined to channels or spans the image.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum Scope {
    /// Neighbors are only taken from the tile's own channel.
    #[default]
    Channel,
    /// Channel boundaries are ignored.
    FullImage,
}

/// Neighborhood statistic used by the smoothing engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum SmoothMethod {
    /// Arithmetic mean of the valid tiles in the window.
    #[default]
    Mean,
    /// Median of the valid tiles in the window, robust to single bad tiles.
    Median,
}

// ============================================================================
// Interpolation
// ============================================================================

/// Nearest-neighbor interpolation of invalid tiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Number of nearest valid tiles whose median replaces an invalid tile.
    pub num_nearest: usize,
    /// Minimum mode quantile of the neighbor set for it to be trusted.
    /// Untrusted sets widen the search; 0 disables the check.
    pub min_mode_quantile: f32,
    /// Only fill tiles that hold no data, leave rejected tiles untouched.
    pub only_blank: bool,
    pub scope: Scope,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            num_nearest: 8,
            min_mode_quantile: 0.0,
            only_blank: false,
            scope: Scope::Channel,
        }
    }
}

impl InterpolationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_nearest < MIN_ACCEPTABLE_NEAREST {
            return Err(Error::InvalidNumNearest {
                num_nearest: self.num_nearest,
                min: MIN_ACCEPTABLE_NEAREST,
            });
        }
        validate_quantile("min_mode_quantile", self.min_mode_quantile)
    }
}

// ============================================================================
// Smoothing
// ============================================================================

/// Box smoothing over a square window of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Window side in tiles, odd. Width 1 leaves the grid unchanged.
    pub width: usize,
    pub method: SmoothMethod,
    pub scope: Scope,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            width: 3,
            method: SmoothMethod::Mean,
            scope: Scope::Channel,
        }
    }
}

impl SmoothingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.width % 2 == 0 {
            return Err(Error::InvalidSmoothWidth(self.width));
        }
        Ok(())
    }
}

// ============================================================================
// Convolution
// ============================================================================

/// Kernel convolution of the tile values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvolutionConfig {
    pub kernel: Kernel,
    pub scope: Scope,
    /// After a channel-confined pass, recompute the tiles along channel seams
    /// so the result matches a whole-image convolution.
    #[serde(default)]
    pub full_after_channels: bool,
}

impl ConvolutionConfig {
    pub fn new(kernel: Kernel, scope: Scope) -> Self {
        Self {
            kernel,
            scope,
            full_after_channels: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.kernel.validate()
    }
}

// ============================================================================
// Mesh configuration
// ============================================================================

/// Complete configuration of a mesh grid run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    // Geometry
    /// Nominal side of a tile in pixels.
    pub mesh_size: usize,
    /// Tolerated size of the remainder folded into the last tile of each
    /// channel row/column, as a fraction of `mesh_size`. Larger remainders
    /// are still folded, with a warning.
    pub last_mesh_frac: f32,
    /// Channels along the image width (first FITS axis).
    pub channels_x: usize,
    /// Channels along the image height.
    pub channels_y: usize,

    // Workers
    pub num_threads: usize,

    // Diagnostics
    /// Check images use one pixel per tile instead of the full image size.
    pub mesh_based_check: bool,

    // Post-processing, each step runs only when present.
    pub interpolation: Option<InterpolationConfig>,
    pub smoothing: Option<SmoothingConfig>,
    pub convolution: Option<ConvolutionConfig>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            mesh_size: 32,
            last_mesh_frac: 0.51,
            channels_x: 1,
            channels_y: 1,
            num_threads: default_num_threads(),
            mesh_based_check: false,
            interpolation: Some(InterpolationConfig::default()),
            smoothing: None,
            convolution: None,
        }
    }
}

impl MeshConfig {
    /// Geometry-only configuration with no post-processing steps.
    pub fn with_geometry(mesh_size: usize, channels_x: usize, channels_y: usize) -> Self {
        Self {
            mesh_size,
            channels_x,
            channels_y,
            interpolation: None,
            ..Default::default()
        }
    }

    /// Checks everything that does not depend on the image size.
    pub fn validate(&self) -> Result<()> {
        if self.mesh_size == 0 {
            return Err(Error::InvalidMeshSize(self.mesh_size));
        }
        if !(0.0..1.0).contains(&self.last_mesh_frac) {
            return Err(Error::InvalidLastMeshFraction(self.last_mesh_frac));
        }
        if self.channels_x == 0 {
            return Err(Error::ZeroChannels { axis: "width" });
        }
        if self.channels_y == 0 {
            return Err(Error::ZeroChannels { axis: "height" });
        }
        if self.num_threads == 0 {
            return Err(Error::InvalidThreadCount);
        }
        if let Some(interpolation) = &self.interpolation {
            interpolation.validate()?;
        }
        if let Some(smoothing) = &self.smoothing {
            smoothing.validate()?;
        }
        if let Some(convolution) = &self.convolution {
            convolution.validate()?;
        }
        Ok(())
    }
}

fn default_num_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn validate_quantile(name: &'static str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidQuantile { name, value });
    }
    Ok(())
}
