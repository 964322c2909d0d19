//! Meshgrid - tiled per-tile statistics over large images.
//!
//! An image is split into channels (independent readout regions) and each
//! channel into a regular grid of tiles. A [`TileOperation`] is run on every
//! tile by a fixed-size worker pool, giving one or two values per tile in a
//! [`GridStore`]. Tiles the operation could not measure are then filled by
//! nearest-neighbor interpolation, and the grid can be smoothed and
//! convolved, either channel by channel or across the whole image.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use meshgrid::{ImageView, MeshConfig, MeshPipeline, SigmaClipStats};
//!
//! let image = ImageView::float(&pixels, width, height)?;
//! let pipeline = MeshPipeline::new(MeshConfig::default())?;
//! let output = pipeline.run(image, &SigmaClipStats::default())?;
//!
//! for failure in &output.failures {
//!     eprintln!("tile {} left invalid: {}", failure.tile, failure.reason);
//! }
//! ```

pub mod config;
pub mod convolve;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod image;
pub mod interpolate;
pub mod ops;
pub mod pipeline;
pub mod smooth;
pub mod statistics;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Geometry and input
// ============================================================================

pub use error::{Error, Result};
pub use geometry::{MeshGrid, Rect, Tile, TileType};
pub use image::{nan_is_blank, never_blank, BlankPredicate, ImageView, Pixel, TileView};

// ============================================================================
// Configuration
// ============================================================================

pub use config::{
    ConvolutionConfig, InterpolationConfig, MeshConfig, Scope, SmoothMethod, SmoothingConfig,
};

// ============================================================================
// Population
// ============================================================================

pub use dispatch::{Dispatcher, TileOperation, TileResult};
pub use ops::SigmaClipStats;
pub use store::{GridStore, Layout, TileStatus};

// ============================================================================
// Post-processing
// ============================================================================

pub use convolve::{
    change_to_full_convolution, change_to_full_image_convolution, convolve, convolve_image,
    ChannelBorders, Kernel,
};
pub use interpolate::{
    interpolate, FailureReason, InterpolationFailure, InterpolationOutcome,
};
pub use smooth::smooth;

// ============================================================================
// Output
// ============================================================================

pub use diagnostics::{AffineWcs, GridTable, GridTableRow, PixelToWorld};
pub use pipeline::{MeshPipeline, PipelineOutput};
