//! Error types for mesh grid operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::store::Layout;

/// Errors that can occur while building or operating on a mesh grid.
///
/// Per-tile statistical failures are never reported here: they travel as
/// invalid tile values through the store and the interpolation outcome.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Image is empty ({width}x{height})")]
    EmptyImage { width: usize, height: usize },

    #[error("Image buffer holds {actual} pixels, expected {width}x{height}")]
    ImageSizeMismatch {
        width: usize,
        height: usize,
        actual: usize,
    },

    #[error("Number of channels along {axis} must be positive")]
    ZeroChannels { axis: &'static str },

    #[error("Image {axis} of {size} pixels is not divisible by {channels} channels")]
    ChannelsNotDivisible {
        axis: &'static str,
        size: usize,
        channels: usize,
    },

    #[error("Mesh size must be positive, got {0}")]
    InvalidMeshSize(usize),

    #[error(
        "Mesh size {mesh_size} is larger than the channel size ({channel_width}x{channel_height})"
    )]
    MeshLargerThanChannel {
        mesh_size: usize,
        channel_width: usize,
        channel_height: usize,
    },

    #[error("Last mesh fraction must be in [0, 1), got {0}")]
    InvalidLastMeshFraction(f32),

    #[error("Kernel must have odd, non-zero width and height, got {width}x{height}")]
    InvalidKernel { width: usize, height: usize },

    #[error("Kernel holds {actual} values, expected {width}x{height}")]
    KernelSizeMismatch {
        width: usize,
        height: usize,
        actual: usize,
    },

    #[error("Kernel value at index {index} is not finite: {value}")]
    NonFiniteKernel { index: usize, value: f32 },

    #[error("Gaussian kernel sigma must be positive and finite, got {0}")]
    InvalidKernelSigma(f32),

    #[error("Smoothing width must be a positive odd number, got {0}")]
    InvalidSmoothWidth(usize),

    #[error("Number of nearest neighbors must be at least {min}, got {num_nearest}")]
    InvalidNumNearest { num_nearest: usize, min: usize },

    #[error("{name} must be in [0, 1], got {value}")]
    InvalidQuantile { name: &'static str, value: f32 },

    #[error("Number of threads must be positive")]
    InvalidThreadCount,

    #[error("Failed to build worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Grid store is in {actual} layout, operation needs {expected} layout")]
    LayoutMismatch { expected: Layout, actual: Layout },

    #[error("Grid store holds {actual} tiles, grid has {expected}")]
    StoreGeometryMismatch { expected: usize, actual: usize },

    #[error("Tile {tile} produced {actual} quantities, the run expects {expected}")]
    QuantityMismatch {
        tile: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Tile operation must produce 1 or 2 quantities per tile, declares {0}")]
    InvalidQuantityCount(usize),

    #[error("Tile operation failed on tile {tile}: {message}")]
    TileOperation { tile: usize, message: String },

    #[error("Failed to serialize grid table: {0}")]
    Serialize(#[from] common::SerdeFormatError),

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
