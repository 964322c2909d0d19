//! Testing utilities for meshgrid.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::MeshConfig;
use crate::dispatch::{TileOperation, TileResult};
use crate::error::Result;
use crate::geometry::MeshGrid;
use crate::image::{Pixel, TileView};
use crate::store::{GridStore, Layout};

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Grid of a `width x height` image with `channels_x x channels_y` channels.
pub fn grid(
    width: usize,
    height: usize,
    mesh_size: usize,
    channels_x: usize,
    channels_y: usize,
) -> MeshGrid {
    MeshGrid::new(
        width,
        height,
        &MeshConfig::with_geometry(mesh_size, channels_x, channels_y),
    )
    .unwrap()
}

/// Channel-layout store with every tile valid and equal to `value`.
pub fn constant_store(grid: &MeshGrid, value: f32) -> GridStore {
    GridStore::from_values(Layout::Channel, vec![value; grid.num_tiles()], None)
}

/// Flat sky at `level` with uniform noise of half-width `noise`.
pub fn sky_pixels(width: usize, height: usize, level: f32, noise: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..width * height)
        .map(|_| level + rng.random_range(-noise..=noise))
        .collect()
}

/// Every tile reports its image id.
pub struct TileImageId;

impl<T: Pixel> TileOperation<T> for TileImageId {
    type Scratch = ();

    fn make_scratch(&self, _: &MeshGrid) -> Self::Scratch {}

    fn compute(&self, tile: &TileView<'_, T>, _: &mut ()) -> Result<TileResult> {
        Ok(TileResult::Value(tile.image_id as f32))
    }
}
