//! End-to-end run: build the grid, populate it, post-process it.

use std::time::Instant;

use tracing::info;

use crate::config::{MeshConfig, Scope};
use crate::convolve::{change_to_full_convolution, convolve};
use crate::dispatch::{Dispatcher, TileOperation};
use crate::error::Result;
use crate::geometry::MeshGrid;
use crate::image::{ImageView, Pixel};
use crate::interpolate::{interpolate, InterpolationFailure};
use crate::smooth::smooth;
use crate::store::{GridStore, Layout};

/// Result of a [`MeshPipeline`] run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub grid: MeshGrid,
    /// Final values in image-wide layout.
    pub store: GridStore,
    /// Tiles interpolation could not fill. Empty when interpolation is off
    /// or filled every tile.
    pub failures: Vec<InterpolationFailure>,
}

impl PipelineOutput {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs a tile operation over images with a fixed configuration and worker
/// pool. The configured post-processing steps run in order: interpolation,
/// smoothing, convolution.
#[derive(Debug)]
pub struct MeshPipeline {
    config: MeshConfig,
    dispatcher: Dispatcher,
}

impl MeshPipeline {
    pub fn new(config: MeshConfig) -> Result<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(config.num_threads)?;
        Ok(Self { config, dispatcher })
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn run<T, Op>(&self, image: ImageView<'_, T>, op: &Op) -> Result<PipelineOutput>
    where
        T: Pixel,
        Op: TileOperation<T>,
    {
        let started = Instant::now();
        let grid = MeshGrid::new(image.width(), image.height(), &self.config)?;
        let mut store = self.dispatcher.populate(&grid, image, op)?;
        let mut failures = Vec::new();

        if let Some(config) = &self.config.interpolation {
            store = store.to_layout(&grid, Layout::for_scope(config.scope))?;
            let (filled, failed) =
                interpolate(&self.dispatcher, &grid, &store, config)?.into_parts();
            store = filled;
            failures = failed;
        }

        if let Some(config) = &self.config.smoothing {
            store = store.to_layout(&grid, Layout::for_scope(config.scope))?;
            store = smooth(&self.dispatcher, &grid, &store, config)?;
        }

        if let Some(config) = &self.config.convolution {
            store = store.to_layout(&grid, Layout::for_scope(config.scope))?;
            let convolved = convolve(&self.dispatcher, &grid, &store, &config.kernel, config.scope)?;
            store = if config.scope == Scope::Channel && config.full_after_channels {
                change_to_full_convolution(
                    &self.dispatcher,
                    &grid,
                    &store,
                    convolved,
                    &config.kernel,
                )?
            } else {
                convolved
            };
        }

        let store = store.to_image_wide(&grid)?;
        info!(
            width = grid.width(),
            height = grid.height(),
            tiles = grid.num_tiles(),
            failed = failures.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Mesh pipeline complete"
        );
        Ok(PipelineOutput {
            grid,
            store,
            failures,
        })
    }
}
