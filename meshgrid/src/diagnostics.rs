//! Check images and value tables for inspecting a grid and its store.
//!
//! These are the only file-facing outputs of the engine. Check images come
//! back as [`Buffer2`]s for the caller to save in whatever format it uses;
//! [`GridTable`] can be written as YAML or JSON directly.

use std::path::Path;

use common::{Buffer2, SerdeFormat};
use glam::{DAffine2, DVec2};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::geometry::MeshGrid;
use crate::store::{GridStore, TileStatus};

/// Image-sized buffer in which every pixel holds the channel-based id of its
/// tile.
pub fn mesh_id_image(grid: &MeshGrid) -> Buffer2<usize> {
    let mut image = Buffer2::new_filled(grid.width(), grid.height(), 0);
    for id in 0..grid.num_tiles() {
        let rect = grid.tile_rect(id);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                image[(x, y)] = id;
            }
        }
    }
    image
}

/// Quantity `quantity` of `store` painted as an image: one constant value
/// per tile over the tile's pixels, or with `mesh_based` one pixel per tile
/// laid out as the whole-image tile grid. Invalid tiles are NaN.
///
/// `None` when the store does not hold that quantity.
pub fn garray_image(
    grid: &MeshGrid,
    store: &GridStore,
    quantity: usize,
    mesh_based: bool,
) -> Result<Option<Buffer2<f32>>> {
    store.check_grid(grid)?;
    let Some(values) = store.quantity(quantity) else {
        return Ok(None);
    };

    if mesh_based {
        return Ok(Some(Buffer2::from_fn(
            grid.grid_width(),
            grid.grid_height(),
            |col, row| values[store.index_at(grid, col, row)],
        )));
    }

    let mut image = Buffer2::new_filled(grid.width(), grid.height(), f32::NAN);
    for id in 0..grid.num_tiles() {
        let value = values[store.index_of(grid, id)];
        let rect = grid.tile_rect(id);
        for y in rect.y..rect.bottom() {
            image.pixels_mut()[y * grid.width() + rect.x..y * grid.width() + rect.right()]
                .fill(value);
        }
    }
    Ok(Some(image))
}

// ============================================================================
// World coordinates
// ============================================================================

/// Maps pixel coordinates to world coordinates. The engine only carries the
/// result into its tables, it never interprets it.
pub trait PixelToWorld {
    fn pixel_to_world(&self, pixel: DVec2) -> DVec2;
}

/// Linear world coordinate system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineWcs(pub DAffine2);

impl PixelToWorld for AffineWcs {
    fn pixel_to_world(&self, pixel: DVec2) -> DVec2 {
        self.0.transform_point2(pixel)
    }
}

// ============================================================================
// Value table
// ============================================================================

/// One tile of a [`GridTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridTableRow {
    pub image_id: usize,
    pub tile_id: usize,
    pub channel: usize,
    /// `[column, row]` in the whole-image tile grid.
    pub position: [usize; 2],
    /// Top-left pixel.
    pub origin: [usize; 2],
    pub size: [usize; 2],
    pub center: DVec2,
    pub first: Option<f32>,
    pub second: Option<f32>,
    pub status: TileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<DVec2>,
}

/// Per-tile listing of a store, in image id order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridTable {
    pub rows: Vec<GridTableRow>,
}

impl GridTable {
    pub fn new(grid: &MeshGrid, store: &GridStore, wcs: Option<&dyn PixelToWorld>) -> Result<Self> {
        store.check_grid(grid)?;
        let rows = (0..grid.num_tiles())
            .map(|image_id| {
                let tile_id = grid.channel_based_id(image_id);
                let index = store.index_of(grid, tile_id);
                let (first, second) = store.values(index);
                let usable = store.is_usable(index);
                let rect = grid.tile_rect(tile_id);
                let (col, row) = grid.grid_position(image_id);
                let center = grid.tile_center(tile_id);
                GridTableRow {
                    image_id,
                    tile_id,
                    channel: grid.tile(tile_id).channel,
                    position: [col, row],
                    origin: [rect.x, rect.y],
                    size: [rect.width, rect.height],
                    center,
                    first: usable.then_some(first),
                    second: second.filter(|_| usable),
                    status: store.status(index),
                    world: wcs.map(|wcs| wcs.pixel_to_world(center)),
                }
            })
            .collect();
        Ok(Self { rows })
    }

    /// Writes the table as YAML or JSON, chosen by the file extension.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = SerdeFormat::from_file_name(&path.to_string_lossy())?;
        let text = common::serialize(self, format)?;
        std::fs::write(path, text).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), rows = self.rows.len(), "Wrote grid table");
        Ok(())
    }
}
