//! Tile geometry: partitions an image into channels and each channel into a
//! regular grid of tiles (meshes).
//!
//! Every tile has three equivalent addresses:
//! - its **channel-based id**: `channel * tiles_per_channel + index_in_channel`,
//!   so the tiles of one channel form a contiguous run,
//! - its **image id**: row-major position in the whole-image tile grid,
//!   ignoring channel boundaries,
//! - the **pixel coordinate** of its top-left corner.
//!
//! Channel sizes that are not a multiple of the tile size are handled by
//! enlarging the last tile column and row of every channel, so no tile is ever
//! smaller than `mesh_size` and every pixel belongs to exactly one tile.


use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::MeshConfig;
use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Size class of a tile. The four classes are the only distinct tile sizes
/// in a grid, so hot loops look sizes up by class instead of per tile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TileType {
    Regular = 0,
    LastColumn = 1,
    LastRow = 2,
    LastCorner = 3,
}

impl TileType {
    fn classify(last_column: bool, last_row: bool) -> Self {
        match (last_column, last_row) {
            (false, false) => Self::Regular,
            (true, false) => Self::LastColumn,
            (false, true) => Self::LastRow,
            (true, true) => Self::LastCorner,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Axis-aligned rectangle in pixel or tile units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Signed variant of [`Rect::contains`] for neighborhood walks that step
    /// outside the plane.
    #[inline]
    pub fn contains_signed(&self, x: isize, y: isize) -> bool {
        x >= self.x as isize
            && x < self.right() as isize
            && y >= self.y as isize
            && y < self.bottom() as isize
    }
}

/// Per-tile record, stored in channel-based id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Offset of the top-left pixel in the row-major image buffer.
    pub start: usize,
    pub kind: TileType,
    pub channel: usize,
    /// Index within the channel, `0..tiles_per_channel`.
    pub channel_index: usize,
    pub image_id: usize,
}

// ============================================================================
// MeshGrid
// ============================================================================

/// Immutable tile geometry of one image. Building it is the only way to get
/// one, so a `MeshGrid` always describes a fully covered image.
#[derive(Debug, Clone)]
pub struct MeshGrid {
    width: usize,
    height: usize,
    mesh_size: usize,

    channels_x: usize,
    channels_y: usize,
    channel_width: usize,
    channel_height: usize,

    /// Tiles per channel along x and y.
    tiles_x: usize,
    tiles_y: usize,

    /// Width and height of each [`TileType`].
    type_widths: [usize; 4],
    type_heights: [usize; 4],

    tiles: Vec<Tile>,
}

impl MeshGrid {
    /// Builds the grid for an image of `width x height` pixels.
    pub fn new(width: usize, height: usize, config: &MeshConfig) -> Result<Self> {
        config.validate()?;
        Self::build(
            width,
            height,
            config.mesh_size,
            config.channels_x,
            config.channels_y,
            config.last_mesh_frac,
        )
    }

    fn build(
        width: usize,
        height: usize,
        mesh_size: usize,
        channels_x: usize,
        channels_y: usize,
        last_mesh_frac: f32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage { width, height });
        }
        if mesh_size == 0 {
            return Err(Error::InvalidMeshSize(mesh_size));
        }
        let channel_width = channel_extent("width", width, channels_x)?;
        let channel_height = channel_extent("height", height, channels_y)?;
        if mesh_size > channel_width || mesh_size > channel_height {
            return Err(Error::MeshLargerThanChannel {
                mesh_size,
                channel_width,
                channel_height,
            });
        }

        let tiles_x = channel_width / mesh_size;
        let tiles_y = channel_height / mesh_size;
        let last_width = channel_width - (tiles_x - 1) * mesh_size;
        let last_height = channel_height - (tiles_y - 1) * mesh_size;

        let tolerance = last_mesh_frac * mesh_size as f32;
        for (axis, last) in [("x", last_width), ("y", last_height)] {
            let remainder = last - mesh_size;
            if remainder as f32 > tolerance {
                warn!(
                    axis,
                    remainder,
                    mesh_size,
                    last_mesh_frac,
                    "Last tile absorbs a remainder larger than the tolerated fraction"
                );
            }
        }

        let type_widths = [mesh_size, last_width, mesh_size, last_width];
        let type_heights = [mesh_size, mesh_size, last_height, last_height];

        let mut grid = Self {
            width,
            height,
            mesh_size,
            channels_x,
            channels_y,
            channel_width,
            channel_height,
            tiles_x,
            tiles_y,
            type_widths,
            type_heights,
            tiles: Vec::new(),
        };
        grid.tiles = grid.build_tiles();

        debug!(
            width,
            height,
            mesh_size,
            channels = grid.num_channels(),
            tiles_per_channel = grid.tiles_per_channel(),
            tiles = grid.num_tiles(),
            "Built mesh grid"
        );

        Ok(grid)
    }

    fn build_tiles(&self) -> Vec<Tile> {
        let per_channel = self.tiles_per_channel();
        let mut tiles = Vec::with_capacity(self.num_tiles());

        for channel in 0..self.num_channels() {
            let channel_rect = self.channel_rect(channel);
            for channel_index in 0..per_channel {
                let row = channel_index / self.tiles_x;
                let col = channel_index % self.tiles_x;
                let kind = TileType::classify(col == self.tiles_x - 1, row == self.tiles_y - 1);
                let x = channel_rect.x + col * self.mesh_size;
                let y = channel_rect.y + row * self.mesh_size;
                tiles.push(Tile {
                    start: y * self.width + x,
                    kind,
                    channel,
                    channel_index,
                    image_id: self.image_id(channel * per_channel + channel_index),
                });
            }
        }

        tiles
    }

    // ------------------------------------------------------------------------
    // Sizes
    // ------------------------------------------------------------------------

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn mesh_size(&self) -> usize {
        self.mesh_size
    }

    #[inline]
    pub fn channels_x(&self) -> usize {
        self.channels_x
    }

    #[inline]
    pub fn channels_y(&self) -> usize {
        self.channels_y
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels_x * self.channels_y
    }

    #[inline]
    pub fn channel_width(&self) -> usize {
        self.channel_width
    }

    #[inline]
    pub fn channel_height(&self) -> usize {
        self.channel_height
    }

    /// Tiles per channel along x.
    #[inline]
    pub fn tiles_x(&self) -> usize {
        self.tiles_x
    }

    /// Tiles per channel along y.
    #[inline]
    pub fn tiles_y(&self) -> usize {
        self.tiles_y
    }

    #[inline]
    pub fn tiles_per_channel(&self) -> usize {
        self.tiles_x * self.tiles_y
    }

    #[inline]
    pub fn num_tiles(&self) -> usize {
        self.tiles_per_channel() * self.num_channels()
    }

    /// Tile columns in the whole-image tile grid.
    #[inline]
    pub fn grid_width(&self) -> usize {
        self.tiles_x * self.channels_x
    }

    /// Tile rows in the whole-image tile grid.
    #[inline]
    pub fn grid_height(&self) -> usize {
        self.tiles_y * self.channels_y
    }

    /// Size of a tile type as `(width, height)`.
    #[inline]
    pub fn type_size(&self, kind: TileType) -> (usize, usize) {
        (
            self.type_widths[kind.index()],
            self.type_heights[kind.index()],
        )
    }

    /// Largest tile size as `(width, height)`, for sizing scratch buffers.
    #[inline]
    pub fn max_tile_size(&self) -> (usize, usize) {
        (
            self.type_widths[TileType::LastCorner.index()],
            self.type_heights[TileType::LastCorner.index()],
        )
    }

    // ------------------------------------------------------------------------
    // Id conversion
    // ------------------------------------------------------------------------

    /// Channel-based id of the tile with the given image id.
    #[inline]
    pub fn channel_based_id(&self, image_id: usize) -> usize {
        debug_assert!(image_id < self.num_tiles());
        let grid_width = self.grid_width();
        let row = image_id / grid_width;
        let col = image_id % grid_width;
        let channel = (row / self.tiles_y) * self.channels_x + col / self.tiles_x;
        let local = (row % self.tiles_y) * self.tiles_x + col % self.tiles_x;
        channel * self.tiles_per_channel() + local
    }

    /// Image id of the tile with the given channel-based id.
    #[inline]
    pub fn image_id(&self, channel_based_id: usize) -> usize {
        debug_assert!(channel_based_id < self.num_tiles());
        let per_channel = self.tiles_per_channel();
        let channel = channel_based_id / per_channel;
        let local = channel_based_id % per_channel;
        let row = (channel / self.channels_x) * self.tiles_y + local / self.tiles_x;
        let col = (channel % self.channels_x) * self.tiles_x + local % self.tiles_x;
        row * self.grid_width() + col
    }

    /// `(column, row)` of a tile in the whole-image tile grid, from its image id.
    #[inline]
    pub fn grid_position(&self, image_id: usize) -> (usize, usize) {
        (image_id % self.grid_width(), image_id / self.grid_width())
    }

    /// Image id of the tile at `(column, row)` of the whole-image tile grid.
    #[inline]
    pub fn image_id_at(&self, col: usize, row: usize) -> usize {
        debug_assert!(col < self.grid_width() && row < self.grid_height());
        row * self.grid_width() + col
    }

    /// Channel-based id of the tile covering pixel `(x, y)`.
    pub fn tile_at_pixel(&self, x: usize, y: usize) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channel = (y / self.channel_height) * self.channels_x + x / self.channel_width;
        let col = ((x % self.channel_width) / self.mesh_size).min(self.tiles_x - 1);
        let row = ((y % self.channel_height) / self.mesh_size).min(self.tiles_y - 1);
        Some(channel * self.tiles_per_channel() + row * self.tiles_x + col)
    }

    // ------------------------------------------------------------------------
    // Tiles and channels
    // ------------------------------------------------------------------------

    /// Tile record by channel-based id.
    #[inline]
    pub fn tile(&self, channel_based_id: usize) -> &Tile {
        &self.tiles[channel_based_id]
    }

    /// All tiles in channel-based id order.
    #[inline]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Pixel rectangle of a tile, by channel-based id.
    pub fn tile_rect(&self, channel_based_id: usize) -> Rect {
        let tile = &self.tiles[channel_based_id];
        let (width, height) = self.type_size(tile.kind);
        Rect::new(
            tile.start % self.width,
            tile.start / self.width,
            width,
            height,
        )
    }

    /// Geometric center of a tile in pixel coordinates, by channel-based id.
    pub fn tile_center(&self, channel_based_id: usize) -> DVec2 {
        let rect = self.tile_rect(channel_based_id);
        DVec2::new(
            rect.x as f64 + rect.width as f64 * 0.5,
            rect.y as f64 + rect.height as f64 * 0.5,
        )
    }

    /// Channel-based ids of one channel.
    #[inline]
    pub fn channel_tiles(&self, channel: usize) -> std::ops::Range<usize> {
        let per_channel = self.tiles_per_channel();
        channel * per_channel..(channel + 1) * per_channel
    }

    /// Pixel rectangle of a channel.
    pub fn channel_rect(&self, channel: usize) -> Rect {
        debug_assert!(channel < self.num_channels());
        Rect::new(
            (channel % self.channels_x) * self.channel_width,
            (channel / self.channels_x) * self.channel_height,
            self.channel_width,
            self.channel_height,
        )
    }

    /// Rectangle of a channel in whole-image tile grid units.
    pub fn channel_tile_rect(&self, channel: usize) -> Rect {
        debug_assert!(channel < self.num_channels());
        Rect::new(
            (channel % self.channels_x) * self.tiles_x,
            (channel / self.channels_x) * self.tiles_y,
            self.tiles_x,
            self.tiles_y,
        )
    }

    /// Rectangle of the whole image in tile grid units.
    pub fn grid_rect(&self) -> Rect {
        Rect::new(0, 0, self.grid_width(), self.grid_height())
    }
}

fn channel_extent(axis: &'static str, size: usize, channels: usize) -> Result<usize> {
    if channels == 0 {
        return Err(Error::ZeroChannels { axis });
    }
    if size % channels != 0 {
        return Err(Error::ChannelsNotDivisible {
            axis,
            size,
            channels,
        });
    }
    Ok(size / channels)
}
