//! Per-tile value store (garray).
//!
//! A [`GridStore`] holds one or two `f32` quantities per tile plus a
//! [`TileStatus`]. The physical order of the tiles is explicit in its
//! [`Layout`]: channel-contiguous for per-channel work, or image-wide
//! row-major for whole-image work and final output. Switching layouts
//! consumes the store and returns a rearranged one.


use serde::{Deserialize, Serialize};

use crate::config::Scope;
use crate::dispatch::TileResult;
use crate::error::{Error, Result};
use crate::geometry::MeshGrid;

// ============================================================================
// Types
// ============================================================================

/// Physical order of the tiles in a [`GridStore`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum Layout {
    /// Indexed by channel-based id.
    Channel,
    /// Indexed by image id.
    ImageWide,
}

impl Layout {
    /// Layout a post-processing step of the given scope operates on.
    pub fn for_scope(scope: Scope) -> Self {
        match scope {
            Scope::Channel => Self::Channel,
            Scope::FullImage => Self::ImageWide,
        }
    }
}

/// State of a tile's values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TileStatus {
    /// Computed by the tile operation.
    Valid,
    /// Computed, but the operation judged the result untrustworthy.
    Rejected,
    /// No data: not computed, or too few usable pixels.
    Blank,
    /// Filled in from neighboring tiles.
    Interpolated,
}

impl TileStatus {
    /// Whether the tile's values may be read as data.
    #[inline]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Valid | Self::Interpolated)
    }
}

/// Per-tile values in one of the two layouts.
///
/// Invariant: a tile is usable exactly when its values are not NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct GridStore {
    layout: Layout,
    first: Vec<f32>,
    second: Option<Vec<f32>>,
    status: Vec<TileStatus>,
}

/// Equal-sized rectangular runs of a store that post-processing treats
/// independently: one per channel in channel layout, one for the whole grid
/// in image-wide layout. Within a domain tiles are row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Domains {
    pub layout: Layout,
    pub width: usize,
    pub height: usize,
    pub count: usize,
}

impl Domains {
    #[inline]
    pub fn domain_len(&self) -> usize {
        self.width * self.height
    }

    /// `(domain, x, y)` of a store index.
    #[inline]
    pub fn split(&self, index: usize) -> (usize, usize, usize) {
        let len = self.domain_len();
        let local = index % len;
        (index / len, local % self.width, local / self.width)
    }

    #[inline]
    pub fn join(&self, domain: usize, x: usize, y: usize) -> usize {
        domain * self.domain_len() + y * self.width + x
    }
}

// ============================================================================
// GridStore
// ============================================================================

impl GridStore {
    /// Store with every tile blank, holding `quantities` (1 or 2) values per tile.
    pub fn new_blank(layout: Layout, num_tiles: usize, quantities: usize) -> Self {
        assert!(
            (1..=2).contains(&quantities),
            "a grid store holds one or two quantities"
        );
        Self {
            layout,
            first: vec![f32::NAN; num_tiles],
            second: (quantities == 2).then(|| vec![f32::NAN; num_tiles]),
            status: vec![TileStatus::Blank; num_tiles],
        }
    }

    /// Store from raw values; NaN entries become blank tiles.
    pub fn from_values(layout: Layout, first: Vec<f32>, second: Option<Vec<f32>>) -> Self {
        if let Some(second) = &second {
            assert_eq!(first.len(), second.len(), "quantity lengths differ");
        }
        let status = (0..first.len())
            .map(|i| {
                let blank = first[i].is_nan() || second.as_ref().is_some_and(|s| s[i].is_nan());
                if blank {
                    TileStatus::Blank
                } else {
                    TileStatus::Valid
                }
            })
            .collect();
        let mut store = Self {
            layout,
            first,
            second,
            status,
        };
        store.clear_unusable();
        store
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.status.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
    }

    #[inline]
    pub fn num_quantities(&self) -> usize {
        if self.second.is_some() {
            2
        } else {
            1
        }
    }

    #[inline]
    pub fn first(&self) -> &[f32] {
        &self.first
    }

    #[inline]
    pub fn second(&self) -> Option<&[f32]> {
        self.second.as_deref()
    }

    /// Values of quantity `q` (0 or 1).
    #[inline]
    pub fn quantity(&self, q: usize) -> Option<&[f32]> {
        match q {
            0 => Some(&self.first),
            1 => self.second.as_deref(),
            _ => None,
        }
    }

    #[inline]
    pub fn statuses(&self) -> &[TileStatus] {
        &self.status
    }

    #[inline]
    pub fn status(&self, index: usize) -> TileStatus {
        self.status[index]
    }

    #[inline]
    pub fn is_usable(&self, index: usize) -> bool {
        self.status[index].is_usable()
    }

    /// First and optional second value of the tile at a store index.
    #[inline]
    pub fn values(&self, index: usize) -> (f32, Option<f32>) {
        (self.first[index], self.second.as_ref().map(|s| s[index]))
    }

    pub fn count_status(&self, status: TileStatus) -> usize {
        self.status.iter().filter(|&&s| s == status).count()
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Stores a tile operation result. Invalid results leave NaN values.
    pub fn set_result(&mut self, index: usize, result: TileResult) {
        let (first, second, status) = match result {
            TileResult::Value(v) => (v, f32::NAN, TileStatus::Valid),
            TileResult::Pair(a, b) => (a, b, TileStatus::Valid),
            TileResult::Rejected => (f32::NAN, f32::NAN, TileStatus::Rejected),
            TileResult::Blank => (f32::NAN, f32::NAN, TileStatus::Blank),
        };
        self.first[index] = first;
        if let Some(values) = &mut self.second {
            values[index] = second;
        }
        self.status[index] = status;
        // A "valid" NaN is no data.
        if status.is_usable() && self.has_nan(index) {
            self.invalidate(index, TileStatus::Blank);
        }
    }

    /// Writes values and marks the tile usable with the given status.
    pub(crate) fn set_values(
        &mut self,
        index: usize,
        first: f32,
        second: Option<f32>,
        status: TileStatus,
    ) {
        debug_assert!(status.is_usable());
        self.first[index] = first;
        if let (Some(values), Some(v)) = (&mut self.second, second) {
            values[index] = v;
        }
        self.status[index] = status;
    }

    /// Marks a tile invalid and clears its values.
    pub fn invalidate(&mut self, index: usize, status: TileStatus) {
        debug_assert!(!status.is_usable());
        self.first[index] = f32::NAN;
        if let Some(values) = &mut self.second {
            values[index] = f32::NAN;
        }
        self.status[index] = status;
    }

    fn has_nan(&self, index: usize) -> bool {
        self.first[index].is_nan() || self.second.as_ref().is_some_and(|s| s[index].is_nan())
    }

    fn clear_unusable(&mut self) {
        for i in 0..self.len() {
            if !self.status[i].is_usable() {
                self.first[i] = f32::NAN;
                if let Some(values) = &mut self.second {
                    values[i] = f32::NAN;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------------

    /// Fails unless the store has one entry per tile of `grid`.
    pub fn check_grid(&self, grid: &MeshGrid) -> Result<()> {
        if self.len() != grid.num_tiles() {
            return Err(Error::StoreGeometryMismatch {
                expected: grid.num_tiles(),
                actual: self.len(),
            });
        }
        Ok(())
    }

    /// Fails unless the store is in `layout`.
    pub fn expect_layout(&self, layout: Layout) -> Result<()> {
        if self.layout != layout {
            return Err(Error::LayoutMismatch {
                expected: layout,
                actual: self.layout,
            });
        }
        Ok(())
    }

    /// Store index of the tile with the given channel-based id.
    #[inline]
    pub fn index_of(&self, grid: &MeshGrid, channel_based_id: usize) -> usize {
        match self.layout {
            Layout::Channel => channel_based_id,
            Layout::ImageWide => grid.image_id(channel_based_id),
        }
    }

    /// Channel-based id of the tile at a store index.
    #[inline]
    pub fn tile_id(&self, grid: &MeshGrid, index: usize) -> usize {
        match self.layout {
            Layout::Channel => index,
            Layout::ImageWide => grid.channel_based_id(index),
        }
    }

    /// Store index of the tile at `(column, row)` of the whole-image tile grid.
    #[inline]
    pub fn index_at(&self, grid: &MeshGrid, col: usize, row: usize) -> usize {
        let image_id = grid.image_id_at(col, row);
        match self.layout {
            Layout::Channel => grid.channel_based_id(image_id),
            Layout::ImageWide => image_id,
        }
    }

    /// Rearranges the tiles into `layout`. Values are moved, never changed,
    /// so converting there and back is the identity.
    pub fn to_layout(self, grid: &MeshGrid, layout: Layout) -> Result<Self> {
        self.check_grid(grid)?;
        if self.layout == layout {
            return Ok(self);
        }

        // Destination index for every source index.
        let dest: Vec<usize> = (0..self.len())
            .map(|i| match self.layout {
                Layout::Channel => grid.image_id(i),
                Layout::ImageWide => grid.channel_based_id(i),
            })
            .collect();

        Ok(Self {
            layout,
            first: permute(&self.first, &dest),
            second: self.second.as_ref().map(|s| permute(s, &dest)),
            status: permute(&self.status, &dest),
        })
    }

    pub fn to_image_wide(self, grid: &MeshGrid) -> Result<Self> {
        self.to_layout(grid, Layout::ImageWide)
    }

    pub fn to_channel(self, grid: &MeshGrid) -> Result<Self> {
        self.to_layout(grid, Layout::Channel)
    }

    /// Domains a step of the given scope iterates over. The store must
    /// already be in the matching layout.
    pub(crate) fn domains(&self, grid: &MeshGrid, scope: Scope) -> Result<Domains> {
        self.check_grid(grid)?;
        let layout = Layout::for_scope(scope);
        self.expect_layout(layout)?;
        Ok(match layout {
            Layout::Channel => Domains {
                layout,
                width: grid.tiles_x(),
                height: grid.tiles_y(),
                count: grid.num_channels(),
            },
            Layout::ImageWide => Domains {
                layout,
                width: grid.grid_width(),
                height: grid.grid_height(),
                count: 1,
            },
        })
    }
}

fn permute<T: Copy>(source: &[T], dest: &[usize]) -> Vec<T> {
    let mut out = source.to_vec();
    for (i, &d) in dest.iter().enumerate() {
        out[d] = source[i];
    }
    out
}
