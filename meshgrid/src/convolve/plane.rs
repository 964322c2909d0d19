//! Readable 2-D value planes that convolution samples from.

use crate::error::Result;
use crate::geometry::{MeshGrid, Rect};
use crate::image::{ImageView, Pixel};
use crate::store::{Domains, GridStore};

/// A plane of optional values. Positions outside the plane and invalid
/// values read as `None`.
pub trait Plane: Sync {
    fn value(&self, x: isize, y: isize) -> Option<f32>;
}

// ============================================================================
// Store domain
// ============================================================================

/// One domain (a channel, or the whole grid) of one quantity of a store.
pub(crate) struct DomainPlane<'a> {
    pub store: &'a GridStore,
    pub values: &'a [f32],
    pub domains: Domains,
    pub domain: usize,
}

impl Plane for DomainPlane<'_> {
    #[inline]
    fn value(&self, x: isize, y: isize) -> Option<f32> {
        if x < 0 || y < 0 || x >= self.domains.width as isize || y >= self.domains.height as isize
        {
            return None;
        }
        let index = self.domains.join(self.domain, x as usize, y as usize);
        self.store.is_usable(index).then(|| self.values[index])
    }
}

// ============================================================================
// Channel borders
// ============================================================================

/// The tiles of one channel together with a halo of the tile values just
/// outside it, taken from the neighboring channels. Lets a channel be
/// convolved on its own while still seeing the correct context at its seams.
///
/// Halo positions outside the image, and invalid tiles, hold NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBorders {
    channel: usize,
    halo_x: usize,
    halo_y: usize,
    width: usize,
    height: usize,
    first: Vec<f32>,
    second: Option<Vec<f32>>,
}

impl ChannelBorders {
    /// Collects channel `channel` plus `halo_x` tile columns and `halo_y`
    /// tile rows around it. `store` may be in either layout.
    pub fn extract(
        grid: &MeshGrid,
        store: &GridStore,
        channel: usize,
        halo_x: usize,
        halo_y: usize,
    ) -> Result<Self> {
        store.check_grid(grid)?;
        let rect = grid.channel_tile_rect(channel);
        let width = rect.width + 2 * halo_x;
        let height = rect.height + 2 * halo_y;
        let bounds = grid.grid_rect();

        let mut first = vec![f32::NAN; width * height];
        let mut second = store.second().map(|_| vec![f32::NAN; width * height]);

        for py in 0..height {
            for px in 0..width {
                let col = rect.x as isize + px as isize - halo_x as isize;
                let row = rect.y as isize + py as isize - halo_y as isize;
                if !bounds.contains_signed(col, row) {
                    continue;
                }
                let index = store.index_at(grid, col as usize, row as usize);
                if !store.is_usable(index) {
                    continue;
                }
                let (a, b) = store.values(index);
                first[py * width + px] = a;
                if let (Some(values), Some(b)) = (&mut second, b) {
                    values[py * width + px] = b;
                }
            }
        }

        Ok(Self {
            channel,
            halo_x,
            halo_y,
            width,
            height,
            first,
            second,
        })
    }

    #[inline]
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// `(width, height)` of the padded plane, channel tiles plus halo.
    #[inline]
    pub fn padded_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Value of quantity `q` at channel-local tile `(x, y)`, where negative
    /// and past-the-end coordinates address the halo.
    pub fn value(&self, q: usize, x: isize, y: isize) -> Option<f32> {
        let px = x + self.halo_x as isize;
        let py = y + self.halo_y as isize;
        if px < 0 || py < 0 || px >= self.width as isize || py >= self.height as isize {
            return None;
        }
        let values = match q {
            0 => &self.first,
            _ => self.second.as_ref()?,
        };
        let v = values[py as usize * self.width + px as usize];
        (!v.is_nan()).then_some(v)
    }

    pub(crate) fn plane(&self, q: usize) -> BorderPlane<'_> {
        BorderPlane { borders: self, q }
    }
}

pub(crate) struct BorderPlane<'a> {
    borders: &'a ChannelBorders,
    q: usize,
}

impl Plane for BorderPlane<'_> {
    #[inline]
    fn value(&self, x: isize, y: isize) -> Option<f32> {
        self.borders.value(self.q, x, y)
    }
}

// ============================================================================
// Image pixels
// ============================================================================

/// Image pixels confined to `bounds`.
pub(crate) struct PixelPlane<'a, T> {
    pub image: ImageView<'a, T>,
    pub bounds: Rect,
}

impl<T: Pixel> Plane for PixelPlane<'_, T> {
    #[inline]
    fn value(&self, x: isize, y: isize) -> Option<f32> {
        if !self.bounds.contains_signed(x, y) {
            return None;
        }
        self.image.value_f32(x as usize, y as usize)
    }
}
