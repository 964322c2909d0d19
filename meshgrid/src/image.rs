//! Borrowed input image and per-tile views into it.

use num_traits::{Float, ToPrimitive};

use crate::error::{Error, Result};
use crate::geometry::{MeshGrid, Rect, TileType};

/// Element type of an input image.
pub trait Pixel: Copy + Send + Sync + ToPrimitive {}

impl<T: Copy + Send + Sync + ToPrimitive> Pixel for T {}

/// Decides whether a pixel holds no data. Blank values are defined per
/// numeric type by the caller, the engine only asks.
pub type BlankPredicate<T> = fn(&T) -> bool;

/// Blank predicate for floating point images: NaN marks missing data.
pub fn nan_is_blank<T: Float>(value: &T) -> bool {
    value.is_nan()
}

/// Blank predicate for images without a blank value.
pub fn never_blank<T>(_: &T) -> bool {
    false
}

/// Read-only row-major image of `width x height` pixels.
#[derive(Clone, Copy)]
pub struct ImageView<'a, T> {
    pixels: &'a [T],
    width: usize,
    height: usize,
    blank: BlankPredicate<T>,
}

impl<T> std::fmt::Debug for ImageView<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageView")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl<'a, T: Pixel> ImageView<'a, T> {
    /// Wraps a pixel buffer; no pixel is considered blank.
    pub fn new(pixels: &'a [T], width: usize, height: usize) -> Result<Self> {
        if pixels.len() != width * height {
            return Err(Error::ImageSizeMismatch {
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
            blank: never_blank::<T>,
        })
    }

    pub fn with_blank(mut self, blank: BlankPredicate<T>) -> Self {
        self.blank = blank;
        self
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &'a [T] {
        self.pixels
    }

    #[inline]
    pub fn is_blank(&self, value: &T) -> bool {
        (self.blank)(value)
    }

    /// Pixel value as `f32`, `None` when blank or not representable.
    #[inline]
    pub fn value_f32(&self, x: usize, y: usize) -> Option<f32> {
        let value = &self.pixels[y * self.width + x];
        if self.is_blank(value) {
            return None;
        }
        value.to_f32().filter(|v| !v.is_nan())
    }

    /// Row `y` restricted to columns `x..x + len`.
    #[inline]
    pub fn row_segment(&self, x: usize, y: usize, len: usize) -> &'a [T] {
        let start = y * self.width + x;
        &self.pixels[start..start + len]
    }
}

impl<'a, T: Pixel> ImageView<'a, T>
where
    T: Float,
{
    /// Wraps a floating point buffer using NaN as the blank marker.
    pub fn float(pixels: &'a [T], width: usize, height: usize) -> Result<Self> {
        Ok(Self::new(pixels, width, height)?.with_blank(nan_is_blank::<T>))
    }
}

/// The pixels of one tile, handed to a [`TileOperation`](crate::TileOperation).
#[derive(Debug, Clone, Copy)]
pub struct TileView<'a, T> {
    /// Channel-based id.
    pub id: usize,
    pub image_id: usize,
    pub channel: usize,
    pub kind: TileType,
    pub rect: Rect,
    image: ImageView<'a, T>,
}

impl<'a, T: Pixel> TileView<'a, T> {
    pub(crate) fn new(grid: &MeshGrid, image: ImageView<'a, T>, id: usize) -> Self {
        let tile = grid.tile(id);
        Self {
            id,
            image_id: tile.image_id,
            channel: tile.channel,
            kind: tile.kind,
            rect: grid.tile_rect(id),
            image,
        }
    }

    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.rect.area()
    }

    /// Rows of the tile, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &'a [T]> + '_ {
        (self.rect.y..self.rect.bottom())
            .map(move |y| self.image.row_segment(self.rect.x, y, self.rect.width))
    }

    #[inline]
    pub fn is_blank(&self, value: &T) -> bool {
        self.image.is_blank(value)
    }

    /// Appends the non-blank pixels as `f32` to `out` and returns how many
    /// pixels were blank.
    pub fn collect_valid(&self, out: &mut Vec<f32>) -> usize {
        let mut blank = 0;
        for row in self.rows() {
            for value in row {
                match value.to_f32() {
                    Some(v) if !self.image.is_blank(value) && !v.is_nan() => out.push(v),
                    _ => blank += 1,
                }
            }
        }
        blank
    }
}
