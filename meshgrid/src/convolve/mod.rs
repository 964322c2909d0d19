//! Kernel convolution of tile values and of image pixels.
//!
//! Convolution is true convolution (the kernel is flipped). Positions that
//! fall outside the plane or hold invalid values are skipped and the result
//! is rescaled by `sum(kernel) / sum(used weights)`, so a normalized kernel
//! keeps the local level near edges and holes. Invalid tiles and blank
//! pixels stay invalid.
//!
//! In channel scope each channel is convolved on its own.
//! [`change_to_full_convolution`] turns such a result into the whole-image
//! result by recomputing only the tiles whose kernel footprint crosses a
//! channel seam, using [`ChannelBorders`].

mod plane;

pub use plane::{ChannelBorders, Plane};

use common::Buffer2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Scope;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::geometry::{MeshGrid, Rect};
use crate::image::{ImageView, Pixel};
use crate::store::{GridStore, Layout, TileStatus};
use plane::{DomainPlane, PixelPlane};

// ============================================================================
// Kernel
// ============================================================================

/// Row-major convolution kernel with odd width and height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kernel {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl Kernel {
    pub fn new(width: usize, height: usize, values: Vec<f32>) -> Result<Self> {
        let kernel = Self {
            width,
            height,
            values,
        };
        kernel.validate()?;
        Ok(kernel)
    }

    /// 1x1 kernel of value 1.
    pub fn identity() -> Self {
        Self {
            width: 1,
            height: 1,
            values: vec![1.0],
        }
    }

    /// Normalized box kernel.
    pub fn uniform(width: usize, height: usize) -> Result<Self> {
        let n = width * height;
        Self::new(width, height, vec![1.0 / n.max(1) as f32; n])
    }

    /// Normalized Gaussian of standard deviation `sigma` (in tiles or
    /// pixels), truncated at `radius`.
    pub fn gaussian(sigma: f32, radius: usize) -> Result<Self> {
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(Error::InvalidKernelSigma(sigma));
        }
        let side = 2 * radius + 1;
        let mut values = Vec::with_capacity(side * side);
        let two_sigma2 = 2.0 * (sigma as f64).powi(2);
        for y in 0..side {
            for x in 0..side {
                let dx = x as f64 - radius as f64;
                let dy = y as f64 - radius as f64;
                values.push((-(dx * dx + dy * dy) / two_sigma2).exp());
            }
        }
        let sum: f64 = values.iter().sum();
        Self::new(
            side,
            side,
            values.into_iter().map(|v| (v / sum) as f32).collect(),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.width % 2 == 0 || self.height % 2 == 0 {
            return Err(Error::InvalidKernel {
                width: self.width,
                height: self.height,
            });
        }
        if self.values.len() != self.width * self.height {
            return Err(Error::KernelSizeMismatch {
                width: self.width,
                height: self.height,
                actual: self.values.len(),
            });
        }
        if let Some((index, &value)) = self
            .values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
        {
            return Err(Error::NonFiniteKernel { index, value });
        }
        Ok(())
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
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn half_width(&self) -> usize {
        self.width / 2
    }

    #[inline]
    pub fn half_height(&self) -> usize {
        self.height / 2
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().map(|&v| v as f64).sum()
    }
}

/// Convolution of `plane` with `kernel` at `(x, y)`. `None` when no usable
/// position contributes, or when the used weights cancel out.
pub fn convolve_at<P: Plane + ?Sized>(plane: &P, kernel: &Kernel, x: isize, y: isize) -> Option<f32> {
    let hx = kernel.half_width() as isize;
    let hy = kernel.half_height() as isize;

    let mut acc = 0.0f64;
    let mut used = 0.0f64;
    let mut any = false;
    for ky in 0..kernel.height {
        for kx in 0..kernel.width {
            let Some(v) = plane.value(x + hx - kx as isize, y + hy - ky as isize) else {
                continue;
            };
            let w = kernel.values[ky * kernel.width + kx] as f64;
            acc += w * v as f64;
            used += w;
            any = true;
        }
    }

    if !any {
        return None;
    }
    let total = kernel.sum();
    if total.abs() < common::EPSILON {
        return Some(acc as f32);
    }
    if used.abs() < common::EPSILON {
        return None;
    }
    Some((acc * total / used) as f32)
}

// ============================================================================
// Tile convolution
// ============================================================================

enum Convolved {
    /// Input tile was invalid.
    Skipped,
    Value(f32, Option<f32>),
    /// No usable weight reached the tile.
    Lost,
}

/// Convolves every usable tile of `store`, which must be in the layout
/// matching `scope`.
pub fn convolve(
    dispatcher: &Dispatcher,
    grid: &MeshGrid,
    store: &GridStore,
    kernel: &Kernel,
    scope: Scope,
) -> Result<GridStore> {
    kernel.validate()?;
    let domains = store.domains(grid, scope)?;

    let results = dispatcher.run_phase(
        "convolve",
        store.len(),
        || (),
        |index, _| {
            if !store.is_usable(index) {
                return Ok(Convolved::Skipped);
            }
            let (domain, x, y) = domains.split(index);
            let first = DomainPlane {
                store,
                values: store.first(),
                domains,
                domain,
            };
            let second = store.second().map(|values| DomainPlane {
                store,
                values,
                domains,
                domain,
            });
            Ok(convolve_tile(&first, second.as_ref(), kernel, x, y))
        },
    )?;

    let output = apply(store, (0..store.len()).zip(results));
    debug!(
        kernel_width = kernel.width(),
        kernel_height = kernel.height(),
        scope = %scope,
        "Convolved grid store"
    );
    Ok(output)
}

fn convolve_tile<P: Plane>(
    first: &P,
    second: Option<&P>,
    kernel: &Kernel,
    x: usize,
    y: usize,
) -> Convolved {
    let (x, y) = (x as isize, y as isize);
    let Some(a) = convolve_at(first, kernel, x, y) else {
        return Convolved::Lost;
    };
    match second.map(|plane| convolve_at(plane, kernel, x, y)) {
        None => Convolved::Value(a, None),
        Some(Some(b)) => Convolved::Value(a, Some(b)),
        Some(None) => Convolved::Lost,
    }
}

fn apply(store: &GridStore, results: impl IntoIterator<Item = (usize, Convolved)>) -> GridStore {
    let mut output = store.clone();
    for (index, result) in results {
        match result {
            Convolved::Skipped => {}
            Convolved::Value(a, b) => output.set_values(index, a, b, store.status(index)),
            Convolved::Lost => output.invalidate(index, TileStatus::Rejected),
        }
    }
    output
}

/// Turns a channel-confined convolution into the whole-image convolution.
///
/// `input` is the channel-layout store that was convolved and `convolved`
/// the channel-scope result. Tiles whose kernel footprint stays inside
/// their channel are kept; the others are recomputed from the channel
/// borders of `input`. Returns an image-wide store.
pub fn change_to_full_convolution(
    dispatcher: &Dispatcher,
    grid: &MeshGrid,
    input: &GridStore,
    convolved: GridStore,
    kernel: &Kernel,
) -> Result<GridStore> {
    kernel.validate()?;
    input.expect_layout(Layout::Channel)?;
    convolved.expect_layout(Layout::Channel)?;
    input.check_grid(grid)?;
    convolved.check_grid(grid)?;

    if grid.num_channels() == 1 {
        return convolved.to_image_wide(grid);
    }

    let halo_x = kernel.half_width();
    let halo_y = kernel.half_height();
    let domains = input.domains(grid, Scope::Channel)?;

    let borders = dispatcher.run_phase(
        "channel borders",
        grid.num_channels(),
        || (),
        |channel, _| ChannelBorders::extract(grid, input, channel, halo_x, halo_y),
    )?;

    let seams: Vec<usize> = (0..input.len())
        .filter(|&index| {
            let (_, x, y) = domains.split(index);
            x < halo_x
                || y < halo_y
                || x + halo_x >= domains.width
                || y + halo_y >= domains.height
        })
        .collect();

    let recomputed = dispatcher.run_phase(
        "seam convolution",
        seams.len(),
        || (),
        |i, _| {
            let index = seams[i];
            if !input.is_usable(index) {
                return Ok(Convolved::Skipped);
            }
            let (channel, x, y) = domains.split(index);
            let borders = &borders[channel];
            let second = input.second().map(|_| borders.plane(1));
            Ok(convolve_tile(&borders.plane(0), second.as_ref(), kernel, x, y))
        },
    )?;

    debug!(seam_tiles = seams.len(), "Recomputed channel seams");

    let mut output = convolved;
    for (&index, result) in seams.iter().zip(recomputed) {
        match result {
            Convolved::Skipped => {}
            Convolved::Value(a, b) => output.set_values(index, a, b, input.status(index)),
            Convolved::Lost => output.invalidate(index, TileStatus::Rejected),
        }
    }
    output.to_image_wide(grid)
}

// ============================================================================
// Pixel convolution
// ============================================================================

/// Convolves the image pixels tile by tile on the worker pool. In channel
/// scope the kernel never reaches across a channel edge. Blank pixels are
/// NaN in the result.
pub fn convolve_image<T: Pixel>(
    dispatcher: &Dispatcher,
    grid: &MeshGrid,
    image: ImageView<'_, T>,
    kernel: &Kernel,
    scope: Scope,
) -> Result<Buffer2<f32>> {
    kernel.validate()?;
    check_image(grid, image)?;
    let full = Rect::new(0, 0, grid.width(), grid.height());

    let tiles = dispatcher.run_phase(
        "convolve image",
        grid.num_tiles(),
        || (),
        |id, _| {
            let bounds = match scope {
                Scope::Channel => grid.channel_rect(grid.tile(id).channel),
                Scope::FullImage => full,
            };
            let plane = PixelPlane { image, bounds };
            let rect = grid.tile_rect(id);
            let mut out = Vec::with_capacity(rect.area());
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    out.push(convolve_pixel(&plane, image, kernel, x, y));
                }
            }
            Ok(out)
        },
    )?;

    let mut output = Buffer2::new_filled(grid.width(), grid.height(), f32::NAN);
    for (id, values) in tiles.into_iter().enumerate() {
        let rect = grid.tile_rect(id);
        for (i, v) in values.into_iter().enumerate() {
            output[(rect.x + i % rect.width, rect.y + i / rect.width)] = v;
        }
    }
    Ok(output)
}

/// Pixel counterpart of [`change_to_full_convolution`]: recomputes the
/// pixels of a channel-scope [`convolve_image`] result whose kernel
/// footprint crosses a channel edge.
pub fn change_to_full_image_convolution<T: Pixel>(
    dispatcher: &Dispatcher,
    grid: &MeshGrid,
    image: ImageView<'_, T>,
    kernel: &Kernel,
    mut convolved: Buffer2<f32>,
) -> Result<Buffer2<f32>> {
    kernel.validate()?;
    check_image(grid, image)?;
    if convolved.width() != grid.width() || convolved.height() != grid.height() {
        return Err(Error::ImageSizeMismatch {
            width: grid.width(),
            height: grid.height(),
            actual: convolved.len(),
        });
    }
    if grid.num_channels() == 1 {
        return Ok(convolved);
    }

    let hx = kernel.half_width();
    let hy = kernel.half_height();
    let plane = PixelPlane {
        image,
        bounds: Rect::new(0, 0, grid.width(), grid.height()),
    };

    let tiles = dispatcher.run_phase(
        "image seams",
        grid.num_tiles(),
        || (),
        |id, _| {
            let channel = grid.channel_rect(grid.tile(id).channel);
            let rect = grid.tile_rect(id);
            let mut out = Vec::new();
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    let near_seam = x < channel.x + hx
                        || y < channel.y + hy
                        || x + hx >= channel.right()
                        || y + hy >= channel.bottom();
                    if near_seam {
                        out.push((x, y, convolve_pixel(&plane, image, kernel, x, y)));
                    }
                }
            }
            Ok(out)
        },
    )?;

    for (x, y, v) in tiles.into_iter().flatten() {
        convolved[(x, y)] = v;
    }
    Ok(convolved)
}

fn convolve_pixel<T: Pixel>(
    plane: &PixelPlane<'_, T>,
    image: ImageView<'_, T>,
    kernel: &Kernel,
    x: usize,
    y: usize,
) -> f32 {
    if image.value_f32(x, y).is_none() {
        return f32::NAN;
    }
    convolve_at(plane, kernel, x as isize, y as isize).unwrap_or(f32::NAN)
}

fn check_image<T: Pixel>(grid: &MeshGrid, image: ImageView<'_, T>) -> Result<()> {
    if image.width() != grid.width() || image.height() != grid.height() {
        return Err(Error::ImageSizeMismatch {
            width: grid.width(),
            height: grid.height(),
            actual: image.pixels().len(),
        });
    }
    Ok(())
}
