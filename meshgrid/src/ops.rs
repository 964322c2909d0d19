//! Built-in tile operations.

use serde::{Deserialize, Serialize};

use crate::dispatch::{TileOperation, TileResult};
use crate::error::{Error, Result};
use crate::geometry::MeshGrid;
use crate::image::{Pixel, TileView};
use crate::statistics::{mode_quantile, sigma_clipped_median_mad};

/// Sky-style tile statistic: sigma-clipped median and MAD sigma of the
/// non-blank pixels.
///
/// Tiles with too few usable pixels are [`TileResult::Blank`]; tiles whose
/// pixel distribution is skewed by sources (mode quantile below
/// `min_mode_quantile`) are [`TileResult::Rejected`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaClipStats {
    /// Clipping threshold in sigmas.
    pub kappa: f32,
    pub iterations: usize,
    /// Minimum fraction of non-blank pixels for a tile to be measured.
    pub min_valid_fraction: f32,
    /// 0 disables the skew check.
    pub min_mode_quantile: f32,
}

impl Default for SigmaClipStats {
    fn default() -> Self {
        Self {
            kappa: 3.0,
            iterations: 2,
            min_valid_fraction: 0.5,
            min_mode_quantile: 0.0,
        }
    }
}

impl SigmaClipStats {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_valid_fraction) {
            return Err(Error::InvalidQuantile {
                name: "min_valid_fraction",
                value: self.min_valid_fraction,
            });
        }
        if !(0.0..=1.0).contains(&self.min_mode_quantile) {
            return Err(Error::InvalidQuantile {
                name: "min_mode_quantile",
                value: self.min_mode_quantile,
            });
        }
        Ok(())
    }
}

/// Scratch buffers of one worker, sized for the largest tile.
#[derive(Debug, Default)]
pub struct ClipScratch {
    values: Vec<f32>,
    deviations: Vec<f32>,
    sorted: Vec<f32>,
}

impl<T: Pixel> TileOperation<T> for SigmaClipStats {
    type Scratch = ClipScratch;

    fn num_quantities(&self) -> usize {
        2
    }

    fn validate(&self) -> Result<()> {
        SigmaClipStats::validate(self)
    }

    fn make_scratch(&self, grid: &MeshGrid) -> ClipScratch {
        let (w, h) = grid.max_tile_size();
        ClipScratch {
            values: Vec::with_capacity(w * h),
            deviations: Vec::with_capacity(w * h),
            sorted: Vec::with_capacity(w * h),
        }
    }

    fn compute(&self, tile: &TileView<'_, T>, scratch: &mut ClipScratch) -> Result<TileResult> {
        scratch.values.clear();
        tile.collect_valid(&mut scratch.values);

        let needed = (self.min_valid_fraction * tile.num_pixels() as f32).ceil() as usize;
        if scratch.values.is_empty() || scratch.values.len() < needed {
            return Ok(TileResult::Blank);
        }

        if self.min_mode_quantile > 0.0
            && mode_quantile(&scratch.values, &mut scratch.sorted) < self.min_mode_quantile
        {
            return Ok(TileResult::Rejected);
        }

        let (median, sigma) = sigma_clipped_median_mad(
            &mut scratch.values,
            &mut scratch.deviations,
            self.kappa,
            self.iterations,
        );
        Ok(TileResult::Pair(median, sigma))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshConfig;
    use crate::dispatch::Dispatcher;
    use crate::image::ImageView;
    use crate::store::TileStatus;

    fn run(pixels: &[f32], size: usize, mesh: usize, op: &SigmaClipStats) -> crate::GridStore {
        let grid = MeshGrid::new(size, size, &MeshConfig::with_geometry(mesh, 1, 1)).unwrap();
        let image = ImageView::float(pixels, size, size).unwrap();
        Dispatcher::new(2)
            .unwrap()
            .populate(&grid, image, op)
            .unwrap()
    }

    #[test]
    fn test_flat_image_gives_level_and_zero_sigma() {
        let pixels = vec![100.0f32; 32 * 32];
        let store = run(&pixels, 32, 16, &SigmaClipStats::default());
        assert_eq!(store.num_quantities(), 2);
        for i in 0..store.len() {
            assert_eq!(store.values(i), (100.0, Some(0.0)));
        }
    }

    #[test]
    fn test_mostly_blank_tile_is_blank() {
        let mut pixels = vec![5.0f32; 20 * 20];
        // 60 of the 100 pixels of tile 0 are blank.
        for y in 0..6 {
            for x in 0..10 {
                pixels[y * 20 + x] = f32::NAN;
            }
        }
        let store = run(&pixels, 20, 10, &SigmaClipStats::default());
        assert_eq!(store.status(0), TileStatus::Blank);
        assert_eq!(store.status(1), TileStatus::Valid);
    }

    #[test]
    fn test_skewed_tile_rejected() {
        let mut pixels: Vec<f32> = (0..20 * 20).map(|i| (i % 7) as f32).collect();
        // A bright source fills a third of tile 3.
        for y in 10..20 {
            for x in 10..14 {
                pixels[y * 20 + x] = 1000.0;
            }
        }
        let op = SigmaClipStats {
            min_mode_quantile: 0.3,
            ..Default::default()
        };
        let store = run(&pixels, 20, 10, &op);
        assert_eq!(store.status(3), TileStatus::Rejected);
        assert_eq!(store.status(0), TileStatus::Valid);
    }

    #[test]
    fn test_clipping_removes_hot_pixel() {
        let mut pixels: Vec<f32> = (0..16 * 16).map(|i| 10.0 + (i % 3) as f32).collect();
        pixels[5] = 10_000.0;
        let store = run(&pixels, 16, 16, &SigmaClipStats::default());
        let (median, sigma) = store.values(0);
        assert_eq!(median, 11.0);
        assert!(sigma.unwrap() < 2.0);
    }

    #[test]
    fn test_validate_fraction_range() {
        let op = SigmaClipStats {
            min_valid_fraction: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            op.validate(),
            Err(Error::InvalidQuantile {
                name: "min_valid_fraction",
                ..
            })
        ));
    }

    #[test]
    fn test_out_of_range_parameters_stop_populate() {
        let grid = MeshGrid::new(20, 20, &MeshConfig::with_geometry(10, 1, 1)).unwrap();
        let pixels = vec![5.0f32; 20 * 20];
        let image = ImageView::float(&pixels, 20, 20).unwrap();
        let dispatcher = Dispatcher::new(2).unwrap();

        for (fraction, quantile) in [(1.5, 0.0), (f32::NAN, 0.0), (0.5, f32::NAN)] {
            let op = SigmaClipStats {
                min_valid_fraction: fraction,
                min_mode_quantile: quantile,
                ..Default::default()
            };
            let result = dispatcher.populate(&grid, image, &op);
            assert!(
                matches!(result, Err(Error::InvalidQuantile { .. })),
                "fraction {fraction}, quantile {quantile}"
            );
        }
    }
}
