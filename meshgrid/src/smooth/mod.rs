//! Box smoothing of tile values.
//!
//! Each usable tile becomes the mean (or median) of the usable tiles in the
//! `width x width` window around it, clipped to the tile's domain. Windows
//! never wrap and are never padded. Values are read from the input store and
//! written to a new one.

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::config::{SmoothMethod, SmoothingConfig};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::geometry::MeshGrid;
use crate::statistics::median_f32_mut;
use crate::store::{Domains, GridStore};

/// Smooths every usable tile of `store`, which must be in the layout
/// matching `config.scope`. Invalid tiles stay invalid.
pub fn smooth(
    dispatcher: &Dispatcher,
    grid: &MeshGrid,
    store: &GridStore,
    config: &SmoothingConfig,
) -> Result<GridStore> {
    config.validate()?;
    let domains = store.domains(grid, config.scope)?;
    let window = Window {
        store,
        domains,
        half: config.width / 2,
        method: config.method,
    };

    let smoothed = dispatcher.run_phase(
        "smooth",
        store.len(),
        || Vec::with_capacity(config.width * config.width),
        |index, scratch| Ok(window.apply(index, scratch)),
    )?;

    let mut output = store.clone();
    for (index, values) in smoothed.into_iter().enumerate() {
        if let Some((first, second)) = values {
            output.set_values(index, first, second, store.status(index));
        }
    }

    debug!(
        width = config.width,
        method = %config.method,
        scope = %config.scope,
        "Smoothed grid store"
    );
    Ok(output)
}

struct Window<'a> {
    store: &'a GridStore,
    domains: Domains,
    half: usize,
    method: SmoothMethod,
}

impl Window<'_> {
    fn apply(&self, index: usize, scratch: &mut Vec<f32>) -> Option<(f32, Option<f32>)> {
        if !self.store.is_usable(index) {
            return None;
        }
        let first = self.reduce(self.store.first(), index, scratch);
        let second = self
            .store
            .second()
            .map(|values| self.reduce(values, index, scratch));
        Some((first, second))
    }

    fn reduce(&self, values: &[f32], index: usize, scratch: &mut Vec<f32>) -> f32 {
        let (domain, x, y) = self.domains.split(index);
        let x_end = (x + self.half + 1).min(self.domains.width);
        let y_end = (y + self.half + 1).min(self.domains.height);

        scratch.clear();
        for ny in y.saturating_sub(self.half)..y_end {
            for nx in x.saturating_sub(self.half)..x_end {
                let neighbor = self.domains.join(domain, nx, ny);
                if self.store.is_usable(neighbor) {
                    scratch.push(values[neighbor]);
                }
            }
        }

        // The tile itself is always in its window.
        debug_assert!(!scratch.is_empty());
        match self.method {
            SmoothMethod::Mean => {
                let sum: f64 = scratch.iter().map(|&v| v as f64).sum();
                (sum / scratch.len() as f64) as f32
            }
            SmoothMethod::Median => median_f32_mut(scratch),
        }
    }
}
