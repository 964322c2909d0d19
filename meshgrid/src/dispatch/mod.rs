//! Worker pool that runs per-tile work in barrier-separated phases.
//!
//! A phase splits `0..n` into one contiguous range per worker thread, runs
//! every range on the dedicated rayon pool with a worker-local scratch value,
//! and returns only once all workers are done. The join at the end of a phase
//! is the barrier: results of phase N are visible to every worker of phase
//! N+1. A fatal error in any worker stops the other workers before their next
//! tile and is returned after the join, so a failed phase never commits.


use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::geometry::MeshGrid;
use crate::image::{ImageView, Pixel, TileView};
use crate::store::{GridStore, Layout};

// ============================================================================
// Tile operation
// ============================================================================

/// Outcome of a per-tile statistic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TileResult {
    Value(f32),
    /// Two quantities computed together, e.g. a location and a dispersion.
    Pair(f32, f32),
    /// Computed, but not trustworthy. Left for interpolation.
    Rejected,
    /// Too few usable pixels. Left for interpolation.
    Blank,
}

impl TileResult {
    /// Number of quantities carried, `None` for invalid results.
    pub fn quantities(&self) -> Option<usize> {
        match self {
            Self::Value(_) => Some(1),
            Self::Pair(..) => Some(2),
            Self::Rejected | Self::Blank => None,
        }
    }
}

/// The statistic computed on every tile.
///
/// `compute` reports a tile it cannot measure as [`TileResult::Rejected`] or
/// [`TileResult::Blank`]; an `Err` is reserved for conditions that must stop
/// the whole run.
pub trait TileOperation<T: Pixel>: Sync {
    /// Per-worker scratch space, created once per worker and phase.
    type Scratch: Send;

    /// Quantities produced per tile, 1 or 2.
    fn num_quantities(&self) -> usize {
        1
    }

    /// Checks the operation's parameters; runs once before any tile.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn make_scratch(&self, grid: &MeshGrid) -> Self::Scratch;

    fn compute(&self, tile: &TileView<'_, T>, scratch: &mut Self::Scratch) -> Result<TileResult>;
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Fixed-size worker pool.
#[derive(Debug)]
pub struct Dispatcher {
    pool: rayon::ThreadPool,
    num_threads: usize,
}

impl Dispatcher {
    pub fn new(num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(Error::InvalidThreadCount);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("meshgrid-{i}"))
            .build()?;
        Ok(Self { pool, num_threads })
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Contiguous per-thread ranges covering `0..n`. Range lengths differ by
    /// at most one; threads without work get no range.
    pub fn partition(&self, n: usize) -> Vec<Range<usize>> {
        let base = n / self.num_threads;
        let extra = n % self.num_threads;
        let mut ranges = Vec::with_capacity(self.num_threads);
        let mut start = 0;
        for thread in 0..self.num_threads {
            let len = base + usize::from(thread < extra);
            if len == 0 {
                break;
            }
            ranges.push(start..start + len);
            start += len;
        }
        debug_assert_eq!(start, n);
        ranges
    }

    /// Runs `work` on every index of `0..n` and returns the results in index
    /// order. `init` builds the scratch value of each worker.
    pub fn run_phase<S, R, I, F>(&self, phase: &str, n: usize, init: I, work: F) -> Result<Vec<R>>
    where
        R: Send,
        I: Fn() -> S + Sync,
        F: Fn(usize, &mut S) -> Result<R> + Sync,
    {
        let started = Instant::now();
        let ranges = self.partition(n);
        let abort = AtomicBool::new(false);
        let failure: Mutex<Option<Error>> = Mutex::new(None);

        let chunks: Vec<Vec<R>> = self.pool.install(|| {
            ranges
                .into_par_iter()
                .map(|range| {
                    let mut scratch = init();
                    let mut out = Vec::with_capacity(range.len());
                    for index in range {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        match work(index, &mut scratch) {
                            Ok(result) => out.push(result),
                            Err(err) => {
                                abort.store(true, Ordering::Relaxed);
                                failure.lock().get_or_insert(err);
                                break;
                            }
                        }
                    }
                    out
                })
                .collect()
        });

        if let Some(err) = failure.into_inner() {
            error!(phase, error = %err, "Phase aborted");
            return Err(err);
        }

        debug!(
            phase,
            items = n,
            threads = self.num_threads,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Phase complete"
        );

        let results: Vec<R> = chunks.into_iter().flatten().collect();
        debug_assert_eq!(results.len(), n);
        Ok(results)
    }

    /// Runs `op` on every tile of `grid` and collects the results in a
    /// channel-layout store. Tiles the operation could not measure stay
    /// invalid.
    pub fn populate<T, Op>(
        &self,
        grid: &MeshGrid,
        image: ImageView<'_, T>,
        op: &Op,
    ) -> Result<GridStore>
    where
        T: Pixel,
        Op: TileOperation<T>,
    {
        if image.width() != grid.width() || image.height() != grid.height() {
            return Err(Error::ImageSizeMismatch {
                width: grid.width(),
                height: grid.height(),
                actual: image.pixels().len(),
            });
        }
        let quantities = op.num_quantities();
        if !(1..=2).contains(&quantities) {
            return Err(Error::InvalidQuantityCount(quantities));
        }
        op.validate()?;

        let results = self.run_phase(
            "populate",
            grid.num_tiles(),
            || op.make_scratch(grid),
            |id, scratch| {
                let tile = TileView::new(grid, image, id);
                let result = op.compute(&tile, scratch)?;
                match result.quantities() {
                    Some(actual) if actual != quantities => Err(Error::QuantityMismatch {
                        tile: id,
                        expected: quantities,
                        actual,
                    }),
                    _ => Ok(result),
                }
            },
        )?;

        let mut store = GridStore::new_blank(Layout::Channel, grid.num_tiles(), quantities);
        for (id, result) in results.into_iter().enumerate() {
            store.set_result(id, result);
        }

        debug!(
            tiles = store.len(),
            valid = store.count_status(crate::store::TileStatus::Valid),
            "Populated grid store"
        );
        Ok(store)
    }
}
