//! Nearest-neighbor interpolation of invalid tiles.
//!
//! Every invalid tile is replaced by the median of its nearest usable
//! neighbors. The search expands ring by ring (8-connected, so ring `k` holds
//! the tiles at Chebyshev distance `k`) inside the tile's domain: its channel,
//! or the whole grid. Once enough neighbors are held, rings keep expanding
//! until no unseen tile can be closer than the farthest of the nearest ones
//! by Euclidean tile distance. If the first quantity of that set looks skewed
//! (mode quantile below the configured minimum) the set is widened and the
//! search continues.
//!
//! The search reads only the input store; filled values go to a new store,
//! so results never depend on the order tiles are processed in. Tiles that
//! cannot be filled stay invalid and are reported in
//! [`InterpolationOutcome::Incomplete`].

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::InterpolationConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::geometry::MeshGrid;
use crate::statistics::{median_f32_mut, mode_quantile};
use crate::store::{Domains, GridStore, TileStatus};

/// Fewest neighbors an interpolated value may be built from.
pub const MIN_ACCEPTABLE_NEAREST: usize = 3;

// ============================================================================
// Outcome
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureReason {
    /// The whole domain holds fewer than [`MIN_ACCEPTABLE_NEAREST`] usable tiles.
    Insufficient,
    /// Enough neighbors exist but none of the candidate sets passed the
    /// mode quantile check.
    Untrustworthy,
}

/// A tile that is still invalid after interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpolationFailure {
    /// Channel-based id.
    pub tile: usize,
    pub channel: usize,
    /// Usable neighbors found in the domain.
    pub found: usize,
    pub reason: FailureReason,
}

/// Result of an interpolation run. Both variants carry the output store;
/// what to do with tiles that could not be filled is the caller's decision.
#[derive(Debug, Clone)]
pub enum InterpolationOutcome {
    Complete(GridStore),
    Incomplete {
        store: GridStore,
        failures: Vec<InterpolationFailure>,
    },
}

impl InterpolationOutcome {
    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn store(&self) -> &GridStore {
        match self {
            Self::Complete(store) | Self::Incomplete { store, .. } => store,
        }
    }

    pub fn failures(&self) -> &[InterpolationFailure] {
        match self {
            Self::Complete(_) => &[],
            Self::Incomplete { failures, .. } => failures,
        }
    }

    pub fn into_store(self) -> GridStore {
        self.into_parts().0
    }

    pub fn into_parts(self) -> (GridStore, Vec<InterpolationFailure>) {
        match self {
            Self::Complete(store) => (store, Vec::new()),
            Self::Incomplete { store, failures } => (store, failures),
        }
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Fills the invalid tiles of `store`. The store must be in the layout
/// matching `config.scope`.
pub fn interpolate(
    dispatcher: &Dispatcher,
    grid: &MeshGrid,
    store: &GridStore,
    config: &InterpolationConfig,
) -> Result<InterpolationOutcome> {
    config.validate()?;
    let domains = store.domains(grid, config.scope)?;

    let targets: Vec<usize> = (0..store.len())
        .filter(|&i| match store.status(i) {
            TileStatus::Blank => true,
            TileStatus::Rejected => !config.only_blank,
            TileStatus::Valid | TileStatus::Interpolated => false,
        })
        .collect();

    if targets.is_empty() {
        debug!(scope = %config.scope, "No tiles to interpolate");
        return Ok(InterpolationOutcome::Complete(store.clone()));
    }

    let search = NeighborSearch {
        store,
        domains,
        num_nearest: config.num_nearest,
        min_mode_quantile: config.min_mode_quantile,
    };

    let found = dispatcher.run_phase(
        "interpolate",
        targets.len(),
        || SearchScratch::new(domains.domain_len()),
        |i, scratch| Ok(search.run(targets[i], scratch)),
    )?;

    let mut output = store.clone();
    let mut failures = Vec::new();
    for (&index, result) in targets.iter().zip(found) {
        match result {
            Search::Found(first, second) => {
                output.set_values(index, first, second, TileStatus::Interpolated)
            }
            Search::Failed { found, reason } => {
                let tile = store.tile_id(grid, index);
                failures.push(InterpolationFailure {
                    tile,
                    channel: grid.tile(tile).channel,
                    found,
                    reason,
                });
            }
        }
    }

    info!(
        scope = %config.scope,
        targets = targets.len(),
        filled = targets.len() - failures.len(),
        failed = failures.len(),
        "Interpolated invalid tiles"
    );

    if failures.is_empty() {
        return Ok(InterpolationOutcome::Complete(output));
    }

    let mut channels: Vec<usize> = failures.iter().map(|f| f.channel).collect();
    channels.sort_unstable();
    channels.dedup();
    warn!(
        failed = failures.len(),
        channels = ?channels,
        "Tiles left invalid after exhausting the search domain"
    );
    Ok(InterpolationOutcome::Incomplete {
        store: output,
        failures,
    })
}

// ============================================================================
// Neighbor search
// ============================================================================

enum Search {
    Found(f32, Option<f32>),
    Failed { found: usize, reason: FailureReason },
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    /// Squared Euclidean distance in tile units.
    dist2: usize,
    /// Index within the domain.
    local: usize,
}

/// Request-scoped buffers of one worker.
struct SearchScratch {
    /// Search generation in which each tile was last visited.
    visited: Vec<u32>,
    generation: u32,
    frontier: Vec<usize>,
    next: Vec<usize>,
    candidates: Vec<Candidate>,
    values: Vec<f32>,
    sorted: Vec<f32>,
}

impl SearchScratch {
    fn new(domain_len: usize) -> Self {
        Self {
            visited: vec![0; domain_len],
            generation: 0,
            frontier: Vec::new(),
            next: Vec::new(),
            candidates: Vec::new(),
            values: Vec::new(),
            sorted: Vec::new(),
        }
    }

    fn begin(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.visited.fill(0);
            self.generation = 1;
        }
        self.frontier.clear();
        self.next.clear();
        self.candidates.clear();
    }
}

struct NeighborSearch<'a> {
    store: &'a GridStore,
    domains: Domains,
    num_nearest: usize,
    min_mode_quantile: f32,
}

/// Whether the `target` nearest candidates can no longer change: the
/// farthest of them is closer than any tile outside the first `ring` rings.
fn nearest_settled(candidates: &mut [Candidate], target: usize, ring: usize) -> bool {
    let (_, farthest, _) =
        candidates.select_nth_unstable_by_key(target - 1, |c| (c.dist2, c.local));
    farthest.dist2 < (ring + 1) * (ring + 1)
}

impl NeighborSearch<'_> {
    fn run(&self, index: usize, scratch: &mut SearchScratch) -> Search {
        let (domain, x0, y0) = self.domains.split(index);
        let offset = self.domains.join(domain, 0, 0);
        let width = self.domains.width as isize;
        let height = self.domains.height as isize;

        scratch.begin();
        let start = y0 * self.domains.width + x0;
        scratch.visited[start] = scratch.generation;
        scratch.frontier.push(start);

        let mut target = self.num_nearest.max(MIN_ACCEPTABLE_NEAREST);
        // Rings expanded so far; every unseen tile is at least `ring + 1` away.
        let mut ring = 0;
        loop {
            while scratch.candidates.len() >= target
                && (scratch.frontier.is_empty()
                    || nearest_settled(&mut scratch.candidates, target, ring))
            {
                if let Some((first, second)) = self.estimate(offset, target, scratch) {
                    return Search::Found(first, second);
                }
                target += self.num_nearest;
            }
            if scratch.frontier.is_empty() {
                break;
            }

            // Expand one ring.
            let SearchScratch {
                visited,
                generation,
                frontier,
                next,
                candidates,
                ..
            } = &mut *scratch;
            next.clear();
            for &cell in frontier.iter() {
                let cx = (cell % self.domains.width) as isize;
                let cy = (cell / self.domains.width) as isize;
                for dy in -1..=1isize {
                    for dx in -1..=1isize {
                        let nx = cx + dx;
                        let ny = cy + dy;
                        if nx < 0 || ny < 0 || nx >= width || ny >= height {
                            continue;
                        }
                        let local = ny as usize * self.domains.width + nx as usize;
                        if visited[local] == *generation {
                            continue;
                        }
                        visited[local] = *generation;
                        next.push(local);
                        if self.store.is_usable(offset + local) {
                            let ddx = nx.abs_diff(x0 as isize);
                            let ddy = ny.abs_diff(y0 as isize);
                            candidates.push(Candidate {
                                dist2: ddx * ddx + ddy * ddy,
                                local,
                            });
                        }
                    }
                }
            }
            std::mem::swap(frontier, next);
            ring += 1;
        }

        let found = scratch.candidates.len();
        if found < MIN_ACCEPTABLE_NEAREST {
            return Search::Failed {
                found,
                reason: FailureReason::Insufficient,
            };
        }
        match self.estimate(offset, found, scratch) {
            Some((first, second)) => Search::Found(first, second),
            None => Search::Failed {
                found,
                reason: FailureReason::Untrustworthy,
            },
        }
    }

    /// Medians of the `count` nearest candidates, `None` if their first
    /// quantity fails the mode quantile check.
    fn estimate(
        &self,
        offset: usize,
        count: usize,
        scratch: &mut SearchScratch,
    ) -> Option<(f32, Option<f32>)> {
        scratch
            .candidates
            .sort_unstable_by_key(|c| (c.dist2, c.local));
        let nearest = &scratch.candidates[..count];

        scratch.values.clear();
        scratch
            .values
            .extend(nearest.iter().map(|c| self.store.first()[offset + c.local]));

        if self.min_mode_quantile > 0.0
            && mode_quantile(&scratch.values, &mut scratch.sorted) < self.min_mode_quantile
        {
            return None;
        }
        let first = median_f32_mut(&mut scratch.values);

        let second = self.store.second().map(|values| {
            scratch.values.clear();
            scratch
                .values
                .extend(nearest.iter().map(|c| values[offset + c.local]));
            median_f32_mut(&mut scratch.values)
        });

        Some((first, second))
    }
}
