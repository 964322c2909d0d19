use super::*;
use crate::config::Scope;
use crate::dispatch::TileResult;
use crate::error::Error;
use crate::store::Layout;
use crate::testing::{constant_store, grid, init_tracing};

/// Channel-based id of local tile `(x, y)` in `channel` of the reference
/// 100x100 grid with 2x2 channels of 5x5 tiles.
fn id(channel: usize, x: usize, y: usize) -> usize {
    channel * 25 + y * 5 + x
}

fn set(store: &mut GridStore, index: usize, value: f32) {
    store.set_result(index, TileResult::Value(value));
}

fn config(num_nearest: usize) -> InterpolationConfig {
    InterpolationConfig {
        num_nearest,
        ..Default::default()
    }
}

fn run(grid: &MeshGrid, store: &GridStore, config: &InterpolationConfig) -> InterpolationOutcome {
    interpolate(&Dispatcher::new(3).unwrap(), grid, store, config).unwrap()
}

// --- Reference scenarios ---

#[test]
fn test_interior_tile_uses_median_of_eight_neighbors() {
    init_tracing();
    let grid = grid(100, 100, 10, 2, 2);
    let mut store = constant_store(&grid, 0.0);
    let neighbors = [1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 5.0, 100.0];
    let mut k = 0;
    for dy in 0..3 {
        for dx in 0..3 {
            if (dx, dy) != (1, 1) {
                set(&mut store, id(0, 1 + dx, 1 + dy), neighbors[k]);
                k += 1;
            }
        }
    }
    let target = id(0, 2, 2);
    store.invalidate(target, TileStatus::Rejected);

    let outcome = run(&grid, &store, &config(8));
    assert!(outcome.is_complete());
    let value = outcome.store().first()[target];
    // Median of the skewed set, not its mean of 15.
    assert_eq!(value, 3.0);
    assert_eq!(outcome.store().status(target), TileStatus::Interpolated);
}

#[test]
fn test_corner_tile_uses_its_three_neighbors() {
    let grid = grid(100, 100, 10, 2, 2);
    let mut store = constant_store(&grid, 1000.0);
    // Channel 3 corner: its only in-channel neighbors.
    set(&mut store, id(3, 1, 0), 10.0);
    set(&mut store, id(3, 0, 1), 20.0);
    set(&mut store, id(3, 1, 1), 30.0);
    store.invalidate(id(3, 0, 0), TileStatus::Blank);

    let outcome = run(&grid, &store, &config(3));
    assert!(outcome.is_complete());
    assert_eq!(outcome.store().first()[id(3, 0, 0)], 20.0);
}

#[test]
fn test_three_valid_tiles_suffice_after_exhausting_channel() {
    let grid = grid(100, 100, 10, 2, 2);
    let mut store = constant_store(&grid, 5.0);
    for i in grid.channel_tiles(0) {
        store.invalidate(i, TileStatus::Blank);
    }
    set(&mut store, id(0, 1, 0), 10.0);
    set(&mut store, id(0, 0, 1), 20.0);
    set(&mut store, id(0, 1, 1), 30.0);

    // The default target of 8 can never be met inside channel 0.
    let outcome = run(&grid, &store, &config(8));
    assert!(outcome.is_complete(), "{:?}", outcome.failures());
    for i in grid.channel_tiles(0) {
        assert!(outcome.store().status(i).is_usable());
    }
    assert_eq!(outcome.store().first()[id(0, 0, 0)], 20.0);
    assert_eq!(outcome.store().first()[id(0, 4, 4)], 20.0);
    // Other channels untouched.
    assert_eq!(outcome.store().first()[id(1, 0, 0)], 5.0);
}

#[test]
fn test_fully_invalid_channel_reports_insufficiency() {
    let grid = grid(100, 100, 10, 2, 2);
    let mut store = constant_store(&grid, 5.0);
    for i in grid.channel_tiles(1) {
        store.invalidate(i, TileStatus::Blank);
    }

    let outcome = run(&grid, &store, &InterpolationConfig::default());
    assert!(!outcome.is_complete());
    let failures = outcome.failures();
    assert_eq!(failures.len(), 25);
    for failure in failures {
        assert_eq!(failure.channel, 1);
        assert_eq!(failure.found, 0);
        assert_eq!(failure.reason, FailureReason::Insufficient);
    }
    // Nothing is passed off as interpolated.
    let store = outcome.store();
    for i in grid.channel_tiles(1) {
        assert_eq!(store.status(i), TileStatus::Blank);
        assert!(store.first()[i].is_nan());
    }
}

#[test]
fn test_two_valid_tiles_are_not_enough() {
    let grid = grid(100, 100, 10, 2, 2);
    let mut store = constant_store(&grid, 5.0);
    for i in grid.channel_tiles(2) {
        store.invalidate(i, TileStatus::Rejected);
    }
    set(&mut store, id(2, 0, 0), 1.0);
    set(&mut store, id(2, 4, 4), 1.0);

    let outcome = run(&grid, &store, &config(3));
    let failures = outcome.failures();
    assert_eq!(failures.len(), 23);
    assert!(failures
        .iter()
        .all(|f| f.found == 2 && f.reason == FailureReason::Insufficient));
}

// --- Properties ---

#[test]
fn test_no_invalid_tiles_leaves_store_unchanged() {
    let grid = grid(60, 40, 10, 3, 2);
    let first: Vec<f32> = (0..grid.num_tiles()).map(|i| i as f32 * 0.25).collect();
    let store = GridStore::from_values(Layout::Channel, first, None);

    let outcome = run(&grid, &store, &InterpolationConfig::default());
    assert!(outcome.is_complete());
    assert_eq!(outcome.into_store(), store);
}

#[test]
fn test_filled_tiles_do_not_feed_each_other() {
    // A block of invalid tiles: each is filled from the initially valid
    // tiles only, whatever the processing order.
    let grid = grid(50, 50, 10, 1, 1);
    let mut store = constant_store(&grid, 1.0);
    for i in [6, 7, 8, 11, 12, 13, 16, 17, 18] {
        store.invalidate(i, TileStatus::Blank);
    }
    let a = run(&grid, &store, &config(8)).into_store();
    let b = interpolate(&Dispatcher::new(1).unwrap(), &grid, &store, &config(8))
        .unwrap()
        .into_store();
    assert_eq!(a, b);
    assert_eq!(a.first()[12], 1.0);
}

#[test]
fn test_only_blank_keeps_rejected_tiles() {
    let grid = grid(50, 50, 10, 1, 1);
    let mut store = constant_store(&grid, 4.0);
    store.invalidate(6, TileStatus::Rejected);
    store.invalidate(18, TileStatus::Blank);

    let config = InterpolationConfig {
        only_blank: true,
        ..Default::default()
    };
    let outcome = run(&grid, &store, &config);
    assert!(outcome.is_complete());
    let out = outcome.store();
    assert_eq!(out.status(6), TileStatus::Rejected);
    assert!(out.first()[6].is_nan());
    assert_eq!(out.status(18), TileStatus::Interpolated);
    assert_eq!(out.first()[18], 4.0);
}

#[test]
fn test_both_quantities_share_neighbors() {
    let grid = grid(30, 30, 10, 1, 1);
    let first: Vec<f32> = (0..9).map(|i| i as f32).collect();
    let second: Vec<f32> = (0..9).map(|i| 100.0 - i as f32 * 10.0).collect();
    let mut store = GridStore::from_values(Layout::Channel, first, Some(second));
    store.invalidate(4, TileStatus::Rejected);

    let outcome = run(&grid, &store, &config(8));
    let (first, second) = outcome.store().values(4);
    // Neighbors 0,1,2,3,5,6,7,8.
    assert_eq!(first, 4.0);
    assert_eq!(second, Some(60.0));
}

#[test]
fn test_nearest_set_is_euclidean_not_by_ring() {
    // 11x11 tiles, center (5, 5) invalid. The 44 tiles within Chebyshev
    // distance 3 other than the ring-3 corners (squared distance 18) are
    // nearer than the ring-4 axis tiles (16), which complete the nearest 48.
    let grid = grid(110, 110, 10, 1, 1);
    let mut store = constant_store(&grid, 100.0);
    let mut k = 0;
    for y in 2..=8usize {
        for x in 2..=8usize {
            let (dx, dy) = (x.abs_diff(5), y.abs_diff(5));
            if (dx, dy) == (0, 0) {
                continue;
            }
            let value = if (dx, dy) == (3, 3) {
                -100.0
            } else {
                k += 1;
                (k % 2) as f32
            };
            set(&mut store, y * 11 + x, value);
        }
    }
    assert_eq!(k, 44);
    let center = 5 * 11 + 5;
    store.invalidate(center, TileStatus::Rejected);

    let outcome = run(&grid, &store, &config(48));
    assert!(outcome.is_complete());
    // 22 zeros, 22 ones and four 100s: the corners never enter.
    assert_eq!(outcome.store().first()[center], 1.0);
}

// --- Mode quantile check ---

#[test]
fn test_skewed_neighbors_widen_the_search() {
    // 5x5 tiles; center tile invalid.
    let grid = grid(50, 50, 10, 1, 1);
    let mut store = constant_store(&grid, 2.0);
    for i in [6, 7, 8, 11, 13, 16, 17] {
        set(&mut store, i, 1.0);
    }
    set(&mut store, 18, 9.0);
    store.invalidate(12, TileStatus::Rejected);

    // Without the check the first ring decides.
    let plain = run(&grid, &store, &config(8)).into_store();
    assert_eq!(plain.first()[12], 1.0);

    // The first ring is skewed, the nearest 16 are not.
    let checked = InterpolationConfig {
        num_nearest: 8,
        min_mode_quantile: 0.3,
        ..Default::default()
    };
    let widened = run(&grid, &store, &checked).into_store();
    assert_eq!(widened.first()[12], 2.0);
}

#[test]
fn test_untrustworthy_when_domain_too_skewed() {
    let grid = grid(30, 30, 10, 1, 1);
    let mut first = vec![0.0f32; 9];
    first[8] = 1000.0;
    let mut store = GridStore::from_values(Layout::Channel, first, None);
    store.invalidate(4, TileStatus::Rejected);

    let config = InterpolationConfig {
        num_nearest: 8,
        min_mode_quantile: 0.3,
        ..Default::default()
    };
    let outcome = run(&grid, &store, &config);
    assert_eq!(
        outcome.failures(),
        &[InterpolationFailure {
            tile: 4,
            channel: 0,
            found: 8,
            reason: FailureReason::Untrustworthy,
        }]
    );
}

// --- Scope ---

#[test]
fn test_full_image_scope_crosses_channels() {
    let grid = grid(100, 100, 10, 2, 2);
    let mut store = constant_store(&grid, 7.0);
    for i in grid.channel_tiles(1) {
        store.invalidate(i, TileStatus::Blank);
    }
    let store = store.to_image_wide(&grid).unwrap();
    let config = InterpolationConfig {
        scope: Scope::FullImage,
        ..Default::default()
    };

    let outcome = run(&grid, &store, &config);
    assert!(outcome.is_complete());
    let out = outcome.store();
    assert_eq!(out.layout(), Layout::ImageWide);
    assert!(out.first().iter().all(|&v| v == 7.0));
}

#[test]
fn test_failures_report_channel_based_ids_in_image_layout() {
    let grid = grid(40, 20, 10, 2, 1);
    let store = GridStore::new_blank(Layout::ImageWide, grid.num_tiles(), 1);
    let config = InterpolationConfig {
        scope: Scope::FullImage,
        ..Default::default()
    };
    let outcome = run(&grid, &store, &config);
    let mut tiles: Vec<usize> = outcome.failures().iter().map(|f| f.tile).collect();
    tiles.sort_unstable();
    assert_eq!(tiles, (0..grid.num_tiles()).collect::<Vec<_>>());
    for failure in outcome.failures() {
        assert_eq!(failure.channel, grid.tile(failure.tile).channel);
    }
}

#[test]
fn test_scope_layout_mismatch_is_an_error() {
    let grid = grid(100, 100, 10, 2, 2);
    let store = constant_store(&grid, 1.0).to_image_wide(&grid).unwrap();
    let result = interpolate(
        &Dispatcher::new(1).unwrap(),
        &grid,
        &store,
        &InterpolationConfig::default(),
    );
    assert!(matches!(
        result,
        Err(Error::LayoutMismatch {
            expected: Layout::Channel,
            actual: Layout::ImageWide
        })
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let grid = grid(20, 20, 10, 1, 1);
    let store = constant_store(&grid, 1.0);
    let result = interpolate(&Dispatcher::new(1).unwrap(), &grid, &store, &config(2));
    assert!(matches!(result, Err(Error::InvalidNumNearest { .. })));
}
