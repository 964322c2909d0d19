use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::config::Scope;
use crate::error::Error;
use crate::store::{Layout, TileStatus};
use crate::testing::{constant_store, grid};

fn config(width: usize, method: SmoothMethod, scope: Scope) -> SmoothingConfig {
    SmoothingConfig {
        width,
        method,
        scope,
    }
}

fn run(grid: &MeshGrid, store: &GridStore, config: &SmoothingConfig) -> GridStore {
    smooth(&Dispatcher::new(2).unwrap(), grid, store, config).unwrap()
}

fn assert_same(a: &[f32], b: &[f32]) {
    for (x, y) in a.iter().zip(b) {
        assert!(x == y || (x.is_nan() && y.is_nan()), "{x} != {y}");
    }
}

#[test]
fn test_width_one_is_identity() {
    let mut rng = StdRng::seed_from_u64(5);
    let grid = grid(90, 60, 10, 3, 2);
    let first: Vec<f32> = (0..grid.num_tiles())
        .map(|_| {
            if rng.random_bool(0.1) {
                f32::NAN
            } else {
                rng.random_range(-100.0..100.0)
            }
        })
        .collect();
    let second: Vec<f32> = (0..grid.num_tiles())
        .map(|_| rng.random_range(0.0..1.0))
        .collect();
    let channel = GridStore::from_values(Layout::Channel, first, Some(second));
    let image = channel.clone().to_image_wide(&grid).unwrap();

    for method in [SmoothMethod::Mean, SmoothMethod::Median] {
        let out = run(&grid, &channel, &config(1, method, Scope::Channel));
        assert_eq!(out.statuses(), channel.statuses());
        assert_same(out.first(), channel.first());
        assert_same(out.second().unwrap(), channel.second().unwrap());

        let out = run(&grid, &image, &config(1, method, Scope::FullImage));
        assert_eq!(out.statuses(), image.statuses());
    }
}

#[test]
fn test_mean_over_full_window() {
    // Single channel of 3x3 tiles valued 0..9.
    let grid = grid(30, 30, 10, 1, 1);
    let store = GridStore::from_values(Layout::Channel, (0..9).map(|i| i as f32).collect(), None);
    let out = run(&grid, &store, &config(3, SmoothMethod::Mean, Scope::Channel));
    assert_eq!(out.first()[4], 4.0);
    // Corner: in-bounds subset {0, 1, 3, 4}.
    assert_eq!(out.first()[0], 2.0);
    // Edge: {0, 1, 2, 3, 4, 5}.
    assert_eq!(out.first()[1], 2.5);
}

#[test]
fn test_reads_only_unsmoothed_values() {
    let grid = grid(50, 10, 10, 1, 1);
    let store = GridStore::from_values(
        Layout::Channel,
        vec![0.0, 0.0, 9.0, 0.0, 0.0],
        None,
    );
    let out = run(&grid, &store, &config(3, SmoothMethod::Mean, Scope::Channel));
    assert_eq!(out.first(), &[0.0, 3.0, 3.0, 3.0, 0.0]);
}

#[test]
fn test_invalid_tiles_skipped_and_kept_invalid() {
    let grid = grid(30, 30, 10, 1, 1);
    let mut values: Vec<f32> = vec![1.0; 9];
    values[4] = f32::NAN;
    values[5] = 7.0;
    let store = GridStore::from_values(Layout::Channel, values, None);

    let out = run(&grid, &store, &config(3, SmoothMethod::Mean, Scope::Channel));
    assert_eq!(out.status(4), TileStatus::Blank);
    assert!(out.first()[4].is_nan());
    // Tile 2 sees {1, 2, 5}; 4 is invalid.
    assert_eq!(out.first()[2], 3.0);
}

#[test]
fn test_median_resists_single_outlier() {
    let grid = grid(30, 30, 10, 1, 1);
    let mut values = vec![2.0f32; 9];
    values[4] = 1000.0;
    let store = GridStore::from_values(Layout::Channel, values, None);
    let out = run(&grid, &store, &config(3, SmoothMethod::Median, Scope::Channel));
    assert!(out.first().iter().all(|&v| v == 2.0));
}

#[test]
fn test_interpolated_status_preserved() {
    let grid = grid(30, 30, 10, 1, 1);
    let mut store = constant_store(&grid, 1.0);
    store.set_values(3, 1.0, None, TileStatus::Interpolated);
    let out = run(&grid, &store, &config(3, SmoothMethod::Mean, Scope::Channel));
    assert_eq!(out.status(3), TileStatus::Interpolated);
}

#[test]
fn test_channel_scope_stops_at_seams() {
    // Two channels side by side, 2x2 tiles each: left 0, right 10.
    let grid = grid(40, 20, 10, 2, 1);
    let first: Vec<f32> = (0..8).map(|id| if id < 4 { 0.0 } else { 10.0 }).collect();
    let channel = GridStore::from_values(Layout::Channel, first, None);

    let confined = run(&grid, &channel, &config(3, SmoothMethod::Mean, Scope::Channel));
    assert!(confined.first()[..4].iter().all(|&v| v == 0.0));
    assert!(confined.first()[4..].iter().all(|&v| v == 10.0));

    let image = channel.to_image_wide(&grid).unwrap();
    let full = run(&grid, &image, &config(3, SmoothMethod::Mean, Scope::FullImage));
    // Image row 0: [0, 0, 10, 10]; column 1 sees columns 0..3 of both rows.
    let row = &full.first()[..4];
    assert_eq!(row[0], 0.0);
    assert!((row[1] - 10.0 / 3.0).abs() < 1e-6);
    assert!((row[2] - 20.0 / 3.0).abs() < 1e-6);
    assert_eq!(row[3], 10.0);
}

#[test]
fn test_even_width_rejected() {
    let grid = grid(30, 30, 10, 1, 1);
    let store = constant_store(&grid, 1.0);
    let result = smooth(
        &Dispatcher::new(1).unwrap(),
        &grid,
        &store,
        &config(2, SmoothMethod::Mean, Scope::Channel),
    );
    assert!(matches!(result, Err(Error::InvalidSmoothWidth(2))));
}

#[test]
fn test_wrong_layout_rejected() {
    let grid = grid(40, 20, 10, 2, 1);
    let store = constant_store(&grid, 1.0);
    let result = smooth(
        &Dispatcher::new(1).unwrap(),
        &grid,
        &store,
        &config(3, SmoothMethod::Mean, Scope::FullImage),
    );
    assert!(matches!(result, Err(Error::LayoutMismatch { .. })));
}
