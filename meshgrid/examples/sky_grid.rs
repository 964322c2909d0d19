//! Measures the sky of a synthetic frame on a 2x2-channel mesh grid and
//! writes the per-tile table.
//!
//! ```text
//! cargo run -p meshgrid --example sky_grid -- [config.yaml] [table.yaml]
//! ```

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use common::log_setup::{setup_logging, LogConfig};
use common::SerdeFormat;
use meshgrid::diagnostics::garray_image;
use meshgrid::{
    GridTable, ImageView, InterpolationConfig, MeshConfig, MeshPipeline, SigmaClipStats,
    SmoothingConfig, TileStatus,
};

const WIDTH: usize = 1024;
const HEIGHT: usize = 768;

/// Sky gradient with noise, a few bright sources and a blank stripe.
fn synthetic_frame() -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut pixels: Vec<f32> = (0..WIDTH * HEIGHT)
        .map(|i| {
            let x = (i % WIDTH) as f32;
            200.0 + 0.05 * x + rng.random_range(-8.0..8.0)
        })
        .collect();

    for _ in 0..40 {
        let cx = rng.random_range(20..WIDTH - 20) as f32;
        let cy = rng.random_range(20..HEIGHT - 20) as f32;
        let flux = rng.random_range(500.0..5000.0);
        for y in (cy as usize - 15)..(cy as usize + 15) {
            for x in (cx as usize - 15)..(cx as usize + 15) {
                let r2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                pixels[y * WIDTH + x] += flux * (-r2 / 18.0).exp();
            }
        }
    }

    for y in 300..340 {
        for x in 0..WIDTH / 2 {
            pixels[y * WIDTH + x] = f32::NAN;
        }
    }
    pixels
}

fn load_config(path: Option<&str>) -> anyhow::Result<MeshConfig> {
    let Some(path) = path else {
        return Ok(MeshConfig {
            mesh_size: 64,
            channels_x: 2,
            channels_y: 2,
            interpolation: Some(InterpolationConfig::default()),
            smoothing: Some(SmoothingConfig::default()),
            ..Default::default()
        });
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    let config = common::deserialize(&text, SerdeFormat::from_file_name(path)?)
        .with_context(|| format!("Failed to parse {path}"))?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    setup_logging(&LogConfig::new("sky_grid"))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first().map(String::as_str))?;
    let table_path = args.get(1).cloned().unwrap_or_else(|| "sky_grid.yaml".into());

    let pixels = synthetic_frame();
    let image = ImageView::float(&pixels, WIDTH, HEIGHT)?;
    let stats = SigmaClipStats {
        min_mode_quantile: 0.3,
        ..Default::default()
    };

    let mesh_based_check = config.mesh_based_check;
    let pipeline = MeshPipeline::new(config)?;
    let output = pipeline.run(image, &stats)?;

    info!(
        tiles = output.store.len(),
        valid = output.store.count_status(TileStatus::Valid),
        interpolated = output.store.count_status(TileStatus::Interpolated),
        "Sky measured"
    );
    for failure in &output.failures {
        warn!(
            tile = failure.tile,
            channel = failure.channel,
            reason = %failure.reason,
            "Tile left without a sky value"
        );
    }

    if let Some(check) = garray_image(&output.grid, &output.store, 0, mesh_based_check)? {
        let valid: Vec<f32> = check.iter().copied().filter(|v| !v.is_nan()).collect();
        let mean = valid.iter().map(|&v| v as f64).sum::<f64>() / valid.len().max(1) as f64;
        info!(
            width = check.width(),
            height = check.height(),
            mean_sky = mean,
            "Sky check image"
        );
    }

    GridTable::new(&output.grid, &output.store, None)?.write(&table_path)?;
    Ok(())
}
