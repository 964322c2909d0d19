//! Robust statistics shared by tile operations and post-processing.

/// Scale factor converting MAD to a Gaussian sigma.
pub const MAD_TO_SIGMA: f32 = 1.4826022;

#[inline]
pub fn mad_to_sigma(mad: f32) -> f32 {
    mad * MAD_TO_SIGMA
}

/// Median of a non-empty slice, reordering it. Even lengths average the two
/// middle values. NaN values must be removed beforehand.
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;

    if len % 2 == 0 {
        let (left, right_median, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
        let right = *right_median;
        // Left median is the max of the left partition.
        let left = left.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        (left + right) * 0.5
    } else {
        let (_, median, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
        *median
    }
}

/// Mean accumulated in `f64`.
pub fn mean(values: &[f32]) -> f32 {
    debug_assert!(!values.is_empty());
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    (sum / values.len() as f64) as f32
}

/// Quantile of the Pearson mode estimate `3 * median - 2 * mean`: the
/// fraction of values below it. Symmetric samples sit near 0.5; a long
/// bright tail pulls the mode, and so the quantile, down.
///
/// `scratch` receives a reordered copy of `values`.
pub fn mode_quantile(values: &[f32], scratch: &mut Vec<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    scratch.clear();
    scratch.extend_from_slice(values);
    let median = median_f32_mut(scratch);
    let mode = 3.0 * median - 2.0 * mean(values);
    let below = values.iter().filter(|&&v| v < mode).count();
    below as f32 / values.len() as f32
}

/// Sigma-clipped median and MAD-based sigma.
///
/// Iteratively rejects values beyond `kappa * sigma` from the median.
/// `values` is reordered; `deviations` is scratch reused between calls.
pub fn sigma_clipped_median_mad(
    values: &mut [f32],
    deviations: &mut Vec<f32>,
    kappa: f32,
    iterations: usize,
) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let mut len = values.len();

    for _ in 0..iterations {
        if len < 3 {
            break;
        }

        let active = &mut values[..len];
        let median = median_f32_mut(active);

        deviations.clear();
        deviations.extend(active.iter().map(|v| (v - median).abs()));
        let sigma = mad_to_sigma(median_f32_mut(deviations));

        if sigma < f32::EPSILON {
            return (median, 0.0);
        }

        let threshold = kappa * sigma;
        let mut write = 0;
        for read in 0..len {
            if (values[read] - median).abs() <= threshold {
                values[write] = values[read];
                write += 1;
            }
        }

        if write == len {
            break;
        }
        len = write;
    }

    let active = &mut values[..len];
    let median = median_f32_mut(active);
    deviations.clear();
    deviations.extend(active.iter().map(|v| (v - median).abs()));
    let sigma = mad_to_sigma(median_f32_mut(deviations));
    (median, sigma)
}
