use crate::types::{Grid, Mask, Reflectance, SamplePairs, ValResult, ValidationError};
use ndarray::Array2;
use serde::Serialize;

/// Accuracy of a difference sample: the mean of `delta`, i.e. systematic bias
///
/// Returns NaN on an empty sample.
pub fn accuracy(delta: &[Reflectance]) -> f64 {
    if delta.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = delta.iter().map(|&d| d as f64).sum();
    sum / delta.len() as f64
}

/// Precision of a difference sample: the standard deviation of the
/// bias-removed residual, `sqrt(sum((delta - accuracy)^2) / (n - 1))`
///
/// Undefined for n <= 1 and returns NaN there, never a division by zero.
pub fn precision(delta: &[Reflectance]) -> f64 {
    if delta.len() <= 1 {
        return f64::NAN;
    }
    let acc = accuracy(delta);
    let ss: f64 = delta
        .iter()
        .map(|&d| {
            let r = d as f64 - acc;
            r * r
        })
        .sum();
    (ss / (delta.len() - 1) as f64).sqrt()
}

/// Uncertainty of a difference sample: the root mean square of `delta`
///
/// Dominates `|accuracy|` on every non-empty sample. NaN when empty.
pub fn uncertainty(delta: &[Reflectance]) -> f64 {
    if delta.is_empty() {
        return f64::NAN;
    }
    let ss: f64 = delta.iter().map(|&d| d as f64 * d as f64).sum();
    (ss / delta.len() as f64).sqrt()
}

/// Mean squared error between two paired vectors, NaN pairs excluded
pub fn mse(v1: &[Reflectance], v2: &[Reflectance]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for (&a, &b) in v1.iter().zip(v2.iter()) {
        let d = (a - b) as f64;
        if d.is_nan() {
            continue;
        }
        sum += d * d;
        n += 1;
    }
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Root mean squared error between two paired vectors, NaN pairs excluded
pub fn rmse(v1: &[Reflectance], v2: &[Reflectance]) -> f64 {
    mse(v1, v2).sqrt()
}

/// Root mean squared error from precomputed differences
pub fn rmse_from_delta(delta: &[Reflectance]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for &d in delta {
        if d.is_nan() {
            continue;
        }
        sum += d as f64 * d as f64;
        n += 1;
    }
    if n == 0 {
        f64::NAN
    } else {
        (sum / n as f64).sqrt()
    }
}

/// Accuracy/precision/uncertainty triple over one difference sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Apu {
    pub count: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub uncertainty: f64,
}

impl Apu {
    pub fn from_deltas(delta: &[Reflectance]) -> Self {
        Self {
            count: delta.len(),
            accuracy: accuracy(delta),
            precision: precision(delta),
            uncertainty: uncertainty(delta),
        }
    }
}

/// APU of the samples falling in one reflectance bin `[lower, upper)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BinApu {
    pub lower: f64,
    pub upper: f64,
    pub apu: Apu,
}

/// Binned APU reduction plus the pooled statistics over the full sample set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinnedApu {
    pub bins: Vec<BinApu>,
    pub stacked: Apu,
}

/// Reduce paired samples to per-bin and pooled APU statistics
///
/// Bins are half-open intervals `[i/bins, (i+1)/bins)` over the reflectance
/// domain [0, 1), keyed by the reference value of each pair. Samples outside
/// the domain contribute to the pooled statistics only. Empty bins report NaN.
pub fn binned_apu(pairs: &SamplePairs, bins: usize) -> ValResult<BinnedApu> {
    if bins == 0 {
        return Err(ValidationError::Configuration(
            "Reflectance sampling must be positive".to_string(),
        ));
    }

    let width = 1.0 / bins as f64;
    let mut per_bin: Vec<Vec<Reflectance>> = vec![Vec::new(); bins];
    for (&r, &c) in pairs.reference.iter().zip(pairs.candidate.iter()) {
        let key = r as f64;
        if (0.0..1.0).contains(&key) {
            let index = ((key / width) as usize).min(bins - 1);
            per_bin[index].push(r - c);
        }
    }

    let bins_out = per_bin
        .iter()
        .enumerate()
        .map(|(i, deltas)| BinApu {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            apu: Apu::from_deltas(deltas),
        })
        .collect();

    Ok(BinnedApu {
        bins: bins_out,
        stacked: Apu::from_deltas(&pairs.deltas()),
    })
}

/// Extract the pixels of `band` where the validity mask is set
pub fn masked_samples(band: &Grid, mask: &Mask) -> ValResult<Vec<Reflectance>> {
    if band.dim() != mask.dim() {
        return Err(ValidationError::DimensionMismatch {
            reference: band.len(),
            candidate: mask.len(),
        });
    }
    Ok(band
        .iter()
        .zip(mask.iter())
        .filter_map(|(&v, &m)| m.then_some(v))
        .collect())
}

/// Nearest-neighbour 2x upsampling along both axes
///
/// Lifts a half-resolution grid onto the native pixel grid by repeating each
/// cell twice per axis, so it aligns pixel-for-pixel with a native-resolution
/// mask and band.
pub fn upsample2(grid: &Grid) -> Grid {
    let (rows, cols) = grid.dim();
    Array2::from_shape_fn((rows * 2, cols * 2), |(i, j)| grid[[i / 2, j / 2]])
}

/// Descriptive statistics of one sample window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Describe {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample variance, n - 1 denominator; NaN for fewer than two samples
    pub variance: f64,
    pub skewness: f64,
    /// Excess kurtosis, zero for a normal distribution
    pub kurtosis: f64,
}

/// Reduce a grid to count/min/max/mean/variance/skewness/kurtosis
pub fn describe(grid: &Grid) -> Describe {
    let n = grid.len();
    if n == 0 {
        return Describe {
            count: 0,
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            variance: f64::NAN,
            skewness: f64::NAN,
            kurtosis: f64::NAN,
        };
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &v in grid.iter() {
        let v = v as f64;
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    let mean = sum / n as f64;

    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &v in grid.iter() {
        let d = v as f64 - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    let sum2 = m2;
    m2 /= n as f64;
    m3 /= n as f64;
    m4 /= n as f64;

    let variance = if n > 1 {
        sum2 / (n - 1) as f64
    } else {
        f64::NAN
    };
    let skewness = if m2 > 0.0 {
        m3 / m2.powf(1.5)
    } else {
        f64::NAN
    };
    let kurtosis = if m2 > 0.0 {
        m4 / (m2 * m2) - 3.0
    } else {
        f64::NAN
    };

    Describe {
        count: n,
        min,
        max,
        mean,
        variance,
        skewness,
        kurtosis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_apu_zero_delta() {
        let delta = vec![0.0; 8];
        assert_abs_diff_eq!(accuracy(&delta), 0.0);
        assert_abs_diff_eq!(uncertainty(&delta), 0.0);

        let v = vec![0.1, 0.4, 0.9];
        assert_abs_diff_eq!(rmse(&v, &v), 0.0);
    }

    #[test]
    fn test_apu_alternating_delta() {
        let delta = vec![1.0, -1.0, 1.0, -1.0];
        assert_abs_diff_eq!(accuracy(&delta), 0.0);
        assert_abs_diff_eq!(uncertainty(&delta), 1.0);
        assert_abs_diff_eq!(precision(&delta), (4.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_uncertainty_dominates_accuracy() {
        let samples: [&[Reflectance]; 3] = [
            &[0.02, -0.01, 0.005, 0.03],
            &[-0.5, -0.25, -0.125],
            &[0.7],
        ];
        for delta in samples {
            assert!(uncertainty(delta) >= accuracy(delta).abs());
        }
    }

    #[test]
    fn test_precision_of_single_sample_is_nan() {
        assert!(precision(&[0.25]).is_nan());
        assert!(precision(&[]).is_nan());
    }

    #[test]
    fn test_empty_sample_statistics_are_nan() {
        assert!(accuracy(&[]).is_nan());
        assert!(uncertainty(&[]).is_nan());
        assert!(rmse_from_delta(&[]).is_nan());
    }

    #[test]
    fn test_rmse_excludes_nan_pairs() {
        let v1 = vec![0.5, f32::NAN, 0.5];
        let v2 = vec![0.25, 0.25, 0.25];
        assert_abs_diff_eq!(rmse(&v1, &v2), 0.25, epsilon = 1e-7);
        assert_abs_diff_eq!(mse(&v1, &v2), 0.0625, epsilon = 1e-7);
    }

    #[test]
    fn test_rmse_from_delta_matches_rmse() {
        let v1 = vec![0.5, 0.375, 0.125];
        let v2 = vec![0.25, 0.5, 0.0];
        let delta: Vec<f32> = v1.iter().zip(v2.iter()).map(|(a, b)| a - b).collect();
        assert_abs_diff_eq!(rmse(&v1, &v2), rmse_from_delta(&delta), epsilon = 1e-12);
    }

    #[test]
    fn test_binned_apu_half_open_edges() {
        // Four bins of width 0.25; 0.25 sits on a boundary and belongs to the
        // upper bin, 1.0 falls outside the domain entirely.
        let mut pairs = SamplePairs::new();
        pairs
            .push_pair(
                vec![0.0, 0.25, 0.3, 0.9, 1.0],
                vec![0.1, 0.25, 0.2, 0.8, 0.9],
            )
            .unwrap();

        let binned = binned_apu(&pairs, 4).unwrap();
        assert_eq!(binned.bins.len(), 4);
        assert_eq!(binned.bins[0].apu.count, 1);
        assert_eq!(binned.bins[1].apu.count, 2);
        assert_eq!(binned.bins[2].apu.count, 0);
        assert_eq!(binned.bins[3].apu.count, 1);
        assert_abs_diff_eq!(binned.bins[1].lower, 0.25);
        assert_abs_diff_eq!(binned.bins[1].upper, 0.5);

        // Pooled statistics cover every pair, including the out-of-domain one.
        assert_eq!(binned.stacked.count, 5);
    }

    #[test]
    fn test_binned_apu_empty_bin_is_nan() {
        let mut pairs = SamplePairs::new();
        pairs.push_pair(vec![0.1], vec![0.05]).unwrap();

        let binned = binned_apu(&pairs, 2).unwrap();
        assert_eq!(binned.bins[0].apu.count, 1);
        assert!(binned.bins[1].apu.accuracy.is_nan());
        assert!(binned.bins[1].apu.uncertainty.is_nan());
    }

    #[test]
    fn test_binned_apu_rejects_zero_bins() {
        let pairs = SamplePairs::new();
        assert!(matches!(
            binned_apu(&pairs, 0),
            Err(ValidationError::Configuration(_))
        ));
    }

    #[test]
    fn test_masked_samples_filters_by_mask() {
        let mut band = Grid::zeros((2, 2));
        band[[0, 0]] = 0.1;
        band[[0, 1]] = 0.2;
        band[[1, 0]] = 0.3;
        band[[1, 1]] = 0.4;
        let mut mask = Mask::from_elem((2, 2), true);
        mask[[0, 1]] = false;

        let samples = masked_samples(&band, &mask).unwrap();
        assert_eq!(samples, vec![0.1, 0.3, 0.4]);
    }

    #[test]
    fn test_masked_samples_shape_mismatch_fails() {
        let band = Grid::zeros((2, 2));
        let mask = Mask::from_elem((2, 3), true);
        assert!(matches!(
            masked_samples(&band, &mask),
            Err(ValidationError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_upsample2_repeats_each_cell() {
        let mut grid = Grid::zeros((2, 2));
        grid[[0, 0]] = 1.0;
        grid[[0, 1]] = 2.0;
        grid[[1, 0]] = 3.0;
        grid[[1, 1]] = 4.0;

        let doubled = upsample2(&grid);
        assert_eq!(doubled.dim(), (4, 4));
        for (i, j) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            assert_abs_diff_eq!(doubled[[i, j]], 1.0);
        }
        assert_abs_diff_eq!(doubled[[0, 2]], 2.0);
        assert_abs_diff_eq!(doubled[[2, 1]], 3.0);
        assert_abs_diff_eq!(doubled[[3, 3]], 4.0);
    }

    #[test]
    fn test_describe_moments() {
        let grid = Grid::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let stats = describe(&grid);
        assert_eq!(stats.count, 4);
        assert_abs_diff_eq!(stats.min, 1.0);
        assert_abs_diff_eq!(stats.max, 4.0);
        assert_abs_diff_eq!(stats.mean, 2.5);
        assert_abs_diff_eq!(stats.variance, 5.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.skewness, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.kurtosis, -1.36, epsilon = 1e-12);
    }

    #[test]
    fn test_describe_degenerate_inputs() {
        let empty = Grid::zeros((0, 0));
        let stats = describe(&empty);
        assert_eq!(stats.count, 0);
        assert!(stats.mean.is_nan());

        let constant = Grid::from_elem((3, 3), 0.5);
        let stats = describe(&constant);
        assert_abs_diff_eq!(stats.mean, 0.5);
        assert!(stats.skewness.is_nan());
        assert!(stats.kurtosis.is_nan());
    }
}
