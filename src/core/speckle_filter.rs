use crate::core::neighborhood::{fill_indexed, sample_reflected};
use crate::types::{Raster, SarError, SarResult, SarReal};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Speckle filtering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeckleFilterParams {
    /// Filter window size (odd, >= 3)
    pub window_size: usize,
    /// Equivalent number of looks for the adaptive filter.
    /// `None` estimates it from the image.
    pub num_looks: Option<f32>,
}

impl Default for SpeckleFilterParams {
    fn default() -> Self {
        Self {
            window_size: 5,
            num_looks: None,
        }
    }
}

/// Available speckle filter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeckleFilterType {
    /// Median of the window (rank filter)
    Median,
    /// Mean of the window (boxcar)
    Mean,
    /// Lee filter with a multiplicative noise model
    Adaptive,
}

impl FromStr for SpeckleFilterType {
    type Err = SarError;

    fn from_str(s: &str) -> SarResult<Self> {
        match s.to_lowercase().as_str() {
            "median" => Ok(SpeckleFilterType::Median),
            "mean" => Ok(SpeckleFilterType::Mean),
            "adaptive" | "lee" => Ok(SpeckleFilterType::Adaptive),
            _ => Err(SarError::config(
                "despeckle_mode",
                s,
                "expected one of median, mean, adaptive",
            )),
        }
    }
}

/// Speckle filter processor
pub struct SpeckleFilter {
    params: SpeckleFilterParams,
}

impl SpeckleFilter {
    /// Create a new speckle filter with default parameters
    pub fn new() -> Self {
        Self {
            params: SpeckleFilterParams::default(),
        }
    }

    /// Create a speckle filter with custom parameters
    pub fn with_params(params: SpeckleFilterParams) -> Self {
        Self { params }
    }

    /// Check the window against the raster shape and the filter type against
    /// the raster's unit, without touching any samples.
    pub fn validate(
        &self,
        dim: (usize, usize),
        filter_type: SpeckleFilterType,
        unit_is_linear: bool,
    ) -> SarResult<()> {
        let window = self.params.window_size;
        if window < 3 {
            return Err(SarError::config("despeckle_window", window, "must be at least 3"));
        }
        if window % 2 == 0 {
            return Err(SarError::config("despeckle_window", window, "must be odd"));
        }
        let (height, width) = dim;
        if window > height.min(width) {
            return Err(SarError::config(
                "despeckle_window",
                window,
                format!("exceeds raster dimensions {}x{}", height, width),
            ));
        }
        if let Some(looks) = self.params.num_looks {
            if !looks.is_finite() || looks <= 0.0 {
                return Err(SarError::config("despeckle_looks", looks, "must be a positive number"));
            }
        }
        if filter_type == SpeckleFilterType::Adaptive && !unit_is_linear {
            return Err(SarError::config(
                "despeckle_mode",
                "adaptive",
                "adaptive filtering needs linear intensity or amplitude, not a log-scaled raster",
            ));
        }
        Ok(())
    }

    /// Apply speckle filtering to a SAR raster.
    ///
    /// The output has the input's shape, transform and unit.
    pub fn apply_filter(
        &self,
        raster: &Raster,
        filter_type: SpeckleFilterType,
    ) -> SarResult<Raster> {
        log::info!("Applying {:?} speckle filter", filter_type);
        log::debug!("Filter parameters: {:?}", self.params);

        raster.validate()?;
        self.validate(raster.dim(), filter_type, raster.unit().is_linear())?;

        let image = raster.data();
        let filtered = match filter_type {
            SpeckleFilterType::Median => self.apply_median_filter(image),
            SpeckleFilterType::Mean => self.apply_mean_filter(image),
            SpeckleFilterType::Adaptive => {
                let looks = match self.params.num_looks {
                    Some(looks) => looks,
                    None => Self::estimate_number_of_looks(image),
                };
                self.apply_lee_filter(image, looks)
            }
        };

        log::info!("Speckle filtering completed successfully");
        Ok(raster.derive(filtered, raster.unit()))
    }

    /// Apply mean filter (simple averaging)
    fn apply_mean_filter(&self, image: &Array2<SarReal>) -> Array2<SarReal> {
        log::debug!("Applying mean filter");

        let mut filtered = Array2::<SarReal>::zeros(image.dim());
        let half_window = (self.params.window_size / 2) as isize;

        fill_indexed(&mut filtered, |i, j| {
            let (mean, _) = local_statistics(image, i, j, half_window);
            mean as SarReal
        });

        filtered
    }

    /// Apply median filter
    fn apply_median_filter(&self, image: &Array2<SarReal>) -> Array2<SarReal> {
        log::debug!("Applying median filter");

        let mut filtered = Array2::<SarReal>::zeros(image.dim());
        let half_window = (self.params.window_size / 2) as isize;
        let window_len = self.params.window_size * self.params.window_size;

        fill_indexed(&mut filtered, |i, j| {
            let mut window_values = Vec::with_capacity(window_len);
            for di in -half_window..=half_window {
                for dj in -half_window..=half_window {
                    window_values.push(sample_reflected(image, i, j, di, dj));
                }
            }

            // Odd window, so the middle order statistic is the exact median
            let mid = window_values.len() / 2;
            let (_, median, _) = window_values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            *median
        });

        filtered
    }

    /// Apply Lee filter (adaptive).
    ///
    /// Speckle is modelled as multiplicative with coefficient of variation
    /// `Cu = 1/sqrt(L)`, so statistics are taken on the linear samples.
    fn apply_lee_filter(&self, image: &Array2<SarReal>, num_looks: f32) -> Array2<SarReal> {
        log::debug!("Applying Lee filter with {:.2} looks", num_looks);

        let mut filtered = Array2::<SarReal>::zeros(image.dim());
        let half_window = (self.params.window_size / 2) as isize;

        let cu = if num_looks.is_finite() {
            1.0 / (num_looks as f64).sqrt()
        } else {
            0.0
        };
        let cu2 = cu * cu;

        fill_indexed(&mut filtered, |i, j| {
            let center_value = image[[i, j]] as f64;
            let (local_mean, local_variance) = local_statistics(image, i, j, half_window);

            if local_mean <= 0.0 {
                return center_value as SarReal;
            }

            let cv2 = local_variance / (local_mean * local_mean);

            // Flat windows (cv <= cu) collapse to the mean, edges keep the pixel
            let weight = if cv2 > cu2 {
                ((cv2 - cu2) / (cv2 * (1.0 + cu2))).clamp(0.0, 1.0)
            } else {
                0.0
            };

            (local_mean + weight * (center_value - local_mean)) as SarReal
        });

        filtered
    }

    /// Estimate the equivalent number of looks from image statistics
    /// (mean² / variance over all positive samples).
    ///
    /// A raster without variance (or without positive samples) has no
    /// measurable speckle; this returns infinity, which the Lee filter reads
    /// as a zero noise coefficient.
    pub fn estimate_number_of_looks(image: &Array2<SarReal>) -> f32 {
        log::debug!("Estimating number of looks from image statistics");

        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for &val in image.iter() {
            if val.is_finite() && val > 0.0 {
                let v = val as f64;
                sum += v;
                sum_sq += v * v;
                count += 1;
            }
        }

        if count < 2 {
            log::warn!("Only {} positive pixels; cannot estimate number of looks", count);
            return f32::INFINITY;
        }

        let mean = sum / count as f64;
        let variance = ((sum_sq - count as f64 * mean * mean) / (count - 1) as f64).max(0.0);

        if variance == 0.0 {
            log::info!("Image has no variance; treating it as speckle-free");
            return f32::INFINITY;
        }

        let num_looks = ((mean * mean) / variance).max(1.0) as f32;
        log::info!("Estimated number of looks: {:.2}", num_looks);
        num_looks
    }
}

impl Default for SpeckleFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean and population variance of the reflected window around `(i, j)`
fn local_statistics(image: &Array2<SarReal>, i: usize, j: usize, half_window: isize) -> (f64, f64) {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0usize;

    for di in -half_window..=half_window {
        for dj in -half_window..=half_window {
            let v = sample_reflected(image, i, j, di, dj) as f64;
            sum += v;
            sum_sq += v * v;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, variance)
}

/// Remove speckle from `raster` using a `window_size` x `window_size` window.
pub fn despeckle(
    raster: &Raster,
    window_size: usize,
    mode: SpeckleFilterType,
) -> SarResult<Raster> {
    SpeckleFilter::with_params(SpeckleFilterParams {
        window_size,
        ..SpeckleFilterParams::default()
    })
    .apply_filter(raster, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, ValueUnit};
    use approx::assert_abs_diff_eq;

    fn intensity(data: Array2<f32>) -> Raster {
        let transform = GeoTransform::north_up(500.0, 900.0, 10.0, -10.0);
        Raster::new(data, transform, ValueUnit::Intensity).unwrap()
    }

    #[test]
    fn test_window_validation() {
        let raster = intensity(Array2::ones((8, 8)));

        for bad in [1usize, 2, 4, 9] {
            let result = despeckle(&raster, bad, SpeckleFilterType::Median);
            match result {
                Err(SarError::Configuration { parameter, value, .. }) => {
                    assert_eq!(parameter, "despeckle_window");
                    assert_eq!(value, bad.to_string());
                }
                other => panic!("expected configuration error for window {}, got {:?}", bad, other),
            }
        }

        assert!(despeckle(&raster, 7, SpeckleFilterType::Median).is_ok());
    }

    #[test]
    fn test_median_removes_isolated_impulses() {
        let mut data = Array2::<f32>::from_elem((20, 20), 0.3);
        for &(i, j) in &[(0, 0), (5, 7), (10, 10), (19, 3), (12, 19)] {
            data[[i, j]] = 50.0;
        }
        let raster = intensity(data);

        let filtered = despeckle(&raster, 3, SpeckleFilterType::Median).unwrap();
        assert!(filtered.data().iter().all(|&v| v == 0.3));
    }

    #[test]
    fn test_output_keeps_shape_transform_and_unit() {
        let data =
            Array2::from_shape_fn((13, 21), |(i, j)| 0.1 + ((i * 7 + j * 3) % 11) as f32 * 0.05);
        let raster = intensity(data);

        for mode in [
            SpeckleFilterType::Median,
            SpeckleFilterType::Mean,
            SpeckleFilterType::Adaptive,
        ] {
            let filtered = despeckle(&raster, 5, mode).unwrap();
            assert_eq!(filtered.dim(), raster.dim());
            assert_eq!(filtered.geo_transform(), raster.geo_transform());
            assert_eq!(filtered.unit(), ValueUnit::Intensity);
        }
    }

    #[test]
    fn test_mean_filter_preserves_flat_region() {
        let raster = intensity(Array2::from_elem((9, 9), 0.25));
        let filtered = despeckle(&raster, 3, SpeckleFilterType::Mean).unwrap();
        for &v in filtered.data().iter() {
            assert_abs_diff_eq!(v, 0.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_lee_smooths_flat_speckle_and_keeps_edges() {
        // Deterministic multiplicative "speckle" on two plateaus
        let pattern = [0.6f32, 1.4, 0.9, 1.1, 0.7, 1.3, 1.0, 0.8, 1.2];
        let data = Array2::from_shape_fn((30, 30), |(i, j)| {
            let level = if j < 15 { 0.1 } else { 1.0 };
            level * pattern[(i * 4 + j) % pattern.len()]
        });
        let raster = intensity(data.clone());

        let filter = SpeckleFilter::with_params(SpeckleFilterParams {
            window_size: 5,
            num_looks: Some(4.0),
        });
        let filtered = filter.apply_filter(&raster, SpeckleFilterType::Adaptive).unwrap();

        let spread = |img: &Array2<f32>, cols: std::ops::Range<usize>| {
            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for i in 5..25 {
                for j in cols.clone() {
                    lo = lo.min(img[[i, j]]);
                    hi = hi.max(img[[i, j]]);
                }
            }
            hi - lo
        };

        // Interior of each plateau is smoothed
        assert!(spread(filtered.data(), 3..11) < spread(&data, 3..11));
        assert!(spread(filtered.data(), 19..27) < spread(&data, 19..27));

        // The step between plateaus survives
        let left: f32 = (5..25).map(|i| filtered.data()[[i, 12]]).sum::<f32>() / 20.0;
        let right: f32 = (5..25).map(|i| filtered.data()[[i, 17]]).sum::<f32>() / 20.0;
        assert!(right > 5.0 * left);
    }

    #[test]
    fn test_adaptive_rejects_decibel_raster() {
        let raster = Raster::new(
            Array2::from_elem((10, 10), -12.0),
            GeoTransform::pixel_grid(),
            ValueUnit::Decibel,
        )
        .unwrap();

        let result = despeckle(&raster, 3, SpeckleFilterType::Adaptive);
        assert!(matches!(
            result,
            Err(SarError::Configuration { ref parameter, .. }) if parameter == "despeckle_mode"
        ));

        // Rank and boxcar filters are fine in dB
        assert!(despeckle(&raster, 3, SpeckleFilterType::Median).is_ok());
    }

    #[test]
    fn test_estimate_number_of_looks() {
        let flat = Array2::from_elem((10, 10), 0.5f32);
        assert!(SpeckleFilter::estimate_number_of_looks(&flat).is_infinite());

        let dark = Array2::<f32>::zeros((4, 4));
        assert!(SpeckleFilter::estimate_number_of_looks(&dark).is_infinite());

        let noisy =
            Array2::from_shape_fn((10, 10), |(i, j)| if (i + j) % 2 == 0 { 0.5 } else { 1.5 });
        let looks = SpeckleFilter::estimate_number_of_looks(&noisy);
        assert!(looks >= 1.0);
        assert!(looks.is_finite());
    }

    #[test]
    fn test_filter_type_parsing() {
        assert_eq!("Median".parse::<SpeckleFilterType>().unwrap(), SpeckleFilterType::Median);
        assert_eq!("lee".parse::<SpeckleFilterType>().unwrap(), SpeckleFilterType::Adaptive);
        assert!("gamma".parse::<SpeckleFilterType>().unwrap_err().is_configuration());
    }
}
