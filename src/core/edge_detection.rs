use crate::core::neighborhood::{fill_indexed, sample_reflected};
use crate::core::normalize::NormalizedRaster;
use crate::types::{Raster, SarError, SarResult, SarReal, ValueUnit};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;

/// Gradient-magnitude raster, same grid as its source
pub type EdgeMap = Raster<SarReal>;

/// Edge detection operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMethod {
    /// 3x3 Sobel gradient magnitude
    Sobel,
    /// Gaussian smoothing, Sobel, non-maximum suppression and hysteresis
    Canny,
}

impl FromStr for EdgeMethod {
    type Err = SarError;

    fn from_str(s: &str) -> SarResult<Self> {
        match s.to_lowercase().as_str() {
            "sobel" => Ok(EdgeMethod::Sobel),
            "canny" => Ok(EdgeMethod::Canny),
            _ => Err(SarError::config("edge_method", s, "expected sobel or canny")),
        }
    }
}

/// How `threshold` is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Gradient magnitude units (1.0 = a full-range step)
    #[default]
    Absolute,
    /// Fraction of the strongest gradient in the raster
    Relative,
}

/// Edge detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDetectionParams {
    pub method: EdgeMethod,
    /// Magnitudes below this are zeroed; `None` keeps the full gradient
    pub threshold: Option<f32>,
    pub threshold_mode: ThresholdMode,
    /// Gaussian sigma used by `Canny`
    pub canny_sigma: f32,
}

impl Default for EdgeDetectionParams {
    fn default() -> Self {
        Self {
            method: EdgeMethod::Sobel,
            threshold: Some(0.2),
            threshold_mode: ThresholdMode::Absolute,
            canny_sigma: 1.0,
        }
    }
}

impl EdgeDetectionParams {
    pub fn validate(&self) -> SarResult<()> {
        if let Some(threshold) = self.threshold {
            if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
                return Err(SarError::config("edge_threshold", threshold, "must lie in [0, 1]"));
            }
        }
        if self.method == EdgeMethod::Canny
            && (!self.canny_sigma.is_finite() || self.canny_sigma <= 0.0)
        {
            return Err(SarError::config("canny_sigma", self.canny_sigma, "must be positive"));
        }
        Ok(())
    }
}

/// Compute a gradient-magnitude edge map from a normalized raster.
pub fn detect_edges(
    normalized: &NormalizedRaster,
    method: EdgeMethod,
    threshold: Option<f32>,
) -> SarResult<EdgeMap> {
    detect_edges_with(
        normalized,
        &EdgeDetectionParams {
            method,
            threshold,
            ..EdgeDetectionParams::default()
        },
    )
}

pub fn detect_edges_with(
    normalized: &NormalizedRaster,
    params: &EdgeDetectionParams,
) -> SarResult<EdgeMap> {
    params.validate()?;
    normalized.raster.validate()?;

    log::info!("Detecting edges with {:?} (threshold {:?})", params.method, params.threshold);

    let image = normalized.raster.data();
    let edges = match params.method {
        EdgeMethod::Sobel => {
            let (gx, gy) = sobel_gradients(image);
            let magnitude = gradient_magnitude(&gx, &gy);
            match params.threshold {
                Some(threshold) => {
                    let cutoff = effective_threshold(&magnitude, threshold, params.threshold_mode);
                    magnitude.mapv(|m| if m < cutoff { 0.0 } else { m })
                }
                None => magnitude,
            }
        }
        EdgeMethod::Canny => canny(image, params),
    };

    let edge_pixels = edges.iter().filter(|&&m| m > 0.0).count();
    log::debug!("Edge map has {} non-zero pixels", edge_pixels);

    Ok(normalized.raster.derive(edges, ValueUnit::GradientMagnitude))
}

/// Horizontal and vertical Sobel responses with reflected borders.
///
/// Each kernel is scaled by 1/4 so a unit step produces a response of 1.
pub fn sobel_gradients(image: &Array2<SarReal>) -> (Array2<SarReal>, Array2<SarReal>) {
    let mut gx = Array2::<SarReal>::zeros(image.dim());
    let mut gy = Array2::<SarReal>::zeros(image.dim());

    fill_indexed(&mut gx, |i, j| {
        let p = |di, dj| sample_reflected(image, i, j, di, dj);
        let right = p(-1, 1) + 2.0 * p(0, 1) + p(1, 1);
        let left = p(-1, -1) + 2.0 * p(0, -1) + p(1, -1);
        (right - left) * 0.25
    });

    fill_indexed(&mut gy, |i, j| {
        let p = |di, dj| sample_reflected(image, i, j, di, dj);
        let below = p(1, -1) + 2.0 * p(1, 0) + p(1, 1);
        let above = p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1);
        (below - above) * 0.25
    });

    (gx, gy)
}

fn gradient_magnitude(gx: &Array2<SarReal>, gy: &Array2<SarReal>) -> Array2<SarReal> {
    let mut magnitude = Array2::<SarReal>::zeros(gx.dim());
    ndarray::Zip::from(&mut magnitude)
        .and(gx)
        .and(gy)
        .for_each(|m, &x, &y| *m = (x * x + y * y).sqrt());
    magnitude
}

fn effective_threshold(magnitude: &Array2<SarReal>, threshold: f32, mode: ThresholdMode) -> f32 {
    match mode {
        ThresholdMode::Absolute => threshold,
        ThresholdMode::Relative => {
            let max = magnitude.iter().copied().fold(0.0f32, f32::max);
            threshold * max
        }
    }
}

/// Normalized 1-D Gaussian kernel covering ±3 sigma
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as isize;
    let two_sigma2 = 2.0 * sigma * sigma;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|x| (-((x * x) as f32) / two_sigma2).exp())
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Separable Gaussian blur with reflected borders
fn gaussian_blur(image: &Array2<SarReal>, sigma: f32) -> Array2<SarReal> {
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;

    let mut horizontal = Array2::<SarReal>::zeros(image.dim());
    fill_indexed(&mut horizontal, |i, j| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * sample_reflected(image, i, j, 0, k as isize - radius))
            .sum()
    });

    let mut blurred = Array2::<SarReal>::zeros(image.dim());
    fill_indexed(&mut blurred, |i, j| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * sample_reflected(&horizontal, i, j, k as isize - radius, 0))
            .sum()
    });

    blurred
}

fn canny(image: &Array2<SarReal>, params: &EdgeDetectionParams) -> Array2<SarReal> {
    log::debug!("Canny pre-smoothing with sigma {}", params.canny_sigma);

    let smoothed = gaussian_blur(image, params.canny_sigma);
    let (gx, gy) = sobel_gradients(&smoothed);
    let magnitude = gradient_magnitude(&gx, &gy);

    // Non-maximum suppression along the quantized gradient direction
    let mut thin = Array2::<SarReal>::zeros(image.dim());
    fill_indexed(&mut thin, |i, j| {
        let m = magnitude[[i, j]];
        if m <= 0.0 {
            return 0.0;
        }
        let angle = gy[[i, j]].atan2(gx[[i, j]]).to_degrees().rem_euclid(180.0);
        let (di, dj) = if !(22.5..157.5).contains(&angle) {
            (0, 1)
        } else if angle < 67.5 {
            (1, 1)
        } else if angle < 112.5 {
            (1, 0)
        } else {
            (1, -1)
        };
        let forward = sample_reflected(&magnitude, i, j, di, dj);
        let backward = sample_reflected(&magnitude, i, j, -di, -dj);
        if m >= forward && m >= backward {
            m
        } else {
            0.0
        }
    });

    let Some(threshold) = params.threshold else {
        return thin;
    };

    // The threshold is the hard floor; only stronger pixels seed edge tracing
    let low = effective_threshold(&thin, threshold, params.threshold_mode);
    let strongest = thin.iter().copied().fold(0.0f32, f32::max);
    let high = (2.0 * low).min(strongest).max(low);
    hysteresis(&thin, low, high)
}

/// Keep pixels >= `high`, plus pixels >= `low` 8-connected to one of them
fn hysteresis(magnitude: &Array2<SarReal>, low: f32, high: f32) -> Array2<SarReal> {
    let (height, width) = magnitude.dim();
    let mut kept = Array2::<bool>::from_elem((height, width), false);
    let mut queue = VecDeque::new();

    for ((i, j), &m) in magnitude.indexed_iter() {
        if m > 0.0 && m >= high {
            kept[[i, j]] = true;
            queue.push_back((i, j));
        }
    }

    while let Some((i, j)) = queue.pop_front() {
        for di in -1isize..=1 {
            for dj in -1isize..=1 {
                let ni = i as isize + di;
                let nj = j as isize + dj;
                if ni < 0 || nj < 0 || ni >= height as isize || nj >= width as isize {
                    continue;
                }
                let (ni, nj) = (ni as usize, nj as usize);
                let m = magnitude[[ni, nj]];
                if !kept[[ni, nj]] && m > 0.0 && m >= low {
                    kept[[ni, nj]] = true;
                    queue.push_back((ni, nj));
                }
            }
        }
    }

    let mut out = Array2::<SarReal>::zeros((height, width));
    ndarray::Zip::from(&mut out)
        .and(magnitude)
        .and(&kept)
        .for_each(|o, &m, &k| *o = if k { m } else { 0.0 });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize::normalize;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;

    fn normalized_from(data: Array2<f32>) -> NormalizedRaster {
        let raster = Raster::new(data, GeoTransform::pixel_grid(), ValueUnit::Intensity).unwrap();
        normalize(&raster, 0.0, 100.0).unwrap().0
    }

    fn vertical_step() -> NormalizedRaster {
        normalized_from(Array2::from_shape_fn((12, 12), |(_, j)| if j < 6 { 0.2 } else { 0.8 }))
    }

    #[test]
    fn test_flat_raster_has_no_edges() {
        let flat = normalized_from(Array2::from_elem((15, 15), 0.5));
        for method in [EdgeMethod::Sobel, EdgeMethod::Canny] {
            for threshold in [None, Some(0.1)] {
                let edges = detect_edges(&flat, method, threshold).unwrap();
                assert_eq!(edges.dim(), (15, 15));
                assert!(edges.data().iter().all(|&v| v == 0.0));
            }
        }
    }

    #[test]
    fn test_sobel_unit_step_response() {
        let edges = detect_edges(&vertical_step(), EdgeMethod::Sobel, None).unwrap();
        assert_eq!(edges.unit(), ValueUnit::GradientMagnitude);

        for i in 0..12 {
            assert_relative_eq!(edges.data()[[i, 5]], 1.0);
            assert_relative_eq!(edges.data()[[i, 6]], 1.0);
            assert_eq!(edges.data()[[i, 3]], 0.0);
            assert_eq!(edges.data()[[i, 9]], 0.0);
            // Reflected border: no spurious response on the outer columns
            assert_eq!(edges.data()[[i, 0]], 0.0);
            assert_eq!(edges.data()[[i, 11]], 0.0);
        }
    }

    #[test]
    fn test_threshold_zeroes_weak_gradients() {
        let weak = normalized_from(Array2::from_shape_fn((10, 10), |(_, j)| j as f32 * 0.01));
        let kept = detect_edges(&weak, EdgeMethod::Sobel, None).unwrap();
        assert!(kept.data()[[5, 5]] > 0.0);

        let cut = detect_edges(&weak, EdgeMethod::Sobel, Some(0.5)).unwrap();
        assert!(cut.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_relative_threshold() {
        let params = EdgeDetectionParams {
            method: EdgeMethod::Sobel,
            threshold: Some(0.9),
            threshold_mode: ThresholdMode::Relative,
            canny_sigma: 1.0,
        };
        let edges = detect_edges_with(&vertical_step(), &params).unwrap();
        assert!(edges.data()[[4, 5]] > 0.0);
        assert_eq!(edges.data()[[4, 4]], 0.0);
    }

    #[test]
    fn test_invalid_threshold() {
        let err = detect_edges(&vertical_step(), EdgeMethod::Sobel, Some(1.5)).unwrap_err();
        assert!(matches!(
            err,
            SarError::Configuration { ref parameter, .. } if parameter == "edge_threshold"
        ));
    }

    #[test]
    fn test_canny_respects_hard_threshold() {
        // Strong step in the top half, weak step in the bottom half
        let data = Array2::from_shape_fn((40, 40), |(i, j)| match (i < 20, j < 20) {
            (_, true) => 0.0,
            (true, false) => 1.0,
            (false, false) => 0.3,
        });
        let edges = detect_edges(&normalized_from(data), EdgeMethod::Canny, Some(0.2)).unwrap();

        let weak: Vec<_> = edges
            .data()
            .indexed_iter()
            .filter(|(_, &v)| v > 0.0 && v < 0.2)
            .collect();
        assert!(weak.is_empty(), "edge values below threshold: {:?}", weak);
        assert!(edges.data().iter().any(|&v| v >= 0.2));
    }

    #[test]
    fn test_canny_thins_step_edge() {
        let edges = detect_edges(&vertical_step(), EdgeMethod::Canny, Some(0.2)).unwrap();
        for i in 2..10 {
            let row_hits = (0..12).filter(|&j| edges.data()[[i, j]] > 0.0).count();
            assert!(row_hits >= 1 && row_hits <= 2, "row {} has {} edge pixels", i, row_hits);
            assert!(edges.data()[[i, 5]] > 0.0 || edges.data()[[i, 6]] > 0.0);
        }
    }
}
