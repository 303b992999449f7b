use crate::types::{Raster, SarError, SarResult, SarReal, ValueUnit};
use serde::{Deserialize, Serialize};

/// Percentile clip bounds used to map a raster onto [0, 1].
///
/// Kept with the normalized raster so a normalized value or a detected
/// feature can be mapped back to the source's physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationBounds {
    /// Value mapped to 0.0
    pub low: SarReal,
    /// Value mapped to 1.0
    pub high: SarReal,
    pub clip_low_pct: f64,
    pub clip_high_pct: f64,
    /// Unit of `low` and `high`
    pub source_unit: ValueUnit,
}

impl NormalizationBounds {
    pub fn span(&self) -> SarReal {
        self.high - self.low
    }

    /// Forward mapping, clamped to [0, 1]. Degenerate bounds map to 0.
    pub fn normalize_value(&self, value: SarReal) -> SarReal {
        let span = self.span();
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.low) / span).clamp(0.0, 1.0)
    }

    /// Inverse affine mapping back to source units
    pub fn denormalize_value(&self, normalized: SarReal) -> SarReal {
        self.low + normalized * self.span()
    }
}

/// A raster with values in [0, 1] plus the bounds that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRaster {
    pub raster: Raster,
    pub bounds: NormalizationBounds,
}

impl NormalizedRaster {
    pub fn dim(&self) -> (usize, usize) {
        self.raster.dim()
    }

    pub fn denormalize(&self) -> Raster {
        let data = self.raster.data().mapv(|v| self.bounds.denormalize_value(v));
        self.raster.derive(data, self.bounds.source_unit)
    }
}

pub fn validate_percentiles(clip_low_pct: f64, clip_high_pct: f64) -> SarResult<()> {
    for (name, pct) in [("clip_low_pct", clip_low_pct), ("clip_high_pct", clip_high_pct)] {
        if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
            return Err(SarError::config(name, pct, "must lie in [0, 100]"));
        }
    }
    if clip_low_pct >= clip_high_pct {
        return Err(SarError::config(
            "clip_low_pct",
            clip_low_pct,
            format!("must be below clip_high_pct ({})", clip_high_pct),
        ));
    }
    Ok(())
}

/// Percentile of `values` with linear interpolation between the closest
/// order statistics. Reorders `values`.
///
/// Uses selection rather than a full sort.
pub fn percentile(values: &mut [SarReal], pct: f64) -> Option<SarReal> {
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let frac = rank - lower as f64;

    let (_, lower_value, upper_part) = values.select_nth_unstable_by(lower, |a, b| a.total_cmp(b));
    let lower_value = *lower_value;
    if frac == 0.0 || upper_part.is_empty() {
        return Some(lower_value);
    }

    // The next order statistic is the minimum of the upper partition
    let upper_value = upper_part.iter().copied().fold(f32::INFINITY, f32::min);
    Some((lower_value as f64 + frac * (upper_value as f64 - lower_value as f64)) as SarReal)
}

/// Map `raster` linearly onto [0, 1] between its `clip_low_pct` and
/// `clip_high_pct` percentiles, clamping values outside the bounds.
pub fn normalize(
    raster: &Raster,
    clip_low_pct: f64,
    clip_high_pct: f64,
) -> SarResult<(NormalizedRaster, NormalizationBounds)> {
    validate_percentiles(clip_low_pct, clip_high_pct)?;
    raster.validate()?;

    log::info!(
        "Normalizing {}x{} raster between p{} and p{}",
        raster.height(),
        raster.width(),
        clip_low_pct,
        clip_high_pct
    );

    let mut values: Vec<SarReal> = raster.data().iter().copied().collect();
    let low = percentile(&mut values, clip_low_pct)
        .ok_or_else(|| SarError::Input("Cannot normalize an empty raster".to_string()))?;
    let high = percentile(&mut values, clip_high_pct)
        .ok_or_else(|| SarError::Input("Cannot normalize an empty raster".to_string()))?;

    let bounds = NormalizationBounds {
        low,
        high,
        clip_low_pct,
        clip_high_pct,
        source_unit: raster.unit(),
    };
    log::debug!("Normalization bounds: [{}, {}] {}", low, high, raster.unit());

    if bounds.span() <= 0.0 {
        log::warn!("Percentile bounds coincide at {}; normalized raster is all zeros", low);
    }

    let data = raster.data().mapv(|v| bounds.normalize_value(v));
    let normalized = NormalizedRaster {
        raster: raster.derive(data, ValueUnit::Normalized),
        bounds,
    };

    Ok((normalized, bounds))
}
