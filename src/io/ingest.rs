use crate::types::{GeoTransform, Raster, SarError, SarImage, SarResult, SarReal, ValueUnit};
use ndarray::Array2;

/// Floor added before taking the logarithm so zero intensity stays finite
const DB_EPSILON: SarReal = 1e-10;

/// Build a raster from a row-major sample buffer.
pub fn raster_from_vec(
    height: usize,
    width: usize,
    samples: Vec<SarReal>,
    geo_transform: GeoTransform,
    unit: ValueUnit,
) -> SarResult<Raster> {
    let data = Array2::from_shape_vec((height, width), samples).map_err(|e| {
        SarError::Input(format!("Sample buffer does not match {}x{} raster: {}", height, width, e))
    })?;
    Raster::new(data, geo_transform, unit)
}

/// |z|² of complex SLC samples
pub fn intensity_from_complex(slc: &SarImage, geo_transform: GeoTransform) -> SarResult<Raster> {
    log::debug!("Computing intensity from {}x{} complex samples", slc.nrows(), slc.ncols());
    Raster::new(slc.mapv(|z| z.norm_sqr()), geo_transform, ValueUnit::Intensity)
}

/// |z| of complex SLC samples
pub fn amplitude_from_complex(slc: &SarImage, geo_transform: GeoTransform) -> SarResult<Raster> {
    log::debug!("Computing amplitude from {}x{} complex samples", slc.nrows(), slc.ncols());
    Raster::new(slc.mapv(|z| z.norm()), geo_transform, ValueUnit::Amplitude)
}

/// 10·log10(x + 1e-10) of a linear intensity raster
pub fn to_decibel(raster: &Raster) -> SarResult<Raster> {
    match raster.unit() {
        ValueUnit::Intensity => {}
        ValueUnit::Amplitude => {
            let data = raster.data().mapv(|a| 10.0 * (a * a + DB_EPSILON).log10());
            return Ok(raster.derive(data, ValueUnit::Decibel));
        }
        other => {
            return Err(SarError::Input(format!("Cannot convert {} raster to dB", other)));
        }
    }
    if let Some(v) = raster.data().iter().find(|&&v| v < 0.0) {
        return Err(SarError::Input(format!("Negative intensity {} cannot be converted to dB", v)));
    }
    let data = raster.data().mapv(|v| 10.0 * (v + DB_EPSILON).log10());
    Ok(raster.derive(data, ValueUnit::Decibel))
}

/// Linear intensity from a dB raster
pub fn from_decibel(raster: &Raster) -> SarResult<Raster> {
    if raster.unit() != ValueUnit::Decibel {
        return Err(SarError::Input(format!("Expected a dB raster, got {}", raster.unit())));
    }
    let data = raster.data().mapv(|db| 10f32.powf(db / 10.0));
    Raster::new(data, *raster.geo_transform(), ValueUnit::Intensity)
}
