//! Python bindings (`sardig._core`)

use crate::core::pipeline::{AnomalyPipeline, PipelineConfig};
use crate::core::speckle_filter::{SpeckleFilter, SpeckleFilterParams, SpeckleFilterType};
use crate::core::{normalize as normalize_raster, Region};
use crate::io::export::overlay_classes;
use crate::types::{GeoTransform, Raster, SarError, ValueUnit};
use numpy::{PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

fn to_py_err(err: SarError) -> PyErr {
    match err {
        SarError::Configuration { .. } | SarError::Input(_) => {
            PyValueError::new_err(err.to_string())
        }
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

/// Wrap a numpy array as a raster. `geo_transform` uses GDAL ordering.
fn to_raster(
    data: PyReadonlyArray2<f32>,
    geo_transform: Option<[f64; 6]>,
    unit: &str,
) -> PyResult<Raster> {
    let transform = match geo_transform {
        Some(gt) => GeoTransform {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        },
        None => GeoTransform::pixel_grid(),
    };
    let unit = unit.parse::<ValueUnit>().map_err(to_py_err)?;
    Raster::new(data.as_array().to_owned(), transform, unit).map_err(to_py_err)
}

fn region_to_dict<'py>(py: Python<'py>, region: &Region) -> PyResult<&'py PyDict> {
    let dict = PyDict::new(py);
    dict.set_item("label", region.label)?;
    dict.set_item("area", region.area)?;
    dict.set_item(
        "bbox",
        (
            region.bounds.min_row,
            region.bounds.min_col,
            region.bounds.max_row,
            region.bounds.max_col,
        ),
    )?;
    dict.set_item("centroid", region.centroid)?;
    dict.set_item("geo_centroid", region.geo_centroid)?;
    dict.set_item("perimeter", region.perimeter)?;
    dict.set_item("compactness", region.compactness)?;
    dict.set_item("enclosed", region.enclosed)?;
    dict.set_item("candidate", region.candidate)?;
    Ok(dict)
}

/// Speckle filtering
#[pyfunction]
#[pyo3(signature = (data, window_size=5, mode="adaptive", num_looks=None, unit="intensity"))]
fn despeckle(
    py: Python,
    data: PyReadonlyArray2<f32>,
    window_size: usize,
    mode: &str,
    num_looks: Option<f32>,
    unit: &str,
) -> PyResult<PyObject> {
    let raster = to_raster(data, None, unit)?;
    let filter_type: SpeckleFilterType = mode.parse().map_err(to_py_err)?;
    let filter = SpeckleFilter::with_params(SpeckleFilterParams { window_size, num_looks });
    let filtered = filter.apply_filter(&raster, filter_type).map_err(to_py_err)?;
    Ok(filtered.data().to_pyarray(py).into())
}

/// Percentile normalization to [0, 1]
#[pyfunction]
#[pyo3(signature = (data, clip_low_pct=2.0, clip_high_pct=98.0, unit="intensity"))]
fn normalize(
    py: Python,
    data: PyReadonlyArray2<f32>,
    clip_low_pct: f64,
    clip_high_pct: f64,
    unit: &str,
) -> PyResult<PyObject> {
    let raster = to_raster(data, None, unit)?;
    let (normalized, bounds) =
        normalize_raster(&raster, clip_low_pct, clip_high_pct).map_err(to_py_err)?;

    let result = PyDict::new(py);
    result.set_item("data", normalized.raster.data().to_pyarray(py))?;
    result.set_item("low", bounds.low)?;
    result.set_item("high", bounds.high)?;
    result.set_item("unit", bounds.source_unit.to_string())?;
    Ok(result.into())
}

/// Full anomaly pipeline. `config_json` uses the same keys as the JSON
/// configuration file; omitted keys take their defaults.
#[pyfunction]
#[pyo3(signature = (data, config_json=None, geo_transform=None, unit="intensity"))]
fn detect_anomalies(
    py: Python,
    data: PyReadonlyArray2<f32>,
    config_json: Option<&str>,
    geo_transform: Option<[f64; 6]>,
    unit: &str,
) -> PyResult<PyObject> {
    let raster = to_raster(data, geo_transform, unit)?;
    let config: PipelineConfig = match config_json {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| PyValueError::new_err(format!("Invalid configuration: {}", e)))?,
        None => PipelineConfig::default(),
    };

    let result = py
        .allow_threads(|| AnomalyPipeline::new(config).run(&raster))
        .map_err(to_py_err)?;

    let regions = PyList::empty(py);
    for region in &result.regions {
        regions.append(region_to_dict(py, region)?)?;
    }

    let output = PyDict::new(py);
    output.set_item("despeckled", result.despeckled.data().to_pyarray(py))?;
    output.set_item("normalized", result.normalized.raster.data().to_pyarray(py))?;
    output.set_item("edges", result.edges.data().to_pyarray(py))?;
    output.set_item("boundary", result.boundary.data().to_pyarray(py))?;
    output.set_item("labels", result.labels.data().to_pyarray(py))?;
    output.set_item("anomaly_mask", result.anomaly_mask.data().to_pyarray(py))?;
    output.set_item("overlay", overlay_classes(&result).to_pyarray(py))?;
    output.set_item("regions", regions)?;
    output.set_item("bounds", (result.bounds().low, result.bounds().high))?;
    output.set_item("total_regions", result.summary.total_regions)?;
    output.set_item("candidate_regions", result.summary.candidate_regions)?;
    Ok(output.into())
}

#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(despeckle, m)?)?;
    m.add_function(wrap_pyfunction!(normalize, m)?)?;
    m.add_function(wrap_pyfunction!(detect_anomalies, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
