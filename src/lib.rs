//! SARdig: anomaly detection in SAR backscatter imagery
//!
//! Turns a calibrated amplitude or intensity raster into a list of enclosed,
//! compact regions worth a closer look for buried structures. The pipeline is
//! a fixed sequence of pure stages: despeckle, normalize, edge detection,
//! morphological consolidation and region extraction.

pub mod core;
pub mod io;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use crate::types::{
    GeoTransform, Raster, SarComplex, SarError, SarImage, SarReal, SarRealImage, SarResult,
    ValueUnit,
};

pub use crate::core::{
    consolidate, despeckle, detect_anomalies, detect_edges, extract, normalize, run_batch,
    AnomalyPipeline, AnomalyResult, PipelineConfig, Region,
};
