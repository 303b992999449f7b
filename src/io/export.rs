use crate::core::anomaly::Region;
use crate::core::normalize::NormalizationBounds;
use crate::core::pipeline::{AnomalyResult, AnomalySummary, ProcessingRecord};
use crate::types::{GeoTransform, SarResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Per-pixel class of the annotated overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OverlayClass {
    /// Background connected to the raster edge
    Open = 0,
    Boundary = 1,
    /// Enclosed region that failed the area or compactness filters
    Rejected = 2,
    Candidate = 3,
}

/// Serializable summary of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionReport {
    pub height: usize,
    pub width: usize,
    pub geo_transform: GeoTransform,
    pub bounds: NormalizationBounds,
    pub summary: AnomalySummary,
    pub regions: Vec<Region>,
    pub provenance: ProcessingRecord,
}

impl RegionReport {
    pub fn from_result(result: &AnomalyResult) -> Self {
        let (height, width) = result.boundary.dim();
        Self {
            height,
            width,
            geo_transform: *result.boundary.geo_transform(),
            bounds: result.normalized.bounds,
            summary: result.summary,
            regions: result.regions.clone(),
            provenance: result.provenance.clone(),
        }
    }
}

/// Write the region report of `result` as pretty-printed JSON
pub fn write_region_report<P: AsRef<Path>>(path: P, result: &AnomalyResult) -> SarResult<()> {
    let path = path.as_ref();
    log::info!("Writing region report ({} regions) to: {}", result.regions.len(), path.display());

    let report = RegionReport::from_result(result);
    fs::write(path, serde_json::to_string_pretty(&report)?)?;
    Ok(())
}

/// Class raster a renderer can colour directly (see [`OverlayClass`])
pub fn overlay_classes(result: &AnomalyResult) -> Array2<u8> {
    let labels = result.labels.data();
    let boundary = result.boundary.data();

    Array2::from_shape_fn(labels.dim(), |(i, j)| {
        let class = match labels[[i, j]] {
            0 if boundary[[i, j]] != 0 => OverlayClass::Boundary,
            0 => OverlayClass::Open,
            label => match result.regions.get((label - 1) as usize) {
                Some(region) if region.candidate => OverlayClass::Candidate,
                Some(region) if region.enclosed => OverlayClass::Rejected,
                _ => OverlayClass::Open,
            },
        };
        class as u8
    })
}
