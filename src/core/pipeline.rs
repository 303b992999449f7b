use crate::core::anomaly::{extract_with, ExtractionParams, Region};
use crate::core::edge_detection::{
    detect_edges_with, EdgeDetectionParams, EdgeMap, EdgeMethod, ThresholdMode,
};
use crate::core::morphology::{
    consolidate, default_morph_ops, validate_steps, BoundaryRaster, MorphStep,
};
use crate::core::normalize::{
    normalize, validate_percentiles, NormalizationBounds, NormalizedRaster,
};
use crate::core::speckle_filter::{SpeckleFilter, SpeckleFilterParams, SpeckleFilterType};
use crate::types::{Raster, SarResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Every option recognised by the anomaly pipeline.
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Despeckle window (odd, >= 3)
    pub despeckle_window: usize,
    pub despeckle_mode: SpeckleFilterType,
    /// Equivalent number of looks for `adaptive`; estimated when `None`
    pub despeckle_looks: Option<f32>,
    pub clip_low_pct: f64,
    pub clip_high_pct: f64,
    pub edge_method: EdgeMethod,
    pub edge_threshold: Option<f32>,
    pub edge_threshold_mode: ThresholdMode,
    pub canny_sigma: f32,
    /// Applied in order
    pub morph_ops: Vec<MorphStep>,
    pub min_region_area: usize,
    pub max_region_area: usize,
    pub min_compactness: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            despeckle_window: 5,
            despeckle_mode: SpeckleFilterType::Adaptive,
            despeckle_looks: None,
            clip_low_pct: 2.0,
            clip_high_pct: 98.0,
            edge_method: EdgeMethod::Sobel,
            edge_threshold: Some(0.2),
            edge_threshold_mode: ThresholdMode::Absolute,
            canny_sigma: 1.0,
            morph_ops: default_morph_ops(),
            min_region_area: 25,
            max_region_area: 10_000,
            min_compactness: 0.3,
        }
    }
}

impl PipelineConfig {
    pub fn speckle_params(&self) -> SpeckleFilterParams {
        SpeckleFilterParams {
            window_size: self.despeckle_window,
            num_looks: self.despeckle_looks,
        }
    }

    pub fn edge_params(&self) -> EdgeDetectionParams {
        EdgeDetectionParams {
            method: self.edge_method,
            threshold: self.edge_threshold,
            threshold_mode: self.edge_threshold_mode,
            canny_sigma: self.canny_sigma,
        }
    }

    pub fn extraction_params(&self) -> ExtractionParams {
        ExtractionParams {
            min_area: self.min_region_area,
            max_area: self.max_region_area,
            min_compactness: self.min_compactness,
        }
    }

    /// Check every parameter against a raster of `shape` (height, width).
    pub fn validate(&self, shape: (usize, usize)) -> SarResult<()> {
        // Unit compatibility is checked against the raster in `validate_for`
        SpeckleFilter::with_params(self.speckle_params()).validate(
            shape,
            self.despeckle_mode,
            true,
        )?;
        validate_percentiles(self.clip_low_pct, self.clip_high_pct)?;
        self.edge_params().validate()?;
        validate_steps(&self.morph_ops)?;
        self.extraction_params().validate()
    }

    /// [`validate`](Self::validate) plus the checks that depend on the
    /// raster's unit.
    pub fn validate_for(&self, raster: &Raster) -> SarResult<()> {
        self.validate(raster.dim())?;
        SpeckleFilter::with_params(self.speckle_params()).validate(
            raster.dim(),
            self.despeckle_mode,
            raster.unit().is_linear(),
        )
    }
}

/// Counts reported alongside the region list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total_regions: usize,
    pub candidate_regions: usize,
    pub candidate_pixels: usize,
    pub boundary_pixels: usize,
}

/// One executed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStep {
    pub stage: String,
    pub parameters: serde_json::Value,
    pub elapsed_ms: f64,
}

/// How an [`AnomalyResult`] was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub processed_at: DateTime<Utc>,
    pub software_version: String,
    pub steps: Vec<ProcessingStep>,
}

impl ProcessingRecord {
    fn start() -> Self {
        Self {
            processed_at: Utc::now(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            steps: Vec::new(),
        }
    }

    fn record(&mut self, stage: &str, parameters: serde_json::Value, started: Instant) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        log::debug!("{} finished in {:.1} ms", stage, elapsed_ms);
        self.steps.push(ProcessingStep {
            stage: stage.to_string(),
            parameters,
            elapsed_ms,
        });
    }
}

/// Everything a pipeline run produces, handed whole to the result assembler
#[derive(Debug, Clone)]
pub struct AnomalyResult {
    pub despeckled: Raster,
    pub normalized: NormalizedRaster,
    pub edges: EdgeMap,
    pub boundary: BoundaryRaster,
    /// 0 on boundary pixels, otherwise the region label
    pub labels: Raster<u32>,
    /// 1 on candidate-region pixels
    pub anomaly_mask: Raster<u8>,
    /// Ascending label order
    pub regions: Vec<Region>,
    pub summary: AnomalySummary,
    pub provenance: ProcessingRecord,
}

impl AnomalyResult {
    pub fn bounds(&self) -> &NormalizationBounds {
        &self.normalized.bounds
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(|r| r.candidate)
    }
}

/// Despeckle → normalize → edges → morphology → region extraction
pub struct AnomalyPipeline {
    config: PipelineConfig,
}

impl AnomalyPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on `raster`.
    ///
    /// All configuration is validated before the first stage starts, so a
    /// bad parameter never yields partial output.
    pub fn run(&self, raster: &Raster) -> SarResult<AnomalyResult> {
        raster.validate()?;
        self.config.validate_for(raster)?;

        let config = &self.config;
        let (height, width) = raster.dim();
        log::info!("Starting anomaly pipeline on {}x{} {} raster", height, width, raster.unit());

        let mut provenance = ProcessingRecord::start();

        let started = Instant::now();
        let despeckled = SpeckleFilter::with_params(config.speckle_params())
            .apply_filter(raster, config.despeckle_mode)?;
        provenance.record(
            "despeckle",
            json!({
                "window_size": config.despeckle_window,
                "mode": config.despeckle_mode,
                "num_looks": config.despeckle_looks,
            }),
            started,
        );

        let started = Instant::now();
        let (normalized, bounds) =
            normalize(&despeckled, config.clip_low_pct, config.clip_high_pct)?;
        provenance.record(
            "normalize",
            json!({
                "clip_low_pct": config.clip_low_pct,
                "clip_high_pct": config.clip_high_pct,
                "low": bounds.low,
                "high": bounds.high,
            }),
            started,
        );

        let started = Instant::now();
        let edge_params = config.edge_params();
        let edges = detect_edges_with(&normalized, &edge_params)?;
        provenance.record("detect_edges", json!(edge_params), started);

        let started = Instant::now();
        let boundary = consolidate(&edges, &config.morph_ops)?;
        let ops: Vec<String> = config.morph_ops.iter().map(MorphStep::to_string).collect();
        provenance.record("consolidate", json!({ "morph_ops": ops }), started);

        let started = Instant::now();
        let extraction_params = config.extraction_params();
        let extraction = extract_with(&boundary, &extraction_params)?;
        provenance.record("extract", json!(extraction_params), started);

        let anomaly_mask = extraction.anomaly_mask();
        let summary = AnomalySummary {
            total_regions: extraction.regions.len(),
            candidate_regions: extraction.candidates().count(),
            candidate_pixels: anomaly_mask.count_nonzero(),
            boundary_pixels: boundary.count_nonzero(),
        };

        log::info!(
            "Pipeline complete: {} regions, {} candidates ({} px)",
            summary.total_regions,
            summary.candidate_regions,
            summary.candidate_pixels
        );

        Ok(AnomalyResult {
            despeckled,
            normalized,
            edges,
            boundary,
            labels: extraction.labels,
            anomaly_mask,
            regions: extraction.regions,
            summary,
            provenance,
        })
    }
}

/// Run the pipeline once with `config`.
pub fn detect_anomalies(raster: &Raster, config: &PipelineConfig) -> SarResult<AnomalyResult> {
    AnomalyPipeline::new(config.clone()).run(raster)
}

/// Run independent rasters with one configuration. Results are returned in
/// input order, one per raster.
pub fn run_batch(rasters: &[Raster], config: &PipelineConfig) -> Vec<SarResult<AnomalyResult>> {
    let pipeline = AnomalyPipeline::new(config.clone());
    log::info!("Processing batch of {} rasters", rasters.len());

    #[cfg(feature = "parallel")]
    let results = rasters.par_iter().map(|raster| pipeline.run(raster)).collect();

    #[cfg(not(feature = "parallel"))]
    let results = rasters.iter().map(|raster| pipeline.run(raster)).collect();

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::morphology::{ElementShape, MorphOperation};
    use crate::types::{GeoTransform, SarError, ValueUnit};
    use ndarray::Array2;

    fn square_scene(size: usize, offset: usize, side: usize) -> Raster {
        let data = Array2::from_shape_fn((size, size), |(i, j)| {
            let span = offset..offset + side;
            let inside = span.contains(&i) && span.contains(&j);
            if inside {
                0.9
            } else {
                0.5
            }
        });
        Raster::new(data, GeoTransform::pixel_grid(), ValueUnit::Intensity).unwrap()
    }

    fn median_config() -> PipelineConfig {
        PipelineConfig {
            despeckle_window: 3,
            despeckle_mode: SpeckleFilterType::Median,
            clip_low_pct: 0.0,
            clip_high_pct: 100.0,
            edge_threshold: Some(0.1),
            morph_ops: vec![
                MorphStep::new(MorphOperation::Close, ElementShape::Disk, 1),
                MorphStep::new(MorphOperation::Open, ElementShape::Disk, 1),
            ],
            min_region_area: 50,
            max_region_area: 200,
            min_compactness: 0.5,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate((64, 64)).is_ok());
        assert_eq!(config.morph_ops.len(), 2);
        assert_eq!(config.morph_ops[0].operation, MorphOperation::Close);
    }

    #[test]
    fn test_validation_runs_before_any_stage() {
        let raster = square_scene(20, 5, 6);
        let cases: Vec<(PipelineConfig, &str)> = vec![
            (
                PipelineConfig {
                    despeckle_window: 4,
                    ..PipelineConfig::default()
                },
                "despeckle_window",
            ),
            (
                PipelineConfig {
                    clip_low_pct: 99.0,
                    clip_high_pct: 1.0,
                    ..PipelineConfig::default()
                },
                "clip_low_pct",
            ),
            (
                PipelineConfig {
                    edge_threshold: Some(1.5),
                    ..PipelineConfig::default()
                },
                "edge_threshold",
            ),
            (
                PipelineConfig {
                    morph_ops: Vec::new(),
                    ..PipelineConfig::default()
                },
                "morph_ops",
            ),
            (
                PipelineConfig {
                    min_region_area: 500,
                    max_region_area: 50,
                    ..PipelineConfig::default()
                },
                "min_region_area",
            ),
        ];

        for (config, expected) in cases {
            match AnomalyPipeline::new(config).run(&raster) {
                Err(SarError::Configuration { parameter, .. }) => assert_eq!(parameter, expected),
                other => panic!(
                    "expected configuration error on {}, got {:?}",
                    expected,
                    other.map(|r| r.summary)
                ),
            }
        }
    }

    #[test]
    fn test_adaptive_mode_rejects_decibel_input() {
        let data = Array2::from_elem((16, 16), -12.0f32);
        let raster = Raster::new(data, GeoTransform::pixel_grid(), ValueUnit::Decibel).unwrap();
        let err = detect_anomalies(&raster, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            SarError::Configuration { ref parameter, .. } if parameter == "despeckle_mode"
        ));
    }

    #[test]
    fn test_square_scene_yields_one_candidate() {
        let result = detect_anomalies(&square_scene(40, 15, 10), &median_config()).unwrap();

        assert_eq!(result.summary.candidate_regions, 1);
        let candidate = result.candidates().next().unwrap();
        assert!(candidate.area >= 50 && candidate.area <= 200);
        assert!((candidate.centroid.0 - 19.5).abs() < 1.0);
        assert!((candidate.centroid.1 - 19.5).abs() < 1.0);
        assert_eq!(result.summary.candidate_pixels, candidate.area);
        assert_eq!(result.labels.dim(), (40, 40));
    }

    #[test]
    fn test_provenance_lists_every_stage_in_order() {
        let result = detect_anomalies(&square_scene(30, 10, 10), &median_config()).unwrap();
        let stages: Vec<&str> = result.provenance.steps.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(
            stages,
            vec!["despeckle", "normalize", "detect_edges", "consolidate", "extract"]
        );
        assert_eq!(result.provenance.software_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(result.provenance.steps[3].parameters["morph_ops"][0], "close:disk:1");
    }

    #[test]
    fn test_batch_preserves_input_order() {
        let rasters = vec![
            square_scene(30, 10, 10),
            square_scene(8, 0, 0),
            square_scene(30, 5, 10),
        ];
        let config = PipelineConfig {
            despeckle_window: 9,
            ..median_config()
        };

        let results = run_batch(&rasters, &config);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        // 9x9 window does not fit the 8x8 raster
        assert!(matches!(results[1], Err(SarError::Configuration { .. })));
        assert!(results[2].is_ok());
    }
}
