//! Core anomaly-detection stages

pub mod anomaly;
pub mod edge_detection;
pub mod morphology;
pub mod neighborhood;
pub mod normalize;
pub mod pipeline;
pub mod speckle_filter;

// Re-export main types
pub use anomaly::{extract, extract_with, Extraction, ExtractionParams, PixelBounds, Region};
pub use edge_detection::{
    detect_edges, detect_edges_with, EdgeDetectionParams, EdgeMap, EdgeMethod, ThresholdMode,
};
pub use morphology::{
    consolidate, BoundaryRaster, ElementShape, MorphOperation, MorphStep, StructuringElement,
};
pub use normalize::{normalize, NormalizationBounds, NormalizedRaster};
pub use pipeline::{
    detect_anomalies, run_batch, AnomalyPipeline, AnomalyResult, AnomalySummary, PipelineConfig,
    ProcessingRecord, ProcessingStep,
};
pub use speckle_filter::{despeckle, SpeckleFilter, SpeckleFilterParams, SpeckleFilterType};
