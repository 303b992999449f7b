use sardig::core::morphology::{ElementShape, MorphOperation, MorphStep};
use sardig::core::pipeline::{detect_anomalies, PipelineConfig};
use sardig::core::speckle_filter::SpeckleFilterType;
use sardig::core::ThresholdMode;
use sardig::io::config::{load_config, save_config};
use sardig::io::export::{write_region_report, RegionReport};
use sardig::types::{GeoTransform, Raster, SarError, ValueUnit};
use ndarray::Array2;
use std::fs;
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_config_round_trip() {
    init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("pipeline.json");

    let config = PipelineConfig {
        despeckle_window: 7,
        despeckle_mode: SpeckleFilterType::Median,
        despeckle_looks: Some(4.4),
        edge_threshold: None,
        edge_threshold_mode: ThresholdMode::Relative,
        morph_ops: vec![
            MorphStep::new(MorphOperation::Close, ElementShape::Cross, 2),
            MorphStep::new(MorphOperation::Open, ElementShape::Disk, 1),
        ],
        min_compactness: 0.65,
        ..PipelineConfig::default()
    };

    save_config(&path, &config).unwrap();
    let loaded = load_config(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_config_uses_defaults() {
    init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.json");
    fs::write(
        &path,
        r#"{
            "despeckle_mode": "median",
            "edge_method": "canny",
            "morph_ops": [
                {"operation": "close", "element_shape": "disk", "radius": 1},
                {"operation": "open", "element_shape": "square", "radius": 2}
            ]
        }"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    let defaults = PipelineConfig::default();
    assert_eq!(config.despeckle_mode, SpeckleFilterType::Median);
    assert_eq!(config.despeckle_window, defaults.despeckle_window);
    assert_eq!(config.clip_high_pct, defaults.clip_high_pct);
    assert_eq!(config.morph_ops[1], "open:square:2".parse::<MorphStep>().unwrap());
    assert!(config.validate((64, 64)).is_ok());
}

#[test]
fn test_malformed_config_is_a_configuration_error() {
    init_logging();
    let dir = tempdir().unwrap();

    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{ \"despeckle_window\": ").unwrap();
    let err = load_config(&broken).unwrap_err();
    assert!(matches!(
        err,
        SarError::Configuration { ref parameter, .. } if parameter == "config_file"
    ));

    let unknown_op = dir.path().join("unknown_op.json");
    fs::write(
        &unknown_op,
        r#"{"morph_ops": [{"operation": "dilate", "element_shape": "disk", "radius": 1}]}"#,
    )
    .unwrap();
    assert!(load_config(&unknown_op).unwrap_err().is_configuration());

    let missing = dir.path().join("missing.json");
    assert!(matches!(load_config(&missing), Err(SarError::Io(_))));
}

#[test]
fn test_region_report_is_written() {
    init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("report.json");

    let data = Array2::from_shape_fn((40, 40), |(i, j)| {
        if (15..25).contains(&i) && (15..25).contains(&j) {
            0.9
        } else {
            0.5
        }
    });
    let transform = GeoTransform::north_up(0.0, 0.0, 5.0, -5.0);
    let raster = Raster::new(data, transform, ValueUnit::Intensity).unwrap();
    let config = PipelineConfig {
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
    };
    let result = detect_anomalies(&raster, &config).unwrap();

    write_region_report(&path, &result).unwrap();
    let report: RegionReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!((report.height, report.width), (40, 40));
    assert_eq!(report.regions.len(), result.regions.len());
    for (written, original) in report.regions.iter().zip(&result.regions) {
        assert_eq!(written.label, original.label);
        assert_eq!(written.area, original.area);
        assert_eq!(written.bounds, original.bounds);
        assert_eq!(written.candidate, original.candidate);
        assert!((written.compactness - original.compactness).abs() < 1e-12);
    }
    assert_eq!(report.summary, result.summary);
    assert_eq!(report.summary.candidate_regions, 1);
    assert_eq!(report.bounds.low, 0.5);
    assert_eq!(report.bounds.high, 0.9);
    assert_eq!(report.provenance.steps.len(), 5);
    assert_eq!(report.geo_transform.pixel_width, 5.0);
}
