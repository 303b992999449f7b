//! Boundary helpers around the core: raster ingest, configuration files and
//! result export

pub mod config;
pub mod export;
pub mod ingest;

pub use config::{load_config, save_config};
pub use export::{overlay_classes, write_region_report, OverlayClass, RegionReport};
pub use ingest::{
    amplitude_from_complex, from_decibel, intensity_from_complex, raster_from_vec, to_decibel,
};
