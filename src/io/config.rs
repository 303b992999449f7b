use crate::core::pipeline::PipelineConfig;
use crate::types::{SarError, SarResult};
use std::fs;
use std::path::Path;

/// Read a pipeline configuration from a JSON file.
///
/// Omitted fields take their defaults. The loaded values are not checked
/// against any raster here; the pipeline does that before it runs.
pub fn load_config<P: AsRef<Path>>(path: P) -> SarResult<PipelineConfig> {
    let path = path.as_ref();
    log::info!("Loading pipeline configuration from: {}", path.display());

    let text = fs::read_to_string(path)?;
    let config: PipelineConfig = serde_json::from_str(&text)
        .map_err(|e| SarError::config("config_file", path.display(), e.to_string()))?;

    log::debug!("Loaded configuration: {:?}", config);
    Ok(config)
}

/// Write `config` as pretty-printed JSON
pub fn save_config<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> SarResult<()> {
    let path = path.as_ref();
    log::info!("Saving pipeline configuration to: {}", path.display());

    let text = serde_json::to_string_pretty(config)?;
    fs::write(path, text)?;
    Ok(())
}
