use ndarray::Array2;
use num_complex::Complex;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Complex-valued SAR data type (I + jQ)
pub type SarComplex = Complex<f32>;

/// Real-valued intensity or amplitude data
pub type SarReal = f32;

/// 2D complex SAR data array (rows x cols)
pub type SarImage = Array2<SarComplex>;

/// 2D real SAR data array (rows x cols)
pub type SarRealImage = Array2<SarReal>;

/// Physical meaning of the samples held by a [`Raster`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueUnit {
    /// Calibrated backscatter power (linear ratio)
    Intensity,
    /// Square root of intensity
    Amplitude,
    /// 10·log10 of intensity
    Decibel,
    /// Detector-ready values in [0, 1]
    Normalized,
    /// Non-negative gradient magnitudes
    GradientMagnitude,
    /// 0/1 mask
    Binary,
    /// Region labels, 0 for none
    Label,
}

impl ValueUnit {
    /// Whether the samples live in the linear (non-log) power/amplitude domain
    pub fn is_linear(&self) -> bool {
        matches!(self, ValueUnit::Intensity | ValueUnit::Amplitude)
    }
}

impl std::fmt::Display for ValueUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueUnit::Intensity => write!(f, "intensity"),
            ValueUnit::Amplitude => write!(f, "amplitude"),
            ValueUnit::Decibel => write!(f, "dB"),
            ValueUnit::Normalized => write!(f, "normalized"),
            ValueUnit::GradientMagnitude => write!(f, "gradient"),
            ValueUnit::Binary => write!(f, "binary"),
            ValueUnit::Label => write!(f, "label"),
        }
    }
}

impl std::str::FromStr for ValueUnit {
    type Err = SarError;

    fn from_str(s: &str) -> SarResult<Self> {
        match s.to_lowercase().as_str() {
            "intensity" | "linear" => Ok(ValueUnit::Intensity),
            "amplitude" => Ok(ValueUnit::Amplitude),
            "db" | "decibel" => Ok(ValueUnit::Decibel),
            "normalized" => Ok(ValueUnit::Normalized),
            _ => Err(SarError::config(
                "unit",
                s,
                "expected intensity, amplitude, db or normalized",
            )),
        }
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Transform whose geocoordinates are the pixel coordinates themselves
    pub fn pixel_grid() -> Self {
        Self {
            top_left_x: 0.0,
            pixel_width: 1.0,
            rotation_x: 0.0,
            top_left_y: 0.0,
            rotation_y: 0.0,
            pixel_height: 1.0,
        }
    }

    /// North-up transform from an origin and pixel size
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height,
        }
    }

    /// Map a fractional pixel position to geocoordinates.
    ///
    /// `(row, col)` addresses pixel centres: `(0.0, 0.0)` is the centre of the
    /// top-left pixel, not its corner.
    pub fn pixel_to_geo(&self, row: f64, col: f64) -> (f64, f64) {
        let px = col + 0.5;
        let py = row + 0.5;
        let x = self.top_left_x + px * self.pixel_width + py * self.rotation_x;
        let y = self.top_left_y + px * self.rotation_y + py * self.pixel_height;
        (x, y)
    }

    pub fn validate(&self) -> SarResult<()> {
        let all = [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(SarError::Input(format!(
                "Geotransform contains non-finite values: {:?}",
                self
            )));
        }
        if self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return Err(SarError::Input(format!(
                "Geotransform has zero pixel size ({} x {})",
                self.pixel_width, self.pixel_height
            )));
        }
        Ok(())
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::pixel_grid()
    }
}

/// A 2-D sample grid with its pixel→geocoordinate mapping.
///
/// Every pipeline stage allocates a fresh `Raster` for its output and carries
/// the source transform over unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T = SarReal> {
    data: Array2<T>,
    geo_transform: GeoTransform,
    unit: ValueUnit,
}

impl Raster<SarReal> {
    /// Build a raster from decoded backscatter samples, validating the input
    /// contract of the core (non-empty, finite, usable geotransform).
    pub fn new(
        data: SarRealImage,
        geo_transform: GeoTransform,
        unit: ValueUnit,
    ) -> SarResult<Self> {
        let raster = Self {
            data,
            geo_transform,
            unit,
        };
        raster.validate()?;
        Ok(raster)
    }

    /// Re-check the input contract; stages call this at entry.
    pub fn validate(&self) -> SarResult<()> {
        let (height, width) = self.data.dim();
        if height == 0 || width == 0 {
            return Err(SarError::Input(format!(
                "Raster is empty ({}x{})",
                height, width
            )));
        }
        if let Some(((i, j), v)) = self.data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(SarError::Input(format!(
                "Raster contains non-finite sample {} at ({}, {})",
                v, i, j
            )));
        }
        self.geo_transform.validate()
    }
}

impl<T> Raster<T> {
    /// Assemble a raster without validation. Used for stage outputs, which
    /// inherit an already validated transform.
    pub(crate) fn from_parts(
        data: Array2<T>,
        geo_transform: GeoTransform,
        unit: ValueUnit,
    ) -> Self {
        Self {
            data,
            geo_transform,
            unit,
        }
    }

    /// New raster on the same grid as `self` holding `data`
    pub fn derive<U>(&self, data: Array2<U>, unit: ValueUnit) -> Raster<U> {
        Raster::from_parts(data, self.geo_transform, unit)
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    pub fn unit(&self) -> ValueUnit {
        self.unit
    }

    /// (height, width)
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }
}

impl<T: Zero + Copy> Raster<T> {
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|v| !v.is_zero()).count()
    }
}

/// Error types for SAR anomaly processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    /// Invalid parameter or parameter combination, raised before any stage runs
    #[error("Configuration error: {parameter} = {value}: {reason}")]
    Configuration {
        parameter: String,
        value: String,
        reason: String,
    },

    /// Raster violates the core's input contract
    #[error("Input error: {0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SarError {
    pub fn config(parameter: &str, value: impl Display, reason: impl Into<String>) -> Self {
        SarError::Configuration {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, SarError::Configuration { .. })
    }
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;
