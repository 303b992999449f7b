use crate::core::edge_detection::EdgeMap;
use crate::core::neighborhood::fill_indexed;
use crate::types::{Raster, SarError, SarResult, ValueUnit};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Binary 0/1 raster of consolidated candidate boundaries
pub type BoundaryRaster = Raster<u8>;

/// Structuring element footprint shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementShape {
    Disk,
    Square,
    Cross,
}

impl FromStr for ElementShape {
    type Err = SarError;

    fn from_str(s: &str) -> SarResult<Self> {
        match s.to_lowercase().as_str() {
            "disk" => Ok(ElementShape::Disk),
            "square" => Ok(ElementShape::Square),
            "cross" => Ok(ElementShape::Cross),
            _ => Err(SarError::config("element_shape", s, "expected disk, square or cross")),
        }
    }
}

/// Structuring element centred on a pixel corner.
///
/// A radius-`r` element covers offsets `-(r-1)..=r` on each axis, i.e. `2r`
/// pixels across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuringElement {
    pub shape: ElementShape,
    pub radius: u32,
}

impl StructuringElement {
    pub fn new(shape: ElementShape, radius: u32) -> SarResult<Self> {
        if radius == 0 {
            return Err(SarError::config("radius", radius, "must be at least 1"));
        }
        Ok(Self { shape, radius })
    }

    /// (row, col) offsets covered by the element. Always contains (0, 0).
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius as isize;
        let r2 = (self.radius as f64).powi(2);
        let mut offsets = Vec::new();

        for di in -(r - 1)..=r {
            for dj in -(r - 1)..=r {
                let inside = match self.shape {
                    ElementShape::Square => true,
                    ElementShape::Disk => {
                        let y = di as f64 - 0.5;
                        let x = dj as f64 - 0.5;
                        x * x + y * y <= r2
                    }
                    ElementShape::Cross => di == 0 || di == 1 || dj == 0 || dj == 1,
                };
                if inside {
                    offsets.push((di, dj));
                }
            }
        }

        offsets
    }
}

/// Morphological operation applied to the binarized edge map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphOperation {
    /// Erosion then dilation: removes specks thinner than the element
    Open,
    /// Dilation then erosion: bridges gaps narrower than the element
    Close,
}

impl FromStr for MorphOperation {
    type Err = SarError;

    fn from_str(s: &str) -> SarResult<Self> {
        match s.to_lowercase().as_str() {
            "open" | "opening" => Ok(MorphOperation::Open),
            "close" | "closing" => Ok(MorphOperation::Close),
            _ => Err(SarError::config("operation", s, "expected open or close")),
        }
    }
}

/// One configured step of the consolidation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphStep {
    pub operation: MorphOperation,
    pub element_shape: ElementShape,
    pub radius: u32,
}

impl MorphStep {
    pub fn new(operation: MorphOperation, element_shape: ElementShape, radius: u32) -> Self {
        Self {
            operation,
            element_shape,
            radius,
        }
    }

    pub fn element(&self) -> SarResult<StructuringElement> {
        StructuringElement::new(self.element_shape, self.radius)
    }
}

impl std::fmt::Display for MorphStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self.operation {
            MorphOperation::Open => "open",
            MorphOperation::Close => "close",
        };
        let shape = match self.element_shape {
            ElementShape::Disk => "disk",
            ElementShape::Square => "square",
            ElementShape::Cross => "cross",
        };
        write!(f, "{}:{}:{}", op, shape, self.radius)
    }
}

/// Parses the compact `operation:shape:radius` form, e.g. `close:disk:1`
impl FromStr for MorphStep {
    type Err = SarError;

    fn from_str(s: &str) -> SarResult<Self> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(SarError::config("morph_ops", s, "expected operation:shape:radius"));
        }
        let operation = parts[0].parse()?;
        let element_shape = parts[1].parse()?;
        let radius = parts[2]
            .parse::<u32>()
            .map_err(|_| SarError::config("radius", parts[2], "expected a positive integer"))?;
        let step = MorphStep::new(operation, element_shape, radius);
        step.element()?;
        Ok(step)
    }
}

/// Default consolidation: bridge gaps first, then drop specks
pub fn default_morph_ops() -> Vec<MorphStep> {
    vec![
        MorphStep::new(MorphOperation::Close, ElementShape::Square, 1),
        MorphStep::new(MorphOperation::Open, ElementShape::Square, 1),
    ]
}

pub fn validate_steps(steps: &[MorphStep]) -> SarResult<()> {
    if steps.is_empty() {
        return Err(SarError::config("morph_ops", "[]", "at least one operation is required"));
    }
    for (index, step) in steps.iter().enumerate() {
        if step.radius == 0 {
            return Err(SarError::config(
                &format!("morph_ops[{}].radius", index),
                step.radius,
                "must be at least 1",
            ));
        }
    }
    Ok(())
}

/// Nonzero → 1
pub fn binarize(edge_map: &EdgeMap) -> Array2<u8> {
    edge_map.data().mapv(|v| u8::from(v != 0.0))
}

/// Binary dilation. Neighbours outside the raster count as background.
pub fn dilate(mask: &Array2<u8>, element: &StructuringElement) -> Array2<u8> {
    let (height, width) = mask.dim();
    let offsets = element.offsets();
    let mut out = Array2::<u8>::zeros((height, width));

    fill_indexed(&mut out, |i, j| {
        let hit = offsets.iter().any(|&(di, dj)| {
            let ii = i as isize - di;
            let jj = j as isize - dj;
            ii >= 0
                && jj >= 0
                && (ii as usize) < height
                && (jj as usize) < width
                && mask[[ii as usize, jj as usize]] != 0
        });
        u8::from(hit)
    });

    out
}

/// Binary erosion. Neighbours outside the raster are ignored, so the raster
/// edge does not eat into foreground.
pub fn erode(mask: &Array2<u8>, element: &StructuringElement) -> Array2<u8> {
    let (height, width) = mask.dim();
    let offsets = element.offsets();
    let mut out = Array2::<u8>::zeros((height, width));

    fill_indexed(&mut out, |i, j| {
        let fits = offsets.iter().all(|&(di, dj)| {
            let ii = i as isize + di;
            let jj = j as isize + dj;
            ii < 0
                || jj < 0
                || ii as usize >= height
                || jj as usize >= width
                || mask[[ii as usize, jj as usize]] != 0
        });
        u8::from(fits)
    });

    out
}

pub fn opening(mask: &Array2<u8>, element: &StructuringElement) -> Array2<u8> {
    dilate(&erode(mask, element), element)
}

pub fn closing(mask: &Array2<u8>, element: &StructuringElement) -> Array2<u8> {
    erode(&dilate(mask, element), element)
}

/// Binarize `edge_map` and apply `steps` in the given order.
pub fn consolidate(edge_map: &EdgeMap, steps: &[MorphStep]) -> SarResult<BoundaryRaster> {
    validate_steps(steps)?;
    edge_map.validate()?;

    let mask = binarize(edge_map);
    consolidate_mask(edge_map.derive(mask, ValueUnit::Binary), steps)
}

/// Apply `steps` to an already binary raster
pub fn consolidate_mask(mask: BoundaryRaster, steps: &[MorphStep]) -> SarResult<BoundaryRaster> {
    validate_steps(steps)?;

    log::info!(
        "Consolidating {}x{} boundary mask with {} morphological steps",
        mask.height(),
        mask.width(),
        steps.len()
    );

    let mut current = mask.data().mapv(|v| u8::from(v != 0));
    for step in steps {
        let element = step.element()?;
        current = match step.operation {
            MorphOperation::Open => opening(&current, &element),
            MorphOperation::Close => closing(&current, &element),
        };
        log::debug!(
            "After {}: {} boundary pixels",
            step,
            current.iter().filter(|&&v| v != 0).count()
        );
    }

    Ok(mask.derive(current, ValueUnit::Binary))
}
