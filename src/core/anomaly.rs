use crate::core::morphology::BoundaryRaster;
use crate::types::{Raster, SarError, SarResult, ValueUnit};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Inclusive pixel bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBounds {
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

/// A connected set of non-boundary pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// 1-based label, in raster-scan order of each region's first pixel
    pub label: u32,
    /// Pixel count
    pub area: usize,
    pub bounds: PixelBounds,
    /// (row, col) in pixel space
    pub centroid: (f64, f64),
    /// (x, y) in the raster's geocoordinates
    pub geo_centroid: (f64, f64),
    /// Boundary pixels edge-adjacent to the region
    pub perimeter: usize,
    /// 4π·area / perimeter², clamped to [0, 1]
    pub compactness: f64,
    /// False when the region reaches the raster edge
    pub enclosed: bool,
    pub candidate: bool,
}

/// Region acceptance thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionParams {
    pub min_area: usize,
    pub max_area: usize,
    pub min_compactness: f64,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            min_area: 25,
            max_area: 10_000,
            min_compactness: 0.3,
        }
    }
}

impl ExtractionParams {
    pub fn validate(&self) -> SarResult<()> {
        if self.min_area > self.max_area {
            return Err(SarError::config(
                "min_region_area",
                self.min_area,
                format!("exceeds max_region_area ({})", self.max_area),
            ));
        }
        if !self.min_compactness.is_finite() || !(0.0..=1.0).contains(&self.min_compactness) {
            return Err(SarError::config(
                "min_compactness",
                self.min_compactness,
                "must lie in [0, 1]",
            ));
        }
        Ok(())
    }

    fn accepts(&self, area: usize, compactness: f64, enclosed: bool) -> bool {
        enclosed
            && area >= self.min_area
            && area <= self.max_area
            && compactness >= self.min_compactness
    }
}

/// Labeled regions plus the label raster they were read from
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub regions: Vec<Region>,
    /// 0 on boundary pixels, otherwise the region label
    pub labels: Raster<u32>,
}

impl Extraction {
    pub fn candidates(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(|r| r.candidate)
    }

    /// 1 on pixels of candidate regions
    pub fn anomaly_mask(&self) -> Raster<u8> {
        let mask = self.labels.data().mapv(|label| {
            let candidate = label > 0 && self.regions[(label - 1) as usize].candidate;
            u8::from(candidate)
        });
        self.labels.derive(mask, ValueUnit::Binary)
    }
}

/// Label the regions enclosed by `boundary` and flag the candidates.
pub fn extract(
    boundary: &BoundaryRaster,
    min_area: usize,
    max_area: usize,
    min_compactness: f64,
) -> SarResult<Vec<Region>> {
    let params = ExtractionParams {
        min_area,
        max_area,
        min_compactness,
    };
    Ok(extract_with(boundary, &params)?.regions)
}

pub fn extract_with(boundary: &BoundaryRaster, params: &ExtractionParams) -> SarResult<Extraction> {
    params.validate()?;

    let (height, width) = boundary.dim();
    if height == 0 || width == 0 {
        return Err(SarError::Input("Boundary raster is empty".to_string()));
    }

    log::info!("Extracting regions from {}x{} boundary raster", height, width);

    let mask = boundary.data();
    let (labels, count) = label_background(mask);

    let mut accumulators = vec![RegionAccumulator::default(); count];
    for ((i, j), &label) in labels.indexed_iter() {
        if label > 0 {
            accumulators[(label - 1) as usize].add(i, j, height, width);
        }
    }

    // Perimeter: each boundary pixel counts once per distinct neighbouring region
    for ((i, j), &value) in mask.indexed_iter() {
        if value == 0 {
            continue;
        }
        let mut seen = [0u32; 4];
        let mut n_seen = 0;
        for (di, dj) in [(-1isize, 0isize), (1, 0), (0, -1), (0, 1)] {
            let ni = i as isize + di;
            let nj = j as isize + dj;
            if ni < 0 || nj < 0 || ni as usize >= height || nj as usize >= width {
                continue;
            }
            let label = labels[[ni as usize, nj as usize]];
            if label > 0 && !seen[..n_seen].contains(&label) {
                seen[n_seen] = label;
                n_seen += 1;
                accumulators[(label - 1) as usize].perimeter += 1;
            }
        }
    }

    let transform = boundary.geo_transform();
    let regions: Vec<Region> = accumulators
        .iter()
        .enumerate()
        .map(|(index, acc)| {
            let area = acc.area;
            let centroid = (acc.sum_row / area as f64, acc.sum_col / area as f64);
            let compactness = if acc.perimeter == 0 {
                0.0
            } else {
                (4.0 * PI * area as f64 / (acc.perimeter as f64).powi(2)).min(1.0)
            };
            let enclosed = !acc.touches_edge;
            Region {
                label: (index + 1) as u32,
                area,
                bounds: acc.bounds,
                centroid,
                geo_centroid: transform.pixel_to_geo(centroid.0, centroid.1),
                perimeter: acc.perimeter,
                compactness,
                enclosed,
                candidate: params.accepts(area, compactness, enclosed),
            }
        })
        .collect();

    let candidates = regions.iter().filter(|r| r.candidate).count();
    if regions.is_empty() {
        log::warn!("No background regions found");
    }
    log::info!("Labeled {} regions, {} candidates", regions.len(), candidates);

    Ok(Extraction {
        regions,
        labels: boundary.derive(labels, ValueUnit::Label),
    })
}

/// 8-connected flood fill of zero pixels. Labels are assigned in row-major
/// order of each component's first pixel.
fn label_background(mask: &Array2<u8>) -> (Array2<u32>, usize) {
    let (height, width) = mask.dim();
    let mut labels = Array2::<u32>::zeros((height, width));
    let mut next_label = 0u32;
    let mut stack = Vec::new();

    for i in 0..height {
        for j in 0..width {
            if mask[[i, j]] != 0 || labels[[i, j]] != 0 {
                continue;
            }
            next_label += 1;
            labels[[i, j]] = next_label;
            stack.push((i, j));

            while let Some((ci, cj)) = stack.pop() {
                for di in -1isize..=1 {
                    for dj in -1isize..=1 {
                        let ni = ci as isize + di;
                        let nj = cj as isize + dj;
                        if ni < 0 || nj < 0 || ni as usize >= height || nj as usize >= width {
                            continue;
                        }
                        let (ni, nj) = (ni as usize, nj as usize);
                        if mask[[ni, nj]] == 0 && labels[[ni, nj]] == 0 {
                            labels[[ni, nj]] = next_label;
                            stack.push((ni, nj));
                        }
                    }
                }
            }
        }
    }

    (labels, next_label as usize)
}

#[derive(Debug, Clone)]
struct RegionAccumulator {
    area: usize,
    sum_row: f64,
    sum_col: f64,
    bounds: PixelBounds,
    perimeter: usize,
    touches_edge: bool,
}

impl Default for RegionAccumulator {
    fn default() -> Self {
        Self {
            area: 0,
            sum_row: 0.0,
            sum_col: 0.0,
            bounds: PixelBounds {
                min_row: usize::MAX,
                min_col: usize::MAX,
                max_row: 0,
                max_col: 0,
            },
            perimeter: 0,
            touches_edge: false,
        }
    }
}

impl RegionAccumulator {
    fn add(&mut self, i: usize, j: usize, height: usize, width: usize) {
        self.area += 1;
        self.sum_row += i as f64;
        self.sum_col += j as f64;
        self.bounds.min_row = self.bounds.min_row.min(i);
        self.bounds.min_col = self.bounds.min_col.min(j);
        self.bounds.max_row = self.bounds.max_row.max(i);
        self.bounds.max_col = self.bounds.max_col.max(j);
        if i == 0 || j == 0 || i + 1 == height || j + 1 == width {
            self.touches_edge = true;
        }
    }
}
