//! Fixed longitude/latitude sampling lattice and its native-CRS projection

use crate::config::GridRange;
use crate::core::crs::CrsTransformer;
use crate::types::{GeoPoint, ProjectedPoint, SamplingError, SamplingResult};
use ndarray::{Array1, Array2};

/// Row-major lon/lat lattice: for each latitude, every longitude in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingGrid {
    points: Vec<GeoPoint>,
    shape: (usize, usize),
}

impl SamplingGrid {
    pub fn generate(longitudes: &GridRange, latitudes: &GridRange) -> SamplingResult<Self> {
        longitudes.validate("Longitude")?;
        latitudes.validate("Latitude")?;

        let lons = Array1::from(longitudes.values());
        let lats = Array1::from(latitudes.values());
        if lons.is_empty() || lats.is_empty() {
            return Err(SamplingError::Configuration(format!(
                "Sampling grid is empty ({} longitudes x {} latitudes)",
                lons.len(),
                lats.len()
            )));
        }

        // Same layout as a 2-D meshgrid: rows follow latitude, columns longitude
        let shape = (lats.len(), lons.len());
        let lon_mesh = Array2::from_shape_fn(shape, |(_, j)| lons[j]);
        let lat_mesh = Array2::from_shape_fn(shape, |(i, _)| lats[i]);

        let points = lon_mesh
            .iter()
            .zip(lat_mesh.iter())
            .map(|(&lon, &lat)| GeoPoint { lon, lat })
            .collect();

        log::debug!("Generated {}x{} sampling grid", shape.0, shape.1);
        Ok(Self { points, shape })
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    /// (latitudes, longitudes)
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Project every grid point into the native CRS, order preserved
    pub fn project(&self, transformer: &CrsTransformer) -> SamplingResult<ProjectedGrid> {
        let mut xs: Vec<f64> = self.points.iter().map(|p| p.lon).collect();
        let mut ys: Vec<f64> = self.points.iter().map(|p| p.lat).collect();
        transformer.forward_batch(&mut xs, &mut ys)?;

        let points = xs
            .into_iter()
            .zip(ys)
            .map(|(x, y)| ProjectedPoint { x, y })
            .collect();
        Ok(ProjectedGrid::new(points))
    }
}

/// Sampling grid expressed in the rasters' native CRS
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedGrid {
    points: Vec<ProjectedPoint>,
}

impl ProjectedGrid {
    pub fn new(points: Vec<ProjectedPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[ProjectedPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
