use crate::types::{BoundingBox, GeoTransform, SamplingError, SamplingResult};
use gdal::raster::GdalDataType;
use gdal::Dataset;
#[cfg(test)]
use gdal::{raster::Buffer, spatial_ref::SpatialRef, DriverManager};
use std::path::{Path, PathBuf};

/// Single-band raster opened for point reads.
///
/// The GDAL handle is closed when the value is dropped, so a dataset opened
/// inside a scene's scope is released on every exit path.
pub struct RasterDataset {
    path: PathBuf,
    dataset: Dataset,
    geo_transform: GeoTransform,
    width: usize,
    height: usize,
    bounds: BoundingBox,
    float32: bool,
}

impl RasterDataset {
    /// Open a raster; absence or an unreadable file is a `MissingInput`
    pub fn open<P: AsRef<Path>>(path: P) -> SamplingResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(SamplingError::MissingInput(format!(
                "Raster not found: {}",
                path.display()
            )));
        }

        let dataset = Dataset::open(&path).map_err(|e| {
            SamplingError::MissingInput(format!("Cannot open raster {}: {}", path.display(), e))
        })?;
        if dataset.raster_count() < 1 {
            return Err(SamplingError::MissingInput(format!(
                "Raster has no bands: {}",
                path.display()
            )));
        }

        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();
        let bounds = geo_transform.bounds(width, height);
        let float32 = dataset.rasterband(1)?.band_type() == GdalDataType::Float32;

        log::debug!(
            "Opened raster {} ({}x{}), bounds {:?}",
            path.display(),
            width,
            height,
            bounds
        );

        Ok(Self {
            path,
            dataset,
            geo_transform,
            width,
            height,
            bounds,
            float32,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    /// (width, height) in pixels
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// (left, bottom, right, top) in native CRS units
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn pixel_index(&self, x: f64, y: f64) -> SamplingResult<(i64, i64)> {
        self.geo_transform.pixel_index(x, y)
    }

    fn in_grid(&self, row: i64, col: i64) -> bool {
        row >= 0 && col >= 0 && (row as u64) < self.height as u64 && (col as u64) < self.width as u64
    }

    /// Read one pixel of band 1. An index outside the pixel grid yields `None`.
    pub fn read_pixel(&self, row: i64, col: i64) -> SamplingResult<Option<f64>> {
        if !self.in_grid(row, col) {
            log::trace!(
                "Pixel ({}, {}) outside {}x{} grid of {}",
                row,
                col,
                self.width,
                self.height,
                self.path.display()
            );
            return Ok(None);
        }

        let band = self.dataset.rasterband(1)?;
        let window = (col as isize, row as isize);
        if self.float32 {
            let buffer = band.read_as::<f32>(window, (1, 1), (1, 1), None)?;
            Ok(buffer.data.first().map(|&v| widen_f32(v)))
        } else {
            let buffer = band.read_as::<f64>(window, (1, 1), (1, 1), None)?;
            Ok(buffer.data.first().copied())
        }
    }

    /// Nearest-pixel value at a native coordinate
    pub fn sample(&self, x: f64, y: f64) -> SamplingResult<Option<f64>> {
        let (row, col) = self.pixel_index(x, y)?;
        self.read_pixel(row, col)
    }
}

/// Widen through the shortest decimal form, so a stored 0.8 stays 0.8
fn widen_f32(value: f32) -> f64 {
    if value.is_finite() {
        value.to_string().parse().unwrap_or(value as f64)
    } else {
        value as f64
    }
}

impl std::fmt::Debug for RasterDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterDataset")
            .field("path", &self.path)
            .field("size", &(self.width, self.height))
            .field("bounds", &self.bounds)
            .finish()
    }
}

/// Write a single-band Float32 GeoTIFF. `data` is row-major, `width * height` long.
#[cfg(test)]
pub(crate) fn write_single_band_geotiff<P: AsRef<Path>>(
    path: P,
    geo_transform: &GeoTransform,
    width: usize,
    height: usize,
    data: Vec<f32>,
    srs: &SpatialRef,
) -> SamplingResult<()> {
    if data.len() != width * height {
        return Err(SamplingError::Persistence(format!(
            "Raster data has {} values, expected {}x{}",
            data.len(),
            width,
            height
        )));
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<f32, _>(
        path.as_ref(),
        width as isize,
        height as isize,
        1,
    )?;
    dataset.set_geo_transform(&geo_transform.to_gdal())?;
    dataset.set_spatial_ref(srs)?;

    let mut band = dataset.rasterband(1)?;
    let buffer = Buffer::new((width, height), data);
    band.write((0, 0), (width, height), &buffer)?;
    Ok(())
}
