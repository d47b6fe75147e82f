use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sentinel written in place of a sample that could not be read
pub const MISSING_VALUE: f64 = f64::NAN;

/// A (longitude, latitude) pair in the geographic reporting system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

/// An (x, y) pair in a raster's native projected system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

/// Raster extent in native CRS units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl BoundingBox {
    /// Closed-interval containment: edges count as inside
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.left <= x && x <= self.right && self.bottom <= y && y <= self.top
    }
}

/// Geospatial transformation parameters (GDAL affine order)
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
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Native coordinate of a (fractional) pixel position
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.top_left_x + col * self.pixel_width + row * self.rotation_x,
            self.top_left_y + col * self.rotation_y + row * self.pixel_height,
        )
    }

    /// Map a native coordinate to the integer (row, col) of the pixel containing it.
    ///
    /// Uses the inverse of the affine transform and floors both axes, so it is
    /// defined everywhere, including outside the raster; callers check the result
    /// against the raster size.
    pub fn pixel_index(&self, x: f64, y: f64) -> SamplingResult<(i64, i64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return Err(SamplingError::Configuration(format!(
                "Geotransform is not invertible: {:?}",
                self
            )));
        }

        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;

        Ok((row.floor() as i64, col.floor() as i64))
    }

    /// Extent of a `width` x `height` grid under this transform
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(w, 0.0),
            self.apply(0.0, h),
            self.apply(w, h),
        ];

        let mut bbox = BoundingBox {
            left: f64::INFINITY,
            bottom: f64::INFINITY,
            right: f64::NEG_INFINITY,
            top: f64::NEG_INFINITY,
        };
        for (x, y) in corners {
            bbox.left = bbox.left.min(x);
            bbox.right = bbox.right.max(x);
            bbox.bottom = bbox.bottom.min(y);
            bbox.top = bbox.top.max(y);
        }
        bbox
    }
}

/// Path/row/date identity of one scene directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId {
    pub path: String,
    pub row: String,
    /// Acquisition date as YYYYDDD (year + day of year)
    pub doy_date: String,
    pub date: NaiveDate,
}

impl SceneId {
    /// Acquisition date as YYYYMMDD
    pub fn ymd_date(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}R{}_{}", self.path, self.row, self.doy_date)
    }
}

/// One output row. Raster values are `MISSING_VALUE` when unreadable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    pub longitude: f64,
    pub latitude: f64,
    pub filtered_value: f64,
    pub correlation_value: f64,
    pub solar_elevation: f64,
    pub elevation: f64,
    pub slope_magnitude: f64,
    pub slope_direction: f64,
}

/// Error types for raster sampling
#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl SamplingError {
    /// Only configuration problems abort the whole run; everything else skips a scene.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, SamplingError::Configuration(_))
    }
}

/// Result type for sampling operations
pub type SamplingResult<T> = Result<T, SamplingError>;
