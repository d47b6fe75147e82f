use crate::types::{SamplingError, SamplingResult, SceneId};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default reference raster file names, relative to the reference directory
pub const DEFAULT_ELEVATION_RASTER: &str = "rema_62.5m_mosaic.tif";
pub const DEFAULT_SLOPE_MAGNITUDE_RASTER: &str = "rema_62.5m_mosaic_slope.tif";
pub const DEFAULT_SLOPE_DIRECTION_RASTER: &str = "rema_62.5m_mosaic_slope_aspect.tif";
pub const DEFAULT_REFERENCE_DIRECTORY: &str = "REMA_elev+slope";

/// Half-open numeric range with `numpy.arange` semantics (step may be negative)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GridRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl GridRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    pub fn validate(&self, name: &str) -> SamplingResult<()> {
        if !(self.start.is_finite() && self.stop.is_finite() && self.step.is_finite()) {
            return Err(SamplingError::Configuration(format!(
                "{} range must be finite: {:?}",
                name, self
            )));
        }
        if self.step == 0.0 {
            return Err(SamplingError::Configuration(format!(
                "{} range step must be non-zero",
                name
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        let n = ((self.stop - self.start) / self.step).ceil();
        if n.is_finite() && n > 0.0 {
            n as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialise the range; values are `start + i * step` to avoid drift
    pub fn values(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.start + i as f64 * self.step)
            .collect()
    }
}

/// File-name template with `{path}`, `{row}`, `{doy_date}`, `{ymd_date}` placeholders.
///
/// Templates that locate archives may also carry `*` / `?` wildcards.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct FilenameTemplate(String);

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

impl FilenameTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_wildcards(&self) -> bool {
        self.0.contains(['*', '?'])
    }

    fn segments(&self) -> SamplingResult<Vec<Segment<'_>>> {
        let template = self.0.as_str();
        if template.is_empty() {
            return Err(SamplingError::Configuration(
                "Filename template is empty".to_string(),
            ));
        }

        let mut segments = Vec::new();
        let mut rest = template;
        while !rest.is_empty() {
            match rest.find(['{', '}']) {
                None => {
                    segments.push(Segment::Literal(rest));
                    rest = "";
                }
                Some(i) if rest.as_bytes()[i] == b'}' => {
                    return Err(SamplingError::Configuration(format!(
                        "Unbalanced '}}' in filename template '{}'",
                        template
                    )));
                }
                Some(i) => {
                    if i > 0 {
                        segments.push(Segment::Literal(&rest[..i]));
                    }
                    let after = &rest[i + 1..];
                    let close = after.find('}').ok_or_else(|| {
                        SamplingError::Configuration(format!(
                            "Unbalanced '{{' in filename template '{}'",
                            template
                        ))
                    })?;
                    let name = &after[..close];
                    if !matches!(name, "path" | "row" | "doy_date" | "ymd_date") {
                        return Err(SamplingError::Configuration(format!(
                            "Unknown placeholder '{{{}}}' in filename template '{}'",
                            name, template
                        )));
                    }
                    segments.push(Segment::Placeholder(name));
                    rest = &after[close + 1..];
                }
            }
        }
        Ok(segments)
    }

    /// Check syntax; `allow_wildcards` gates `*` / `?`
    pub fn validate(&self, allow_wildcards: bool) -> SamplingResult<()> {
        self.segments()?;
        if !allow_wildcards && self.has_wildcards() {
            return Err(SamplingError::Configuration(format!(
                "Wildcards are not allowed in filename template '{}'",
                self.0
            )));
        }
        Ok(())
    }

    fn placeholder_value(name: &str, scene: &SceneId) -> String {
        match name {
            "path" => scene.path.clone(),
            "row" => scene.row.clone(),
            "doy_date" => scene.doy_date.clone(),
            _ => scene.ymd_date(),
        }
    }

    /// Substitute the scene's tokens; wildcards are left untouched
    pub fn render(&self, scene: &SceneId) -> SamplingResult<String> {
        let mut out = String::with_capacity(self.0.len());
        for segment in self.segments()? {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => out.push_str(&Self::placeholder_value(name, scene)),
            }
        }
        Ok(out)
    }

    /// Anchored regex for a single rendered name (no directory separators)
    pub fn name_pattern(name: &str) -> SamplingResult<Regex> {
        let mut pattern = String::from("^");
        for c in name.chars() {
            match c {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');
        Regex::new(&pattern).map_err(|e| {
            SamplingError::Configuration(format!("Invalid name pattern '{}': {}", name, e))
        })
    }
}

/// The three rasters shared across every scene
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReferenceRasterPaths {
    pub elevation: PathBuf,
    pub slope_magnitude: PathBuf,
    pub slope_direction: PathBuf,
}

impl ReferenceRasterPaths {
    /// Default file names inside `dir`
    pub fn in_directory<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            elevation: dir.join(DEFAULT_ELEVATION_RASTER),
            slope_magnitude: dir.join(DEFAULT_SLOPE_MAGNITUDE_RASTER),
            slope_direction: dir.join(DEFAULT_SLOPE_DIRECTION_RASTER),
        }
    }
}

impl Default for ReferenceRasterPaths {
    fn default() -> Self {
        Self::in_directory(DEFAULT_REFERENCE_DIRECTORY)
    }
}

/// Nested key path to the scalar attribute in the scene metadata document
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct MetadataKeyPath(pub Vec<String>);

impl Default for MetadataKeyPath {
    fn default() -> Self {
        Self(
            ["LANDSAT_METADATA_FILE", "IMAGE_ATTRIBUTES", "SUN_ELEVATION"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

impl std::fmt::Display for MetadataKeyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Everything the pipeline needs, passed explicitly into `Pipeline::new`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory scanned for `...P<path>R<row>_<YYYYDDD>` scene directories
    pub base_directory: PathBuf,
    /// Root of the metadata archive tree
    pub archive_root: PathBuf,
    /// Relative paths are resolved against `base_directory`
    pub reference_rasters: ReferenceRasterPaths,
    pub longitudes: GridRange,
    pub latitudes: GridRange,
    pub reporting_crs: String,
    pub filtered_image_template: FilenameTemplate,
    pub correlation_image_template: FilenameTemplate,
    /// Relative to `archive_root`; wildcards allowed in the final component
    pub archive_template: FilenameTemplate,
    pub metadata_member_template: FilenameTemplate,
    /// Relative to the scene directory
    pub output_template: FilenameTemplate,
    pub metadata_key: MetadataKeyPath,
    pub coordinate_precision: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("."),
            archive_root: PathBuf::from("."),
            reference_rasters: ReferenceRasterPaths::default(),
            longitudes: GridRange::new(-85.0, -110.0, -0.5),
            latitudes: GridRange::new(-74.5, -79.5, -0.25),
            reporting_crs: "EPSG:4326".to_string(),
            filtered_image_template: FilenameTemplate::new("filtered_image_{doy_date}.TIF"),
            correlation_image_template: FilenameTemplate::new("correlation_image_{doy_date}.TIF"),
            archive_template: FilenameTemplate::new(
                "p{path}_r{row}/earthexplorer/LC08_L1GT_{path}{row}_{ymd_date}_*_02_T2.tar",
            ),
            metadata_member_template: FilenameTemplate::new(
                "LC08_L1GT_{path}{row}_{ymd_date}_*_02_T2_MTL.json",
            ),
            output_template: FilenameTemplate::new("P{path}R{row}_{doy_date}.csv"),
            metadata_key: MetadataKeyPath::default(),
            coordinate_precision: 2,
        }
    }
}

impl PipelineConfig {
    /// Load from TOML; absent keys keep their defaults
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> SamplingResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SamplingError::Configuration(format!(
                "Cannot read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> SamplingResult<Self> {
        toml::from_str(text)
            .map_err(|e| SamplingError::Configuration(format!("Invalid config: {}", e)))
    }

    /// Reject anything that would make every scene fail the same way
    pub fn validate(&self) -> SamplingResult<()> {
        self.longitudes.validate("Longitude")?;
        self.latitudes.validate("Latitude")?;

        self.filtered_image_template.validate(false)?;
        self.correlation_image_template.validate(false)?;
        self.output_template.validate(false)?;
        self.metadata_member_template.validate(true)?;
        self.archive_template.validate(true)?;

        let archive = self.archive_template.as_str();
        let dir_part = archive.rfind(['/', '\\']).map(|i| &archive[..i]).unwrap_or("");
        if dir_part.contains(['*', '?']) {
            return Err(SamplingError::Configuration(format!(
                "Wildcards are only allowed in the file name of archive template '{}'",
                archive
            )));
        }

        if self.metadata_key.0.is_empty() {
            return Err(SamplingError::Configuration(
                "Metadata key path is empty".to_string(),
            ));
        }
        if self.reporting_crs.trim().is_empty() {
            return Err(SamplingError::Configuration(
                "Reporting CRS definition is empty".to_string(),
            ));
        }
        Ok(())
    }
}
