use crate::types::{GeoPoint, ProjectedPoint, SamplingError, SamplingResult};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::Dataset;

/// A spatial reference system pinned to traditional GIS axis order
/// (x = easting/longitude, y = northing/latitude).
pub struct CoordinateReferenceSystem {
    identifier: String,
    srs: SpatialRef,
}

impl CoordinateReferenceSystem {
    /// Build from any definition GDAL understands (`EPSG:4326`, WKT, PROJ string)
    pub fn from_definition(definition: &str) -> SamplingResult<Self> {
        let srs = SpatialRef::from_definition(definition).map_err(|e| {
            SamplingError::Configuration(format!(
                "Invalid CRS definition '{}': {}",
                definition, e
            ))
        })?;
        Ok(Self::from_spatial_ref(srs, definition.to_string()))
    }

    /// The CRS a raster's pixel geometry is defined in
    pub fn from_dataset(dataset: &Dataset) -> SamplingResult<Self> {
        let srs = dataset.spatial_ref().map_err(|e| {
            SamplingError::Configuration(format!("Raster has no usable spatial reference: {}", e))
        })?;
        let identifier = match (srs.auth_name(), srs.auth_code()) {
            (Ok(name), Ok(code)) => format!("{}:{}", name, code),
            _ => "raster-native".to_string(),
        };
        Ok(Self::from_spatial_ref(srs, identifier))
    }

    fn from_spatial_ref(srs: SpatialRef, identifier: String) -> Self {
        srs.set_axis_mapping_strategy(
            gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER,
        );
        Self { identifier, srs }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn spatial_ref(&self) -> &SpatialRef {
        &self.srs
    }
}

impl std::fmt::Debug for CoordinateReferenceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateReferenceSystem")
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// Reusable transform between a geographic reporting CRS and a native projected CRS.
///
/// `forward` goes geographic -> native, `inverse` goes native -> geographic.
/// Both sides use traditional GIS axis order, so coordinates are always
/// passed as (x/longitude, y/latitude).
pub struct CrsTransformer {
    forward: CoordTransform,
    inverse: CoordTransform,
    source: String,
    target: String,
}

impl CrsTransformer {
    pub fn new(
        source: &CoordinateReferenceSystem,
        target: &CoordinateReferenceSystem,
    ) -> SamplingResult<Self> {
        let build = |from: &CoordinateReferenceSystem, to: &CoordinateReferenceSystem| {
            CoordTransform::new(from.spatial_ref(), to.spatial_ref()).map_err(|e| {
                SamplingError::Configuration(format!(
                    "Cannot transform {} -> {}: {}",
                    from.identifier(),
                    to.identifier(),
                    e
                ))
            })
        };

        log::debug!(
            "Building transform {} <-> {}",
            source.identifier(),
            target.identifier()
        );
        Ok(Self {
            forward: build(source, target)?,
            inverse: build(target, source)?,
            source: source.identifier().to_string(),
            target: target.identifier().to_string(),
        })
    }

    fn transform_in_place(
        transform: &CoordTransform,
        xs: &mut [f64],
        ys: &mut [f64],
    ) -> SamplingResult<()> {
        if xs.len() != ys.len() {
            return Err(SamplingError::Configuration(format!(
                "Coordinate arrays differ in length: {} vs {}",
                xs.len(),
                ys.len()
            )));
        }
        if xs.is_empty() {
            return Ok(());
        }
        let mut zs = vec![0.0; xs.len()];
        transform.transform_coords(xs, ys, &mut zs)?;
        Ok(())
    }

    /// Batched geographic -> native transform, in place
    pub fn forward_batch(&self, xs: &mut [f64], ys: &mut [f64]) -> SamplingResult<()> {
        Self::transform_in_place(&self.forward, xs, ys)
    }

    /// Batched native -> geographic transform, in place
    pub fn inverse_batch(&self, xs: &mut [f64], ys: &mut [f64]) -> SamplingResult<()> {
        Self::transform_in_place(&self.inverse, xs, ys)
    }

    pub fn forward(&self, lon: f64, lat: f64) -> SamplingResult<ProjectedPoint> {
        let (mut xs, mut ys) = ([lon], [lat]);
        self.forward_batch(&mut xs, &mut ys)?;
        Ok(ProjectedPoint { x: xs[0], y: ys[0] })
    }

    pub fn inverse(&self, x: f64, y: f64) -> SamplingResult<GeoPoint> {
        let (mut xs, mut ys) = ([x], [y]);
        self.inverse_batch(&mut xs, &mut ys)?;
        Ok(GeoPoint { lon: xs[0], lat: ys[0] })
    }

    pub fn source_identifier(&self) -> &str {
        &self.source
    }

    pub fn target_identifier(&self) -> &str {
        &self.target
    }
}
