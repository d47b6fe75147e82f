use crate::config::ReferenceRasterPaths;
use crate::core::bounds::BoundsFilter;
use crate::core::crs::CrsTransformer;
use crate::core::grid::ProjectedGrid;
use crate::io::raster::RasterDataset;
use crate::types::{SampleRecord, SamplingResult, MISSING_VALUE};
use std::path::Path;

/// Elevation, slope magnitude and slope direction; opened once per run
#[derive(Debug)]
pub struct ReferenceRasters {
    pub elevation: RasterDataset,
    pub slope_magnitude: RasterDataset,
    pub slope_direction: RasterDataset,
}

impl ReferenceRasters {
    pub fn open(paths: &ReferenceRasterPaths, base: &Path) -> SamplingResult<Self> {
        Ok(Self {
            elevation: RasterDataset::open(base.join(&paths.elevation))?,
            slope_magnitude: RasterDataset::open(base.join(&paths.slope_magnitude))?,
            slope_direction: RasterDataset::open(base.join(&paths.slope_direction))?,
        })
    }
}

/// The filtered image and correlation image of one scene
#[derive(Debug)]
pub struct SceneRasters {
    pub filtered: RasterDataset,
    pub correlation: RasterDataset,
}

impl SceneRasters {
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(filtered: P, correlation: Q) -> SamplingResult<Self> {
        Ok(Self {
            filtered: RasterDataset::open(filtered)?,
            correlation: RasterDataset::open(correlation)?,
        })
    }
}

/// Round half away from zero to `precision` decimals
pub fn round_to(value: f64, precision: usize) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Samples every raster at the points of a projected grid that fall inside
/// both scene rasters, and reports them back in the geographic CRS.
pub struct MultiRasterSampler<'a> {
    transformer: &'a CrsTransformer,
    references: &'a ReferenceRasters,
    coordinate_precision: usize,
}

impl<'a> MultiRasterSampler<'a> {
    pub fn new(
        transformer: &'a CrsTransformer,
        references: &'a ReferenceRasters,
        coordinate_precision: usize,
    ) -> Self {
        Self {
            transformer,
            references,
            coordinate_precision,
        }
    }

    /// Nearest-pixel values for one native point; unreadable pixels become NaN
    pub fn read_values(x: f64, y: f64, rasters: &[&RasterDataset]) -> SamplingResult<Vec<f64>> {
        rasters
            .iter()
            .map(|raster| Ok(raster.sample(x, y)?.unwrap_or(MISSING_VALUE)))
            .collect()
    }

    pub fn sample_scene(
        &self,
        grid: &ProjectedGrid,
        scene: &SceneRasters,
        attribute: f64,
    ) -> SamplingResult<Vec<SampleRecord>> {
        let bounds = [scene.filtered.bounds(), scene.correlation.bounds()];
        let rasters = [
            &scene.filtered,
            &scene.correlation,
            &self.references.elevation,
            &self.references.slope_magnitude,
            &self.references.slope_direction,
        ];

        let mut records = Vec::new();
        let mut missing = 0usize;
        for point in grid.points() {
            if !BoundsFilter::accepts(point.x, point.y, &bounds) {
                continue;
            }

            let values = Self::read_values(point.x, point.y, &rasters)?;
            missing += values.iter().filter(|v| v.is_nan()).count();

            let reported = self.transformer.inverse(point.x, point.y)?;
            records.push(SampleRecord {
                longitude: round_to(reported.lon, self.coordinate_precision),
                latitude: round_to(reported.lat, self.coordinate_precision),
                filtered_value: values[0],
                correlation_value: values[1],
                solar_elevation: attribute,
                elevation: values[2],
                slope_magnitude: values[3],
                slope_direction: values[4],
            });
        }

        log::debug!(
            "Accepted {} of {} grid points ({} missing samples)",
            records.len(),
            grid.len(),
            missing
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crs::CoordinateReferenceSystem;
    use crate::io::raster::write_single_band_geotiff;
    use crate::types::{GeoTransform, ProjectedPoint};
    use gdal::spatial_ref::SpatialRef;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        transformer: CrsTransformer,
        references: ReferenceRasters,
        scene_dir: PathBuf,
    }

    fn raster(dir: &Path, name: &str, gt: [f64; 6], size: (usize, usize), fill: f32) -> PathBuf {
        let path = dir.join(name);
        let srs = SpatialRef::from_epsg(3031).unwrap();
        let data = vec![fill; size.0 * size.1];
        write_single_band_geotiff(&path, &GeoTransform::from_gdal(gt), size.0, size.1, data, &srs)
            .unwrap();
        path
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        // 3000 km square around the pole at 10 km
        let wide = [-1_500_000.0, 10_000.0, 0.0, 1_500_000.0, 0.0, -10_000.0];
        raster(dir.path(), "elev.tif", wide, (300, 300), 1200.0);
        raster(dir.path(), "slope.tif", wide, (300, 300), 3.5);
        raster(dir.path(), "aspect.tif", wide, (300, 300), 90.0);
        let references = ReferenceRasters::open(
            &ReferenceRasterPaths {
                elevation: "elev.tif".into(),
                slope_magnitude: "slope.tif".into(),
                slope_direction: "aspect.tif".into(),
            },
            dir.path(),
        )
        .unwrap();

        let wgs84 = CoordinateReferenceSystem::from_definition("EPSG:4326").unwrap();
        let polar = CoordinateReferenceSystem::from_definition("EPSG:3031").unwrap();
        let transformer = CrsTransformer::new(&wgs84, &polar).unwrap();

        let scene_dir = dir.path().join("scene");
        std::fs::create_dir(&scene_dir).unwrap();
        Fixture {
            _dir: dir,
            transformer,
            references,
            scene_dir,
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(-85.12567, 2), -85.13);
        assert_eq!(round_to(-74.5, 2), -74.5);
        assert_eq!(round_to(1.23456, 0), 1.0);
    }

    #[test]
    fn test_only_points_in_both_scene_extents_are_kept() {
        let f = fixture();
        let grid = ProjectedGrid::new(vec![
            ProjectedPoint { x: -500_000.0, y: 500_000.0 },
            ProjectedPoint { x: 50_000.0, y: 50_000.0 },
            ProjectedPoint { x: 150_000.0, y: 50_000.0 },
            ProjectedPoint { x: 80_000.0, y: 80_000.0 },
        ]);

        // filtered covers [0, 200k] x [0, 100k]; correlation covers [0, 100k] x [0, 100k]
        let filtered = raster(&f.scene_dir, "filtered.tif", [0.0, 1000.0, 0.0, 100_000.0, 0.0, -1000.0], (200, 100), 7.0);
        let correlation = raster(&f.scene_dir, "corr.tif", [0.0, 1000.0, 0.0, 100_000.0, 0.0, -1000.0], (100, 100), 0.8);
        let scene = SceneRasters::open(filtered, correlation).unwrap();

        let sampler = MultiRasterSampler::new(&f.transformer, &f.references, 2);
        let records = sampler.sample_scene(&grid, &scene, 21.5).unwrap();

        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.filtered_value, 7.0);
            assert!((record.correlation_value - 0.8).abs() < 1e-6);
            assert_eq!(record.solar_elevation, 21.5);
            assert_eq!(record.elevation, 1200.0);
            assert_eq!(record.slope_magnitude, 3.5);
            assert_eq!(record.slope_direction, 90.0);
            assert_eq!(record.longitude, round_to(record.longitude, 2));
        }

        // (50 km, 50 km) lies on the 45E bearing from the pole
        let expected = f.transformer.inverse(50_000.0, 50_000.0).unwrap();
        assert_eq!(records[0].longitude, round_to(expected.lon, 2));
        assert_eq!(records[0].latitude, round_to(expected.lat, 2));
        assert_eq!(records[0].longitude, 45.0);
    }

    #[test]
    fn test_edge_point_is_kept_with_missing_value() {
        let f = fixture();
        // Exactly on the right edge of both scene rasters
        let grid = ProjectedGrid::new(vec![ProjectedPoint { x: 100_000.0, y: 50_000.0 }]);

        let filtered = raster(&f.scene_dir, "filtered.tif", [0.0, 1000.0, 0.0, 100_000.0, 0.0, -1000.0], (100, 100), 7.0);
        let correlation = raster(&f.scene_dir, "corr.tif", [0.0, 1000.0, 0.0, 100_000.0, 0.0, -1000.0], (100, 100), 0.8);
        let scene = SceneRasters::open(filtered, correlation).unwrap();

        let sampler = MultiRasterSampler::new(&f.transformer, &f.references, 2);
        let records = sampler.sample_scene(&grid, &scene, 30.0).unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].filtered_value.is_nan());
        assert!(records[0].correlation_value.is_nan());
        assert_eq!(records[0].elevation, 1200.0);
    }

    #[test]
    fn test_reference_reads_outside_coverage_are_missing() {
        let f = fixture();
        let far = RasterDataset::open(raster(&f.scene_dir, "far.tif", [5_000_000.0, 1000.0, 0.0, 5_000_000.0, 0.0, -1000.0], (10, 10), 1.0)).unwrap();
        let values = MultiRasterSampler::read_values(0.0, 0.0, &[&far, &f.references.elevation]).unwrap();
        assert!(values[0].is_nan());
        assert_eq!(values[1], 1200.0);
    }

    #[test]
    fn test_missing_scene_raster_fails_fast() {
        let f = fixture();
        let filtered = raster(&f.scene_dir, "filtered.tif", [0.0, 1000.0, 0.0, 100_000.0, 0.0, -1000.0], (10, 10), 7.0);
        let err = SceneRasters::open(filtered, f.scene_dir.join("absent.tif")).unwrap_err();
        assert!(!err.is_fatal_for_run());
    }
}
