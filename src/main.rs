use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use surface_sampler::config::ReferenceRasterPaths;
use surface_sampler::{Pipeline, PipelineConfig, RunSummary};

/// Sample elevation, slope and scene rasters on a fixed grid, one CSV per scene
#[derive(Debug, Parser)]
#[command(name = "surface-sampler", version, about)]
struct Args {
    /// TOML configuration file; missing keys use built-in defaults
    #[arg(short, long, env = "SURFACE_SAMPLER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory containing the P<path>R<row>_<YYYYDDD> scene directories
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Root of the p<path>_r<row> metadata archive tree
    #[arg(long)]
    archive_root: Option<PathBuf>,

    /// Directory holding the elevation, slope and aspect mosaics
    #[arg(long)]
    reference_dir: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(dir) = &args.base_dir {
        config.base_directory = dir.clone();
    }
    if let Some(dir) = &args.archive_root {
        config.archive_root = dir.clone();
    }
    if let Some(dir) = &args.reference_dir {
        config.reference_rasters = ReferenceRasterPaths::in_directory(dir);
    }
    Ok(config)
}

/// Run-fatal errors are logged here before they are returned
fn initialise(config: PipelineConfig) -> Result<Pipeline> {
    let pipeline = Pipeline::new(config).map_err(|e| {
        log::error!("❌ Cannot initialise pipeline: {}", e);
        e
    });
    pipeline.context("initialising pipeline")
}

fn run(pipeline: &Pipeline) -> Result<RunSummary> {
    let summary = pipeline.run().map_err(|e| {
        log::error!("❌ Sampling run aborted: {}", e);
        e
    });
    summary.context("sampling run aborted")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args).map_err(|e| {
        log::error!("❌ {:#}", e);
        e
    })?;
    log::debug!("Configuration: {:?}", config);

    let pipeline = initialise(config)?;
    let summary = run(&pipeline)?;

    for outcome in summary.skipped() {
        log::warn!(
            "Skipped {}: {}",
            outcome.scene.id,
            outcome.diagnostic.as_deref().unwrap_or("unknown failure")
        );
    }
    log::info!(
        "✅ {} tables written, {} scenes skipped",
        summary.persisted().count(),
        summary.skipped().count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    struct CapturingLogger;

    fn captured() -> &'static Mutex<Vec<(log::Level, String)>> {
        static RECORDS: OnceLock<Mutex<Vec<(log::Level, String)>>> = OnceLock::new();
        RECORDS.get_or_init(|| Mutex::new(Vec::new()))
    }

    impl log::Log for CapturingLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            captured()
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    fn install_logger() {
        static LOGGER: CapturingLogger = CapturingLogger;
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);
    }

    fn logged_error_containing(text: &str) -> bool {
        captured()
            .lock()
            .unwrap()
            .iter()
            .any(|(level, message)| *level == log::Level::Error && message.contains(text))
    }

    #[test]
    fn test_initialisation_failure_is_logged() {
        install_logger();
        let dir = tempfile::TempDir::new().unwrap();
        let config = PipelineConfig {
            base_directory: dir.path().to_path_buf(),
            reporting_crs: "EPSG:999999".to_string(),
            ..PipelineConfig::default()
        };

        let err = initialise(config).err().expect("invalid CRS accepted");
        assert!(format!("{:#}", err).contains("initialising pipeline"));
        assert!(logged_error_containing("Cannot initialise pipeline"));
        assert!(logged_error_containing("Configuration error"));
    }

    #[test]
    fn test_missing_reference_rasters_are_logged() {
        install_logger();
        let dir = tempfile::TempDir::new().unwrap();
        let config = PipelineConfig {
            base_directory: dir.path().join("absent"),
            ..PipelineConfig::default()
        };

        assert!(initialise(config).is_err());
        assert!(logged_error_containing("Cannot initialise pipeline"));
    }

    fn write_reference(path: &std::path::Path) {
        use gdal::{raster::Buffer, spatial_ref::SpatialRef, DriverManager};
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut dataset = driver.create_with_band_type::<f32, _>(path, 4, 4, 1).unwrap();
        dataset
            .set_geo_transform(&[-2_500_000.0, 10_000.0, 0.0, 500_000.0, 0.0, -10_000.0])
            .unwrap();
        dataset.set_spatial_ref(&SpatialRef::from_epsg(3031).unwrap()).unwrap();
        let mut band = dataset.rasterband(1).unwrap();
        band.write((0, 0), (4, 4), &Buffer::new((4, 4), vec![1.0f32; 16])).unwrap();
    }

    #[test]
    fn test_scan_failure_is_logged() {
        install_logger();
        let dir = tempfile::TempDir::new().unwrap();
        let references = ReferenceRasterPaths::in_directory(dir.path());
        for path in [&references.elevation, &references.slope_magnitude, &references.slope_direction] {
            write_reference(path);
        }
        let base = dir.path().join("scenes");
        std::fs::create_dir(&base).unwrap();

        let config = PipelineConfig {
            base_directory: base.clone(),
            reference_rasters: references,
            ..PipelineConfig::default()
        };
        let pipeline = initialise(config).unwrap();
        std::fs::remove_dir(&base).unwrap();

        let err = run(&pipeline).unwrap_err();
        assert!(format!("{:#}", err).contains("Cannot scan"));
        assert!(logged_error_containing("Sampling run aborted"));
    }

    #[test]
    fn test_cli_overrides_reference_directory() {
        let args = Args::parse_from(["surface-sampler", "--base-dir", "/data", "--reference-dir", "/dem"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.base_directory, PathBuf::from("/data"));
        assert!(config.reference_rasters.elevation.starts_with("/dem"));
    }
}
