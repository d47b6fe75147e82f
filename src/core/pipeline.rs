//! Scene-by-scene driver: resolve metadata, sample, persist.
//!
//! Each scene moves `Discovered -> MetadataResolved -> Sampled -> Persisted`,
//! or drops to `Skipped` at the first failing stage. Only configuration errors
//! abort the run.

use crate::config::PipelineConfig;
use crate::core::crs::{CoordinateReferenceSystem, CrsTransformer};
use crate::core::grid::{ProjectedGrid, SamplingGrid};
use crate::core::sampler::{MultiRasterSampler, ReferenceRasters, SceneRasters};
use crate::io::metadata::{ArchiveMetadataLookup, SceneMetadataLookup};
use crate::io::scene::{Scene, SceneDiscovery};
use crate::io::table::ResultTableWriter;
use crate::types::{SamplingError, SamplingResult};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Discovered,
    MetadataResolved,
    Sampled,
    Persisted,
    Skipped,
}

impl std::fmt::Display for SceneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SceneState::Discovered => "discovered",
            SceneState::MetadataResolved => "metadata resolved",
            SceneState::Sampled => "sampled",
            SceneState::Persisted => "persisted",
            SceneState::Skipped => "skipped",
        };
        write!(f, "{}", name)
    }
}

/// Terminal state of one scene
#[derive(Debug, Clone)]
pub struct SceneOutcome {
    pub scene: Scene,
    pub state: SceneState,
    /// Table path when persisted
    pub output: Option<PathBuf>,
    /// Stage reached before skipping, with the reason
    pub diagnostic: Option<String>,
    pub rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<SceneOutcome>,
}

impl RunSummary {
    pub fn persisted(&self) -> impl Iterator<Item = &SceneOutcome> {
        self.outcomes.iter().filter(|o| o.state == SceneState::Persisted)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SceneOutcome> {
        self.outcomes.iter().filter(|o| o.state == SceneState::Skipped)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    transformer: CrsTransformer,
    references: ReferenceRasters,
    grid: SamplingGrid,
    projected: ProjectedGrid,
    metadata: Box<dyn SceneMetadataLookup>,
    writer: ResultTableWriter,
}

impl Pipeline {
    /// Pipeline reading scene metadata from archives under `config.archive_root`
    pub fn new(config: PipelineConfig) -> SamplingResult<Self> {
        let lookup = ArchiveMetadataLookup::new(
            config.archive_root.clone(),
            config.archive_template.clone(),
            config.metadata_member_template.clone(),
            config.metadata_key.clone(),
        );
        Self::with_metadata_lookup(config, Box::new(lookup))
    }

    /// Validates the configuration, opens the reference rasters and projects the
    /// sampling grid into their CRS. Any failure here is fatal for the run.
    pub fn with_metadata_lookup(
        config: PipelineConfig,
        metadata: Box<dyn SceneMetadataLookup>,
    ) -> SamplingResult<Self> {
        config.validate()?;

        let reporting = CoordinateReferenceSystem::from_definition(&config.reporting_crs)?;
        let references = ReferenceRasters::open(&config.reference_rasters, &config.base_directory)
            .map_err(|e| SamplingError::Configuration(format!("Reference rasters unavailable: {}", e)))?;
        let native = CoordinateReferenceSystem::from_dataset(references.elevation.dataset())?;
        let transformer = CrsTransformer::new(&reporting, &native)?;

        let grid = SamplingGrid::generate(&config.longitudes, &config.latitudes)?;
        let projected = grid.project(&transformer)?;
        log::info!(
            "Sampling grid of {} points projected {} -> {}",
            grid.len(),
            transformer.source_identifier(),
            transformer.target_identifier()
        );

        let writer = ResultTableWriter::new(config.coordinate_precision);
        Ok(Self {
            config,
            transformer,
            references,
            grid,
            projected,
            metadata,
            writer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn grid(&self) -> &SamplingGrid {
        &self.grid
    }

    pub fn projected_grid(&self) -> &ProjectedGrid {
        &self.projected
    }

    /// Discover and process every scene in order
    pub fn run(&self) -> SamplingResult<RunSummary> {
        let scenes = SceneDiscovery::discover(&self.config.base_directory).map_err(|e| {
            SamplingError::Configuration(format!(
                "Cannot scan {}: {}",
                self.config.base_directory.display(),
                e
            ))
        })?;

        let mut summary = RunSummary::default();
        for scene in scenes {
            let outcome = self.process_scene(&scene)?;
            summary.outcomes.push(outcome);
        }

        log::info!(
            "Run finished: {} persisted, {} skipped",
            summary.persisted().count(),
            summary.skipped().count()
        );
        Ok(summary)
    }

    /// Process one scene. Scene-level failures become a `Skipped` outcome;
    /// only a run-fatal error is returned as `Err`.
    pub fn process_scene(&self, scene: &Scene) -> SamplingResult<SceneOutcome> {
        let mut state = SceneState::Discovered;
        log::debug!("Scene {}: {}", scene.id, state);

        match self.try_process(scene, &mut state) {
            Ok((output, rows)) => Ok(SceneOutcome {
                scene: scene.clone(),
                state: SceneState::Persisted,
                output: Some(output),
                diagnostic: None,
                rows,
            }),
            Err(e) if e.is_fatal_for_run() => {
                log::error!("Scene {}: aborting run: {}", scene.id, e);
                Err(e)
            }
            Err(e) => {
                let diagnostic = format!("failed after '{}': {}", state, e);
                match e {
                    SamplingError::Persistence(_) => {
                        log::error!("Scene {} skipped, {}", scene.id, diagnostic)
                    }
                    _ => log::warn!("Scene {} skipped, {}", scene.id, diagnostic),
                }
                Ok(SceneOutcome {
                    scene: scene.clone(),
                    state: SceneState::Skipped,
                    output: None,
                    diagnostic: Some(diagnostic),
                    rows: 0,
                })
            }
        }
    }

    fn advance(scene: &Scene, state: &mut SceneState, next: SceneState) {
        *state = next;
        log::debug!("Scene {}: {}", scene.id, next);
    }

    fn try_process(&self, scene: &Scene, state: &mut SceneState) -> SamplingResult<(PathBuf, usize)> {
        let attribute = self.metadata.lookup(&scene.id)?;
        Self::advance(scene, state, SceneState::MetadataResolved);

        let records = {
            let filtered = scene
                .directory
                .join(self.config.filtered_image_template.render(&scene.id)?);
            let correlation = scene
                .directory
                .join(self.config.correlation_image_template.render(&scene.id)?);
            let rasters = SceneRasters::open(filtered, correlation)?;

            let sampler = MultiRasterSampler::new(
                &self.transformer,
                &self.references,
                self.config.coordinate_precision,
            );
            sampler.sample_scene(&self.projected, &rasters, attribute)?
        };
        Self::advance(scene, state, SceneState::Sampled);

        let output = scene
            .directory
            .join(self.config.output_template.render(&scene.id)?);
        self.writer.write(&output, &records)?;
        Self::advance(scene, state, SceneState::Persisted);

        Ok((output, records.len()))
    }
}
