//! surface-sampler: co-registered point sampling of raster stacks
//!
//! For every `...P<path>R<row>_<YYYYDDD>` scene directory, samples the scene's
//! filtered and correlation images together with shared elevation and slope
//! rasters on a fixed longitude/latitude grid, and writes one CSV table per scene.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, GeoPoint, GeoTransform, ProjectedPoint, SampleRecord, SamplingError,
    SamplingResult, SceneId, MISSING_VALUE,
};
pub use config::{FilenameTemplate, GridRange, PipelineConfig, ReferenceRasterPaths};
pub use io::{RasterDataset, ResultTableWriter, SceneDiscovery, SceneMetadataLookup};
pub use crate::core::{CrsTransformer, MultiRasterSampler, Pipeline, RunSummary, SceneState};
