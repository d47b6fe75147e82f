//! Core sampling modules

pub mod crs;
pub mod grid;
pub mod bounds;
pub mod sampler;
pub mod pipeline;

// Re-export main types
pub use crs::{CoordinateReferenceSystem, CrsTransformer};
pub use grid::{SamplingGrid, ProjectedGrid};
pub use bounds::BoundsFilter;
pub use sampler::{MultiRasterSampler, ReferenceRasters, SceneRasters, round_to};
pub use pipeline::{Pipeline, RunSummary, SceneOutcome, SceneState};
