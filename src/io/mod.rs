//! Raster, archive, directory and table I/O

pub mod raster;
pub mod scene;
pub mod metadata;
pub mod table;

pub use raster::RasterDataset;
pub use scene::{Scene, SceneDiscovery};
pub use metadata::{ArchiveMetadataLookup, SceneMetadataLookup};
pub use table::ResultTableWriter;
