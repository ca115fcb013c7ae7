//! Spatial tiling, subsampling and prediction interpolation for LiDAR tiles.
//!
//! Preparation cuts source tiles into persisted subtiles. Inference cuts a
//! tile into an overlapping grid, runs a [`SegmentationModel`] over batches
//! of subsampled subtiles and interpolates its outputs back onto every
//! source point.
pub mod bounds;
pub mod collate;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod inference;
pub mod interpolate;
pub mod labels;
pub mod laz;
pub mod normalize;
pub mod sampler;
pub mod splitter;
pub mod tile;
pub mod transform;

pub use collate::{Batch, Batcher, collate};
pub use config::{ClassEntry, LidarOrigin, OverlapPolicy, SubsamplerKind, TilingConfig};
pub use error::{Result, TilingError};
pub use inference::{SegmentationModel, TileLayout, inspect_layout, predict_tile, run_inference};
pub use interpolate::{Interpolator, InterpolatorState, TilePredictions};
pub use labels::LabelMapper;
pub use sampler::Subsampler;
pub use splitter::TileSplitter;
pub use tile::{Subtile, Tile};
pub use transform::{Phase, SubtileTransform};
