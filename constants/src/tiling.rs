//! Shared defaults for tiling, sampling and batching

/// Side length of a square subtile (meters)
pub const SUBTILE_WIDTH_METERS: f64 = 50.0;

/// Overlap between neighbouring inference subtiles (meters)
pub const SUBTILE_OVERLAP_METERS: f64 = 0.0;

/// Nominal side length of a source tile (meters), bounds the band split
pub const INPUT_TILE_WIDTH_METERS: f64 = 1000.0;

/// Number of points each subtile is sampled to
pub const SUBSAMPLE_SIZE: usize = 12_500;

/// Subtiles with fewer points than this are dropped
pub const MIN_POINTS_PER_SUBTILE: usize = 50;

/// Voxel edge length for grid sampling (meters)
pub const VOXEL_SIZE: f64 = 0.25;

/// Subtiles per batch
pub const BATCH_SIZE: usize = 32;

/// Keeps normalized x and y strictly inside (-1, 1)
pub const XY_SCALE_MARGIN: f64 = 1e-6;

/// Standardized channels are clamped to this many standard deviations
pub const CLAMP_SIGMA: f32 = 3.0;

/// Added to standard deviations before division
pub const STD_EPSILON: f32 = 1e-6;
