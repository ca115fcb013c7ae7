/// Return numbers and return counts are divided by this value
pub const RETURN_NUM_NORMALIZATION_MAX: f32 = 7.0;

/// Colour range of French LiDAR HD tiles (16 bit colours stored as 8 bit * 256)
pub const FR_COLOUR_NORMALIZATION_MAX: f32 = 255.0 * 256.0;

/// Colour range of SwissTopo tiles
pub const CH_COLOUR_NORMALIZATION_MAX: f32 = 256.0;

/// Added to NDVI denominators to avoid division by zero
pub const NDVI_EPSILON: f32 = 1e-6;
