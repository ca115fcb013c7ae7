//! Per-source feature schemas turning raw LiDAR fields into feature vectors.
use crate::config::LidarOrigin;
use crate::error::{Result, TilingError};
use crate::tile::Tile;
use constants::channel::{
    BLUE, GREEN, INTENSITY, NDVI, NIR, NUM_RETURNS, RED, RETURN_NUM, RGB_AVG,
};
use constants::lidar::{
    CH_COLOUR_NORMALIZATION_MAX, FR_COLOUR_NORMALIZATION_MAX, NDVI_EPSILON,
    RETURN_NUM_NORMALIZATION_MAX,
};

/// Raw per-point fields as read from the point cloud container.
/// Absent colour or NIR channels read as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u16,
    pub return_number: u8,
    pub number_of_returns: u8,
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub nir: u16,
    pub classification: u8,
}

impl LidarOrigin {
    /// Ordered feature channel names produced for this origin.
    pub fn channel_names(&self) -> &'static [&'static str] {
        match self {
            LidarOrigin::French => &[
                INTENSITY,
                RETURN_NUM,
                NUM_RETURNS,
                RED,
                GREEN,
                BLUE,
                NIR,
                RGB_AVG,
                NDVI,
            ],
            LidarOrigin::SwissTopo => &[
                INTENSITY,
                RETURN_NUM,
                NUM_RETURNS,
                RED,
                GREEN,
                BLUE,
                RGB_AVG,
            ],
        }
    }

    fn colour_max(&self) -> f32 {
        match self {
            LidarOrigin::French => FR_COLOUR_NORMALIZATION_MAX,
            LidarOrigin::SwissTopo => CH_COLOUR_NORMALIZATION_MAX,
        }
    }

    /// Build a tile from raw points.
    ///
    /// Return numbers are scaled to 0-1, colours are divided by the origin's
    /// colour range and zeroed for occluded points (return number > 1).
    /// Intensity stays raw: it is log-transformed and standardized per
    /// subtile later on.
    pub fn build_tile(&self, source_id: impl Into<String>, raw: &[RawPoint]) -> Result<Tile> {
        let channel_names: Vec<String> =
            self.channel_names().iter().map(|c| c.to_string()).collect();
        let colour_max = self.colour_max();

        let mut features = Vec::with_capacity(raw.len() * channel_names.len());
        for p in raw {
            let occluded = p.return_number > 1;
            let colour = |name: &str, value: u16| -> Result<f32> {
                let v = value as f32;
                if v > colour_max {
                    return Err(TilingError::ChannelOutOfRange {
                        channel: name.to_string(),
                        value: v,
                        max: colour_max,
                    });
                }
                Ok(if occluded { 0.0 } else { v / colour_max })
            };

            let red = colour(RED, p.red)?;
            let green = colour(GREEN, p.green)?;
            let blue = colour(BLUE, p.blue)?;

            features.push(p.intensity as f32);
            features.push(p.return_number as f32 / RETURN_NUM_NORMALIZATION_MAX);
            features.push(p.number_of_returns as f32 / RETURN_NUM_NORMALIZATION_MAX);
            features.extend_from_slice(&[red, green, blue]);

            match self {
                LidarOrigin::French => {
                    let nir = colour(NIR, p.nir)?;
                    features.push(nir);
                    features.push((red + green + blue) / 3.0);
                    features.push((nir - red) / (nir + red + NDVI_EPSILON));
                }
                LidarOrigin::SwissTopo => {
                    // Averaged before scaling; standardization removes the scale.
                    features.push((p.red as f32 + p.green as f32 + p.blue as f32) / 3.0);
                }
            }
        }

        Tile::new(
            source_id,
            channel_names,
            raw.iter().map(|p| [p.x, p.y, p.z]).collect(),
            features,
            raw.iter().map(|p| p.classification as u32).collect(),
        )
    }
}
