//! Column-oriented point storage for tiles and subtiles.
use crate::bounds::PointCloudBounds;
use crate::error::{Result, TilingError};
use serde::{Deserialize, Serialize};

/// A collection of points with named feature channels.
/// Features are stored row-major, `channel_names.len()` values per point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// Identifier of the source cloud, usually its file path.
    pub source_id: String,
    pub channel_names: Vec<String>,
    pub positions: Vec<[f64; 3]>,
    pub features: Vec<f32>,
    pub labels: Vec<u32>,
    /// Index of every point in the source cloud it was read from.
    pub source_indices: Vec<usize>,
}

impl Tile {
    /// Create a tile whose points are numbered 0..n in source order.
    pub fn new(
        source_id: impl Into<String>,
        channel_names: Vec<String>,
        positions: Vec<[f64; 3]>,
        features: Vec<f32>,
        labels: Vec<u32>,
    ) -> Result<Self> {
        let n = positions.len();
        let tile = Self {
            source_id: source_id.into(),
            channel_names,
            positions,
            features,
            labels,
            source_indices: (0..n).collect(),
        };
        tile.check_shapes()?;
        Ok(tile)
    }

    /// Verify that every column has one entry per point.
    pub fn check_shapes(&self) -> Result<()> {
        let n = self.positions.len();
        let expected_features = n * self.channel_count();
        if self.features.len() != expected_features {
            return Err(TilingError::ShapeMismatch {
                expected: expected_features,
                actual: self.features.len(),
            });
        }
        for actual in [self.labels.len(), self.source_indices.len()] {
            if actual != n {
                return Err(TilingError::ShapeMismatch {
                    expected: n,
                    actual,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }

    pub fn channel_index(&self, name: &str) -> Result<usize> {
        self.channel_names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TilingError::MissingChannel(name.to_string()))
    }

    pub fn feature_row(&self, point: usize) -> &[f32] {
        let c = self.channel_count();
        &self.features[point * c..(point + 1) * c]
    }

    /// Copy one feature channel out as a contiguous column.
    pub fn channel_column(&self, channel: usize) -> Vec<f32> {
        let c = self.channel_count();
        self.features
            .iter()
            .skip(channel)
            .step_by(c.max(1))
            .copied()
            .collect()
    }

    /// Overwrite one feature channel from a column.
    pub fn set_channel_column(&mut self, channel: usize, values: &[f32]) {
        let c = self.channel_count();
        for (row, &v) in self.features.chunks_exact_mut(c).zip(values) {
            row[channel] = v;
        }
    }

    pub fn bounds(&self) -> PointCloudBounds {
        PointCloudBounds::from_positions(&self.positions)
    }

    /// Gather the points at `indices` into a new tile. Indices may repeat.
    pub fn select(&self, indices: &[usize]) -> Tile {
        let c = self.channel_count();
        let mut features = Vec::with_capacity(indices.len() * c);
        for &i in indices {
            features.extend_from_slice(self.feature_row(i));
        }

        Tile {
            source_id: self.source_id.clone(),
            channel_names: self.channel_names.clone(),
            positions: indices.iter().map(|&i| self.positions[i]).collect(),
            features,
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            source_indices: indices.iter().map(|&i| self.source_indices[i]).collect(),
        }
    }
}

/// A subtile on its way to the model.
///
/// `points` holds the subsampled (and later normalized) points. The `full_*`
/// columns keep every point that fell inside the subtile bounds, untouched
/// by sampling, so predictions can be interpolated back onto them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtile {
    pub points: Tile,
    pub full_positions: Vec<[f64; 3]>,
    pub full_labels: Vec<u32>,
    pub full_source_indices: Vec<usize>,
    /// Positions of the subsampled points before centering and scaling.
    pub subsampled_positions: Vec<[f64; 3]>,
}

impl Subtile {
    /// Take the full-resolution copies of a freshly extracted subtile.
    pub fn from_tile(tile: Tile) -> Self {
        Self {
            full_positions: tile.positions.clone(),
            full_labels: tile.labels.clone(),
            full_source_indices: tile.source_indices.clone(),
            subsampled_positions: Vec::new(),
            points: tile,
        }
    }

    /// Snapshot the un-normalized positions of the current (subsampled) points.
    pub fn record_subsampled_positions(&mut self) {
        self.subsampled_positions = self.points.positions.clone();
    }

    pub fn full_len(&self) -> usize {
        self.full_positions.len()
    }
}
