//! Point cloud coordinate bounds tracking
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Points handled per rayon task when scanning large tiles.
const BOUNDS_CHUNK_SIZE: usize = 25_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointCloudBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl Default for PointCloudBounds {
    fn default() -> Self {
        Self::new()
    }
}

impl PointCloudBounds {
    /// Create new bounds initialised to infinity values
    pub fn new() -> Self {
        Self {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
            min_z: f64::INFINITY,
            max_z: f64::NEG_INFINITY,
        }
    }

    /// Bounds of a position slice, computed in parallel chunks.
    /// Returns the empty (infinite) bounds for an empty slice.
    pub fn from_positions(positions: &[[f64; 3]]) -> Self {
        positions
            .par_chunks(BOUNDS_CHUNK_SIZE)
            .map(|chunk| {
                let mut local_bounds = PointCloudBounds::new();
                for p in chunk {
                    local_bounds.update(p[0], p[1], p[2]);
                }
                local_bounds
            })
            .reduce_with(|a, b| a.merge(&b))
            .unwrap_or_else(PointCloudBounds::new)
    }

    /// Bounds of the positions selected by `indices`.
    pub fn from_indices(positions: &[[f64; 3]], indices: &[usize]) -> Self {
        let mut bounds = PointCloudBounds::new();
        for &i in indices {
            let p = positions[i];
            bounds.update(p[0], p[1], p[2]);
        }
        bounds
    }

    /// Update bounds with a new point
    pub fn update(&mut self, x: f64, y: f64, z: f64) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
        self.min_z = self.min_z.min(z);
        self.max_z = self.max_z.max(z);
    }

    pub fn merge(mut self, other: &PointCloudBounds) -> Self {
        self.min_x = self.min_x.min(other.min_x);
        self.max_x = self.max_x.max(other.max_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_y = self.max_y.max(other.max_y);
        self.min_z = self.min_z.min(other.min_z);
        self.max_z = self.max_z.max(other.max_z);
        self
    }

    /// True until at least one point has been added
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x
    }

    /// Get world space dimensions
    pub fn dimensions(&self) -> (f64, f64, f64) {
        (
            self.max_x - self.min_x,
            self.max_y - self.min_y,
            self.max_z - self.min_z,
        )
    }
}
