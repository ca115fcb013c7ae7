//! Splitting tiles into square subtiles.
use crate::bounds::PointCloudBounds;
use crate::error::{Result, TilingError};
use crate::tile::Tile;
use log::debug;
use rayon::prelude::*;

/// Strategy used to cut a tile into subtiles of `subtile_width` meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TileSplitter {
    /// Preparation split: repeatedly peels the lowest band along x, then
    /// along y within that band. Every point lands in exactly one subtile.
    ExhaustiveBand {
        subtile_width: f64,
        /// Largest tile extent supported; bounds the number of bands.
        max_tile_extent: f64,
    },
    /// Inference split: a regular grid of possibly overlapping windows.
    /// The tile is never modified and boundary points may be shared.
    OverlappingGrid { subtile_width: f64, overlap: f64 },
}

/// Subtiles produced by a [`TileSplitter`], in emission order.
pub enum Subtiles<'a> {
    Bands(std::vec::IntoIter<Tile>),
    Grid(GridSubtiles<'a>),
}

impl Iterator for Subtiles<'_> {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        match self {
            Subtiles::Bands(bands) => bands.next(),
            Subtiles::Grid(grid) => grid.next(),
        }
    }
}

impl TileSplitter {
    /// Split `tile` into non-empty subtiles.
    ///
    /// The band split is computed eagerly so that a tile exceeding the band
    /// limit fails before anything is emitted. The grid split is lazy.
    pub fn split<'a>(&self, tile: &'a Tile) -> Result<Subtiles<'a>> {
        match *self {
            TileSplitter::ExhaustiveBand {
                subtile_width,
                max_tile_extent,
            } => {
                let bands = split_exhaustive_bands(tile, subtile_width, max_tile_extent)?;
                Ok(Subtiles::Bands(bands.into_iter()))
            }
            TileSplitter::OverlappingGrid {
                subtile_width,
                overlap,
            } => {
                if !(subtile_width > 0.0) || overlap < 0.0 || overlap >= subtile_width {
                    return Err(TilingError::InvalidConfig(format!(
                        "grid split needs 0 <= overlap < width (width {}, overlap {})",
                        subtile_width, overlap
                    )));
                }
                Ok(Subtiles::Grid(GridSubtiles::new(tile, subtile_width, overlap)))
            }
        }
    }
}

/// Number of extraction steps allowed per axis.
pub fn band_step_limit(subtile_width: f64, max_tile_extent: f64) -> usize {
    (max_tile_extent / subtile_width).ceil() as usize + 1
}

/// Partition a tile into subtiles, x bands first, then y within each band.
///
/// Works on index sets over the immutable tile. Indices are sorted once per
/// axis so each extracted band is a prefix of the remaining points.
fn split_exhaustive_bands(
    tile: &Tile,
    subtile_width: f64,
    max_tile_extent: f64,
) -> Result<Vec<Tile>> {
    if !(subtile_width > 0.0) {
        return Err(TilingError::InvalidConfig(format!(
            "subtile width must be positive (got {})",
            subtile_width
        )));
    }

    let steps = band_step_limit(subtile_width, max_tile_extent);
    let positions = &tile.positions;

    let mut remaining: Vec<usize> = (0..tile.len()).collect();
    remaining.sort_by(|&a, &b| positions[a][0].total_cmp(&positions[b][0]));

    let mut subtiles = Vec::new();
    let mut x_start = 0;

    for _ in 0..steps {
        if x_start == remaining.len() {
            break;
        }
        let mut band = extract_prefix(&remaining[x_start..], positions, 0, subtile_width);
        x_start += band.len();

        band.sort_by(|&a, &b| positions[a][1].total_cmp(&positions[b][1]));
        let mut y_start = 0;
        for _ in 0..steps {
            if y_start == band.len() {
                break;
            }
            let mut cell = extract_prefix(&band[y_start..], positions, 1, subtile_width);
            y_start += cell.len();

            // Keep source order inside the subtile.
            cell.sort_unstable();
            subtiles.push(tile.select(&cell));
        }

        if y_start < band.len() {
            return Err(TilingError::TileExceedsBandLimit {
                remaining: band.len() - y_start,
                steps,
                max_extent: max_tile_extent,
            });
        }
    }

    if x_start < remaining.len() {
        return Err(TilingError::TileExceedsBandLimit {
            remaining: remaining.len() - x_start,
            steps,
            max_extent: max_tile_extent,
        });
    }

    debug!(
        "Band split of {} produced {} subtiles from {} points",
        tile.source_id,
        subtiles.len(),
        tile.len()
    );
    Ok(subtiles)
}

/// Leading indices whose coordinate on `axis` lies within `width` of the first one.
/// `sorted` must be ordered by that coordinate.
fn extract_prefix(sorted: &[usize], positions: &[[f64; 3]], axis: usize, width: f64) -> Vec<usize> {
    let low = positions[sorted[0]][axis];
    let high = low + width;
    let end = sorted.partition_point(|&i| positions[i][axis] <= high);
    sorted[..end].to_vec()
}

/// Lower-left corners of the inference grid.
///
/// Corners advance by `width - overlap` from the tile minimum and stop once
/// they pass `max + 1` meter, so the trailing edge is always covered.
pub fn grid_corners(bounds: &PointCloudBounds, subtile_width: f64, overlap: f64) -> Vec<[f64; 2]> {
    if bounds.is_empty() {
        return Vec::new();
    }
    let step = subtile_width - overlap;
    let xs = arange(bounds.min_x, bounds.max_x + 1.0, step);
    let ys = arange(bounds.min_y, bounds.max_y + 1.0, step);

    let mut corners = Vec::with_capacity(xs.len() * ys.len());
    for &x in &xs {
        for &y in &ys {
            corners.push([x, y]);
        }
    }
    corners
}

fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    let count = ((stop - start) / step).ceil().max(0.0) as usize;
    (0..count).map(|k| start + k as f64 * step).collect()
}

/// Lazy iterator over the non-empty windows of an overlapping grid.
pub struct GridSubtiles<'a> {
    tile: &'a Tile,
    corners: Vec<[f64; 2]>,
    next_corner: usize,
    subtile_width: f64,
}

impl<'a> GridSubtiles<'a> {
    fn new(tile: &'a Tile, subtile_width: f64, overlap: f64) -> Self {
        let corners = grid_corners(&tile.bounds(), subtile_width, overlap);
        debug!(
            "Grid split of {} uses {} corners",
            tile.source_id,
            corners.len()
        );
        Self {
            tile,
            corners,
            next_corner: 0,
            subtile_width,
        }
    }

    pub fn corners(&self) -> &[[f64; 2]] {
        &self.corners
    }
}

/// Indices of the points inside the closed square window starting at `corner`.
pub fn window_indices(positions: &[[f64; 3]], corner: [f64; 2], subtile_width: f64) -> Vec<usize> {
    let (low_x, low_y) = (corner[0], corner[1]);
    let (high_x, high_y) = (low_x + subtile_width, low_y + subtile_width);

    (0..positions.len())
        .into_par_iter()
        .filter(|&i| {
            let p = positions[i];
            low_x <= p[0] && p[0] <= high_x && low_y <= p[1] && p[1] <= high_y
        })
        .collect()
}

impl Iterator for GridSubtiles<'_> {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        while self.next_corner < self.corners.len() {
            let corner = self.corners[self.next_corner];
            self.next_corner += 1;

            let indices = window_indices(&self.tile.positions, corner, self.subtile_width);
            if !indices.is_empty() {
                return Some(self.tile.select(&indices));
            }
        }
        None
    }
}
