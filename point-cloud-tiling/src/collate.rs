//! Flattening subtiles into batches for the model.
use crate::error::{Result, TilingError};
use crate::tile::{Subtile, Tile};
use crate::transform::SubtileTransform;
use std::ops::Range;

/// Concatenated per-point arrays of several subtiles.
///
/// Rows of the subsampled arrays map to their subtile through
/// `batch_of_subsampled_point`, rows of the full-resolution arrays through
/// `batch_of_full_resolution_point`. Subtile ordinals are 0-based and follow
/// insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub channel_names: Vec<String>,
    /// Normalized positions fed to the model.
    pub positions: Vec<[f32; 3]>,
    pub features: Vec<f32>,
    pub labels: Vec<u32>,
    /// Subsampled positions before normalization.
    pub subsampled_positions: Vec<[f64; 3]>,
    pub full_positions: Vec<[f64; 3]>,
    pub full_labels: Vec<u32>,
    pub full_source_indices: Vec<usize>,
    pub batch_of_subsampled_point: Vec<usize>,
    pub batch_of_full_resolution_point: Vec<usize>,
    pub source_ids: Vec<String>,
    pub subtile_count: usize,
    subsampled_offsets: Vec<usize>,
    full_offsets: Vec<usize>,
}

impl Batch {
    /// Number of subsampled rows.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn full_len(&self) -> usize {
        self.full_positions.len()
    }

    /// Subsampled rows belonging to subtile `ordinal`.
    pub fn subsampled_range(&self, ordinal: usize) -> Range<usize> {
        self.subsampled_offsets[ordinal]..self.subsampled_offsets[ordinal + 1]
    }

    /// Full-resolution rows belonging to subtile `ordinal`.
    pub fn full_range(&self, ordinal: usize) -> Range<usize> {
        self.full_offsets[ordinal]..self.full_offsets[ordinal + 1]
    }
}

/// Merge subtiles into one batch, skipping `None` entries.
pub fn collate(subtiles: Vec<Option<Subtile>>) -> Result<Batch> {
    let subtiles: Vec<Subtile> = subtiles.into_iter().flatten().collect();
    let first = subtiles.first().ok_or(TilingError::EmptyBatch)?;

    let channel_names = first.points.channel_names.clone();
    let sampled_total: usize = subtiles.iter().map(|s| s.points.len()).sum();
    let full_total: usize = subtiles.iter().map(|s| s.full_len()).sum();

    let mut batch = Batch {
        features: Vec::with_capacity(sampled_total * channel_names.len()),
        channel_names,
        positions: Vec::with_capacity(sampled_total),
        labels: Vec::with_capacity(sampled_total),
        subsampled_positions: Vec::with_capacity(sampled_total),
        full_positions: Vec::with_capacity(full_total),
        full_labels: Vec::with_capacity(full_total),
        full_source_indices: Vec::with_capacity(full_total),
        batch_of_subsampled_point: Vec::with_capacity(sampled_total),
        batch_of_full_resolution_point: Vec::with_capacity(full_total),
        source_ids: Vec::with_capacity(subtiles.len()),
        subtile_count: subtiles.len(),
        subsampled_offsets: vec![0],
        full_offsets: vec![0],
    };

    for (ordinal, subtile) in subtiles.into_iter().enumerate() {
        let points = subtile.points;
        if points.channel_names != batch.channel_names {
            return Err(TilingError::ShapeMismatch {
                expected: batch.channel_names.len(),
                actual: points.channel_count(),
            });
        }
        if subtile.subsampled_positions.len() != points.len() {
            return Err(TilingError::ShapeMismatch {
                expected: points.len(),
                actual: subtile.subsampled_positions.len(),
            });
        }

        batch
            .positions
            .extend(points.positions.iter().map(|p| p.map(|v| v as f32)));
        batch.features.extend_from_slice(&points.features);
        batch.labels.extend_from_slice(&points.labels);
        batch
            .subsampled_positions
            .extend_from_slice(&subtile.subsampled_positions);
        batch
            .batch_of_subsampled_point
            .extend(std::iter::repeat_n(ordinal, points.len()));

        let full_len = subtile.full_positions.len();
        batch.full_positions.extend(subtile.full_positions);
        batch.full_labels.extend(subtile.full_labels);
        batch.full_source_indices.extend(subtile.full_source_indices);
        batch
            .batch_of_full_resolution_point
            .extend(std::iter::repeat_n(ordinal, full_len));

        batch.source_ids.push(points.source_id);
        batch.subsampled_offsets.push(batch.positions.len());
        batch.full_offsets.push(batch.full_positions.len());
    }

    Ok(batch)
}

/// Groups a stream of extracted subtiles into transformed batches.
///
/// Each group of `batch_size` subtiles is transformed in parallel and
/// collated. Groups in which every subtile was filtered out are skipped
/// rather than handed to [`collate`].
pub struct Batcher<'t, I> {
    tiles: I,
    transform: &'t SubtileTransform,
    batch_size: usize,
    next_ordinal: u64,
}

impl<'t, I> Batcher<'t, I>
where
    I: Iterator<Item = Result<Tile>>,
{
    pub fn new(tiles: I, transform: &'t SubtileTransform, batch_size: usize) -> Self {
        Self {
            tiles,
            transform,
            batch_size: batch_size.max(1),
            next_ordinal: 0,
        }
    }

    /// Subtiles pulled from the input so far, filtered ones included.
    pub fn subtiles_seen(&self) -> u64 {
        self.next_ordinal
    }
}

impl<I> Iterator for Batcher<'_, I>
where
    I: Iterator<Item = Result<Tile>>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Result<Batch>> {
        loop {
            let mut group = Vec::with_capacity(self.batch_size);
            for tile in self.tiles.by_ref().take(self.batch_size) {
                match tile {
                    Ok(tile) => {
                        group.push((self.next_ordinal, tile));
                        self.next_ordinal += 1;
                    }
                    Err(e) => return Some(Err(e)),
                }
            }
            if group.is_empty() {
                return None;
            }

            let subtiles = match self.transform.apply_all(group) {
                Ok(subtiles) => subtiles,
                Err(e) => return Some(Err(e)),
            };
            if subtiles.iter().any(Option::is_some) {
                return Some(collate(subtiles));
            }
        }
    }
}
