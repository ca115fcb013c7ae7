//! Per-tile inference driver and layout inspection.
use crate::bounds::PointCloudBounds;
use crate::collate::{Batch, Batcher};
use crate::config::TilingConfig;
use crate::error::{Result, TilingError};
use crate::interpolate::{Interpolator, TilePredictions};
use crate::laz::{read_tile, write_predictions};
use crate::splitter::{grid_corners, window_indices};
use crate::tile::Tile;
use crate::transform::{Phase, SubtileTransform};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Segmentation network seam.
///
/// Implementations return `num_classes()` logits per subsampled row of the
/// batch, row-major, in the class order of the classification dictionary.
pub trait SegmentationModel {
    fn num_classes(&self) -> usize;

    fn predict(&mut self, batch: &Batch) -> Result<Vec<f32>>;
}

/// Run the full inference chain over one tile.
///
/// Subtiles come from the overlapping grid, are transformed without label
/// mapping and batched; model outputs are interpolated back onto every
/// point of `tile`.
pub fn predict_tile<M>(tile: &Tile, config: &TilingConfig, model: &mut M) -> Result<TilePredictions>
where
    M: SegmentationModel + ?Sized,
{
    config.validate()?;
    let mut interpolator = Interpolator::from_config(config, tile.len())?;
    if model.num_classes() != interpolator.num_classes() {
        return Err(TilingError::ShapeMismatch {
            expected: interpolator.num_classes(),
            actual: model.num_classes(),
        });
    }

    let transform = SubtileTransform::from_config(config, Phase::Predict);
    let subtiles = config.grid_splitter().split(tile)?.map(Ok);
    let mut batcher = Batcher::new(subtiles, &transform, config.batch_size);

    let mut batches = 0;
    for batch in batcher.by_ref() {
        let batch = batch?;
        let logits = model.predict(&batch)?;
        interpolator.update(&batch, &logits)?;
        batches += 1;
        debug!(
            "{}: batch {} with {} subtiles",
            tile.source_id, batches, batch.subtile_count
        );
    }
    if batches == 0 {
        return Err(TilingError::EmptyTile {
            source_id: tile.source_id.clone(),
        });
    }
    info!(
        "{}: {} batches from {} subtiles",
        tile.source_id,
        batches,
        batcher.subtiles_seen()
    );

    interpolator.finalize()
}

/// Read `src`, predict every point and write the augmented cloud to `dst`.
pub fn run_inference<M>(
    src: &Path,
    dst: &Path,
    config: &TilingConfig,
    model: &mut M,
) -> Result<TilePredictions>
where
    M: SegmentationModel + ?Sized,
{
    info!("Predicting {}", src.display());
    let tile = read_tile(src, config.origin)?;
    let predictions = predict_tile(&tile, config, model)?;
    write_predictions(src, dst, &predictions)?;
    Ok(predictions)
}

/// One window of the inference grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtileLayout {
    pub corner: [f64; 2],
    pub point_count: usize,
    /// Whether the window reaches the minimum point count.
    pub kept: bool,
}

/// Subtiles that inference would produce for a tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLayout {
    pub source_id: String,
    pub point_count: usize,
    pub bounds: PointCloudBounds,
    pub subtile_width: f64,
    pub overlap: f64,
    pub subtiles: Vec<SubtileLayout>,
    /// Points outside every kept window. Inference fails on such tiles.
    pub uncovered_points: usize,
    /// Raw classification codes present in the tile and their point counts.
    pub class_counts: BTreeMap<u32, usize>,
}

impl TileLayout {
    pub fn kept_count(&self) -> usize {
        self.subtiles.iter().filter(|s| s.kept).count()
    }
}

pub fn inspect_layout(tile: &Tile, config: &TilingConfig) -> Result<TileLayout> {
    config.validate()?;
    let bounds = tile.bounds();
    let width = config.subtile_width_meters;
    let overlap = config.subtile_overlap_meters;

    let mut covered = vec![false; tile.len()];
    let mut subtiles = Vec::new();
    for corner in grid_corners(&bounds, width, overlap) {
        let indices = window_indices(&tile.positions, corner, width);
        if indices.is_empty() {
            continue;
        }
        let kept = indices.len() >= config.min_points_per_subtile;
        if kept {
            for &i in &indices {
                covered[i] = true;
            }
        }
        subtiles.push(SubtileLayout {
            corner,
            point_count: indices.len(),
            kept,
        });
    }

    Ok(TileLayout {
        source_id: tile.source_id.clone(),
        point_count: tile.len(),
        bounds,
        subtile_width: width,
        overlap,
        subtiles,
        uncovered_points: covered.iter().filter(|&&c| !c).count(),
        class_counts: tile.labels.iter().fold(BTreeMap::new(), |mut counts, &code| {
            *counts.entry(code).or_insert(0) += 1;
            counts
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassEntry, SubsamplerKind};
    use crate::labels::LabelMapper;
    use constants::channel::{INTENSITY, RGB_AVG};

    /// Predicts the raw label of every sampled point.
    struct LabelEcho {
        mapper: LabelMapper,
        calls: usize,
    }

    impl SegmentationModel for LabelEcho {
        fn num_classes(&self) -> usize {
            self.mapper.num_classes()
        }

        fn predict(&mut self, batch: &Batch) -> Result<Vec<f32>> {
            self.calls += 1;
            let mut logits = Vec::with_capacity(batch.len() * self.num_classes());
            for &code in &batch.labels {
                let index = self.mapper.map_code(code)? as usize;
                logits.extend((0..self.num_classes()).map(|c| if c == index { 8.0 } else { 0.0 }));
            }
            Ok(logits)
        }
    }

    fn config() -> TilingConfig {
        TilingConfig {
            subtile_width_meters: 50.0,
            subtile_overlap_meters: 10.0,
            subsample_size: 200,
            min_points_per_subtile: 5,
            subsampler_kind: SubsamplerKind::Random,
            batch_size: 2,
            classification_preprocessing_dict: Default::default(),
            classification_dict: vec![
                ClassEntry {
                    code: 1,
                    name: "unclassified".into(),
                },
                ClassEntry {
                    code: 6,
                    name: "building".into(),
                },
            ],
            ..TilingConfig::default()
        }
    }

    fn grid_tile(code: u32) -> Tile {
        let positions: Vec<[f64; 3]> = (0..21)
            .flat_map(|i| (0..21).map(move |j| [i as f64 * 5.0, j as f64 * 5.0, (i + j) as f64]))
            .collect();
        let n = positions.len();
        Tile::new(
            "grid",
            vec![INTENSITY.into(), RGB_AVG.into()],
            positions,
            (0..n).flat_map(|i| [(i % 13) as f32, 0.3]).collect(),
            vec![code; n],
        )
        .unwrap()
    }

    #[test]
    fn every_point_receives_a_prediction() {
        let config = config();
        let mut model = LabelEcho {
            mapper: config.label_mapper(),
            calls: 0,
        };
        let tile = grid_tile(6);
        let predictions = predict_tile(&tile, &config, &mut model).unwrap();

        assert_eq!(predictions.len(), tile.len());
        assert!(predictions.classification.iter().all(|&c| c == 6));
        // 3x3 windows in batches of 2.
        assert_eq!(model.calls, 5);
    }

    #[test]
    fn class_count_must_match_the_dictionary() {
        let config = config();
        let mut classes = config.classification_dict.clone();
        classes.push(ClassEntry {
            code: 2,
            name: "ground".into(),
        });
        let mut model = LabelEcho {
            mapper: LabelMapper::new(&Default::default(), &classes),
            calls: 0,
        };
        assert!(matches!(
            predict_tile(&grid_tile(1), &config, &mut model),
            Err(TilingError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn empty_class_dictionary_is_rejected() {
        let mut config = config();
        config.classification_dict.clear();
        let mut model = LabelEcho {
            mapper: config.label_mapper(),
            calls: 0,
        };
        assert!(matches!(
            predict_tile(&grid_tile(1), &config, &mut model),
            Err(TilingError::InvalidConfig(_))
        ));
        assert_eq!(model.calls, 0);
    }

    #[test]
    fn tile_without_usable_subtiles_is_empty() {
        let mut config = config();
        config.min_points_per_subtile = 1_000;
        let mut model = LabelEcho {
            mapper: config.label_mapper(),
            calls: 0,
        };
        assert!(matches!(
            predict_tile(&grid_tile(1), &config, &mut model),
            Err(TilingError::EmptyTile { .. })
        ));
    }

    #[test]
    fn layout_reports_windows_and_coverage() {
        let layout = inspect_layout(&grid_tile(1), &config()).unwrap();
        assert_eq!(layout.subtiles.len(), 9);
        assert_eq!(layout.kept_count(), 9);
        assert_eq!(layout.uncovered_points, 0);
        assert_eq!(layout.subtiles[0].corner, [0.0, 0.0]);
        // Closed 50 m window on a 5 m grid.
        assert_eq!(layout.subtiles[0].point_count, 121);
        assert_eq!(layout.class_counts.get(&1), Some(&441));

        let mut strict = config();
        strict.min_points_per_subtile = 100;
        let layout = inspect_layout(&grid_tile(1), &strict).unwrap();
        assert!(layout.kept_count() < 9);
        assert!(layout.uncovered_points > 0);
    }
}
