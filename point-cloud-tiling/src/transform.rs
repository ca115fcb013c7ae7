//! Per-subtile transform chain between splitting and collation.
use crate::config::TilingConfig;
use crate::error::Result;
use crate::labels::LabelMapper;
use crate::normalize::{center, normalize_positions, random_flip, standardize_features};
use crate::sampler::Subsampler;
use crate::tile::{Subtile, Tile};
use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

/// Pipeline phase, deciding augmentation and label mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Val,
    Test,
    /// No targets: labels keep their raw codes.
    Predict,
}

impl Phase {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
            Phase::Test => "test",
            Phase::Predict => "predict",
        }
    }
}

/// Turns an extracted subtile into a model-ready [`Subtile`].
///
/// Order: min-point filter, full-resolution copy, subsampling,
/// subsampled-position copy, centering, optional flips, position
/// normalization, feature standardization, label mapping.
#[derive(Debug, Clone)]
pub struct SubtileTransform {
    subsampler: Subsampler,
    min_points: usize,
    augment: bool,
    label_mapper: Option<LabelMapper>,
    seed: u64,
}

impl SubtileTransform {
    pub fn new(
        subsampler: Subsampler,
        min_points: usize,
        augment: bool,
        label_mapper: Option<LabelMapper>,
        seed: u64,
    ) -> Self {
        Self {
            subsampler,
            min_points,
            augment,
            label_mapper,
            seed,
        }
    }

    pub fn from_config(config: &TilingConfig, phase: Phase) -> Self {
        let label_mapper = match phase {
            Phase::Predict => None,
            _ => Some(config.label_mapper()),
        };
        Self::new(
            config.subsampler(),
            config.min_points_per_subtile,
            config.augment && phase == Phase::Train,
            label_mapper,
            config.seed,
        )
    }

    /// Transform one subtile. `ordinal` seeds the random number generator so
    /// a given subtile is always sampled the same way.
    /// Returns `None` for subtiles below the minimum point count.
    pub fn apply(&self, tile: Tile, ordinal: u64) -> Result<Option<Subtile>> {
        if tile.len() < self.min_points {
            debug!(
                "Dropping subtile {} of {}: {} points < {}",
                ordinal,
                tile.source_id,
                tile.len(),
                self.min_points
            );
            return Ok(None);
        }

        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(ordinal));
        let mut subtile = Subtile::from_tile(tile);
        subtile.points = self.subsampler.sample(&subtile.points, &mut rng);
        subtile.record_subsampled_positions();

        center(&mut subtile.points);
        if self.augment {
            random_flip(&mut subtile.points, &mut rng);
        }
        normalize_positions(&mut subtile.points);
        standardize_features(&mut subtile.points)?;

        if let Some(mapper) = &self.label_mapper {
            mapper.apply(&mut subtile)?;
        }
        Ok(Some(subtile))
    }

    /// Transform a group of subtiles in parallel, keeping their order.
    pub fn apply_all(&self, tiles: Vec<(u64, Tile)>) -> Result<Vec<Option<Subtile>>> {
        tiles
            .into_par_iter()
            .map(|(ordinal, tile)| self.apply(tile, ordinal))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassEntry;
    use constants::channel::{INTENSITY, RGB_AVG};
    use std::collections::BTreeMap;

    fn tile(n: usize, code: u32) -> Tile {
        Tile::new(
            "transform",
            vec![INTENSITY.into(), RGB_AVG.into()],
            (0..n)
                .map(|i| [1000.0 + i as f64, 2000.0 + (i % 7) as f64, (i % 5) as f64])
                .collect(),
            (0..n).flat_map(|i| [i as f32, 0.5]).collect(),
            vec![code; n],
        )
        .unwrap()
    }

    fn transform(min_points: usize) -> SubtileTransform {
        let classes = vec![
            ClassEntry {
                code: 1,
                name: "unclassified".into(),
            },
            ClassEntry {
                code: 6,
                name: "building".into(),
            },
        ];
        SubtileTransform::new(
            Subsampler::Random { size: 64 },
            min_points,
            false,
            Some(LabelMapper::new(&BTreeMap::new(), &classes)),
            42,
        )
    }

    #[test]
    fn small_subtiles_are_dropped() {
        assert!(transform(50).apply(tile(49, 6), 0).unwrap().is_none());
        assert!(transform(50).apply(tile(50, 6), 0).unwrap().is_some());
    }

    #[test]
    fn copies_are_taken_before_sampling() {
        let subtile = transform(1).apply(tile(100, 6), 3).unwrap().unwrap();
        assert_eq!(subtile.points.len(), 64);
        assert_eq!(subtile.subsampled_positions.len(), 64);
        assert_eq!(subtile.full_len(), 100);
        assert_eq!(subtile.full_positions[0], [1000.0, 2000.0, 0.0]);
        assert!(subtile.full_labels.iter().all(|&l| l == 1));
        assert!(subtile.points.labels.iter().all(|&l| l == 1));
        assert!(subtile.points.positions.iter().all(|p| p[0].abs() < 1.0));
    }

    #[test]
    fn same_ordinal_same_sample() {
        let t = transform(1);
        let a = t.apply(tile(100, 1), 9).unwrap().unwrap();
        let b = t.apply(tile(100, 1), 9).unwrap().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_codes_fail_outside_prediction() {
        assert!(transform(1).apply(tile(10, 4), 0).is_err());
        let predict = SubtileTransform::new(Subsampler::Random { size: 8 }, 1, false, None, 0);
        let subtile = predict.apply(tile(10, 4), 0).unwrap().unwrap();
        assert!(subtile.full_labels.iter().all(|&l| l == 4));
    }
}
