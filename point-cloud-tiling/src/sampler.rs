//! Fixed-size subsampling of subtiles.
//!
//! Every strategy returns exactly `size` points for a non-empty input, so
//! subtiles of different densities can be batched together. Strategies only
//! touch the points they are given; full-resolution copies live on
//! [`crate::tile::Subtile`] and are never resampled.
use crate::tile::Tile;
use rand::Rng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Subsampler {
    /// Uniform random sampling, with repeats when the subtile is too small.
    Random { size: usize },
    /// Greedy farthest point sampling starting from the first point.
    FarthestPoint { size: usize },
    /// Voxel grid averaging followed by random up or down sampling.
    VoxelGrid { size: usize, voxel_size: f64 },
}

impl Subsampler {
    pub fn size(&self) -> usize {
        match *self {
            Subsampler::Random { size }
            | Subsampler::FarthestPoint { size }
            | Subsampler::VoxelGrid { size, .. } => size,
        }
    }

    /// Sample `tile` down (or up) to exactly `self.size()` points.
    /// An empty tile is returned unchanged.
    pub fn sample<R: Rng + ?Sized>(&self, tile: &Tile, rng: &mut R) -> Tile {
        let size = self.size();
        let n = tile.len();
        if n == 0 {
            return tile.clone();
        }
        // Every strategy pads short subtiles by random repetition.
        if n < size {
            return tile.select(&random_choice(n, size, rng));
        }

        match *self {
            Subsampler::Random { .. } => tile.select(&random_choice(n, size, rng)),
            Subsampler::FarthestPoint { .. } => {
                tile.select(&farthest_point_indices(&tile.positions, size))
            }
            Subsampler::VoxelGrid { voxel_size, .. } => {
                let clusters = voxelize(tile, voxel_size);
                clusters.select(&random_choice(clusters.len(), size, rng))
            }
        }
    }
}

/// Concatenate fresh permutations of `0..n` until `size` indices are drawn.
pub fn random_choice<R: Rng + ?Sized>(n: usize, size: usize, rng: &mut R) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let repeats = size.div_ceil(n);
    let mut choice = Vec::with_capacity(repeats * n);
    for _ in 0..repeats {
        let mut permutation: Vec<usize> = (0..n).collect();
        permutation.shuffle(rng);
        choice.extend(permutation);
    }
    choice.truncate(size);
    choice
}

/// Greedy farthest point sampling, deterministic start at index 0.
///
/// Each step selects the point whose distance to the selected set is
/// largest, ties going to the lowest index. The selection is prefix-stable,
/// so asking for `count` points equals sampling more and truncating.
pub fn farthest_point_indices(positions: &[[f64; 3]], count: usize) -> Vec<usize> {
    let count = count.min(positions.len());
    let mut selected = Vec::with_capacity(count);
    if count == 0 {
        return selected;
    }

    let mut min_dist = vec![f64::INFINITY; positions.len()];
    let mut current = 0;
    loop {
        selected.push(current);
        // Selected points can never win again.
        min_dist[current] = f64::NEG_INFINITY;
        if selected.len() == count {
            break;
        }

        let c = positions[current];
        min_dist
            .par_iter_mut()
            .zip(positions.par_iter())
            .for_each(|(d, p)| {
                let dd = squared_distance(p, &c);
                if dd < *d {
                    *d = dd;
                }
            });

        current = min_dist
            .par_iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(i, _)| i)
            .unwrap_or(0);
    }
    selected
}

fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Collapse the points of every occupied voxel into a single point.
///
/// Voxels are anchored at the tile minimum and ordered by (z, y, x) cell
/// index. Positions and features are averaged, the label is the most
/// frequent code (lowest code on ties), and the source index is that of the
/// first member.
pub fn voxelize(tile: &Tile, voxel_size: f64) -> Tile {
    let bounds = tile.bounds();
    let origin = [bounds.min_x, bounds.min_y, bounds.min_z];

    let mut clusters: BTreeMap<[i64; 3], Vec<usize>> = BTreeMap::new();
    for (i, p) in tile.positions.iter().enumerate() {
        let cell = |axis: usize| ((p[axis] - origin[axis]) / voxel_size).floor() as i64;
        clusters.entry([cell(2), cell(1), cell(0)]).or_default().push(i);
    }

    let c = tile.channel_count();
    let mut positions = Vec::with_capacity(clusters.len());
    let mut features = Vec::with_capacity(clusters.len() * c);
    let mut labels = Vec::with_capacity(clusters.len());
    let mut source_indices = Vec::with_capacity(clusters.len());

    for members in clusters.values() {
        let count = members.len() as f64;

        let mut position = [0.0f64; 3];
        let mut feature_sum = vec![0.0f64; c];
        let mut votes: BTreeMap<u32, usize> = BTreeMap::new();
        for &m in members {
            for axis in 0..3 {
                position[axis] += tile.positions[m][axis];
            }
            for (sum, &v) in feature_sum.iter_mut().zip(tile.feature_row(m)) {
                *sum += v as f64;
            }
            *votes.entry(tile.labels[m]).or_default() += 1;
        }

        positions.push(position.map(|v| v / count));
        features.extend(feature_sum.iter().map(|s| (s / count) as f32));
        labels.push(majority_label(&votes));
        source_indices.push(tile.source_indices[members[0]]);
    }

    Tile {
        source_id: tile.source_id.clone(),
        channel_names: tile.channel_names.clone(),
        positions,
        features,
        labels,
        source_indices,
    }
}

fn majority_label(votes: &BTreeMap<u32, usize>) -> u32 {
    let mut best = (0, 0);
    for (&code, &count) in votes {
        if count > best.1 {
            best = (code, count);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn grid_tile(n_side: usize, spacing: f64) -> Tile {
        let mut positions = Vec::new();
        for i in 0..n_side {
            for j in 0..n_side {
                positions.push([i as f64 * spacing, j as f64 * spacing, 0.0]);
            }
        }
        let n = positions.len();
        Tile::new(
            "grid",
            vec!["f".into()],
            positions,
            (0..n).map(|i| i as f32).collect(),
            (0..n).map(|i| (i % 3) as u32).collect(),
        )
        .unwrap()
    }

    #[test]
    fn five_points_padded_to_ten() {
        let tile = Tile::new(
            "five",
            Vec::new(),
            (0..5).map(|i| [i as f64, 0.0, 0.0]).collect(),
            Vec::new(),
            vec![1; 5],
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let sampled = Subsampler::Random { size: 10 }.sample(&tile, &mut rng);

        assert_eq!(sampled.len(), 10);
        let mut counts = [0usize; 5];
        for &i in &sampled.source_indices {
            counts[i] += 1;
        }
        // Two full permutations.
        assert!(counts.iter().all(|&c| c == 2));
    }

    #[test]
    fn random_choice_truncates_last_permutation() {
        let mut rng = StdRng::seed_from_u64(1);
        let choice = random_choice(4, 6, &mut rng);
        assert_eq!(choice.len(), 6);
        let first: HashSet<usize> = choice[..4].iter().copied().collect();
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn farthest_point_starts_at_first_point_and_spreads() {
        let positions = vec![
            [0.0, 0.0, 0.0],
            [0.1, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [5.0, 0.0, 0.0],
        ];
        let picked = farthest_point_indices(&positions, 3);
        assert_eq!(picked, vec![0, 2, 3]);
    }

    #[test]
    fn farthest_point_never_repeats_on_duplicates() {
        let positions = vec![[1.0, 1.0, 1.0]; 6];
        let picked = farthest_point_indices(&positions, 6);
        let unique: HashSet<usize> = picked.iter().copied().collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn farthest_point_is_deterministic() {
        let tile = grid_tile(20, 0.5);
        let sampler = Subsampler::FarthestPoint { size: 50 };
        let mut rng = StdRng::seed_from_u64(0);
        let a = sampler.sample(&tile, &mut rng);
        let b = sampler.sample(&tile, &mut rng);
        assert_eq!(a.source_indices, b.source_indices);
        assert_eq!(a.len(), 50);
    }

    #[test]
    fn voxel_cluster_averages_and_votes() {
        let tile = Tile::new(
            "vox",
            vec!["f".into()],
            vec![
                [0.0, 0.0, 0.0],
                [0.1, 0.1, 0.0],
                [0.2, 0.0, 0.0],
                [5.0, 5.0, 0.0],
            ],
            vec![1.0, 2.0, 3.0, 9.0],
            vec![6, 2, 6, 4],
        )
        .unwrap();

        let clusters = voxelize(&tile, 0.25);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters.labels, vec![6, 4]);
        assert!((clusters.feature_row(0)[0] - 2.0).abs() < 1e-6);
        assert!((clusters.positions[0][0] - 0.1).abs() < 1e-9);
        assert_eq!(clusters.source_indices, vec![0, 3]);
    }

    #[test]
    fn voxel_vote_ties_go_to_lowest_code() {
        let mut votes = BTreeMap::new();
        votes.insert(9, 2);
        votes.insert(3, 2);
        assert_eq!(majority_label(&votes), 3);
    }

    #[test]
    fn every_strategy_hits_the_budget() {
        let tile = grid_tile(30, 0.1);
        let mut rng = StdRng::seed_from_u64(3);
        for sampler in [
            Subsampler::Random { size: 200 },
            Subsampler::FarthestPoint { size: 200 },
            Subsampler::VoxelGrid {
                size: 200,
                voxel_size: 0.25,
            },
            Subsampler::VoxelGrid {
                size: 2000,
                voxel_size: 0.25,
            },
        ] {
            let sampled = sampler.sample(&tile, &mut rng);
            assert_eq!(sampled.len(), sampler.size(), "{:?}", sampler);
            assert!(sampled.check_shapes().is_ok());
        }
    }
}
