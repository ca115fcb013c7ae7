//! Public API integration tests for splitting, sampling and normalization.

mod support;

use point_cloud_tiling::bounds::PointCloudBounds;
use point_cloud_tiling::splitter::grid_corners;
use point_cloud_tiling::{
    Phase, Subsampler, SubtileTransform, Tile, TileSplitter, TilingConfig, TilingError,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use support::{random_tile, small_config};

fn membership_counts(tile: &Tile, splitter: TileSplitter) -> Vec<usize> {
    let mut counts = vec![0; tile.len()];
    for subtile in splitter.split(tile).unwrap() {
        for &i in &subtile.source_indices {
            counts[i] += 1;
        }
    }
    counts
}

#[test]
fn band_split_partitions_the_tile() {
    let tile = random_tile(3000, 230.0, 180.0, 7);
    let splitter = TileSplitter::ExhaustiveBand {
        subtile_width: 50.0,
        max_tile_extent: 1000.0,
    };

    let subtiles: Vec<Tile> = splitter.split(&tile).unwrap().collect();
    assert!(subtiles.len() >= 20);
    for subtile in &subtiles {
        let (dx, dy, _) = subtile.bounds().dimensions();
        assert!(dx <= 50.0 && dy <= 50.0);
        assert!(subtile.source_indices.windows(2).all(|w| w[0] < w[1]));
    }

    let mut seen: Vec<usize> = subtiles
        .iter()
        .flat_map(|s| s.source_indices.iter().copied())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..tile.len()).collect::<Vec<_>>());
}

#[test]
fn band_split_rejects_oversized_tiles() {
    let tile = random_tile(500, 400.0, 50.0, 1);
    let splitter = TileSplitter::ExhaustiveBand {
        subtile_width: 50.0,
        max_tile_extent: 100.0,
    };
    assert!(matches!(
        splitter.split(&tile),
        Err(TilingError::TileExceedsBandLimit { steps: 3, .. })
    ));
}

#[test]
fn grid_without_overlap_covers_every_point() {
    let tile = random_tile(2000, 100.0, 100.0, 3);
    let counts = membership_counts(
        &tile,
        TileSplitter::OverlappingGrid {
            subtile_width: 50.0,
            overlap: 0.0,
        },
    );
    assert!(counts.iter().all(|&c| c >= 1));
}

#[test]
fn grid_overlap_duplicates_boundary_points() {
    let tile = random_tile(2000, 100.0, 100.0, 5);
    let counts = membership_counts(
        &tile,
        TileSplitter::OverlappingGrid {
            subtile_width: 50.0,
            overlap: 10.0,
        },
    );

    assert!(counts.iter().all(|&c| c >= 1));
    let mut boundary = 0;
    for (p, &count) in tile.positions.iter().zip(&counts) {
        if (40.0..=50.0).contains(&p[0]) {
            assert!(count >= 2, "point at x={} seen {} times", p[0], count);
            boundary += 1;
        }
    }
    assert!(boundary > 0);
}

#[test]
fn hundred_meter_tile_yields_three_by_three_corners() {
    let mut bounds = PointCloudBounds::new();
    bounds.update(0.0, 0.0, 0.0);
    bounds.update(100.0, 100.0, 10.0);

    let corners = grid_corners(&bounds, 50.0, 10.0);
    assert_eq!(corners.len(), 9);
    for x in [0.0, 40.0, 80.0] {
        for y in [0.0, 40.0, 80.0] {
            assert!(corners.contains(&[x, y]));
        }
    }
}

#[test]
fn every_subsampler_hits_the_budget() {
    let dense = random_tile(2000, 50.0, 50.0, 11);
    let sparse = random_tile(100, 50.0, 50.0, 12);
    let mut rng = StdRng::seed_from_u64(0);

    for subsampler in [
        Subsampler::Random { size: 300 },
        Subsampler::FarthestPoint { size: 300 },
        Subsampler::VoxelGrid {
            size: 300,
            voxel_size: 0.25,
        },
    ] {
        let transform = SubtileTransform::new(subsampler, 1, false, None, 0);
        for tile in [&dense, &sparse] {
            let subtile = transform.apply(tile.clone(), 0).unwrap().unwrap();
            assert_eq!(subtile.points.len(), 300, "{:?}", subsampler);
            assert_eq!(subtile.full_positions, tile.positions);
            assert_eq!(subtile.full_labels, tile.labels);
        }
        assert_eq!(subsampler.sample(&dense, &mut rng).len(), 300);
    }
}

#[test]
fn five_points_are_padded_to_ten() {
    let tile = random_tile(5, 10.0, 10.0, 2);
    let mut rng = StdRng::seed_from_u64(4);
    let sampled = Subsampler::Random { size: 10 }.sample(&tile, &mut rng);

    assert_eq!(sampled.len(), 10);
    assert!(sampled.source_indices.iter().all(|&i| i < 5));
    for (p, &i) in sampled.positions.iter().zip(&sampled.source_indices) {
        assert_eq!(*p, tile.positions[i]);
    }
}

#[test]
fn transformed_subtiles_fit_the_model_frame() {
    let config = small_config();
    let transform = SubtileTransform::from_config(&config, Phase::Val);
    let tile = random_tile(800, 50.0, 50.0, 21);

    let subtile = transform.apply(tile, 3).unwrap().unwrap();
    for p in &subtile.points.positions {
        assert!(p[0] > -1.0 && p[0] < 1.0);
        assert!(p[1] > -1.0 && p[1] < 1.0);
    }
    let min_z = subtile
        .points
        .positions
        .iter()
        .map(|p| p[2])
        .fold(f64::INFINITY, f64::min);
    assert!(min_z.abs() < 1e-9);
    assert!(subtile.points.labels.iter().all(|&l| l < 2));
    assert!(
        subtile
            .points
            .features
            .iter()
            .all(|v| v.abs() <= constants::tiling::CLAMP_SIGMA)
    );
}

#[test]
fn default_classes_round_trip_through_the_mapper() {
    let config = TilingConfig::default();
    let mapper = config.label_mapper();
    for entry in &config.classification_dict {
        let index = mapper.map_code(entry.code).unwrap();
        assert_eq!(mapper.code_of(index as usize).unwrap(), entry.code);
    }
    for (&from, &to) in &config.classification_preprocessing_dict {
        let index = mapper.map_code(from).unwrap();
        assert_eq!(mapper.code_of(index as usize).unwrap(), to);
    }
}
