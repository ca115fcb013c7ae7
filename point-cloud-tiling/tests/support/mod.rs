#![allow(dead_code)]

use constants::channel::{INTENSITY, RGB_AVG};
use las::point::{Classification, Format};
use las::{Builder, Color, Point, Writer};
use point_cloud_tiling::{ClassEntry, SubsamplerKind, Tile, TilingConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::Path;

/// Random points over `[0, width] x [0, height]`, with both corners pinned
/// so the tile bounds are exact.
pub fn random_tile(n: usize, width: f64, height: f64, seed: u64) -> Tile {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut positions = vec![[0.0, 0.0, 0.0], [width, height, 0.0]];
    positions.extend((2..n).map(|_| {
        [
            rng.gen_range(0.0..width),
            rng.gen_range(0.0..height),
            rng.gen_range(100.0..130.0),
        ]
    }));
    let labels = (0..n).map(|_| if rng.gen_bool(0.5) { 1 } else { 6 }).collect();
    let features = (0..n)
        .flat_map(|_| [rng.gen_range(0.0..4000.0f32), rng.gen_range(0.0..1.0f32)])
        .collect();

    Tile::new(
        "random",
        vec![INTENSITY.into(), RGB_AVG.into()],
        positions,
        features,
        labels,
    )
    .unwrap()
}

/// Two classes and small subtiles, fast enough for tests.
pub fn small_config() -> TilingConfig {
    TilingConfig {
        subsample_size: 256,
        min_points_per_subtile: 5,
        subsampler_kind: SubsamplerKind::Random,
        batch_size: 4,
        classification_preprocessing_dict: BTreeMap::from([(2, 1), (9, 1)]),
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

/// Write a format 2 LAS file with a regular `side x side` grid of points
/// spaced `spacing` meters apart. Points with x below the middle are
/// buildings, the others ground.
pub fn write_grid_las(path: &Path, side: usize, spacing: f64) {
    let mut builder = Builder::from((1, 4));
    builder.point_format = Format::new(2).unwrap();
    let mut writer = Writer::from_path(path, builder.into_header().unwrap()).unwrap();
    let middle = side as f64 * spacing / 2.0;

    for i in 0..side {
        for j in 0..side {
            let x = 1_000.0 + i as f64 * spacing;
            let y = 2_000.0 + j as f64 * spacing;
            let code = if (i as f64 * spacing) < middle { 6 } else { 2 };
            writer
                .write_point(Point {
                    x,
                    y,
                    z: 50.0 + (i % 3) as f64,
                    intensity: (i * j % 1000) as u16,
                    return_number: 1,
                    number_of_returns: 1,
                    classification: Classification::new(code).unwrap(),
                    color: Some(Color::new(12_000, 20_000, 30_000)),
                    ..Default::default()
                })
                .unwrap();
        }
    }
    writer.close().unwrap();
}
