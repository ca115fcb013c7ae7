//! Geometry and feature normalization of sampled subtiles.
use crate::error::Result;
use crate::tile::Tile;
use constants::channel::{INTENSITY, RGB_AVG};
use constants::tiling::{CLAMP_SIGMA, STD_EPSILON, XY_SCALE_MARGIN};
use rand::Rng;

/// Subtract the centroid from every position.
pub fn center(tile: &mut Tile) {
    if tile.is_empty() {
        return;
    }
    let n = tile.len() as f64;
    let mut centroid = [0.0f64; 3];
    for p in &tile.positions {
        for axis in 0..3 {
            centroid[axis] += p[axis];
        }
    }
    let centroid = centroid.map(|s| s / n);
    for p in tile.positions.iter_mut() {
        for axis in 0..3 {
            p[axis] -= centroid[axis];
        }
    }
}

/// Scale centered positions into the model frame.
///
/// x and y share one factor that maps their largest magnitude just inside
/// 1. z is shifted to start at 0 and scaled by the same factor, so 3D
/// distance ratios are preserved. Returns the factor used.
pub fn normalize_positions(tile: &mut Tile) -> f64 {
    let amplitude = tile
        .positions
        .iter()
        .map(|p| p[0].abs().max(p[1].abs()))
        .fold(0.0f64, f64::max);
    // All points stacked on one vertical line: nothing to scale.
    let scale = if amplitude > 0.0 {
        (1.0 / amplitude) * (1.0 - XY_SCALE_MARGIN)
    } else {
        1.0
    };
    let min_z = tile
        .positions
        .iter()
        .map(|p| p[2])
        .fold(f64::INFINITY, f64::min);

    for p in tile.positions.iter_mut() {
        p[0] *= scale;
        p[1] *= scale;
        p[2] = (p[2] - min_z) * scale;
    }
    scale
}

/// Log-transform and standardize intensity, standardize the average colour.
pub fn standardize_features(tile: &mut Tile) -> Result<()> {
    let intensity = tile.channel_index(INTENSITY)?;
    let values: Vec<f32> = tile
        .channel_column(intensity)
        .iter()
        .map(|v| (v + 1.0).ln())
        .collect();
    tile.set_channel_column(intensity, &standardize_channel(&values));

    let rgb_avg = tile.channel_index(RGB_AVG)?;
    let values = tile.channel_column(rgb_avg);
    tile.set_channel_column(rgb_avg, &standardize_channel(&values));
    Ok(())
}

/// Sample-wise `(v - mean) / std`, clamped to [`CLAMP_SIGMA`] deviations.
pub fn standardize_channel(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = if values.len() > 1 {
        values
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0)
    } else {
        0.0
    };
    let std = variance.sqrt() as f32 + STD_EPSILON;
    let mean = mean as f32;

    values
        .iter()
        .map(|&v| ((v - mean) / std).clamp(-CLAMP_SIGMA, CLAMP_SIGMA))
        .collect()
}

/// Mirror x and y independently with probability 0.5 each.
/// Training-time augmentation, applied to centered positions.
pub fn random_flip<R: Rng + ?Sized>(tile: &mut Tile, rng: &mut R) {
    for axis in 0..2 {
        if rng.gen_bool(0.5) {
            for p in tile.positions.iter_mut() {
                p[axis] = -p[axis];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TilingError;

    fn tile_with(positions: Vec<[f64; 3]>) -> Tile {
        let n = positions.len();
        Tile::new(
            "norm",
            vec![INTENSITY.into(), RGB_AVG.into()],
            positions,
            (0..n).flat_map(|i| [i as f32 * 100.0, i as f32]).collect(),
            vec![0; n],
        )
        .unwrap()
    }

    #[test]
    fn positions_land_in_the_unit_square() {
        let mut tile = tile_with(vec![
            [700_000.0, 6_600_000.0, 120.0],
            [700_050.0, 6_600_010.0, 135.0],
            [700_020.0, 6_600_049.0, 128.0],
            [700_003.0, 6_600_025.0, 140.0],
        ]);
        center(&mut tile);
        normalize_positions(&mut tile);

        for p in &tile.positions {
            assert!(p[0] > -1.0 && p[0] < 1.0);
            assert!(p[1] > -1.0 && p[1] < 1.0);
        }
        let min_z = tile.positions.iter().map(|p| p[2]).fold(f64::INFINITY, f64::min);
        assert_eq!(min_z, 0.0);
    }

    #[test]
    fn scaling_preserves_distance_ratios() {
        let original = vec![[0.0, 0.0, 0.0], [30.0, 0.0, 4.0], [0.0, 20.0, 10.0]];
        let mut tile = tile_with(original.clone());
        center(&mut tile);
        normalize_positions(&mut tile);

        let d = |a: [f64; 3], b: [f64; 3]| {
            ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
        };
        let before = d(original[0], original[1]) / d(original[0], original[2]);
        let after = d(tile.positions[0], tile.positions[1]) / d(tile.positions[0], tile.positions[2]);
        assert!((before - after).abs() < 1e-9);
    }

    #[test]
    fn coincident_points_keep_unit_scale() {
        let mut tile = tile_with(vec![[5.0, 5.0, 1.0], [5.0, 5.0, 3.0]]);
        center(&mut tile);
        assert_eq!(normalize_positions(&mut tile), 1.0);
        assert_eq!(tile.positions[1][2], 2.0);
    }

    #[test]
    fn standardized_channel_is_centered_and_clamped() {
        let mut values = vec![0.0f32; 99];
        values.push(1000.0);
        let out = standardize_channel(&values);
        let mean: f32 = out.iter().sum::<f32>() / out.len() as f32;
        assert!(out.iter().all(|v| v.abs() <= CLAMP_SIGMA));
        assert_eq!(out[99], CLAMP_SIGMA);
        assert!(mean.abs() < 0.1);
        assert_eq!(standardize_channel(&[4.0]), vec![0.0]);
    }

    #[test]
    fn features_need_intensity_and_colour() {
        let mut tile = tile_with(vec![[0.0; 3], [1.0; 3], [2.0; 3]]);
        standardize_features(&mut tile).unwrap();
        let column = tile.channel_column(0);
        assert!(column[0] < column[1] && column[1] < column[2]);

        let mut bare = Tile::new("bare", Vec::new(), vec![[0.0; 3]], Vec::new(), vec![0]).unwrap();
        assert!(matches!(
            standardize_features(&mut bare),
            Err(TilingError::MissingChannel(_))
        ));
    }
}
