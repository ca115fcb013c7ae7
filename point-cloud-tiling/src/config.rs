//! Configuration surface consumed by the tiling engine.
use crate::error::{Result, TilingError};
use crate::labels::LabelMapper;
use crate::sampler::Subsampler;
use crate::splitter::TileSplitter;
use constants::class::{CLASS_MAP, CLASS_PREPROCESSING_MAP};
use constants::tiling;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Subsampling algorithm applied to every subtile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SubsamplerKind {
    Random,
    FarthestPoint,
    #[default]
    VoxelGrid,
}

/// Origin of the LiDAR data, which decides the feature schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum LidarOrigin {
    #[default]
    #[serde(rename = "FR")]
    #[value(name = "FR")]
    French,
    #[serde(rename = "CH")]
    #[value(name = "CH")]
    SwissTopo,
}

/// How a point covered by several overlapping subtiles is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapPolicy {
    /// The subtile processed last overwrites earlier predictions.
    #[default]
    LastWriteWins,
    /// The prediction with the highest top-class probability is kept.
    MaxConfidence,
}

/// One entry of the ordered classification dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub code: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    pub subtile_width_meters: f64,
    pub subtile_overlap_meters: f64,
    /// Upper bound on a source tile's extent, used by the band split.
    pub input_tile_width_meters: f64,
    pub subsample_size: usize,
    pub min_points_per_subtile: usize,
    pub subsampler_kind: SubsamplerKind,
    pub voxel_size: f64,
    /// Random x/y mirroring of training subtiles.
    pub augment: bool,
    pub batch_size: usize,
    pub seed: u64,
    pub origin: LidarOrigin,
    pub overlap_policy: OverlapPolicy,
    /// Class names whose probabilities are written to the output cloud.
    pub probas_to_save: Vec<String>,
    pub classification_preprocessing_dict: BTreeMap<u32, u32>,
    pub classification_dict: Vec<ClassEntry>,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            subtile_width_meters: tiling::SUBTILE_WIDTH_METERS,
            subtile_overlap_meters: tiling::SUBTILE_OVERLAP_METERS,
            input_tile_width_meters: tiling::INPUT_TILE_WIDTH_METERS,
            subsample_size: tiling::SUBSAMPLE_SIZE,
            min_points_per_subtile: tiling::MIN_POINTS_PER_SUBTILE,
            subsampler_kind: SubsamplerKind::default(),
            voxel_size: tiling::VOXEL_SIZE,
            augment: false,
            batch_size: tiling::BATCH_SIZE,
            seed: 0,
            origin: LidarOrigin::default(),
            overlap_policy: OverlapPolicy::default(),
            probas_to_save: Vec::new(),
            classification_preprocessing_dict: CLASS_PREPROCESSING_MAP
                .iter()
                .map(|&(from, to)| (from as u32, to as u32))
                .collect(),
            classification_dict: CLASS_MAP
                .iter()
                .map(|c| ClassEntry {
                    code: c.code as u32,
                    name: c.name.to_string(),
                })
                .collect(),
        }
    }
}

impl TilingConfig {
    /// Load configuration from a JSON file, filling absent fields with defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the splitters, samplers or label mapper cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TilingError::InvalidConfig(msg));

        if !(self.subtile_width_meters > 0.0) {
            return invalid(format!(
                "subtile_width_meters must be positive (got {})",
                self.subtile_width_meters
            ));
        }
        if self.subtile_overlap_meters < 0.0
            || self.subtile_overlap_meters >= self.subtile_width_meters
        {
            return invalid(format!(
                "subtile_overlap_meters must be in [0, {}) (got {})",
                self.subtile_width_meters, self.subtile_overlap_meters
            ));
        }
        if !(self.input_tile_width_meters > 0.0) {
            return invalid("input_tile_width_meters must be positive".into());
        }
        if self.subsample_size == 0 {
            return invalid("subsample_size must be at least 1".into());
        }
        if !(self.voxel_size > 0.0) {
            return invalid(format!("voxel_size must be positive (got {})", self.voxel_size));
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }
        if self.classification_dict.is_empty() {
            return invalid("classification_dict is empty".into());
        }

        let mut codes = HashSet::new();
        for entry in &self.classification_dict {
            if !codes.insert(entry.code) {
                return invalid(format!("class code {} is listed twice", entry.code));
            }
        }
        for name in &self.probas_to_save {
            if !self.classification_dict.iter().any(|c| &c.name == name) {
                return invalid(format!("probas_to_save names unknown class '{}'", name));
            }
        }

        Ok(())
    }

    pub fn subsampler(&self) -> Subsampler {
        match self.subsampler_kind {
            SubsamplerKind::Random => Subsampler::Random {
                size: self.subsample_size,
            },
            SubsamplerKind::FarthestPoint => Subsampler::FarthestPoint {
                size: self.subsample_size,
            },
            SubsamplerKind::VoxelGrid => Subsampler::VoxelGrid {
                size: self.subsample_size,
                voxel_size: self.voxel_size,
            },
        }
    }

    /// Destructive splitter used when preparing a training dataset.
    pub fn band_splitter(&self) -> TileSplitter {
        TileSplitter::ExhaustiveBand {
            subtile_width: self.subtile_width_meters,
            max_tile_extent: self.input_tile_width_meters,
        }
    }

    /// Overlapping splitter used at inference time.
    pub fn grid_splitter(&self) -> TileSplitter {
        TileSplitter::OverlappingGrid {
            subtile_width: self.subtile_width_meters,
            overlap: self.subtile_overlap_meters,
        }
    }

    pub fn label_mapper(&self) -> LabelMapper {
        LabelMapper::new(
            &self.classification_preprocessing_dict,
            &self.classification_dict,
        )
    }
}
