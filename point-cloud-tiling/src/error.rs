//! Error types shared by every stage of the tiling pipeline.
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TilingError>;

#[derive(Debug, Error)]
pub enum TilingError {
    /// A source tile produced no usable subtile.
    #[error("tile {source_id} yielded no usable subtiles")]
    EmptyTile { source_id: String },

    /// A classification code is missing from the configured class dictionary.
    #[error("classification code {code} is not in the classification dictionary")]
    UnknownClassCode { code: u32 },

    /// A class index has no code in the classification dictionary.
    #[error("class index {index} is outside the {num_classes} configured classes")]
    UnknownClassIndex { index: usize, num_classes: usize },

    /// A source point received no prediction from any subtile.
    #[error("point {source_index} was not covered by any subtile")]
    CoverageViolation { source_index: usize },

    /// The collator was handed no usable subtile.
    #[error("cannot collate an empty list of subtiles")]
    EmptyBatch,

    /// Points remain after the maximum number of band extractions.
    #[error(
        "{remaining} points remain after {steps} band extractions, tile is wider than {max_extent} m"
    )]
    TileExceedsBandLimit {
        remaining: usize,
        steps: usize,
        max_extent: f64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("feature channel '{0}' is not present")]
    MissingChannel(String),

    #[error("channel '{channel}' value {value} exceeds the expected maximum {max}")]
    ChannelOutOfRange {
        channel: String,
        value: f32,
        max: f32,
    },

    #[error("shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Interpolator method called in the wrong lifecycle state.
    #[error("interpolator is {state}, cannot {action}")]
    InvalidState {
        state: &'static str,
        action: &'static str,
    },

    #[error("no file named {basename} in {}", .dir.display())]
    FileNotFound { basename: String, dir: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LAS error: {0}")]
    Las(#[from] las::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
