//! Propagation of subsampled predictions back onto full-resolution points.
use crate::collate::Batch;
use crate::config::{OverlapPolicy, TilingConfig};
use crate::error::{Result, TilingError};
use crate::labels::LabelMapper;
use log::{debug, info};
use rayon::prelude::*;
use rstar::RTree;
use rstar::primitives::GeomWithData;

/// Resolved prediction of one full-resolution point.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub class_index: u32,
    /// Probability of the predicted class.
    pub confidence: f32,
    pub entropy: f32,
    /// Probabilities of the classes selected for output, in that order.
    pub probabilities: Vec<f32>,
}

/// Lifecycle of an [`Interpolator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolatorState {
    Idle,
    Accumulating,
    Finalized,
}

enum Accumulator {
    Idle,
    /// One slot per source point, filled as subtiles arrive.
    Accumulating(Vec<Option<PredictionRecord>>),
    Finalized,
}

/// A named per-point probability column of the output cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityChannel {
    pub name: String,
    pub values: Vec<f32>,
}

/// One prediction per source point, ready to be written as extra channels.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePredictions {
    /// Predicted classification codes (not training indices).
    pub classification: Vec<u32>,
    pub entropy: Vec<f32>,
    pub probabilities: Vec<ProbabilityChannel>,
}

impl TilePredictions {
    pub fn len(&self) -> usize {
        self.classification.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classification.is_empty()
    }
}

/// Sequential accumulator of model outputs for a single source tile.
///
/// Each full-resolution point takes the prediction of the nearest
/// subsampled point of its subtile. Points shared by overlapping subtiles
/// are resolved by the configured [`OverlapPolicy`]. One instance serves
/// exactly one tile and is consumed by [`Interpolator::finalize`].
pub struct Interpolator {
    point_count: usize,
    mapper: LabelMapper,
    policy: OverlapPolicy,
    /// Class indices and names of the probability columns to emit.
    saved_classes: Vec<(usize, String)>,
    accumulator: Accumulator,
}

impl Interpolator {
    pub fn new(
        point_count: usize,
        mapper: LabelMapper,
        policy: OverlapPolicy,
        probas_to_save: &[String],
    ) -> Result<Self> {
        if mapper.num_classes() == 0 {
            return Err(TilingError::InvalidConfig(
                "interpolation needs at least one class".into(),
            ));
        }
        let saved_classes = probas_to_save
            .iter()
            .map(|name| {
                mapper
                    .index_of_name(name)
                    .map(|i| (i, name.clone()))
                    .ok_or_else(|| {
                        TilingError::InvalidConfig(format!("no class named '{}'", name))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            point_count,
            mapper,
            policy,
            saved_classes,
            accumulator: Accumulator::Idle,
        })
    }

    pub fn from_config(config: &TilingConfig, point_count: usize) -> Result<Self> {
        Self::new(
            point_count,
            config.label_mapper(),
            config.overlap_policy,
            &config.probas_to_save,
        )
    }

    pub fn state(&self) -> InterpolatorState {
        match self.accumulator {
            Accumulator::Idle => InterpolatorState::Idle,
            Accumulator::Accumulating(_) => InterpolatorState::Accumulating,
            Accumulator::Finalized => InterpolatorState::Finalized,
        }
    }

    fn state_name(&self) -> &'static str {
        match self.state() {
            InterpolatorState::Idle => "idle",
            InterpolatorState::Accumulating => "accumulating",
            InterpolatorState::Finalized => "finalized",
        }
    }

    pub fn num_classes(&self) -> usize {
        self.mapper.num_classes()
    }

    /// Accumulate model output for one batch.
    ///
    /// `logits` holds `num_classes` values per subsampled row of `batch`,
    /// row-major. A batch that fails midway closes the interpolator.
    pub fn update(&mut self, batch: &Batch, logits: &[f32]) -> Result<()> {
        if matches!(self.accumulator, Accumulator::Finalized) {
            return Err(TilingError::InvalidState {
                state: self.state_name(),
                action: "accept predictions",
            });
        }
        let num_classes = self.num_classes();
        if logits.len() != batch.len() * num_classes {
            return Err(TilingError::ShapeMismatch {
                expected: batch.len() * num_classes,
                actual: logits.len(),
            });
        }

        let sampled_records: Vec<PredictionRecord> = logits
            .par_chunks(num_classes)
            .map(|row| self.record_from_logits(row))
            .collect();

        if matches!(self.accumulator, Accumulator::Idle) {
            debug!("Opening accumulator for {} points", self.point_count);
            self.accumulator = Accumulator::Accumulating(vec![None; self.point_count]);
        }
        let records = match &mut self.accumulator {
            Accumulator::Accumulating(records) => records,
            _ => {
                return Err(TilingError::InvalidState {
                    state: "finalized",
                    action: "accept predictions",
                });
            }
        };

        let applied = Self::apply_batch(records, self.policy, batch, &sampled_records);
        if applied.is_err() {
            // Partial writes must never reach `finalize`.
            self.accumulator = Accumulator::Finalized;
        }
        applied
    }

    fn apply_batch(
        records: &mut [Option<PredictionRecord>],
        policy: OverlapPolicy,
        batch: &Batch,
        sampled_records: &[PredictionRecord],
    ) -> Result<()> {
        let point_count = records.len();
        for ordinal in 0..batch.subtile_count {
            let sampled = batch.subsampled_range(ordinal);
            let full = batch.full_range(ordinal);
            let nearest = nearest_sampled_rows(
                &batch.subsampled_positions[sampled.clone()],
                &batch.full_positions[full.clone()],
            )?;

            // Applied in subtile order so the last subtile wins deterministically.
            for (k, local_row) in nearest.into_iter().enumerate() {
                let source_index = batch.full_source_indices[full.start + k];
                let slot = records.get_mut(source_index).ok_or(TilingError::ShapeMismatch {
                    expected: point_count,
                    actual: source_index + 1,
                })?;
                let candidate = &sampled_records[sampled.start + local_row];
                let replace = match (policy, slot.as_ref()) {
                    (_, None) | (OverlapPolicy::LastWriteWins, Some(_)) => true,
                    (OverlapPolicy::MaxConfidence, Some(current)) => {
                        candidate.confidence > current.confidence
                    }
                };
                if replace {
                    *slot = Some(candidate.clone());
                }
            }
        }
        Ok(())
    }

    /// Emit one prediction per source point and close the interpolator.
    ///
    /// The accumulator is released whether or not every point was covered.
    pub fn finalize(&mut self) -> Result<TilePredictions> {
        let records = match std::mem::replace(&mut self.accumulator, Accumulator::Finalized) {
            Accumulator::Accumulating(records) => records,
            other => {
                self.accumulator = other;
                return Err(TilingError::InvalidState {
                    state: self.state_name(),
                    action: "finalize",
                });
            }
        };

        let mut classification = Vec::with_capacity(records.len());
        let mut entropy = Vec::with_capacity(records.len());
        let mut probabilities: Vec<ProbabilityChannel> = self
            .saved_classes
            .iter()
            .map(|(_, name)| ProbabilityChannel {
                name: name.clone(),
                values: Vec::with_capacity(records.len()),
            })
            .collect();

        for (source_index, record) in records.into_iter().enumerate() {
            let record = record.ok_or(TilingError::CoverageViolation { source_index })?;
            classification.push(self.mapper.code_of(record.class_index as usize)?);
            entropy.push(record.entropy);
            for (channel, p) in probabilities.iter_mut().zip(record.probabilities) {
                channel.values.push(p);
            }
        }

        info!(
            "Interpolated predictions onto {} points",
            classification.len()
        );
        Ok(TilePredictions {
            classification,
            entropy,
            probabilities,
        })
    }

    fn record_from_logits(&self, logits: &[f32]) -> PredictionRecord {
        let probabilities = softmax(logits);
        let (class_index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 { (i, p) } else { best }
            });
        PredictionRecord {
            class_index: class_index as u32,
            confidence,
            entropy: entropy(&probabilities),
            probabilities: self
                .saved_classes
                .iter()
                .map(|&(i, _)| probabilities[i])
                .collect(),
        }
    }
}

/// Row of the nearest sampled position for every full-resolution position.
fn nearest_sampled_rows(sampled: &[[f64; 3]], full: &[[f64; 3]]) -> Result<Vec<usize>> {
    if sampled.is_empty() {
        return if full.is_empty() {
            Ok(Vec::new())
        } else {
            Err(TilingError::ShapeMismatch {
                expected: 1,
                actual: 0,
            })
        };
    }

    let tree = RTree::bulk_load(
        sampled
            .iter()
            .enumerate()
            .map(|(row, p)| GeomWithData::new(*p, row))
            .collect(),
    );
    Ok(full
        .par_iter()
        .map(|p| tree.nearest_neighbor(p).map_or(0, |hit| hit.data))
        .collect())
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

/// Shannon entropy in nats.
pub fn entropy(probabilities: &[f32]) -> f32 {
    -probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.ln())
        .sum::<f32>()
}
