//! Mapping between raw classification codes and dense training indices.
use crate::config::ClassEntry;
use crate::error::{Result, TilingError};
use crate::tile::Subtile;
use std::collections::{BTreeMap, HashMap};

/// Two-stage code remapping.
///
/// Example: with preprocessing `{17: 1, 9: 1}` and classes
/// `[1: "unclassified", 6: "building"]`, labels `[6, 6, 17, 9, 1]` become
/// `[6, 6, 1, 1, 1]` and then `[1, 1, 0, 0, 0]`.
#[derive(Debug, Clone)]
pub struct LabelMapper {
    preprocessing: HashMap<u32, u32>,
    index_of_code: HashMap<u32, u32>,
    classes: Vec<ClassEntry>,
}

impl LabelMapper {
    pub fn new(preprocessing: &BTreeMap<u32, u32>, classes: &[ClassEntry]) -> Self {
        Self {
            preprocessing: preprocessing.iter().map(|(&k, &v)| (k, v)).collect(),
            index_of_code: classes
                .iter()
                .enumerate()
                .map(|(i, c)| (c.code, i as u32))
                .collect(),
            classes: classes.to_vec(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[ClassEntry] {
        &self.classes
    }

    /// Apply the preprocessing dictionary; absent codes map to themselves.
    pub fn preprocess(&self, code: u32) -> u32 {
        self.preprocessing.get(&code).copied().unwrap_or(code)
    }

    pub fn map_code(&self, code: u32) -> Result<u32> {
        let code = self.preprocess(code);
        self.index_of_code
            .get(&code)
            .copied()
            .ok_or(TilingError::UnknownClassCode { code })
    }

    pub fn map(&self, codes: &[u32]) -> Result<Vec<u32>> {
        codes.iter().map(|&c| self.map_code(c)).collect()
    }

    /// Classification code of a training index.
    pub fn code_of(&self, index: usize) -> Result<u32> {
        self.classes
            .get(index)
            .map(|c| c.code)
            .ok_or(TilingError::UnknownClassIndex {
                index,
                num_classes: self.classes.len(),
            })
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c.name == name)
    }

    /// Map sampled and full-resolution labels into the same index space.
    pub fn apply(&self, subtile: &mut Subtile) -> Result<()> {
        subtile.points.labels = self.map(&subtile.points.labels)?;
        subtile.full_labels = self.map(&subtile.full_labels)?;
        Ok(())
    }
}
