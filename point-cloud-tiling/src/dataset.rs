//! Preparation of a learning-ready dataset and loading of its subtiles.
use crate::collate::{Batch, Batcher};
use crate::config::TilingConfig;
use crate::error::{Result, TilingError};
use crate::laz::read_tile;
use crate::tile::Tile;
use crate::transform::{Phase, SubtileTransform};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Dataset subset a source tile is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    /// Processing order of the subsets.
    pub const ORDER: [Split; 3] = [Split::Val, Split::Train, Split::Test];

    pub fn phase(self) -> Phase {
        match self {
            Split::Train => Phase::Train,
            Split::Val => Phase::Val,
            Split::Test => Phase::Test,
        }
    }
}

/// One row of the split manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitEntry {
    /// File name of the source tile, e.g. `0845_6305.las`.
    pub basename: String,
    pub split: Split,
}

pub fn load_split_manifest(path: &Path) -> Result<Vec<SplitEntry>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Counts reported by [`DatasetPreparer::prepare`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreparationSummary {
    pub files_split: usize,
    pub subtiles_written: usize,
    pub files_copied: usize,
}

/// Resolve the file in `dir` whose name ends with `basename`.
pub fn find_file_in_dir(dir: &Path, basename: &str) -> Result<PathBuf> {
    let mut matches: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(basename))
        .map(|entry| entry.into_path())
        .collect();
    matches.sort();

    if matches.len() > 1 {
        warn!(
            "{} files in {} match {}, using {}",
            matches.len(),
            dir.display(),
            basename,
            matches[0].display()
        );
    }
    matches
        .into_iter()
        .next()
        .ok_or_else(|| TilingError::FileNotFound {
            basename: basename.to_string(),
            dir: dir.to_path_buf(),
        })
}

/// Path of the `index`-th subtile inside a tile's output directory.
pub fn subtile_path(tile_dir: &Path, index: usize) -> PathBuf {
    tile_dir.join(format!("{:04}.json", index))
}

pub fn save_subtile(tile: &Tile, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, tile)?;
    Ok(())
}

pub fn load_subtile(path: &Path) -> Result<Tile> {
    let reader = BufReader::new(File::open(path)?);
    let tile: Tile = serde_json::from_reader(reader)?;
    tile.check_shapes()?;
    Ok(tile)
}

/// Splits source tiles into persisted subtiles according to a split manifest.
///
/// Train and val tiles are cut with the band splitter and every subtile is
/// written to `<prepared>/<split>/<basename>/NNNN.json`. Test tiles are
/// copied unchanged to `<prepared>/test/<basename>` so they go through the
/// same path as unseen data.
pub struct DatasetPreparer {
    input_dir: PathBuf,
    prepared_dir: PathBuf,
    config: TilingConfig,
}

impl DatasetPreparer {
    pub fn new(input_dir: &Path, prepared_dir: &Path, config: TilingConfig) -> Self {
        Self {
            input_dir: input_dir.to_path_buf(),
            prepared_dir: prepared_dir.to_path_buf(),
            config,
        }
    }

    pub fn prepare(&self, entries: &[SplitEntry]) -> Result<PreparationSummary> {
        let mut summary = PreparationSummary::default();

        for split in Split::ORDER {
            let basenames: Vec<&str> = entries
                .iter()
                .filter(|e| e.split == split)
                .map(|e| e.basename.as_str())
                .collect();
            let phase = split.phase();
            info!("Subset: {} ({} files)", phase.dir_name(), basenames.len());
            if basenames.is_empty() {
                continue;
            }
            info!("  {}", basenames.join("  -  "));

            let output_dir = self.prepared_dir.join(phase.dir_name());
            fs::create_dir_all(&output_dir)?;

            let pb = ProgressBar::new(basenames.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{bar:40.green/blue}] {pos}/{len} files ({percent}%) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("▉▊▋▌▍▎▏ "),
            );
            pb.set_message(phase.dir_name());

            let written = basenames
                .par_iter()
                .map(|basename| -> Result<usize> {
                    let source = find_file_in_dir(&self.input_dir, basename)?;
                    let count = match split {
                        Split::Test => {
                            fs::copy(&source, output_dir.join(basename))?;
                            0
                        }
                        Split::Train | Split::Val => {
                            self.split_and_save(&source, &output_dir.join(basename))?
                        }
                    };
                    pb.inc(1);
                    Ok(count)
                })
                .collect::<Result<Vec<usize>>>()?;
            pb.finish_with_message(format!("{} done", phase.dir_name()));

            match split {
                Split::Test => summary.files_copied += basenames.len(),
                Split::Train | Split::Val => {
                    summary.files_split += basenames.len();
                    summary.subtiles_written += written.iter().sum::<usize>();
                }
            }
        }

        info!(
            "Prepared {} subtiles from {} files, copied {} test files",
            summary.subtiles_written, summary.files_split, summary.files_copied
        );
        Ok(summary)
    }

    /// Band-split one source tile and persist its subtiles.
    /// Returns the number of subtiles written.
    pub fn split_and_save(&self, source: &Path, tile_dir: &Path) -> Result<usize> {
        let tile = read_tile(source, self.config.origin)?;
        fs::create_dir_all(tile_dir)?;

        let mut count = 0;
        for (index, subtile) in self.config.band_splitter().split(&tile)?.enumerate() {
            save_subtile(&subtile, &subtile_path(tile_dir, index))?;
            count += 1;
        }
        debug!("{}: {} subtiles", source.display(), count);
        Ok(count)
    }
}

/// Files under `root` whose extension is one of `extensions`, sorted by path.
fn files_with_extension(root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            TilingError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            )
        })?;
        let matches = entry
            .path()
            .extension()
            .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(*e)));
        if entry.file_type().is_file() && matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Persisted subtiles of one split, sorted by path.
pub fn prepared_subtile_files(prepared_dir: &Path, phase: Phase) -> Result<Vec<PathBuf>> {
    files_with_extension(&prepared_dir.join(phase.dir_name()), &["json"])
}

/// Source tiles copied into the test split, sorted by path.
pub fn prepared_test_files(prepared_dir: &Path) -> Result<Vec<PathBuf>> {
    files_with_extension(&prepared_dir.join(Phase::Test.dir_name()), &["las", "laz"])
}

/// Subtiles of a prepared split, fed through the transform chain of its phase.
pub struct PreparedDataset {
    files: Vec<PathBuf>,
    transform: SubtileTransform,
    batch_size: usize,
}

impl PreparedDataset {
    pub fn open(prepared_dir: &Path, phase: Phase, config: &TilingConfig) -> Result<Self> {
        let files = prepared_subtile_files(prepared_dir, phase)?;
        info!(
            "Found {} {} subtiles in {}",
            files.len(),
            phase.dir_name(),
            prepared_dir.display()
        );
        Ok(Self {
            files,
            transform: SubtileTransform::from_config(config, phase),
            batch_size: config.batch_size,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Batches in file order. Filtered subtiles still consume their ordinal.
    pub fn batches(&self) -> Batcher<'_, impl Iterator<Item = Result<Tile>> + '_> {
        Batcher::new(
            self.files.iter().map(|path| load_subtile(path)),
            &self.transform,
            self.batch_size,
        )
    }
}

/// Whole test tiles of a prepared dataset.
///
/// Each tile is cut with the overlapping grid like unseen data, but its
/// labels go through the label mapper so predictions can be scored.
pub struct TestDataset {
    files: Vec<PathBuf>,
    config: TilingConfig,
    transform: SubtileTransform,
}

impl TestDataset {
    pub fn open(prepared_dir: &Path, config: &TilingConfig) -> Result<Self> {
        config.validate()?;
        let files = prepared_test_files(prepared_dir)?;
        info!(
            "Found {} test tiles in {}",
            files.len(),
            prepared_dir.display()
        );
        Ok(Self {
            files,
            config: config.clone(),
            transform: SubtileTransform::from_config(config, Phase::Test),
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Read one test tile and batch its grid subtiles.
    /// Returns the tile along with its batches, in grid order.
    pub fn tile_batches(&self, path: &Path) -> Result<(Tile, Vec<Batch>)> {
        let tile = read_tile(path, self.config.origin)?;
        let batches = {
            let subtiles = self.config.grid_splitter().split(&tile)?.map(Ok);
            Batcher::new(subtiles, &self.transform, self.config.batch_size)
                .collect::<Result<Vec<Batch>>>()?
        };
        debug!("{}: {} test batches", path.display(), batches.len());
        Ok((tile, batches))
    }
}
