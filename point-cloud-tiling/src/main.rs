use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use constants::class::get_class_name;
use log::info;
use point_cloud_tiling::dataset::{DatasetPreparer, load_split_manifest};
use point_cloud_tiling::laz::{inspect, read_tile};
use point_cloud_tiling::{LidarOrigin, SubsamplerKind, TilingConfig, inspect_layout};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "point-cloud-tiling", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split source tiles into a learning-ready train/val/test dataset.
    Prepare {
        /// Directory holding the source LAS/LAZ tiles.
        #[arg(long)]
        input_dir: PathBuf,

        #[arg(long)]
        prepared_dir: PathBuf,

        /// JSON list of `{"basename", "split"}` entries.
        #[arg(long)]
        split: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Report the subtiles inference would produce for one tile.
    Inspect {
        tile: PathBuf,

        /// Print the layout as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Configuration file plus per-field overrides.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// JSON configuration; absent fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    subtile_width: Option<f64>,

    #[arg(long)]
    overlap: Option<f64>,

    #[arg(long, value_enum)]
    subsampler: Option<SubsamplerKind>,

    #[arg(long)]
    subsample_size: Option<usize>,

    #[arg(long)]
    min_points: Option<usize>,

    #[arg(long, value_enum)]
    origin: Option<LidarOrigin>,

    #[arg(long)]
    seed: Option<u64>,
}

impl ConfigArgs {
    fn load(&self) -> Result<TilingConfig> {
        let mut config = match &self.config {
            Some(path) => TilingConfig::from_path(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => TilingConfig::default(),
        };

        if let Some(v) = self.subtile_width {
            config.subtile_width_meters = v;
        }
        if let Some(v) = self.overlap {
            config.subtile_overlap_meters = v;
        }
        if let Some(v) = self.subsampler {
            config.subsampler_kind = v;
        }
        if let Some(v) = self.subsample_size {
            config.subsample_size = v;
        }
        if let Some(v) = self.min_points {
            config.min_points_per_subtile = v;
        }
        if let Some(v) = self.origin {
            config.origin = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }

        config.validate().context("validating configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Prepare {
            input_dir,
            prepared_dir,
            split,
            config,
        } => {
            let config = config.load()?;
            let entries = load_split_manifest(&split)
                .with_context(|| format!("reading split manifest {}", split.display()))?;
            info!("{} tiles listed in {}", entries.len(), split.display());

            let summary = DatasetPreparer::new(&input_dir, &prepared_dir, config)
                .prepare(&entries)
                .with_context(|| format!("preparing dataset into {}", prepared_dir.display()))?;
            info!(
                "Done: {} subtiles, {} test tiles copied",
                summary.subtiles_written, summary.files_copied
            );
        }
        Command::Inspect { tile, json, config } => {
            let config = config.load()?;
            inspect(&tile).with_context(|| format!("reading header of {}", tile.display()))?;
            let points = read_tile(&tile, config.origin)
                .with_context(|| format!("reading {}", tile.display()))?;
            let layout = inspect_layout(&points, &config)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&layout)?);
            } else {
                println!(
                    "{}: {} points, {} windows of {} m (overlap {} m), {} kept",
                    layout.source_id,
                    layout.point_count,
                    layout.subtiles.len(),
                    layout.subtile_width,
                    layout.overlap,
                    layout.kept_count()
                );
                for (ordinal, subtile) in layout.subtiles.iter().enumerate() {
                    println!(
                        "  {:4}  corner ({:.2}, {:.2})  {:8} points{}",
                        ordinal,
                        subtile.corner[0],
                        subtile.corner[1],
                        subtile.point_count,
                        if subtile.kept { "" } else { "  (dropped)" }
                    );
                }
                for (&code, &count) in &layout.class_counts {
                    let name = u8::try_from(code).map_or_else(|_| "unknown".to_string(), get_class_name);
                    println!("  class {:3} {:24} {:8} points", code, name, count);
                }
                if layout.uncovered_points > 0 {
                    println!(
                        "  {} points fall outside every kept window",
                        layout.uncovered_points
                    );
                }
            }
        }
    }

    Ok(())
}
