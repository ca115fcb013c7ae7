//! LAS/LAZ reading into tiles and writing of prediction channels.
use crate::config::LidarOrigin;
use crate::error::{Result, TilingError};
use crate::features::RawPoint;
use crate::interpolate::TilePredictions;
use crate::tile::Tile;
use constants::channel::{ENTROPY_CHANNEL, PREDICTED_CLASSIFICATION_CHANNEL};
use indicatif::{ProgressBar, ProgressStyle};
use las::{Builder, Reader, Vlr, Writer};
use log::{debug, info};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const EXTRA_BYTES_USER_ID: &str = "LASF_Spec";
const EXTRA_BYTES_RECORD_ID: u16 = 4;
const EXTRA_BYTES_DESCRIPTOR_LEN: usize = 192;
const EXTRA_BYTES_NAME_LEN: usize = 32;
const DATA_TYPE_U8: u8 = 1;
const DATA_TYPE_F32: u8 = 9;

/// Create LAS file reader for point cloud access.
/// Handles both .las and .laz compressed formats.
pub fn create_reader(file_path: &Path) -> Result<Reader> {
    let file = File::open(file_path)?;
    let buf_reader = BufReader::new(file);
    Ok(Reader::new(buf_reader)?)
}

fn progress_bar(len: u64, unit: &str, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let template = format!("[{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit} ({{percent}}%) {{msg}}");
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("▉▊▋▌▍▎▏ "),
    );
    pb.set_message(message);
    pb
}

/// Header summary of a point cloud file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub version: (u8, u8),
    pub point_count: u64,
    pub point_format: u8,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    /// Names declared in the Extra Bytes VLR, in record order.
    pub extra_byte_fields: Vec<String>,
}

/// Read the header of a point cloud file and log its layout.
pub fn inspect(file_path: &Path) -> Result<FileInfo> {
    let reader = create_reader(file_path)?;
    let header = reader.header();
    let transforms = header.transforms();

    let extra_byte_fields = header
        .vlrs()
        .iter()
        .filter(|vlr| is_extra_bytes_vlr(vlr))
        .flat_map(|vlr| vlr.data.chunks_exact(EXTRA_BYTES_DESCRIPTOR_LEN))
        .map(|record| {
            String::from_utf8_lossy(&record[4..4 + EXTRA_BYTES_NAME_LEN])
                .trim_end_matches('\0')
                .to_string()
        })
        .collect();

    let info = FileInfo {
        version: (header.version().major, header.version().minor),
        point_count: header.number_of_points(),
        point_format: header.point_format().to_u8()?,
        scale: [transforms.x.scale, transforms.y.scale, transforms.z.scale],
        offset: [transforms.x.offset, transforms.y.offset, transforms.z.offset],
        extra_byte_fields,
    };

    info!("LAS/LAZ file {}", file_path.display());
    info!("  Version: {}.{}", info.version.0, info.version.1);
    info!("  Points: {}", info.point_count);
    info!("  Point format: {}", info.point_format);
    info!(
        "  Scale factors: X={}, Y={}, Z={}",
        info.scale[0], info.scale[1], info.scale[2]
    );
    info!(
        "  Offsets: X={}, Y={}, Z={}",
        info.offset[0], info.offset[1], info.offset[2]
    );
    for name in &info.extra_byte_fields {
        info!("  Extra bytes field: '{}'", name);
    }
    Ok(info)
}

fn is_extra_bytes_vlr(vlr: &Vlr) -> bool {
    vlr.user_id == EXTRA_BYTES_USER_ID && vlr.record_id == EXTRA_BYTES_RECORD_ID
}

fn raw_point(point: &las::Point) -> RawPoint {
    let (red, green, blue) = point
        .color
        .map(|c| (c.red, c.green, c.blue))
        .unwrap_or_default();
    RawPoint {
        x: point.x,
        y: point.y,
        z: point.z,
        intensity: point.intensity,
        return_number: point.return_number,
        number_of_returns: point.number_of_returns,
        red,
        green,
        blue,
        nir: point.nir.unwrap_or(0),
        classification: u8::from(point.classification),
    }
}

/// Load every point of a file as raw fields, in file order.
pub fn read_raw_points(file_path: &Path) -> Result<Vec<RawPoint>> {
    let mut reader = create_reader(file_path)?;
    let total_points = reader.header().number_of_points();

    let pb = progress_bar(total_points, "points", "Loading points");
    let mut points = Vec::with_capacity(total_points as usize);
    for (idx, point_result) in reader.points().enumerate() {
        points.push(raw_point(&point_result?));

        if idx % 50_000 == 0 {
            pb.set_position(idx as u64);
        }
    }
    pb.finish_with_message("Points loaded");

    debug!("Read {} points from {}", points.len(), file_path.display());
    Ok(points)
}

/// Source id of a file: its name without the extension.
pub fn source_id(file_path: &Path) -> String {
    file_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Read a file into a tile with the feature schema of `origin`.
pub fn read_tile(file_path: &Path, origin: LidarOrigin) -> Result<Tile> {
    let raw = read_raw_points(file_path)?;
    origin.build_tile(source_id(file_path), &raw)
}

/// One Extra Bytes descriptor record.
fn extra_bytes_descriptor(name: &str, data_type: u8, description: &str) -> [u8; 192] {
    let mut record = [0u8; EXTRA_BYTES_DESCRIPTOR_LEN];
    record[2] = data_type;
    let name = name.as_bytes();
    let n = name.len().min(EXTRA_BYTES_NAME_LEN);
    record[4..4 + n].copy_from_slice(&name[..n]);
    let description = description.as_bytes();
    let d = description.len().min(32);
    record[160..160 + d].copy_from_slice(&description[..d]);
    record
}

fn prediction_vlr(predictions: &TilePredictions) -> Vlr {
    let mut data = Vec::with_capacity(
        EXTRA_BYTES_DESCRIPTOR_LEN * (2 + predictions.probabilities.len()),
    );
    data.extend_from_slice(&extra_bytes_descriptor(
        PREDICTED_CLASSIFICATION_CHANNEL,
        DATA_TYPE_U8,
        "predicted classification code",
    ));
    data.extend_from_slice(&extra_bytes_descriptor(
        ENTROPY_CHANNEL,
        DATA_TYPE_F32,
        "prediction entropy",
    ));
    for channel in &predictions.probabilities {
        data.extend_from_slice(&extra_bytes_descriptor(
            &channel.name,
            DATA_TYPE_F32,
            "class probability",
        ));
    }
    Vlr {
        user_id: EXTRA_BYTES_USER_ID.to_string(),
        record_id: EXTRA_BYTES_RECORD_ID,
        description: "Extra Bytes Record".to_string(),
        data,
    }
}

/// Copy `src` to `dst` with the prediction channels as extra bytes.
///
/// Any extra bytes of the source are replaced. `predictions` must hold one
/// entry per source point, in file order.
pub fn write_predictions(src: &Path, dst: &Path, predictions: &TilePredictions) -> Result<()> {
    let mut reader = create_reader(src)?;
    let header = reader.header().clone();
    let total_points = header.number_of_points();
    if total_points != predictions.len() as u64 {
        return Err(TilingError::ShapeMismatch {
            expected: total_points as usize,
            actual: predictions.len(),
        });
    }
    let classification = predictions
        .classification
        .iter()
        .map(|&code| u8::try_from(code).map_err(|_| TilingError::UnknownClassCode { code }))
        .collect::<Result<Vec<u8>>>()?;

    let extra_bytes_per_point = 1 + 4 * (1 + predictions.probabilities.len());
    let mut format = *header.point_format();
    format.extra_bytes = extra_bytes_per_point as u16;
    format.is_compressed = false;

    let mut builder = Builder::from((1, 4));
    builder.point_format = format;
    builder.transforms = header.transforms().clone();
    builder.system_identifier = header.system_identifier().to_string();
    builder.generating_software = env!("CARGO_PKG_NAME").to_string();
    builder.vlrs = header
        .vlrs()
        .iter()
        .filter(|vlr| !is_extra_bytes_vlr(vlr))
        .cloned()
        .collect();
    builder.vlrs.push(prediction_vlr(predictions));

    let mut writer = Writer::from_path(dst, builder.into_header()?)?;
    let pb = progress_bar(total_points, "points", "Writing predictions");
    for (idx, point_result) in reader.points().enumerate() {
        let mut point = point_result?;
        let mut extra = Vec::with_capacity(extra_bytes_per_point);
        extra.push(classification[idx]);
        extra.extend_from_slice(&predictions.entropy[idx].to_le_bytes());
        for channel in &predictions.probabilities {
            extra.extend_from_slice(&channel.values[idx].to_le_bytes());
        }
        point.extra_bytes = extra;
        writer.write_point(point)?;

        if idx % 50_000 == 0 {
            pb.set_position(idx as u64);
        }
    }
    writer.close()?;
    pb.finish_with_message("Predictions written");

    info!(
        "Wrote {} points with predictions to {}",
        total_points,
        dst.display()
    );
    Ok(())
}
