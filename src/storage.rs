//! Persisting merged frames
//!
//! Output files are JPEGs named `{prefix}_{yyyyMMdd_HHmmss}.jpg` after the
//! time the burst started.

use crate::errors::FocusStackError;
use crate::types::Frame;
use chrono::{DateTime, Local, NaiveDateTime};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, RgbImage};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// `{prefix}_{yyyyMMdd_HHmmss}.jpg`
pub fn output_file_name(prefix: &str, timestamp: &NaiveDateTime) -> String {
    format!("{}_{}.jpg", prefix, timestamp.format("%Y%m%d_%H%M%S"))
}

fn to_dynamic_image(frame: &Frame) -> Result<DynamicImage, FocusStackError> {
    let (width, height) = (frame.width() as u32, frame.height() as u32);
    let data = frame.data().to_vec();
    let image = match frame.channels() {
        1 => GrayImage::from_vec(width, height, data).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_vec(width, height, data).map(DynamicImage::ImageRgb8),
        _ => None,
    };
    image.ok_or_else(|| {
        FocusStackError::Encode(format!(
            "Failed to create image from frame data ({}x{}x{})",
            width,
            height,
            frame.channels()
        ))
    })
}

/// Encode a frame as JPEG into any writer.
pub fn write_jpeg<W: Write>(frame: &Frame, writer: W, quality: u8) -> Result<(), FocusStackError> {
    if quality == 0 || quality > 100 {
        return Err(FocusStackError::InvalidConfig(format!(
            "JPEG quality must be between 1 and 100, got {}",
            quality
        )));
    }
    let image = to_dynamic_image(frame)?;
    let encoder = JpegEncoder::new_with_quality(writer, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| FocusStackError::Encode(format!("Failed to encode JPEG: {}", e)))
}

/// Encode a frame as JPEG in memory.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, FocusStackError> {
    let mut bytes = Vec::new();
    write_jpeg(frame, &mut bytes, quality)?;
    Ok(bytes)
}

/// Timestamp layout used in output names and accepted by [`parse_timestamp`].
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Parse a `yyyyMMdd_HHmmss` timestamp.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, FocusStackError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|e| {
        FocusStackError::InvalidConfig(format!(
            "timestamp {:?} is not yyyyMMdd_HHmmss: {}",
            value, e
        ))
    })
}

/// Local wall time of the earliest modified input, or `None` when no
/// input exposes a modification time.
pub fn burst_start_time<P: AsRef<Path>>(paths: &[P]) -> Option<NaiveDateTime> {
    paths
        .iter()
        .filter_map(|path| {
            let modified = fs::metadata(path).and_then(|m| m.modified());
            match modified {
                Ok(time) => Some(time),
                Err(e) => {
                    log::debug!("No modification time for {:?}: {}", path.as_ref(), e);
                    None
                }
            }
        })
        .min()
        .map(|time| DateTime::<Local>::from(time).naive_local())
}

/// Save a merged frame under `dir`, creating it if needed.
///
/// Returns the full path of the written file.
pub fn save_frame<P: AsRef<Path>>(
    frame: &Frame,
    dir: P,
    prefix: &str,
    timestamp: &NaiveDateTime,
    quality: u8,
) -> Result<PathBuf, FocusStackError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let path = dir.join(output_file_name(prefix, timestamp));
    log::info!(
        "Saving {}x{} frame to {:?} (quality {})",
        frame.width(),
        frame.height(),
        path,
        quality
    );

    let mut writer = BufWriter::new(File::create(&path)?);
    write_jpeg(frame, &mut writer, quality)?;
    writer.flush()?;

    log::info!("Merged frame saved to: {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 42)
            .unwrap()
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(
            output_file_name("ZeroBlur", &timestamp()),
            "ZeroBlur_20240307_090542.jpg"
        );
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempdir().unwrap();
        let out_dir = dir.path().join("a").join("b");
        let frame = Frame::filled(16, 8, 3, 128).unwrap();

        let path = save_frame(&frame, &out_dir, "ZeroBlur", &timestamp(), 100).unwrap();

        assert_eq!(path, out_dir.join("ZeroBlur_20240307_090542.jpg"));
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 8));
        let px = decoded.get_pixel(8, 4);
        assert!((px[0] as i32 - 128).abs() <= 2);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("20240307_090542").unwrap(), timestamp());
        assert!(matches!(
            parse_timestamp("2024-03-07"),
            Err(FocusStackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_burst_start_time_uses_earliest_input() {
        let dir = tempdir().unwrap();
        let early = dir.path().join("early.jpg");
        let late = dir.path().join("late.jpg");
        let epoch = std::time::UNIX_EPOCH;
        for (path, secs) in [(&late, 1_700_000_600), (&early, 1_700_000_000)] {
            let file = File::create(path).unwrap();
            file.set_modified(epoch + std::time::Duration::from_secs(secs))
                .unwrap();
        }
        let missing = dir.path().join("missing.jpg");

        let start = burst_start_time(&[late, missing, early]).unwrap();

        let earliest = epoch + std::time::Duration::from_secs(1_700_000_000);
        let expected = DateTime::<Local>::from(earliest).naive_local();
        assert_eq!(start, expected);
    }

    #[test]
    fn test_burst_start_time_without_inputs() {
        let dir = tempdir().unwrap();
        assert!(burst_start_time(&[dir.path().join("nope.jpg")]).is_none());
        assert!(burst_start_time::<PathBuf>(&[]).is_none());
    }

    #[test]
    fn test_grayscale_frames_encode() {
        let frame = Frame::filled(4, 4, 1, 200).unwrap();
        let bytes = encode_jpeg(&frame, 90).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_quality_out_of_range() {
        let frame = Frame::filled(4, 4, 3, 0).unwrap();
        assert!(matches!(
            encode_jpeg(&frame, 0),
            Err(FocusStackError::InvalidConfig(_))
        ));
        assert!(encode_jpeg(&frame, 101).is_err());
    }
}
