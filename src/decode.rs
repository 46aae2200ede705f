//! Burst decoding
//!
//! Turns encoded images (JPEG, PNG, ...) into 8-bit RGB frames. Items that
//! fail to decode are skipped and reported; the burst only fails when
//! nothing at all could be decoded.

use crate::errors::FocusStackError;
use crate::focus_stack::progress::ProgressSink;
use crate::types::Frame;
use std::path::Path;

/// Decode one encoded image into an RGB frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FocusStackError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| FocusStackError::Decode(format!("Failed to decode image: {}", e)))?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::from_vec(width as usize, height as usize, 3, rgb.into_raw())
}

/// Decode every item, keeping input order and omitting failures.
pub fn decode_burst<I, B>(items: I, sink: &mut dyn ProgressSink) -> Result<Vec<Frame>, FocusStackError>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut frames = Vec::new();
    let mut attempted = 0;

    for (index, item) in items.into_iter().enumerate() {
        attempted += 1;
        sink.report(&format!("Loading image {}...", index + 1));
        match decode_frame(item.as_ref()) {
            Ok(frame) => {
                log::debug!(
                    "Decoded image {} ({}x{})",
                    index + 1,
                    frame.width(),
                    frame.height()
                );
                frames.push(frame);
            }
            Err(e) => {
                log::warn!("Skipping image {}: {}", index + 1, e);
                sink.report(&format!("Failed to decode image {}", index + 1));
            }
        }
    }

    if frames.is_empty() {
        sink.report("No valid images loaded");
        return Err(if attempted == 0 {
            FocusStackError::EmptyInput
        } else {
            FocusStackError::NoValidFrame { attempted }
        });
    }

    log::info!("Decoded {} of {} images", frames.len(), attempted);
    Ok(frames)
}

/// Read and decode image files.
///
/// A file that cannot be read is treated like one that cannot be decoded.
pub fn load_burst_from_paths<P: AsRef<Path>>(
    paths: &[P],
    sink: &mut dyn ProgressSink,
) -> Result<Vec<Frame>, FocusStackError> {
    let contents: Vec<Vec<u8>> = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            std::fs::read(path).unwrap_or_else(|e| {
                log::warn!("Failed to read {:?}: {}", path, e);
                Vec::new()
            })
        })
        .collect();
    decode_burst(contents, sink)
}
