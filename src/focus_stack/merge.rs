/// Pyramid level fusion for focus stacking
///
/// For every pyramid level, each output pixel is copied (all channels) from
/// the frame whose level image has the largest detail magnitude there.
/// Magnitude is the absolute luminance of the level image itself. Selection
/// is purely local; the multi-scale collapse hides the seams between sources.
use super::pyramid::LaplacianPyramid;
use super::FocusStackError;
use crate::types::{FloatImage, Image, LUMA_WEIGHTS};
use rayon::prelude::*;

/// Per-pixel detail magnitude of one sample group.
#[inline]
fn detail_magnitude(px: &[f32]) -> f32 {
    let luma = if px.len() == 1 {
        px[0]
    } else {
        LUMA_WEIGHTS[0] * px[0] + LUMA_WEIGHTS[1] * px[1] + LUMA_WEIGHTS[2] * px[2]
    };
    luma.abs()
}

/// Winner index for each pixel of row `y`.
///
/// Frame 0 seeds the running maximum; a later frame only takes over where
/// it is strictly greater, so ties keep the lower index. NaN never wins.
fn row_winners(layers: &[&FloatImage], y: usize, winners: &mut [usize]) {
    let width = layers[0].width();
    let channels = layers[0].channels();
    let row_start = y * width * channels;

    for (x, winner) in winners.iter_mut().enumerate().take(width) {
        let offset = row_start + x * channels;
        let mut best = detail_magnitude(&layers[0].data()[offset..offset + channels]);
        if best.is_nan() {
            best = f32::NEG_INFINITY;
        }
        let mut best_idx = 0;
        for (idx, layer) in layers.iter().enumerate().skip(1) {
            let magnitude = detail_magnitude(&layer.data()[offset..offset + channels]);
            if magnitude > best {
                best = magnitude;
                best_idx = idx;
            }
        }
        *winner = best_idx;
    }
}

fn check_layers(layers: &[&FloatImage]) -> Result<(), FocusStackError> {
    let first = layers.first().ok_or(FocusStackError::EmptyInput)?;
    for layer in layers.iter().skip(1) {
        if !layer.same_shape(first) {
            return Err(FocusStackError::DimensionMismatch {
                expected: (first.width(), first.height(), first.channels()),
                got: (layer.width(), layer.height(), layer.channels()),
            });
        }
    }
    Ok(())
}

/// Index of the winning frame for every pixel of one level, row-major.
pub fn winner_mask(layers: &[&FloatImage]) -> Result<Vec<usize>, FocusStackError> {
    check_layers(layers)?;
    let width = layers[0].width();
    let mut mask = vec![0usize; width * layers[0].height()];
    mask.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| row_winners(layers, y, row));
    Ok(mask)
}

/// Fuse one level across frames.
///
/// All layers must share width, height and channel count.
pub fn fuse_level(layers: &[&FloatImage]) -> Result<FloatImage, FocusStackError> {
    check_layers(layers)?;
    let (width, height) = layers[0].dimensions();
    let channels = layers[0].channels();
    let stride = width * channels;
    let mut data = vec![0f32; stride * height];

    data.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let mut winners = vec![0usize; width];
            row_winners(layers, y, &mut winners);
            let row_start = y * stride;
            for (x, &winner) in winners.iter().enumerate() {
                let src = &layers[winner].data()[row_start + x * channels..][..channels];
                row[x * channels..(x + 1) * channels].copy_from_slice(src);
            }
        });

    Ok(Image::from_raw(width, height, channels, data))
}

/// Fuse whole pyramids: every detail level and the Gaussian base.
///
/// Levels are independent and fused in parallel.
pub fn fuse_pyramids(pyramids: &[LaplacianPyramid]) -> Result<LaplacianPyramid, FocusStackError> {
    let first = pyramids.first().ok_or(FocusStackError::EmptyInput)?;
    let num_levels = first.num_levels();
    if let Some(bad) = pyramids.iter().find(|p| p.num_levels() != num_levels) {
        return Err(FocusStackError::InvalidConfig(format!(
            "pyramid depth mismatch: expected {} levels, got {}",
            num_levels,
            bad.num_levels()
        )));
    }

    log::debug!(
        "Fusing {} pyramids with {} detail levels",
        pyramids.len(),
        num_levels
    );

    // Slot `num_levels` is the base.
    let mut fused = (0..=num_levels)
        .into_par_iter()
        .map(|level| {
            let layers: Vec<&FloatImage> = if level == num_levels {
                pyramids.iter().map(|p| &p.base).collect()
            } else {
                pyramids.iter().map(|p| &p.levels[level]).collect()
            };
            fuse_level(&layers)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let base = fused.pop().ok_or(FocusStackError::EmptyInput)?;
    Ok(LaplacianPyramid {
        levels: fused,
        base,
    })
}
