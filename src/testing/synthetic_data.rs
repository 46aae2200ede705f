//! Synthetic focus bursts
//!
//! Deterministic frames for offline testing and benchmarking: flat fields,
//! smooth textures suited to alignment, and bursts where only one frame
//! holds a sharp subject.

use crate::errors::FocusStackError;
use crate::types::Frame;

/// Uniform frame with every sample set to `value`.
pub fn solid_frame(
    width: usize,
    height: usize,
    channels: usize,
    value: u8,
) -> Result<Frame, FocusStackError> {
    Frame::filled(width, height, channels, value)
}

/// Smooth multi-frequency RGB texture. `seed` varies the phase so frames
/// with different seeds differ everywhere.
pub fn textured_frame(width: usize, height: usize, seed: u32) -> Result<Frame, FocusStackError> {
    let phase = seed as f32 * 0.7;
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let (fx, fy) = (x as f32, y as f32);
            let v = 128.0
                + 55.0 * (fx * 0.21 + phase).sin() * (fy * 0.17).cos()
                + 30.0 * ((fx + fy) * 0.07 - phase).sin();
            let v = v.clamp(0.0, 255.0);
            data.push(v as u8);
            data.push((v * 0.8 + 20.0) as u8);
            data.push((255.0 - v) as u8);
        }
    }
    Frame::from_vec(width, height, 3, data)
}

/// Content moved by whole pixels: output `(x, y)` shows input
/// `(x - dx, y - dy)`, edges replicated.
pub fn shifted_frame(frame: &Frame, dx: i32, dy: i32) -> Frame {
    let (width, height) = frame.dimensions();
    let channels = frame.channels();
    let mut data = Vec::with_capacity(frame.data().len());
    for y in 0..height {
        let sy = (y as i32 - dy).clamp(0, height as i32 - 1) as usize;
        for x in 0..width {
            let sx = (x as i32 - dx).clamp(0, width as i32 - 1) as usize;
            data.extend_from_slice(frame.pixel(sx, sy));
        }
    }
    Frame::from_raw(width, height, channels, data)
}

/// Box blur with the given radius, edges replicated. Stands in for an out
/// of focus capture.
pub fn box_blurred(frame: &Frame, radius: usize) -> Frame {
    let (width, height) = frame.dimensions();
    let channels = frame.channels();
    let r = radius as i64;
    let area = ((2 * r + 1) * (2 * r + 1)) as u32;
    let mut data = Vec::with_capacity(frame.data().len());
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            for c in 0..channels {
                let mut sum = 0u32;
                for ky in -r..=r {
                    let sy = (y + ky).clamp(0, height as i64 - 1) as usize;
                    for kx in -r..=r {
                        let sx = (x + kx).clamp(0, width as i64 - 1) as usize;
                        sum += frame.get(sx, sy, c) as u32;
                    }
                }
                data.push(((sum + area / 2) / area) as u8);
            }
        }
    }
    Frame::from_raw(width, height, channels, data)
}

/// Mid-gray frame with a high-contrast checkered square of side `size`
/// whose top-left corner is `(x0, y0)`.
pub fn sharp_square_frame(
    width: usize,
    height: usize,
    x0: usize,
    y0: usize,
    size: usize,
) -> Result<Frame, FocusStackError> {
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let inside = (x0..x0 + size).contains(&x) && (y0..y0 + size).contains(&y);
            let v = if !inside {
                128
            } else if ((x - x0) / 2 + (y - y0) / 2) % 2 == 0 {
                255
            } else {
                0
            };
            data.extend_from_slice(&[v, v, v]);
        }
    }
    Frame::from_vec(width, height, 3, data)
}

/// Burst of `n` frames where only `sharp_index` shows the square in focus;
/// the others are the same scene box blurred.
pub fn focus_burst(
    width: usize,
    height: usize,
    n: usize,
    sharp_index: usize,
) -> Result<Vec<Frame>, FocusStackError> {
    let size = width.min(height) / 2;
    let sharp = sharp_square_frame(width, height, (width - size) / 2, (height - size) / 2, size)?;
    let blurred = box_blurred(&sharp, 3);
    Ok((0..n)
        .map(|i| {
            if i == sharp_index {
                sharp.clone()
            } else {
                blurred.clone()
            }
        })
        .collect())
}
