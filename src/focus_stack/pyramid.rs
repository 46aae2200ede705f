/// Gaussian and Laplacian pyramids
///
/// Level 0 is the full resolution frame promoted to `f32`. Each further
/// level is a 5-tap binomial blur followed by dropping odd rows and columns,
/// so level `k + 1` is `ceil(w / 2) x ceil(h / 2)` of level `k`. Expansion
/// always targets an explicit size, which keeps decomposition and collapse
/// exact for odd dimensions.
use crate::types::{FloatImage, Frame, Image};
use rayon::prelude::*;

/// Binomial kernel `[1 4 6 4 1] / 16`.
const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Successively blurred and halved copies of one frame, finest first.
#[derive(Debug, Clone)]
pub struct GaussianPyramid {
    pub levels: Vec<FloatImage>,
}

impl GaussianPyramid {
    /// Build `num_levels + 1` levels from an 8-bit frame.
    pub fn build(frame: &Frame, num_levels: usize) -> Self {
        Self::build_from_float(frame.to_f32(), num_levels)
    }

    pub fn build_from_float(base: FloatImage, num_levels: usize) -> Self {
        let mut levels = Vec::with_capacity(num_levels + 1);
        levels.push(base);
        for _ in 0..num_levels {
            let next = match levels.last() {
                Some(prev) => pyr_down(prev),
                None => break,
            };
            levels.push(next);
        }
        Self { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &FloatImage {
        &self.levels[level]
    }

    /// Coarsest level.
    pub fn base(&self) -> &FloatImage {
        &self.levels[self.levels.len() - 1]
    }
}

/// Band-pass detail levels plus the coarsest Gaussian level as residual.
#[derive(Debug, Clone)]
pub struct LaplacianPyramid {
    /// `levels[k] = gaussian[k] - pyr_up(gaussian[k + 1])`, finest first
    pub levels: Vec<FloatImage>,
    /// Coarsest Gaussian level
    pub base: FloatImage,
}

impl LaplacianPyramid {
    /// Decompose a frame into `num_levels` detail levels and a base.
    pub fn build(frame: &Frame, num_levels: usize) -> Self {
        Self::from_gaussian(GaussianPyramid::build(frame, num_levels))
    }

    pub fn from_gaussian(gaussian: GaussianPyramid) -> Self {
        let mut g = gaussian.levels;
        let mut levels = Vec::with_capacity(g.len().saturating_sub(1));
        for k in 0..g.len().saturating_sub(1) {
            let (w, h) = g[k].dimensions();
            let expanded = pyr_up(&g[k + 1], w, h);
            levels.push(subtract(&g[k], &expanded));
        }
        // g always holds at least level 0.
        let base = g.swap_remove(g.len() - 1);
        Self { levels, base }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }
}

/// Dimensions of every Gaussian level for a `width x height` input.
pub fn pyramid_dimensions(width: usize, height: usize, num_levels: usize) -> Vec<(usize, usize)> {
    let mut dims = Vec::with_capacity(num_levels + 1);
    let (mut w, mut h) = (width, height);
    dims.push((w, h));
    for _ in 0..num_levels {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        dims.push((w, h));
    }
    dims
}

/// Blur then keep even rows and columns. Output is `ceil(w/2) x ceil(h/2)`.
pub fn pyr_down(src: &FloatImage) -> FloatImage {
    let blurred = blur_binomial(src);
    let (w, h) = src.dimensions();
    let channels = src.channels();
    let (nw, nh) = (w.div_ceil(2), h.div_ceil(2));
    let mut data = vec![0f32; nw * nh * channels];

    data.par_chunks_mut(nw * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..nw {
                for c in 0..channels {
                    row[x * channels + c] = blurred.get(x * 2, y * 2, c);
                }
            }
        });

    Image::from_raw(nw, nh, channels, data)
}

/// Expand to exactly `target_width x target_height`.
///
/// Even output samples take `(1, 6, 1) / 8` of the source neighbourhood and
/// odd samples the mean of the two bracketing source samples, which is the
/// zero-insertion upsample filtered by the same binomial kernel. Borders
/// replicate.
pub fn pyr_up(src: &FloatImage, target_width: usize, target_height: usize) -> FloatImage {
    let (w, h) = src.dimensions();
    let channels = src.channels();

    // Horizontal pass: w x h -> target_width x h.
    let mut horizontal = vec![0f32; target_width * h * channels];
    horizontal
        .par_chunks_mut(target_width * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..target_width {
                for c in 0..channels {
                    row[x * channels + c] = expand_tap(x, w, |i| src.get(i, y, c));
                }
            }
        });

    // Vertical pass: target_width x h -> target_width x target_height.
    let stride = target_width * channels;
    let mut data = vec![0f32; stride * target_height];
    data.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for (idx, out) in row.iter_mut().enumerate() {
                *out = expand_tap(y, h, |i| horizontal[i * stride + idx]);
            }
        });

    Image::from_raw(target_width, target_height, channels, data)
}

/// One output sample of the 1D expansion at position `pos` over a source of
/// length `len`, reading source samples through `at`.
#[inline]
fn expand_tap(pos: usize, len: usize, at: impl Fn(usize) -> f32) -> f32 {
    let last = len - 1;
    let i = (pos / 2).min(last);
    if pos % 2 == 0 {
        let left = at(i.saturating_sub(1));
        let right = at((i + 1).min(last));
        (left + 6.0 * at(i) + right) / 8.0
    } else {
        0.5 * (at(i) + at((i + 1).min(last)))
    }
}

/// Separable 5-tap binomial blur with reflect-101 borders, same size.
pub fn blur_binomial(src: &FloatImage) -> FloatImage {
    let (w, h) = src.dimensions();
    let channels = src.channels();
    let stride = w * channels;

    let mut horizontal = vec![0f32; stride * h];
    horizontal
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w {
                for c in 0..channels {
                    let mut acc = 0f32;
                    for (k, weight) in KERNEL.iter().enumerate() {
                        let sx = reflect_101(x as isize + k as isize - 2, w);
                        acc += weight * src.get(sx, y, c);
                    }
                    row[x * channels + c] = acc;
                }
            }
        });

    let mut data = vec![0f32; stride * h];
    data.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for (idx, out) in row.iter_mut().enumerate() {
                let mut acc = 0f32;
                for (k, weight) in KERNEL.iter().enumerate() {
                    let sy = reflect_101(y as isize + k as isize - 2, h);
                    acc += weight * horizontal[sy * stride + idx];
                }
                *out = acc;
            }
        });

    Image::from_raw(w, h, channels, data)
}

/// Mirror an index into `0..len` without repeating the edge sample
/// (`dcb|abcd|cba`).
#[inline]
fn reflect_101(mut i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let n = len as isize;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

fn subtract(a: &FloatImage, b: &FloatImage) -> FloatImage {
    debug_assert!(a.same_shape(b));
    let data = a
        .data()
        .iter()
        .zip(b.data().iter())
        .map(|(x, y)| x - y)
        .collect();
    Image::from_raw(a.width(), a.height(), a.channels(), data)
}

/// `acc += other`, elementwise.
pub(crate) fn add_in_place(acc: &mut FloatImage, other: &FloatImage) {
    debug_assert!(acc.same_shape(other));
    acc.data_mut()
        .par_iter_mut()
        .zip(other.data().par_iter())
        .for_each(|(a, b)| *a += b);
}
