/// Image alignment module for focus stacking
///
/// Aligns every frame of a burst to the middle (reference) frame to
/// compensate for hand shake and focus breathing between captures.
/// Uses intensity based ECC (enhanced correlation coefficient) maximisation
/// over a 6 parameter affine motion model, estimated on downscaled luminance
/// and applied to the full resolution frame.
use super::burst::Burst;
use super::progress::ProgressSink;
use super::pyramid::blur_binomial;
use crate::types::{FloatImage, Frame, Image};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fewest overlapping pixels the optimizer accepts before giving up.
const MIN_OVERLAP_PIXELS: usize = 16;

/// Variance below which an image is treated as featureless.
const MIN_VARIANCE: f64 = 1e-9;

/// Alignment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Longest side of the working copy used for estimation (pixels)
    pub target_max_dim: u32,

    /// Never upscale the working copy when the frame is already smaller
    /// than `target_max_dim`
    pub clamp_downscale: bool,

    /// Maximum optimizer iterations per frame
    pub max_iterations: u32,

    /// Stop once the parameter update norm drops below this value
    pub epsilon: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            target_max_dim: 1000,
            clamp_downscale: true,
            max_iterations: 50,
            epsilon: 1e-3,
        }
    }
}

impl AlignConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.target_max_dim == 0 {
            return Err("target_max_dim must be greater than 0".to_string());
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be greater than 0".to_string());
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err("epsilon must be a positive finite number".to_string());
        }
        Ok(())
    }
}

/// Why a frame could not be aligned. Always recovered by falling back to
/// the unaligned frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignmentError {
    #[error("image has no intensity variation to correlate")]
    ZeroVariance,

    #[error("optimizer hessian is singular")]
    SingularHessian,

    #[error("correlation would be minimised; images may be uncorrelated or non-overlapping")]
    Diverged,

    #[error("warped frame overlaps the reference in only {0} pixels")]
    InsufficientOverlap(usize),

    #[error("numeric fault: {0}")]
    NumericFault(String),
}

/// 2x3 affine matrix mapping reference coordinates to source frame
/// coordinates: `src = m * [x, y, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub m: [[f64; 3]; 2],
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        }
    }

    pub fn new(m: [[f64; 3]; 2]) -> Self {
        Self { m }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            m: [[1.0, 0.0, tx], [0.0, 1.0, ty]],
        }
    }

    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.m;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    /// `(tx, ty)`
    pub fn offset(&self) -> (f64, f64) {
        (self.m[0][2], self.m[1][2])
    }

    /// Copy with only the translation column multiplied by `factor`.
    pub fn scale_translation(&self, factor: f64) -> Self {
        let mut out = *self;
        out.m[0][2] *= factor;
        out.m[1][2] *= factor;
        out
    }

    pub fn is_finite(&self) -> bool {
        self.m.iter().flatten().all(|v| v.is_finite())
    }

    pub fn determinant(&self) -> f64 {
        self.m[0][0] * self.m[1][1] - self.m[0][1] * self.m[1][0]
    }

    /// Inverse mapping (source to reference).
    pub fn invert(&self) -> Result<Self, AlignmentError> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < 1e-12 {
            return Err(AlignmentError::NumericFault(format!(
                "singular transform (determinant {:.3e})",
                det
            )));
        }
        let [[a, b, tx], [c, d, ty]] = self.m;
        let inv_det = 1.0 / det;
        let ia = d * inv_det;
        let ib = -b * inv_det;
        let ic = -c * inv_det;
        let id = a * inv_det;
        Ok(Self {
            m: [
                [ia, ib, -(ia * tx + ib * ty)],
                [ic, id, -(ic * tx + id * ty)],
            ],
        })
    }

    /// Largest absolute element difference.
    pub fn max_abs_diff(&self, other: &AffineTransform) -> f64 {
        self.m
            .iter()
            .flatten()
            .zip(other.m.iter().flatten())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// Additive update in `[a00, a10, a01, a11, a02, a12]` order, matching
    /// the column order of [`affine_jacobian`].
    fn apply_update(&mut self, delta: &[f64; 6]) {
        self.m[0][0] += delta[0];
        self.m[1][0] += delta[1];
        self.m[0][1] += delta[2];
        self.m[1][1] += delta[3];
        self.m[0][2] += delta[4];
        self.m[1][2] += delta[5];
    }
}

/// Result of one ECC estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct EccEstimate {
    pub transform: AffineTransform,
    /// Correlation coefficient at the last evaluated warp (-1..=1)
    pub correlation: f64,
    pub iterations: u32,
    /// False when the iteration budget ran out first
    pub converged: bool,
}

/// Per-frame alignment outcome, one slot per input frame.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignOutcome {
    /// The reference frame, passed through untouched
    Reference,
    /// Alignment disabled; frame used as captured
    Skipped,
    /// Frame was warped with the full resolution transform
    Aligned {
        transform: AffineTransform,
        correlation: f64,
        iterations: u32,
        converged: bool,
    },
    /// Estimation failed; the unaligned frame was kept
    Fallback { reason: AlignmentError },
}

impl AlignOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, AlignOutcome::Fallback { .. })
    }
}

/// Frames after alignment, in input order.
#[derive(Debug, Clone)]
pub struct AlignedBurst {
    pub frames: Vec<Frame>,
    pub outcomes: Vec<AlignOutcome>,
    pub reference_index: usize,
}

impl AlignedBurst {
    pub fn fallback_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fallback()).count()
    }
}

/// Index of the reference frame for a burst of `n` frames: `floor(n / 2)`.
pub fn reference_index(n: usize) -> usize {
    n / 2
}

/// Working-copy scale for a reference of the given size.
pub fn alignment_scale(width: usize, height: usize, config: &AlignConfig) -> f64 {
    let longest = width.max(height).max(1) as f64;
    let scale = config.target_max_dim as f64 / longest;
    if config.clamp_downscale {
        scale.min(1.0)
    } else {
        scale
    }
}

/// Align every frame of the burst to its reference frame.
///
/// Non-reference frames are processed in parallel; each worker owns exactly
/// one output slot. A frame whose estimation fails is kept unaligned and
/// reported, never aborting the batch.
pub fn align_frames(
    burst: Burst,
    config: &AlignConfig,
    sink: &mut dyn ProgressSink,
) -> AlignedBurst {
    let reference_index = burst.reference_index();
    let (width, height, _) = burst.shape();
    let scale = alignment_scale(width, height, config);

    log::info!(
        "Aligning {} frames to reference {} (working scale {:.4})",
        burst.len(),
        reference_index,
        scale
    );
    sink.report(&format!(
        "Aligning {} images to reference {}...",
        burst.len(),
        reference_index + 1
    ));

    let template = prepare_working_image(burst.reference(), scale);

    let (frames, outcomes): (Vec<Frame>, Vec<AlignOutcome>) = burst
        .into_frames()
        .into_par_iter()
        .enumerate()
        .map(|(idx, frame)| {
            if idx == reference_index {
                return (frame, AlignOutcome::Reference);
            }
            align_one(idx, frame, &template, scale, width, height, config)
        })
        .unzip();

    for (idx, outcome) in outcomes.iter().enumerate() {
        match outcome {
            AlignOutcome::Reference | AlignOutcome::Skipped => {}
            AlignOutcome::Aligned { correlation, .. } => sink.report(&format!(
                "Aligned image {} (correlation {:.4})",
                idx + 1,
                correlation
            )),
            AlignOutcome::Fallback { reason } => sink.report(&format!(
                "ECC failed for image {}, using original. Error: {}",
                idx + 1,
                reason
            )),
        }
    }

    AlignedBurst {
        frames,
        outcomes,
        reference_index,
    }
}

fn align_one(
    idx: usize,
    frame: Frame,
    template: &FloatImage,
    scale: f64,
    width: usize,
    height: usize,
    config: &AlignConfig,
) -> (Frame, AlignOutcome) {
    log::debug!("Aligning frame {} to reference", idx);

    let input = prepare_working_image(&frame, scale);
    let estimate = estimate_transform(template, &input, config.max_iterations, config.epsilon)
        .and_then(|estimate| {
            let transform = estimate.transform.scale_translation(1.0 / scale);
            if !transform.is_finite() {
                return Err(AlignmentError::NumericFault(
                    "non-finite transform after rescaling".to_string(),
                ));
            }
            transform.invert()?;
            Ok(EccEstimate {
                transform,
                ..estimate
            })
        });

    match estimate {
        Ok(estimate) => {
            let (tx, ty) = estimate.transform.offset();
            log::debug!(
                "Frame {} alignment: translation=({:.2}, {:.2}), correlation={:.4}, iterations={}",
                idx,
                tx,
                ty,
                estimate.correlation,
                estimate.iterations
            );
            let aligned = warp_affine(&frame, &estimate.transform, width, height);
            (
                aligned,
                AlignOutcome::Aligned {
                    transform: estimate.transform,
                    correlation: estimate.correlation,
                    iterations: estimate.iterations,
                    converged: estimate.converged,
                },
            )
        }
        Err(reason) => {
            log::warn!(
                "Alignment failed for frame {}, using unaligned original: {}",
                idx,
                reason
            );
            (frame, AlignOutcome::Fallback { reason })
        }
    }
}

/// Luminance, resampled by `scale` and lightly smoothed for estimation.
pub fn prepare_working_image(frame: &Frame, scale: f64) -> FloatImage {
    let luma = frame.luminance();
    let resized = if (scale - 1.0).abs() < f64::EPSILON {
        luma
    } else {
        let new_w = ((frame.width() as f64 * scale).round() as usize).max(1);
        let new_h = ((frame.height() as f64 * scale).round() as usize).max(1);
        resize_area(&luma, new_w, new_h)
    };
    blur_binomial(&resized)
}

/// Estimate the affine warp that maps `template` coordinates into `input`
/// such that `input(W(x)) ~ template(x)`, starting from identity.
///
/// Forward additive ECC: each iteration warps the input, solves the
/// Gauss-Newton system of the zero-mean normalised correlation and updates
/// the six parameters. Running out of iterations is not an error.
pub fn estimate_transform(
    template: &FloatImage,
    input: &FloatImage,
    max_iterations: u32,
    epsilon: f64,
) -> Result<EccEstimate, AlignmentError> {
    let (tw, th) = template.dimensions();
    let (iw, ih) = input.dimensions();
    if template.channels() != 1 || input.channels() != 1 {
        return Err(AlignmentError::NumericFault(
            "ECC needs single channel images".to_string(),
        ));
    }

    let (grad_x, grad_y) = gradients(input);
    let pixel_count = tw * th;
    let mut warped = vec![0f64; pixel_count];
    let mut warped_gx = vec![0f64; pixel_count];
    let mut warped_gy = vec![0f64; pixel_count];
    let mut valid = vec![false; pixel_count];

    let mut transform = AffineTransform::identity();
    let mut correlation = f64::NAN;
    let mut iterations = 0;
    let mut converged = false;

    let max_x = (iw - 1) as f64;
    let max_y = (ih - 1) as f64;

    while iterations < max_iterations {
        iterations += 1;

        // Warp input and its gradients onto the template grid.
        let mut count = 0usize;
        for y in 0..th {
            for x in 0..tw {
                let idx = y * tw + x;
                let (sx, sy) = transform.apply(x as f64, y as f64);
                if sx >= 0.0 && sy >= 0.0 && sx <= max_x && sy <= max_y {
                    warped[idx] = sample_bilinear(input, sx, sy);
                    warped_gx[idx] = sample_bilinear(&grad_x, sx, sy);
                    warped_gy[idx] = sample_bilinear(&grad_y, sx, sy);
                    valid[idx] = true;
                    count += 1;
                } else {
                    valid[idx] = false;
                }
            }
        }
        if count < MIN_OVERLAP_PIXELS {
            return Err(AlignmentError::InsufficientOverlap(count));
        }

        let (template_mean, image_mean) = masked_means(template, &warped, &valid, count);

        let mut hessian = [[0f64; 6]; 6];
        let mut image_projection = [0f64; 6];
        let mut template_projection = [0f64; 6];
        let mut template_sq = 0f64;
        let mut image_sq = 0f64;
        let mut cross = 0f64;

        for y in 0..th {
            for x in 0..tw {
                let idx = y * tw + x;
                if !valid[idx] {
                    continue;
                }
                let t = template.data()[idx] as f64 - template_mean;
                let i = warped[idx] - image_mean;
                let jac = affine_jacobian(x as f64, y as f64, warped_gx[idx], warped_gy[idx]);

                for r in 0..6 {
                    image_projection[r] += jac[r] * i;
                    template_projection[r] += jac[r] * t;
                    for c in r..6 {
                        hessian[r][c] += jac[r] * jac[c];
                    }
                }
                template_sq += t * t;
                image_sq += i * i;
                cross += t * i;
            }
        }
        for r in 0..6 {
            for c in 0..r {
                hessian[r][c] = hessian[c][r];
            }
        }

        if template_sq / count as f64 <= MIN_VARIANCE || image_sq / count as f64 <= MIN_VARIANCE {
            return Err(AlignmentError::ZeroVariance);
        }

        correlation = cross / (template_sq.sqrt() * image_sq.sqrt());
        if !correlation.is_finite() {
            return Err(AlignmentError::NumericFault(
                "correlation coefficient is not finite".to_string(),
            ));
        }

        let image_projection_hessian =
            solve_6x6(&hessian, &image_projection).ok_or(AlignmentError::SingularHessian)?;

        let lambda_n = image_sq - dot6(&image_projection, &image_projection_hessian);
        let lambda_d = cross - dot6(&template_projection, &image_projection_hessian);
        if lambda_d.is_nan() || lambda_d <= 0.0 {
            return Err(AlignmentError::Diverged);
        }
        let lambda = lambda_n / lambda_d;

        // J^T (lambda * t - i) expands to lambda * J^T t - J^T i.
        let mut error_projection = [0f64; 6];
        for r in 0..6 {
            error_projection[r] = lambda * template_projection[r] - image_projection[r];
        }

        let delta = solve_6x6(&hessian, &error_projection).ok_or(AlignmentError::SingularHessian)?;
        if delta.iter().any(|v| !v.is_finite()) {
            return Err(AlignmentError::NumericFault(
                "non-finite parameter update".to_string(),
            ));
        }

        transform.apply_update(&delta);

        if dot6(&delta, &delta).sqrt() < epsilon {
            converged = true;
            break;
        }
    }

    if !transform.is_finite() {
        return Err(AlignmentError::NumericFault(
            "non-finite transform".to_string(),
        ));
    }

    Ok(EccEstimate {
        transform,
        correlation,
        iterations,
        converged,
    })
}

/// Inverse warp: every output pixel samples `frame` at `transform(x, y)`
/// with bilinear interpolation. Samples outside the source read as 0.
pub fn warp_affine(
    frame: &Frame,
    transform: &AffineTransform,
    width: usize,
    height: usize,
) -> Frame {
    let channels = frame.channels();
    let row_len = width * channels;
    let mut data = vec![0u8; row_len * height];

    data.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let mut px = [0f64; 3];
            for x in 0..width {
                let (sx, sy) = transform.apply(x as f64, y as f64);
                sample_bilinear_border(frame, sx, sy, &mut px[..channels]);
                for c in 0..channels {
                    row[x * channels + c] = px[c].round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    Image::from_raw(width, height, channels, data)
}

/// Area-averaging resample of a single or multi channel float image.
///
/// Each output pixel is the coverage-weighted mean of the source pixels its
/// footprint overlaps, which keeps mean intensity intact when shrinking.
pub fn resize_area(src: &FloatImage, new_width: usize, new_height: usize) -> FloatImage {
    let channels = src.channels();
    let (w, h) = src.dimensions();
    if (w, h) == (new_width, new_height) {
        return src.clone();
    }

    let x_weights = area_weights(w, new_width);
    let y_weights = area_weights(h, new_height);

    // Horizontal pass.
    let mut horizontal = vec![0f32; new_width * h * channels];
    for y in 0..h {
        for (ox, taps) in x_weights.iter().enumerate() {
            for c in 0..channels {
                let mut acc = 0f32;
                for &(sx, weight) in taps {
                    acc += src.get(sx, y, c) * weight;
                }
                horizontal[(y * new_width + ox) * channels + c] = acc;
            }
        }
    }

    // Vertical pass.
    let mut data = vec![0f32; new_width * new_height * channels];
    for (oy, taps) in y_weights.iter().enumerate() {
        for x in 0..new_width {
            for c in 0..channels {
                let mut acc = 0f32;
                for &(sy, weight) in taps {
                    acc += horizontal[(sy * new_width + x) * channels + c] * weight;
                }
                data[(oy * new_width + x) * channels + c] = acc;
            }
        }
    }

    Image::from_raw(new_width, new_height, channels, data)
}

/// For each destination index, the source indices its footprint covers and
/// the fraction of the footprint each one contributes.
fn area_weights(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f32)>> {
    let ratio = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|i| {
            let start = i as f64 * ratio;
            let end = (start + ratio).min(src_len as f64);
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src_len);
            let mut taps = Vec::with_capacity(last - first);
            for j in first..last {
                let overlap = (end.min(j as f64 + 1.0) - start.max(j as f64)).max(0.0);
                if overlap > 0.0 {
                    taps.push((j, (overlap / ratio) as f32));
                }
            }
            taps
        })
        .collect()
}

/// Central-difference gradients with clamped borders.
fn gradients(img: &FloatImage) -> (FloatImage, FloatImage) {
    let (w, h) = img.dimensions();
    let mut gx = vec![0f32; w * h];
    let mut gy = vec![0f32; w * h];
    for y in 0..h {
        let y0 = y.saturating_sub(1);
        let y1 = (y + 1).min(h - 1);
        for x in 0..w {
            let x0 = x.saturating_sub(1);
            let x1 = (x + 1).min(w - 1);
            gx[y * w + x] = 0.5 * (img.get(x1, y, 0) - img.get(x0, y, 0));
            gy[y * w + x] = 0.5 * (img.get(x, y1, 0) - img.get(x, y0, 0));
        }
    }
    (Image::from_raw(w, h, 1, gx), Image::from_raw(w, h, 1, gy))
}

/// Columns: d/da00, d/da10, d/da01, d/da11, d/da02, d/da12.
#[inline]
fn affine_jacobian(x: f64, y: f64, gx: f64, gy: f64) -> [f64; 6] {
    [gx * x, gy * x, gx * y, gy * y, gx, gy]
}

fn masked_means(
    template: &FloatImage,
    warped: &[f64],
    valid: &[bool],
    count: usize,
) -> (f64, f64) {
    let mut t_sum = 0f64;
    let mut i_sum = 0f64;
    for (idx, &ok) in valid.iter().enumerate() {
        if ok {
            t_sum += template.data()[idx] as f64;
            i_sum += warped[idx];
        }
    }
    (t_sum / count as f64, i_sum / count as f64)
}

/// Bilinear sample of a single channel image; caller keeps `(x, y)` inside.
#[inline]
fn sample_bilinear(img: &FloatImage, x: f64, y: f64) -> f64 {
    let (w, h) = img.dimensions();
    let x0 = (x.floor() as usize).min(w - 1);
    let y0 = (y.floor() as usize).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let top = img.get(x0, y0, 0) as f64 * (1.0 - fx) + img.get(x1, y0, 0) as f64 * fx;
    let bottom = img.get(x0, y1, 0) as f64 * (1.0 - fx) + img.get(x1, y1, 0) as f64 * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Bilinear sample of every channel with a constant zero border.
#[inline]
fn sample_bilinear_border(frame: &Frame, x: f64, y: f64, out: &mut [f64]) {
    out.iter_mut().for_each(|v| *v = 0.0);
    if !x.is_finite() || !y.is_finite() {
        return;
    }
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];
    for (tx, ty, weight) in taps {
        if weight == 0.0 || tx < 0 || ty < 0 || tx >= w || ty >= h {
            continue;
        }
        let px = frame.pixel(tx as usize, ty as usize);
        for (acc, &v) in out.iter_mut().zip(px) {
            *acc += weight * v as f64;
        }
    }
}

#[inline]
fn dot6(a: &[f64; 6], b: &[f64; 6]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Solve `a * x = b` by Gaussian elimination with partial pivoting.
/// Returns `None` when the system is numerically singular.
fn solve_6x6(a: &[[f64; 6]; 6], b: &[f64; 6]) -> Option<[f64; 6]> {
    let mut m = *a;
    let mut rhs = *b;
    let scale = m
        .iter()
        .flatten()
        .fold(0.0f64, |acc, v| acc.max(v.abs()))
        .max(f64::MIN_POSITIVE);

    for col in 0..6 {
        let pivot_row = (col..6).max_by(|&r1, &r2| {
            m[r1][col]
                .abs()
                .partial_cmp(&m[r2][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        let pivot = m[pivot_row][col];
        if !pivot.is_finite() || pivot.abs() <= scale * 1e-14 {
            return None;
        }
        m.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        for row in (col + 1)..6 {
            let factor = m[row][col] / m[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..6 {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0f64; 6];
    for row in (0..6).rev() {
        let mut acc = rhs[row];
        for k in (row + 1)..6 {
            acc -= m[row][k] * x[k];
        }
        x[row] = acc / m[row][row];
    }
    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}
