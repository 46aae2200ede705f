/// Pyramid collapse
///
/// Inverse of the Laplacian decomposition: expand the running image to the
/// next finer level's exact size and add that level's detail, coarsest to
/// finest, then quantise back to 8 bits.
use super::pyramid::{add_in_place, pyr_up, LaplacianPyramid};
use crate::types::{FloatImage, Frame};

/// Collapse to a float image at level 0 resolution.
pub fn collapse(pyramid: &LaplacianPyramid) -> FloatImage {
    let mut current = pyramid.base.clone();
    for level in pyramid.levels.iter().rev() {
        let (w, h) = level.dimensions();
        let mut expanded = pyr_up(&current, w, h);
        add_in_place(&mut expanded, level);
        current = expanded;
    }
    current
}

/// Collapse and convert with saturating rounding.
///
/// Non-finite samples are reported and written as 0; they do not affect any
/// other pixel of the output.
pub fn collapse_to_frame(pyramid: &LaplacianPyramid) -> Frame {
    let image = collapse(pyramid);
    let bad = image.count_non_finite();
    if bad > 0 {
        log::warn!(
            "Collapsed image has {} non-finite samples; writing them as 0",
            bad
        );
    }
    image.to_u8_saturating()
}
