//! Property-Based Tests for the pyramid and fusion stages
//!
//! These tests verify invariants of pyramid decomposition, collapse and
//! per-pixel selection using proptest for input generation and shrinking.
//!
//! Run with: cargo test --test pyramid_props

use proptest::prelude::*;
use zeroblur::focus_stack::merge::{fuse_level, fuse_pyramids, winner_mask};
use zeroblur::focus_stack::pyramid::{pyr_down, pyr_up, pyramid_dimensions, LaplacianPyramid};
use zeroblur::focus_stack::reconstruct::{collapse, collapse_to_frame};
use zeroblur::types::{FloatImage, Frame};

fn frame_strategy() -> impl Strategy<Value = Frame> {
    (1usize..40, 1usize..40, prop_oneof![Just(1usize), Just(3usize)]).prop_flat_map(
        |(w, h, c)| {
            proptest::collection::vec(any::<u8>(), w * h * c)
                .prop_map(move |data| Frame::from_vec(w, h, c, data).unwrap())
        },
    )
}

fn plane_strategy(width: usize, height: usize) -> impl Strategy<Value = FloatImage> {
    proptest::collection::vec(-300.0f32..300.0, width * height)
        .prop_map(move |data| FloatImage::from_vec(width, height, 1, data).unwrap())
}

// ═══════════════════════════════════════════════════════════════════════════
// PYRAMID GEOMETRY
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: level k is ceil(W / 2^k) x ceil(H / 2^k)
    #[test]
    fn level_sizes_follow_ceil_halving(
        width in 1usize..2000,
        height in 1usize..2000,
        levels in 0usize..12,
    ) {
        let dims = pyramid_dimensions(width, height, levels);
        prop_assert_eq!(dims.len(), levels + 1);
        for (k, &(w, h)) in dims.iter().enumerate() {
            let div = 1usize << k;
            prop_assert_eq!(w, width.div_ceil(div));
            prop_assert_eq!(h, height.div_ceil(div));
            prop_assert!(w >= 1 && h >= 1);
        }
    }

    /// INVARIANT: built pyramids have exactly the predicted level sizes
    #[test]
    fn built_levels_match_dimensions(frame in frame_strategy(), levels in 0usize..7) {
        let pyramid = LaplacianPyramid::build(&frame, levels);
        let dims = pyramid_dimensions(frame.width(), frame.height(), levels);
        prop_assert_eq!(pyramid.num_levels(), levels);
        for (level, &expected) in pyramid.levels.iter().zip(dims.iter()) {
            prop_assert_eq!(level.dimensions(), expected);
            prop_assert_eq!(level.channels(), frame.channels());
        }
        prop_assert_eq!(pyramid.base.dimensions(), dims[levels]);
    }

    /// INVARIANT: pyr_up hits any requested size, pyr_down halves with ceil
    #[test]
    fn resampling_sizes(width in 1usize..64, height in 1usize..64) {
        let img = FloatImage::filled(width, height, 3, 1.0).unwrap();
        let down = pyr_down(&img);
        prop_assert_eq!(down.dimensions(), (width.div_ceil(2), height.div_ceil(2)));
        let up = pyr_up(&down, width, height);
        prop_assert_eq!(up.dimensions(), (width, height));
        // Constants survive both directions.
        prop_assert!(up.data().iter().all(|v| (v - 1.0).abs() < 1e-5));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DECOMPOSITION AND COLLAPSE
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// INVARIANT: collapse(decompose(frame)) == frame after rounding
    #[test]
    fn single_frame_round_trip(frame in frame_strategy(), levels in 0usize..6) {
        let pyramid = LaplacianPyramid::build(&frame, levels);
        prop_assert_eq!(collapse_to_frame(&pyramid), frame);
    }

    /// INVARIANT: fusing a pyramid with copies of itself changes nothing
    #[test]
    fn fusing_identical_pyramids_is_identity(
        frame in frame_strategy(),
        copies in 1usize..4,
    ) {
        let pyramid = LaplacianPyramid::build(&frame, 3);
        let stack = vec![pyramid.clone(); copies];
        let fused = fuse_pyramids(&stack).unwrap();
        prop_assert_eq!(collapse(&fused), collapse(&pyramid));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SELECTION
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: the winner has the largest magnitude, first index on ties
    #[test]
    fn winner_is_first_maximum(
        a in plane_strategy(6, 5),
        b in plane_strategy(6, 5),
        c in plane_strategy(6, 5),
    ) {
        let layers = [&a, &b, &c];
        let mask = winner_mask(&layers).unwrap();
        for (idx, &winner) in mask.iter().enumerate() {
            let magnitudes: Vec<f32> = layers.iter().map(|l| l.data()[idx].abs()).collect();
            let best = magnitudes.iter().cloned().fold(f32::MIN, f32::max);
            let first = magnitudes.iter().position(|&m| m == best).unwrap();
            prop_assert_eq!(winner, first);
        }
    }

    /// INVARIANT: fused samples always come from one of the inputs
    #[test]
    fn fused_values_come_from_inputs(a in plane_strategy(7, 3), b in plane_strategy(7, 3)) {
        let fused = fuse_level(&[&a, &b]).unwrap();
        for (idx, v) in fused.data().iter().enumerate() {
            prop_assert!(*v == a.data()[idx] || *v == b.data()[idx]);
        }
    }

    /// INVARIANT: repeated selection gives identical output
    #[test]
    fn selection_is_deterministic(a in plane_strategy(4, 4), b in plane_strategy(4, 4)) {
        let first = fuse_level(&[&a, &b]).unwrap();
        let second = fuse_level(&[&a, &b]).unwrap();
        prop_assert_eq!(first, second);
    }
}
