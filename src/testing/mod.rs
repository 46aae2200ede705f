//! Testing utilities for ZeroBlur
//!
//! Provides deterministic synthetic bursts so the pipeline can be exercised
//! without real captures.

pub mod synthetic_data;

pub use synthetic_data::{
    box_blurred, focus_burst, shifted_frame, sharp_square_frame, solid_frame, textured_frame,
};
