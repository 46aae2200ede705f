use thiserror::Error;

/// Errors that end a stacking run or reject its inputs.
///
/// Per-frame alignment problems are not represented here; they are recovered
/// inside the aligner (see [`crate::focus_stack::align::AlignmentError`]).
#[derive(Debug, Error)]
pub enum FocusStackError {
    #[error("Empty input: focus stacking needs at least one frame")]
    EmptyInput,

    #[error("No valid frame: none of the {attempted} inputs could be decoded")]
    NoValidFrame { attempted: usize },

    #[error(
        "Image dimension mismatch: expected {}x{}x{}, got {}x{}x{}",
        expected.0, expected.1, expected.2, got.0, got.1, got.2
    )]
    DimensionMismatch {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("Frame data corruption: got {frame_size} samples, expected {expected_size}")]
    DataCorruption {
        frame_size: usize,
        expected_size: usize,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
