use super::align::reference_index;
use crate::errors::FocusStackError;
/// Burst frame store
///
/// Holds the ordered frames of one focus burst together with the index of
/// the reference frame. Construction enforces the shared-shape invariant so
/// later stages can index every frame with the reference's geometry.
use crate::types::Frame;

/// Ordered, non-empty set of equally sized frames.
#[derive(Debug, Clone)]
pub struct Burst {
    frames: Vec<Frame>,
    reference_index: usize,
}

impl Burst {
    /// Validate and take ownership of the frames.
    ///
    /// Fails with `EmptyInput` for zero frames and `DimensionMismatch` when
    /// any frame differs from the first in width, height or channel count.
    pub fn new(frames: Vec<Frame>) -> Result<Self, FocusStackError> {
        let first = frames.first().ok_or(FocusStackError::EmptyInput)?;
        let expected = (first.width(), first.height(), first.channels());

        for frame in frames.iter().skip(1) {
            let got = (frame.width(), frame.height(), frame.channels());
            if got != expected {
                return Err(FocusStackError::DimensionMismatch { expected, got });
            }
        }

        let reference_index = reference_index(frames.len());
        log::debug!(
            "Burst of {} frames ({}x{}x{}), reference index {}",
            frames.len(),
            expected.0,
            expected.1,
            expected.2,
            reference_index
        );

        Ok(Self {
            frames,
            reference_index,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn reference_index(&self) -> usize {
        self.reference_index
    }

    pub fn reference(&self) -> &Frame {
        &self.frames[self.reference_index]
    }

    /// `(width, height, channels)` shared by every frame.
    pub fn shape(&self) -> (usize, usize, usize) {
        let r = self.reference();
        (r.width(), r.height(), r.channels())
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_burst_rejected() {
        assert!(matches!(Burst::new(vec![]), Err(FocusStackError::EmptyInput)));
    }

    #[test]
    fn test_reference_is_middle() {
        let frames = (0..5)
            .map(|_| Frame::filled(4, 4, 3, 10).unwrap())
            .collect();
        let burst = Burst::new(frames).unwrap();
        assert_eq!(burst.reference_index(), 2);
        assert_eq!(burst.shape(), (4, 4, 3));
    }

    #[test]
    fn test_dimension_mismatch() {
        let frames = vec![
            Frame::filled(4, 4, 3, 10).unwrap(),
            Frame::filled(4, 5, 3, 10).unwrap(),
        ];
        let err = Burst::new(frames).unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
        assert!(matches!(
            err,
            FocusStackError::DimensionMismatch {
                expected: (4, 4, 3),
                got: (4, 5, 3)
            }
        ));
    }

    #[test]
    fn test_channel_mismatch() {
        let frames = vec![
            Frame::filled(4, 4, 3, 10).unwrap(),
            Frame::filled(4, 4, 1, 10).unwrap(),
        ];
        assert!(Burst::new(frames).is_err());
    }
}
