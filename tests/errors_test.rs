#[cfg(test)]
mod error_tests {
    use std::error::Error;
    use zeroblur::errors::FocusStackError;
    use zeroblur::focus_stack::align::AlignmentError;

    #[test]
    fn test_empty_input_message() {
        let error = FocusStackError::EmptyInput;
        assert!(error.to_string().contains("at least one frame"));
    }

    #[test]
    fn test_no_valid_frame_message() {
        let error = FocusStackError::NoValidFrame { attempted: 4 };
        assert!(error.to_string().contains("none of the 4 inputs"));
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let error = FocusStackError::DimensionMismatch {
            expected: (64, 48, 3),
            got: (64, 49, 3),
        };
        assert_eq!(
            format!("{}", error),
            "Image dimension mismatch: expected 64x48x3, got 64x49x3"
        );
    }

    #[test]
    fn test_data_corruption_display() {
        let error = FocusStackError::DataCorruption {
            frame_size: 10,
            expected_size: 12,
        };
        let display_str = error.to_string();
        assert!(display_str.contains("10"));
        assert!(display_str.contains("12"));
    }

    #[test]
    fn test_error_debug_format() {
        let error = FocusStackError::InvalidConfig("Debug test".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("InvalidConfig"));
        assert!(debug_str.contains("Debug test"));
    }

    #[test]
    fn test_io_error_conversion() {
        fn read_missing() -> Result<Vec<u8>, FocusStackError> {
            Ok(std::fs::read("/definitely/not/here.jpg")?)
        }

        let error = read_missing().unwrap_err();
        assert!(matches!(error, FocusStackError::Io(_)));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_error_implements_error_trait() {
        let error = FocusStackError::Decode("bad header".to_string());
        let _: &dyn Error = &error;
        assert!(error.to_string().contains("bad header"));
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<FocusStackError>();
        assert_sync::<FocusStackError>();
        assert_send::<AlignmentError>();
        assert_sync::<AlignmentError>();
    }

    #[test]
    fn test_alignment_error_messages() {
        let errors = vec![
            AlignmentError::ZeroVariance,
            AlignmentError::SingularHessian,
            AlignmentError::Diverged,
            AlignmentError::InsufficientOverlap(3),
            AlignmentError::NumericFault("nan".to_string()),
        ];
        for error in errors {
            let message = error.to_string();
            assert!(!message.is_empty());
            assert_eq!(error.clone(), error);
        }
    }

    #[test]
    fn test_error_map_patterns() {
        fn parse_levels(raw: &str) -> Result<u32, FocusStackError> {
            raw.parse()
                .map_err(|e| FocusStackError::InvalidConfig(format!("levels: {}", e)))
        }

        assert_eq!(parse_levels("5").unwrap(), 5);
        let error = parse_levels("five").unwrap_err();
        assert!(error.to_string().starts_with("Invalid config: levels:"));
    }
}
