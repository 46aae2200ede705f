//! ZeroBlur: focus stacking for macro photography
//!
//! This crate merges a burst captured at different focus distances into one
//! image that is sharp from front to back.
//!
//! # Features
//! - ECC affine alignment of every frame to the middle frame
//! - Laplacian pyramid fusion keeping the most detailed source per pixel
//! - Parallel processing with rayon
//! - JPEG output named after the burst time
//! - TOML configuration
//!
//! # Usage
//! ```rust,no_run
//! use zeroblur::focus_stack::{progress::LogSink, stack_frames, FocusStackConfig};
//!
//! # fn main() -> Result<(), zeroblur::FocusStackError> {
//! zeroblur::init_logging();
//! let frames = zeroblur::decode::load_burst_from_paths(
//!     &["near.jpg", "middle.jpg", "far.jpg"],
//!     &mut LogSink,
//! )?;
//! let result = stack_frames(frames, &FocusStackConfig::default(), &mut LogSink)?;
//! let timestamp = chrono::Local::now().naive_local();
//! zeroblur::storage::save_frame(&result.merged_frame, "out", "ZeroBlur", &timestamp, 100)?;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod decode;
pub mod errors;
pub mod focus_stack;
pub mod storage;
pub mod types;

// Testing utilities - synthetic data for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::ZeroBlurConfig;
pub use errors::FocusStackError;
pub use focus_stack::{
    stack_frames, stack_frames_traced, FocusStackConfig, FocusStackResult, PipelineStage, StackRun,
};
pub use types::{FloatImage, Frame, Image};

/// Initialize logging for the stacking pipeline
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "zeroblur=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        worker_threads: rayon::current_num_threads(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub worker_threads: usize,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "zeroblur");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
        assert!(info.worker_threads >= 1);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        assert!(std::env::var("RUST_LOG").is_ok());
    }
}
