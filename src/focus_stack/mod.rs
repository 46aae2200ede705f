pub mod align;
/// Focus Stacking Module
///
/// Merges a burst captured at different focus distances into one image with
/// extended depth of field:
/// 1. Align every frame to the middle (reference) frame (ECC, affine)
/// 2. Decompose each aligned frame into a Laplacian pyramid
/// 3. Per level, keep the pixel with the most detail across frames
/// 4. Collapse the fused pyramid back to full resolution
///
/// This is useful for macro photography where depth of field is limited.
pub mod burst;
pub mod merge;
pub mod progress;
pub mod pyramid;
pub mod reconstruct;

pub use crate::errors::FocusStackError;

use crate::types::Frame;
use align::{AlignConfig, AlignOutcome, AlignedBurst};
use burst::Burst;
use progress::ProgressSink;
use pyramid::LaplacianPyramid;
use rayon::prelude::*;
use std::time::Instant;

/// Upper bound on pyramid depth; beyond this every level is 1x1 for any
/// realistic frame.
pub const MAX_BLEND_LEVELS: u32 = 16;

/// Focus stack configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FocusStackConfig {
    /// Enable alignment compensation
    pub enable_alignment: bool,

    /// Laplacian pyramid levels (3-7 recommended)
    pub blend_levels: u32,

    /// Alignment estimation settings
    pub align: AlignConfig,
}

impl Default for FocusStackConfig {
    fn default() -> Self {
        Self {
            enable_alignment: true,
            blend_levels: 5,
            align: AlignConfig::default(),
        }
    }
}

impl FocusStackConfig {
    pub fn validate(&self) -> Result<(), FocusStackError> {
        if self.blend_levels > MAX_BLEND_LEVELS {
            return Err(FocusStackError::InvalidConfig(format!(
                "blend_levels must be at most {}, got {}",
                MAX_BLEND_LEVELS, self.blend_levels
            )));
        }
        self.align.validate().map_err(FocusStackError::InvalidConfig)
    }
}

/// Stages of one stacking run.
///
/// `Idle -> Aligning -> PyramidBuilding -> Fusing -> Reconstructing -> Done`,
/// with `Aborted` reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PipelineStage {
    Idle,
    Aligning,
    PyramidBuilding,
    Fusing,
    Reconstructing,
    Done,
    Aborted,
}

impl PipelineStage {
    /// Following stage on success, `None` for terminal stages.
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Idle => Some(PipelineStage::Aligning),
            PipelineStage::Aligning => Some(PipelineStage::PyramidBuilding),
            PipelineStage::PyramidBuilding => Some(PipelineStage::Fusing),
            PipelineStage::Fusing => Some(PipelineStage::Reconstructing),
            PipelineStage::Reconstructing => Some(PipelineStage::Done),
            PipelineStage::Done | PipelineStage::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Aligning => "aligning",
            PipelineStage::PyramidBuilding => "pyramid_building",
            PipelineStage::Fusing => "fusing",
            PipelineStage::Reconstructing => "reconstructing",
            PipelineStage::Done => "done",
            PipelineStage::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current stage and every stage visited.
#[derive(Debug, Clone)]
struct StageTracker {
    current: PipelineStage,
    trail: Vec<PipelineStage>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            current: PipelineStage::Idle,
            trail: vec![PipelineStage::Idle],
        }
    }

    fn advance(&mut self) -> PipelineStage {
        if let Some(next) = self.current.next() {
            log::debug!("Pipeline stage {} -> {}", self.current, next);
            self.current = next;
            self.trail.push(next);
        }
        self.current
    }

    fn abort(&mut self) {
        if !self.current.is_terminal() {
            log::debug!("Pipeline stage {} -> aborted", self.current);
            self.current = PipelineStage::Aborted;
            self.trail.push(PipelineStage::Aborted);
        }
    }
}

/// Focus stack result containing the merged image and metadata
#[derive(Debug, Clone)]
pub struct FocusStackResult {
    /// The final merged frame
    pub merged_frame: Frame,

    /// Input index used as alignment reference; metadata should be taken
    /// from this frame's source
    pub reference_index: usize,

    /// Number of source images used
    pub num_sources: usize,

    /// Per-frame alignment outcome, in input order
    pub alignment: Vec<AlignOutcome>,

    /// Frames kept unaligned after a failed estimation
    pub fallback_count: usize,

    /// Stages visited, `Idle` first and `Done` last
    pub stages: Vec<PipelineStage>,

    /// Processing time (ms)
    pub processing_time_ms: u64,
}

impl FocusStackResult {
    pub fn summary(&self) -> FocusStackSummary {
        FocusStackSummary {
            width: self.merged_frame.width(),
            height: self.merged_frame.height(),
            reference_index: self.reference_index,
            num_sources: self.num_sources,
            fallback_count: self.fallback_count,
            processing_time_ms: self.processing_time_ms,
        }
    }
}

/// Serializable digest of a [`FocusStackResult`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FocusStackSummary {
    pub width: usize,
    pub height: usize,
    pub reference_index: usize,
    pub num_sources: usize,
    pub fallback_count: usize,
    pub processing_time_ms: u64,
}

/// Outcome of a stacking run together with the stages it went through.
#[derive(Debug)]
pub struct StackRun {
    pub result: Result<FocusStackResult, FocusStackError>,

    /// Stages visited, `Idle` first and `Done` or `Aborted` last
    pub stages: Vec<PipelineStage>,
}

impl StackRun {
    /// Stage the run ended in.
    pub fn final_stage(&self) -> PipelineStage {
        self.stages.last().copied().unwrap_or(PipelineStage::Idle)
    }
}

/// Run the whole pipeline on decoded frames.
///
/// Frames must be non-empty and share one shape. Per-frame alignment
/// failures fall back to the unaligned frame; only invalid input or config
/// ends the run with an error.
pub fn stack_frames(
    frames: Vec<Frame>,
    config: &FocusStackConfig,
    sink: &mut dyn ProgressSink,
) -> Result<FocusStackResult, FocusStackError> {
    stack_frames_traced(frames, config, sink).result
}

/// Same as [`stack_frames`], but the stage trail survives a failed run.
pub fn stack_frames_traced(
    frames: Vec<Frame>,
    config: &FocusStackConfig,
    sink: &mut dyn ProgressSink,
) -> StackRun {
    let start_time = Instant::now();
    let mut stages = StageTracker::new();

    let result = match run_stages(frames, config, sink, &mut stages) {
        Ok((merged_frame, aligned)) => {
            let processing_time_ms = start_time.elapsed().as_millis() as u64;
            log::info!("Focus stack complete in {}ms", processing_time_ms);
            let fallback_count = aligned.fallback_count();
            Ok(FocusStackResult {
                merged_frame,
                reference_index: aligned.reference_index,
                num_sources: aligned.outcomes.len(),
                alignment: aligned.outcomes,
                fallback_count,
                stages: stages.trail.clone(),
                processing_time_ms,
            })
        }
        Err(e) => {
            stages.abort();
            log::error!("Focus stacking aborted: {}", e);
            sink.report(&format!("Error: {}", e));
            Err(e)
        }
    };

    StackRun {
        result,
        stages: stages.trail,
    }
}

fn run_stages(
    frames: Vec<Frame>,
    config: &FocusStackConfig,
    sink: &mut dyn ProgressSink,
    stages: &mut StageTracker,
) -> Result<(Frame, AlignedBurst), FocusStackError> {
    config.validate()?;

    sink.report(&format!(
        "Starting focus stacking with {} images (Laplacian Pyramid)",
        frames.len()
    ));
    if frames.is_empty() {
        sink.report("No images to process");
        return Err(FocusStackError::EmptyInput);
    }
    let burst = Burst::new(frames)?;
    log::info!(
        "Stacking {} frames, reference {}, {} blend levels",
        burst.len(),
        burst.reference_index(),
        config.blend_levels
    );

    stages.advance();
    let mut aligned = if config.enable_alignment {
        sink.report("Aligning images using ECC...");
        align::align_frames(burst, &config.align, sink)
    } else {
        sink.report("Alignment disabled, using frames as captured");
        skip_alignment(burst)
    };
    if aligned.fallback_count() > 0 {
        log::warn!(
            "{} of {} frames kept unaligned",
            aligned.fallback_count(),
            aligned.frames.len()
        );
    }

    stages.advance();
    let levels = config.blend_levels as usize;
    sink.report("Merging images (Laplacian Pyramid Fusion)...");
    sink.report("Building Gaussian Pyramids...");
    sink.report("Building Laplacian Pyramids...");
    let frames = std::mem::take(&mut aligned.frames);
    let pyramids: Vec<LaplacianPyramid> = frames
        .into_par_iter()
        .map(|frame| LaplacianPyramid::build(&frame, levels))
        .collect();

    stages.advance();
    sink.report("Fusing Pyramids...");
    let fused = merge::fuse_pyramids(&pyramids)?;
    drop(pyramids);

    stages.advance();
    sink.report("Collapsing Pyramid...");
    let merged = reconstruct::collapse_to_frame(&fused);

    stages.advance();
    Ok((merged, aligned))
}

fn skip_alignment(burst: Burst) -> AlignedBurst {
    let reference_index = burst.reference_index();
    let frames = burst.into_frames();
    let outcomes = (0..frames.len())
        .map(|idx| {
            if idx == reference_index {
                AlignOutcome::Reference
            } else {
                AlignOutcome::Skipped
            }
        })
        .collect();
    AlignedBurst {
        frames,
        outcomes,
        reference_index,
    }
}
