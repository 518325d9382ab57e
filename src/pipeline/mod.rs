/*!
 * Staged subtitle pipeline.
 *
 * Records are split into chunks, each chunk runs through the agent stages
 * as its own state machine, and finished chunks are merged back by
 * position.
 */

pub mod cancel;
pub mod chunker;
pub mod merge;
pub mod orchestrator;
pub mod state;

pub use cancel::CancellationFlag;
pub use chunker::{BudgetMeasure, Chunk, ChunkBoundary};
pub use merge::OutputMode;
pub use orchestrator::{PipelineConfig, PipelineOrchestrator, PipelineProgress, ProgressCallback};
pub use state::{ChunkReport, ChunkState, ChunkStatus, DegradeReason, FileRun, FileStatus};
