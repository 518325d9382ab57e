/*!
 * Per-chunk state machine and run bookkeeping.
 *
 * A chunk moves through
 * `Pending → Segmenting → Proofreading → Translating → Reviewing → {Improving → Reviewing}* → Done`
 * or ends in `FailedPermanently`. Disabled stages are passed through.
 */

use std::fmt;

use uuid::Uuid;

use crate::agents::AgentRole;
use crate::errors::{AgentError, MergeError};
use crate::subtitle_processor::SubtitleEntry;

/// Position of a chunk in the stage sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Segmenting,
    Proofreading,
    Translating,
    Reviewing,
    Improving,
    Done,
    FailedPermanently,
}

impl ChunkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::FailedPermanently)
    }

    /// The agent role invoked while in this state
    pub fn role(&self) -> Option<AgentRole> {
        match self {
            Self::Segmenting => Some(AgentRole::Segmenter),
            Self::Proofreading => Some(AgentRole::Proofreader),
            Self::Translating => Some(AgentRole::Translator),
            Self::Reviewing => Some(AgentRole::Reviewer),
            Self::Improving => Some(AgentRole::Improver),
            Self::Pending | Self::Done | Self::FailedPermanently => None,
        }
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Segmenting => "segmenting",
            Self::Proofreading => "proofreading",
            Self::Translating => "translating",
            Self::Reviewing => "reviewing",
            Self::Improving => "improving",
            Self::Done => "done",
            Self::FailedPermanently => "failed_permanently",
        };
        f.write_str(name)
    }
}

/// Coarse chunk status tracked in the run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

/// Why a chunk's contribution is not a confirmed translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    /// A transforming stage failed; the original text was kept
    AgentFailure { role: AgentRole, error: AgentError },
    /// The reviewer or improver failed; the latest translation was kept
    ReviewUnavailable { role: AgentRole, error: AgentError },
    /// The improver changed the line count; the last aligned text was kept
    ImproverMisaligned { expected: usize, actual: usize },
    /// The final text could not be realigned; the original text was kept
    Merge(MergeError),
    /// The run was cancelled before the chunk finished
    Cancelled,
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentFailure { role, error } => write!(f, "{} failed: {}", role, error),
            Self::ReviewUnavailable { role, error } => write!(f, "{} unavailable: {}", role, error),
            Self::ImproverMisaligned { expected, actual } => {
                write!(f, "improver returned {} lines, expected {}", actual, expected)
            }
            Self::Merge(err) => write!(f, "merge failed: {}", err),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of one chunk within a file run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    pub chunk_id: usize,
    /// Sequence numbers of the first and last record in the chunk
    pub first_seq: usize,
    pub last_seq: usize,
    pub final_state: ChunkState,
    pub status: ChunkStatus,
    /// The review loop ended without an approval
    pub quality_unconfirmed: bool,
    pub improve_calls: usize,
    pub review_rounds: usize,
    pub degradation: Option<DegradeReason>,
}

impl ChunkReport {
    /// A chunk that never finished; its records keep their source text
    pub fn cancelled(chunk_id: usize, first_seq: usize, last_seq: usize) -> Self {
        Self {
            chunk_id,
            first_seq,
            last_seq,
            final_state: ChunkState::FailedPermanently,
            status: ChunkStatus::Failed,
            quality_unconfirmed: false,
            improve_calls: 0,
            review_rounds: 0,
            degradation: Some(DegradeReason::Cancelled),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == ChunkStatus::Failed || self.quality_unconfirmed || self.degradation.is_some()
    }

    /// Short label used in reports
    pub fn label(&self) -> String {
        match (&self.degradation, self.quality_unconfirmed) {
            (Some(reason), _) => reason.to_string(),
            (None, true) => "quality_unconfirmed".to_string(),
            (None, false) if self.status == ChunkStatus::Succeeded => "succeeded".to_string(),
            (None, false) => "failed".to_string(),
        }
    }
}

/// State owned by the orchestrator for one file run
#[derive(Debug, Clone)]
pub struct PipelineRunState {
    pub run_id: Uuid,
    pub file_id: String,
    pub chunk_status: Vec<ChunkStatus>,
    pub retry_counts: Vec<usize>,
    pub records: Vec<SubtitleEntry>,
}

impl PipelineRunState {
    pub fn new(file_id: &str, records: Vec<SubtitleEntry>, chunk_count: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            file_id: file_id.to_string(),
            chunk_status: vec![ChunkStatus::Pending; chunk_count],
            retry_counts: vec![0; chunk_count],
            records,
        }
    }

    pub fn mark_in_progress(&mut self, chunk_id: usize) {
        self.chunk_status[chunk_id] = ChunkStatus::InProgress;
    }

    pub fn finish(&mut self, report: &ChunkReport) {
        self.chunk_status[report.chunk_id] = report.status;
        self.retry_counts[report.chunk_id] = report.improve_calls;
    }

    pub fn count(&self, status: ChunkStatus) -> usize {
        self.chunk_status.iter().filter(|s| **s == status).count()
    }
}

/// Overall status of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Succeeded,
    Degraded,
    Failed,
    /// Empty input, nothing to do
    Skipped,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Succeeded => "success",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Result of running the pipeline over one file's records
#[derive(Debug, Clone)]
pub struct FileRun {
    pub run_id: Uuid,
    pub file_id: String,
    /// Final records, renumbered 1..n
    pub records: Vec<SubtitleEntry>,
    pub chunks: Vec<ChunkReport>,
}

impl FileRun {
    pub fn status(&self) -> FileStatus {
        if self.chunks.iter().any(ChunkReport::is_degraded) {
            FileStatus::Degraded
        } else {
            FileStatus::Succeeded
        }
    }

    pub fn degraded_chunks(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunks.iter().filter(|c| c.is_degraded())
    }

    pub fn improve_calls(&self) -> usize {
        self.chunks.iter().map(|c| c.improve_calls).sum()
    }
}
