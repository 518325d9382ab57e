/*!
 * Pipeline orchestrator.
 *
 * Drives every chunk of a file through
 * segment → proofread → translate → review → {improve → review}*,
 * bounds each agent call with a timeout and a shared concurrency limit,
 * and merges finished chunks back into the file's records by position.
 */

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::Semaphore;

use crate::agents::{AgentContext, AgentOutput, AgentRole, AgentSet, ReviewIssue, ReviewResult};
use crate::app_config::{Config, StageToggles};
use crate::errors::{AgentError, AgentErrorKind, FormatError};
use crate::pipeline::cancel::CancellationFlag;
use crate::pipeline::chunker::{self, BudgetMeasure, Chunk, ChunkBoundary};
use crate::pipeline::merge::{content_lines, merge_chunk, OutputMode};
use crate::pipeline::state::{
    ChunkReport, ChunkState, ChunkStatus, DegradeReason, FileRun, FileStatus, PipelineRunState,
};
use crate::subtitle_processor::{renumber, SubtitleCollection, SubtitleEntry};

/// Configuration for the pipeline, built explicitly by the caller.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_language: String,
    pub target_language: String,

    /// Budget per chunk, in `budget_measure` units
    pub chunk_budget: usize,
    pub budget_measure: BudgetMeasure,
    pub chunk_boundary: ChunkBoundary,

    /// Simultaneous agent calls across everything sharing this orchestrator
    pub max_concurrency: usize,

    /// Improver calls allowed per chunk
    pub max_retries: usize,

    /// Upper bound for a single agent call
    pub call_timeout: Duration,

    /// Extra attempts for timed out or rate limited calls
    pub retry_count: u32,

    /// Base of the exponential backoff between attempts
    pub retry_backoff: Duration,

    pub stages: StageToggles,

    /// Give the reviewer the translator's input for comparison
    pub review_with_source: bool,

    pub output_mode: OutputMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_language: "en".to_string(),
            target_language: "zh".to_string(),
            chunk_budget: 2500,
            budget_measure: BudgetMeasure::Characters,
            chunk_boundary: ChunkBoundary::SentenceEnd,
            max_concurrency: 5,
            max_retries: 2,
            call_timeout: Duration::from_secs(120),
            retry_count: 3,
            retry_backoff: Duration::from_millis(1000),
            stages: StageToggles::default(),
            review_with_source: true,
            output_mode: OutputMode::Translation,
        }
    }
}

impl PipelineConfig {
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            ..Default::default()
        }
    }

    /// Pipeline settings from the application configuration
    pub fn from_config(config: &Config) -> Self {
        let p = &config.pipeline;
        Self {
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
            chunk_budget: p.chunk_budget,
            budget_measure: p.budget_measure,
            chunk_boundary: p.chunk_boundary,
            max_concurrency: p.max_concurrency,
            max_retries: p.max_retries,
            call_timeout: Duration::from_secs(p.call_timeout_secs),
            retry_count: p.retry_count,
            retry_backoff: Duration::from_millis(p.retry_backoff_ms),
            stages: p.stages.clone(),
            review_with_source: p.review_with_source,
            output_mode: p.output_mode,
        }
    }

    pub fn with_chunk_budget(mut self, budget: usize) -> Self {
        self.chunk_budget = budget;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_count: u32, backoff: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_stages(mut self, stages: StageToggles) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_chunk_boundary(mut self, boundary: ChunkBoundary) -> Self {
        self.chunk_boundary = boundary;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }
}

/// Progress notifications for display layers
#[derive(Debug, Clone)]
pub enum PipelineProgress {
    FileStarted { file_id: String, chunks: usize },
    ChunkFinished { file_id: String, chunk_id: usize, done: usize, total: usize },
    FileFinished { file_id: String, status: FileStatus },
}

pub type ProgressCallback = Arc<dyn Fn(PipelineProgress) + Send + Sync>;

/// Why a stage produced no output
#[derive(Debug)]
enum StageError {
    Agent(AgentError),
    Cancelled,
}

/// A finished chunk, handed back to the task that owns the run state
struct ChunkOutcome {
    chunk: Chunk,
    /// Final text, `None` when the original text is kept
    text: Option<String>,
    report: ChunkReport,
}

/// Runs the staged pipeline over subtitle records.
pub struct PipelineOrchestrator {
    agents: AgentSet,
    config: PipelineConfig,
    limiter: Arc<Semaphore>,
    cancel: CancellationFlag,
    progress: Option<ProgressCallback>,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig, agents: AgentSet) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            agents,
            config,
            limiter: Arc::new(Semaphore::new(permits)),
            cancel: CancellationFlag::new(),
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle that cancels every run of this orchestrator
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    fn notify(&self, event: PipelineProgress) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    fn base_context(&self) -> AgentContext {
        AgentContext::new(&self.config.source_language, &self.config.target_language)
    }

    /// Parse, process and serialize one SRT document
    pub async fn translate_document(&self, file_id: &str, raw: &str) -> Result<(String, FileRun), FormatError> {
        let records = SubtitleCollection::parse_srt_string(raw)?;
        let run = self.run_file(file_id, records).await;
        let output = SubtitleCollection::serialize(&run.records);
        Ok((output, run))
    }

    /// Run the pipeline over free text, one line per unit
    pub async fn translate_text(&self, text: &str) -> (String, ChunkReport) {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let chunk = Chunk {
            id: 0,
            range: 0..lines.len(),
            combined_text: lines.join("\n"),
        };
        let outcome = self.process_chunk(chunk, 1, lines.len().max(1)).await;
        let output = outcome.text.unwrap_or_else(|| outcome.chunk.combined_text.clone());
        (output, outcome.report)
    }

    /// Run every chunk of a file through the pipeline.
    ///
    /// Chunks run concurrently; results are merged by position, so the
    /// output keeps record order whatever the completion order.
    pub async fn run_file(&self, file_id: &str, records: Vec<SubtitleEntry>) -> FileRun {
        self.run_file_within(file_id, records, None).await
    }

    /// Like [`run_file`](Self::run_file), with an optional deadline for the
    /// whole file.
    ///
    /// When the deadline passes, chunks still in flight are dropped and no
    /// further chunks start. Finished chunks are merged as usual; the others
    /// keep their source text and are reported as cancelled.
    pub async fn run_file_within(&self, file_id: &str, records: Vec<SubtitleEntry>, limit: Option<Duration>) -> FileRun {
        let chunks = chunker::split_with(
            &records,
            self.config.chunk_budget,
            self.config.budget_measure,
            self.config.chunk_boundary,
        );
        let total = chunks.len();
        let mut state = PipelineRunState::new(file_id, records, total);
        let spans: Vec<(usize, usize)> = chunks
            .iter()
            .map(|chunk| {
                let records = chunk.records(&state.records);
                (records.first().map_or(0, |r| r.seq_num), records.last().map_or(0, |r| r.seq_num))
            })
            .collect();

        info!(
            "Run {}: {} ({} records in {} chunks)",
            state.run_id,
            file_id,
            state.records.len(),
            total
        );
        self.notify(PipelineProgress::FileStarted { file_id: file_id.to_string(), chunks: total });

        let deadline = limit.map(|limit| tokio::time::Instant::now() + limit);
        let mut reports: Vec<Option<ChunkReport>> = vec![None; total];
        let mut pending = chunks.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let window = self.config.max_concurrency.max(1);
        let mut done = 0;

        loop {
            while in_flight.len() < window {
                let Some(chunk) = pending.next() else { break };
                let (first_seq, last_seq) = spans[chunk.id];
                state.mark_in_progress(chunk.id);
                in_flight.push(self.process_chunk(chunk, first_seq, last_seq));
            }

            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, in_flight.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            "Run {}: {} reached its deadline with {} of {} chunks finished",
                            state.run_id, file_id, done, total
                        );
                        break;
                    }
                },
                None => in_flight.next().await,
            };
            let Some(outcome) = next else { break };
            let ChunkOutcome { chunk, text, mut report } = outcome;

            if let Some(text) = text {
                if let Err(err) = merge_chunk(&chunk, &text, &mut state.records, self.config.output_mode) {
                    warn!("{}: {}; keeping original text for records {}-{}", file_id, err, report.first_seq, report.last_seq);
                    report.status = ChunkStatus::Failed;
                    report.degradation = Some(DegradeReason::Merge(err));
                }
            } else {
                warn!(
                    "{}: chunk {} fell back to original text ({})",
                    file_id,
                    chunk.id,
                    report.label()
                );
            }

            state.finish(&report);
            done += 1;
            self.notify(PipelineProgress::ChunkFinished {
                file_id: file_id.to_string(),
                chunk_id: chunk.id,
                done,
                total,
            });
            reports[chunk.id] = Some(report);
        }
        drop(in_flight);

        // Only a passed deadline leaves chunks without a report
        for (chunk_id, report) in reports.iter_mut().enumerate() {
            if report.is_none() {
                let (first_seq, last_seq) = spans[chunk_id];
                let cancelled = ChunkReport::cancelled(chunk_id, first_seq, last_seq);
                state.finish(&cancelled);
                *report = Some(cancelled);
            }
        }

        debug!(
            "Run {}: {} succeeded, {} failed",
            state.run_id,
            state.count(ChunkStatus::Succeeded),
            state.count(ChunkStatus::Failed)
        );

        renumber(&mut state.records);
        let run = FileRun {
            run_id: state.run_id,
            file_id: state.file_id,
            records: state.records,
            chunks: reports.into_iter().flatten().collect(),
        };

        info!("Run {}: {} finished with status {}", run.run_id, run.file_id, run.status());
        self.notify(PipelineProgress::FileFinished { file_id: file_id.to_string(), status: run.status() });
        run
    }

    /// Drive one chunk through the state machine
    async fn process_chunk(&self, chunk: Chunk, first_seq: usize, last_seq: usize) -> ChunkOutcome {
        let expected_lines = chunk.len();
        let stages = &self.config.stages;
        let base = self.base_context();

        let mut state = ChunkState::Pending;
        let mut text = chunk.combined_text.clone();
        let mut translator_input: Option<String> = None;
        let mut open_issues: Vec<ReviewIssue> = Vec::new();
        let mut improve_calls = 0;
        let mut review_rounds = 0;
        let mut quality_unconfirmed = false;
        let mut degradation: Option<DegradeReason> = None;

        while !state.is_terminal() {
            debug!("chunk {} ({}-{}): {}", chunk.id, first_seq, last_seq, state);

            state = match state {
                ChunkState::Pending if stages.segment => ChunkState::Segmenting,
                ChunkState::Pending if stages.proofread => ChunkState::Proofreading,
                ChunkState::Pending => ChunkState::Translating,

                ChunkState::Segmenting | ChunkState::Proofreading | ChunkState::Translating => {
                    let role = match state {
                        ChunkState::Segmenting => AgentRole::Segmenter,
                        ChunkState::Proofreading => AgentRole::Proofreader,
                        _ => AgentRole::Translator,
                    };
                    match self.call_agent(role, &text, &base).await {
                        Ok(output) => {
                            if role == AgentRole::Translator {
                                translator_input = Some(std::mem::take(&mut text));
                            }
                            text = output.into_text();
                            match state {
                                ChunkState::Segmenting if stages.proofread => ChunkState::Proofreading,
                                ChunkState::Segmenting | ChunkState::Proofreading => ChunkState::Translating,
                                _ if stages.review => ChunkState::Reviewing,
                                _ => ChunkState::Done,
                            }
                        }
                        Err(StageError::Cancelled) => {
                            degradation = Some(DegradeReason::Cancelled);
                            ChunkState::FailedPermanently
                        }
                        Err(StageError::Agent(error)) => {
                            warn!("chunk {}: {} failed permanently: {}", chunk.id, role, error);
                            degradation = Some(DegradeReason::AgentFailure { role, error });
                            ChunkState::FailedPermanently
                        }
                    }
                }

                ChunkState::Reviewing => {
                    review_rounds += 1;
                    let source_text = if self.config.review_with_source { translator_input.clone() } else { None };
                    let context = base.clone().with_source_text(source_text);

                    let verdict = match self.call_agent(AgentRole::Reviewer, &text, &context).await {
                        Ok(output) => Ok(ReviewResult::parse(&output.into_text()).unwrap_or_else(|err| {
                            warn!("chunk {}: {}; treating as needs_improvement", chunk.id, err);
                            ReviewResult::needs_improvement(vec![ReviewIssue::unparsable(&err.message)])
                        })),
                        Err(StageError::Agent(error)) if error.kind == AgentErrorKind::MalformedResponse => {
                            warn!("chunk {}: {}; treating as needs_improvement", chunk.id, error);
                            Ok(ReviewResult::needs_improvement(vec![ReviewIssue::unparsable(&error.message)]))
                        }
                        Err(err) => Err(err),
                    };

                    match verdict {
                        Ok(verdict) if verdict.is_approved() => ChunkState::Done,
                        Ok(_) if improve_calls >= self.config.max_retries => {
                            info!(
                                "chunk {}: still needs improvement after {} improve calls, keeping best effort",
                                chunk.id, improve_calls
                            );
                            quality_unconfirmed = true;
                            ChunkState::Done
                        }
                        Ok(verdict) => {
                            open_issues = verdict.issues;
                            ChunkState::Improving
                        }
                        Err(StageError::Cancelled) => {
                            degradation = Some(DegradeReason::Cancelled);
                            ChunkState::FailedPermanently
                        }
                        Err(StageError::Agent(error)) => {
                            warn!("chunk {}: review unavailable: {}", chunk.id, error);
                            quality_unconfirmed = true;
                            degradation = Some(DegradeReason::ReviewUnavailable { role: AgentRole::Reviewer, error });
                            ChunkState::Done
                        }
                    }
                }

                ChunkState::Improving => {
                    improve_calls += 1;
                    let context = base.clone().with_prior_issues(std::mem::take(&mut open_issues));

                    match self.call_agent(AgentRole::Improver, &text, &context).await {
                        Ok(output) => {
                            let improved = content_lines(&output.into_text(), expected_lines);
                            let actual = improved.len();
                            if actual == expected_lines {
                                text = improved.join("\n");
                                ChunkState::Reviewing
                            } else {
                                warn!(
                                    "chunk {}: improver returned {} lines instead of {}, keeping previous text",
                                    chunk.id, actual, expected_lines
                                );
                                quality_unconfirmed = true;
                                degradation = Some(DegradeReason::ImproverMisaligned { expected: expected_lines, actual });
                                ChunkState::Done
                            }
                        }
                        Err(StageError::Cancelled) => {
                            degradation = Some(DegradeReason::Cancelled);
                            ChunkState::FailedPermanently
                        }
                        Err(StageError::Agent(error)) => {
                            warn!("chunk {}: improver unavailable: {}", chunk.id, error);
                            quality_unconfirmed = true;
                            degradation = Some(DegradeReason::ReviewUnavailable { role: AgentRole::Improver, error });
                            ChunkState::Done
                        }
                    }
                }

                ChunkState::Done | ChunkState::FailedPermanently => state,
            };
        }

        let succeeded = state == ChunkState::Done;
        let report = ChunkReport {
            chunk_id: chunk.id,
            first_seq,
            last_seq,
            final_state: state,
            status: if succeeded { ChunkStatus::Succeeded } else { ChunkStatus::Failed },
            quality_unconfirmed,
            improve_calls,
            review_rounds,
            degradation,
        };

        ChunkOutcome {
            chunk,
            text: succeeded.then_some(text),
            report,
        }
    }

    /// One agent call with cancellation check, concurrency permit,
    /// timeout and backoff retries for transient failures.
    async fn call_agent(&self, role: AgentRole, text: &str, context: &AgentContext) -> Result<AgentOutput, StageError> {
        let agent = self.agents.get(role);
        let mut attempt: u32 = 0;

        loop {
            self.cancel.checkpoint().map_err(|_| StageError::Cancelled)?;

            let result = {
                let _permit = self.limiter.acquire().await.map_err(|_| StageError::Cancelled)?;
                match tokio::time::timeout(self.config.call_timeout, agent.invoke(text, context)).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::timeout(self.config.call_timeout)),
                }
            };

            match result {
                Ok(output) => return Ok(output),
                Err(error) if error.is_retryable() && attempt < self.config.retry_count => {
                    let delay = self.backoff_delay(attempt, &error);
                    warn!(
                        "{} call failed ({}), retry {}/{} in {:?}",
                        role,
                        error.kind,
                        attempt + 1,
                        self.config.retry_count,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(StageError::Agent(error)),
            }
        }
    }

    /// `base * 2^attempt` plus jitter of up to half the base
    fn backoff_delay(&self, attempt: u32, error: &AgentError) -> Duration {
        let base = self.config.retry_backoff;
        if base.is_zero() {
            return Duration::ZERO;
        }
        let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = rand::rng().random_range(0..=(base.as_millis() as u64 / 2));
        exponential + error.kind.recommended_delay() + Duration::from_millis(jitter_ms)
    }
}
