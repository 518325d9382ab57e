/*!
 * Batch processing of subtitle files.
 *
 * Every file runs through the same orchestrator, so the agent call limit
 * is shared by the whole batch. A file that cannot be read or parsed is
 * reported and never stops the others. A file that runs past its deadline
 * is still written, with its unfinished chunks left untranslated.
 */

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use log::{error, info, warn};

use crate::errors::AppError;
use crate::file_utils::FileManager;
use crate::pipeline::{ChunkReport, FileStatus, PipelineOrchestrator};
use crate::subtitle_processor::SubtitleCollection;

/// Where and how batch output is written
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Output directory, `None` to write next to each input
    pub output_dir: Option<PathBuf>,
    /// Root whose structure is mirrored below `output_dir`
    pub input_root: Option<PathBuf>,
    /// Extension of the files to pick up
    pub extension: String,
    pub target_language: String,
    /// Deadline for one file, `None` for no limit
    pub file_timeout: Option<Duration>,
}

impl BatchOptions {
    pub fn new(target_language: &str) -> Self {
        Self {
            output_dir: None,
            input_root: None,
            extension: "srt".to_string(),
            target_language: target_language.to_string(),
            file_timeout: Some(Duration::from_secs(300)),
        }
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_input_root(mut self, input_root: Option<PathBuf>) -> Self {
        self.input_root = input_root;
        self
    }

    pub fn with_file_timeout(mut self, file_timeout: Option<Duration>) -> Self {
        self.file_timeout = file_timeout;
        self
    }
}

/// Outcome of one input file
#[derive(Debug)]
pub struct FileReport {
    pub input: PathBuf,
    /// Written output, `None` when nothing was written
    pub output: Option<PathBuf>,
    pub status: FileStatus,
    pub error: Option<AppError>,
    pub chunks: Vec<ChunkReport>,
}

impl FileReport {
    fn failed(input: &Path, error: AppError) -> Self {
        Self {
            input: input.to_path_buf(),
            output: None,
            status: FileStatus::Failed,
            error: Some(error),
            chunks: Vec::new(),
        }
    }

    fn skipped(input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            output: None,
            status: FileStatus::Skipped,
            error: None,
            chunks: Vec::new(),
        }
    }

    /// Error kind label, if the file failed
    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(AppError::kind)
    }

    /// One status line, followed by one line per degraded chunk
    pub fn describe(&self) -> String {
        let mut text = format!("{}: {}", self.input.display(), self.status);
        if let Some(err) = &self.error {
            let _ = write!(text, " ({}: {})", err.kind(), err);
        }
        for chunk in self.chunks.iter().filter(|c| c.is_degraded()) {
            let _ = write!(
                text,
                "\n  chunk {} (cues {}-{}): {}",
                chunk.chunk_id, chunk.first_seq, chunk.last_seq,
                chunk.label()
            );
        }
        text
    }
}

/// Per-file outcomes in input order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(FileStatus::Failed) > 0
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} files: {} succeeded, {} degraded, {} failed, {} skipped",
            self.files.len(),
            self.count(FileStatus::Succeeded),
            self.count(FileStatus::Degraded),
            self.count(FileStatus::Failed),
            self.count(FileStatus::Skipped)
        );
        for file in &self.files {
            text.push('\n');
            text.push_str(&file.describe());
        }
        text
    }
}

pub type FileCallback = Arc<dyn Fn(&FileReport) + Send + Sync>;

/// Runs many subtitle files through one orchestrator
pub struct BatchController {
    orchestrator: Arc<PipelineOrchestrator>,
    options: BatchOptions,
    on_file_done: Option<FileCallback>,
}

impl BatchController {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, options: BatchOptions) -> Self {
        Self {
            orchestrator,
            options,
            on_file_done: None,
        }
    }

    pub fn with_file_callback(mut self, callback: FileCallback) -> Self {
        self.on_file_done = Some(callback);
        self
    }

    /// Subtitle files below `dir` with the configured extension
    pub fn discover(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        FileManager::find_files(dir, &self.options.extension, recursive)
    }

    /// Process every file; the report keeps input order
    pub async fn process(&self, files: &[PathBuf]) -> BatchReport {
        info!("Processing {} files", files.len());
        let window = self.orchestrator.config().max_concurrency.max(1);

        let mut results: Vec<(usize, FileReport)> = stream::iter(files.iter().enumerate())
            .map(|(index, path)| async move {
                let report = self.process_file(path).await;
                if let Some(callback) = &self.on_file_done {
                    callback(&report);
                }
                (index, report)
            })
            .buffer_unordered(window)
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        BatchReport {
            files: results.into_iter().map(|(_, report)| report).collect(),
        }
    }

    /// Process one file, turning every failure into a report
    pub async fn process_file(&self, path: &Path) -> FileReport {
        let report = match self.try_process_file(path).await {
            Ok(report) => report,
            Err(err) => {
                error!("{}: {}", path.display(), err);
                FileReport::failed(path, err)
            }
        };
        if report.status == FileStatus::Degraded {
            warn!("{}: finished degraded", path.display());
        }
        report
    }

    async fn try_process_file(&self, path: &Path) -> Result<FileReport, AppError> {
        let content = tokio::fs::read_to_string(path).await?;
        if content.trim_start_matches('\u{feff}').trim().is_empty() {
            info!("{}: empty, skipped", path.display());
            return Ok(FileReport::skipped(path));
        }

        let records = SubtitleCollection::parse_srt_string(&content)?;
        let file_id = path.display().to_string();

        let run = self
            .orchestrator
            .run_file_within(&file_id, records, self.options.file_timeout)
            .await;

        let output = FileManager::output_path(
            path,
            self.options.input_root.as_deref(),
            self.options.output_dir.as_deref(),
            &self.options.target_language,
        );
        FileManager::write_to_file(&output, &SubtitleCollection::serialize(&run.records))
            .map_err(|e| AppError::File(format!("{:#}", e)))?;
        info!("{} -> {} ({})", path.display(), output.display(), run.status());

        Ok(FileReport {
            input: path.to_path_buf(),
            output: Some(output),
            status: run.status(),
            error: None,
            chunks: run.chunks,
        })
    }
}
