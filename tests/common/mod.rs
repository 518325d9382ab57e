/*!
 * Common test utilities for the gnosis test suite
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use gnosis::agents::{Agent, AgentRole, AgentSet, MockAgent, ReviewIssue, ReviewResult, Severity};
use gnosis::pipeline::{PipelineConfig, PipelineOrchestrator};
use gnosis::subtitle_processor::SubtitleEntry;

/// Route library logs through env_logger's test writer
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Sample SRT content with three cues
pub const SAMPLE_SRT: &str = "1
00:00:01,000 --> 00:00:04,000
This is a test subtitle.

2
00:00:05,000 --> 00:00:09,000
It contains multiple entries.

3
00:00:10,000 --> 00:00:14,000
For testing purposes.
";

/// Creates a sample subtitle file for testing
pub fn create_test_subtitle(dir: &Path, filename: &str) -> Result<PathBuf> {
    create_test_file(dir, filename, SAMPLE_SRT)
}

/// Records with deliberately non-contiguous indices
pub fn two_cues() -> Vec<SubtitleEntry> {
    vec![
        SubtitleEntry::from_text(5, 1_000, 2_500, "Hello"),
        SubtitleEntry::from_text(9, 3_000, 4_200, "World\nagain"),
    ]
}

/// Pipeline settings that never sleep between retries
pub fn fast_config() -> PipelineConfig {
    PipelineConfig::new("en", "fr")
        .with_retry_policy(1, Duration::ZERO)
        .with_call_timeout(Duration::from_secs(5))
}

/// Reviewer payload that asks for one fix
pub fn needs_improvement_json() -> String {
    ReviewResult::needs_improvement(vec![ReviewIssue::new("line 1", "too literal", Severity::Medium)]).to_json()
}

pub fn approved_json() -> String {
    ReviewResult::approved().to_json()
}

pub fn uppercase(text: &str) -> String {
    text.to_uppercase()
}

/// Appends '!' to every line, keeping the line count
pub fn exclaim(text: &str) -> String {
    text.lines().map(|l| format!("{}!", l)).collect::<Vec<_>>().join("\n")
}

/// Dry-run agents with the given replacements
pub fn agents_with(replacements: Vec<MockAgent>) -> AgentSet {
    replacements
        .into_iter()
        .fold(AgentSet::dry_run(), |set, agent| set.with(Arc::new(agent) as Arc<dyn Agent>))
}

pub fn orchestrator(config: PipelineConfig, replacements: Vec<MockAgent>) -> PipelineOrchestrator {
    PipelineOrchestrator::new(config, agents_with(replacements))
}

pub fn translator_uppercase() -> MockAgent {
    MockAgent::transform(AgentRole::Translator, uppercase)
}
