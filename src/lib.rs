/*!
 * # Gnosis - multi-stage subtitle pipeline
 *
 * A Rust library that takes SRT subtitles (typically speech recognition
 * output) through a chain of language model agents and writes corrected,
 * translated subtitles with the original timings.
 *
 * ## Features
 *
 * - SRT parsing and serialization with per-line format errors
 * - Budget-bounded chunking that never splits a cue
 * - Five agent roles:
 *   - Segmenter: repairs sentence breaks across cues
 *   - Proofreader: corrects recognition and spelling errors
 *   - Translator
 *   - Reviewer: approves or lists issues
 *   - Improver: fixes the listed issues
 * - A bounded review/improve loop per chunk
 * - Concurrent chunk and file processing under one shared call limit
 * - Degraded results instead of aborted files when an agent misbehaves
 * - Batch processing with per-file status reports
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `subtitle_processor`: SRT records, parsing and serialization
 * - `pipeline`: Chunking, the per-chunk state machine and merging:
 *   - `pipeline::chunker`: Splitting records into chunks
 *   - `pipeline::orchestrator`: Staged processing of a file
 *   - `pipeline::merge`: Realigning agent output onto records
 * - `agents`: The agent contract, LLM-backed and mock agents
 * - `providers`: Chat completion clients
 * - `batch`: Multi-file processing and reports
 * - `file_utils`: File system operations
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod agents;
pub mod app_config;
pub mod batch;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod pipeline;
pub mod providers;
pub mod subtitle_processor;

// Re-export main types for easier usage
pub use agents::{Agent, AgentRole, AgentSet};
pub use app_config::Config;
pub use batch::{BatchController, BatchOptions, BatchReport, FileReport};
pub use errors::{AgentError, AgentErrorKind, AppError, FormatError, MergeError, ProviderError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use pipeline::{PipelineConfig, PipelineOrchestrator};
pub use subtitle_processor::{SubtitleCollection, SubtitleEntry};
