// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use gnosis::app_config::{Config, LogLevel, ProviderKind};
use gnosis::batch::{BatchController, BatchOptions, FileReport};
use gnosis::file_utils::FileManager;
use gnosis::pipeline::{FileRun, FileStatus, OutputMode, PipelineConfig, PipelineOrchestrator, PipelineProgress};
use gnosis::subtitle_processor::SubtitleCollection;
use gnosis::AgentSet;

/// CLI Wrapper for ProviderKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliProvider {
    Deepseek,
    Openai,
    Mistral,
    Kimi,
}

impl From<CliProvider> for ProviderKind {
    fn from(cli_provider: CliProvider) -> Self {
        match cli_provider {
            CliProvider::Deepseek => ProviderKind::DeepSeek,
            CliProvider::Openai => ProviderKind::OpenAI,
            CliProvider::Mistral => ProviderKind::Mistral,
            CliProvider::Kimi => ProviderKind::Kimi,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline over a text snippet or a single SRT file
    Translate(TranslateArgs),

    /// Run the pipeline over every subtitle file in a directory
    Batch(BatchArgs),

    /// Generate shell completions for gnosis
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// Plain text to process, one cue per line
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    text: Option<String>,

    /// SRT file to process
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Output file (defaults to <stem>_<target>.srt next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Directory containing subtitle files
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory (defaults to next to each input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extension of the files to process
    #[arg(short, long, default_value = "srt")]
    extension: String,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,
}

/// Options shared by every subcommand
#[derive(Args, Debug)]
struct SharedArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config: PathBuf,

    /// Source language code (e.g., 'en', 'ja', 'zh')
    #[arg(short, long, global = true)]
    source_language: Option<String>,

    /// Target language code (e.g., 'en', 'ja', 'zh')
    #[arg(short, long, global = true)]
    target_language: Option<String>,

    /// Set logging level
    #[arg(long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,

    /// Model provider to use
    #[arg(long, value_enum, global = true)]
    provider: Option<CliProvider>,

    /// Model name to use for every agent
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Provider API key
    #[arg(long, env = "GNOSIS_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Maximum simultaneous agent calls
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    /// Improver calls allowed per chunk
    #[arg(long, global = true)]
    max_retries: Option<usize>,

    /// Chunk budget in characters
    #[arg(long, global = true)]
    chunk_budget: Option<usize>,

    /// Keep the source lines above each translated cue
    #[arg(long, global = true)]
    bilingual: bool,

    /// Use offline agents that echo text and approve every review
    #[arg(long, global = true)]
    dry_run: bool,
}

/// Gnosis - multi-stage subtitle pipeline
///
/// Repairs, proofreads, translates and reviews SRT subtitles with
/// language model agents, keeping the original cue timings.
#[derive(Parser, Debug)]
#[command(name = "gnosis")]
#[command(version)]
#[command(about = "Multi-stage subtitle pipeline with LLM agents")]
#[command(long_about = "Gnosis takes speech recognition subtitles through segmentation repair, proofreading,
translation and review, and writes the result with the original timings.

EXAMPLES:
    gnosis translate --text \"Hello there\" -t fr     # Translate a snippet
    gnosis translate -f talk.srt -s en -t zh          # Writes talk_zh.srt
    gnosis batch -i ./subs -o ./out -r                # Whole directory tree
    gnosis --dry-run batch -i ./subs                  # No network calls
    gnosis completions bash > gnosis.bash             # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one is created. The API key may also come from GNOSIS_API_KEY.

SUPPORTED PROVIDERS:
    deepseek, openai, mistral, kimi (all OpenAI-compatible chat completions)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    shared: SharedArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger::new(level)))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour and tag for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("1;31", "ERROR"),
            Level::Warn => ("1;33", "WARN "),
            Level::Info => ("1;32", "INFO "),
            Level::Debug => ("1;36", "DEBUG"),
            Level::Trace => ("1;35", "TRACE"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (colour, tag) = Self::style_for_level(record.level());
            let _ = writeln!(std::io::stderr(), "\x1B[{}m{} {} {}\x1B[0m", colour, now, tag, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger accepts everything; the effective level is set through max_level
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "gnosis", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(level) = &cli.shared.log_level {
        log::set_max_level(LogLevel::from(level.clone()).to_level_filter());
    }

    let config = load_config(&cli.shared)?;
    if cli.shared.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    let agents = if cli.shared.dry_run {
        info!("Dry run: agents echo their input and approve every review");
        AgentSet::dry_run()
    } else {
        config.agents()
    };

    let orchestrator = PipelineOrchestrator::new(PipelineConfig::from_config(&config), agents);
    let cancel = orchestrator.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with original text for unfinished chunks");
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::Translate(args) => run_translate(orchestrator, &config, args).await,
        Commands::Batch(args) => run_batch(orchestrator, &config, args).await,
        Commands::Completions { .. } => Ok(()),
    }
}

// @loads: Config file, then CLI overrides, then validation
fn load_config(options: &SharedArgs) -> Result<Config> {
    let mut config = Config::load_or_create(&options.config)?;

    if let Some(source) = &options.source_language {
        config.source_language = source.clone();
    }
    if let Some(target) = &options.target_language {
        config.target_language = target.clone();
    }
    if let Some(provider) = &options.provider {
        config.provider.kind = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.provider.model_name = model.clone();
    }
    if let Some(api_key) = &options.api_key {
        config.provider.api_key = api_key.clone();
    }
    if let Some(max_concurrency) = options.max_concurrency {
        config.pipeline.max_concurrency = max_concurrency;
    }
    if let Some(max_retries) = options.max_retries {
        config.pipeline.max_retries = max_retries;
    }
    if let Some(chunk_budget) = options.chunk_budget {
        config.pipeline.chunk_budget = chunk_budget;
    }
    if options.bilingual {
        config.pipeline.output_mode = OutputMode::Bilingual;
    }
    if let Some(level) = &options.log_level {
        config.log_level = level.clone().into();
    }

    config.validate(options.dry_run).context("Configuration validation failed")?;
    Ok(config)
}

fn progress_style(unit: &str) -> ProgressStyle {
    let template = format!(
        "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}} {{eta}}",
        unit
    );
    ProgressStyle::default_bar()
        .template(&template)
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

async fn run_translate(orchestrator: PipelineOrchestrator, config: &Config, args: TranslateArgs) -> Result<()> {
    if let Some(text) = args.text {
        // SRT pasted on the command line keeps its timings
        match orchestrator.translate_document("--text", &text).await {
            Ok((srt, run)) if !run.records.is_empty() => {
                print_degraded(&run);
                print!("{}", srt);
            }
            _ => {
                let (output, report) = orchestrator.translate_text(&text).await;
                if report.is_degraded() {
                    warn!("Result is degraded: {}", report.label());
                }
                println!("{}", output);
            }
        }
        return Ok(());
    }

    let input = args.file.ok_or_else(|| anyhow!("Either --text or --file is required"))?;
    let collection = SubtitleCollection::from_file(&input, &config.source_language)?;
    debug!("{}", collection);

    let bar = ProgressBar::new(0);
    bar.set_style(progress_style("chunks"));
    let progress_bar = bar.clone();
    let orchestrator = orchestrator.with_progress(Arc::new(move |event: PipelineProgress| match event {
        PipelineProgress::FileStarted { chunks, .. } => progress_bar.set_length(chunks as u64),
        PipelineProgress::ChunkFinished { done, .. } => progress_bar.set_position(done as u64),
        PipelineProgress::FileFinished { .. } => {}
    }));

    let file_id = input.display().to_string();
    let run = orchestrator.run_file(&file_id, collection.entries).await;
    bar.finish_and_clear();

    let output = args
        .output
        .unwrap_or_else(|| FileManager::output_path(&input, None, None, &config.target_language));
    FileManager::write_to_file(&output, &SubtitleCollection::serialize(&run.records))?;

    println!("{}: {} -> {:?}", input.display(), run.status(), output);
    print_degraded(&run);
    Ok(())
}

fn print_degraded(run: &FileRun) {
    for chunk in run.degraded_chunks() {
        eprintln!("  chunk {} (cues {}-{}): {}", chunk.chunk_id, chunk.first_seq, chunk.last_seq, chunk.label());
    }
}

async fn run_batch(orchestrator: PipelineOrchestrator, config: &Config, args: BatchArgs) -> Result<()> {
    let file_timeout = Some(Duration::from_secs(config.pipeline.file_timeout_secs)).filter(|d| !d.is_zero());
    let options = BatchOptions {
        output_dir: args.output.clone(),
        input_root: Some(args.input.clone()),
        extension: args.extension.clone(),
        target_language: config.target_language.clone(),
        file_timeout,
    };

    let bar = ProgressBar::new(0);
    bar.set_style(progress_style("files"));
    let progress_bar = bar.clone();

    let controller = BatchController::new(Arc::new(orchestrator), options).with_file_callback(Arc::new(move |report: &FileReport| {
        progress_bar.set_message(format!("{}", report.status));
        progress_bar.inc(1);
    }));

    let files = controller.discover(&args.input, args.recursive)?;
    if files.is_empty() {
        warn!("No .{} files found in {:?}", args.extension, args.input);
        return Ok(());
    }
    bar.set_length(files.len() as u64);

    let report = controller.process(&files).await;
    bar.finish_and_clear();

    println!("{}", report.summary());

    if report.has_failures() {
        error!("{} of {} files failed", report.count(FileStatus::Failed), report.files.len());
        std::process::exit(1);
    }
    Ok(())
}
