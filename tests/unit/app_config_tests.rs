/*!
 * Tests for configuration loading
 */

use gnosis::app_config::{Config, LogLevel, ProviderKind};
use gnosis::pipeline::{BudgetMeasure, ChunkBoundary, OutputMode, PipelineConfig};

use crate::common;

#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let config = Config::load_or_create(&path).unwrap();

    assert!(path.exists());
    assert_eq!(config.provider.kind, ProviderKind::DeepSeek);
    let reloaded = Config::from_file(&path).unwrap();
    assert_eq!(reloaded.target_language, config.target_language);
}

#[test]
fn test_fromFile_withPartialJson_shouldFillDefaults() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(
        dir.path(),
        "conf.json",
        r#"{
            "source_language": "ja",
            "target_language": "en",
            "provider": {"type": "kimi", "api_key": "k"},
            "pipeline": {"budget_measure": "estimated_tokens", "output_mode": "bilingual", "chunk_boundary": "greedy", "stages": {"segment": false}},
            "log_level": "debug"
        }"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();

    assert_eq!(config.provider.kind, ProviderKind::Kimi);
    assert_eq!(config.provider.model(), "moonshot-v1-32k");
    assert_eq!(config.pipeline.budget_measure, BudgetMeasure::EstimatedTokens);
    assert_eq!(config.pipeline.output_mode, OutputMode::Bilingual);
    assert_eq!(config.pipeline.chunk_boundary, ChunkBoundary::Greedy);
    assert!(!config.pipeline.stages.segment);
    assert!(config.pipeline.stages.proofread);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.validate(false).is_ok());
}

#[test]
fn test_fromFile_withInvalidJson_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(dir.path(), "conf.json", "{ not json").unwrap();
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_pipelineConfig_fromConfig_shouldCarrySettings() {
    let mut config = Config::default();
    config.pipeline.max_retries = 4;
    config.pipeline.call_timeout_secs = 7;
    config.pipeline.output_mode = OutputMode::Bilingual;

    let pipeline = PipelineConfig::from_config(&config);

    assert_eq!(pipeline.max_retries, 4);
    assert_eq!(pipeline.call_timeout.as_secs(), 7);
    assert_eq!(pipeline.output_mode, OutputMode::Bilingual);
    assert_eq!(pipeline.chunk_boundary, ChunkBoundary::SentenceEnd);
    assert_eq!(pipeline.source_language, config.source_language);
}
