/*!
 * Batch processing over real files in temporary directories
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gnosis::agents::{AgentRole, MockAgent};
use gnosis::batch::{BatchController, BatchOptions, FileReport};
use gnosis::pipeline::FileStatus;
use gnosis::subtitle_processor::SubtitleCollection;

use crate::common;

fn controller(options: BatchOptions, agents: Vec<MockAgent>) -> BatchController {
    BatchController::new(Arc::new(common::orchestrator(common::fast_config(), agents)), options)
}

#[tokio::test]
async fn test_process_withOneMalformedFile_shouldFinishTheOthers() {
    common::init_test_logging();
    let input = common::create_temp_dir().unwrap();
    let output = common::create_temp_dir().unwrap();
    let first = common::create_test_subtitle(input.path(), "a.srt").unwrap();
    let broken = common::create_test_file(input.path(), "b.srt", "1\nthis is not a timestamp\nHello\n").unwrap();
    let third = common::create_test_subtitle(input.path(), "c.srt").unwrap();

    let options = BatchOptions::new("fr")
        .with_output_dir(Some(output.path().to_path_buf()))
        .with_input_root(Some(input.path().to_path_buf()));
    let batch = controller(options, vec![common::translator_uppercase()]);

    let report = batch.process(&[first.clone(), broken.clone(), third.clone()]).await;

    assert_eq!(report.files.len(), 3);
    assert_eq!(report.files[0].input, first);
    assert_eq!(report.files[1].input, broken);
    assert_eq!(report.files[2].input, third);

    assert_eq!(report.files[0].status, FileStatus::Succeeded);
    assert_eq!(report.files[1].status, FileStatus::Failed);
    assert_eq!(report.files[1].error_kind(), Some("format"));
    assert_eq!(report.files[2].status, FileStatus::Succeeded);
    assert!(report.has_failures());

    let written = output.path().join("a_fr.srt");
    assert_eq!(report.files[0].output.as_deref(), Some(written.as_path()));
    let entries = SubtitleCollection::parse_srt_string(&std::fs::read_to_string(&written).unwrap()).unwrap();
    assert_eq!(entries[0].lines, vec!["THIS IS A TEST SUBTITLE.".to_string()]);
    assert!(output.path().join("c_fr.srt").exists());
    assert!(!output.path().join("b_fr.srt").exists());
}

#[tokio::test]
async fn test_process_withNestedInput_shouldMirrorDirectories() {
    let input = common::create_temp_dir().unwrap();
    let output = common::create_temp_dir().unwrap();
    common::create_test_subtitle(input.path(), "season1/ep1.srt").unwrap();
    common::create_test_subtitle(input.path(), "season2/ep1.srt").unwrap();

    let options = BatchOptions::new("de")
        .with_output_dir(Some(output.path().to_path_buf()))
        .with_input_root(Some(input.path().to_path_buf()));
    let batch = controller(options, Vec::new());

    let files = tokio_test::assert_ok!(batch.discover(input.path(), true));
    assert_eq!(files.len(), 2);
    assert!(batch.discover(input.path(), false).unwrap().is_empty());

    let report = batch.process(&files).await;

    assert!(!report.has_failures());
    assert!(output.path().join("season1/ep1_de.srt").exists());
    assert!(output.path().join("season2/ep1_de.srt").exists());
}

#[tokio::test]
async fn test_process_pastFileDeadline_shouldWriteSourceTextAndDegrade() {
    let input = common::create_temp_dir().unwrap();
    let file = common::create_test_subtitle(input.path(), "slow.srt").unwrap();

    let options = BatchOptions::new("fr").with_file_timeout(Some(Duration::from_millis(50)));
    let batch = controller(options, vec![MockAgent::slow(AgentRole::Translator, 5_000)]);

    let report = batch.process(&[file]).await;

    let file_report = &report.files[0];
    assert_eq!(file_report.status, FileStatus::Degraded);
    assert_eq!(file_report.error_kind(), None);
    assert!(!report.has_failures());
    assert!(report.summary().contains("cancelled"));

    let written = std::fs::read_to_string(input.path().join("slow_fr.srt")).unwrap();
    let entries = SubtitleCollection::parse_srt_string(&written).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].lines, vec!["This is a test subtitle.".to_string()]);
}

#[tokio::test]
async fn test_process_manyFiles_shouldShareOneCallLimit() {
    let input = common::create_temp_dir().unwrap();
    let files: Vec<_> = (0..4)
        .map(|i| common::create_test_subtitle(input.path(), &format!("ep{}.srt", i)).unwrap())
        .collect();
    let translator = MockAgent::slow(AgentRole::Translator, 20);
    let orchestrator = common::orchestrator(
        common::fast_config().with_chunk_budget(1).with_max_concurrency(2),
        vec![translator.clone()],
    );
    let batch = BatchController::new(Arc::new(orchestrator), BatchOptions::new("fr"));

    let report = batch.process(&files).await;

    assert_eq!(report.count(FileStatus::Succeeded), 4);
    assert_eq!(translator.calls(), 12);
    assert!(translator.peak_concurrency() <= 2);
}

#[tokio::test]
async fn test_process_withDegradedFile_shouldDescribeAffectedChunks() {
    let input = common::create_temp_dir().unwrap();
    let file = common::create_test_subtitle(input.path(), "ep.srt").unwrap();
    let reviewer = MockAgent::failing(AgentRole::Reviewer, gnosis::errors::AgentErrorKind::TransportFailure);

    let batch = controller(BatchOptions::new("fr"), vec![reviewer]);
    let report = batch.process(&[file]).await;

    assert!(!report.has_failures());
    assert_eq!(report.count(FileStatus::Degraded), 1);
    assert!(input.path().join("ep_fr.srt").exists());
    let summary = report.summary();
    assert!(summary.contains("degraded"));
    assert!(summary.contains("chunk 0 (cues 1-3): reviewer unavailable"));
}

#[tokio::test]
async fn test_process_shouldNotifyOncePerFile() {
    let input = common::create_temp_dir().unwrap();
    let a = common::create_test_subtitle(input.path(), "a.srt").unwrap();
    let empty = common::create_test_file(input.path(), "empty.srt", "").unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let batch = controller(BatchOptions::new("fr"), Vec::new())
        .with_file_callback(Arc::new(move |_report: &FileReport| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

    let report = batch.process(&[a, empty]).await;

    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(report.files[1].status, FileStatus::Skipped);
}
