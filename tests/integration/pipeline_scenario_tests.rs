/*!
 * End-to-end pipeline scenarios with scripted mock agents
 */

use std::sync::Arc;
use std::time::Duration;

use gnosis::agents::{AgentRole, MockAgent};
use gnosis::errors::{AgentError, AgentErrorKind, MergeError};
use gnosis::pipeline::{
    CancellationFlag, ChunkState, ChunkStatus, DegradeReason, FileStatus, OutputMode, PipelineOrchestrator,
    PipelineProgress,
};
use gnosis::subtitle_processor::{SubtitleCollection, SubtitleEntry};

use crate::common;

#[tokio::test]
async fn test_runFile_withApprovingReviewer_shouldKeepTimingsAndRenumber() {
    let reviewer = MockAgent::scripted(AgentRole::Reviewer, vec![Ok(common::approved_json())]);
    let improver = MockAgent::echo(AgentRole::Improver);
    let orchestrator = common::orchestrator(
        common::fast_config(),
        vec![common::translator_uppercase(), reviewer.clone(), improver.clone()],
    );

    let input = common::two_cues();
    let run = orchestrator.run_file("two.srt", input.clone()).await;

    assert_eq!(run.status(), FileStatus::Succeeded);
    assert_eq!(run.improve_calls(), 0);
    assert_eq!(improver.calls(), 0);
    assert_eq!(reviewer.calls(), 1);

    assert_eq!(run.records.len(), 2);
    assert_eq!(run.records[0].seq_num, 1);
    assert_eq!(run.records[1].seq_num, 2);
    for (out, original) in run.records.iter().zip(&input) {
        assert_eq!(out.start_time_ms, original.start_time_ms);
        assert_eq!(out.end_time_ms, original.end_time_ms);
    }
    assert_eq!(run.records[0].lines, vec!["HELLO".to_string()]);
    assert_eq!(run.records[1].lines, vec!["WORLD".to_string(), "AGAIN".to_string()]);
}

#[tokio::test]
async fn test_runFile_withTwoRejectionsThenApproval_shouldImproveTwice() {
    let reviewer = MockAgent::scripted(
        AgentRole::Reviewer,
        vec![
            Ok(common::needs_improvement_json()),
            Ok(common::needs_improvement_json()),
            Ok(common::approved_json()),
        ],
    );
    let improver = MockAgent::transform(AgentRole::Improver, common::exclaim);
    let orchestrator = common::orchestrator(
        common::fast_config().with_max_retries(3),
        vec![common::translator_uppercase(), reviewer.clone(), improver.clone()],
    );

    let run = orchestrator.run_file("retry.srt", common::two_cues()).await;

    assert_eq!(improver.calls(), 2);
    assert_eq!(reviewer.calls(), 3);
    let chunk = &run.chunks[0];
    assert_eq!(chunk.status, ChunkStatus::Succeeded);
    assert_eq!(chunk.final_state, ChunkState::Done);
    assert!(!chunk.quality_unconfirmed);
    assert_eq!(run.status(), FileStatus::Succeeded);
    assert_eq!(run.records[0].lines, vec!["HELLO!!".to_string()]);

    let improver_context = improver.last_context().unwrap();
    assert_eq!(improver_context.prior_issues.len(), 1);
    assert_eq!(improver_context.prior_issues[0].description, "too literal");
}

#[tokio::test]
async fn test_runFile_withPersistentRejection_shouldStopAtRetryBound() {
    common::init_test_logging();
    let reviewer = MockAgent::scripted(AgentRole::Reviewer, vec![Ok(common::needs_improvement_json())]);
    let improver = MockAgent::transform(AgentRole::Improver, common::exclaim);
    let orchestrator = common::orchestrator(
        common::fast_config().with_max_retries(2),
        vec![common::translator_uppercase(), reviewer.clone(), improver.clone()],
    );

    let run = orchestrator.run_file("stubborn.srt", common::two_cues()).await;

    assert_eq!(improver.calls(), 2);
    assert_eq!(reviewer.calls(), 3);
    let chunk = &run.chunks[0];
    assert!(chunk.quality_unconfirmed);
    assert_eq!(chunk.improve_calls, 2);
    assert_eq!(run.status(), FileStatus::Degraded);
    // The last improved version is the output
    assert_eq!(run.records[0].lines, vec!["HELLO!!".to_string()]);
    assert_eq!(run.records[1].lines, vec!["WORLD".to_string(), "AGAIN!!".to_string()]);
}

#[tokio::test]
async fn test_runFile_withZeroRetries_shouldNeverCallImprover() {
    let reviewer = MockAgent::scripted(AgentRole::Reviewer, vec![Ok(common::needs_improvement_json())]);
    let improver = MockAgent::transform(AgentRole::Improver, common::exclaim);
    let orchestrator = common::orchestrator(
        common::fast_config().with_max_retries(0),
        vec![reviewer.clone(), improver.clone()],
    );

    let run = orchestrator.run_file("zero.srt", common::two_cues()).await;

    assert_eq!(improver.calls(), 0);
    assert_eq!(reviewer.calls(), 1);
    assert!(run.chunks[0].quality_unconfirmed);
}

#[tokio::test]
async fn test_runFile_withMisalignedImprover_shouldKeepPreviousText() {
    let reviewer = MockAgent::scripted(AgentRole::Reviewer, vec![Ok(common::needs_improvement_json())]);
    let improver = MockAgent::scripted(AgentRole::Improver, vec![Ok("just one line".to_string())]);
    let orchestrator = common::orchestrator(
        common::fast_config(),
        vec![common::translator_uppercase(), reviewer, improver.clone()],
    );

    let run = orchestrator.run_file("misaligned.srt", common::two_cues()).await;

    assert_eq!(improver.calls(), 1);
    assert_eq!(run.status(), FileStatus::Degraded);
    assert_eq!(
        run.chunks[0].degradation,
        Some(DegradeReason::ImproverMisaligned { expected: 2, actual: 1 })
    );
    assert_eq!(run.records[0].lines, vec!["HELLO".to_string()]);
    assert_eq!(run.records[1].lines, vec!["WORLD".to_string(), "AGAIN".to_string()]);
}

#[tokio::test]
async fn test_runFile_withMisalignedTranslation_shouldFallBackToOriginal() {
    let translator = MockAgent::scripted(AgentRole::Translator, vec![Ok("a\nb\nc".to_string())]);
    let orchestrator = common::orchestrator(common::fast_config(), vec![translator]);

    let input = common::two_cues();
    let run = orchestrator.run_file("merge.srt", input.clone()).await;

    assert_eq!(run.status(), FileStatus::Degraded);
    assert_eq!(run.chunks[0].status, ChunkStatus::Failed);
    assert_eq!(
        run.chunks[0].degradation,
        Some(DegradeReason::Merge(MergeError::LineCountMismatch { chunk_id: 0, expected: 2, actual: 3 }))
    );
    assert_eq!(run.records[0].lines, input[0].lines);
    assert_eq!(run.records[1].lines, input[1].lines);
}

#[tokio::test]
async fn test_runFile_withFailingSegmenter_shouldKeepOriginalText() {
    let segmenter = MockAgent::failing(AgentRole::Segmenter, AgentErrorKind::TransportFailure);
    let translator = common::translator_uppercase();
    let orchestrator = common::orchestrator(common::fast_config(), vec![segmenter.clone(), translator.clone()]);

    let run = orchestrator.run_file("segfail.srt", common::two_cues()).await;

    assert_eq!(segmenter.calls(), 1);
    assert_eq!(translator.calls(), 0);
    assert_eq!(run.chunks[0].final_state, ChunkState::FailedPermanently);
    assert!(matches!(
        run.chunks[0].degradation,
        Some(DegradeReason::AgentFailure { role: AgentRole::Segmenter, .. })
    ));
    assert_eq!(run.records[0].lines, vec!["Hello".to_string()]);
}

#[tokio::test]
async fn test_runFile_withUnavailableReviewer_shouldKeepTranslationUnconfirmed() {
    let reviewer = MockAgent::failing(AgentRole::Reviewer, AgentErrorKind::TransportFailure);
    let orchestrator = common::orchestrator(common::fast_config(), vec![common::translator_uppercase(), reviewer]);

    let run = orchestrator.run_file("noreview.srt", common::two_cues()).await;

    let chunk = &run.chunks[0];
    assert_eq!(chunk.status, ChunkStatus::Succeeded);
    assert!(chunk.quality_unconfirmed);
    assert_eq!(run.status(), FileStatus::Degraded);
    assert_eq!(run.records[0].lines, vec!["HELLO".to_string()]);
}

#[tokio::test]
async fn test_runFile_withUnparsableReview_shouldTreatAsNeedsImprovement() {
    let reviewer = MockAgent::scripted(
        AgentRole::Reviewer,
        vec![Ok("Looks great!".to_string()), Ok(common::approved_json())],
    );
    let improver = MockAgent::echo(AgentRole::Improver);
    let orchestrator = common::orchestrator(common::fast_config(), vec![reviewer.clone(), improver.clone()]);

    let run = orchestrator.run_file("prose.srt", common::two_cues()).await;

    assert_eq!(improver.calls(), 1);
    assert_eq!(reviewer.calls(), 2);
    assert_eq!(run.status(), FileStatus::Succeeded);
    let issues = improver.last_context().unwrap().prior_issues;
    assert!(issues[0].description.starts_with("unparsable review output"));
}

#[tokio::test]
async fn test_runFile_withMalformedReviewerError_shouldImproveThenApprove() {
    let reviewer = MockAgent::scripted(
        AgentRole::Reviewer,
        vec![Err(AgentError::malformed("undecodable body")), Ok(common::approved_json())],
    );
    let improver = MockAgent::transform(AgentRole::Improver, common::exclaim);
    let orchestrator = common::orchestrator(
        common::fast_config().with_max_retries(2),
        vec![common::translator_uppercase(), reviewer.clone(), improver.clone()],
    );

    let run = orchestrator.run_file("garbled.srt", common::two_cues()).await;

    assert_eq!(improver.calls(), 1);
    assert_eq!(reviewer.calls(), 2);
    let chunk = &run.chunks[0];
    assert!(!chunk.quality_unconfirmed);
    assert_eq!(chunk.degradation, None);
    assert_eq!(run.status(), FileStatus::Succeeded);
    assert_eq!(run.records[0].lines, vec!["HELLO!".to_string()]);
    let issues = improver.last_context().unwrap().prior_issues;
    assert!(issues[0].description.contains("undecodable body"));
}

#[tokio::test]
async fn test_translateDocument_withEchoAgents_shouldKeepCueTextVerbatim() {
    let orchestrator = common::orchestrator(common::fast_config(), Vec::new());
    let cues = [
        vec!["C:\\Nodes is a path".to_string(), "  indented line".to_string()],
        vec!["{\\an8}Top\\Nline from ASS".to_string()],
        vec!["trailing backslash \\".to_string()],
        vec!["<i>markup</i> & 50% off".to_string()],
    ];
    let records: Vec<SubtitleEntry> = cues
        .iter()
        .enumerate()
        .map(|(i, lines)| SubtitleEntry::new(i + 1, i as u64 * 1000, i as u64 * 1000 + 800, lines.clone()))
        .collect();
    let raw = SubtitleCollection::serialize(&records);

    let (output, run) = orchestrator.translate_document("verbatim.srt", &raw).await.unwrap();

    assert_eq!(run.status(), FileStatus::Succeeded);
    assert_eq!(output, raw);
    let reparsed = SubtitleCollection::parse_srt_string(&output).unwrap();
    for (out, lines) in reparsed.iter().zip(&cues) {
        assert_eq!(&out.lines, lines);
    }
}

#[tokio::test]
async fn test_runFile_withChattyTranslator_shouldStillMerge() {
    let translator = MockAgent::transform(AgentRole::Translator, |t| format!("Here is the translation:\n\n{}", t.to_uppercase()));
    let orchestrator = common::orchestrator(common::fast_config(), vec![translator]);

    let run = orchestrator.run_file("chatty.srt", common::two_cues()).await;

    assert_eq!(run.status(), FileStatus::Succeeded);
    assert_eq!(run.records[0].lines, vec!["HELLO".to_string()]);
    assert_eq!(run.records[1].lines, vec!["WORLD".to_string(), "AGAIN".to_string()]);
}

#[tokio::test]
async fn test_runFile_bilingual_shouldStackSourceAndTranslation() {
    let config = common::fast_config().with_output_mode(OutputMode::Bilingual);
    let orchestrator = common::orchestrator(config, vec![common::translator_uppercase()]);

    let run = orchestrator.run_file("both.srt", common::two_cues()).await;

    assert_eq!(run.records[0].lines, vec!["Hello".to_string(), "HELLO".to_string()]);
    let second: Vec<String> = ["World", "again", "WORLD", "AGAIN"].iter().map(|s| s.to_string()).collect();
    assert_eq!(run.records[1].lines, second);
    assert_eq!(run.records[1].start_time_ms, 3_000);
}

#[tokio::test]
async fn test_runFile_cancelledMidRun_shouldKeepFinishedTranslations() {
    let cancel = CancellationFlag::new();
    let trigger = cancel.clone();
    let translator = common::translator_uppercase();
    let config = common::fast_config().with_chunk_budget(1).with_max_concurrency(1);
    let orchestrator = PipelineOrchestrator::new(config, common::agents_with(vec![translator.clone()]))
        .with_cancellation(cancel)
        .with_progress(Arc::new(move |event: PipelineProgress| {
            if let PipelineProgress::ChunkFinished { done: 1, .. } = event {
                trigger.cancel();
            }
        }));
    let records: Vec<SubtitleEntry> = ["one", "two", "three"]
        .iter()
        .enumerate()
        .map(|(i, t)| SubtitleEntry::from_text(i + 1, i as u64 * 1000, i as u64 * 1000 + 500, t))
        .collect();

    let run = orchestrator.run_file("interrupted.srt", records).await;

    assert_eq!(translator.calls(), 1);
    assert_eq!(run.chunks[0].status, ChunkStatus::Succeeded);
    assert_eq!(run.records[0].lines, vec!["ONE".to_string()]);
    assert_eq!(run.chunks[1].degradation, Some(DegradeReason::Cancelled));
    assert_eq!(run.chunks[2].degradation, Some(DegradeReason::Cancelled));
    assert_eq!(run.records[1].lines, vec!["two".to_string()]);
    assert_eq!(run.records[2].lines, vec!["three".to_string()]);
    assert_eq!(run.status(), FileStatus::Degraded);
}

#[tokio::test]
async fn test_runFile_withTransientTimeouts_shouldRetryThenSucceed() {
    let translator = MockAgent::scripted(
        AgentRole::Translator,
        vec![Err(AgentError::timeout(Duration::from_millis(10))), Ok("HELLO\nWORLD\\NAGAIN".to_string())],
    );
    let orchestrator = common::orchestrator(common::fast_config(), vec![translator.clone()]);

    let run = orchestrator.run_file("flaky.srt", common::two_cues()).await;

    assert_eq!(translator.calls(), 2);
    assert_eq!(run.status(), FileStatus::Succeeded);
    assert_eq!(run.records[1].lines, vec!["WORLD".to_string(), "AGAIN".to_string()]);
}

#[tokio::test]
async fn test_runFile_reviewer_shouldReceiveTranslatorInput() {
    let reviewer = MockAgent::scripted(AgentRole::Reviewer, vec![Ok(common::approved_json())]);
    let orchestrator = common::orchestrator(common::fast_config(), vec![common::translator_uppercase(), reviewer.clone()]);

    orchestrator.run_file("source.srt", common::two_cues()).await;

    let context = reviewer.last_context().unwrap();
    assert_eq!(context.source_text.as_deref(), Some("Hello\nWorld\\Nagain"));
    assert_eq!(reviewer.inputs(), vec!["HELLO\nWORLD\\NAGAIN".to_string()]);
}

#[tokio::test]
async fn test_runFile_withManySmallChunks_shouldPreserveOrderUnderConcurrency() {
    let translator = MockAgent::slow(AgentRole::Translator, 5);
    let records: Vec<SubtitleEntry> = (0..20)
        .map(|i| SubtitleEntry::from_text(i + 1, i as u64 * 1000, i as u64 * 1000 + 500, &format!("cue {}", i)))
        .collect();
    let config = common::fast_config().with_chunk_budget(12).with_max_concurrency(4);
    let orchestrator = common::orchestrator(config, vec![translator]);

    let run = orchestrator.run_file("many.srt", records.clone()).await;

    assert!(run.chunks.len() > 1);
    assert_eq!(run.status(), FileStatus::Succeeded);
    for (i, (out, original)) in run.records.iter().zip(&records).enumerate() {
        assert_eq!(out.seq_num, i + 1);
        assert_eq!(out.lines, original.lines);
        assert_eq!(out.start_time_ms, original.start_time_ms);
    }
}

#[tokio::test]
async fn test_translateDocument_withMalformedInput_shouldReturnFormatError() {
    let orchestrator = common::orchestrator(common::fast_config(), Vec::new());
    let result = orchestrator.translate_document("bad.srt", "1\nno timestamp here\ntext\n").await;
    tokio_test::assert_err!(result);
}

#[tokio::test]
async fn test_translateDocument_withEmptyInput_shouldProduceEmptyOutput() {
    let orchestrator = common::orchestrator(common::fast_config(), Vec::new());
    let (output, run) = orchestrator.translate_document("empty.srt", "").await.unwrap();

    assert!(output.is_empty());
    assert!(run.chunks.is_empty());
    assert_eq!(run.status(), FileStatus::Succeeded);
}
