/*!
 * Tests for chunking and merging
 */

use gnosis::pipeline::chunker::{decode_record, split, BudgetMeasure, LINE_BREAK_TOKEN};
use gnosis::pipeline::merge::{merge_chunk, OutputMode};
use gnosis::subtitle_processor::SubtitleEntry;

use crate::common;

fn numbered(count: usize, text: &str) -> Vec<SubtitleEntry> {
    (0..count)
        .map(|i| SubtitleEntry::from_text(i + 1, i as u64 * 1000, i as u64 * 1000 + 800, text))
        .collect()
}

#[test]
fn test_split_shouldCoverEveryRecordInOrder() {
    let records = numbered(25, "twelve chars");
    let chunks = split(&records, 40, BudgetMeasure::Characters);

    let covered: Vec<usize> = chunks.iter().flat_map(|c| c.range.clone()).collect();
    assert_eq!(covered, (0..25).collect::<Vec<_>>());
    assert!(chunks.iter().all(|c| !c.is_empty()));
    assert!(chunks.iter().enumerate().all(|(i, c)| c.id == i));
}

#[test]
fn test_split_withOversizedRecord_shouldGiveItOwnChunk() {
    let mut records = numbered(2, "short");
    records.insert(1, SubtitleEntry::from_text(9, 5_000, 6_000, &"x".repeat(100)));

    let chunks = split(&records, 20, BudgetMeasure::Characters);

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1].range, 1..2);
}

#[test]
fn test_split_withZeroBudget_shouldEmitOneChunkPerRecord() {
    let chunks = split(&numbered(4, "a"), 0, BudgetMeasure::Characters);
    assert_eq!(chunks.len(), 4);
}

#[test]
fn test_split_withEstimatedTokens_shouldUseQuarterOfCharacters() {
    // 8 characters cost 2 estimated tokens each
    let chunks = split(&numbered(4, "abcdefgh"), 4, BudgetMeasure::EstimatedTokens);
    assert_eq!(chunks.len(), 2);
}

#[test]
fn test_combinedText_shouldEncodeLineBreaksInsideCues() {
    let records = common::two_cues();
    let chunks = split(&records, 1000, BudgetMeasure::Characters);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].combined_text, format!("Hello\nWorld{}again", LINE_BREAK_TOKEN));
    assert_eq!(decode_record("World\\Nagain"), vec!["World".to_string(), "again".to_string()]);
}

#[test]
fn test_mergeChunk_withWrongLineCount_shouldLeaveRecordsUntouched() {
    let mut records = common::two_cues();
    let before = records.clone();
    let chunk = split(&records, 1000, BudgetMeasure::Characters).remove(0);

    let result = merge_chunk(&chunk, "only one line", &mut records, OutputMode::Translation);

    assert!(result.is_err());
    assert_eq!(records, before);
}
