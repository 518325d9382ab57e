/*!
 * Chunking of subtitle records into agent-sized batches.
 *
 * A chunk's combined text carries exactly one line per record. Line breaks
 * inside a record are encoded with the `\N` hard break token so a
 * multi-line cue still occupies a single line of the combined text.
 * Backslashes already present in cue text are doubled, so a literal `\N`
 * in the source survives a round trip.
 */

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::subtitle_processor::SubtitleEntry;

/// Hard line break token used inside a record's encoded line
pub const LINE_BREAK_TOKEN: &str = "\\N";

/// How the chunk budget is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMeasure {
    /// Unicode scalar values of the encoded line
    #[default]
    Characters,
    /// Rough token estimate, four characters per token
    EstimatedTokens,
}

impl BudgetMeasure {
    pub fn cost(&self, text: &str) -> usize {
        let chars = text.chars().count();
        match self {
            Self::Characters => chars,
            Self::EstimatedTokens => chars.div_ceil(4),
        }
    }
}

/// Where a chunk may be closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkBoundary {
    /// Close a chunk as soon as the next record would exceed the budget
    Greedy,
    /// Prefer closing after a record that ends a sentence
    #[default]
    SentenceEnd,
}

/// A contiguous group of records sent through the pipeline together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk within its file
    pub id: usize,
    /// Positions of the chunk's records in the file's record vector
    pub range: Range<usize>,
    /// One encoded line per record
    pub combined_text: String,
}

impl Chunk {
    /// Number of records (and therefore expected output lines)
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// The records this chunk was built from
    pub fn records<'a>(&self, all: &'a [SubtitleEntry]) -> &'a [SubtitleEntry] {
        &all[self.range.clone()]
    }
}

/// Encode a record's lines as one line of combined text
pub fn encode_record(entry: &SubtitleEntry) -> String {
    entry
        .lines
        .iter()
        .map(|line| line.replace('\\', "\\\\"))
        .collect::<Vec<_>>()
        .join(LINE_BREAK_TOKEN)
}

/// Decode one line of combined text back into record lines.
///
/// Only an unescaped `\N` breaks the line; `\\` stands for one backslash and
/// any other backslash is kept as is. Leading whitespace is preserved.
pub fn decode_record(line: &str) -> Vec<String> {
    if line.trim().is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            current.push(c);
            continue;
        }
        match chars.peek() {
            Some('\\') => {
                current.push('\\');
                chars.next();
            }
            Some('N') => {
                lines.push(current.trim_end().to_string());
                current.clear();
                chars.next();
            }
            _ => current.push('\\'),
        }
    }
    lines.push(current.trim_end().to_string());
    lines
}

/// Build the combined text for a run of records
pub fn combine(entries: &[SubtitleEntry]) -> String {
    entries.iter().map(encode_record).collect::<Vec<_>>().join("\n")
}

/// Whether the record's text ends with sentence punctuation
pub fn ends_sentence(entry: &SubtitleEntry) -> bool {
    entry
        .lines
        .iter()
        .rev()
        .map(|line| line.trim_end())
        .find(|line| !line.is_empty())
        .and_then(|line| line.chars().last())
        .is_some_and(|c| matches!(c, '.' | '?' | '!' | '。' | '？' | '！'))
}

/// Split records into chunks whose summed cost stays within `max_unit_budget`.
///
/// Records are packed greedily in order. A record that alone exceeds the
/// budget becomes a chunk of its own; records are never split or dropped.
pub fn split(entries: &[SubtitleEntry], max_unit_budget: usize, measure: BudgetMeasure) -> Vec<Chunk> {
    split_with(entries, max_unit_budget, measure, ChunkBoundary::Greedy)
}

/// Split records like [`split`], choosing where full chunks are closed.
///
/// With [`ChunkBoundary::SentenceEnd`] a chunk that runs out of budget is
/// closed after its last sentence-ending record and the trailing records
/// open the next chunk. Without a sentence end in the chunk it is closed
/// greedily. Either way no chunk exceeds the budget unless it holds a
/// single oversized record.
pub fn split_with(
    entries: &[SubtitleEntry],
    max_unit_budget: usize,
    measure: BudgetMeasure,
    boundary: ChunkBoundary,
) -> Vec<Chunk> {
    let costs: Vec<usize> = entries.iter().map(|e| measure.cost(&encode_record(e))).collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut used = 0;
    let mut last_sentence_end: Option<usize> = None;

    for (i, entry) in entries.iter().enumerate() {
        let cost = costs[i];

        if i > start && used + cost > max_unit_budget {
            let end = match (boundary, last_sentence_end) {
                (ChunkBoundary::SentenceEnd, Some(last)) if last >= start => last + 1,
                _ => i,
            };
            chunks.push(make_chunk(chunks.len(), entries, start..end));
            start = end;
            used = costs[start..i].iter().sum();

            // The carried records plus this one may still not fit
            if i > start && used + cost > max_unit_budget {
                chunks.push(make_chunk(chunks.len(), entries, start..i));
                start = i;
                used = 0;
            }
        }
        used += cost;
        if ends_sentence(entry) {
            last_sentence_end = Some(i);
        }
    }

    if start < entries.len() {
        chunks.push(make_chunk(chunks.len(), entries, start..entries.len()));
    }

    chunks
}

fn make_chunk(id: usize, entries: &[SubtitleEntry], range: Range<usize>) -> Chunk {
    Chunk {
        id,
        combined_text: combine(&entries[range.clone()]),
        range,
    }
}
