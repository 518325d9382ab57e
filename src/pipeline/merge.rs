use serde::{Deserialize, Serialize};

use crate::errors::MergeError;
use crate::pipeline::chunker::{decode_record, Chunk};
use crate::subtitle_processor::SubtitleEntry;

/// What a merged record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// The processed text replaces the source text
    #[default]
    Translation,
    /// Source lines first, processed lines below them
    Bilingual,
}

/// Strip code fences and surrounding blank lines from agent output
pub fn clean_agent_text(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect();

    let start = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.trim().is_empty()).map_or(start, |i| i + 1);

    lines[start..end]
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Content lines of agent output, expecting one line per record.
///
/// While the output is longer than `expected`, leading chatter is dropped:
/// lead-in lines ending in a colon ("Here is the translation:"), separator
/// rules and the blank lines after them. Output of the right length is
/// never touched.
pub fn content_lines(text: &str, expected: usize) -> Vec<String> {
    let cleaned = clean_agent_text(text);
    let lines: Vec<&str> = if cleaned.is_empty() { Vec::new() } else { cleaned.lines().collect() };

    let mut start = 0;
    while lines.len() - start > expected && is_chatter(lines[start]) {
        start += 1;
        while lines.len() - start > expected && lines[start].trim().is_empty() {
            start += 1;
        }
    }

    lines[start..].iter().map(|l| l.to_string()).collect()
}

fn is_chatter(line: &str) -> bool {
    let line = line.trim();
    let is_rule = line.chars().count() >= 3
        && ['-', '=', '*'].iter().any(|rule| line.chars().all(|c| c == *rule));
    is_rule || line.ends_with(':') || line.ends_with('：')
}

/// Realign a finished chunk's text onto its records.
///
/// Only the text of the chunk's records is replaced; sequence numbers and
/// timings stay untouched. On a line count mismatch nothing is modified.
pub fn merge_chunk(
    chunk: &Chunk,
    text: &str,
    entries: &mut [SubtitleEntry],
    mode: OutputMode,
) -> Result<(), MergeError> {
    let lines = content_lines(text, chunk.len());

    if lines.len() != chunk.len() {
        return Err(MergeError::LineCountMismatch {
            chunk_id: chunk.id,
            expected: chunk.len(),
            actual: lines.len(),
        });
    }

    for (entry, line) in entries[chunk.range.clone()].iter_mut().zip(lines) {
        let processed = decode_record(&line);
        match mode {
            OutputMode::Translation => entry.lines = processed,
            OutputMode::Bilingual => entry.lines.extend(processed),
        }
    }
    Ok(())
}
