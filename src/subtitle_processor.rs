use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::FormatError;

// @module: Subtitle records, SRT parsing and serialization

// @const: SRT timestamp line, trailing position hints allowed
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,3}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{1,3}):(\d{2}):(\d{2})[,.](\d{3})(?:\s.*)?$").unwrap()
});

// @struct: Single subtitle cue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    // @field: Sequence number
    pub seq_num: usize,

    // @field: Start time in ms
    pub start_time_ms: u64,

    // @field: End time in ms
    pub end_time_ms: u64,

    // @field: Text lines, markup kept verbatim
    pub lines: Vec<String>,
}

impl SubtitleEntry {
    pub fn new(seq_num: usize, start_time_ms: u64, end_time_ms: u64, lines: Vec<String>) -> Self {
        SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            lines,
        }
    }

    /// Build an entry from newline separated text
    pub fn from_text(seq_num: usize, start_time_ms: u64, end_time_ms: u64, text: &str) -> Self {
        Self::new(
            seq_num,
            start_time_ms,
            end_time_ms,
            text.lines().map(|l| l.to_string()).collect(),
        )
    }

    /// Parse an SRT timestamp (`HH:MM:SS,mmm`) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Option<u64> {
        let parts: Vec<&str> = timestamp.trim().split(&[':', ',', '.'][..]).collect();
        if parts.len() != 4 {
            return None;
        }

        let hours: u64 = parts[0].parse().ok()?;
        let minutes: u64 = parts[1].parse().ok()?;
        let seconds: u64 = parts[2].parse().ok()?;
        let millis: u64 = parts[3].parse().ok()?;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return None;
        }

        Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }

    pub fn format_start_time(&self) -> String {
        Self::format_timestamp(self.start_time_ms)
    }

    pub fn format_end_time(&self) -> String {
        Self::format_timestamp(self.end_time_ms)
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.seq_num)?;
        writeln!(f, "{} --> {}", self.format_start_time(), self.format_end_time())?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)
    }
}

/// Collection of subtitle entries with metadata
#[derive(Debug, Clone)]
pub struct SubtitleCollection {
    /// Source filename
    pub source_file: PathBuf,

    /// List of subtitle entries
    pub entries: Vec<SubtitleEntry>,

    /// Source language
    pub source_language: String,
}

impl SubtitleCollection {
    /// Load and parse an SRT file
    pub fn from_file<P: AsRef<Path>>(path: P, source_language: &str) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read subtitle file: {}", path.display()))?;
        let entries = Self::parse_srt_string(&content)
            .with_context(|| format!("Malformed subtitle file: {}", path.display()))?;

        Ok(SubtitleCollection {
            source_file: path.to_path_buf(),
            entries,
            source_language: source_language.to_string(),
        })
    }

    /// Serialize entries to SRT text.
    ///
    /// Indices are written as stored. Every cue is followed by exactly one
    /// blank separator line.
    pub fn serialize(entries: &[SubtitleEntry]) -> String {
        let mut out = String::new();
        for entry in entries {
            out.push_str(&entry.to_string());
        }
        out
    }

    /// Parse SRT content into subtitle entries.
    ///
    /// Indices are kept as read. Blank lines that are not followed by the
    /// start of a new block are treated as blank lines inside the current cue
    /// and dropped. Trailing whitespace on every line is trimmed.
    pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleEntry>, FormatError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let lines: Vec<&str> = content.lines().map(|l| l.trim_end()).collect();

        let mut entries: Vec<SubtitleEntry> = Vec::new();
        let mut current: Option<SubtitleEntry> = None;
        // True at the start of input and after a blank line
        let mut at_block_boundary = true;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let line_no = i + 1;

            if line.trim().is_empty() {
                at_block_boundary = true;
                i += 1;
                continue;
            }

            let next_is_timestamp = lines.get(i + 1).is_some_and(|next| is_timestamp_line(next));
            let is_index = line.trim().parse::<usize>().is_ok();

            if next_is_timestamp && (at_block_boundary || is_index) {
                let seq_num = line.trim().parse::<usize>().map_err(|_| FormatError::InvalidIndex {
                    line: line_no,
                    content: line.to_string(),
                })?;
                let (start_time_ms, end_time_ms) = parse_timestamp_line(lines[i + 1], line_no + 1)?;

                if let Some(done) = current.take() {
                    entries.push(done);
                }
                current = Some(SubtitleEntry::new(seq_num, start_time_ms, end_time_ms, Vec::new()));
                at_block_boundary = false;
                i += 2;
                continue;
            }

            if at_block_boundary {
                if is_timestamp_line(line) {
                    return Err(FormatError::InvalidIndex { line: line_no, content: line.to_string() });
                }
                if is_index {
                    return Err(FormatError::MissingTimestamp { line: line_no });
                }
                if current.is_none() {
                    return Err(FormatError::InvalidIndex { line: line_no, content: line.to_string() });
                }
            }

            // Cue text, possibly after a blank line inside the block
            if let Some(entry) = current.as_mut() {
                entry.lines.push(line.to_string());
            }
            at_block_boundary = false;
            i += 1;
        }

        if let Some(done) = current.take() {
            entries.push(done);
        }

        debug!("Parsed {} subtitle entries", entries.len());
        Ok(entries)
    }
}

impl fmt::Display for SubtitleCollection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Subtitle Collection")?;
        writeln!(f, "Source: {:?}", self.source_file)?;
        writeln!(f, "Language: {}", self.source_language)?;
        writeln!(f, "Entries: {}", self.entries.len())?;
        Ok(())
    }
}

/// Reassign sequence numbers 1..n in slice order
pub fn renumber(entries: &mut [SubtitleEntry]) {
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.seq_num = i + 1;
    }
}

fn is_timestamp_line(line: &str) -> bool {
    line.contains("-->")
}

fn parse_timestamp_line(line: &str, line_no: usize) -> Result<(u64, u64), FormatError> {
    let invalid = || FormatError::InvalidTimestamp {
        line: line_no,
        content: line.to_string(),
    };

    let caps = TIMESTAMP_REGEX.captures(line).ok_or_else(invalid)?;
    let start = timestamp_from_captures(&caps, 1).ok_or_else(invalid)?;
    let end = timestamp_from_captures(&caps, 5).ok_or_else(invalid)?;

    if end <= start {
        return Err(FormatError::InvalidTimeRange { line: line_no });
    }
    Ok((start, end))
}

fn timestamp_from_captures(caps: &regex::Captures, start_idx: usize) -> Option<u64> {
    let field = |offset: usize| -> Option<u64> { caps.get(start_idx + offset)?.as_str().parse().ok() };
    let (hours, minutes, seconds, millis) = (field(0)?, field(1)?, field(2)?, field(3)?);

    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some((hours * 3600 + minutes * 60 + seconds) * 1000 + millis)
}
