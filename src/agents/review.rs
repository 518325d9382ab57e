/*!
 * Structured reviewer feedback.
 *
 * The reviewer answers with JSON:
 * `{"status": "approved" | "needs_improvement", "issues": [{"location", "description", "severity"}]}`.
 * Older reviewer prompts answered with `line_number` instead of `location`
 * and a 1-10 `quality_score` instead of a status; both are still accepted.
 */

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AgentError;

/// Score at or above which a scored review counts as approved
pub const APPROVAL_SCORE: f64 = 8.0;

/// Reviewer verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    NeedsImprovement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "low" | "minor" | "info" => Self::Low,
            "high" | "major" | "critical" | "severe" => Self::High,
            _ => Self::Medium,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

/// One problem found by the reviewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewIssue {
    /// Where the problem is, e.g. "line 3"
    pub location: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ReviewIssue {
    pub fn new(location: &str, description: &str, severity: Severity) -> Self {
        Self {
            location: location.to_string(),
            description: description.to_string(),
            severity,
            suggestion: None,
        }
    }

    /// Stand-in issue for a reviewer answer that could not be read
    pub fn unparsable(detail: &str) -> Self {
        Self {
            location: "chunk".to_string(),
            description: format!("unparsable review output: {}", detail),
            severity: Severity::High,
            suggestion: None,
        }
    }
}

impl fmt::Display for ReviewIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.location, self.description)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (suggestion: {})", suggestion)?;
        }
        Ok(())
    }
}

/// Parsed reviewer verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub status: ReviewStatus,
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    issues: Vec<RawIssue>,
    #[serde(default)]
    quality_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(default, alias = "line_number", alias = "line")]
    location: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    issue_type: Option<String>,
}

impl RawIssue {
    fn into_issue(self) -> ReviewIssue {
        let location = match self.location {
            Some(Value::Number(n)) => format!("line {}", n),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => "unspecified".to_string(),
        };
        let description = match (self.description, self.issue_type) {
            (Some(d), _) => d,
            (None, Some(kind)) => kind,
            (None, None) => String::new(),
        };

        ReviewIssue {
            location,
            description,
            severity: self.severity.as_deref().map_or(Severity::Medium, Severity::parse_lenient),
            suggestion: self.suggestion,
        }
    }
}

impl ReviewResult {
    pub fn approved() -> Self {
        Self { status: ReviewStatus::Approved, issues: Vec::new() }
    }

    pub fn needs_improvement(issues: Vec<ReviewIssue>) -> Self {
        Self { status: ReviewStatus::NeedsImprovement, issues }
    }

    pub fn is_approved(&self) -> bool {
        self.status == ReviewStatus::Approved
    }

    /// Deserialize a reviewer payload.
    ///
    /// Anything that is not a recognisable verdict is a
    /// `MalformedResponse`, never an approval.
    pub fn parse(payload: &str) -> Result<Self, AgentError> {
        let json = extract_json(payload)
            .ok_or_else(|| AgentError::malformed("no JSON object in review output"))?;
        let raw: RawReview = serde_json::from_str(json)
            .map_err(|e| AgentError::malformed(format!("invalid review JSON: {}", e)))?;

        let status = match (raw.status.as_deref(), raw.quality_score) {
            (Some(status), _) => parse_status(status)
                .ok_or_else(|| AgentError::malformed(format!("unknown review status '{}'", status)))?,
            (None, Some(score)) if score >= APPROVAL_SCORE => ReviewStatus::Approved,
            (None, Some(_)) => ReviewStatus::NeedsImprovement,
            (None, None) => return Err(AgentError::malformed("review has neither status nor quality_score")),
        };

        Ok(Self {
            status,
            issues: raw.issues.into_iter().map(RawIssue::into_issue).collect(),
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn parse_status(value: &str) -> Option<ReviewStatus> {
    let normalized: String = value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect();

    match normalized.as_str() {
        "approved" | "approve" | "pass" => Some(ReviewStatus::Approved),
        "needs_improvement" | "needs_improvements" | "rejected" | "revise" => Some(ReviewStatus::NeedsImprovement),
        _ => None,
    }
}

/// Find the JSON object in a possibly wrapped model response
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if trimmed.starts_with('{') {
        return Some(trimmed);
    }

    // Markdown code fence with a language tag
    if let Some(start) = trimmed.find("```json") {
        if let Some(end) = trimmed[start + 7..].find("```") {
            return Some(trimmed[start + 7..start + 7 + end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        if let Some(end) = trimmed[start + 3..].find("```") {
            let json = trimmed[start + 3..start + 3 + end].trim();
            if json.starts_with('{') {
                return Some(json);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&trimmed[start..=end]),
        _ => None,
    }
}
