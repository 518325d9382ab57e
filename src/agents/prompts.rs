/*!
 * System prompts for the pipeline roles.
 *
 * The user message of every call is the chunk text itself: one subtitle cue
 * per line, with `\N` marking a line break inside a cue. Everything else
 * (instructions, source text for comparison, reviewer issues) goes into the
 * system prompt.
 */

use crate::agents::{AgentContext, AgentRole};
use crate::language_utils;

const LINE_PROTOCOL: &str = r#"## Input format
- Every line of the input is exactly one subtitle cue, in playback order
- The token \N marks a line break inside a cue; keep it where a break still makes sense
- Formatting tags such as <i>, <b> and {\an8} must be preserved exactly

## Output format
- Return exactly as many lines as the input, in the same order, one cue per line
- Return only the subtitle text, with no numbering, commentary or code fences"#;

const SEGMENTER: &str = r#"You are a subtitle segmentation specialist working on {source_language} subtitles produced by speech recognition.

## Your Role
- Fix sentence breaks that were split badly across neighbouring cues
- Move words between adjacent cues only when a sentence clearly belongs to the other cue
- Never merge two cues into one line and never leave a cue empty
- Do not translate, rephrase or correct spelling"#;

const PROOFREADER: &str = r#"You are a meticulous {source_language} subtitle proofreader.

## Your Role
- Correct spelling, punctuation, capitalisation and obvious recognition errors
- Keep the speaker's wording and register; do not rewrite for style
- Do not translate"#;

const TRANSLATOR: &str = r#"You are an expert subtitle translator specializing in {source_language} to {target_language} translation.

## Your Role
- Translate dialogue naturally while preserving meaning and emotion
- Keep translations concise; subtitles have limited display time
- Preserve [sound effects] and (parentheticals) as formatted
- Never translate character names unless they have an established translation"#;

const REVIEWER: &str = r#"You are a senior subtitle reviewer checking a {source_language} to {target_language} translation.

## Your Role
- Check accuracy, fluency, terminology consistency and cue length
- Report only concrete problems; do not rewrite the translation

## Output format
Return ONLY a JSON object:
{"status": "approved" | "needs_improvement", "issues": [{"location": "line N", "description": "...", "severity": "low" | "medium" | "high"}]}
Use "approved" with an empty issues list when the translation is ready to publish."#;

const IMPROVER: &str = r#"You are a subtitle editor improving a {target_language} translation of {source_language} subtitles.

## Your Role
- Fix every issue listed below and nothing else
- Keep all lines that have no reported issue unchanged"#;

/// Prompt template with language placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Self {
        Self { template: template.to_string() }
    }

    /// Built-in template for a role
    pub fn for_role(role: AgentRole) -> Self {
        Self::new(match role {
            AgentRole::Segmenter => SEGMENTER,
            AgentRole::Proofreader => PROOFREADER,
            AgentRole::Translator => TRANSLATOR,
            AgentRole::Reviewer => REVIEWER,
            AgentRole::Improver => IMPROVER,
        })
    }

    /// Render the template with the given language names
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

/// Full system prompt for one call
pub fn system_prompt(role: AgentRole, template: &PromptTemplate, context: &AgentContext) -> String {
    let source = language_utils::display_name(&context.source_language);
    let target = language_utils::display_name(&context.target_language);
    let mut prompt = template.render(&source, &target);

    match role {
        AgentRole::Reviewer => {
            if let Some(source_text) = &context.source_text {
                prompt.push_str("\n\n## Source text (one cue per line)\n");
                prompt.push_str(source_text);
            }
        }
        AgentRole::Improver => {
            prompt.push_str("\n\n## Reported issues\n");
            if context.prior_issues.is_empty() {
                prompt.push_str("- none reported; polish fluency only\n");
            }
            for issue in &context.prior_issues {
                prompt.push_str(&format!("- {}\n", issue));
            }
            prompt.push('\n');
            prompt.push_str(LINE_PROTOCOL);
        }
        AgentRole::Segmenter | AgentRole::Proofreader | AgentRole::Translator => {
            prompt.push_str("\n\n");
            prompt.push_str(LINE_PROTOCOL);
        }
    }

    prompt
}
