use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::agents::prompts::{system_prompt, PromptTemplate};
use crate::agents::{Agent, AgentContext, AgentOutput, AgentRole};
use crate::errors::AgentError;
use crate::pipeline::merge::content_lines;
use crate::providers::{ChatMessage, CompletionRequest, Provider};

/// Default completion budget per call
pub const DEFAULT_MAX_TOKENS: u32 = 2500;

/// An agent backed by a language model provider
pub struct LlmAgent {
    role: AgentRole,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    template: PromptTemplate,
}

impl LlmAgent {
    pub fn new(role: AgentRole, provider: Arc<dyn Provider>, model: &str) -> Self {
        Self {
            role,
            provider,
            model: model.to_string(),
            temperature: 0.3,
            max_tokens: DEFAULT_MAX_TOKENS,
            template: PromptTemplate::for_role(role),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(&self, text: &str, context: &AgentContext) -> CompletionRequest {
        CompletionRequest::new(&self.model)
            .add_message(ChatMessage::system(system_prompt(self.role, &self.template, context)))
            .add_message(ChatMessage::user(text))
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .json_mode(self.role == AgentRole::Reviewer)
    }
}

impl fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmAgent")
            .field("role", &self.role)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn role(&self) -> AgentRole {
        self.role
    }

    async fn invoke(&self, text: &str, context: &AgentContext) -> Result<AgentOutput, AgentError> {
        let request = self.build_request(text, context);
        let response = self.provider.complete(request).await?;

        debug!(
            "{} answered with {} chars (tokens in/out: {:?}/{:?})",
            self.role,
            response.text.len(),
            response.prompt_tokens,
            response.completion_tokens
        );

        if self.role == AgentRole::Reviewer {
            return Ok(AgentOutput::Review(response.text));
        }

        // One output line per input line; lead-in chatter is dropped
        let cleaned = content_lines(&response.text, text.lines().count()).join("\n");
        if cleaned.is_empty() && !text.trim().is_empty() {
            return Err(AgentError::malformed(format!("{} returned no text", self.role)));
        }
        Ok(AgentOutput::Text(cleaned))
    }
}
