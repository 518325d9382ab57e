/*!
 * Agent capabilities.
 *
 * Every pipeline role (segmenter, proofreader, translator, reviewer,
 * improver) implements the same [`Agent`] contract: given text and a
 * context, return transformed text or a raw review payload. The
 * orchestrator only ever talks to `Arc<dyn Agent>`, so any role can be
 * swapped for a different implementation, including the deterministic
 * [`mock::MockAgent`] used in tests and dry runs.
 */

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::AgentError;

pub mod llm;
pub mod mock;
pub mod prompts;
pub mod review;

pub use llm::LlmAgent;
pub use mock::MockAgent;
pub use review::{ReviewIssue, ReviewResult, ReviewStatus, Severity};

/// The five pipeline roles, in stage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Segmenter,
    Proofreader,
    Translator,
    Reviewer,
    Improver,
}

impl AgentRole {
    pub const ALL: [AgentRole; 5] = [
        AgentRole::Segmenter,
        AgentRole::Proofreader,
        AgentRole::Translator,
        AgentRole::Reviewer,
        AgentRole::Improver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Segmenter => "segmenter",
            Self::Proofreader => "proofreader",
            Self::Translator => "translator",
            Self::Reviewer => "reviewer",
            Self::Improver => "improver",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an agent may need besides the text itself
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub source_language: String,
    pub target_language: String,
    /// Text the translation was made from, for reviewer comparison
    pub source_text: Option<String>,
    /// Issues from the previous review, for the improver
    pub prior_issues: Vec<ReviewIssue>,
}

impl AgentContext {
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            ..Default::default()
        }
    }

    pub fn with_source_text(mut self, source_text: Option<String>) -> Self {
        self.source_text = source_text;
        self
    }

    pub fn with_prior_issues(mut self, issues: Vec<ReviewIssue>) -> Self {
        self.prior_issues = issues;
        self
    }
}

/// What an agent returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutput {
    /// Transformed text (segmenter, proofreader, translator, improver)
    Text(String),
    /// Raw reviewer payload, deserialized by the caller
    Review(String),
}

impl AgentOutput {
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) | Self::Review(text) => text,
        }
    }
}

/// One text-transformation or text-review capability
#[async_trait]
pub trait Agent: Send + Sync + Debug {
    /// The role this agent plays
    fn role(&self) -> AgentRole;

    /// Transform or review `text`
    async fn invoke(&self, text: &str, context: &AgentContext) -> Result<AgentOutput, AgentError>;
}

/// One implementation per role
#[derive(Debug, Clone)]
pub struct AgentSet {
    pub segmenter: Arc<dyn Agent>,
    pub proofreader: Arc<dyn Agent>,
    pub translator: Arc<dyn Agent>,
    pub reviewer: Arc<dyn Agent>,
    pub improver: Arc<dyn Agent>,
}

impl AgentSet {
    /// Build a set where every role comes from the same factory
    pub fn from_fn<F>(mut make: F) -> Self
    where
        F: FnMut(AgentRole) -> Arc<dyn Agent>,
    {
        Self {
            segmenter: make(AgentRole::Segmenter),
            proofreader: make(AgentRole::Proofreader),
            translator: make(AgentRole::Translator),
            reviewer: make(AgentRole::Reviewer),
            improver: make(AgentRole::Improver),
        }
    }

    /// Agents that never touch the network: text passes through unchanged
    /// and every review approves.
    pub fn dry_run() -> Self {
        Self::from_fn(|role| match role {
            AgentRole::Reviewer => Arc::new(MockAgent::approving()) as Arc<dyn Agent>,
            other => Arc::new(MockAgent::echo(other)) as Arc<dyn Agent>,
        })
    }

    pub fn get(&self, role: AgentRole) -> &Arc<dyn Agent> {
        match role {
            AgentRole::Segmenter => &self.segmenter,
            AgentRole::Proofreader => &self.proofreader,
            AgentRole::Translator => &self.translator,
            AgentRole::Reviewer => &self.reviewer,
            AgentRole::Improver => &self.improver,
        }
    }

    /// Replace the implementation for one role
    pub fn with(mut self, agent: Arc<dyn Agent>) -> Self {
        match agent.role() {
            AgentRole::Segmenter => self.segmenter = agent,
            AgentRole::Proofreader => self.proofreader = agent,
            AgentRole::Translator => self.translator = agent,
            AgentRole::Reviewer => self.reviewer = agent,
            AgentRole::Improver => self.improver = agent,
        }
        self
    }
}
