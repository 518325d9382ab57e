/*!
 * Deterministic agents for tests and dry runs.
 *
 * - `MockAgent::echo(role)` returns its input unchanged
 * - `MockAgent::transform(role, f)` applies `f` to the input
 * - `MockAgent::approving()` is a reviewer that always approves
 * - `MockAgent::scripted(role, responses)` replays responses in order,
 *   repeating the last one once the script runs out
 * - `MockAgent::failing(role, kind)` always fails with `kind`
 * - `MockAgent::slow(role, ms)` sleeps, then echoes
 *
 * `with_delay(ms)` makes any of them sleep before answering. Every mock
 * records its calls, inputs, contexts and the peak number of invocations
 * running at once, shared between clones.
 */

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::agents::{Agent, AgentContext, AgentOutput, AgentRole, ReviewResult};
use crate::errors::{AgentError, AgentErrorKind};

/// Behavior mode for the mock agent
#[derive(Debug, Clone)]
pub enum MockAgentBehavior {
    Echo,
    Transform(fn(&str) -> String),
    Scripted,
    Failing(AgentErrorKind),
}

#[derive(Debug)]
pub struct MockAgent {
    role: AgentRole,
    behavior: MockAgentBehavior,
    delay: Option<Duration>,
    script: Arc<Mutex<VecDeque<Result<String, AgentError>>>>,
    call_count: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    contexts: Arc<Mutex<Vec<AgentContext>>>,
    inputs: Arc<Mutex<Vec<String>>>,
}

/// Counts one running invocation until dropped
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockAgent {
    pub fn new(role: AgentRole, behavior: MockAgentBehavior) -> Self {
        Self {
            role,
            behavior,
            delay: None,
            script: Arc::new(Mutex::new(VecDeque::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            contexts: Arc::new(Mutex::new(Vec::new())),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn echo(role: AgentRole) -> Self {
        Self::new(role, MockAgentBehavior::Echo)
    }

    pub fn transform(role: AgentRole, f: fn(&str) -> String) -> Self {
        Self::new(role, MockAgentBehavior::Transform(f))
    }

    pub fn approving() -> Self {
        Self::scripted(AgentRole::Reviewer, vec![Ok(ReviewResult::approved().to_json())])
    }

    pub fn scripted(role: AgentRole, responses: Vec<Result<String, AgentError>>) -> Self {
        let agent = Self::new(role, MockAgentBehavior::Scripted);
        agent.script.lock().extend(responses);
        agent
    }

    pub fn failing(role: AgentRole, kind: AgentErrorKind) -> Self {
        Self::new(role, MockAgentBehavior::Failing(kind))
    }

    pub fn slow(role: AgentRole, delay_ms: u64) -> Self {
        Self::echo(role).with_delay(delay_ms)
    }

    /// Sleep for `delay_ms` before every answer
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(delay_ms));
        self
    }

    /// Number of invocations so far, shared between clones
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Most invocations that were running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Option<AgentContext> {
        self.contexts.lock().last().cloned()
    }

    /// Every text this agent was invoked with, in call order
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }

    fn next_scripted(&self) -> Result<String, AgentError> {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap_or_else(|| Err(AgentError::malformed("empty script")))
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Err(AgentError::malformed("empty script")))
        }
    }

    fn wrap(&self, text: String) -> AgentOutput {
        match self.role {
            AgentRole::Reviewer => AgentOutput::Review(text),
            _ => AgentOutput::Text(text),
        }
    }
}

impl Clone for MockAgent {
    fn clone(&self) -> Self {
        Self {
            role: self.role,
            behavior: self.behavior.clone(),
            delay: self.delay,
            script: Arc::clone(&self.script),
            call_count: Arc::clone(&self.call_count),
            running: Arc::clone(&self.running),
            peak: Arc::clone(&self.peak),
            contexts: Arc::clone(&self.contexts),
            inputs: Arc::clone(&self.inputs),
        }
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn role(&self) -> AgentRole {
        self.role
    }

    async fn invoke(&self, text: &str, context: &AgentContext) -> Result<AgentOutput, AgentError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().push(context.clone());
        self.inputs.lock().push(text.to_string());

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);
        let _guard = RunningGuard(Arc::clone(&self.running));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            MockAgentBehavior::Echo => Ok(self.wrap(text.to_string())),
            MockAgentBehavior::Transform(f) => Ok(self.wrap(f(text))),
            MockAgentBehavior::Scripted => self.next_scripted().map(|t| self.wrap(t)),
            MockAgentBehavior::Failing(kind) => Err(AgentError::new(*kind, format!("mock {} failure", self.role))),
        }
    }
}
