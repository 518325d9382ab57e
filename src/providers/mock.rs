/*!
 * Mock provider implementations for testing.
 *
 * - `MockProvider::working()` echoes the user message back
 * - `MockProvider::failing()` always fails with a server error
 * - `MockProvider::rate_limited()` always answers 429
 * - `MockProvider::malformed()` returns an undecodable body
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::providers::{CompletionRequest, CompletionResponse, Provider};

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Always fails with an API error
    Failing,
    /// Always reports rate limiting
    RateLimited,
    /// Succeeds at HTTP level but the body cannot be decoded
    Malformed,
}

/// Mock provider for testing agent behavior without a network
#[derive(Debug)]
pub struct MockProvider {
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
    /// Requests seen so far, shared between clones
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    custom_response: Option<fn(&CompletionRequest) -> String>,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            custom_response: None,
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn rate_limited() -> Self {
        Self::new(MockBehavior::RateLimited)
    }

    pub fn malformed() -> Self {
        Self::new(MockBehavior::Malformed)
    }

    pub fn with_custom_response(mut self, generator: fn(&CompletionRequest) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// The most recent request, if any
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().last().cloned()
    }

    fn respond(&self, request: &CompletionRequest) -> CompletionResponse {
        let text = match self.custom_response {
            Some(generator) => generator(request),
            None => request.user_content().to_string(),
        };
        CompletionResponse {
            prompt_tokens: Some(request.user_content().len() as u64),
            completion_tokens: Some(text.len() as u64),
            text,
        }
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            requests: Arc::clone(&self.requests),
            custom_response: self.custom_response,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        match self.behavior {
            MockBehavior::Working => Ok(self.respond(&request)),
            MockBehavior::Failing => Err(ProviderError::ApiError {
                status_code: 500,
                message: "Mock provider failure".to_string(),
            }),
            MockBehavior::RateLimited => Err(ProviderError::RateLimitExceeded("Mock rate limit".to_string())),
            MockBehavior::Malformed => Err(ProviderError::ParseError("expected value at line 1".to_string())),
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Mock connection failure".to_string())),
            _ => Ok(()),
        }
    }
}
