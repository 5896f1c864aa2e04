//! The drafting seam: a minimal trait over an OpenAI-compatible chat API.
//!
//! [`Collaborator::generate`] takes a per-country [`DraftRequest`] and
//! returns the model's raw text reply; parsing and validation live in
//! [`crate::drafting`]. Production wraps [`OpenAiCollaborator`] in
//! [`RetryCollaborator`] so throttling and transient server errors get a
//! few backed-off attempts while malformed replies surface immediately.
//!
//! # Retry Strategy
//!
//! - Maximum 3 attempts per call
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::drafting;
use crate::error::CollaboratorError;
use crate::models::FusedCorpus;
use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Everything one drafting call needs to know about its country.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub country: String,
    pub cutoff: NaiveDate,
    pub corpus_text: String,
    pub info_limit: usize,
    pub email_min_items: usize,
    pub email_words_min: usize,
    pub email_words_max: usize,
    pub temperature: f32,
}

impl DraftRequest {
    /// Build a request from a fused corpus and the run's drafting knobs.
    pub fn from_corpus(
        corpus: &FusedCorpus,
        corpus_text: String,
        info_limit: usize,
        email_min_items: usize,
        email_words_min: usize,
        email_words_max: usize,
        temperature: f32,
    ) -> Self {
        Self {
            country: corpus.country.clone(),
            cutoff: corpus.cutoff,
            corpus_text,
            info_limit,
            email_min_items,
            email_words_min,
            email_words_max,
            temperature,
        }
    }
}

/// Asynchronous drafting call.
///
/// Implementations return the model's raw reply text; decoding it into
/// bullets and drafts is [`crate::drafting`]'s job.
pub trait Collaborator {
    async fn generate(&self, request: &DraftRequest) -> Result<String, CollaboratorError>;
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiCollaborator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCollaborator {
    /// Drafting calls carry a whole corpus and wait on generation, so the
    /// timeout sits far above the fetch client's.
    pub fn new(api_key: &str, model: &str) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.to_string(),
        })
    }

    /// Point at a proxy or self-hosted endpoint. Trailing slashes are fine.
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

impl Collaborator for OpenAiCollaborator {
    #[instrument(level = "info", skip_all, fields(country = %request.country))]
    async fn generate(&self, request: &DraftRequest) -> Result<String, CollaboratorError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: drafting::SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: drafting::build_prompt(request),
                },
            ],
            temperature: request.temperature,
        };

        let t0 = Instant::now();
        debug!(model = %self.model, "Drafting request");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Drafting call failed"
            );
            return Err(CollaboratorError::Api {
                status: status.as_u16(),
                detail: truncate_for_log(&text, 300),
            });
        }
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = text.len(),
            "Drafting reply received"
        );
        first_content(&text)
    }
}

/// Pull the first choice's content out of a raw chat-completions body.
fn first_content(text: &str) -> Result<String, CollaboratorError> {
    let parsed: ChatResponse =
        serde_json::from_str(text).map_err(|e| CollaboratorError::Malformed {
            detail: e.to_string(),
            preview: truncate_for_log(text, 300),
        })?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(CollaboratorError::Empty)
}

/// Decorator that adds exponential backoff retry logic to any
/// [`Collaborator`] implementation.
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryCollaborator<T> {
    inner: T,
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryCollaborator<T>
where
    T: Collaborator,
{
    pub fn new(inner: T) -> Self {
        Self::with_policy(inner, 3, Duration::from_secs(1), Duration::from_secs(30))
    }

    pub fn with_policy(
        inner: T,
        max_attempts: usize,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }
}

impl<T> Collaborator for RetryCollaborator<T>
where
    T: Collaborator,
{
    #[instrument(level = "info", skip_all, fields(country = %request.country))]
    async fn generate(&self, request: &DraftRequest) -> Result<String, CollaboratorError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;
        loop {
            let attempt_t0 = Instant::now();
            match self.inner.generate(request).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt >= self.max_attempts {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "Drafting retries exhausted"
                        );
                        return Err(e);
                    }
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                        ?delay,
                        error = %e,
                        "Drafting attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod stubs {
    //! Scripted [`Collaborator`] implementations shared by the unit tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of replies regardless of request content.
    pub struct StubCollaborator {
        replies: Mutex<VecDeque<Result<String, CollaboratorError>>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl StubCollaborator {
        pub fn new(replies: Vec<Result<String, CollaboratorError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Collaborator for StubCollaborator {
        async fn generate(&self, request: &DraftRequest) -> Result<String, CollaboratorError> {
            self.requests.lock().unwrap().push(request.country.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(CollaboratorError::Empty))
        }
    }
}
