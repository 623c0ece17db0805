//! AI grading client.
//!
//! Talks to the Anthropic Messages API when a key is configured, falling back
//! to the OpenAI chat completions API otherwise. Transport failures retry a
//! fixed number of times with a flat pause.

use crate::ai::prompts;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_secs(2);
const MAX_OUTPUT_TOKENS: u32 = 1024;

/// Grading failures the API layer can tell apart
#[derive(Debug)]
pub enum GraderError {
    /// Neither provider key is configured
    NotConfigured,
    /// All attempts exhausted or the provider rejected the request
    RequestFailed(String),
}

impl std::fmt::Display for GraderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraderError::NotConfigured => write!(f, "No AI provider configured"),
            GraderError::RequestFailed(msg) => write!(f, "AI request failed: {}", msg),
        }
    }
}

impl std::error::Error for GraderError {}

/// Feedback produced by the model
#[derive(Debug, Clone)]
pub struct GradedFeedback {
    pub content: String,
    pub grade: Option<String>,
}

/// Client for whichever provider is configured
#[derive(Clone)]
pub struct AiGrader {
    http: reqwest::Client,
    anthropic_key: Option<String>,
    openai_key: Option<String>,
    model: String,
}

impl AiGrader {
    pub fn new(
        http: reqwest::Client,
        anthropic_key: Option<String>,
        openai_key: Option<String>,
        model: String,
    ) -> Self {
        if anthropic_key.is_some() {
            info!("🤖 AI grading via Anthropic ({})", model);
        } else if openai_key.is_some() {
            info!("🤖 AI grading via OpenAI ({})", model);
        } else {
            info!("🤖 AI grading disabled - no provider key configured");
        }

        Self {
            http,
            anthropic_key,
            openai_key,
            model,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.anthropic_key.is_some() || self.openai_key.is_some()
    }

    /// Grade a submission, optionally against a correction template.
    pub async fn grade_submission(
        &self,
        submission_title: &str,
        submission_text: &str,
        correction_template: Option<&str>,
    ) -> Result<GradedFeedback, GraderError> {
        if !self.is_configured() {
            return Err(GraderError::NotConfigured);
        }

        let prompt = prompts::grading_prompt(submission_title, submission_text, correction_template);

        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let result = if self.anthropic_key.is_some() {
                self.complete_anthropic(&prompt).await
            } else {
                self.complete_openai(&prompt).await
            };

            match result {
                Ok(text) => {
                    let (content, grade) = parse_grade(&text);
                    debug!(grade = ?grade, "AI grading completed");
                    return Ok(GradedFeedback { content, grade });
                }
                Err(e) => {
                    warn!("AI request attempt {}/{} failed: {}", attempt, MAX_ATTEMPTS, e);
                    last_error = e.to_string();
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_PAUSE).await;
                    }
                }
            }
        }

        Err(GraderError::RequestFailed(last_error))
    }

    async fn complete_anthropic(&self, prompt: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct MessagesResponse {
            content: Vec<ContentBlock>,
        }

        let key = self
            .anthropic_key
            .as_deref()
            .context("Anthropic key missing")?;

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let resp = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("POST /v1/messages failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API {}: {}", status, text);
        }

        let parsed = resp
            .json::<MessagesResponse>()
            .await
            .context("Failed to parse Anthropic response")?;

        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .context("Anthropic response had no text content")
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        let key = self.openai_key.as_deref().context("OpenAI key missing")?;

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let resp = self
            .http
            .post(OPENAI_API_URL)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .context("POST /v1/chat/completions failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API {}: {}", status, text);
        }

        let parsed = resp
            .json::<ChatResponse>()
            .await
            .context("Failed to parse OpenAI response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("OpenAI response had no choices")
    }
}

/// Split the model output into feedback prose and the trailing `GRADE:` line.
pub fn parse_grade(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim();
    for line in trimmed.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(grade) = line.strip_prefix("GRADE:") {
            let grade = grade.trim();
            if grade.is_empty() {
                break;
            }
            let content = trimmed
                .rsplit_once(line)
                .map(|(head, _)| head.trim().to_string())
                .unwrap_or_else(|| trimmed.to_string());
            return (content, Some(grade.to_string()));
        }
        // Last non-empty line is not a grade line
        break;
    }
    (trimmed.to_string(), None)
}
