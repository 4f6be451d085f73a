use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::FieldSchema;
use crate::models::{ExecutionStep, Record, RenderedDocument};

/// gpt-4o-mini rates, dollars per token.
const PROMPT_COST_PER_TOKEN: f64 = 0.150 / 1_000_000.0;
const COMPLETION_COST_PER_TOKEN: f64 = 0.600 / 1_000_000.0;

/// Documents beyond this many bytes are truncated before submission; a
/// fully hydrated listing page can exceed the model's context window.
const MAX_DOCUMENT_BYTES: usize = 400_000;

/// The service reply, resolved once at the boundary. Services asked for a raw
/// JSON array sometimes wrap it in an object under a `content` key instead;
/// both shapes resolve to the same record sequence. Anything else is kept
/// verbatim so it can still be persisted and inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionReply {
    Records(Vec<Record>),
    Wrapped(WrappedReply),
    Other(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedReply {
    pub content: Vec<Record>,
}

impl ExtractionReply {
    /// The record sequence, if the reply had a recognizable shape.
    pub fn records(&self) -> Option<&[Record]> {
        match self {
            Self::Records(records) => Some(records),
            Self::Wrapped(wrapped) => Some(&wrapped.content),
            Self::Other(_) => None,
        }
    }
}

/// Result of one extraction submission: the structured reply plus the
/// per-step execution metadata the cost projector consumes.
#[derive(Debug)]
pub struct ExtractionRun {
    pub reply: ExtractionReply,
    pub steps: Vec<ExecutionStep>,
}

/// Common trait for structured extraction backends.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Submit a rendered document with a field schema; returns the extracted
    /// records and execution metadata.
    async fn submit(
        &self,
        document: &RenderedDocument,
        schema: &FieldSchema,
    ) -> Result<ExtractionRun>;

    /// Name of the backing service, for logging.
    fn service_name(&self) -> &'static str;
}

/// OpenAI chat-completions backend.
pub struct OpenAiExtractor {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiExtractor {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }

    /// Override the chat model (default: gpt-4o-mini).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL (for proxies or compatible services).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl ExtractionService for OpenAiExtractor {
    async fn submit(
        &self,
        document: &RenderedDocument,
        schema: &FieldSchema,
    ) -> Result<ExtractionRun> {
        let html = clamp_document(&document.html);
        if html.len() < document.html.len() {
            warn!(
                "Document truncated from {} to {} bytes before submission",
                document.html.len(),
                html.len()
            );
        }

        let user_content = format!(
            "{}\n\nHTML source:\n{}",
            schema.instruction_block(),
            html
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a smart web-scraping assistant.",
                },
                ChatMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
            temperature: 0.0,
        };

        info!("Submitting {} bytes to {}", html.len(), self.model);
        let started = Instant::now();

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Extraction request failed")?
            .error_for_status()
            .context("Extraction service returned an error status")?
            .json::<ChatResponse>()
            .await
            .context("Failed to decode extraction service response")?;

        let elapsed = started.elapsed();

        let choice = response
            .choices
            .into_iter()
            .next()
            .context("Extraction service returned no choices")?;
        let cleaned = strip_code_fences(&choice.message.content);

        let reply = match serde_json::from_str::<ExtractionReply>(cleaned) {
            Ok(reply) => reply,
            Err(err) => {
                warn!("Service reply is not valid JSON ({}); keeping raw text", err);
                ExtractionReply::Other(Value::String(cleaned.to_string()))
            }
        };

        let usage = response.usage.unwrap_or_default();
        let steps = vec![
            ExecutionStep::new("submit_document")
                .with("document_bytes", html.len() as u64)
                .with("duration_ms", elapsed.as_millis() as u64),
            ExecutionStep::new("generate_answer")
                .with("prompt_tokens", usage.prompt_tokens)
                .with("completion_tokens", usage.completion_tokens)
                .with("total_tokens", usage.total_tokens)
                .with(
                    "llm_cost",
                    format!(
                        "${:.6}",
                        usage_cost(usage.prompt_tokens, usage.completion_tokens)
                    ),
                ),
        ];

        Ok(ExtractionRun { reply, steps })
    }

    fn service_name(&self) -> &'static str {
        "openai"
    }
}

/// Price a request from token usage at the default model's rates.
fn usage_cost(prompt_tokens: u64, completion_tokens: u64) -> f64 {
    prompt_tokens as f64 * PROMPT_COST_PER_TOKEN
        + completion_tokens as f64 * COMPLETION_COST_PER_TOKEN
}

/// Truncate to the submission byte cap without splitting a UTF-8 sequence.
fn clamp_document(html: &str) -> &str {
    if html.len() <= MAX_DOCUMENT_BYTES {
        return html;
    }
    let mut end = MAX_DOCUMENT_BYTES;
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    &html[..end]
}

/// Models fence JSON replies despite being told not to; tolerate it.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_array_resolves_to_records() {
        let reply: ExtractionReply = serde_json::from_str(
            r#"[{"car_name": "2023 Acura Integra", "car_price": "$27,584"},
                {"car_name": "2021 Jeep Wrangler", "car_price": "N/A"}]"#,
        )
        .unwrap();
        assert_eq!(reply.records().map(<[Record]>::len), Some(2));
    }

    #[test]
    fn wrapped_content_resolves_to_records() {
        let reply: ExtractionReply = serde_json::from_str(
            r#"{"content": [{"a": 1}, {"b": 2}, {"c": 3}]}"#,
        )
        .unwrap();
        assert_eq!(reply.records().map(<[Record]>::len), Some(3));
    }

    #[test]
    fn unexpected_shape_yields_no_records() {
        let reply: ExtractionReply =
            serde_json::from_str(r#"{"error": "no reviews found"}"#).unwrap();
        assert!(reply.records().is_none());

        let reply: ExtractionReply = serde_json::from_str(r#""just a string""#).unwrap();
        assert!(reply.records().is_none());
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  [1]  "), "[1]");
    }

    #[test]
    fn usage_pricing_matches_rates() {
        let cost = usage_cost(1_000_000, 0);
        assert!((cost - 0.150).abs() < 1e-9);
        let cost = usage_cost(0, 1_000_000);
        assert!((cost - 0.600).abs() < 1e-9);
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        let s = "é".repeat(MAX_DOCUMENT_BYTES);
        let clamped = clamp_document(&s);
        assert!(clamped.len() <= MAX_DOCUMENT_BYTES);
        assert!(s.is_char_boundary(clamped.len()));
    }
}
