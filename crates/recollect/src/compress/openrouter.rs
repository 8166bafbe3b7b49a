//! [`Compressor`] over the OpenRouter chat completions API.
//!
//! Requests JSON output constrained by the result type's schema, validates
//! the reply against the same schema with `jsonschema`, and treats anything
//! that fails to parse or validate as "no result". Rate limits, 5xx replies
//! and dropped connections are retried with [`RetryConfig`] backoff.

use super::capability::{
    CompressFuture, Compressor, CondensationOutput, CondensationRequest, ExtractionOutput,
    ExtractionRequest,
};
use super::retry::{
    API_ERROR_PREFIX, HTTP_ERROR_PREFIX, REQUEST_FAILED_PREFIX, RetryConfig, retry_with_backoff,
};
use crate::json_schema_for;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// OpenRouter chat completions endpoint.
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Model used when neither the request nor the compressor names one.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Output token cap for a single compression call.
pub const COMPRESSION_MAX_TOKENS: u32 = 8_192;

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct ResponseFormat {
    #[serde(rename = "type")]
    fmt_type: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize, Debug)]
struct JsonSchemaFormat {
    name: &'static str,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

#[derive(Deserialize, Debug, Clone)]
struct UsageInfo {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

pub struct OpenRouterCompressor {
    client: reqwest::Client,
    api_key: String,
    referer: String,
    title: String,
    model: String,
    retry: RetryConfig,
    debug: bool,
}

impl OpenRouterCompressor {
    /// Create a compressor with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/tacryt-socryp/recollect", "recollect")
    }

    /// Create a compressor with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("recollect/0.1")
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
            model: DEFAULT_MODEL.to_string(),
            retry: RetryConfig::default(),
            debug: false,
        })
    }

    /// Read the API key from `OPENROUTER_KEY`.
    pub fn from_env() -> Result<Self, String> {
        let api_key =
            std::env::var("OPENROUTER_KEY").map_err(|_| "OPENROUTER_KEY not set".to_string())?;
        Self::new(api_key)
    }

    /// Default model for requests that do not carry an override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Log prompts and raw replies at DEBUG level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// One chat round trip. Returns the first choice's text content.
    async fn chat(&self, body: &ChatRequest<'_>) -> Result<Option<String>, String> {
        debug!(
            "Compression request: model={}, schema={}, max_tokens={}",
            body.model, body.response_format.json_schema.name, body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("{REQUEST_FAILED_PREFIX}{e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "Compression response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("{HTTP_ERROR_PREFIX}{status}: {text}"));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("{API_ERROR_PREFIX}{}", err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        if let Some(reason) = choice.as_ref().and_then(|c| c.finish_reason.as_deref())
            && reason == "length"
        {
            warn!("Compression output hit the token limit; the reply may be truncated");
        }
        Ok(choice.and_then(|c| c.message.content))
    }

    async fn complete<T>(
        &self,
        schema_name: &'static str,
        system: &str,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<Option<T>, String>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema = json_schema_for::<T>();
        let body = ChatRequest {
            model: model.unwrap_or(&self.model),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: COMPRESSION_MAX_TOKENS,
            temperature: 0.2,
            response_format: ResponseFormat {
                fmt_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: schema_name,
                    strict: false,
                    schema: schema.clone(),
                },
            },
        };

        if self.debug {
            debug!("Compression system prompt:\n{system}");
            debug!("Compression user prompt:\n{prompt}");
        }

        let Some(content) = retry_with_backoff(&self.retry, || self.chat(&body)).await? else {
            debug!("Compression reply had no content");
            return Ok(None);
        };

        if self.debug {
            debug!("Compression raw reply:\n{content}");
        }

        Ok(parse_reply(&content, &schema))
    }
}

/// Parse and validate a reply. Anything unusable becomes `None`.
fn parse_reply<T: DeserializeOwned>(content: &str, schema: &serde_json::Value) -> Option<T> {
    let json = strip_code_fence(content);
    let value: serde_json::Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            warn!("Compression reply is not JSON: {e}");
            return None;
        }
    };

    match jsonschema::validator_for(schema) {
        Ok(validator) => {
            if !validator.is_valid(&value) {
                let errors: Vec<String> = validator
                    .iter_errors(&value)
                    .take(3)
                    .map(|e| format!("{}: {e}", e.instance_path()))
                    .collect();
                warn!("Compression reply does not match schema: {}", errors.join("; "));
                return None;
            }
        }
        Err(e) => debug!("Skipping reply validation, schema did not compile: {e}"),
    }

    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Compression reply did not deserialize: {e}");
            None
        }
    }
}

/// Remove a surrounding ```json fence if the model added one.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

impl Compressor for OpenRouterCompressor {
    fn extract(&self, request: ExtractionRequest) -> CompressFuture<'_, ExtractionOutput> {
        Box::pin(async move {
            self.complete(
                "observation_extraction",
                &request.system,
                &request.prompt,
                request.model.as_deref(),
            )
            .await
        })
    }

    fn condense(&self, request: CondensationRequest) -> CompressFuture<'_, CondensationOutput> {
        Box::pin(async move {
            self.complete(
                "observation_condensation",
                &request.system,
                &request.prompt,
                request.model.as_deref(),
            )
            .await
        })
    }
}
