//! Semantic labeling of discovered templates.
//!
//! All templates of an ingest run are sent to an external chat model in a
//! single call. The request uses the OpenAI-compatible chat-completion shape
//! with a strict JSON response format, so the reply content must parse
//! directly as a JSON array; nothing is stripped or repaired.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config;
use crate::error::LappError;

/// Default chat-completion endpoint base.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Overall request timeout for the single labeling call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// How much of an unparseable reply is included in the decode error.
const DECODE_SNIPPET_LEN: usize = 200;

/// Configuration for the labeler.
#[derive(Debug, Clone)]
pub struct LabelerConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Model identifier; resolved against `MODEL_NAME` and the built-in
    /// default when unset.
    pub model: Option<String>,
    /// Endpoint base URL. Tests point this at a local mock server.
    pub base_url: String,
}

impl LabelerConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// A log pattern to be labeled, with up to a few representative sample
/// lines from its cluster as model context.
#[derive(Debug, Clone)]
pub struct PatternInput {
    pub pattern_id: Uuid,
    pub pattern: String,
    pub samples: Vec<String>,
}

/// The model-generated label for one pattern. `pattern_id` echoes the input.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SemanticLabel {
    pub pattern_id: String,
    pub semantic_id: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Send all patterns to the model in a single call and return their labels.
/// Any transport or decode failure aborts labeling for the run.
pub async fn label(
    config: &LabelerConfig,
    patterns: &[PatternInput],
) -> Result<Vec<SemanticLabel>, LappError> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let model = config::resolve_model(config.model.as_deref());
    let prompt = build_prompt(patterns);
    debug!(model, patterns = patterns.len(), "requesting semantic labels");

    let content = call_chat_model(config, &model, &prompt).await?;
    parse_response(&content)
}

fn build_prompt(patterns: &[PatternInput]) -> String {
    let mut b = String::from(
        "You are a log analysis expert. Given the following log patterns and sample lines, \
         generate a short semantic_id (kebab-case, max 30 chars) and a one-line description for each.\n\
         \n\
         Output ONLY a JSON array with no markdown formatting. Use the exact pattern_id values \
         provided below, like:\n\
         [{\"pattern_id\": \"<actual-pattern-id>\", \"semantic_id\": \"server-startup\", \
         \"description\": \"Server process starting on a specific port\"}]\n\
         \n\
         Patterns:\n",
    );

    for p in patterns {
        let _ = write!(b, "\nPattern {}: {:?}\n", p.pattern_id, p.pattern);
        if !p.samples.is_empty() {
            b.push_str("Samples:\n");
            for s in &p.samples {
                let _ = writeln!(b, "  - {s}");
            }
        }
    }

    b
}

async fn call_chat_model(
    config: &LabelerConfig,
    model: &str,
    prompt: &str,
) -> Result<String, LappError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| LappError::LabelerTransport(format!("build HTTP client: {e}")))?;

    let request = ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        response_format: ResponseFormat {
            format_type: "json_object",
        },
    };

    let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .bearer_auth(&config.api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| LappError::LabelerTransport(format!("chat completion request: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| LappError::LabelerTransport(format!("read response body: {e}")))?;

    if !status.is_success() {
        return Err(LappError::LabelerTransport(format!(
            "API error (HTTP {status}): {body}"
        )));
    }

    let chat: ChatResponse = serde_json::from_str(&body)
        .map_err(|e| LappError::LabelerDecode(format!("chat response envelope: {e}")))?;

    let choice = chat
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LappError::LabelerDecode("no choices in response".to_string()))?;

    Ok(choice.message.content)
}

/// Parse the model reply as a JSON array of labels. The response format
/// constraint guarantees clean JSON, so fenced or prefixed content is an
/// error rather than something to repair.
fn parse_response(content: &str) -> Result<Vec<SemanticLabel>, LappError> {
    let content = content.trim();
    serde_json::from_str(content).map_err(|e| {
        let snippet: String = content.chars().take(DECODE_SNIPPET_LEN).collect();
        LappError::LabelerDecode(format!("JSON decode (content={snippet:?}): {e}"))
    })
}
