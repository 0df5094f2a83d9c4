//! Gemini `generateContent` backend for [`ModelService`].
//!
//! The chat keeps the full conversation and resends it on every request, with
//! function calling forced (`mode = ANY`) so the model can only answer with
//! capability invocations.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::capability::declarations;
use crate::core::types::Invocation;
use crate::io::model::{ModelMessage, ModelService};

/// Connection and model settings for [`GeminiChat`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub system_instruction: String,
}

/// A stateful Gemini conversation.
#[derive(Debug)]
pub struct GeminiChat {
    http: Client,
    config: GeminiConfig,
    history: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Value>,
    finish_reason: Option<String>,
}

impl GeminiChat {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            config,
            history: Vec::new(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Conversation turns exchanged so far.
    pub fn history(&self) -> &[Value] {
        &self.history
    }

    /// Request body for the current history followed by `turn`.
    pub fn request_body(&self, turn: &Value) -> Value {
        let mut contents = self.history.clone();
        contents.push(turn.clone());
        json!({
            "systemInstruction": { "parts": [{ "text": self.config.system_instruction }] },
            "contents": contents,
            "tools": [{ "functionDeclarations": declarations() }],
            "toolConfig": { "functionCallingConfig": { "mode": "ANY" } },
        })
    }
}

#[async_trait]
impl ModelService for GeminiChat {
    #[instrument(skip_all, fields(model = %self.config.model, turns = self.history.len()))]
    async fn send(&mut self, message: ModelMessage) -> Result<Vec<Invocation>> {
        let turn = user_turn(&message);
        let body = self.request_body(&turn);

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("send generateContent request")?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("read generateContent response")?;
        if !status.is_success() {
            warn!(%status, "generateContent failed");
            return Err(anyhow!("generateContent failed with status {status}: {}", text.trim()));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).context("parse generateContent response")?;
        let (content, invocations) = split_candidate(parsed);

        self.history.push(turn);
        if let Some(content) = content {
            self.history.push(content);
        }
        info!(invocations = invocations.len(), "model responded");
        Ok(invocations)
    }
}

fn user_turn(message: &ModelMessage) -> Value {
    let parts: Vec<Value> = match message {
        ModelMessage::Text(text) => vec![json!({ "text": text })],
        ModelMessage::Results(results) => results
            .iter()
            .map(|result| {
                json!({
                    "functionResponse": { "name": result.name, "response": result.response }
                })
            })
            .collect(),
    };
    json!({ "role": "user", "parts": parts })
}

/// Take the first candidate's content and the function calls it carries.
fn split_candidate(response: GenerateContentResponse) -> (Option<Value>, Vec<Invocation>) {
    let Some(candidate) = response.candidates.into_iter().next() else {
        warn!("response carried no candidates");
        return (None, Vec::new());
    };
    let Some(content) = candidate.content else {
        debug!(finish_reason = ?candidate.finish_reason, "candidate without content");
        return (None, Vec::new());
    };
    let invocations = content
        .get("parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("functionCall"))
                .filter_map(|call| {
                    let name = call.get("name")?.as_str()?;
                    let arguments = call.get("args").cloned().unwrap_or_else(|| json!({}));
                    Some(Invocation::new(name, arguments))
                })
                .collect()
        })
        .unwrap_or_default();
    (Some(content), invocations)
}
