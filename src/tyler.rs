// Tyler: commentary dispatch against an external chat-completion API.
//
// Tyler's output is an opaque string. The only contract is that `respond`
// always returns non-empty text within a bounded time: missing key,
// transport errors, timeouts, bad status codes, and empty completions all
// degrade to a fixed fallback instead of surfacing to the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::metrics;

pub const FALLBACK_OFFLINE: &str = "Tyler is offline.";
pub const FALLBACK_NO_KEY: &str = "Tyler is sleeping.";
pub const FALLBACK_EMPTY: &str = "No comment.";

const TEMPERATURE: f64 = 0.5;
const MAX_TOKENS: u32 = 60;

fn system_prompt(city: &str) -> String {
    format!(
        "You are Tyler. A cold, brutal, factual gym tracking oversight system. \
         The user is identified only by their city: \"{city}\". \
         Your personality: cold, neutral, brutalist. No emotion. No sympathy. No praise. \
         Purely factual and judgmental. \
         Constraints: MAX 1 sentence. NO emojis. NO motivational quotes. NO questions. NO greetings."
    )
}

fn user_content(event: &str, details: Option<&serde_json::Value>) -> String {
    match details {
        Some(details) => format!("Event: {event}. Details: {details}."),
        None => format!("Event: {event}."),
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
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

pub struct TylerClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl TylerClient {
    pub fn new(config: &Config) -> Self {
        if config.commentary_api_key.is_none() {
            tracing::warn!("Tyler client initialized WITHOUT an API key - commentary disabled");
        }
        Self {
            http: reqwest::Client::new(),
            api_url: config.commentary_api_url.clone(),
            api_key: config.commentary_api_key.clone(),
            model: config.commentary_model.clone(),
            timeout: Duration::from_secs(config.commentary_timeout_secs),
        }
    }

    /// Generate one line of commentary for an event. Infallible by design.
    pub async fn respond(
        &self,
        city: &str,
        event: &str,
        details: Option<&serde_json::Value>,
    ) -> String {
        let Some(api_key) = &self.api_key else {
            metrics::COMMENTARY_TOTAL.with_label_values(&["no_key"]).inc();
            return FALLBACK_NO_KEY.to_string();
        };

        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(city),
                },
                ChatMessage {
                    role: "user",
                    content: user_content(event, details),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Tyler request failed: {e}");
                metrics::COMMENTARY_TOTAL
                    .with_label_values(&["fallback"])
                    .inc();
                return FALLBACK_OFFLINE.to_string();
            }
        };

        if !response.status().is_success() {
            tracing::warn!("Tyler API returned status {}", response.status());
            metrics::COMMENTARY_TOTAL
                .with_label_values(&["fallback"])
                .inc();
            return FALLBACK_OFFLINE.to_string();
        }

        let parsed: ChatResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Tyler response unparseable: {e}");
                metrics::COMMENTARY_TOTAL
                    .with_label_values(&["fallback"])
                    .inc();
                return FALLBACK_OFFLINE.to_string();
            }
        };

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        match text {
            Some(text) => {
                metrics::COMMENTARY_TOTAL.with_label_values(&["ok"]).inc();
                text
            }
            None => {
                metrics::COMMENTARY_TOTAL
                    .with_label_values(&["empty"])
                    .inc();
                FALLBACK_EMPTY.to_string()
            }
        }
    }
}
