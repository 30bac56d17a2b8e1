use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::errors::HuddleError;
use crate::events::ChatMessage;

/// Suggestions beyond this count are dropped.
pub const MAX_SUGGESTIONS: usize = 3;

/// Request/response contract of the reply-suggestion service.
pub trait ReplySuggester: Send + Sync {
    /// `chat_history` is the transcript as produced by [`serialize_transcript`].
    fn suggest<'a>(&'a self, chat_history: &'a str) -> BoxFuture<'a, Result<Vec<String>, HuddleError>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SuggestRequest<'a> {
    chat_history: &'a str,
}

#[derive(Debug, Deserialize)]
struct SuggestResponse {
    suggestions: Vec<String>,
}

/// One `sender: text` line per message.
pub fn serialize_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.sender, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_suggestions(body: &str) -> Result<Vec<String>, HuddleError> {
    let data: SuggestResponse = serde_json::from_str(body)
        .map_err(|e| HuddleError::SuggestionService(format!("invalid response: {e}")))?;
    Ok(data
        .suggestions
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_SUGGESTIONS)
        .collect())
}

/// Posts the transcript as JSON to a hosted suggestion endpoint.
pub struct HttpReplySuggester {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReplySuggester {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl ReplySuggester for HttpReplySuggester {
    fn suggest<'a>(&'a self, chat_history: &'a str) -> BoxFuture<'a, Result<Vec<String>, HuddleError>> {
        Box::pin(async move {
            tracing::debug!(endpoint = %self.endpoint, "requesting reply suggestions");

            let resp = self
                .client
                .post(&self.endpoint)
                .json(&SuggestRequest { chat_history })
                .send()
                .await
                .map_err(|e| HuddleError::Http(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(HuddleError::SuggestionService(format!(
                    "service returned status {}",
                    resp.status()
                )));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| HuddleError::Http(e.to_string()))?;
            parse_suggestions(&body)
        })
    }
}
