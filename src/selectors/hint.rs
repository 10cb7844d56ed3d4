use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::HintError;

pub const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent";
pub const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";

const PROMPT: &str = "Given this login page HTML, suggest probable CSS selectors for username, \
password, and submit button. Answer with a JSON object with the string keys \
\"username\", \"password\" and \"submit\".";

/// Longest markup excerpt sent to the hint service, in characters.
const MAX_MARKUP_CHARS: usize = 60_000;

/// Suggested selectors; any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SelectorHints {
    pub username: Option<String>,
    pub password: Option<String>,
    pub submit: Option<String>,
}

impl SelectorHints {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.submit.is_none()
    }
}

/// Advisory source of selectors for a page's markup.
#[async_trait]
pub trait SelectorHint: Send + Sync {
    async fn suggest(&self, markup: &str) -> Result<Option<SelectorHints>, HintError>;
}

/// Asks a Gemini text-completion endpoint for login selectors.
pub struct GeminiHint {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiHint {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: GEMINI_ENDPOINT.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build a client from `GEMINI_API_KEY`, if set.
    pub fn from_env() -> Result<Self, HintError> {
        match std::env::var(GEMINI_KEY_VAR) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key.trim())),
            _ => Err(HintError::MissingKey),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SelectorHint for GeminiHint {
    async fn suggest(&self, markup: &str) -> Result<Option<SelectorHints>, HintError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": PROMPT },
                    { "text": truncate_chars(markup, MAX_MARKUP_CHARS) }
                ]
            }]
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| HintError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(HintError::Status(status.as_u16()));
        }

        let envelope: Value = resp
            .json()
            .await
            .map_err(|e| HintError::Malformed(e.to_string()))?;

        parse_envelope(&envelope)
    }
}

/// Pull hints out of a `generateContent` response envelope.
pub fn parse_envelope(envelope: &Value) -> Result<Option<SelectorHints>, HintError> {
    let candidates = envelope
        .get("candidates")
        .and_then(Value::as_array)
        .ok_or_else(|| HintError::Malformed("missing candidates".into()))?;

    let texts = candidates.iter().flat_map(|candidate| {
        candidate["content"]["parts"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|part| part["text"].as_str())
    });

    for text in texts {
        let hints = parse_hint_text(text);
        if !hints.is_empty() {
            return Ok(Some(hints));
        }
    }
    Ok(None)
}

/// Read selectors from free-form model output.
///
/// Accepts an embedded JSON object first, then `field: selector` lines.
pub fn parse_hint_text(text: &str) -> SelectorHints {
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(hints) = serde_json::from_str::<SelectorHints>(&text[start..=end]) {
                if !hints.is_empty() {
                    return clean(hints);
                }
            }
        }
    }

    let mut hints = SelectorHints::default();
    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches(['*', '`', '"']).to_ascii_lowercase();
        let value = Some(value.trim().to_string());
        if key.contains("username") || key == "email" || key == "user" {
            hints.username = hints.username.or(value);
        } else if key.contains("password") {
            hints.password = hints.password.or(value);
        } else if key.contains("submit") {
            hints.submit = hints.submit.or(value);
        }
    }
    clean(hints)
}

fn clean(hints: SelectorHints) -> SelectorHints {
    let tidy = |s: Option<String>| {
        s.map(|v| v.trim().trim_matches(['`', '"', ',']).trim().to_string())
            .filter(|v| !v.is_empty())
    };
    SelectorHints {
        username: tidy(hints.username),
        password: tidy(hints.password),
        submit: tidy(hints.submit),
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_embedded_json() {
        let text = "Here you go:\n```json\n{\"username\": \"#email\", \"password\": \"#pass\", \"submit\": \"button.login\"}\n```";
        let hints = parse_hint_text(text);
        assert_eq!(hints.username.as_deref(), Some("#email"));
        assert_eq!(hints.password.as_deref(), Some("#pass"));
        assert_eq!(hints.submit.as_deref(), Some("button.login"));
    }

    #[test]
    fn test_parse_bulleted_lines() {
        let text = "- **Username**: `input[name=\"login\"]`\n- Password: `#pwd`\n* Submit button: `input[type=submit]`";
        let hints = parse_hint_text(text);
        assert_eq!(hints.username.as_deref(), Some("input[name=\"login\"]"));
        assert_eq!(hints.password.as_deref(), Some("#pwd"));
        assert_eq!(hints.submit.as_deref(), Some("input[type=submit]"));
    }

    #[test]
    fn test_parse_unrelated_text_is_empty() {
        assert!(parse_hint_text("I cannot help with that.").is_empty());
        assert!(parse_hint_text("username:   ").is_empty());
    }

    #[test]
    fn test_parse_envelope_takes_first_useful_part() {
        let envelope = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Let me look at the form." },
                    { "text": "{\"username\": \"#user\"}" }
                ]}
            }]
        });
        let hints = parse_envelope(&envelope).unwrap().unwrap();
        assert_eq!(hints.username.as_deref(), Some("#user"));
        assert!(hints.password.is_none());
    }

    #[test]
    fn test_parse_envelope_without_candidates_is_malformed() {
        let err = parse_envelope(&json!({ "error": { "code": 403 } })).unwrap_err();
        assert!(matches!(err, HintError::Malformed(_)));
        assert_eq!(parse_envelope(&json!({ "candidates": [] })).unwrap(), None);
    }

    fn hint_for(server: &MockServer) -> GeminiHint {
        GeminiHint::new("k").with_endpoint(format!("{}/generate", server.uri()))
    }

    #[tokio::test]
    async fn test_suggest_posts_markup_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(header("Authorization", "Bearer k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [
                    { "text": "{\"username\": \"#email\", \"submit\": \"#go\"}" }
                ]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hints = hint_for(&server)
            .suggest("<form id=\"signin\"></form>")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hints.username.as_deref(), Some("#email"));
        assert!(hints.password.is_none());
        assert_eq!(hints.submit.as_deref(), Some("#go"));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], PROMPT);
        assert_eq!(parts[1]["text"], "<form id=\"signin\"></form>");
    }

    #[tokio::test]
    async fn test_server_error_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = hint_for(&server).suggest("<form></form>").await.unwrap_err();
        assert!(matches!(err, HintError::Status(500)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>quota page</html>"))
            .mount(&server)
            .await;

        let err = hint_for(&server).suggest("<form></form>").await.unwrap_err();
        assert!(matches!(err, HintError::Malformed(_)), "{:?}", err);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
