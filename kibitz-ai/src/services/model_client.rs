//! Generative model client
//!
//! The model is treated as free-text completion. The analysis result is the
//! first balanced JSON object found in the response text; anything without
//! one is a parse failure for the job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::AnalysisResult;

const USER_AGENT: &str = concat!("kibitz-ai/", env!("CARGO_PKG_VERSION"));
const TEMPERATURE: f32 = 0.4;

/// Model client errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Model API error {0}: {1}")]
    Api(u16, String),

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Prompt in, free text out
#[async_trait]
pub trait AnalysisModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Settings for [`GeminiClient`]
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub min_interval_ms: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Minimum spacing between outgoing requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Gemini `generateContent` REST client
pub struct GeminiClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    settings: GeminiSettings,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Result<Self, ModelError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(settings.min_interval_ms)),
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }
}

#[async_trait]
impl AnalysisModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.rate_limiter.wait().await;

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                response_mime_type: "application/json",
            },
        };

        tracing::debug!(model = %self.settings.model, prompt_len = prompt.len(), "Calling model");

        let response = self
            .http_client
            .post(self.endpoint())
            .query(&[("key", self.settings.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(status.as_u16(), error_text));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        response_text(body)
    }
}

/// Concatenate the text parts of the first candidate
fn response_text(body: GenerateResponse) -> Result<String, ModelError> {
    let text: String = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    Ok(text)
}

/// First balanced `{...}` substring, ignoring braces inside JSON strings
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse model output into the fixed result structure
pub fn parse_analysis_result(text: &str) -> Result<AnalysisResult, ModelError> {
    let json = extract_json_object(text)
        .ok_or_else(|| ModelError::Parse("no JSON object in model response".to_string()))?;

    serde_json::from_str(json).map_err(|e| ModelError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn test_extract_skips_surrounding_text() {
        let text = "Here is the analysis:\n```json\n{\"summary\": \"ok\"}\n```\nThanks {again}";
        assert_eq!(extract_json_object(text), Some("{\"summary\": \"ok\"}"));
    }

    #[test]
    fn test_extract_nested_and_string_braces() {
        let text = r#"x {"a": {"b": "}{"}, "c": "say \"{\""} y"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": {"b": "}{"}, "c": "say \"{\""}"#)
        );
    }

    #[test]
    fn test_extract_unbalanced_is_none() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{\"a\": {\"b\": 1}"), None);
    }

    #[test]
    fn test_parse_full_result() {
        let text = r#"{
            "summary": "White converted an extra pawn.",
            "phases": [{"name": "Opening", "moves": "1-10", "evaluation": "equal", "key_ideas": ["center"]}],
            "key_moments": [{"move_number": 23, "move": "Rxd5", "fen": "8/8/8/8/8/8/8/8 w - - 0 1", "evaluation": "+1.5", "comment": "Wins a pawn", "is_mistake": false}],
            "recommendations": ["Practice rook endgames"]
        }"#;
        let result = parse_analysis_result(text).unwrap();
        assert_eq!(result.phases.len(), 1);
        assert_eq!(result.phases[0].key_ideas, vec!["center"]);
        assert_eq!(result.key_moments[0].move_number, 23);
        assert_eq!(result.key_moments[0].played_move, "Rxd5");
        assert_eq!(result.recommendations, vec!["Practice rook endgames"]);
    }

    #[test]
    fn test_parse_missing_arrays_default_empty() {
        let result = parse_analysis_result(r#"{"summary": "short"}"#).unwrap();
        assert!(result.phases.is_empty());
        assert!(result.key_moments.is_empty());
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_parse_missing_summary_fails() {
        assert!(matches!(
            parse_analysis_result(r#"{"phases": []}"#),
            Err(ModelError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_without_json_fails() {
        assert!(matches!(
            parse_analysis_result("I cannot analyze this game."),
            Err(ModelError::Parse(_))
        ));
    }

    #[test]
    fn test_response_text_joins_parts() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"summary\":"}, {"text": " \"x\"}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(body).unwrap(), "{\"summary\": \"x\"}");
    }

    #[test]
    fn test_response_without_candidates_is_empty() {
        let body: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(matches!(response_text(body), Err(ModelError::EmptyResponse)));
    }

    #[test]
    fn test_endpoint_format() {
        let client = GeminiClient::new(GeminiSettings {
            api_key: "k".to_string(),
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://example.test/v1beta/".to_string(),
            min_interval_ms: 0,
            timeout_seconds: 5,
        })
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
