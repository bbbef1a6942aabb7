use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AnalysisConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";
const PROMPT: &str = "You are the vision module of a heads-up display. Describe what is in \
front of the wearer in one or two short sentences.";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no API key configured for the analysis service")]
    MissingApiKey,
    #[error("analysis request failed: {0}")]
    Transport(reqwest::Error),
    #[error("analysis service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("analysis response had no text")]
    EmptyResponse,
}

impl From<reqwest::Error> for AnalysisError {
    // Error text ends up in logs; keep request URLs out of it.
    fn from(err: reqwest::Error) -> Self {
        AnalysisError::Transport(err.without_url())
    }
}

/// Remote service that turns an encoded image into a short description.
pub trait AnalysisClient: Send + Sync + 'static {
    fn analyze(&self, jpeg: &[u8]) -> Result<String, AnalysisError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
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

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: Client,
    config: AnalysisConfig,
}

impl GeminiClient {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint, self.config.model
        )
    }
}

impl AnalysisClient for GeminiClient {
    fn analyze(&self, jpeg: &[u8]) -> Result<String, AnalysisError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(AnalysisError::MissingApiKey)?;

        log::info!(
            "sending {} byte frame to {} for analysis",
            jpeg.len(),
            self.config.model
        );
        let response = self
            .http
            .post(self.url())
            .header(API_KEY_HEADER, api_key)
            .json(&request_body(jpeg))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json()?;
        extract_text(parsed)
    }
}

fn request_body(jpeg: &[u8]) -> GenerateRequest<'static> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text { text: PROMPT },
                Part::Image {
                    inline_data: InlineData {
                        mime_type: "image/jpeg",
                        data: BASE64_STANDARD.encode(jpeg),
                    },
                },
            ],
        }],
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, AnalysisError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn request_carries_prompt_and_base64_image() {
        let body = serde_json::to_value(request_body(&[0xff, 0xd8, 0xff])).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], PROMPT);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["inline_data"]["data"], "/9j/");
    }

    #[test]
    fn extracts_joined_candidate_text() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "A wooden table " },
                    { "text": "with a laptop.\n" }
                ]}
            }]
        }))
        .unwrap();
        assert_eq!(
            extract_text(response).unwrap(),
            "A wooden table with a laptop."
        );
    }

    #[test]
    fn empty_candidates_are_an_error() {
        let response: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            extract_text(response),
            Err(AnalysisError::EmptyResponse)
        ));
    }

    #[test]
    fn missing_key_fails_without_network() {
        let client = GeminiClient::new(AnalysisConfig {
            api_key: None,
            model: "m".into(),
            endpoint: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert!(matches!(
            client.analyze(&[1, 2, 3]),
            Err(AnalysisError::MissingApiKey)
        ));
    }

    #[test]
    fn transport_errors_do_not_leak_the_key() {
        let client = GeminiClient::new(AnalysisConfig {
            api_key: Some("SECRET-KEY-123".into()),
            model: "m".into(),
            endpoint: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        assert!(!client.url().contains("SECRET-KEY-123"));

        let err = client.analyze(&[0xff, 0xd8]).unwrap_err();
        assert!(matches!(err, AnalysisError::Transport(_)));
        let text = format!("{err} {err:?}");
        assert!(!text.contains("SECRET-KEY-123"), "{text}");
        assert!(!text.contains("127.0.0.1:9/models"), "{text}");
    }
}
