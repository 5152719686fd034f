use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

const GENERATIVE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models/";

/// External text-generation service boundary. `Ok(None)` means the service
/// answered with no usable text; callers map every outcome to a fixed
/// user-facing string.
#[async_trait]
pub trait TextGenerationClient: Send + Sync {
    async fn generate(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> Result<Option<String>, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTextGenerationClient {
    client: Client,
}

impl ReqwestTextGenerationClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Credential(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn generate_endpoint(model: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(GENERATIVE_API_BASE)
            .map_err(|error| InfraError::Network(format!("invalid generative api base url: {error}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Network("generative api base URL cannot be a base".to_string()))?;
            segments.push(&format!("{model}:generateContent"));
        }
        Ok(url)
    }

    fn service_http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("text generation api error: http {}", status.as_u16())
        } else {
            format!(
                "text generation api error: http {}; body={body}",
                status.as_u16()
            )
        };
        InfraError::Network(message)
    }
}

#[derive(Debug, serde::Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<ResponseCandidate>>,
}

#[derive(Debug, serde::Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, serde::Deserialize)]
struct ResponseContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, serde::Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn extract_text(response: GenerateContentResponse) -> Option<String> {
    let parts = response
        .candidates?
        .into_iter()
        .next()?
        .content?
        .parts?;
    let text = parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[async_trait]
impl TextGenerationClient for ReqwestTextGenerationClient {
    async fn generate(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> Result<Option<String>, InfraError> {
        Self::ensure_non_empty(api_key, "api key")?;
        Self::ensure_non_empty(model, "model")?;

        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(Self::generate_endpoint(model)?)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                InfraError::Network(format!("network error while generating text: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Network(format!("failed to read generation response: {error}"))
        })?;
        if !status.is_success() {
            return Err(Self::service_http_error(status, &body));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        Ok(extract_text(parsed))
    }
}
