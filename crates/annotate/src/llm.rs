use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Abstract text-generation capability: prompt in, completion out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// The service refused the request itself (bad key, unknown model, malformed
/// body). Sending it again cannot succeed.
#[derive(Debug, thiserror::Error)]
#[error("generation request rejected with HTTP {status}")]
pub struct RejectedRequest {
    pub status: u16,
}

/// Whether a failed generation call is worth another attempt.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    error.downcast_ref::<RejectedRequest>().is_none()
}

/// Map a non-success HTTP status to an error. 429 stays retryable; any
/// other 4xx is a `RejectedRequest`.
fn check_status(service: &str, status: reqwest::StatusCode) -> Result<()> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        anyhow::bail!("{} rate limit exceeded ({})", service, status);
    }
    if status.is_client_error() {
        return Err(RejectedRequest {
            status: status.as_u16(),
        }
        .into());
    }
    if !status.is_success() {
        anyhow::bail!("{} request failed: {}", service, status);
    }
    Ok(())
}

/// Google Gemini `generateContent` over REST.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    thinking_config: ThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

impl GeminiClient {
    pub const DEFAULT_MODEL: &'static str = "gemini-2.5-flash-lite";

    pub fn new(model: String, api_key: String) -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                thinking_config: ThinkingConfig { thinking_budget: 0 },
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        check_status("Gemini", response.status())?;

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        let text: String = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            anyhow::bail!("Gemini returned an empty completion");
        }
        Ok(text)
    }
}

/// Local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

impl OllamaClient {
    pub const DEFAULT_URL: &'static str = "http://localhost:11434";
    pub const DEFAULT_MODEL: &'static str = "llama3";

    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request<'a>(&'a self, prompt: &'a str) -> OllamaRequest<'a> {
        OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(Self::DEFAULT_URL, Self::DEFAULT_MODEL)
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.request(prompt))
            .send()
            .await
            .context(format!("Failed to reach Ollama at {}", self.base_url))?;

        check_status("Ollama", response.status())?;

        let body: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;
        if body.response.trim().is_empty() {
            anyhow::bail!("Ollama returned an empty completion");
        }
        Ok(body.response)
    }
}
