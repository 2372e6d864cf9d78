use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::Config;

/// Sampling options for a single completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    async fn chat(&self, system: &str, user: &str, options: &ChatOptions) -> Result<String>;
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    /// "openai", "gemini", "ollama" or "none"
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    pub openai: Option<OpenAIConfig>,
    pub gemini: Option<GeminiConfig>,
    pub ollama: Option<OllamaConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            timeout_seconds: None,
            openai: None,
            gemini: None,
            ollama: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_openai_model(),
            base_url: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";

impl LlmConfig {
    pub fn validate(&self) -> Result<()> {
        match self.provider.as_str() {
            "openai" => {
                if let Some(base_url) = self.openai.as_ref().and_then(|c| c.base_url.as_deref()) {
                    url::Url::parse(base_url)
                        .with_context(|| format!("Invalid llm.openai.base_url: {}", base_url))?;
                }
            }
            "ollama" => {
                let cfg = self.ollama.as_ref().context("Ollama config missing")?;
                url::Url::parse(&cfg.base_url)
                    .with_context(|| format!("Invalid llm.ollama.base_url: {}", cfg.base_url))?;
            }
            "gemini" => {
                self.gemini.as_ref().context("Gemini config missing")?;
            }
            "none" => {}
            other => bail!("Unknown LLM provider: {}", other),
        }
        Ok(())
    }

    /// True when a provider is selected and has whatever credentials it needs.
    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => {
                let key = self.openai.as_ref().map(|c| c.api_key.as_str());
                resolve_key(key, OPENAI_KEY_ENV).is_some()
            }
            "gemini" => {
                let key = self.gemini.as_ref().map(|c| c.api_key.as_str());
                resolve_key(key, GEMINI_KEY_ENV).is_some()
            }
            "ollama" => self.ollama.is_some(),
            _ => false,
        }
    }

    fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = self.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build().context("Failed to build HTTP client")
    }
}

fn resolve_key(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok().filter(|k| !k.trim().is_empty()))
}

/// Builds the configured provider. `Ok(None)` means no provider is usable and the
/// engine will run entirely on its fallbacks.
pub fn create_llm(config: &Config) -> Result<Option<Arc<dyn LlmClient>>> {
    let llm = &config.llm;
    llm.validate()?;

    let client: Arc<dyn LlmClient> = match llm.provider.as_str() {
        "openai" => {
            let cfg = llm.openai.clone().unwrap_or_default();
            let Some(api_key) = resolve_key(Some(cfg.api_key.as_str()), OPENAI_KEY_ENV) else {
                warn!("{} not set, story generation will use fallbacks only", OPENAI_KEY_ENV);
                return Ok(None);
            };
            Arc::new(OpenAIClient::new(
                &api_key,
                &cfg.model,
                cfg.base_url.as_deref(),
                llm.http_client()?,
            ))
        }
        "gemini" => {
            let cfg = llm.gemini.as_ref().context("Gemini config missing")?;
            let Some(api_key) = resolve_key(Some(cfg.api_key.as_str()), GEMINI_KEY_ENV) else {
                warn!("{} not set, story generation will use fallbacks only", GEMINI_KEY_ENV);
                return Ok(None);
            };
            Arc::new(GeminiClient::new(&api_key, &cfg.model, llm.http_client()?))
        }
        "ollama" => {
            let cfg = llm.ollama.as_ref().context("Ollama config missing")?;
            Arc::new(OllamaClient::new(&cfg.base_url, &cfg.model, llm.http_client()?))
        }
        "none" => {
            info!("LLM provider disabled, story generation will use fallbacks only");
            return Ok(None);
        }
        other => return Err(anyhow!("Unknown LLM provider: {}", other)),
    };

    info!("Using LLM provider: {}", llm.provider);
    Ok(Some(client))
}

async fn read_success(resp: reqwest::Response, provider: &str) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await?;
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        bail!("{} API rate limited: {}", provider, body);
    }
    if !status.is_success() {
        bail!("{} API error ({}): {}", provider, status, body);
    }
    Ok(body)
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(api_key: &str, model: &str, base_url: Option<&str>, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            client,
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, system: &str, user: &str, options: &ChatOptions) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage { role: "system".to_string(), content: system.to_string() },
                OpenAIMessage { role: "user".to_string(), content: user.to_string() },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        let body = read_success(resp, "OpenAI").await?;
        let result: OpenAIResponse = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse OpenAI response: {}", body))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("OpenAI response empty or missing content"))
    }
}

// --- Gemini ---

#[derive(Debug)]
struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    fn new(api_key: &str, model: &str, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

impl GeminiResponse {
    fn into_text(self) -> Result<String> {
        if let Some(err) = self.error {
            return Err(anyhow!("Gemini API returned error: {}", err.message));
        }

        let first = self
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| anyhow!("Gemini response has no candidates"))?;

        let text = first
            .content
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text);

        match text {
            Some(text) => Ok(text),
            None => {
                let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
                Err(anyhow!("Gemini response empty. Finish reason: {}", reason))
            }
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn chat(&self, system: &str, user: &str, options: &ChatOptions) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: user.to_string() }],
            }],
            system_instruction: Some(GeminiSystemInstruction {
                parts: vec![GeminiPart { text: system.to_string() }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            },
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;
        let body = read_success(resp, "Gemini").await?;

        let result: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse Gemini response: {}. Body: {}", e, body))?;
        result.into_text()
    }
}

// --- Ollama ---

#[derive(Debug)]
struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    fn new(base_url: &str, model: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessageResponse,
}

#[derive(Deserialize)]
struct OllamaMessageResponse {
    content: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, system: &str, user: &str, options: &ChatOptions) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request_body = OllamaRequest {
            model: self.model.clone(),
            messages: vec![
                OllamaMessage { role: "system".to_string(), content: system.to_string() },
                OllamaMessage { role: "user".to_string(), content: user.to_string() },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;
        let body = read_success(resp, "Ollama").await?;
        let result: OllamaResponse = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse Ollama response: {}", body))?;
        Ok(result.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_safety_block_is_an_error() {
        let json = r#"{
            "candidates": [
                { "finishReason": "SAFETY", "index": 0 }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        let err = result.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_gemini_text_is_extracted() {
        let json = r#"{
            "candidates": [
                {
                    "content": { "parts": [ { "text": "Once upon a time" } ], "role": "model" },
                    "finishReason": "STOP"
                }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.into_text().unwrap(), "Once upon a time");
    }

    #[test]
    fn test_gemini_request_carries_generation_config() {
        let request = GeminiRequest {
            contents: vec![],
            system_instruction: None,
            generation_config: GeminiGenerationConfig {
                temperature: 0.2,
                max_output_tokens: 800,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 800);
        assert!(value.get("systemInstruction").is_none());
    }

    #[test]
    fn test_openai_response_parsing() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Luna, Pip, Odo" },
                "finish_reason": "stop"
            }]
        }"#;

        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.choices[0].message.content.as_deref(), Some("Luna, Pip, Odo"));
    }

    #[test]
    fn test_openai_request_carries_options() {
        let request = OpenAIRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![],
            temperature: 0.3,
            max_tokens: 200,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["max_tokens"], 200);
    }

    #[test]
    fn test_none_provider_yields_no_client() {
        let mut config = Config::default();
        config.llm.provider = "none".to_string();
        assert!(create_llm(&config).unwrap().is_none());
        assert!(!config.llm.is_configured());
    }

    #[test]
    fn test_ollama_provider_builds_client() {
        let mut config = Config::default();
        config.llm.provider = "ollama".to_string();
        config.llm.ollama = Some(OllamaConfig {
            base_url: "http://localhost:11434/".to_string(),
            model: "llama3".to_string(),
        });
        assert!(create_llm(&config).unwrap().is_some());
        assert!(config.llm.is_configured());
    }

    #[test]
    fn test_configured_key_wins_over_environment() {
        assert_eq!(
            resolve_key(Some(" sk-test "), "BEDTIME_TEST_UNSET_KEY"),
            Some("sk-test".to_string())
        );
        assert_eq!(resolve_key(Some(""), "BEDTIME_TEST_UNSET_KEY"), None);
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut config = Config::default();
        config.llm.provider = "mystery".to_string();
        assert!(create_llm(&config).is_err());
    }
}
