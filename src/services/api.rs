//! Request/response shapes for exposing the generator behind a JSON boundary.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::ValidationError;
use crate::core::story::{GenerationResult, Mode};
use crate::services::llm::LlmConfig;
use crate::services::workflow::WorkflowManager;

pub const GENERATOR_UNAVAILABLE: &str =
    "Story generator not available. Please check API key configuration.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryApiRequest {
    #[serde(default)]
    pub request: String,
    #[serde(default)]
    pub mode: Option<String>,
}

impl StoryApiRequest {
    pub fn new(request: &str, mode: Mode) -> Self {
        Self {
            request: request.to_string(),
            mode: Some(mode.as_str().to_string()),
        }
    }

    /// Trimmed request text and the parsed mode (balanced when omitted).
    pub fn validate(&self) -> Result<(String, Mode), ValidationError> {
        let request = self.request.trim();
        if request.is_empty() {
            return Err(ValidationError::EmptyRequest);
        }
        let mode = match &self.mode {
            Some(mode) => mode.parse()?,
            None => Mode::default(),
        };
        Ok((request.to_string(), mode))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMetadata {
    pub mode: Mode,
    pub category: String,
    pub themes: Vec<String>,
    pub tone: String,
    /// A number, or `"N/A"` when the story was never evaluated.
    pub score: Value,
    pub api_calls: u32,
    pub iterations: u32,
    pub estimated_quality: String,
}

impl From<&GenerationResult> for ApiMetadata {
    fn from(result: &GenerationResult) -> Self {
        let meta = &result.metadata;
        Self {
            mode: meta.mode,
            category: meta
                .category
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            themes: meta.themes.clone(),
            tone: meta
                .tone
                .map(|t| t.to_string())
                .unwrap_or_else(|| "gentle".to_string()),
            score: meta
                .score
                .map(Value::from)
                .unwrap_or_else(|| Value::String("N/A".to_string())),
            api_calls: meta.api_calls,
            iterations: meta.iterations,
            estimated_quality: meta.estimated_quality.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ApiMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// HTTP status a server would answer with.
    #[serde(skip)]
    pub status: u16,
}

impl StoryApiResponse {
    pub fn success(result: &GenerationResult) -> Self {
        Self {
            success: true,
            story: Some(result.story.clone()),
            metadata: Some(ApiMetadata::from(result)),
            error: None,
            status: 200,
        }
    }

    pub fn failure(status: u16, error: impl ToString) -> Self {
        Self {
            success: false,
            story: None,
            metadata: None,
            error: Some(error.to_string()),
            status,
        }
    }
}

/// Validates `req`, runs the workflow and shapes the reply.
pub async fn handle(engine: &WorkflowManager, req: &StoryApiRequest) -> StoryApiResponse {
    let (request, mode) = match req.validate() {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Rejected story request: {}", e);
            return StoryApiResponse::failure(400, e);
        }
    };

    if !engine.is_available() {
        return StoryApiResponse::failure(500, GENERATOR_UNAVAILABLE);
    }

    info!("Story request ({} mode): {}", mode, request);
    let result = engine.generate(&request, mode).await;
    StoryApiResponse::success(&result)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeInfo {
    pub id: Mode,
    pub name: &'static str,
    pub description: &'static str,
    pub api_calls: &'static str,
    pub time: &'static str,
    pub quality: &'static str,
}

pub fn mode_catalog() -> Vec<ModeInfo> {
    Mode::ALL
        .into_iter()
        .map(|mode| {
            let (name, description, api_calls, time) = match mode {
                Mode::Fast => (
                    "Fast Mode",
                    "Quick stories for simple requests",
                    "2",
                    "5-8 seconds",
                ),
                Mode::Balanced => (
                    "Balanced Mode",
                    "Default mode with great quality and efficiency",
                    "5-6",
                    "12-15 seconds",
                ),
                Mode::Best => (
                    "Best Mode",
                    "Premium quality with guaranteed refinements",
                    "8-10",
                    "20-30 seconds",
                ),
            };
            ModeInfo {
                id: mode,
                name,
                description,
                api_calls,
                time,
                quality: mode.estimated_quality(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleRequest {
    pub text: &'static str,
    pub category: &'static str,
}

pub fn example_requests() -> Vec<ExampleRequest> {
    [
        ("A story about a little dragon who is afraid of the dark", "fantasy"),
        ("A story about a shy turtle who makes new friends", "friendship"),
        ("An adventure where a robot learns about emotions", "learning"),
        ("A story about a brave bunny who goes on an adventure", "adventure"),
        ("A magical story about a unicorn who helps others", "magic"),
    ]
    .into_iter()
    .map(|(text, category)| ExampleRequest { text, category })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub story_generator_available: bool,
    pub api_key_configured: bool,
    pub version: &'static str,
}

pub fn health(engine: &WorkflowManager, llm: &LlmConfig) -> HealthStatus {
    HealthStatus {
        status: "healthy",
        story_generator_available: engine.is_available(),
        api_key_configured: llm.is_configured(),
        version: env!("CARGO_PKG_VERSION"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::services::testing::*;
    use serde_json::json;

    fn engine() -> WorkflowManager {
        WorkflowManager::new(&Config::default(), Some(ScriptedLlm::happy_path().into_client()))
    }

    #[test]
    fn test_validation() {
        let req: StoryApiRequest = serde_json::from_str(r#"{"request": "  a fox  "}"#).unwrap();
        assert_eq!(req.validate().unwrap(), ("a fox".to_string(), Mode::Balanced));

        let req = StoryApiRequest {
            request: "   ".to_string(),
            mode: None,
        };
        assert_eq!(req.validate(), Err(ValidationError::EmptyRequest));

        let req = StoryApiRequest {
            request: "a fox".to_string(),
            mode: Some("turbo".to_string()),
        };
        assert!(matches!(req.validate(), Err(ValidationError::UnknownMode(_))));
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected_without_calls() {
        let llm = ScriptedLlm::happy_path();
        let log = llm.log();
        let engine = WorkflowManager::new(&Config::default(), Some(llm.into_client()));

        let response = handle(&engine, &StoryApiRequest::new("", Mode::Fast)).await;
        assert!(!response.success);
        assert_eq!(response.status, 400);
        assert_eq!(response.error.as_deref(), Some("Story request is required"));
        assert_eq!(log.total(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_generator_is_reported() {
        let engine = WorkflowManager::new(&Config::default(), None);
        let response = handle(&engine, &StoryApiRequest::new("a fox", Mode::Fast)).await;
        assert_eq!(response.status, 500);
        assert_eq!(response.error.as_deref(), Some(GENERATOR_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_success_shape() {
        let response = handle(&engine(), &StoryApiRequest::new("a dragon", Mode::Fast)).await;
        let body = serde_json::to_value(&response).unwrap();

        assert_eq!(body["success"], json!(true));
        assert_eq!(body["story"], json!(STORY_TEXT));
        assert_eq!(body["metadata"]["mode"], json!("fast"));
        assert_eq!(body["metadata"]["category"], json!("fantasy"));
        assert_eq!(body["metadata"]["score"], json!("N/A"));
        assert_eq!(body["metadata"]["api_calls"], json!(2));
        assert!(body.get("error").is_none());
        assert!(body.get("status").is_none());

        let response = handle(&engine(), &StoryApiRequest::new("a dragon", Mode::Balanced)).await;
        let metadata = response.metadata.unwrap();
        assert_eq!(metadata.score, json!(9.0));
        assert_eq!(metadata.estimated_quality, "8-9/10");
    }

    #[test]
    fn test_catalogs() {
        let modes = mode_catalog();
        assert_eq!(modes.len(), 3);
        assert_eq!(modes[0].id, Mode::Fast);
        assert_eq!(modes[2].quality, "9-10/10");
        assert_eq!(example_requests().len(), 5);

        let status = health(&engine(), &LlmConfig::default());
        assert!(status.story_generator_available);
        assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
    }
}
