//! Adapter between the story stages and the configured [`LlmClient`].
//!
//! Every stage talks to the model through [`CompletionService`], which turns transport
//! errors, empty answers and unparsable JSON into a typed [`CompletionError`]. The stages
//! then pick their own fallback value; nothing here decides what a failure means.

use log::debug;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::core::error::CompletionError;
use crate::services::llm::{ChatOptions, LlmClient};
use crate::utils::text::extract_json;

const JSON_SYSTEM: &str =
    "You are an expert in children's bedtime stories. Respond ONLY with valid JSON, no additional text.";
const TEXT_SYSTEM: &str = "You are a beloved children's bedtime story author writing for ages 5-10.";

/// What the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Short stage label used in logs and errors.
    pub stage: &'static str,
    pub prompt: String,
    pub shape: ResponseShape,
    pub options: ChatOptions,
}

impl CompletionRequest {
    pub fn text(stage: &'static str, prompt: String, temperature: f32, max_tokens: u32) -> Self {
        Self {
            stage,
            prompt,
            shape: ResponseShape::Text,
            options: ChatOptions { temperature, max_tokens },
        }
    }

    pub fn json(stage: &'static str, prompt: String, temperature: f32, max_tokens: u32) -> Self {
        Self {
            stage,
            prompt,
            shape: ResponseShape::Json,
            options: ChatOptions { temperature, max_tokens },
        }
    }
}

/// One workflow's view of the completion capability.
///
/// Cheap to create; the orchestrator builds one per workflow so that `calls()` counts
/// only that workflow's traffic.
#[derive(Debug)]
pub struct CompletionService {
    llm: Option<Arc<dyn LlmClient>>,
    calls: AtomicU32,
}

impl CompletionService {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            llm,
            calls: AtomicU32::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(None)
    }

    /// Number of calls that reached the provider, successful or not.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let llm = self.llm.as_ref().ok_or(CompletionError::Unavailable)?;
        let system = match request.shape {
            ResponseShape::Json => JSON_SYSTEM,
            ResponseShape::Text => TEXT_SYSTEM,
        };

        self.calls.fetch_add(1, Ordering::Relaxed);
        debug!(
            "{}: calling model (temperature {}, max_tokens {})",
            request.stage, request.options.temperature, request.options.max_tokens
        );

        let reply = llm
            .chat(system, &request.prompt, &request.options)
            .await
            .map_err(|source| CompletionError::CallFailed {
                stage: request.stage,
                source,
            })?;

        let reply = reply.trim();
        if reply.is_empty() {
            return Err(CompletionError::Malformed {
                stage: request.stage,
                reason: "empty response".to_string(),
            });
        }
        Ok(reply.to_string())
    }

    /// Completes and parses the reply as `T`.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        request: &CompletionRequest,
    ) -> Result<T, CompletionError> {
        let reply = self.complete(request).await?;
        let json = extract_json(&reply);
        serde_json::from_str(&json).map_err(|e| CompletionError::Malformed {
            stage: request.stage,
            reason: format!("{}: {}", e, json),
        })
    }
}
