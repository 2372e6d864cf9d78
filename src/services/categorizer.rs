use log::{error, info};
use serde::Deserialize;

use crate::core::error::CompletionError;
use crate::core::story::{Category, CategoryInfo, Tone};
use crate::services::completion::{CompletionRequest, CompletionService};

const MIN_THEMES: usize = 2;
const MAX_THEMES: usize = 4;

#[derive(Deserialize)]
struct RawCategory {
    category: String,
    #[serde(default)]
    themes: Vec<String>,
    tone: String,
}

/// Classifies a request into category, themes and tone. Never fails: any service
/// problem yields [`CategoryInfo::fallback`].
pub async fn categorize(service: &CompletionService, request: &str) -> CategoryInfo {
    info!("Stage 1: Categorizing story request...");

    match try_categorize(service, request).await {
        Ok(info) => {
            info!(
                "Categorized as: {} - {} tone ({})",
                info.category,
                info.tone,
                info.themes_joined()
            );
            info
        }
        Err(e) => {
            error!("Error in categorization: {}", e);
            CategoryInfo::fallback()
        }
    }
}

async fn try_categorize(
    service: &CompletionService,
    request: &str,
) -> Result<CategoryInfo, CompletionError> {
    let categories = Category::ALL.map(|c| c.as_str()).join(", ");
    let tones = Tone::ALL.map(|t| t.as_str()).join(", ");
    let prompt = format!(
        "You are a children's story expert specializing in bedtime stories for ages 5-10.\n\
        Analyze the following story request and categorize it with themes and tone.\n\n\
        Story Request: \"{request}\"\n\n\
        Provide a JSON response with:\n\
        - \"category\": One of [{categories}]\n\
        - \"themes\": List of 2-4 positive themes (e.g., [\"courage\", \"friendship\", \"kindness\"])\n\
        - \"tone\": One of [{tones}]\n\n\
        Choose the most appropriate category, identify themes suitable for children and \
        select a tone that fits the request and bedtime."
    );

    let raw: RawCategory = service
        .complete_json(&CompletionRequest::json("categorize", prompt, 0.3, 200))
        .await?;
    into_category_info(raw)
}

fn into_category_info(raw: RawCategory) -> Result<CategoryInfo, CompletionError> {
    let category = Category::from_label(&raw.category).ok_or_else(|| CompletionError::Malformed {
        stage: "categorize",
        reason: format!("unknown category \"{}\"", raw.category),
    })?;
    let tone = Tone::from_label(&raw.tone).ok_or_else(|| CompletionError::Malformed {
        stage: "categorize",
        reason: format!("unknown tone \"{}\"", raw.tone),
    })?;

    Ok(CategoryInfo {
        category,
        themes: normalize_themes(raw.themes),
        tone,
    })
}

/// De-duplicated, 2 to 4 entries, padded from the fallback themes.
fn normalize_themes(themes: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(MAX_THEMES);
    for theme in themes {
        let theme = theme.trim().to_lowercase();
        if !theme.is_empty() && !out.contains(&theme) {
            out.push(theme);
        }
    }
    out.truncate(MAX_THEMES);

    for theme in CategoryInfo::fallback().themes {
        if out.len() >= MIN_THEMES {
            break;
        }
        if !out.contains(&theme) {
            out.push(theme);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::*;

    #[tokio::test]
    async fn test_categorize_parses_service_reply() {
        let llm = ScriptedLlm::new().on(CATEGORY_MARKER, CATEGORY_JSON);
        let service = CompletionService::new(Some(llm.into_client()));

        let info = categorize(&service, "A dragon afraid of the dark").await;
        assert_eq!(info.category, Category::Fantasy);
        assert_eq!(info.tone, Tone::Magical);
        assert_eq!(info.themes, vec!["courage", "friendship"]);
    }

    #[tokio::test]
    async fn test_categorize_falls_back_when_unavailable() {
        let info = categorize(&CompletionService::unavailable(), "anything").await;
        assert_eq!(info, CategoryInfo::fallback());
    }

    #[tokio::test]
    async fn test_categorize_falls_back_on_unknown_label() {
        let llm = ScriptedLlm::new().on(
            CATEGORY_MARKER,
            r#"{"category": "space opera", "themes": ["stars"], "tone": "gentle"}"#,
        );
        let service = CompletionService::new(Some(llm.into_client()));

        let info = categorize(&service, "rockets").await;
        assert_eq!(info, CategoryInfo::fallback());
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_categorize_makes_single_attempt_on_failure() {
        let llm = ScriptedLlm::failing();
        let log = llm.log();
        let service = CompletionService::new(Some(llm.into_client()));

        let info = categorize(&service, "rockets").await;
        assert_eq!(info, CategoryInfo::fallback());
        assert_eq!(log.total(), 1);
    }

    #[test]
    fn test_themes_are_padded_and_truncated() {
        assert_eq!(normalize_themes(vec!["Courage".into()]), vec!["courage", "friendship"]);
        assert_eq!(
            normalize_themes(vec![
                "a".into(),
                "b".into(),
                "A".into(),
                "c".into(),
                "d".into(),
                "e".into()
            ]),
            vec!["a", "b", "c", "d"]
        );
        assert_eq!(normalize_themes(vec![]), vec!["friendship", "kindness"]);
    }
}
