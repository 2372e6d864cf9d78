use log::{error, info};

use crate::core::story::{CategoryInfo, Plan, STORY_APOLOGY};
use crate::services::completion::{CompletionRequest, CompletionService};
use crate::utils::text::word_count;

pub trait StoryWriter: Send + Sync {
    fn stage(&self) -> &'static str;
    fn temperature(&self) -> f32;
    fn generate_prompt(
        &self,
        request: &str,
        info: &CategoryInfo,
        names: &[String],
        plan: Option<&Plan>,
    ) -> String;
}

/// Writes the story from the plan chosen by the plan judge.
pub struct PlanBasedWriter;

impl StoryWriter for PlanBasedWriter {
    fn stage(&self) -> &'static str {
        "story"
    }

    fn temperature(&self) -> f32 {
        0.8
    }

    fn generate_prompt(
        &self,
        request: &str,
        info: &CategoryInfo,
        names: &[String],
        plan: Option<&Plan>,
    ) -> String {
        let fallback = Plan::fallback();
        let plan = plan.unwrap_or(&fallback);
        format!(
            "Write a complete bedtime story based on the provided plan.\n\n\
            User Request: \"{request}\"\n\
            Story Plan: \"{plan_text}\"\n\
            Approach: {approach}\n\
            Category: {category}\n\
            Themes: {themes}\n\
            Tone: {tone}\n\n\
            CHARACTER NAMES TO USE: {names}\n\
            Use these character names and no others.\n\n\
            Write 300-500 words with age-appropriate vocabulary, a calming narrative, some dialogue, \
            a gentle conflict that is easily resolved, a positive lesson and a cozy, peaceful ending. \
            No scary elements or violence.\n\n\
            Respond with ONLY the story text, no additional commentary.",
            plan_text = plan.text,
            approach = plan.approach,
            category = info.category,
            themes = info.themes_joined(),
            tone = info.tone,
            names = names.join(", "),
        )
    }
}

/// Single-shot writer for fast mode; its output is never judged, so the prompt
/// carries every quality requirement up front.
pub struct ConstrainedWriter;

impl StoryWriter for ConstrainedWriter {
    fn stage(&self) -> &'static str {
        "fast_story"
    }

    fn temperature(&self) -> f32 {
        0.7
    }

    fn generate_prompt(
        &self,
        request: &str,
        info: &CategoryInfo,
        names: &[String],
        _plan: Option<&Plan>,
    ) -> String {
        format!(
            "You are a critically-acclaimed children's bedtime story author. Write a best-selling story \
            on the first try.\n\n\
            User Request: \"{request}\"\n\
            Category: {category}\n\
            Themes: {themes}\n\
            Tone: {tone}\n\n\
            CHARACTER NAMES TO USE: {names}\n\
            Use these character names and no others.\n\n\
            QUALITY REQUIREMENTS:\n\
            - 300-500 words, vocabulary for ages 5-10\n\
            - Clear beginning, middle and end with smooth transitions\n\
            - Engaging dialogue between relatable characters\n\
            - A positive lesson woven in naturally\n\
            - No scary elements, violence or intense conflict\n\
            - A warm, cozy atmosphere and a peaceful conclusion\n\n\
            This story will NOT be judged or refined, so it must be excellent on the first try.\n\n\
            Respond with ONLY the story text, no additional commentary.",
            category = info.category,
            themes = info.themes_joined(),
            tone = info.tone,
            names = names.join(", "),
        )
    }
}

/// Runs `writer` against the service. Never fails: a failed call yields the apology text.
pub async fn write_story(
    writer: &dyn StoryWriter,
    service: &CompletionService,
    request: &str,
    info: &CategoryInfo,
    names: &[String],
    plan: Option<&Plan>,
) -> String {
    info!("Generating story ({})...", writer.stage());

    let prompt = writer.generate_prompt(request, info, names, plan);
    let call = CompletionRequest::text(writer.stage(), prompt, writer.temperature(), 800);

    match service.complete(&call).await {
        Ok(story) => {
            info!("Story generated ({} words)", word_count(&story));
            story
        }
        Err(e) => {
            error!("Error generating story: {}", e);
            STORY_APOLOGY.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::story::Approach;
    use crate::services::testing::*;

    fn names() -> Vec<String> {
        vec!["Ember".to_string(), "Quill".to_string()]
    }

    #[tokio::test]
    async fn test_plan_based_prompt_carries_plan_and_names() {
        let llm = ScriptedLlm::new().on(STORY_MARKER, STORY_TEXT);
        let log = llm.log();
        let service = CompletionService::new(Some(llm.into_client()));
        let plan = Plan {
            text: "A dragon counts fireflies".to_string(),
            approach: Approach::Discovery,
        };

        let story = write_story(
            &PlanBasedWriter,
            &service,
            "a dragon",
            &CategoryInfo::fallback(),
            &names(),
            Some(&plan),
        )
        .await;
        assert_eq!(story, STORY_TEXT);

        let prompt = &log.all()[0];
        assert!(prompt.contains("A dragon counts fireflies"));
        assert!(prompt.contains("discovery"));
        assert!(prompt.contains("Ember, Quill"));
    }

    #[tokio::test]
    async fn test_constrained_writer_skips_plan() {
        let llm = ScriptedLlm::new().on(FAST_STORY_MARKER, STORY_TEXT);
        let log = llm.log();
        let service = CompletionService::new(Some(llm.into_client()));

        let story = write_story(
            &ConstrainedWriter,
            &service,
            "a dragon",
            &CategoryInfo::fallback(),
            &names(),
            None,
        )
        .await;
        assert_eq!(story, STORY_TEXT);
        assert_eq!(log.count(STORY_MARKER), 0);
    }

    #[tokio::test]
    async fn test_both_writers_apologize_on_failure() {
        let service = CompletionService::new(Some(ScriptedLlm::failing().into_client()));
        let writers: [&dyn StoryWriter; 2] = [&PlanBasedWriter, &ConstrainedWriter];
        for writer in writers {
            let story = write_story(
                writer,
                &service,
                "x",
                &CategoryInfo::fallback(),
                &names(),
                None,
            )
            .await;
            assert_eq!(story, STORY_APOLOGY);
        }
    }
}
