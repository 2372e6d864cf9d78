//! Scripted model used by the stage and workflow tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::services::llm::{ChatOptions, LlmClient};

pub const CATEGORY_MARKER: &str = "Analyze the following story request";
pub const NAMES_MARKER: &str = "unique, memorable character names";
pub const PLANS_MARKER: &str = "DIFFERENT story approaches";
pub const PLAN_JUDGE_MARKER: &str = "Plans to evaluate:";
pub const STORY_MARKER: &str = "based on the provided plan";
pub const FAST_STORY_MARKER: &str = "will NOT be judged or refined";
pub const CRITIQUE_MARKER: &str = "SPECIFIC, ACTIONABLE feedback";
pub const REFINE_MARKER: &str = "Specific issues to fix:";

pub const CATEGORY_JSON: &str =
    r#"{"category": "fantasy", "themes": ["courage", "friendship"], "tone": "magical"}"#;
pub const NAMES_TEXT: &str = "1. Ember\n2. Quill\n3. Tamsin";
pub const PLANS_JSON: &str = r#"[
    {"plan_text": "SETUP: a dragon fears the dark. CONFLICT: night falls.", "approach": "emotional"},
    {"plan_text": "SETUP: a dragon races the moon. CONFLICT: clouds.", "approach": "action"},
    {"plan_text": "SETUP: a dragon studies fireflies. CONFLICT: a puzzle.", "approach": "discovery"}
]"#;
pub const PLAN_JUDGE_JSON: &str = r#"{
    "plans": [
        {"index": 0, "scores": {"originality": 6, "alignment": 7}, "total": 13},
        {"index": 1, "scores": {"originality": 9, "alignment": 9}, "total": 18},
        {"index": 2, "scores": {"originality": 5, "alignment": 6}, "total": 11}
    ],
    "best_plan_index": 0,
    "reasoning": "Plan 2 has the strongest arc."
}"#;
pub const STORY_TEXT: &str = "Ember the dragon watched the stars and smiled.";
pub const REFINED_TEXT: &str = "Ember the dragon watched the stars, yawned, and smiled.";

/// Critique reply with every criterion set to `score` and the given number of issues.
pub fn critique_json(score: u8, issues: usize) -> String {
    let issues: Vec<String> = (0..issues)
        .map(|i| {
            format!(
                r#"{{"location": "paragraph {}", "problem": "rushed", "fix": "slow down", "severity": "moderate"}}"#,
                i + 1
            )
        })
        .collect();
    format!(
        r#"{{
            "scores": {{"age_appropriateness": {s}, "engagement": {s}, "structure": {s},
                        "educational_value": {s}, "bedtime_suitability": {s}}},
            "overall_score": {s},
            "verdict": "IGNORED",
            "strengths": ["warm tone"],
            "issues": [{issues}]
        }}"#,
        s = score,
        issues = issues.join(",")
    )
}

#[derive(Debug)]
struct Rule {
    marker: String,
    replies: VecDeque<String>,
}

/// Replies by prompt marker; the last reply for a marker repeats. Unmatched prompts fail.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    rules: Mutex<Vec<Rule>>,
    log: PromptLog,
    fail_all: bool,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Every stage answered with a well-formed reply; critiques accept.
    pub fn happy_path() -> Self {
        Self::new()
            .on(CATEGORY_MARKER, CATEGORY_JSON)
            .on(NAMES_MARKER, NAMES_TEXT)
            .on(PLAN_JUDGE_MARKER, PLAN_JUDGE_JSON)
            .on(PLANS_MARKER, PLANS_JSON)
            .on(REFINE_MARKER, REFINED_TEXT)
            .on(CRITIQUE_MARKER, &critique_json(9, 0))
            .on(STORY_MARKER, STORY_TEXT)
            .on(FAST_STORY_MARKER, STORY_TEXT)
    }

    pub fn on(self, marker: &str, reply: &str) -> Self {
        self.on_sequence(marker, &[reply])
    }

    /// Replaces the replies of an earlier rule for `marker`, keeping its position.
    pub fn on_sequence(self, marker: &str, replies: &[&str]) -> Self {
        {
            let replies: VecDeque<String> = replies.iter().map(|r| r.to_string()).collect();
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| r.marker == marker) {
                Some(rule) => rule.replies = replies,
                None => rules.push(Rule {
                    marker: marker.to_string(),
                    replies,
                }),
            }
        }
        self
    }

    /// Removes the rule for `marker`, so that stage fails.
    pub fn without(self, marker: &str) -> Self {
        self.rules.lock().unwrap().retain(|r| r.marker != marker);
        self
    }

    pub fn log(&self) -> PromptLog {
        self.log.clone()
    }

    pub fn into_client(self) -> Arc<dyn LlmClient> {
        Arc::new(self)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, _system: &str, user: &str, _options: &ChatOptions) -> Result<String> {
        self.log.0.lock().unwrap().push(user.to_string());
        if self.fail_all {
            return Err(anyhow!("scripted failure"));
        }

        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| user.contains(&r.marker))
            .ok_or_else(|| anyhow!("no scripted reply"))?;

        if rule.replies.len() > 1 {
            Ok(rule.replies.pop_front().unwrap_or_default())
        } else {
            rule.replies.front().cloned().ok_or_else(|| anyhow!("no scripted reply"))
        }
    }
}

/// Shared record of every prompt a [`ScriptedLlm`] received.
#[derive(Debug, Default, Clone)]
pub struct PromptLog(Arc<Mutex<Vec<String>>>);

impl PromptLog {
    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, marker: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|p| p.contains(marker)).count()
    }

    pub fn total(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}
