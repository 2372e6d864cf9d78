use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::error::ValidationError;

/// Score at or above which a critique accepts the story.
pub const ACCEPT_THRESHOLD: f64 = 7.5;

pub const STORY_APOLOGY: &str =
    "I'm sorry, I couldn't generate the story right now. Please try again.";
pub const WORKFLOW_APOLOGY: &str =
    "I'm sorry, there was an error generating your story. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Adventure,
    Friendship,
    Fantasy,
    Bedtime,
    Learning,
    Family,
    Animal,
    Magic,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Adventure,
        Category::Friendship,
        Category::Fantasy,
        Category::Bedtime,
        Category::Learning,
        Category::Family,
        Category::Animal,
        Category::Magic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Adventure => "adventure",
            Category::Friendship => "friendship",
            Category::Fantasy => "fantasy",
            Category::Bedtime => "bedtime",
            Category::Learning => "learning",
            Category::Family => "family",
            Category::Animal => "animal",
            Category::Magic => "magic",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Gentle,
    Playful,
    Adventurous,
    Magical,
    Cozy,
    Educational,
}

impl Tone {
    pub const ALL: [Tone; 6] = [
        Tone::Gentle,
        Tone::Playful,
        Tone::Adventurous,
        Tone::Magical,
        Tone::Cozy,
        Tone::Educational,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Gentle => "gentle",
            Tone::Playful => "playful",
            Tone::Adventurous => "adventurous",
            Tone::Magical => "magical",
            Tone::Cozy => "cozy",
            Tone::Educational => "educational",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == label)
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub category: Category,
    pub themes: Vec<String>,
    pub tone: Tone,
}

impl CategoryInfo {
    pub fn fallback() -> Self {
        Self {
            category: Category::Bedtime,
            themes: vec!["friendship".to_string(), "kindness".to_string()],
            tone: Tone::Gentle,
        }
    }

    pub fn themes_joined(&self) -> String {
        self.themes.join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approach {
    Emotional,
    Action,
    Discovery,
}

impl Approach {
    pub const ORDER: [Approach; 3] = [Approach::Emotional, Approach::Action, Approach::Discovery];

    /// Approach assigned to the plan at `index` of a batch.
    pub fn for_position(index: usize) -> Self {
        Self::ORDER[index % Self::ORDER.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Approach::Emotional => "emotional",
            Approach::Action => "action",
            Approach::Discovery => "discovery",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::ORDER.into_iter().find(|a| a.as_str() == label)
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub text: String,
    pub approach: Approach,
}

impl Plan {
    pub fn fallback() -> Self {
        Self {
            text: "A gentle bedtime story with a positive message and happy ending.".to_string(),
            approach: Approach::Emotional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanScore {
    pub index: usize,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    pub total: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEvaluation {
    pub plans: Vec<PlanScore>,
    pub best_plan_index: usize,
    pub best_plan: Plan,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Accept,
    Revise,
}

impl Verdict {
    pub fn from_score(overall_score: f64) -> Self {
        if overall_score >= ACCEPT_THRESHOLD {
            Verdict::Accept
        } else {
            Verdict::Revise
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accept => f.write_str("ACCEPT"),
            Verdict::Revise => f.write_str("REVISE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Moderate,
    Minor,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => f.write_str("critical"),
            Severity::Moderate => f.write_str("moderate"),
            Severity::Minor => f.write_str("minor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub location: String,
    pub problem: String,
    pub fix: String,
    pub severity: Severity,
}

/// The five criteria every story critique scores, each 1-10.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionScores {
    pub age_appropriateness: u8,
    pub engagement: u8,
    pub structure: u8,
    pub educational_value: u8,
    pub bedtime_suitability: u8,
}

impl CriterionScores {
    pub fn named(&self) -> [(&'static str, u8); 5] {
        [
            ("age_appropriateness", self.age_appropriateness),
            ("engagement", self.engagement),
            ("structure", self.structure),
            ("educational_value", self.educational_value),
            ("bedtime_suitability", self.bedtime_suitability),
        ]
    }

    pub fn mean(&self) -> f64 {
        let named = self.named();
        let sum: u32 = named.iter().map(|(_, s)| *s as u32).sum();
        sum as f64 / named.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiqueResult {
    pub scores: CriterionScores,
    pub overall_score: f64,
    pub verdict: Verdict,
    pub strengths: Vec<String>,
    pub issues: Vec<Issue>,
}

impl CritiqueResult {
    /// Builds a critique whose verdict always agrees with its score.
    pub fn new(
        scores: CriterionScores,
        overall_score: f64,
        strengths: Vec<String>,
        issues: Vec<Issue>,
    ) -> Self {
        Self {
            scores,
            overall_score,
            verdict: Verdict::from_score(overall_score),
            strengths,
            issues,
        }
    }

    pub fn fallback() -> Self {
        Self::new(
            CriterionScores {
                age_appropriateness: 8,
                engagement: 7,
                structure: 8,
                educational_value: 7,
                bedtime_suitability: 8,
            },
            7.6,
            vec![
                "Age-appropriate content".to_string(),
                "Good structure".to_string(),
            ],
            Vec::new(),
        )
    }

    pub fn is_accepted(&self) -> bool {
        self.verdict == Verdict::Accept
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Fast,
    #[default]
    Balanced,
    Best,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Fast, Mode::Balanced, Mode::Best];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Fast => "fast",
            Mode::Balanced => "balanced",
            Mode::Best => "best",
        }
    }

    pub fn estimated_quality(&self) -> &'static str {
        match self {
            Mode::Fast => "7-8/10",
            Mode::Balanced => "8-9/10",
            Mode::Best => "9-10/10",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Mode::Fast),
            "balanced" => Ok(Mode::Balanced),
            "best" => Ok(Mode::Best),
            other => Err(ValidationError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub mode: Mode,
    pub category: Option<Category>,
    pub themes: Vec<String>,
    pub tone: Option<Tone>,
    /// `None` when the story was never evaluated.
    pub score: Option<f64>,
    pub api_calls: u32,
    pub iterations: u32,
    pub estimated_quality: String,
    #[serde(default)]
    pub extras: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub story: String,
    pub metadata: Metadata,
}

impl GenerationResult {
    pub fn new(
        story: String,
        mode: Mode,
        info: &CategoryInfo,
        score: Option<f64>,
        api_calls: u32,
        iterations: u32,
    ) -> Self {
        Self {
            story,
            metadata: Metadata {
                mode,
                category: Some(info.category),
                themes: info.themes.clone(),
                tone: Some(info.tone),
                score,
                api_calls,
                iterations,
                estimated_quality: mode.estimated_quality().to_string(),
                extras: BTreeMap::new(),
            },
        }
    }

    /// Result reported when a mode strategy fails outright.
    pub fn failed(mode: Mode, error: impl fmt::Display) -> Self {
        let mut extras = BTreeMap::new();
        extras.insert("error".to_string(), Value::String(error.to_string()));
        Self {
            story: WORKFLOW_APOLOGY.to_string(),
            metadata: Metadata {
                mode,
                category: None,
                themes: Vec::new(),
                tone: None,
                score: None,
                api_calls: 0,
                iterations: 0,
                estimated_quality: "N/A".to_string(),
                extras,
            },
        }
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.extras.insert(key.to_string(), value.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.metadata.extras.contains_key("error")
    }
}
