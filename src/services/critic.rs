use log::{error, info};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::error::CompletionError;
use crate::core::story::{
    CategoryInfo, CriterionScores, CritiqueResult, Issue, Severity, ACCEPT_THRESHOLD,
};
use crate::services::completion::{CompletionRequest, CompletionService};

/// Criteria below this score get a synthesized issue when the service lists none.
const ISSUE_SCORE: u8 = 8;

// Loosely typed so that one odd field does not discard the whole reply.
#[derive(Deserialize)]
struct RawCritique {
    #[serde(default)]
    scores: BTreeMap<String, Value>,
    #[serde(default)]
    overall_score: Option<Value>,
    #[serde(default)]
    strengths: Vec<Value>,
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Deserialize)]
struct RawIssue {
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    problem: Option<String>,
    #[serde(default)]
    fix: Option<String>,
    #[serde(default)]
    severity: Option<String>,
}

/// Structured critique of a story. Fails open: on any service problem the story is
/// assumed acceptable so the workflow can finish.
pub async fn critique(
    service: &CompletionService,
    story: &str,
    request: &str,
    info: &CategoryInfo,
) -> CritiqueResult {
    info!("Structured critique of story...");

    match try_critique(service, story, request, info).await {
        Ok(result) => {
            info!(
                "Structured critique complete. Verdict: {} (Score: {:.1})",
                result.verdict, result.overall_score
            );
            for issue in &result.issues {
                info!("   - [{}] {}: {}", issue.severity, issue.location, issue.problem);
            }
            result
        }
        Err(e) => {
            error!("Error in structured story evaluation: {}", e);
            CritiqueResult::fallback()
        }
    }
}

async fn try_critique(
    service: &CompletionService,
    story: &str,
    request: &str,
    info: &CategoryInfo,
) -> Result<CritiqueResult, CompletionError> {
    let prompt = format!(
        "You are an expert children's literature editor. Evaluate this story with SPECIFIC, ACTIONABLE feedback.\n\n\
        Story to evaluate:\n{story}\n\n\
        Original request: \"{request}\"\n\
        Target category: {category}\n\
        Target themes: {themes}\n\n\
        Score each criterion from 1 to 10:\n\
        - age_appropriateness: vocabulary and content suitable for ages 5-10\n\
        - engagement: how interesting and captivating the story is\n\
        - structure: clear beginning, middle, end with good flow\n\
        - educational_value: positive lessons or values taught\n\
        - bedtime_suitability: calming and appropriate for bedtime\n\n\
        For every score below 8 list an issue with its location (\"opening\", \"paragraph 2\", \"ending\"), \
        the concrete problem, an actionable fix and a severity (critical/moderate/minor). \
        Also list the strengths to preserve during revision.\n\n\
        Return JSON: {{\"scores\": {{\"age_appropriateness\": 8, \"engagement\": 7, \"structure\": 9, \
        \"educational_value\": 8, \"bedtime_suitability\": 7}}, \"overall_score\": 7.8, \
        \"verdict\": \"ACCEPT\", \"strengths\": [\"...\"], \"issues\": [{{\"location\": \"...\", \
        \"problem\": \"...\", \"fix\": \"...\", \"severity\": \"moderate\"}}]}}\n\n\
        Acceptance criteria: overall score >= {threshold} is ACCEPT, below is REVISE.",
        category = info.category,
        themes = info.themes_joined(),
        threshold = ACCEPT_THRESHOLD,
    );

    let raw: RawCritique = service
        .complete_json(&CompletionRequest::json("critique", prompt, 0.2, 800))
        .await?;
    into_critique(raw)
}

fn into_critique(raw: RawCritique) -> Result<CritiqueResult, CompletionError> {
    let lookup = |name: &str| raw.scores.get(name).and_then(as_number).map(clamp_score);
    let named = [
        lookup("age_appropriateness"),
        lookup("engagement"),
        lookup("structure"),
        lookup("educational_value"),
        lookup("bedtime_suitability"),
    ];

    let present: Vec<u8> = named.iter().flatten().copied().collect();
    let service_overall = raw.overall_score.as_ref().and_then(as_number);
    let filler = match (present.is_empty(), service_overall) {
        (true, None) => {
            return Err(CompletionError::Malformed {
                stage: "critique",
                reason: "no scores returned".to_string(),
            })
        }
        (_, Some(overall)) => clamp_score(overall),
        (false, None) => {
            let sum: u32 = present.iter().map(|s| *s as u32).sum();
            clamp_score(sum as f64 / present.len() as f64)
        }
    };
    let score = |i: usize| named[i].unwrap_or(filler);
    let scores = CriterionScores {
        age_appropriateness: score(0),
        engagement: score(1),
        structure: score(2),
        educational_value: score(3),
        bedtime_suitability: score(4),
    };

    let overall = if present.is_empty() {
        service_overall.unwrap_or(filler as f64).clamp(1.0, 10.0)
    } else {
        scores.mean()
    };

    let issues: Vec<Issue> = raw
        .issues
        .into_iter()
        .filter_map(|i| {
            let problem = i.problem?.trim().to_string();
            if problem.is_empty() {
                return None;
            }
            Some(Issue {
                location: non_empty(i.location, "whole story"),
                problem,
                fix: non_empty(i.fix, "Revise this part to address the problem"),
                severity: parse_severity(i.severity.as_deref().unwrap_or_default()),
            })
        })
        .collect();

    let strengths = raw
        .strengths
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let mut result = CritiqueResult::new(scores, overall, strengths, issues);
    if !result.is_accepted() && result.issues.is_empty() {
        result.issues = issues_from_scores(&result.scores);
    }
    Ok(result)
}

/// One issue per criterion scoring below [`ISSUE_SCORE`].
fn issues_from_scores(scores: &CriterionScores) -> Vec<Issue> {
    scores
        .named()
        .into_iter()
        .filter(|(_, score)| *score < ISSUE_SCORE)
        .map(|(name, score)| Issue {
            location: "whole story".to_string(),
            problem: format!("{} scored {}/10", name.replace('_', " "), score),
            fix: criterion_fix(name).to_string(),
            severity: if score <= 6 { Severity::Moderate } else { Severity::Minor },
        })
        .collect()
}

fn criterion_fix(name: &str) -> &'static str {
    match name {
        "age_appropriateness" => "Simplify vocabulary and remove anything unsuitable for ages 5-10",
        "engagement" => "Add a vivid detail or a line of dialogue that draws the listener in",
        "structure" => "Smooth the transitions so the beginning, middle and end flow clearly",
        "educational_value" => "Let the characters show the lesson through a small choice",
        _ => "Soften the pacing and close with a calm, sleepy image",
    }
}

/// Numbers and numeric strings such as `"7"` both count as scores.
fn as_number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n: &f64| n.is_finite())
}

fn clamp_score(score: f64) -> u8 {
    score.round().clamp(1.0, 10.0) as u8
}

fn parse_severity(label: &str) -> Severity {
    match label.trim().to_lowercase().as_str() {
        "critical" => Severity::Critical,
        "minor" => Severity::Minor,
        _ => Severity::Moderate,
    }
}

fn non_empty(value: Option<String>, default: &str) -> String {
    let value = value.unwrap_or_default();
    let value = value.trim();
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::story::Verdict;
    use crate::services::testing::*;

    async fn critique_reply(reply: &str) -> CritiqueResult {
        let llm = ScriptedLlm::new().on(CRITIQUE_MARKER, reply);
        let service = CompletionService::new(Some(llm.into_client()));
        critique(&service, STORY_TEXT, "a dragon", &CategoryInfo::fallback()).await
    }

    #[tokio::test]
    async fn test_verdict_is_recomputed_from_scores() {
        let result = critique_reply(&critique_json(9, 0)).await;
        assert_eq!(result.verdict, Verdict::Accept);
        assert!((result.overall_score - 9.0).abs() < 1e-9);

        let result = critique_reply(&critique_json(6, 2)).await;
        assert_eq!(result.verdict, Verdict::Revise);
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.strengths, vec!["warm tone"]);
    }

    #[tokio::test]
    async fn test_mean_decides_threshold() {
        // mean = (8 + 8 + 7 + 7 + 8) / 5 = 7.6
        let result = critique_reply(
            r#"{"scores": {"age_appropriateness": 8, "engagement": 8, "structure": 7,
                "educational_value": 7, "bedtime_suitability": 8}, "overall_score": 5.0,
                "verdict": "REVISE"}"#,
        )
        .await;
        assert_eq!(result.verdict, Verdict::Accept);

        // mean = 7.4
        let result = critique_reply(
            r#"{"scores": {"age_appropriateness": 8, "engagement": 7, "structure": 7,
                "educational_value": 7, "bedtime_suitability": 8}, "verdict": "ACCEPT"}"#,
        )
        .await;
        assert_eq!(result.verdict, Verdict::Revise);
    }

    #[tokio::test]
    async fn test_overall_only_reply_uses_service_score() {
        let result = critique_reply(r#"{"overall_score": 7.5, "issues": []}"#).await;
        assert_eq!(result.verdict, Verdict::Accept);
        assert!((result.overall_score - 7.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_revise_without_issues_gets_heuristic_issues() {
        let result = critique_reply(&critique_json(5, 0)).await;
        assert_eq!(result.verdict, Verdict::Revise);
        assert!(!result.issues.is_empty());
    }

    #[tokio::test]
    async fn test_critique_fails_open() {
        let service = CompletionService::new(Some(ScriptedLlm::failing().into_client()));
        let result = critique(&service, STORY_TEXT, "x", &CategoryInfo::fallback()).await;
        assert_eq!(result, CritiqueResult::fallback());

        let result = critique_reply("the story is lovely").await;
        assert_eq!(result.verdict, Verdict::Accept);
        assert!(result.issues.is_empty());
    }

    #[tokio::test]
    async fn test_string_scores_and_null_fields_are_tolerated() {
        let result = critique_reply(
            r#"{"scores": {"age_appropriateness": "4", "engagement": " 4 ", "structure": "4",
                "educational_value": 4, "bedtime_suitability": "4"},
                "overall_score": 4.0, "verdict": "REVISE",
                "strengths": ["calm ending", null],
                "issues": [{"location": null, "problem": "the dragon is scary", "fix": "soften the roar",
                    "severity": null}]}"#,
        )
        .await;
        assert_eq!(result.verdict, Verdict::Revise);
        assert!((result.overall_score - 4.0).abs() < 1e-9);
        assert_eq!(result.strengths, vec!["calm ending"]);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].severity, Severity::Moderate);
        assert_eq!(result.issues[0].location, "whole story");
    }

    #[tokio::test]
    async fn test_unusable_scores_fall_back_to_overall() {
        let result = critique_reply(
            r#"{"scores": {"engagement": "great", "structure": null}, "overall_score": "5.5"}"#,
        )
        .await;
        assert_eq!(result.verdict, Verdict::Revise);
        assert!((result.overall_score - 5.5).abs() < 1e-9);
        assert!(!result.issues.is_empty());
    }

    #[test]
    fn test_scores_are_clamped() {
        assert_eq!(clamp_score(14.0), 10);
        assert_eq!(clamp_score(0.0), 1);
        assert_eq!(clamp_score(7.6), 8);
        assert_eq!(parse_severity("CRITICAL"), Severity::Critical);
        assert_eq!(parse_severity("whatever"), Severity::Moderate);
    }
}
