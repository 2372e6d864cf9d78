//! Multi-plan selection: one batched call drafts several outlines, a second call
//! scores them all, and the highest total wins.

use log::{debug, error, info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::core::error::CompletionError;
use crate::core::story::{Approach, CategoryInfo, Plan, PlanEvaluation, PlanScore};
use crate::services::completion::{CompletionRequest, CompletionService};

pub const PLAN_CRITERIA: [&str; 11] = [
    "originality",
    "narrative_potential",
    "alignment",
    "child_appeal",
    "bedtime_suitability",
    "educational_value",
    "positive_message",
    "cozy_atmosphere",
    "character_development",
    "plot_clarity",
    "resolution_clarity",
];

const FALLBACK_REASONING: &str = "Fallback selection due to error";

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPlanBatch {
    List(Vec<RawPlan>),
    Wrapped { plans: Vec<RawPlan> },
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(alias = "text")]
    plan_text: String,
    #[serde(default)]
    approach: Option<String>,
}

/// Drafts `count` plans in a single call. On failure returns one emotional fallback plan.
pub async fn generate_plans(
    service: &CompletionService,
    request: &str,
    info: &CategoryInfo,
    count: usize,
) -> Vec<Plan> {
    info!("Generating {} different story plans...", count);

    match try_generate(service, request, info, count).await {
        Ok(plans) => {
            info!("Generated {} different story plans", plans.len());
            for (i, plan) in plans.iter().enumerate() {
                info!("   Plan {} ({}): {}", i + 1, plan.approach, preview(&plan.text));
            }
            plans
        }
        Err(e) => {
            error!("Error generating multiple plans: {}", e);
            vec![Plan::fallback()]
        }
    }
}

async fn try_generate(
    service: &CompletionService,
    request: &str,
    info: &CategoryInfo,
    count: usize,
) -> Result<Vec<Plan>, CompletionError> {
    let approaches: Vec<String> = (0..count)
        .map(|i| {
            let approach = Approach::for_position(i);
            let focus = match approach {
                Approach::Emotional => "character feelings, relationships, personal growth",
                Approach::Action => "adventure, challenges, exciting events",
                Approach::Discovery => "learning, exploration, problem-solving",
            };
            format!("Approach {} ({}): Focus on {}", i + 1, approach, focus)
        })
        .collect();

    let prompt = format!(
        "You are a creative story planner. Generate {count} DIFFERENT story approaches for the same request.\n\n\
        {approaches}\n\n\
        For each approach, write a brief plan (4-6 sentences) covering SETUP, CONFLICT, JOURNEY and RESOLUTION.\n\n\
        Request: \"{request}\"\n\
        Category: {category}\n\
        Themes: {themes}\n\
        Tone: {tone}\n\n\
        Return a JSON array with {count} objects of the form \
        {{\"plan_text\": \"SETUP: ... CONFLICT: ... JOURNEY: ... RESOLUTION: ...\", \"approach\": \"emotional\"}}.",
        approaches = approaches.join("\n"),
        category = info.category,
        themes = info.themes_joined(),
        tone = info.tone,
    );

    let batch: RawPlanBatch = service
        .complete_json(&CompletionRequest::json("plans", prompt, 0.7, 800))
        .await?;
    let raw = match batch {
        RawPlanBatch::List(plans) | RawPlanBatch::Wrapped { plans } => plans,
    };

    let plans: Vec<Plan> = raw
        .into_iter()
        .filter(|p| !p.plan_text.trim().is_empty())
        .take(count)
        .enumerate()
        .map(|(i, p)| Plan {
            approach: p
                .approach
                .as_deref()
                .and_then(Approach::from_label)
                .unwrap_or_else(|| Approach::for_position(i)),
            text: p.plan_text.trim().to_string(),
        })
        .collect();

    if plans.is_empty() {
        return Err(CompletionError::Malformed {
            stage: "plans",
            reason: "no plans returned".to_string(),
        });
    }
    Ok(plans)
}

#[derive(Deserialize)]
struct RawEvaluation {
    #[serde(default)]
    plans: Vec<RawPlanScore>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Deserialize)]
struct RawPlanScore {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    scores: BTreeMap<String, f64>,
    #[serde(default)]
    total: Option<f64>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
}

/// Scores every plan and picks the highest total; ties go to the earlier plan.
/// On failure the first plan is chosen.
pub async fn judge_plans(
    service: &CompletionService,
    plans: &[Plan],
    request: &str,
    info: &CategoryInfo,
) -> PlanEvaluation {
    let fallback_batch;
    let plans = if plans.is_empty() {
        fallback_batch = [Plan::fallback()];
        &fallback_batch[..]
    } else {
        plans
    };

    info!("Judging all story plans to select the best...");

    match try_judge(service, plans, request, info).await {
        Ok(evaluation) => {
            info!(
                "Plan evaluation complete. Best plan: #{} ({})",
                evaluation.best_plan_index + 1,
                evaluation.best_plan.approach
            );
            info!("   Reasoning: {}", preview(&evaluation.reasoning));
            evaluation
        }
        Err(e) => {
            error!("Error judging plans: {}", e);
            fallback_evaluation(plans)
        }
    }
}

async fn try_judge(
    service: &CompletionService,
    plans: &[Plan],
    request: &str,
    info: &CategoryInfo,
) -> Result<PlanEvaluation, CompletionError> {
    let plans_text: String = plans
        .iter()
        .enumerate()
        .map(|(i, p)| format!("\nPlan {} (index {}, {}):\n{}\n", i + 1, i, p.approach, p.text))
        .collect();
    let criteria = PLAN_CRITERIA
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c.to_uppercase()))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "You are a story editor evaluating {n} candidate outlines for a children's bedtime story.\n\
        Score each plan from 1 to 10 on these criteria:\n{criteria}\n\n\
        Original request: \"{request}\"\n\
        Target category: {category}\n\
        Target themes: {themes}\n\n\
        Plans to evaluate:\n{plans_text}\n\
        Return JSON: {{\"plans\": [{{\"index\": 0, \"scores\": {{\"originality\": 8, ...}}, \"total\": 80, \
        \"strengths\": [\"...\"], \"weaknesses\": [\"...\"]}}, ...], \"best_plan_index\": 0, \
        \"reasoning\": \"why the best plan wins\"}}",
        n = plans.len(),
        category = info.category,
        themes = info.themes_joined(),
    );

    let raw: RawEvaluation = service
        .complete_json(&CompletionRequest::json("judge_plans", prompt, 0.2, 1000))
        .await?;
    select_best(plans, raw)
}

fn select_best(plans: &[Plan], raw: RawEvaluation) -> Result<PlanEvaluation, CompletionError> {
    if raw.plans.is_empty() {
        return Err(CompletionError::Malformed {
            stage: "judge_plans",
            reason: "no plan scores returned".to_string(),
        });
    }

    // Some replies number plans from 1, matching the "Plan N" headings.
    let explicit: Vec<usize> = raw.plans.iter().filter_map(|p| p.index).collect();
    let one_based =
        !explicit.is_empty() && explicit.iter().all(|i| (1..=plans.len()).contains(i));
    if one_based {
        debug!("Plan scores use 1-based indices, shifting");
    }

    let mut by_index: BTreeMap<usize, RawPlanScore> = BTreeMap::new();
    for (position, score) in raw.plans.into_iter().enumerate() {
        let index = match score.index {
            Some(i) if one_based => i - 1,
            Some(i) => i,
            None => position,
        };
        if index < plans.len() {
            by_index.entry(index).or_insert(score);
        } else {
            warn!("Dropping score for unknown plan index {}", index);
        }
    }

    let scores: Vec<PlanScore> = (0..plans.len())
        .map(|index| match by_index.remove(&index) {
            Some(raw) => {
                let total = if raw.scores.is_empty() {
                    raw.total.unwrap_or(0.0)
                } else {
                    raw.scores.values().map(|s| s.clamp(0.0, 10.0)).sum()
                };
                PlanScore {
                    index,
                    scores: raw.scores,
                    total,
                    strengths: raw.strengths,
                    weaknesses: raw.weaknesses,
                }
            }
            None => PlanScore {
                index,
                scores: BTreeMap::new(),
                total: 0.0,
                strengths: Vec::new(),
                weaknesses: vec!["Not scored".to_string()],
            },
        })
        .collect();

    let mut best = 0;
    for score in &scores {
        if score.total > scores[best].total {
            best = score.index;
        }
    }

    Ok(PlanEvaluation {
        plans: scores,
        best_plan_index: best,
        best_plan: plans[best].clone(),
        reasoning: raw.reasoning,
    })
}

fn fallback_evaluation(plans: &[Plan]) -> PlanEvaluation {
    PlanEvaluation {
        plans: vec![PlanScore {
            index: 0,
            scores: BTreeMap::new(),
            total: 30.0,
            strengths: vec!["Simple structure".to_string()],
            weaknesses: vec!["Generic".to_string()],
        }],
        best_plan_index: 0,
        best_plan: plans.first().cloned().unwrap_or_else(Plan::fallback),
        reasoning: FALLBACK_REASONING.to_string(),
    }
}

fn preview(text: &str) -> String {
    let short: String = text.chars().take(100).collect();
    if short.len() < text.len() {
        format!("{}...", short)
    } else {
        short
    }
}
