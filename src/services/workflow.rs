use anyhow::{ensure, Result};
use futures_util::FutureExt;
use log::{error, info};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::core::config::{Config, StoryConfig};
use crate::core::state::NamePool;
use crate::core::story::{CategoryInfo, GenerationResult, Mode, PlanEvaluation};
use crate::services::categorizer::categorize;
use crate::services::completion::CompletionService;
use crate::services::critic::critique;
use crate::services::llm::LlmClient;
use crate::services::names::NameAllocator;
use crate::services::planner::{generate_plans, judge_plans};
use crate::services::refiner::refine;
use crate::services::writer::{write_story, ConstrainedWriter, PlanBasedWriter};

const FAST_API_CALLS: u32 = 2;
const BALANCED_BASE_API_CALLS: u32 = 5;
// Reported for best mode regardless of an early exit from the refinement loop.
const BEST_API_CALLS: u32 = 8;
const BEST_ITERATIONS: u32 = 3;
const BEST_REFINEMENT_CYCLES: usize = 2;

/// Runs the fast, balanced and best story workflows.
///
/// Workflows take `&self` and may run concurrently; the name pool is the only state
/// they share.
pub struct WorkflowManager {
    config: StoryConfig,
    llm: Option<Arc<dyn LlmClient>>,
    pool: Arc<NamePool>,
    names: NameAllocator,
}

struct Preparation {
    info: CategoryInfo,
    names: Vec<String>,
    evaluation: PlanEvaluation,
}

impl WorkflowManager {
    pub fn new(config: &Config, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self::with_pool(config, llm, Arc::new(NamePool::new()))
    }

    pub fn with_pool(
        config: &Config,
        llm: Option<Arc<dyn LlmClient>>,
        pool: Arc<NamePool>,
    ) -> Self {
        let names = NameAllocator::new(pool.clone(), config.story.recent_name_window);
        Self {
            config: config.story.clone(),
            llm,
            pool,
            names,
        }
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_some()
    }

    pub fn name_pool(&self) -> &Arc<NamePool> {
        &self.pool
    }

    /// Starts a fresh name deduplication scope.
    pub fn reset_names(&self) {
        self.pool.reset();
    }

    /// Runs one workflow. Always returns a well-formed result; failures inside a mode
    /// become an apology story with zeroed counters.
    pub async fn generate(&self, request: &str, mode: Mode) -> GenerationResult {
        info!("BEDTIME STORY GENERATOR - {} MODE", mode.as_str().to_uppercase());

        let run = AssertUnwindSafe(self.run_mode(request, mode)).catch_unwind().await;
        match run {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Error in {} mode: {:#}", mode, e);
                GenerationResult::failed(mode, format!("{:#}", e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Error in {} mode: {}", mode, message);
                GenerationResult::failed(mode, message)
            }
        }
    }

    async fn run_mode(&self, request: &str, mode: Mode) -> Result<GenerationResult> {
        match mode {
            Mode::Fast => self.run_fast(request).await,
            Mode::Balanced => self.run_balanced(request).await,
            Mode::Best => self.run_best(request).await,
        }
    }

    /// Categorize, then one constrained single-shot story. No judging.
    async fn run_fast(&self, request: &str) -> Result<GenerationResult> {
        info!("FAST MODE: Quick story generation with strong constraints");
        let service = CompletionService::new(self.llm.clone());

        let info = categorize(&service, request).await;
        let names = self
            .names
            .allocate(&service, request, &info, self.config.name_count)
            .await;
        let story = write_story(&ConstrainedWriter, &service, request, &info, &names, None).await;

        let result = GenerationResult::new(story, Mode::Fast, &info, None, FAST_API_CALLS, 1)
            .with_extra("plan_used", "strong_constraints")
            .with_extra("judging_skipped", true)
            .with_extra("character_names", names)
            .with_extra("service_calls", service.calls());

        info!("Fast mode complete! API calls: {}", result.metadata.api_calls);
        Ok(result)
    }

    /// Full pipeline with at most one revision.
    async fn run_balanced(&self, request: &str) -> Result<GenerationResult> {
        info!("BALANCED MODE: Full pipeline with conditional refinement");
        let service = CompletionService::new(self.llm.clone());
        let prep = self.prepare(&service, request).await?;

        let mut story = write_story(
            &PlanBasedWriter,
            &service,
            request,
            &prep.info,
            &prep.names,
            Some(&prep.evaluation.best_plan),
        )
        .await;
        let mut judgement = critique(&service, &story, request, &prep.info).await;

        let mut iterations = 1;
        let mut issues_fixed = 0;
        if !judgement.is_accepted() {
            info!("Story needs improvement - refining...");
            issues_fixed = judgement.issues.len();
            story = refine(&service, &story, &judgement, request).await;
            judgement = critique(&service, &story, request, &prep.info).await;
            iterations = 2;
        }

        let api_calls = BALANCED_BASE_API_CALLS + (iterations - 1);
        let result = GenerationResult::new(
            story,
            Mode::Balanced,
            &prep.info,
            Some(judgement.overall_score),
            api_calls,
            iterations,
        )
        .with_extra("plan_approach", prep.evaluation.best_plan.approach.as_str())
        .with_extra("plan_reasoning", prep.evaluation.reasoning.clone())
        .with_extra("judge_verdict", judgement.verdict.to_string())
        .with_extra("issues_fixed", issues_fixed)
        .with_extra("character_names", prep.names)
        .with_extra("service_calls", service.calls());

        info!(
            "Balanced mode complete! Final score: {:.1}, API calls: {}",
            judgement.overall_score, api_calls
        );
        Ok(result)
    }

    /// Full pipeline with two refinement cycles and a final reporting critique.
    async fn run_best(&self, request: &str) -> Result<GenerationResult> {
        info!("BEST MODE: Full pipeline with guaranteed refinements");
        let service = CompletionService::new(self.llm.clone());
        let prep = self.prepare(&service, request).await?;

        let mut story = write_story(
            &PlanBasedWriter,
            &service,
            request,
            &prep.info,
            &prep.names,
            Some(&prep.evaluation.best_plan),
        )
        .await;

        let mut total_issues_fixed = 0;
        let mut refinement_attempts = 0;
        for cycle in 0..BEST_REFINEMENT_CYCLES {
            info!("Refinement cycle {}/{}...", cycle + 1, BEST_REFINEMENT_CYCLES);
            let judgement = critique(&service, &story, request, &prep.info).await;

            if cycle > 0 && judgement.is_accepted() {
                info!("Story meets quality standards, stopping refinement");
                break;
            }

            // An empty issue list makes this a no-op.
            story = refine(&service, &story, &judgement, request).await;
            refinement_attempts += 1;
            if !judgement.issues.is_empty() {
                total_issues_fixed += judgement.issues.len();
                info!("   Fixed {} issues in cycle {}", judgement.issues.len(), cycle + 1);
            }
        }

        let final_judgement = critique(&service, &story, request, &prep.info).await;

        let result = GenerationResult::new(
            story,
            Mode::Best,
            &prep.info,
            Some(final_judgement.overall_score),
            BEST_API_CALLS,
            BEST_ITERATIONS,
        )
        .with_extra("plan_approach", prep.evaluation.best_plan.approach.as_str())
        .with_extra("plan_reasoning", prep.evaluation.reasoning.clone())
        .with_extra("total_issues_fixed", total_issues_fixed)
        .with_extra("final_verdict", final_judgement.verdict.to_string())
        .with_extra("refinement_attempts", refinement_attempts)
        .with_extra("character_names", prep.names)
        .with_extra("service_calls", service.calls());

        info!(
            "Best mode complete! Final score: {:.1}, Issues fixed: {}",
            final_judgement.overall_score, total_issues_fixed
        );
        Ok(result)
    }

    /// Shared front half of balanced and best: categorize, name, plan, judge plans.
    async fn prepare(&self, service: &CompletionService, request: &str) -> Result<Preparation> {
        let info = categorize(service, request).await;
        let names = self
            .names
            .allocate(service, request, &info, self.config.name_count)
            .await;

        let plans = generate_plans(service, request, &info, self.config.plan_count).await;
        let evaluation = judge_plans(service, &plans, request, &info).await;
        ensure!(
            evaluation.best_plan_index < plans.len().max(1),
            "plan judge selected index {} of {} plans",
            evaluation.best_plan_index,
            plans.len()
        );

        Ok(Preparation {
            info,
            names,
            evaluation,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("unexpected failure: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("unexpected failure: {}", s)
    } else {
        "unexpected failure".to_string()
    }
}
