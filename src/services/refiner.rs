use log::{error, info};

use crate::core::story::{CritiqueResult, Issue};
use crate::services::completion::{CompletionRequest, CompletionService};
use crate::utils::text::word_count;

/// Targeted revision of `story` against the critique's issues.
///
/// With no issues the story comes back untouched and the service is not called.
/// A failed revision also returns the original story.
pub async fn refine(
    service: &CompletionService,
    story: &str,
    critique: &CritiqueResult,
    request: &str,
) -> String {
    if critique.issues.is_empty() {
        info!("No issues to fix - story is already good!");
        return story.to_string();
    }

    info!("Targeted refinement of {} issues...", critique.issues.len());

    let strengths = if critique.strengths.is_empty() {
        "None listed".to_string()
    } else {
        critique.strengths.join(", ")
    };
    let prompt = format!(
        "You are a best-selling children's story author and editor making targeted revisions for ages 5-10.\n\n\
        Original request: \"{request}\"\n\n\
        Original story:\n{story}\n\n\
        Specific issues to fix:\n{issues}\n\n\
        Story strengths to preserve:\n{strengths}\n\n\
        Instructions:\n\
        1. Address each issue exactly as specified\n\
        2. Make MINIMAL changes, only what each fix needs\n\
        3. Preserve all strengths, the structure, tone and flow\n\
        4. Do not rewrite sections that are not mentioned in the issues\n\
        5. Keep the story between 300 and 500 words\n\n\
        Return ONLY the revised story text.",
        issues = format_issues(&critique.issues),
    );

    match service
        .complete(&CompletionRequest::text("refine", prompt, 0.6, 800))
        .await
    {
        Ok(revised) => {
            info!(
                "Story refined ({} words), addressed {} issues",
                word_count(&revised),
                critique.issues.len()
            );
            revised
        }
        Err(e) => {
            error!("Error refining story, keeping previous draft: {}", e);
            story.to_string()
        }
    }
}

fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .enumerate()
        .map(|(i, issue)| {
            format!(
                "Issue {} [{}]:\n  Location: {}\n  Problem: {}\n  Fix: {}",
                i + 1,
                issue.severity.to_string().to_uppercase(),
                issue.location,
                issue.problem,
                issue.fix
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
