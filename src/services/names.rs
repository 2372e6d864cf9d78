use log::{error, info, warn};
use std::sync::Arc;

use crate::core::error::CompletionError;
use crate::core::state::NamePool;
use crate::core::story::{Category, CategoryInfo};
use crate::services::completion::{CompletionRequest, CompletionService};
use crate::utils::text::clean_name_line;

/// Roster used when an individual naming call fails.
const GENERIC_NAMES: [&str; 5] = ["Zara", "Koda", "Nina", "Aria", "Finn"];

/// Roster used when no completion service is configured at all.
fn category_names(category: Category) -> [&'static str; 3] {
    match category {
        Category::Animal => ["Zara", "Koda", "Nina"],
        Category::Adventure => ["Aria", "Finn", "Maya"],
        Category::Friendship => ["Leo", "Sage", "Ivy"],
        Category::Fantasy => ["Orion", "Luna", "Kai"],
        Category::Bedtime => ["Nova", "River", "Skye"],
        Category::Learning => ["Phoenix", "Willow", "Sage"],
        Category::Family => ["Ember", "Forest", "Rain"],
        Category::Magic => ["Stella", "Cosmo", "Aurora"],
    }
}

/// Hands out character names and records them in the shared [`NamePool`].
#[derive(Debug, Clone)]
pub struct NameAllocator {
    pool: Arc<NamePool>,
    recent_window: usize,
}

impl NameAllocator {
    pub fn new(pool: Arc<NamePool>, recent_window: usize) -> Self {
        Self { pool, recent_window }
    }

    /// Returns exactly `count` distinct names. Recently used names are shown to the
    /// service as names to avoid; nothing stops it from reusing one.
    pub async fn allocate(
        &self,
        service: &CompletionService,
        request: &str,
        info: &CategoryInfo,
        count: usize,
    ) -> Vec<String> {
        info!("Generating {} unique character names...", count);

        let names = match self.request_names(service, request, info, count).await {
            Ok(names) => names,
            Err(CompletionError::Unavailable) => {
                warn!("Naming service unavailable, using {} roster", info.category);
                category_names(info.category).iter().map(|n| n.to_string()).collect()
            }
            Err(e) => {
                error!("Error generating names: {}", e);
                GENERIC_NAMES.iter().map(|n| n.to_string()).collect()
            }
        };

        let names = fit_to_count(names, count);
        let added = self.pool.merge(&names);
        info!(
            "Names: {} ({} new, {} tracked so far)",
            names.join(", "),
            added,
            self.pool.len()
        );
        names
    }

    async fn request_names(
        &self,
        service: &CompletionService,
        request: &str,
        info: &CategoryInfo,
        count: usize,
    ) -> Result<Vec<String>, CompletionError> {
        let recent = self.pool.sample_recent(self.recent_window);
        let used = if recent.is_empty() {
            "None yet".to_string()
        } else {
            recent.join(", ")
        };

        let prompt = format!(
            "You are a creative children's book author who specializes in memorable character names.\n\n\
            Story Request: \"{request}\"\n\
            Category: {category}\n\
            Themes: {themes}\n\n\
            NAMES ALREADY USED (avoid these): {used}\n\n\
            Generate {count} unique, memorable character names for this story. They must be \
            easy to pronounce for children aged 5-10, culturally diverse, fit the story's world, \
            and must not repeat any name from the list above or overused names like Max or Bella.\n\n\
            Respond with ONLY the names, one per line, no numbers or explanations.",
            category = info.category,
            themes = info.themes_joined(),
        );

        let reply = service
            .complete(&CompletionRequest::text("names", prompt, 0.7, 100))
            .await?;
        Ok(parse_names(&reply))
    }
}

fn parse_names(reply: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in reply.split(['\n', ',']).filter_map(clean_name_line) {
        if !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            names.push(name);
        }
    }
    names
}

/// Truncates to `count`, then pads with `Character{n}` placeholders.
fn fit_to_count(mut names: Vec<String>, count: usize) -> Vec<String> {
    names.truncate(count);
    let mut n = names.len() + 1;
    while names.len() < count {
        let placeholder = format!("Character{}", n);
        if !names.contains(&placeholder) {
            names.push(placeholder);
        }
        n += 1;
    }
    names
}
