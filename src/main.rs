use anyhow::Result;
use bedtime_stories::core::config::{Config, CONFIG_FILE};
use bedtime_stories::core::story::{GenerationResult, Mode};
use bedtime_stories::services::api::{example_requests, mode_catalog};
use bedtime_stories::services::llm::create_llm;
use bedtime_stories::services::workflow::WorkflowManager;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, Select, Text};
use std::path::Path;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            eprintln!("Please check 'config.yml' or remove it to use the defaults.");
            return Err(e);
        }
    };

    if !Path::new(CONFIG_FILE).exists() {
        config.save()?;
        println!("Wrote default settings to {}.", CONFIG_FILE);
    }

    let llm = create_llm(&config)?;
    if llm.is_none() {
        println!("No completion provider configured; stories will use offline fallbacks.");
        println!("Set OPENAI_API_KEY (or configure config.yml) for real stories.\n");
    }
    let manager = WorkflowManager::new(&config, llm);

    println!("Bedtime Story Generator\n");
    println!("Example requests:");
    let examples = example_requests();
    for (i, example) in examples.iter().enumerate() {
        println!("  {}. {}", i + 1, example.text);
    }
    println!();

    loop {
        let request = Text::new("What kind of story would you like to hear?")
            .with_help_message("Leave empty to use the first example")
            .prompt()?;
        let request = match request.trim() {
            "" => examples.first().map(|e| e.text).unwrap_or_default().to_string(),
            text => text.to_string(),
        };

        let mode = select_mode(config.story.default_mode)?;

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message(format!("Writing your story in {} mode...", mode));

        let result = manager.generate(&request, mode).await;
        spinner.finish_and_clear();

        print_result(&result);

        let again = Confirm::new("Generate another story?")
            .with_default(false)
            .prompt()?;
        if !again {
            break;
        }
    }

    Ok(())
}

fn select_mode(default: Mode) -> Result<Mode> {
    let catalog = mode_catalog();
    let options: Vec<String> = catalog
        .iter()
        .map(|m| {
            format!(
                "{} - {} (~{} calls, {}, quality {})",
                m.id, m.description, m.api_calls, m.time, m.quality
            )
        })
        .collect();
    let start = catalog.iter().position(|m| m.id == default).unwrap_or(0);

    let choice = Select::new("Generation mode:", options)
        .with_starting_cursor(start)
        .raw_prompt()?;
    Ok(catalog.get(choice.index).map(|m| m.id).unwrap_or(default))
}

fn print_result(result: &GenerationResult) {
    let meta = &result.metadata;

    println!("\n{}\n", "=".repeat(60));
    println!("{}", result.story);
    println!("\n{}", "=".repeat(60));

    println!("Mode: {}", meta.mode);
    if let Some(category) = meta.category {
        println!("Category: {}", category);
    }
    if !meta.themes.is_empty() {
        println!("Themes: {}", meta.themes.join(", "));
    }
    match meta.score {
        Some(score) => println!("Score: {:.1}/10", score),
        None => println!("Score: not evaluated"),
    }
    println!("API calls: {}", meta.api_calls);
    println!("Iterations: {}", meta.iterations);
    println!("Estimated quality: {}", meta.estimated_quality);
    for (key, value) in &meta.extras {
        println!("  {}: {}", key, value);
    }
    println!();
}
