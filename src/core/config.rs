use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::story::Mode;
use crate::services::llm::LlmConfig;

pub const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub story: StoryConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoryConfig {
    #[serde(default = "default_plan_count")]
    pub plan_count: usize,

    #[serde(default = "default_name_count")]
    pub name_count: usize,

    /// How many recently used names the naming prompt asks the service to avoid.
    #[serde(default = "default_recent_name_window")]
    pub recent_name_window: usize,

    #[serde(default)]
    pub default_mode: Mode,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            plan_count: default_plan_count(),
            name_count: default_name_count(),
            recent_name_window: default_recent_name_window(),
            default_mode: Mode::default(),
        }
    }
}

fn default_plan_count() -> usize {
    3
}
fn default_name_count() -> usize {
    3
}
fn default_recent_name_window() -> usize {
    10
}

impl Config {
    /// Loads `config.yml` from the working directory, or defaults when it is absent.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        if !path.exists() {
            log::warn!("{} not found, using default settings", CONFIG_FILE);
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Path::new(CONFIG_FILE))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.story.plan_count == 0 {
            anyhow::bail!("story.plan_count must be at least 1");
        }
        if self.story.name_count == 0 {
            anyhow::bail!("story.name_count must be at least 1");
        }
        self.llm.validate()
    }
}
