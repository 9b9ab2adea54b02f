//! Configuration — YAML config + env var overrides.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Key the handler looks up its recognizer under.
pub const LUIS_KEY: &str = "LuisBot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LuisApiVersion {
    #[default]
    V2,
    V3,
}

impl std::str::FromStr for LuisApiVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "v2" | "2" => Ok(LuisApiVersion::V2),
            "v3" | "3" => Ok(LuisApiVersion::V3),
            other => anyhow::bail!("Unknown LUIS api_version '{}' (expected v2 or v3)", other),
        }
    }
}

/// One LUIS application the bot can query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LuisServiceConfig {
    pub app_id: String,

    pub subscription_key: String,

    /// Regional endpoint, e.g. https://westus.api.cognitive.microsoft.com
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_version: LuisApiVersion,

    /// Publishing slot (v3 only)
    #[serde(default = "default_slot")]
    pub slot: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerSettings {
    /// Intent whose entities are copied into the ticket slots
    #[serde(default = "default_reservation_intent")]
    pub reservation_intent: String,

    /// Also report the first known entity's type and score
    #[serde(default)]
    pub report_entities: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// LUIS services keyed by name
    #[serde(default)]
    pub luis: BTreeMap<String, LuisServiceConfig>,

    #[serde(default)]
    pub handler: HandlerSettings,
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_endpoint() -> String {
    "https://westus.api.cognitive.microsoft.com".into()
}
fn default_slot() -> String {
    "production".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_reservation_intent() -> String {
    "Reservation".into()
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            reservation_intent: default_reservation_intent(),
            report_entities: false,
        }
    }
}

impl Config {
    /// Load config from a YAML file with env var overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        Self::load_with(config_path, process_env)
    }

    /// Like [`Config::load`], with `env` standing in for the process environment.
    pub fn load_with(config_path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config.yaml from `dir`, falling back to env vars alone when the
    /// file does not exist.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.yaml");
        if config_path.is_file() {
            return Self::load(&config_path);
        }
        let mut config = Config::default();
        config.apply_overrides(process_env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(content).context("Failed to parse config.yaml")
    }

    /// Apply `LUISBOT_*` overrides to the `LuisBot` entry. Blank values count
    /// as unset.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let env = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let app_id = env("LUISBOT_APP_ID");
        let key = env("LUISBOT_SUBSCRIPTION_KEY");

        if !self.luis.contains_key(LUIS_KEY) {
            // A service can be defined from env alone, but only when complete
            if let (Some(app_id), Some(key)) = (app_id.clone(), key.clone()) {
                self.luis.insert(
                    LUIS_KEY.to_string(),
                    LuisServiceConfig {
                        app_id,
                        subscription_key: key,
                        endpoint: default_endpoint(),
                        api_version: LuisApiVersion::default(),
                        slot: default_slot(),
                        timeout_seconds: default_timeout(),
                    },
                );
            }
        }

        if let Some(service) = self.luis.get_mut(LUIS_KEY) {
            if let Some(app_id) = app_id {
                service.app_id = app_id;
            }
            if let Some(key) = key {
                service.subscription_key = key;
            }
            if let Some(endpoint) = env("LUISBOT_ENDPOINT") {
                service.endpoint = endpoint;
            }
            if let Some(version) = env("LUISBOT_API_VERSION") {
                service.api_version = version.parse()?;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, service) in &self.luis {
            if service.app_id.trim().is_empty() {
                anyhow::bail!("LUIS service '{}' requires app_id", name);
            }
            if service.subscription_key.trim().is_empty() {
                anyhow::bail!("LUIS service '{}' requires subscription_key", name);
            }
            if !service.endpoint.starts_with("http://") && !service.endpoint.starts_with("https://")
            {
                anyhow::bail!(
                    "LUIS service '{}' endpoint must start with http:// or https:// (got '{}')",
                    name,
                    service.endpoint
                );
            }
        }
        Ok(())
    }
}
