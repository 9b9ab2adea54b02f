//! Recognizers registered by name, built from config.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::recognizer::{LuisRecognizer, Recognizer};

#[derive(Clone, Default)]
pub struct BotServices {
    recognizers: HashMap<String, Arc<dyn Recognizer>>,
}

impl BotServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a LUIS recognizer for every configured service.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut services = Self::new();
        for (name, service) in &config.luis {
            let recognizer = LuisRecognizer::new(service.clone())
                .with_context(|| format!("Failed to build LUIS client '{}'", name))?;
            info!(
                "Registered LUIS service '{}' (app {}, {:?})",
                name,
                recognizer.app_id(),
                service.api_version
            );
            services.recognizers.insert(name.clone(), Arc::new(recognizer));
        }
        Ok(services)
    }

    pub fn with_recognizer(mut self, key: impl Into<String>, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizers.insert(key.into(), recognizer);
        self
    }

    pub fn recognizer(&self, key: &str) -> Option<Arc<dyn Recognizer>> {
        self.recognizers.get(key).cloned()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.recognizers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for BotServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotServices")
            .field("recognizers", &self.keys())
            .finish()
    }
}
