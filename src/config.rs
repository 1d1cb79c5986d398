use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Http,
    Local,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub engine: Engine,
    #[serde(default)]
    pub api_base_url: String,
    #[serde(default)]
    pub image_base_url: String,
    pub page_size: u32,
    pub proximity_margin: f64,
    pub scroll_restore_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub allowed_extensions: HashSet<String>,
    pub num_workers: usize,
    pub log_level: String,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("GALLERY"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// The http engine cannot run without both endpoints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine == Engine::Http
            && (self.api_base_url.trim().is_empty() || self.image_base_url.trim().is_empty())
        {
            return Err(ConfigError::Message(
                "Missing api_base_url or image_base_url for the http engine".into(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Message("page_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn scroll_restore_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.scroll_restore_delay_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: Engine::Local,
            api_base_url: String::new(),
            image_base_url: String::new(),
            page_size: 12,
            proximity_margin: 200.0,
            scroll_restore_delay_ms: 100,
            request_timeout_secs: 30,
            allowed_extensions: ["jpg", "jpeg", "png", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            num_workers: 4,
            log_level: "info".into(),
        }
    }
}
