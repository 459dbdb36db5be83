mod types;

pub use types::*;

use crate::{Error, Result};
use std::{env, str::FromStr};
use tracing::{debug, info};

pub async fn load() -> Result<Config> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

    debug!("Loading configuration from: {}", config_path);

    let mut config = match tokio::fs::read_to_string(&config_path).await {
        Ok(config_str) => serde_yaml::from_str(&config_str)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(
                "No configuration file at {}, using defaults and environment",
                config_path
            );
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };

    config.apply_env_overrides(|key| env::var(key).ok())?;
    config.validate()?;

    Ok(config)
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key} has an invalid value: '{value}'")))
}

impl Config {
    /// Applies environment overrides on top of file values. `lookup` is `env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = parse_var("PORT", &v)?;
        }

        if let Some(v) = lookup("VISION_BASE_URL") {
            self.vision.base_url = v;
        }
        if let Some(v) = lookup("VISION_API_KEY") {
            self.vision.api_key = v;
        }
        if let Some(v) = lookup("VISION_MODEL") {
            self.vision.model = v;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_SECS") {
            let secs = parse_var("REQUEST_TIMEOUT_SECS", &v)?;
            self.vision.timeout_secs = secs;
            self.judge.timeout_secs = secs;
            self.chat.timeout_secs = secs;
        }

        if let Some(v) = lookup("MAX_IMAGE_DIMENSION") {
            self.image.max_dimension = parse_var("MAX_IMAGE_DIMENSION", &v)?;
        }
        if let Some(v) = lookup("JPEG_QUALITY") {
            self.image.jpeg_quality = parse_var("JPEG_QUALITY", &v)?;
        }

        if let Some(v) = lookup("CAPTIONER_URL") {
            self.captioner.runner_url = v;
        }
        if let Some(v) = lookup("CAPTIONER_MODEL") {
            self.captioner.model = v;
        }
        if let Some(v) = lookup("IMAGE_GEN_URL") {
            self.image_gen.runner_url = v;
        }
        if let Some(v) = lookup("IMAGE_GEN_MODEL") {
            self.image_gen.model = v;
        }

        if let Some(v) = lookup("JUDGE_BASE_URL") {
            self.judge.base_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("JUDGE_API_KEY") {
            self.judge.api_key = Some(v);
        }
        if let Some(v) = lookup("JUDGE_MODEL") {
            self.judge.model = v;
        }

        if let Some(v) = lookup("CHAT_BASE_URL") {
            self.chat.base_url = v;
        }
        if let Some(v) = lookup("CHAT_API_KEY") {
            self.chat.api_key = Some(v);
        }
        if let Some(v) = lookup("CHAT_MODEL") {
            self.chat.model = v;
        }

        if let Some(v) = lookup("HISTORY_DB_PATH") {
            self.history.database_path = v;
        }
        if let Some(v) = lookup("HISTORY_MAX_TURNS") {
            self.history.max_turns = Some(parse_var("HISTORY_MAX_TURNS", &v)?);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.image.max_dimension == 0 {
            return Err(Error::config("image.max_dimension must be greater than zero"));
        }
        if !(1..=100).contains(&self.image.jpeg_quality) {
            return Err(Error::config("image.jpeg_quality must be between 1 and 100"));
        }
        if self.judge.max_attempts == 0 {
            return Err(Error::config("judge.max_attempts must be at least 1"));
        }
        if self.history.max_turns == Some(0) {
            return Err(Error::config("history.max_turns must be at least 1 when set"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.vision.base_url, "http://127.0.0.1:8000/v1");
        assert_eq!(config.vision.api_key, "EMPTY");
        assert_eq!(config.vision.timeout_secs, 60);
        assert_eq!(config.captioner.max_new_tokens, 30);
        assert_eq!(config.judge.max_attempts, 3);
        assert!(config.judge.base_url.is_none());
        assert!(config.chat.api_key.is_none());
        assert!(config.history.max_turns.is_none());
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_yaml_keeps_section_defaults() {
        let yaml = r#"
server:
  port: 9090
image_gen:
  runner_url: "http://gpu-box:7860"
chat:
  api_key: "secret"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.image_gen.runner_url, "http://gpu-box:7860");
        assert_eq!(config.image_gen.model, "stabilityai/stable-diffusion-2-1-base");
        assert_eq!(config.chat.api_key.as_deref(), Some("secret"));
        assert_eq!(config.chat.model, "gemini-1.5-flash");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(lookup_from(&[
                ("VISION_BASE_URL", "http://vllm:8000/v1"),
                ("VISION_MODEL", "llava"),
                ("REQUEST_TIMEOUT_SECS", "5"),
                ("MAX_IMAGE_DIMENSION", "512"),
                ("JPEG_QUALITY", "70"),
                ("JUDGE_BASE_URL", "http://judge/v1"),
                ("JUDGE_API_KEY", "jk"),
                ("CHAT_API_KEY", "ck"),
                ("HISTORY_MAX_TURNS", "40"),
            ]))
            .unwrap();

        assert_eq!(config.vision.base_url, "http://vllm:8000/v1");
        assert_eq!(config.vision.model, "llava");
        assert_eq!(config.vision.timeout_secs, 5);
        assert_eq!(config.chat.timeout_secs, 5);
        assert_eq!(config.image.max_dimension, 512);
        assert_eq!(config.image.jpeg_quality, 70);
        assert_eq!(config.judge.base_url.as_deref(), Some("http://judge/v1"));
        assert_eq!(config.judge.api_key.as_deref(), Some("jk"));
        assert_eq!(config.chat.api_key.as_deref(), Some("ck"));
        assert_eq!(config.history.max_turns, Some(40));
    }

    #[test]
    fn test_blank_judge_url_disables_judging() {
        let mut config = Config::default();
        config.judge.base_url = Some("http://judge".to_string());
        config
            .apply_env_overrides(lookup_from(&[("JUDGE_BASE_URL", "  ")]))
            .unwrap();
        assert!(config.judge.base_url.is_none());
    }

    #[test]
    fn test_invalid_env_value_names_the_variable() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(lookup_from(&[("JPEG_QUALITY", "high")]))
            .unwrap_err();
        assert!(err.to_string().contains("JPEG_QUALITY"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_quality() {
        let mut config = Config::default();
        config.image.jpeg_quality = 0;
        assert_err!(config.validate());

        let mut config = Config::default();
        config.history.max_turns = Some(0);
        assert_err!(config.validate());
    }
}
