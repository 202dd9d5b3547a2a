use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::inference::GenerationParams;

pub const DEFAULT_MODEL_ID: &str = "google-t5/t5-small";
const DEFAULT_REVISION: &str = "main";
const DEFAULT_PORT: u16 = 8501;
const DEFAULT_CACHE_DIR: &str = "/tmp";
const DEFAULT_MAX_INPUT_TOKENS: usize = 512;
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Variables model-cache tooling reads to decide where downloads land.
pub const CACHE_ENV_VARS: &[&str] = &["TRANSFORMERS_CACHE", "HF_HOME"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub model_id: String,
    pub revision: String,
    /// Local snapshot; when set the hub is never contacted.
    pub model_dir: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub device: String,
    pub generation: GenerationParams,
    pub max_input_tokens: usize,
    pub max_body_bytes: usize,
    pub preload: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            model_dir: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            device: "cpu".to_string(),
            generation: GenerationParams::default(),
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            preload: true,
        }
    }
}

impl AppConfig {
    /// Reads `.env` (if any) and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(bind) = get("SUMMARIZER_BIND") {
            cfg.bind = bind
                .trim()
                .parse()
                .with_context(|| format!("SUMMARIZER_BIND is not a socket address: {bind}"))?;
        }
        if let Some(model) = get("SUMMARIZER_MODEL") {
            cfg.model_id = model.trim().to_string();
        }
        if let Some(rev) = get("SUMMARIZER_REVISION") {
            cfg.revision = rev.trim().to_string();
        }
        cfg.model_dir = get("SUMMARIZER_MODEL_DIR").map(PathBuf::from);
        if let Some(dir) = get("SUMMARIZER_CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(dir);
        }
        if let Some(device) = get("SUMMARIZER_DEVICE") {
            cfg.device = device.trim().to_string();
        }
        if let Some(v) = get("SUMMARIZER_MAX_LENGTH") {
            cfg.generation.max_length = parse_usize("SUMMARIZER_MAX_LENGTH", &v)?;
        }
        if let Some(v) = get("SUMMARIZER_MIN_LENGTH") {
            cfg.generation.min_length = parse_usize("SUMMARIZER_MIN_LENGTH", &v)?;
        }
        if let Some(v) = get("SUMMARIZER_DO_SAMPLE") {
            cfg.generation.do_sample = parse_bool("SUMMARIZER_DO_SAMPLE", &v)?;
        }
        if let Some(v) = get("SUMMARIZER_TEMPERATURE") {
            cfg.generation.temperature = v
                .trim()
                .parse::<f64>()
                .with_context(|| format!("SUMMARIZER_TEMPERATURE must be a number, got '{v}'"))?;
        }
        if let Some(v) = get("SUMMARIZER_SEED") {
            cfg.generation.seed = v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("SUMMARIZER_SEED must be a non-negative integer, got '{v}'"))?;
        }
        if let Some(v) = get("SUMMARIZER_MAX_INPUT_TOKENS") {
            cfg.max_input_tokens = parse_usize("SUMMARIZER_MAX_INPUT_TOKENS", &v)?;
        }
        if let Some(v) = get("SUMMARIZER_MAX_BODY_BYTES") {
            cfg.max_body_bytes = parse_usize("SUMMARIZER_MAX_BODY_BYTES", &v)?;
        }
        if let Some(v) = get("SUMMARIZER_PRELOAD") {
            cfg.preload = parse_bool("SUMMARIZER_PRELOAD", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.generation.max_length == 0 {
            return Err(anyhow!("SUMMARIZER_MAX_LENGTH must be greater than zero"));
        }
        if self.generation.min_length > self.generation.max_length {
            return Err(anyhow!(
                "SUMMARIZER_MIN_LENGTH ({}) exceeds SUMMARIZER_MAX_LENGTH ({})",
                self.generation.min_length,
                self.generation.max_length
            ));
        }
        let temperature = self.generation.temperature;
        if self.generation.do_sample && !(temperature.is_finite() && temperature > 0.0) {
            return Err(anyhow!(
                "SUMMARIZER_TEMPERATURE must be positive when sampling, got {temperature}"
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow!("SUMMARIZER_MAX_BODY_BYTES must be greater than zero"));
        }
        if self.max_input_tokens < 2 {
            return Err(anyhow!("SUMMARIZER_MAX_INPUT_TOKENS must be at least 2"));
        }
        Ok(())
    }

    /// Points every model-cache variable at `cache_dir`.
    ///
    /// Must run before any worker thread starts reading the environment.
    pub fn apply_cache_env(&self) {
        for var in CACHE_ENV_VARS {
            std::env::set_var(var, &self.cache_dir);
        }
    }

    /// Name shown in logs and `/healthz`.
    pub fn model_label(&self) -> String {
        match &self.model_dir {
            Some(dir) => dir.display().to_string(),
            None => self.model_id.clone(),
        }
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .with_context(|| format!("{key} must be a non-negative integer, got '{value}'"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{key} must be a boolean, got '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_cover_every_setting() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.cache_dir, PathBuf::from("/tmp"));
        assert_eq!(cfg.generation.max_length, 250);
        assert_eq!(cfg.generation.min_length, 80);
        assert!(!cfg.generation.do_sample);
        assert_eq!(cfg.model_id, DEFAULT_MODEL_ID);
        assert_eq!(cfg.bind.port(), 8501);
        assert!(cfg.model_dir.is_none());
        assert!(cfg.preload);
        assert_eq!(cfg.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn sampling_settings_are_read() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("SUMMARIZER_DO_SAMPLE", "true"),
            ("SUMMARIZER_TEMPERATURE", "0.7"),
            ("SUMMARIZER_SEED", "42"),
        ]))
        .unwrap();
        assert!(cfg.generation.do_sample);
        assert_eq!(cfg.generation.temperature, 0.7);
        assert_eq!(cfg.generation.seed, 42);
        assert_eq!(cfg.generation.sampling_temperature(), Some(0.7));

        let greedy = AppConfig::from_lookup(lookup(&[("SUMMARIZER_TEMPERATURE", "0.7")])).unwrap();
        assert_eq!(greedy.generation.sampling_temperature(), None);
    }

    #[test]
    fn rejects_bad_sampling_settings() {
        let err = AppConfig::from_lookup(lookup(&[
            ("SUMMARIZER_DO_SAMPLE", "yes"),
            ("SUMMARIZER_TEMPERATURE", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("positive"));
        assert!(AppConfig::from_lookup(lookup(&[("SUMMARIZER_TEMPERATURE", "warm")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SUMMARIZER_SEED", "-1")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SUMMARIZER_MAX_BODY_BYTES", "0")])).is_err());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("SUMMARIZER_BIND", "127.0.0.1:9000"),
            ("SUMMARIZER_MODEL_DIR", "models/t5"),
            ("SUMMARIZER_CACHE_DIR", "/var/cache/models"),
            ("SUMMARIZER_MAX_LENGTH", "120"),
            ("SUMMARIZER_MIN_LENGTH", "20"),
            ("SUMMARIZER_MAX_BODY_BYTES", "1048576"),
            ("SUMMARIZER_PRELOAD", "off"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind.port(), 9000);
        assert_eq!(cfg.model_dir, Some(PathBuf::from("models/t5")));
        assert_eq!(cfg.model_label(), "models/t5");
        assert_eq!(cfg.cache_dir, PathBuf::from("/var/cache/models"));
        assert_eq!(cfg.generation.max_length, 120);
        assert_eq!(cfg.generation.min_length, 20);
        assert_eq!(cfg.max_body_bytes, 1_048_576);
        assert!(!cfg.preload);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[("SUMMARIZER_MODEL", "  ")])).unwrap();
        assert_eq!(cfg.model_id, DEFAULT_MODEL_ID);
    }

    #[test]
    fn rejects_min_above_max() {
        let err = AppConfig::from_lookup(lookup(&[
            ("SUMMARIZER_MAX_LENGTH", "50"),
            ("SUMMARIZER_MIN_LENGTH", "80"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(AppConfig::from_lookup(lookup(&[("SUMMARIZER_MAX_LENGTH", "lots")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SUMMARIZER_MAX_LENGTH", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SUMMARIZER_PRELOAD", "maybe")])).is_err());
    }
}
