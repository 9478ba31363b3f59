use crate::api::openai::DEFAULT_API_BASE;
use crate::chain::PipelineConfig;
use crate::wait::WaitPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "openai_api_key")]
    pub openai_key: String,
    pub api_base: String,
    pub model: String,
    pub output_dir: PathBuf,
    pub scenes_file: PathBuf,
    pub scratch_dir: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub job_timeout_secs: Option<u64>,
    pub poll_retries: u32,
    pub reference_poll_interval_secs: u64,
    pub reference_timeout_secs: Option<u64>,
    pub request_timeout_secs: u64,
    pub skip_existing: bool,
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_key: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: "sora-2".to_string(),
            output_dir: PathBuf::from("sora_scenes"),
            scenes_file: PathBuf::from("scenes.json"),
            scratch_dir: None,
            poll_interval_secs: 2,
            job_timeout_secs: None,
            poll_retries: 3,
            reference_poll_interval_secs: 3,
            reference_timeout_secs: None,
            request_timeout_secs: 300,
            skip_existing: true,
            show_progress: true,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse config JSON")
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid config: {}", path.as_ref().display()))
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if fs::metadata(&path).await.is_err() {
            return Ok(Self::default());
        }
        Self::load(path).await
    }

    /// Fill an empty API key from `value` (typically the environment).
    pub fn apply_key_fallback(&mut self, value: Option<String>) {
        if self.openai_key.trim().is_empty() {
            if let Some(key) = value.filter(|k| !k.trim().is_empty()) {
                self.openai_key = key;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.openai_key.trim().is_empty() {
            anyhow::bail!("config.json: openai_api_key missing (or set {})", API_KEY_ENV);
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("config.json: poll_interval_secs must be positive");
        }
        if self.reference_poll_interval_secs == 0 {
            anyhow::bail!("config.json: reference_poll_interval_secs must be positive");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("config.json: model missing");
        }
        Ok(())
    }

    pub fn job_poll(&self) -> WaitPolicy {
        WaitPolicy::every(Duration::from_secs(self.poll_interval_secs))
            .with_deadline(self.job_timeout_secs.map(Duration::from_secs))
            .with_retries(self.poll_retries)
    }

    pub fn reference_wait(&self) -> WaitPolicy {
        WaitPolicy::every(Duration::from_secs(self.reference_poll_interval_secs))
            .with_deadline(self.reference_timeout_secs.map(Duration::from_secs))
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            output_dir: self.output_dir.clone(),
            scratch_dir: self.scratch_dir.clone(),
            default_model: self.model.clone(),
            job_poll: self.job_poll(),
            reference_wait: self.reference_wait(),
            skip_existing: self.skip_existing,
            show_progress: self.show_progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.model, "sora-2");
        assert_eq!(cfg.poll_interval_secs, 2);
        assert_eq!(cfg.reference_poll_interval_secs, 3);
        assert_eq!(
            cfg.job_poll(),
            WaitPolicy::every(Duration::from_secs(2)).with_retries(3)
        );
        assert_eq!(cfg.reference_wait().max_retries, 0);
        assert_eq!(cfg.reference_wait().max_wait, None);
        assert!(cfg.skip_existing);
    }

    #[test]
    fn timeouts_become_deadlines() {
        let cfg = Config::from_json(
            r#"{"openai_api_key":"k","job_timeout_secs":600,"reference_timeout_secs":3600}"#,
        )
        .unwrap();
        assert_eq!(cfg.job_poll().max_wait, Some(Duration::from_secs(600)));
        assert_eq!(cfg.reference_wait().max_wait, Some(Duration::from_secs(3600)));
        assert_eq!(cfg.pipeline().reference_wait.interval, Duration::from_secs(3));
    }

    #[test]
    fn poll_retries_are_configurable() {
        let cfg = Config::from_json(r#"{"poll_retries":0}"#).unwrap();
        assert_eq!(cfg.job_poll().max_retries, 0);
        let cfg = Config::from_json(r#"{"poll_retries":10}"#).unwrap();
        assert_eq!(cfg.pipeline().job_poll.max_retries, 10);
    }

    #[test]
    fn key_falls_back_to_environment_value() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_err());

        cfg.apply_key_fallback(Some("sk-env".into()));
        assert_eq!(cfg.openai_key, "sk-env");
        cfg.validate().unwrap();

        cfg.apply_key_fallback(Some("sk-other".into()));
        assert_eq!(cfg.openai_key, "sk-env");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = Config::from_json(r#"{"openai_api_key":"k","poll_interval_secs":0}"#).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[tokio::test]
    async fn missing_file_gives_defaults_only_via_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        assert!(Config::load(&path).await.is_err());
        let cfg = Config::load_or_default(&path).await.unwrap();
        assert_eq!(cfg.output_dir, PathBuf::from("sora_scenes"));
    }
}
