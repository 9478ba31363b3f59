use crate::api::openai::OpenAiVideos;
use crate::chain::{ChainOrchestrator, ChainReport};
use crate::config::{API_KEY_ENV, Config};
use crate::scene::SceneList;
use crate::{init, logblank, logi, logok, logw};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Command-line overrides applied on top of `config.json`.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub config_path: Option<PathBuf>,
    pub scenes_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub api_key: Option<String>,
    pub job_timeout_secs: Option<u64>,
    pub reference_timeout_secs: Option<u64>,
    pub force: bool,
    pub no_progress: bool,
}

const DEFAULT_CONFIG: &str = "config.json";

impl Settings {
    /// Resolve the effective configuration.
    pub async fn resolve(&self) -> Result<Config> {
        let mut cfg = match &self.config_path {
            Some(path) => Config::load(path).await?,
            None => Config::load_or_default(DEFAULT_CONFIG).await?,
        };

        if let Some(key) = &self.api_key {
            if !key.trim().is_empty() {
                cfg.openai_key = key.clone();
            }
        }
        cfg.apply_key_fallback(std::env::var(API_KEY_ENV).ok());
        if let Some(path) = &self.scenes_path {
            cfg.scenes_file = path.clone();
        }
        if let Some(dir) = &self.output_dir {
            cfg.output_dir = dir.clone();
        }
        if self.job_timeout_secs.is_some() {
            cfg.job_timeout_secs = self.job_timeout_secs;
        }
        if self.reference_timeout_secs.is_some() {
            cfg.reference_timeout_secs = self.reference_timeout_secs;
        }
        if self.force {
            cfg.skip_existing = false;
        }
        if self.no_progress {
            cfg.show_progress = false;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

pub async fn run_generation(settings: Settings, cancel: CancellationToken) -> Result<ChainReport> {
    let cfg = settings.resolve().await?;
    let scenes = SceneList::load(&cfg.scenes_file).await?;
    if scenes.is_empty() {
        logw(format!("No scenes in {}", cfg.scenes_file.display()));
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.request_timeout_secs))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;
    let service = OpenAiVideos::new(client, cfg.api_base.clone(), cfg.openai_key.clone());

    let pipeline = cfg.pipeline();
    init::ensure_directories(&pipeline).await?;

    let orchestrator = ChainOrchestrator::new(service, pipeline).with_cancellation(cancel);
    let report = orchestrator.run(&scenes.items).await?;
    print_manifest(&report);
    Ok(report)
}

pub fn print_manifest(report: &ChainReport) {
    logblank();
    if report.cancelled {
        logw("Run cancelled.");
    } else {
        logi("All scenes complete.");
    }
    logok(format!(
        "Generated: {}  Skipped: {}",
        report.completed().count(),
        report.skipped().count()
    ));
    logi("Generated video files:");
    for line in report.manifest_lines() {
        logi(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cli_overrides_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("config.json");
        std::fs::write(
            &cfg_path,
            r#"{"openai_api_key":"sk-file","output_dir":"from_file","skip_existing":true}"#,
        )
        .unwrap();

        let settings = Settings {
            config_path: Some(cfg_path),
            output_dir: Some(dir.path().join("from_cli")),
            api_key: Some("sk-cli".into()),
            reference_timeout_secs: Some(90),
            force: true,
            no_progress: true,
            ..Default::default()
        };
        let cfg = settings.resolve().await.unwrap();

        assert_eq!(cfg.openai_key, "sk-cli");
        assert_eq!(cfg.output_dir, dir.path().join("from_cli"));
        assert_eq!(cfg.reference_timeout_secs, Some(90));
        assert!(!cfg.skip_existing);
        assert!(!cfg.show_progress);
    }

    #[tokio::test]
    async fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            config_path: Some(dir.path().join("absent.json")),
            api_key: Some("k".into()),
            ..Default::default()
        };
        assert!(settings.resolve().await.is_err());
    }
}
