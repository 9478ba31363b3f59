//! Ordered scene chain.
//!
//! Scenes run strictly one after another. A scene that declares a
//! reference requirement is held until the operator has produced that
//! file from the previous clip; nothing is submitted before then.

use crate::api::VideoService;
use crate::reference;
use crate::runner::{JobOutcome, JobRunner};
use crate::scene::SceneSpec;
use crate::wait::{self, WaitOutcome, WaitPolicy};
use crate::{logblank, logi, logok, logw};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Everything the orchestrator needs besides the service client.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub scratch_dir: Option<PathBuf>,
    pub default_model: String,
    pub job_poll: WaitPolicy,
    pub reference_wait: WaitPolicy,
    pub skip_existing: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    WaitingForReference,
    Ready,
    Running,
    Done,
    Skipped,
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SceneState::WaitingForReference => "WAITING_FOR_REFERENCE",
            SceneState::Ready => "READY",
            SceneState::Running => "RUNNING",
            SceneState::Done => "DONE",
            SceneState::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SceneReport {
    pub index: usize,
    pub name: String,
    /// Where the clip is (or would have been) written.
    pub output: PathBuf,
    pub state: SceneState,
    pub job_id: Option<String>,
    pub used_reference: bool,
    pub detail: Option<String>,
    pub finished_at: DateTime<Local>,
}

/// Instruction for the operator to unblock the next scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub from_scene: String,
    pub to_scene: String,
    pub source_video: PathBuf,
    pub source_available: bool,
    pub target: PathBuf,
    pub instructions: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChainReport {
    pub scenes: Vec<SceneReport>,
    pub handoffs: Vec<Handoff>,
    pub cancelled: bool,
}

impl ChainReport {
    pub fn completed(&self) -> impl Iterator<Item = &SceneReport> {
        self.scenes.iter().filter(|s| s.state == SceneState::Done)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SceneReport> {
        self.scenes.iter().filter(|s| s.state == SceneState::Skipped)
    }

    pub fn manifest_lines(&self) -> Vec<String> {
        self.scenes
            .iter()
            .map(|s| {
                let mut line = format!(
                    " - {} [{}] {}",
                    s.output.display(),
                    s.state,
                    s.finished_at.format("%H:%M:%S")
                );
                if let Some(job) = &s.job_id {
                    line.push_str(&format!(" job={}", job));
                }
                if let Some(detail) = &s.detail {
                    line.push_str(&format!(" ({})", detail));
                }
                line
            })
            .collect()
    }
}

pub struct ChainOrchestrator<S> {
    service: S,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl<S: VideoService> ChainOrchestrator<S> {
    pub fn new(service: S, config: PipelineConfig) -> Self {
        Self {
            service,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn output_path(&self, scene: &SceneSpec) -> PathBuf {
        self.config.output_dir.join(scene.output_file_name())
    }

    /// Run every scene once, in order.
    ///
    /// Failed or timed-out jobs skip their scene and the chain moves on.
    /// Service faults and write failures abort the run.
    pub async fn run(&self, scenes: &[SceneSpec]) -> Result<ChainReport> {
        let mut report = ChainReport::default();
        logi(format!(
            "Starting batch generation for {} scenes -> {}",
            scenes.len(),
            self.config.output_dir.display()
        ));

        for (index, scene) in scenes.iter().enumerate() {
            logblank();
            logi(format!(
                "=== Generating scene {}/{}: {} ===",
                index + 1,
                scenes.len(),
                scene.name
            ));

            let scene_report = match self.run_scene(index, scene).await {
                Ok(r) => r,
                Err(err) => {
                    self.log_partial(&report);
                    return Err(err);
                }
            };
            if scene_report.state == SceneState::Skipped {
                logw(format!(
                    "Scene {} skipped: {}",
                    scene_report.name,
                    scene_report.detail.as_deref().unwrap_or("no output")
                ));
            }
            report.scenes.push(scene_report);

            if self.cancel.is_cancelled() {
                report.cancelled = true;
                logw("Run cancelled; remaining scenes were not attempted.");
                break;
            }

            if let Some(next) = scenes.get(index + 1) {
                if let Some(handoff) = self.handoff(scene, next).await {
                    announce_handoff(&handoff);
                    report.handoffs.push(handoff);
                }
            }
        }

        Ok(report)
    }

    async fn run_scene(&self, index: usize, scene: &SceneSpec) -> Result<SceneReport> {
        let output = self.output_path(scene);
        let mut report = SceneReport {
            index,
            name: scene.name.clone(),
            output: output.clone(),
            state: SceneState::Ready,
            job_id: None,
            used_reference: false,
            detail: None,
            finished_at: Local::now(),
        };

        if self.config.skip_existing && wait::file_exists(&output).await {
            if wait::file_has_content(&output).await {
                logi(format!("Skipping {} (already in {})", scene.name, self.config.output_dir.display()));
                report.detail = Some("already generated".to_string());
                transition(&mut report, SceneState::Done);
                return Ok(report);
            }
            logw(format!("Existing {} is empty; regenerating it", output.display()));
        }

        if let Some(req) = &scene.reference {
            if !wait::file_exists(&req.path).await {
                transition(&mut report, SceneState::WaitingForReference);
                logw(format!(
                    "Waiting for reference frame {} before scene {}",
                    req.path.display(),
                    scene.name
                ));
                if !req.instructions.is_empty() {
                    logi(format!("  -> {}", req.instructions));
                }

                match wait::wait_for_file(&req.path, &self.config.reference_wait, &self.cancel).await {
                    WaitOutcome::Ready => {
                        logok(format!("Reference frame found: {}", req.path.display()));
                    }
                    WaitOutcome::TimedOut(waited) => {
                        logw(format!(
                            "Reference {} did not appear within {}s; skipping {}",
                            req.path.display(),
                            waited.as_secs(),
                            scene.name
                        ));
                        report.detail = Some("reference frame never appeared".to_string());
                        transition(&mut report, SceneState::Skipped);
                        return Ok(report);
                    }
                    WaitOutcome::Cancelled => {
                        report.detail = Some(CANCELLED.to_string());
                        transition(&mut report, SceneState::Skipped);
                        return Ok(report);
                    }
                }
                transition(&mut report, SceneState::Ready);
            }
        }

        let asset = match &scene.reference {
            Some(req) => {
                match reference::prepare(&req.path, &scene.size, self.config.scratch_dir.as_deref()).await {
                    Ok(asset) => Some(asset),
                    Err(err) => {
                        logw(format!("Reference preparation failed ({}); submitting without it", err));
                        None
                    }
                }
            }
            None => None,
        };
        report.used_reference = asset.is_some();

        transition(&mut report, SceneState::Running);
        let runner = JobRunner::new(&self.service, &self.config.default_model, self.config.job_poll)
            .show_progress(self.config.show_progress)
            .with_cancellation(self.cancel.clone());
        let outcome = runner
            .run(scene, &output, asset)
            .await
            .with_context(|| format!("scene {} ({})", index + 1, scene.name))?;

        report.job_id = Some(outcome.job_id().to_string());
        match outcome {
            JobOutcome::Completed { .. } => {
                transition(&mut report, SceneState::Done);
            }
            JobOutcome::Failed { message, .. } => {
                report.detail = Some(message);
                transition(&mut report, SceneState::Skipped);
            }
            JobOutcome::TimedOut { waited, .. } => {
                report.detail = Some(format!("job timed out after {}s", waited.as_secs()));
                transition(&mut report, SceneState::Skipped);
            }
            JobOutcome::Cancelled { .. } => {
                report.detail = Some(CANCELLED.to_string());
                transition(&mut report, SceneState::Skipped);
            }
        }
        Ok(report)
    }

    async fn handoff(&self, current: &SceneSpec, next: &SceneSpec) -> Option<Handoff> {
        let req = next.reference.as_ref()?;
        let source_video = self.output_path(current);
        Some(Handoff {
            from_scene: current.name.clone(),
            to_scene: next.name.clone(),
            source_available: wait::file_has_content(&source_video).await,
            source_video,
            target: req.path.clone(),
            instructions: req.instructions.clone(),
        })
    }

    fn log_partial(&self, report: &ChainReport) {
        logw(format!(
            "Run aborted after {} scene(s); files produced so far remain valid:",
            report.scenes.len()
        ));
        for line in report.manifest_lines() {
            logw(line);
        }
    }
}

const CANCELLED: &str = "cancelled";

fn transition(report: &mut SceneReport, next: SceneState) {
    tracing::debug!(scene = %report.name, from = %report.state, to = %next, "scene state");
    report.state = next;
    report.finished_at = Local::now();
}

fn announce_handoff(handoff: &Handoff) {
    if handoff.source_available {
        logi(format!(
            "NEXT: extract a still from {} and save it as {} (needed by {})",
            handoff.source_video.display(),
            handoff.target.display(),
            handoff.to_scene
        ));
    } else {
        logw(format!(
            "NEXT: {} produced no clip, but {} still needs {}; supply that frame manually",
            handoff.from_scene,
            handoff.to_scene,
            handoff.target.display()
        ));
    }
    if !handoff.instructions.is_empty() {
        logi(format!("      {}", handoff.instructions));
    }
}
