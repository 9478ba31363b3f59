//! Single job lifecycle: submit, poll to a terminal state, download.

use crate::api::{ContentVariant, GenerationRequest, JobStatus, ServiceError, VideoJob, VideoService};
use crate::reference::ReferenceAsset;
use crate::scene::SceneSpec;
use crate::wait::{WaitPolicy, pause};
use crate::{BarScope, logi, logok, logw};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const BAR_WIDTH: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { job_id: String, path: PathBuf },
    Failed { job_id: String, message: String },
    TimedOut { job_id: String, waited: Duration },
    Cancelled { job_id: String },
}

impl JobOutcome {
    pub fn output(&self) -> Option<&Path> {
        match self {
            JobOutcome::Completed { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            JobOutcome::Completed { job_id, .. }
            | JobOutcome::Failed { job_id, .. }
            | JobOutcome::TimedOut { job_id, .. }
            | JobOutcome::Cancelled { job_id } => job_id,
        }
    }
}

pub struct JobRunner<'a, S: ?Sized> {
    service: &'a S,
    default_model: &'a str,
    poll: WaitPolicy,
    show_progress: bool,
    cancel: CancellationToken,
}

impl<'a, S: VideoService + ?Sized> JobRunner<'a, S> {
    pub fn new(service: &'a S, default_model: &'a str, poll: WaitPolicy) -> Self {
        Self {
            service,
            default_model,
            poll,
            show_progress: true,
            cancel: CancellationToken::new(),
        }
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Generate `scene` and write the clip to `output`.
    ///
    /// `reference` is released as soon as the submission returns, whether
    /// it succeeded or not.
    pub async fn run(
        &self,
        scene: &SceneSpec,
        output: &Path,
        reference: Option<ReferenceAsset>,
    ) -> Result<JobOutcome, RunError> {
        let request = GenerationRequest::for_scene(scene, self.default_model);
        if let Some(asset) = &reference {
            logi(format!(
                "Attaching reference {} ({}x{})",
                asset.source().display(),
                asset.width(),
                asset.height()
            ));
        }

        let submitted = self.service.submit(&request, reference.as_ref()).await;
        drop(reference);
        let job = submitted?;
        logi(format!("Video generation started: {} ({})", job.id, job.status.label()));

        let bar = self.progress_bar();
        let scope = BarScope::enter(&bar);
        let job = self.poll_until_terminal(job, &bar).await;
        drop(scope);
        bar.finish_and_clear();
        match job? {
            PollEnd::Failed(job) => {
                let message = job.failure_message().to_string();
                logw(format!("Job {} failed: {}", job.id, message));
                Ok(JobOutcome::Failed {
                    job_id: job.id,
                    message,
                })
            }
            PollEnd::Completed(job) => {
                logok(format!("Video generation completed: {}", job.id));
                logi("Downloading video content...");
                let bytes = self
                    .service
                    .fetch_content(&job.id, ContentVariant::Video)
                    .await?;
                write_output(output, &bytes).await?;
                logok(format!("Wrote {} ({} bytes)", output.display(), bytes.len()));
                Ok(JobOutcome::Completed {
                    job_id: job.id,
                    path: output.to_path_buf(),
                })
            }
            PollEnd::TimedOut { job_id, waited } => {
                logw(format!(
                    "Job {} still not finished after {}s; giving up on it",
                    job_id,
                    waited.as_secs()
                ));
                Ok(JobOutcome::TimedOut { job_id, waited })
            }
            PollEnd::Cancelled { job_id } => {
                logw(format!("Cancelled while waiting for job {}", job_id));
                Ok(JobOutcome::Cancelled { job_id })
            }
        }
    }

    async fn poll_until_terminal(
        &self,
        mut job: VideoJob,
        bar: &ProgressBar,
    ) -> Result<PollEnd, ServiceError> {
        let start = Instant::now();
        let deadline = self.poll.deadline_from(start);
        let mut shown = 0u8;
        let mut failures = 0u32;
        render(bar, &job, &mut shown);

        loop {
            match job.status {
                JobStatus::Completed => return Ok(PollEnd::Completed(job)),
                JobStatus::Failed => return Ok(PollEnd::Failed(job)),
                JobStatus::Queued | JobStatus::InProgress => {}
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(PollEnd::TimedOut {
                        job_id: job.id,
                        waited: start.elapsed(),
                    });
                }
            }
            if !pause(self.poll.interval, &self.cancel).await {
                return Ok(PollEnd::Cancelled { job_id: job.id });
            }

            match self.service.poll(&job.id).await {
                Ok(next) => {
                    failures = 0;
                    job = next;
                }
                Err(err) if err.is_transient() && failures < self.poll.max_retries => {
                    failures += 1;
                    logw(format!(
                        "Status check for {} failed ({}); retry {}/{}",
                        job.id, err, failures, self.poll.max_retries
                    ));
                    continue;
                }
                Err(err) => return Err(err),
            }
            tracing::debug!(
                job = %job.id,
                status = ?job.status,
                progress = job.progress,
                "polled video job"
            );
            render(bar, &job, &mut shown);
        }
    }

    fn progress_bar(&self) -> ProgressBar {
        let bar = ProgressBar::with_draw_target(Some(100), self.draw_target());
        let style = ProgressStyle::default_bar()
            .template(&format!("{{msg}}: [{{bar:{BAR_WIDTH}}}] {{pos:>3}}%"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("==-");
        bar.set_style(style);
        bar
    }

    fn draw_target(&self) -> ProgressDrawTarget {
        if self.show_progress {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        }
    }
}

enum PollEnd {
    Completed(VideoJob),
    Failed(VideoJob),
    TimedOut { job_id: String, waited: Duration },
    Cancelled { job_id: String },
}

/// Update the bar in place; the displayed value never moves backwards.
fn render(bar: &ProgressBar, job: &VideoJob, shown: &mut u8) {
    *shown = next_shown(*shown, job.progress);
    bar.set_message(job.status.label());
    bar.set_position(u64::from(*shown));
}

fn next_shown(shown: u8, reported: u8) -> u8 {
    shown.max(reported.min(100))
}

/// Write into a sibling temp file, then rename it over `path`. An
/// interrupted write never leaves a partial clip under the final name.
async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), RunError> {
    let write_err = |source: std::io::Error| RunError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).await.map_err(write_err)?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    let partial = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".mp4")
        .tempfile_in(&dir)
        .map_err(write_err)?
        .into_temp_path();
    fs::write(&partial, bytes).await.map_err(write_err)?;
    partial.persist(path).map_err(|e| write_err(e.error))
}
