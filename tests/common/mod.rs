#![allow(dead_code)]

use async_trait::async_trait;
use image::RgbImage;
use sora_scenes::api::{
    ContentVariant, GenerationRequest, JobStatus, ServiceError, VideoJob, VideoService,
};
use sora_scenes::chain::PipelineConfig;
use sora_scenes::reference::ReferenceAsset;
use sora_scenes::wait::WaitPolicy;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub enum Step {
    Job {
        status: JobStatus,
        progress: u8,
        error: Option<String>,
    },
    Fault,
}

/// Status sequence for one submission: the first step answers `submit`,
/// each later step answers one `poll`. The last step repeats.
#[derive(Debug, Clone)]
pub struct Script(pub Vec<Step>);

fn step(status: JobStatus, progress: u8) -> Step {
    Step::Job {
        status,
        progress,
        error: None,
    }
}

impl Script {
    pub fn completes(progress: &[u8]) -> Self {
        let mut steps = vec![step(JobStatus::Queued, 0)];
        steps.extend(progress.iter().map(|p| step(JobStatus::InProgress, *p)));
        steps.push(step(JobStatus::Completed, 100));
        Script(steps)
    }

    pub fn fails(message: Option<&str>) -> Self {
        Script(vec![
            step(JobStatus::Queued, 0),
            step(JobStatus::InProgress, 30),
            Step::Job {
                status: JobStatus::Failed,
                progress: 30,
                error: message.map(String::from),
            },
        ])
    }

    pub fn never_finishes() -> Self {
        Script(vec![step(JobStatus::Queued, 0), step(JobStatus::InProgress, 5)])
    }

    /// One failed status check between queued and completed.
    pub fn completes_after_fault() -> Self {
        Script(vec![
            step(JobStatus::Queued, 0),
            Step::Fault,
            step(JobStatus::InProgress, 60),
            step(JobStatus::Completed, 100),
        ])
    }

    pub fn faults_on_first_poll() -> Self {
        Script(vec![step(JobStatus::Queued, 0), Step::Fault])
    }
}

#[derive(Debug, Clone)]
pub struct SeenReference {
    pub source: PathBuf,
    pub upload_path: PathBuf,
    pub dimensions: (u32, u32),
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: String,
    pub request: GenerationRequest,
    pub reference: Option<SeenReference>,
    pub at: Instant,
}

#[derive(Default)]
struct State {
    scripts: VecDeque<Script>,
    pending: HashMap<String, VecDeque<Step>>,
    last: HashMap<String, Step>,
    submissions: Vec<Submission>,
    polls: HashMap<String, usize>,
    downloads: Vec<(String, ContentVariant)>,
}

/// In-memory `VideoService` that replays one script per submission.
#[derive(Default)]
pub struct ScriptedService {
    state: Mutex<State>,
}

impl ScriptedService {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        let svc = Self::default();
        svc.state.lock().unwrap().scripts = scripts.into_iter().collect();
        svc
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn polls(&self, job_id: &str) -> usize {
        self.state.lock().unwrap().polls.get(job_id).copied().unwrap_or(0)
    }

    pub fn downloads(&self) -> Vec<(String, ContentVariant)> {
        self.state.lock().unwrap().downloads.clone()
    }

    fn answer(job_id: &str, step: Step) -> Result<VideoJob, ServiceError> {
        match step {
            Step::Job {
                status,
                progress,
                error,
            } => Ok(VideoJob {
                id: job_id.to_string(),
                status,
                progress,
                error,
            }),
            Step::Fault => Err(ServiceError::Api {
                status: 500,
                body: "upstream exploded".into(),
            }),
        }
    }
}

pub fn content_for(job_id: &str) -> Vec<u8> {
    format!("fake-mp4:{job_id}").into_bytes()
}

#[async_trait]
impl VideoService for ScriptedService {
    async fn submit(
        &self,
        request: &GenerationRequest,
        reference: Option<&ReferenceAsset>,
    ) -> Result<VideoJob, ServiceError> {
        let seen = reference.map(|asset| SeenReference {
            source: asset.source().to_path_buf(),
            upload_path: asset.path().to_path_buf(),
            dimensions: image::image_dimensions(asset.path()).expect("prepared reference readable"),
        });

        let mut state = self.state.lock().unwrap();
        let job_id = format!("video_{}", state.submissions.len() + 1);
        let mut steps: VecDeque<Step> = state
            .scripts
            .pop_front()
            .expect("a script for every submission")
            .0
            .into();
        let first = steps.pop_front().expect("non-empty script");
        state.last.insert(job_id.clone(), first.clone());
        state.pending.insert(job_id.clone(), steps);
        state.submissions.push(Submission {
            job_id: job_id.clone(),
            request: request.clone(),
            reference: seen,
            at: Instant::now(),
        });
        drop(state);

        Self::answer(&job_id, first)
    }

    async fn poll(&self, job_id: &str) -> Result<VideoJob, ServiceError> {
        let mut state = self.state.lock().unwrap();
        *state.polls.entry(job_id.to_string()).or_default() += 1;
        let next = state.pending.get_mut(job_id).and_then(VecDeque::pop_front);
        let step = match next {
            Some(step) => {
                state.last.insert(job_id.to_string(), step.clone());
                step
            }
            None => state.last.get(job_id).cloned().expect("known job"),
        };
        drop(state);

        Self::answer(job_id, step)
    }

    async fn fetch_content(
        &self,
        job_id: &str,
        variant: ContentVariant,
    ) -> Result<Vec<u8>, ServiceError> {
        self.state
            .lock()
            .unwrap()
            .downloads
            .push((job_id.to_string(), variant));
        Ok(content_for(job_id))
    }
}

pub fn write_frame(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(width, height, image::Rgb([12, 80, 160]))
        .save(path)
        .unwrap();
}

pub fn pipeline_config(root: &Path) -> PipelineConfig {
    let scratch = root.join("scratch");
    std::fs::create_dir_all(&scratch).unwrap();
    PipelineConfig {
        output_dir: root.join("out"),
        scratch_dir: Some(scratch),
        default_model: "sora-2".into(),
        job_poll: WaitPolicy::every(Duration::from_secs(2)),
        reference_wait: WaitPolicy::every(Duration::from_secs(3)),
        skip_existing: true,
        show_progress: false,
    }
}
