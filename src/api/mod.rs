//! Contract with the remote video generation service.

pub mod openai;

use crate::reference::ReferenceAsset;
use crate::resolution::Resolution;
use crate::scene::SceneSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle of a generation job as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            JobStatus::Queued | JobStatus::InProgress => false,
            JobStatus::Completed | JobStatus::Failed => true,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::InProgress => "Processing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }
}

/// Snapshot of a job returned by `submit` and `poll`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    pub id: String,
    pub status: JobStatus,
    /// Percentage in `0..=100`.
    pub progress: u8,
    pub error: Option<String>,
}

impl VideoJob {
    pub fn failure_message(&self) -> &str {
        self.error.as_deref().unwrap_or(DEFAULT_FAILURE_MESSAGE)
    }
}

pub const DEFAULT_FAILURE_MESSAGE: &str = "Video generation failed";

/// Clamp a service-reported progress value into `0..=100`.
pub fn bounded_progress(raw: Option<f64>) -> u8 {
    match raw {
        Some(p) if p.is_finite() => p.clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

/// The parameters the service accepts for one clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub seconds: u32,
    pub size: String,
    pub prompt: String,
}

impl GenerationRequest {
    /// Build a request from a scene, leaving out the orchestration-only
    /// fields (reference requirement, predecessor markers, name).
    ///
    /// A size that parses is sent in canonical `WxH` form; anything else is
    /// passed through for the service to judge.
    pub fn for_scene(scene: &SceneSpec, default_model: &str) -> Self {
        Self {
            model: scene
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            seconds: scene.seconds,
            size: scene
                .size
                .parse::<Resolution>()
                .map(|r| r.to_string())
                .unwrap_or_else(|_| scene.size.clone()),
            prompt: scene.prompt.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentVariant {
    Video,
    Thumbnail,
    Spritesheet,
}

impl ContentVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentVariant::Video => "video",
            ContentVariant::Thumbnail => "thumbnail",
            ContentVariant::Spritesheet => "spritesheet",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("video API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("malformed {what} response: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read reference upload {path}: {source}")]
    Reference {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServiceError {
    /// Worth another attempt: transport failures, rate limiting and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Request(_) => true,
            ServiceError::Api { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Decode { .. } | ServiceError::Reference { .. } => false,
        }
    }
}

/// Job-based video generation backend.
#[async_trait]
pub trait VideoService: Send + Sync {
    async fn submit(
        &self,
        request: &GenerationRequest,
        reference: Option<&ReferenceAsset>,
    ) -> Result<VideoJob, ServiceError>;

    async fn poll(&self, job_id: &str) -> Result<VideoJob, ServiceError>;

    async fn fetch_content(
        &self,
        job_id: &str,
        variant: ContentVariant,
    ) -> Result<Vec<u8>, ServiceError>;
}

#[async_trait]
impl<S: VideoService + ?Sized> VideoService for std::sync::Arc<S> {
    async fn submit(
        &self,
        request: &GenerationRequest,
        reference: Option<&ReferenceAsset>,
    ) -> Result<VideoJob, ServiceError> {
        (**self).submit(request, reference).await
    }

    async fn poll(&self, job_id: &str) -> Result<VideoJob, ServiceError> {
        (**self).poll(job_id).await
    }

    async fn fetch_content(
        &self,
        job_id: &str,
        variant: ContentVariant,
    ) -> Result<Vec<u8>, ServiceError> {
        (**self).fetch_content(job_id, variant).await
    }
}
