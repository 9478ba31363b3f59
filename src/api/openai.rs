use super::{
    ContentVariant, GenerationRequest, ServiceError, VideoJob, VideoService, bounded_progress,
};
use crate::logw;
use crate::reference::ReferenceAsset;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const BODY_SNIPPET_CHARS: usize = 800;

/// `VideoService` backed by the OpenAI `/videos` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiVideos {
    client: Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct VideoObject {
    id: String,
    status: super::JobStatus,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    error: Option<VideoObjectError>,
}

#[derive(Debug, Deserialize)]
struct VideoObjectError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl From<VideoObject> for VideoJob {
    fn from(obj: VideoObject) -> Self {
        let error = obj.error.and_then(|e| {
            e.message
                .filter(|m| !m.trim().is_empty())
                .or(e.code.filter(|c| !c.trim().is_empty()))
        });
        VideoJob {
            id: obj.id,
            status: obj.status,
            progress: bounded_progress(obj.progress),
            error,
        }
    }
}

fn snippet(raw: &str) -> String {
    raw.chars().take(BODY_SNIPPET_CHARS).collect()
}

fn parse_video_object(raw: &str, what: &'static str) -> Result<VideoJob, ServiceError> {
    match serde_json::from_str::<VideoObject>(raw) {
        Ok(obj) => Ok(obj.into()),
        Err(source) => {
            logw(format!("OpenAI {} response parse failed.", what));
            if !raw.is_empty() {
                logw(format!("OpenAI raw body: {}", snippet(raw)));
            }
            Err(ServiceError::Decode { what, source })
        }
    }
}

impl OpenAiVideos {
    pub fn new(client: Client, api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        logw(format!("OpenAI HTTP {}", status.as_u16()));
        if !body.is_empty() {
            logw(format!("OpenAI raw body: {}", snippet(&body)));
        }
        Err(ServiceError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn build_form(
        request: &GenerationRequest,
        reference: Option<&ReferenceAsset>,
    ) -> Result<Form, ServiceError> {
        let mut form = Form::new()
            .text("model", request.model.clone())
            .text("prompt", request.prompt.clone())
            .text("seconds", request.seconds.to_string())
            .text("size", request.size.clone());

        if let Some(asset) = reference {
            let bytes =
                tokio::fs::read(asset.path())
                    .await
                    .map_err(|source| ServiceError::Reference {
                        path: asset.path().to_path_buf(),
                        source,
                    })?;
            let part = Part::bytes(bytes)
                .file_name(asset.file_name())
                .mime_str(asset.mime_type())?;
            form = form.part("input_reference", part);
        }

        Ok(form)
    }
}

#[async_trait]
impl VideoService for OpenAiVideos {
    async fn submit(
        &self,
        request: &GenerationRequest,
        reference: Option<&ReferenceAsset>,
    ) -> Result<VideoJob, ServiceError> {
        let form = Self::build_form(request, reference).await?;
        tracing::debug!(
            model = %request.model,
            seconds = request.seconds,
            size = %request.size,
            with_reference = reference.is_some(),
            "submitting video job"
        );

        let resp = self
            .client
            .post(self.url("/videos"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let raw = Self::ensure_success(resp).await?.text().await?;
        parse_video_object(&raw, "submit")
    }

    async fn poll(&self, job_id: &str) -> Result<VideoJob, ServiceError> {
        let resp = self
            .client
            .get(self.url(&format!("/videos/{}", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let raw = Self::ensure_success(resp).await?.text().await?;
        parse_video_object(&raw, "status")
    }

    async fn fetch_content(
        &self,
        job_id: &str,
        variant: ContentVariant,
    ) -> Result<Vec<u8>, ServiceError> {
        let resp = self
            .client
            .get(self.url(&format!("/videos/{}/content", job_id)))
            .query(&[("variant", variant.as_str())])
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let bytes = Self::ensure_success(resp).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
