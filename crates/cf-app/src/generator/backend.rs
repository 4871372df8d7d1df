mod schemas;

use async_trait::async_trait;
use cf_core::{Endpoint, RequestDocument};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, info};

use crate::config::{Credentials, ServiceConfig};
use crate::error::{JobError, RemoteFailure};
use crate::generator::backend::schemas::{ErrorBody, TaskResponse};

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub job_id: String,
    /// Response body as received, kept for history.
    pub raw_response: String,
}

/// One observation of a remote task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskSnapshot {
    pub task_status: String,
    pub video_url: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub raw: String,
}

/// The remote synthesis service.
#[async_trait]
pub trait VideoService: Send + Sync {
    async fn submit(
        &self,
        credentials: &Credentials,
        endpoint: Endpoint,
        document: &RequestDocument,
    ) -> Result<SubmitReceipt, JobError>;

    async fn fetch_status(
        &self,
        credentials: &Credentials,
        job_id: &str,
    ) -> Result<TaskSnapshot, JobError>;
}

pub struct DashScopeBackend {
    client: Client,
    base_url: Url,
}

impl DashScopeBackend {
    pub fn new(config: &ServiceConfig) -> Result<Self, JobError> {
        let invalid = |reason: String| JobError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason,
        };
        let base_url = Url::parse(&config.base_url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL".into()));
        }

        let client = Client::builder().timeout(config.request_timeout).build()?;

        info!("Using synthesis service at {base_url}");

        Ok(Self { client, base_url })
    }

    /// Base URL with `segments` appended, each percent-encoded as a single segment.
    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl VideoService for DashScopeBackend {
    async fn submit(
        &self,
        credentials: &Credentials,
        endpoint: Endpoint,
        document: &RequestDocument,
    ) -> Result<SubmitReceipt, JobError> {
        let url = self.url(endpoint.path().split('/').filter(|s| !s.is_empty()));
        debug!("POST {url} model={}", document.model);

        let response = self
            .client
            .post(url)
            .bearer_auth(credentials.api_key())
            .header("X-DashScope-Async", "enable")
            .json(document)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !matches!(
            status,
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED
        ) {
            return Err(rejection(status, body));
        }

        let parsed: TaskResponse = parse(&body)?;
        debug!(request_id = ?parsed.request_id, "Submission accepted");
        let task_id = parsed
            .output
            .as_ref()
            .and_then(|o| o.task_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        match task_id {
            Some(job_id) => Ok(SubmitReceipt {
                job_id,
                raw_response: body,
            }),
            None if parsed.code.is_some() => Err(JobError::Rejected(RemoteFailure::classify(
                parsed.code,
                parsed.message,
            ))),
            None => Err(JobError::MalformedResponse {
                reason: "response has no output.task_id".into(),
                body,
            }),
        }
    }

    async fn fetch_status(
        &self,
        credentials: &Credentials,
        job_id: &str,
    ) -> Result<TaskSnapshot, JobError> {
        let url = self.url(["tasks", job_id.trim()]);

        let response = self
            .client
            .get(url)
            .bearer_auth(credentials.api_key())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(rejection(status, body));
        }

        let parsed: TaskResponse = parse(&body)?;
        debug!(job_id, request_id = ?parsed.request_id, "Status fetched");
        let output = parsed.output.unwrap_or_default();

        let Some(task_status) = output.task_status.filter(|s| !s.trim().is_empty()) else {
            return Err(JobError::MalformedResponse {
                reason: "response has no output.task_status".into(),
                body,
            });
        };

        Ok(TaskSnapshot {
            task_status,
            video_url: output.video_url,
            code: parsed.code.or(output.code),
            message: parsed.message.or(output.message),
            raw: body,
        })
    }
}

fn parse<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, JobError> {
    serde_json::from_str(body).map_err(|e| JobError::MalformedResponse {
        reason: e.to_string(),
        body: body.to_string(),
    })
}

fn rejection(status: StatusCode, body: String) -> JobError {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => JobError::Rejected(RemoteFailure::classify(Some(err.code), err.message)),
        Err(_) => JobError::HttpStatus {
            status: status.as_u16(),
            body,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::Json;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use cf_core::{JobForm, VideoModel};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;
    use crate::error::RemoteErrorKind;

    const SUBMIT_PATH: &str = "/services/aigc/video-generation/video-synthesis";

    async fn serve(router: Router) -> DashScopeBackend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        backend_at(format!("http://{addr}"))
    }

    fn backend_at(base_url: String) -> DashScopeBackend {
        DashScopeBackend::new(&ServiceConfig {
            base_url,
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn credentials() -> Credentials {
        Credentials::new("sk-test")
    }

    fn document() -> RequestDocument {
        let form = JobForm::new(VideoModel::TextToVideo, "a kitten in a field");
        cf_core::spec::build(&form).unwrap().document
    }

    #[tokio::test]
    async fn submit_returns_task_id() {
        let router = Router::new().route(
            SUBMIT_PATH,
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .is_some_and(|v| v == "Bearer sk-test");
                let async_mode = headers
                    .get("x-dashscope-async")
                    .is_some_and(|v| v == "enable");
                if !authorized || !async_mode || body["model"] != "wanx2.1-t2v-turbo" {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"code": "InvalidParameter", "message": "bad request"})),
                    );
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "request_id": "r-1",
                        "output": {"task_id": "T123", "task_status": "PENDING"}
                    })),
                )
            }),
        );
        let backend = serve(router).await;

        let receipt = backend
            .submit(&credentials(), Endpoint::VideoGeneration, &document())
            .await
            .unwrap();
        assert_eq!(receipt.job_id, "T123");
        assert!(receipt.raw_response.contains("T123"));
    }

    #[tokio::test]
    async fn submit_without_task_id_is_malformed() {
        let router = Router::new().route(
            SUBMIT_PATH,
            post(|| async { Json(json!({"output": {"task_status": "PENDING"}})) }),
        );
        let backend = serve(router).await;

        let err = backend
            .submit(&credentials(), Endpoint::VideoGeneration, &document())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn structured_rejection_is_classified() {
        let router = Router::new().route(
            SUBMIT_PATH,
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "code": "IPInfringementSuspect",
                        "message": "Input data is suspected of being involved in IP infringement."
                    })),
                )
            }),
        );
        let backend = serve(router).await;

        let err = backend
            .submit(&credentials(), Endpoint::VideoGeneration, &document())
            .await
            .unwrap_err();
        match err {
            JobError::Rejected(failure) => {
                assert_eq!(failure.kind, RemoteErrorKind::IpInfringementSuspect)
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_error_body_keeps_http_status() {
        let router = Router::new().route(
            SUBMIT_PATH,
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
        );
        let backend = serve(router).await;

        let err = backend
            .submit(&credentials(), Endpoint::VideoGeneration, &document())
            .await
            .unwrap_err();
        match err {
            JobError::HttpStatus { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("expected http status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let backend = backend_at("http://127.0.0.1:1".into());

        let err = backend
            .submit(&credentials(), Endpoint::VideoGeneration, &document())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Transport(_)));
    }

    #[tokio::test]
    async fn fetch_status_reads_snapshot() {
        let router = Router::new().route(
            "/tasks/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "request_id": "r-2",
                    "output": {
                        "task_id": id,
                        "task_status": "SUCCEEDED",
                        "video_url": "https://cdn.example.com/v.mp4"
                    }
                }))
            }),
        );
        let backend = serve(router).await;

        let snapshot = backend.fetch_status(&credentials(), "T123").await.unwrap();
        assert_eq!(snapshot.task_status, "SUCCEEDED");
        assert_eq!(
            snapshot.video_url.as_deref(),
            Some("https://cdn.example.com/v.mp4")
        );
        assert!(snapshot.raw.contains("T123"));
    }

    #[tokio::test]
    async fn job_id_stays_one_path_segment() {
        let router = Router::new().route(
            "/api/v1/tasks/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({"output": {"task_id": id, "task_status": "RUNNING"}}))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let backend = backend_at(format!("http://{addr}/api/v1/"));

        let snapshot = backend.fetch_status(&credentials(), "a/b?c=1").await.unwrap();
        assert_eq!(snapshot.task_status, "RUNNING");
        let raw: Value = serde_json::from_str(&snapshot.raw).unwrap();
        assert_eq!(raw["output"]["task_id"], "a/b?c=1");
    }

    #[test]
    fn rejects_unusable_base_url() {
        for base_url in ["not a url", "mailto:ops@example.com"] {
            let err = DashScopeBackend::new(&ServiceConfig {
                base_url: base_url.into(),
                request_timeout: Duration::from_secs(5),
            })
            .err()
            .unwrap();
            assert!(matches!(err, JobError::InvalidBaseUrl { .. }));
        }
    }

    #[tokio::test]
    async fn failed_task_carries_output_error() {
        let router = Router::new().route(
            "/tasks/{id}",
            get(|| async {
                Json(json!({
                    "output": {
                        "task_status": "FAILED",
                        "code": "DataInspectionFailed",
                        "message": "Output data may contain inappropriate content."
                    }
                }))
            }),
        );
        let backend = serve(router).await;

        let snapshot = backend.fetch_status(&credentials(), "T9").await.unwrap();
        assert_eq!(snapshot.task_status, "FAILED");
        assert_eq!(snapshot.code.as_deref(), Some("DataInspectionFailed"));
    }
}
