use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use vigil_common::{
    AiService, ApplyResult, DraftConfig, GpuConfig, GpuDevice, PreviewResult,
    ServiceHealthStatus, Strategy, UpdateConfigResult,
};

use crate::types::{ConfigRepository, RepoError, RepoResult};

/// REST paths of the configuration API, relative to the base URL.
pub mod paths {
    pub const GPUS: &str = "/api/gpus";
    pub const GPUS_DETECT: &str = "/api/gpus/detect";
    pub const SERVICES: &str = "/api/services";
    pub const CONFIG: &str = "/api/gpu-config";
    pub const CONFIG_STATUS: &str = "/api/gpu-config/status";
    pub const CONFIG_APPLY: &str = "/api/gpu-config/apply";
    pub const CONFIG_PREVIEW: &str = "/api/gpu-config/preview";
}

/// `ConfigRepository` over the backend's HTTP API.
///
/// Transport timeouts are configured on the client and surface as
/// `RepoError::Transport`, the same as any other connection failure.
#[derive(Debug, Clone)]
pub struct HttpConfigRepository {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpConfigRepository {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> RepoResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(http, base_url, token))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.as_ref() {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> RepoResult<T> {
        let resp = self.auth(builder).send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> RepoResult<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RepoError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| RepoError::Decode(e.to_string()))
}

/// Pull `error.message` out of a structured error body, else return the body as-is.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("detail"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ConfigRepository for HttpConfigRepository {
    async fn get_gpus(&self) -> RepoResult<Vec<GpuDevice>> {
        self.send(self.http.get(self.url(paths::GPUS))).await
    }

    async fn get_services(&self) -> RepoResult<Vec<AiService>> {
        self.send(self.http.get(self.url(paths::SERVICES))).await
    }

    async fn get_config(&self) -> RepoResult<GpuConfig> {
        self.send(self.http.get(self.url(paths::CONFIG))).await
    }

    async fn get_service_health(&self) -> RepoResult<Vec<ServiceHealthStatus>> {
        self.send(self.http.get(self.url(paths::CONFIG_STATUS))).await
    }

    async fn update_config(&self, draft: &DraftConfig) -> RepoResult<UpdateConfigResult> {
        self.send(self.http.put(self.url(paths::CONFIG)).json(draft))
            .await
    }

    async fn apply_config(&self) -> RepoResult<ApplyResult> {
        self.send(self.http.post(self.url(paths::CONFIG_APPLY))).await
    }

    async fn detect_gpus(&self) -> RepoResult<Vec<GpuDevice>> {
        self.send(self.http.post(self.url(paths::GPUS_DETECT))).await
    }

    async fn preview_strategy(&self, strategy: Strategy) -> RepoResult<PreviewResult> {
        let builder = self
            .http
            .get(self.url(paths::CONFIG_PREVIEW))
            .query(&[("strategy", strategy.as_str())]);
        self.send(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error":{"code":"validation","message":"duplicate service"}}"#),
            "duplicate service"
        );
        assert_eq!(error_message(r#"{"detail":"not found"}"#), "not found");
        assert_eq!(error_message("bad gateway"), "bad gateway");
    }

    #[test]
    fn test_base_url_trimmed() {
        let repo = HttpConfigRepository::with_client(Client::new(), "http://dash:8000/", Some(String::new()));
        assert_eq!(repo.url(paths::CONFIG), "http://dash:8000/api/gpu-config");
        assert!(repo.token.is_none());
    }
}
