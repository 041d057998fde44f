use super::{Backend, ChatError, ChatResult, CodeExecution};
use crate::config::{Config, DEFAULT_HEALTH_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::types::Attachment;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TEXT_PATH: &str = "/api/text";
const IMAGE_PATH: &str = "/api/image";
const VISION_PATH: &str = "/api/vision";
const EXECUTE_PATH: &str = "/api/execute-code";
const HEALTH_PATH: &str = "/api/health";

/// reqwest client for the gateway endpoints under one base URL.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    health_timeout: Duration,
    request_timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_url.clone())
            .with_health_timeout(config.health_timeout)
            .with_request_timeout(config.request_timeout)
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Bounds every flow call. A stalled gateway surfaces as a transport error.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> ChatResult<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path);
        tracing::debug!(%url, "gateway request");
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> ChatResult<R> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ChatError::Status { status, body });
    }
    Ok(serde_json::from_str(&body)?)
}

#[derive(Serialize)]
struct TextRequest<'a> {
    messages: [&'a str; 1],
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    image: Option<String>,
}

#[derive(Deserialize)]
struct VisionResponse {
    result: String,
}

#[async_trait]
impl Backend for HttpBackend {
    async fn send_text(&self, message: &str) -> ChatResult<String> {
        let response: TextResponse = self
            .post_json(TEXT_PATH, &TextRequest {
                messages: [message],
            })
            .await?;
        Ok(response.text)
    }

    async fn generate_image(&self, prompt: &str) -> ChatResult<String> {
        let response: ImageResponse = self
            .post_json(IMAGE_PATH, &PromptRequest { prompt })
            .await?;
        match response.image {
            Some(image) if !image.trim().is_empty() => Ok(image),
            _ => Err(ChatError::EmptyPayload("image")),
        }
    }

    async fn analyze_image(
        &self,
        file: &Attachment,
        question: Option<&str>,
    ) -> ChatResult<String> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)?;
        let mut form = Form::new().part("file", part);
        if let Some(question) = question {
            form = form.text("question", question.to_string());
        }

        let url = self.endpoint(VISION_PATH);
        tracing::debug!(%url, file = %file.file_name, "gateway upload");
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        let parsed: VisionResponse = decode(response).await?;
        Ok(parsed.result)
    }

    async fn execute_code(&self, prompt: &str) -> ChatResult<CodeExecution> {
        self.post_json(EXECUTE_PATH, &PromptRequest { prompt })
            .await
    }

    async fn health(&self) -> ChatResult<()> {
        let response = self
            .client
            .get(self.endpoint(HEALTH_PATH))
            .timeout(self.health_timeout)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ChatError::Status { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slashes_from_base_url() {
        let backend = HttpBackend::new("http://localhost:8000//");
        assert_eq!(backend.base_url(), "http://localhost:8000");
        assert_eq!(
            backend.endpoint(EXECUTE_PATH),
            "http://localhost:8000/api/execute-code"
        );
    }

    #[test]
    fn text_request_wraps_message_in_array() {
        let body = serde_json::to_value(TextRequest {
            messages: ["hi"],
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "messages": ["hi"] }));
    }

    #[test]
    fn code_execution_tolerates_missing_fields() {
        let parsed: CodeExecution = serde_json::from_str(r#"{"code":"print(2)"}"#).unwrap();
        assert_eq!(parsed.code, "print(2)");
        assert!(parsed.execution_result.is_empty());
    }
}
