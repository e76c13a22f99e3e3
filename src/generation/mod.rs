use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::codec::ImageAsset;
use crate::config::GenerationConfig;

mod transport;
mod wire;

pub use transport::ReqwestTransport;
pub use wire::{
    Candidate, Content, GenerateContentRequest, GenerateContentResponse, InlineData, Part,
};

const DEFAULT_RESULT_MIME_TYPE: &str = "image/png";
const ERROR_BODY_LIMIT: usize = 200;

/// Failures from one call to the generation service. Every variant is
/// retryable from the orchestrator's point of view.
#[derive(Debug, Error)]
pub enum RemoteInvocationError {
    #[error("failed to initialize HTTP client: {message}")]
    ClientInit { message: String },
    #[error("failed to encode generation request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to call generation service: {message}")]
    Transport { message: String },
    #[error("API request failed with status: {status}")]
    Status { status: u16, body: String },
    #[error("failed to parse generation response: {0}")]
    MalformedResponse(#[source] serde_json::Error),
    #[error("API response did not contain image data")]
    MissingInlineImage,
}

pub type InvocationResult<T> = std::result::Result<T, RemoteInvocationError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn post_json(&self, url: &str, api_key: &str, body: &Value) -> InvocationResult<HttpReply>;
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, prompt: &str, image: &ImageAsset) -> InvocationResult<ImageAsset>;
}

pub struct GenerationClient<T> {
    transport: T,
    url: String,
    api_key: String,
}

impl<T> fmt::Debug for GenerationClient<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GenerationClient")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GenerationClient<ReqwestTransport> {
    pub fn from_config(config: &GenerationConfig) -> InvocationResult<Self> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::new(transport, config))
    }
}

impl<T> GenerationClient<T> {
    pub fn new(transport: T, config: &GenerationConfig) -> Self {
        Self {
            transport,
            url: generate_content_url(&config.endpoint, &config.model),
            api_key: config.api_key.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<T: GenerationTransport> GenerationService for GenerationClient<T> {
    async fn generate(&self, prompt: &str, image: &ImageAsset) -> InvocationResult<ImageAsset> {
        let request = GenerateContentRequest::new(prompt, image);
        let body = serde_json::to_value(&request).map_err(RemoteInvocationError::Encode)?;
        let reply = self.transport.post_json(&self.url, &self.api_key, &body).await?;
        parse_reply(reply)
    }
}

pub fn generate_content_url(endpoint: &str, model: &str) -> String {
    format!(
        "{}/models/{}:generateContent",
        endpoint.trim_end_matches('/'),
        model.trim()
    )
}

/// Turns a raw HTTP reply into the generated image. Non-2xx statuses,
/// unparseable bodies and bodies without inline image data are errors.
pub fn parse_reply(reply: HttpReply) -> InvocationResult<ImageAsset> {
    if !reply.is_success() {
        return Err(RemoteInvocationError::Status {
            status: reply.status,
            body: truncate_for_error(&reply.body),
        });
    }

    let response: GenerateContentResponse =
        serde_json::from_str(&reply.body).map_err(RemoteInvocationError::MalformedResponse)?;
    let inline = response
        .first_inline_image()
        .ok_or(RemoteInvocationError::MissingInlineImage)?;

    let mime_type = inline
        .mime_type
        .as_deref()
        .filter(|mime| !mime.is_empty())
        .unwrap_or(DEFAULT_RESULT_MIME_TYPE);
    Ok(ImageAsset::from_inline(mime_type, inline.data.clone()))
}

fn truncate_for_error(body: &str) -> String {
    if body.chars().count() <= ERROR_BODY_LIMIT {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(ERROR_BODY_LIMIT).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{generation_config, image_reply, ScriptedTransport};
    use serde_json::json;

    #[test]
    fn url_joins_endpoint_and_model() {
        assert_eq!(
            generate_content_url("https://example.test/v1beta/", "model-x"),
            "https://example.test/v1beta/models/model-x:generateContent"
        );
    }

    #[test]
    fn non_success_status_is_an_error() {
        let err = parse_reply(HttpReply {
            status: 500,
            body: "internal".to_string(),
        })
        .unwrap_err();
        assert!(matches!(err, RemoteInvocationError::Status { status: 500, .. }));
    }

    #[test]
    fn success_without_inline_data_is_an_error() {
        let err = parse_reply(HttpReply {
            status: 200,
            body: json!({ "candidates": [] }).to_string(),
        })
        .unwrap_err();
        assert!(matches!(err, RemoteInvocationError::MissingInlineImage));
    }

    #[test]
    fn success_with_invalid_json_is_an_error() {
        let err = parse_reply(HttpReply {
            status: 200,
            body: "<html>".to_string(),
        })
        .unwrap_err();
        assert!(matches!(err, RemoteInvocationError::MalformedResponse(_)));
    }

    #[test]
    fn inline_mime_type_defaults_to_png() {
        let asset = parse_reply(HttpReply {
            status: 200,
            body: json!({
                "candidates": [{ "content": { "parts": [{ "inlineData": { "data": "QUJD" } }] } }]
            })
            .to_string(),
        })
        .expect("image present");
        assert_eq!(asset, ImageAsset::from_inline("image/png", "QUJD"));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let err = parse_reply(HttpReply {
            status: 503,
            body: "x".repeat(500),
        })
        .unwrap_err();
        match err {
            RemoteInvocationError::Status { body, .. } => {
                assert_eq!(body.chars().count(), ERROR_BODY_LIMIT + 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn client_posts_prompt_and_image_to_model_url() {
        let transport = ScriptedTransport::new(vec![image_reply("R0lG", "image/gif")]);
        let client = GenerationClient::new(transport.clone(), &generation_config());
        let source = ImageAsset::from_inline("image/png", "AAEC");

        let result = client
            .generate("neon glow", &source)
            .await
            .expect("generation succeeds");
        assert_eq!(result, ImageAsset::from_inline("image/gif", "R0lG"));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].url,
            "https://generation.test/v1beta/models/test-model:generateContent"
        );
        assert_eq!(calls[0].api_key, "test-key");
        assert_eq!(
            calls[0].body["contents"][0]["parts"][0]["text"],
            json!("neon glow")
        );
        assert_eq!(
            calls[0].body["contents"][0]["parts"][1]["inlineData"]["data"],
            json!("AAEC")
        );
    }

    #[test]
    fn client_debug_redacts_api_key() {
        let client = GenerationClient::new(ScriptedTransport::new(vec![]), &generation_config());
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("test-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
