use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{GenerationTransport, HttpReply, InvocationResult, RemoteInvocationError};

const API_KEY_HEADER: &str = "x-goog-api-key";
const USER_AGENT: &str = concat!("vibecode/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Option<Duration>) -> InvocationResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| RemoteInvocationError::ClientInit {
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl GenerationTransport for ReqwestTransport {
    async fn post_json(&self, url: &str, api_key: &str, body: &Value) -> InvocationResult<HttpReply> {
        let mut request = self.client.post(url).json(body);
        if !api_key.is_empty() {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| RemoteInvocationError::Transport {
                message: err.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| RemoteInvocationError::Transport {
                message: format!("failed to read response body: {err}"),
            })?;

        Ok(HttpReply { status, body })
    }
}
