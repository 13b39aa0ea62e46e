use super::{decode_failure, decode_success, RawResponse, Transport, TransportError};
use crate::operation::{OperationRequest, Verb};
use crate::Result;
use async_trait::async_trait;
use reqwest::Method;
use std::env;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// `reqwest`-backed [`Transport`].
///
/// The client is owned by the transport and shared through `Arc<dyn Transport>`;
/// there is no process-wide default client.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Build a transport for `base_url` with env-tunable defaults:
    /// - `CP_HTTP_TIMEOUT_SECS` (default 30)
    /// - `CP_HTTP_POOL_IDLE_TIMEOUT_SECS` (default 90)
    /// - `CP_API_KEY` (optional, sent as basic auth password)
    pub fn new(base_url: &str) -> Result<Self> {
        let timeout_secs = env::var("CP_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("CP_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )))
            .build()
            .map_err(TransportError::Http)?;

        let mut transport = Self::with_client(client, base_url)?;
        transport.api_key = env::var("CP_API_KEY").ok().filter(|k| !k.is_empty());
        Ok(transport)
    }

    /// Use a caller-configured `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(TransportError::Url)?;
        Ok(Self {
            client,
            base_url,
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> std::result::Result<Url, TransportError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }
}

impl From<Verb> for Method {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Delete => Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &OperationRequest,
    ) -> std::result::Result<RawResponse, TransportError> {
        let url = self.url_for(&request.path)?;
        let mut req = self.client.request(request.verb.into(), url);

        if let Some(body) = &request.body {
            req = req.json(body);
        }
        if let Some(key) = &self.api_key {
            req = req.basic_auth("", Some(key));
        }

        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        debug!(
            verb = %request.verb,
            path = request.path.as_str(),
            http_status = status.as_u16(),
            body_len = bytes.len(),
            "control plane response"
        );

        if status.is_success() {
            Ok(RawResponse::success(status.as_u16(), decode_success(&bytes)?))
        } else {
            Ok(RawResponse::failure(status.as_u16(), decode_failure(&bytes)))
        }
    }
}
