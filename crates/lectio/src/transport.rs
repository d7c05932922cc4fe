// Authenticated HTTP transport: the one place requests are issued from.
//
// Fetch functions are stateless and return `Result` directly; callers that
// need a response twice keep the value, there is no memoization here.

use bytes::Bytes;
use reqwest::Client;
use rustls::ClientConfig;
use rustls::crypto::aws_lc_rs;
use rustls_platform_verifier::BuilderVerifierExt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::DownloaderConfig;
use crate::credentials::HeaderProvider;
use crate::error::DownloadError;

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig) -> Result<Client, DownloadError> {
    // Create the crypto provider
    let provider = Arc::new(aws_lc_rs::default_provider());

    // Build platform default TLS configuration
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| DownloadError::Internal(format!("tls protocol configuration failed: {e}")))?
        .with_platform_verifier()
        .map_err(|e| DownloadError::Internal(format!("tls verifier configuration failed: {e}")))?
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .use_preconfigured_tls(tls_config)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder.build().map_err(DownloadError::from)
}

/// Shared HTTP GET front-end for the API, manifest, key, and segment
/// fetch paths. Non-2xx responses surface as `DownloadError::Status`.
#[derive(Clone)]
pub struct Transport {
    client: Client,
}

impl Transport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client whose default header set includes the credential
    /// provider's headers (user-agent, accept-language, cookie).
    pub fn with_header_provider(
        config: &DownloaderConfig,
        provider: &dyn HeaderProvider,
    ) -> Result<Self, DownloadError> {
        let mut config = config.clone();
        let provided = provider.common_headers()?;
        if let Some(agent) = provided.get(reqwest::header::USER_AGENT) {
            if let Ok(agent) = agent.to_str() {
                config.user_agent = agent.to_string();
            }
        }
        for (name, value) in provided.iter() {
            config.headers.insert(name.clone(), value.clone());
        }
        let client = create_client(&config)?;
        Ok(Self { client })
    }

    async fn get_checked(&self, url: Url) -> Result<reqwest::Response, DownloadError> {
        debug!(url = %url, "GET");
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// GET returning the raw response body.
    pub async fn get_bytes(&self, url: Url) -> Result<Bytes, DownloadError> {
        let response = self.get_checked(url).await?;
        response.bytes().await.map_err(DownloadError::from)
    }

    /// GET returning a UTF-8 body (playlists).
    pub async fn get_text(&self, url: Url) -> Result<String, DownloadError> {
        let url_str = url.to_string();
        let bytes = self.get_bytes(url).await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| DownloadError::Decode(format!("body of {url_str} is not valid UTF-8: {e}")))
    }

    /// GET returning the parsed JSON body.
    pub async fn get_json(&self, url: Url) -> Result<serde_json::Value, DownloadError> {
        let bytes = self.get_bytes(url).await?;
        serde_json::from_slice(&bytes).map_err(DownloadError::from)
    }
}
