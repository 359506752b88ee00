//! HTTP uploader for the deploy endpoint.
//!
//! One `POST` per deploy:
//! - `Content-Type: text/plain`
//! - `Authorization: Bearer <RSD_API_TOKEN>`
//! - body: the package as a JSON object (`{"path": "content", ...}`)
//!
//! The transport follows the endpoint's scheme. Redirects are not followed, so
//! a 3xx reply is a [`UploadError::Status`]. Certificate validation is switched
//! off only when `RSD_ENVIRONMENT=dev`. The response body is parsed as a
//! package-shaped JSON object and handed back for backups; an empty body means
//! an empty payload. No retries.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::{Client, Request, Url};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::contract::{Package, Uploader};
use crate::settings::{Environment, Settings, SettingsError};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("invalid endpoint URL `{endpoint}`")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported endpoint scheme `{scheme}`, expected http or https")]
    UnsupportedScheme { scheme: String },

    #[error("failed to serialize package")]
    Serialize(#[source] serde_json::Error),

    #[error("HTTP transport error")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("server response is not a valid package")]
    MalformedResponse(#[source] serde_json::Error),
}

/// Uploads packages to a single endpoint with a static bearer token.
pub struct DeployClient {
    client: Client,
    endpoint: Url,
    token: String,
}

impl std::fmt::Debug for DeployClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl DeployClient {
    pub fn new(endpoint: &str, token: &str, environment: Environment) -> Result<Self, UploadError> {
        let endpoint_url = Url::parse(endpoint).map_err(|e| {
            error!(error = ?e, endpoint, "Failed to parse deploy endpoint");
            UploadError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                source: e,
            }
        })?;
        match endpoint_url.scheme() {
            "http" | "https" => {}
            other => {
                error!(scheme = other, "Unsupported deploy endpoint scheme");
                return Err(UploadError::UnsupportedScheme {
                    scheme: other.to_string(),
                });
            }
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(!environment.verifies_certificates())
            .redirect(Policy::none())
            .build()?;

        info!(
            endpoint = %endpoint_url,
            verify_certificates = environment.verifies_certificates(),
            token_set = !token.is_empty(),
            "Initialized deploy client"
        );
        Ok(DeployClient {
            client,
            endpoint: endpoint_url,
            token: token.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, UploadError> {
        DeployClient::new(
            settings.api_endpoint()?,
            settings.api_token()?,
            settings.environment,
        )
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Builds the deploy request without sending it.
    pub fn request(&self, package: &Package) -> Result<Request, UploadError> {
        let body = serde_json::to_string(package).map_err(UploadError::Serialize)?;
        let request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "text/plain")
            .bearer_auth(&self.token)
            .body(body)
            .build()?;
        Ok(request)
    }
}

#[async_trait]
impl Uploader for DeployClient {
    async fn send_package(&self, package: &Package) -> Result<Package, UploadError> {
        info!(endpoint = %self.endpoint, files = package.len(), "Uploading package");
        let request = self.request(package)?;

        let response = self.client.execute(request).await.map_err(|e| {
            error!(error = ?e, endpoint = %self.endpoint, "Deploy request failed");
            UploadError::Transport(e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(error = ?e, "Failed to read deploy response body");
            UploadError::Transport(e)
        })?;

        if !status.is_success() {
            error!(status = %status, endpoint = %self.endpoint, "Deploy endpoint returned error. Response body: {body}");
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload = parse_response(&body)?;
        debug!(entries = payload.len(), "Parsed deploy response");
        Ok(payload)
    }
}

/// Parses the endpoint's reply. Blank bodies are an empty payload.
pub fn parse_response(body: &str) -> Result<Package, UploadError> {
    if body.trim().is_empty() {
        return Ok(Package::new());
    }
    serde_json::from_str(body).map_err(|e| {
        error!(error = ?e, "Deploy response is not a JSON object of file contents");
        UploadError::MalformedResponse(e)
    })
}
