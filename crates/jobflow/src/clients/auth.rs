// crates/jobflow/src/clients/auth.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::http::TransportError;

/// Exchanges stored credentials for a bearer token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` when the credentials were rejected. A 5xx from the service
    /// is a `TransportError` so the step is retried.
    async fn authenticate(&self, credentials: &str) -> Result<Option<String>, TransportError>;
}

#[derive(Deserialize)]
struct AuthenticationBody {
    authentication: AuthenticationToken,
}

#[derive(Deserialize)]
struct AuthenticationToken {
    token: String,
}

/// Posts to `<base_url>/v1/authentications` with the credentials in
/// `X-API-Authenticate`.
#[derive(Clone)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthenticator {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, credentials: &str) -> Result<Option<String>, TransportError> {
        let resp = self
            .client
            .post(format!("{}/v1/authentications", self.base_url))
            .header("X-API-Authenticate", credentials)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(TransportError::new(
                "RemoteServerError",
                format!("authentication service returned {status}"),
            ));
        }
        if !status.is_success() {
            debug!(status = status.as_u16(), "authentication rejected");
            return Ok(None);
        }

        match resp.json::<AuthenticationBody>().await {
            Ok(body) if !body.authentication.token.is_empty() => {
                Ok(Some(body.authentication.token))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                debug!(error = %e, "authentication response unreadable");
                Ok(None)
            }
        }
    }
}
