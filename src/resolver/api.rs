//! Control-plane HTTP API client.
//!
//! [`ApiResolver`] asks the control plane's internal pages API which projects
//! are served on a host:
//!
//! - `GET {base}/api/v4/internal/pages?host={hostname}` answers `200` with a
//!   [`VirtualDomain`] JSON body, or `204` when the host is unknown.
//! - `GET {base}/api/v4/internal/pages/status` checks that the API is reachable.
//!
//! Every request carries a short-lived HS256 JWT, signed with the shared API
//! secret, in the [`API_TOKEN_HEADER`] header.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{Resolved, Resolver};
use crate::types::VirtualDomain;
use crate::{BifrostError, Result, version};

/// Request header carrying the signed API token.
pub const API_TOKEN_HEADER: &str = "Pages-Api-Request";

/// `iss` claim of issued tokens.
pub const JWT_ISSUER: &str = "bifrost";

const LOOKUP_PATH: &str = "api/v4/internal/pages";
const STATUS_PATH: &str = "api/v4/internal/pages/status";

/// Connection settings for [`ApiResolver`].
///
/// ```rust
/// # use bifrost::resolver::ApiConfig;
/// # use std::time::Duration;
/// let config = ApiConfig::new("https://control.example.internal", "s3cret")
///     .client_timeout(Duration::from_secs(5));
/// assert_eq!(config.jwt_expiry, Duration::from_secs(30));
/// ```
#[derive(Clone)]
pub struct ApiConfig {
    /// Base URL of the control plane, e.g. `https://control.example.internal`.
    pub base_url: String,
    /// Shared secret used to sign API tokens.
    pub secret: Vec<u8>,
    /// Per-request HTTP timeout. Default: 10s.
    pub client_timeout: Duration,
    /// Lifetime of each signed token. Default: 30s.
    pub jwt_expiry: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            base_url: base_url.into(),
            secret: secret.into(),
            client_timeout: Duration::from_secs(10),
            jwt_expiry: Duration::from_secs(30),
        }
    }

    pub fn client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = timeout;
        self
    }

    pub fn jwt_expiry(mut self, expiry: Duration) -> Self {
        self.jwt_expiry = expiry;
        self
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("secret", &"<redacted>")
            .field("client_timeout", &self.client_timeout)
            .field("jwt_expiry", &self.jwt_expiry)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: &'static str,
    exp: u64,
}

/// Error body returned by the control plane on non-2xx answers.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`Resolver`] backed by the control-plane HTTP API.
pub struct ApiResolver {
    base_url: Url,
    key: EncodingKey,
    jwt_expiry: Duration,
    http: reqwest::Client,
}

impl ApiResolver {
    /// Build a client, validating the configuration.
    pub fn new(config: ApiConfig) -> Result<Self> {
        if config.base_url.is_empty() || config.secret.is_empty() {
            return Err(BifrostError::Configuration(
                "control-plane API URL or API secret has not been provided".to_string(),
            ));
        }
        if config.client_timeout.is_zero() {
            return Err(BifrostError::Configuration(
                "control-plane API client timeout has not been provided".to_string(),
            ));
        }
        if config.jwt_expiry.is_zero() {
            return Err(BifrostError::Configuration(
                "control-plane API token expiry has not been provided".to_string(),
            ));
        }

        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            BifrostError::Configuration(format!(
                "invalid control-plane API URL {}: {e}",
                config.base_url
            ))
        })?;
        // Keep any path component when joining endpoint paths.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.client_timeout)
            .user_agent(version::user_agent())
            .build()
            .map_err(|e| {
                BifrostError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url,
            key: EncodingKey::from_secret(&config.secret),
            jwt_expiry: config.jwt_expiry,
            http,
        })
    }

    fn token(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| BifrostError::Configuration(format!("system clock error: {e}")))?;
        let claims = Claims {
            iss: JWT_ISSUER,
            exp: (now + self.jwt_expiry).as_secs(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| BifrostError::Configuration(format!("failed to sign API token: {e}")))
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let mut url = self.base_url.join(path).map_err(|e| {
            BifrostError::InvalidInput(format!("invalid endpoint path {path}: {e}"))
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        debug!(url = %url, "control-plane API request");
        let response = self
            .http
            .get(url)
            .header(API_TOKEN_HEADER, self.token()?)
            .send()
            .await?;
        Ok(response)
    }
}

/// Map a non-success response to an error, using the JSON error body when
/// there is one.
async fn error_from_response(response: reqwest::Response) -> BifrostError {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return BifrostError::Unauthorized;
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| body.trim().to_string());

    BifrostError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl Resolver for ApiResolver {
    fn name(&self) -> &str {
        "api"
    }

    async fn resolve(&self, hostname: &str) -> Result<Resolved> {
        let response = self.get(LOOKUP_PATH, &[("host", hostname)]).await?;

        match response.status() {
            StatusCode::OK => {
                let domain: VirtualDomain = response.json().await?;
                Ok(Resolved::new(domain, StatusCode::OK.as_u16()))
            }
            StatusCode::NO_CONTENT => Err(BifrostError::DomainDoesNotExist),
            _ => Err(error_from_response(response).await),
        }
    }

    async fn status(&self) -> Result<()> {
        let response = self
            .get(STATUS_PATH, &[])
            .await
            .map_err(|e| BifrostError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let err = error_from_response(response).await;
            Err(BifrostError::Unavailable(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_url_or_secret() {
        let err = ApiResolver::new(ApiConfig::new("", "secret")).err().unwrap();
        assert!(matches!(err, BifrostError::Configuration(_)));

        let err = ApiResolver::new(ApiConfig::new("https://example.com", Vec::new()))
            .err()
            .unwrap();
        assert!(matches!(err, BifrostError::Configuration(_)));
    }

    #[test]
    fn rejects_zero_timeouts() {
        let config = ApiConfig::new("https://example.com", "secret").client_timeout(Duration::ZERO);
        assert!(ApiResolver::new(config).is_err());

        let config = ApiConfig::new("https://example.com", "secret").jwt_expiry(Duration::ZERO);
        assert!(ApiResolver::new(config).is_err());
    }

    #[test]
    fn rejects_unparseable_url() {
        let err = ApiResolver::new(ApiConfig::new("not a url", "secret"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("invalid control-plane API URL"));
    }

    #[test]
    fn base_path_is_preserved() {
        let resolver =
            ApiResolver::new(ApiConfig::new("https://example.com/control", "secret")).unwrap();
        let url = resolver.base_url.join(LOOKUP_PATH).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/control/api/v4/internal/pages"
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let config = ApiConfig::new("https://example.com", "hunter2");
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
