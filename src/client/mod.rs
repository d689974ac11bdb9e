//! Async client for the GitLab REST API (v4).
//!
//! Only the endpoints the provider's adapters need are covered. Every call is
//! a single request; retries and rate limiting are left to the caller.
//!
//! Request option structs omit unset fields from the JSON body, so an
//! attribute missing from configuration is never sent as a zero value.

mod pages_domains;
mod users;

pub use pages_domains::{
    CreatePagesDomainOptions, PagesDomain, PagesDomainCertificate, UpdatePagesDomainOptions,
};
pub use users::{CreateUserOptions, ListUsersOptions, UpdateUserOptions, User};

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue};
use reqwest::{Certificate, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Base URL used when neither configuration nor environment provides one.
pub const DEFAULT_BASE_URL: &str = "https://gitlab.com/api/v4/";

const API_VERSION_PATH: &str = "api/v4/";
const TOKEN_HEADER: &str = "private-token";
const MAX_ERROR_BODY: usize = 200;

/// Errors returned by [`GitlabClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API answered with a non-success status.
    #[error("{method} {url}: {status} {message}")]
    Status {
        /// HTTP method of the failed request.
        method: Method,
        /// Full request URL.
        url: String,
        /// Response status.
        status: StatusCode,
        /// The `message`/`error` field of the response body, or the raw body.
        message: String,
    },

    /// The request could not be sent or the response could not be decoded.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The base URL or an endpoint path is not a valid URL.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The token cannot be used as a header value.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] InvalidHeaderValue),

    /// The configured CA certificate file could not be read.
    #[error("unable to read CA certificate {path}: {source}")]
    CaCertificate {
        /// Path from the provider configuration.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl ApiError {
    /// HTTP status of the response, if the API answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(err) => err.status(),
            _ => None,
        }
    }

    /// Whether the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

/// Settings for building a [`GitlabClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Personal, project or group access token.
    pub token: String,
    /// GitLab instance URL; `api/v4/` is appended when missing.
    pub base_url: String,
    /// Extra PEM root certificate to trust.
    pub cacert_file: Option<PathBuf>,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Config for the given token against gitlab.com.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            cacert_file: None,
            insecure: false,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the instance URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Shared, read-only handle on the GitLab API.
#[derive(Debug, Clone)]
pub struct GitlabClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GitlabClient {
    /// Build a client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&normalize_base_url(&config.base_url))?;

        let mut token = HeaderValue::from_str(&config.token)?;
        token.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token);

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("gitlab-provider/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure);

        if let Some(path) = &config.cacert_file {
            let pem = std::fs::read(path).map_err(|source| ApiError::CaCertificate {
                path: path.clone(),
                source,
            })?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }

    /// The normalised API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path relative to the API base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    /// Fetch the user owning the token. Used to check credentials early.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get("user").await
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(Method::GET, path, |req| req).await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, |req| req.json(body)).await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::PUT, path, |req| req.json(body)).await?;
        Ok(response.json().await?)
    }

    /// POST without a body, discarding the response (state actions).
    pub(crate) async fn post_action(&self, path: &str) -> Result<(), ApiError> {
        self.send(Method::POST, path, |req| req).await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, path, |req| req).await?;
        Ok(())
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        customize: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, ApiError> {
        let url = self.endpoint(path)?;
        debug!(method = %method, url = %url, "GitLab API request");

        let request = customize(self.http.request(method.clone(), url.clone()));
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(method = %method, url = %url, status = %status, "GitLab API error response");
        Err(ApiError::Status {
            method,
            url: url.to_string(),
            status,
            message: error_message(&body),
        })
    }
}

/// Encode a project ID or namespaced path as a single path segment.
///
/// `group/sub/project` becomes `group%2Fsub%2Fproject`; numeric IDs pass
/// through unchanged.
pub fn path_segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn normalize_base_url(base_url: &str) -> String {
    let mut url = base_url.trim().to_string();
    if !url.ends_with('/') {
        url.push('/');
    }
    if !url.ends_with(API_VERSION_PATH) {
        url.push_str(API_VERSION_PATH);
    }
    url
}

/// Pull the human-readable part out of a GitLab error body.
///
/// GitLab answers with `{"message": ...}` or `{"error": ...}`; `message` may
/// be a string or a map of field errors.
fn error_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            match map.get(key) {
                Some(serde_json::Value::String(msg)) => return msg.clone(),
                Some(other) if !other.is_null() => return other.to_string(),
                _ => {},
            }
        }
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://gitlab.example.com"),
            "https://gitlab.example.com/api/v4/"
        );
        assert_eq!(
            normalize_base_url("https://gitlab.example.com/"),
            "https://gitlab.example.com/api/v4/"
        );
        assert_eq!(
            normalize_base_url("https://gitlab.example.com/api/v4"),
            "https://gitlab.example.com/api/v4/"
        );
        assert_eq!(normalize_base_url(DEFAULT_BASE_URL), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_path_segment_encodes_namespaced_paths() {
        assert_eq!(path_segment("42"), "42");
        assert_eq!(path_segment("group/sub/project"), "group%2Fsub%2Fproject");
        assert_eq!(path_segment("example.com"), "example.com");
    }

    #[test]
    fn test_endpoint_keeps_encoded_segments() {
        let client =
            GitlabClient::new(ClientConfig::new("token").with_base_url("http://localhost:8080"))
                .unwrap();
        let url = client
            .endpoint(&format!(
                "projects/{}/pages/domains/{}",
                path_segment("group/project"),
                path_segment("example.com")
            ))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/v4/projects/group%2Fproject/pages/domains/example.com"
        );
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"404 Not found"}"#), "404 Not found");
        assert_eq!(error_message(r#"{"error":"insufficient_scope"}"#), "insufficient_scope");
        assert_eq!(
            error_message(r#"{"message":{"email":["has already been taken"]}}"#),
            r#"{"email":["has already been taken"]}"#
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let err = GitlabClient::new(ClientConfig::new("bad\ntoken")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken(_)));
    }

    #[test]
    fn test_missing_ca_certificate() {
        let mut config = ClientConfig::new("token");
        config.cacert_file = Some(PathBuf::from("/nonexistent/ca.pem"));
        let err = GitlabClient::new(config).unwrap_err();
        assert!(matches!(err, ApiError::CaCertificate { .. }));
    }

    #[test]
    fn test_not_found_detection() {
        let err = ApiError::Status {
            method: Method::GET,
            url: "http://localhost/api/v4/users/1".to_string(),
            status: StatusCode::NOT_FOUND,
            message: "404 User Not Found".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "GET http://localhost/api/v4/users/1: 404 Not Found 404 User Not Found"
        );

        let err = ApiError::Status {
            method: Method::GET,
            url: "http://localhost/api/v4/users/1".to_string(),
            status: StatusCode::FORBIDDEN,
            message: "403 Forbidden".to_string(),
        };
        assert!(!err.is_not_found());
    }
}
