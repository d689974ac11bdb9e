//! Provider configuration.
//!
//! The host sends the provider block as JSON. Anything it leaves unset falls
//! back to the environment:
//!
//! | attribute      | environment variable   |
//! |----------------|------------------------|
//! | `token`        | `GITLAB_TOKEN`         |
//! | `base_url`     | `GITLAB_BASE_URL`      |
//! | `cacert_file`  | `GITLAB_CACERT_FILE`   |
//! | `insecure`     | `GITLAB_INSECURE`      |

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::{ClientConfig, DEFAULT_BASE_URL};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

pub const TOKEN_ENV: &str = "GITLAB_TOKEN";
pub const BASE_URL_ENV: &str = "GITLAB_BASE_URL";
pub const CACERT_FILE_ENV: &str = "GITLAB_CACERT_FILE";
pub const INSECURE_ENV: &str = "GITLAB_INSECURE";
pub const SHUTDOWN_TIMEOUT_ENV: &str = "GITLAB_PROVIDER_SHUTDOWN_TIMEOUT";
pub const LOG_FORMAT_ENV: &str = "GITLAB_PROVIDER_LOG_FORMAT";

/// The provider block, after environment fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub cacert_file: Option<String>,
    #[serde(default)]
    pub insecure: Option<bool>,
    #[serde(default)]
    pub early_auth_check: Option<bool>,
}

impl ProviderConfig {
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(
                        "The OAuth2 Token, Project, Group, Personal Access Token or CI Job Token used to connect to GitLab. \
                         It can also be sourced from the GITLAB_TOKEN environment variable.",
                    ),
            )
            .with_attribute(
                "base_url",
                Attribute::optional_string().with_description(
                    "The GitLab Base API URL. It can also be sourced from the GITLAB_BASE_URL environment variable. \
                     Default: https://gitlab.com/api/v4/",
                ),
            )
            .with_attribute(
                "cacert_file",
                Attribute::optional_string()
                    .with_description("A file containing the CA certificate to use in case SSL certificates are not from a known CA."),
            )
            .with_attribute(
                "insecure",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description("When set to true this disables SSL verification of the connection to the GitLab instance."),
            )
            .with_attribute(
                "early_auth_check",
                Attribute::optional_bool()
                    .with_default(json!(true))
                    .with_description("Check the token against the API while configuring the provider."),
            )
    }

    /// Parse the provider block. `null` is an empty block.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| ProviderError::Configuration(format!("invalid provider configuration: {}", e)))
    }

    /// Fill unset fields from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Fill unset fields from `lookup`. Configured values win.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        self.token = non_empty(self.token).or_else(|| lookup(TOKEN_ENV));
        self.base_url = non_empty(self.base_url).or_else(|| lookup(BASE_URL_ENV));
        self.cacert_file = non_empty(self.cacert_file).or_else(|| lookup(CACERT_FILE_ENV));
        if self.insecure.is_none() {
            self.insecure = lookup(INSECURE_ENV).map(|v| parse_bool(&v));
        }
        self
    }

    pub fn early_auth_check(&self) -> bool {
        self.early_auth_check.unwrap_or(true)
    }

    /// Client settings, or `None` when no token is available.
    pub fn client_config(&self) -> Option<ClientConfig> {
        let token = self.token.clone()?;
        let mut config = ClientConfig::new(token)
            .with_base_url(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL));
        config.cacert_file = self.cacert_file.as_ref().map(PathBuf::from);
        config.insecure = self.insecure.unwrap_or(false);
        Some(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_null_config_is_empty() {
        assert_eq!(ProviderConfig::from_value(Value::Null).unwrap(), ProviderConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        let err = ProviderConfig::from_value(json!({"insecure": "maybe"})).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_env_fallback() {
        let config = ProviderConfig::default().with_env_from(env(&[
            (TOKEN_ENV, "glpat-env"),
            (BASE_URL_ENV, "https://gitlab.example.com"),
            (INSECURE_ENV, "true"),
        ]));

        assert_eq!(config.token.as_deref(), Some("glpat-env"));
        assert_eq!(config.base_url.as_deref(), Some("https://gitlab.example.com"));
        assert_eq!(config.insecure, Some(true));
        assert!(config.cacert_file.is_none());
    }

    #[test]
    fn test_configured_values_win() {
        let config = ProviderConfig::from_value(json!({
            "token": "glpat-config",
            "insecure": false
        }))
        .unwrap()
        .with_env_from(env(&[(TOKEN_ENV, "glpat-env"), (INSECURE_ENV, "1")]));

        assert_eq!(config.token.as_deref(), Some("glpat-config"));
        assert_eq!(config.insecure, Some(false));
    }

    #[test]
    fn test_empty_token_falls_back() {
        let config = ProviderConfig::from_value(json!({"token": ""}))
            .unwrap()
            .with_env_from(env(&[]));
        assert!(config.token.is_none());
        assert!(config.client_config().is_none());
    }

    #[test]
    fn test_client_config() {
        let config = ProviderConfig {
            token: Some("glpat-x".to_string()),
            cacert_file: Some("/etc/ssl/gitlab.pem".to_string()),
            ..Default::default()
        };
        let client = config.client_config().unwrap();
        assert_eq!(client.token, "glpat-x");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.cacert_file, Some(PathBuf::from("/etc/ssl/gitlab.pem")));
        assert!(!client.insecure);
        assert!(config.early_auth_check());
    }
}
