//! Managed resources.
//!
//! Each resource is an adapter between a typed state model and one GitLab
//! endpoint. The provider owns the registry and hands every call the shared
//! client; adapters hold no mutable state of their own.

mod pages_domain;
mod user;

pub use pages_domain::{PagesDomainModel, PagesDomainResource};
pub use user::{UserModel, UserResource};

use serde_json::Value;

use crate::client::GitlabClient;
use crate::error::ProviderError;
use crate::schema::{Diagnostic, Schema};
use crate::validation;

/// A resource type managed by the provider.
#[async_trait::async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Full type name, e.g. `gitlab_pages_domain`.
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Validate configuration before planning. Defaults to schema validation.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.schema(), config)
    }

    async fn create(&self, client: &GitlabClient, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh state from the API. `None` means the object is gone.
    async fn read(
        &self,
        client: &GitlabClient,
        current: Value,
    ) -> Result<Option<Value>, ProviderError>;

    async fn update(
        &self,
        client: &GitlabClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the remote object. An object that is already gone is not an error.
    async fn delete(&self, client: &GitlabClient, current: Value) -> Result<(), ProviderError>;

    /// Build the initial state for an import. The host follows up with a read.
    fn import(&self, id: &str) -> Result<Value, ProviderError> {
        Ok(serde_json::json!({ "id": id }))
    }
}

/// Every resource the provider registers.
pub fn all() -> Vec<Box<dyn Resource>> {
    vec![Box::new(PagesDomainResource), Box::new(UserResource)]
}

/// Decode state or plan JSON into a typed model.
pub(crate) fn from_state<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ProviderError> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::InvalidRequest(format!("malformed resource state: {}", e)))
}

/// Accept integral floats for int64 attributes; hosts may encode every number as a float.
pub(crate) fn lenient_int64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde::Deserialize;

    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    number
        .as_i64()
        .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("expected an integer, got {}", number)))
}
