//! The GitLab provider: registry of adapters plus the shared API client.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::client::GitlabClient;
use crate::config::ProviderConfig;
use crate::data_sources::{self, DataSource};
use crate::error::ProviderError;
use crate::plan::plan_resource;
use crate::resources::{self, Resource};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation;

/// Provider implementation served over the plugin protocol.
///
/// The client is written once by `configure` and shared read-only by every
/// call after that.
pub struct GitlabProvider {
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
    client: RwLock<Option<Arc<GitlabClient>>>,
}

impl Default for GitlabProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GitlabProvider {
    pub fn new() -> Self {
        Self {
            resources: resources::all()
                .into_iter()
                .map(|r| (r.type_name(), r))
                .collect(),
            data_sources: data_sources::all()
                .into_iter()
                .map(|d| (d.type_name(), d))
                .collect(),
            client: RwLock::new(None),
        }
    }

    /// A provider that is already configured with `client`.
    pub fn with_client(client: GitlabClient) -> Self {
        let provider = Self::new();
        Self {
            client: RwLock::new(Some(Arc::new(client))),
            ..provider
        }
    }

    async fn client(&self) -> Result<Arc<GitlabClient>, ProviderError> {
        self.client
            .read()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(ProviderError::NotConfigured)
    }

    fn resource(&self, type_name: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }

    fn data_source(&self, type_name: &str) -> Result<&dyn DataSource, ProviderError> {
        self.data_sources
            .get(type_name)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownDataSource(type_name.to_string()))
    }
}

#[async_trait::async_trait]
impl ProviderService for GitlabProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        for (name, resource) in &self.resources {
            schema = schema.with_resource(*name, resource.schema());
        }
        for (name, data_source) in &self.data_sources {
            schema = schema.with_data_source(*name, data_source.schema());
        }
        schema
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validation::validate(&ProviderConfig::schema(), &config))
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(config)?.with_env();

        let Some(client_config) = config.client_config() else {
            return Ok(vec![Diagnostic::error("Missing GitLab token")
                .with_detail(
                    "Set the provider 'token' attribute or the GITLAB_TOKEN environment variable",
                )
                .with_attribute("token")]);
        };

        let client = match GitlabClient::new(client_config) {
            Ok(client) => client,
            Err(e) => {
                return Ok(vec![
                    Diagnostic::error("Unable to create GitLab client").with_detail(e.to_string())
                ])
            },
        };
        debug!(base_url = %client.base_url(), "GitLab client created");

        if config.early_auth_check() {
            match client.current_user().await {
                Ok(user) => debug!(username = %user.username, "token verified"),
                Err(e) => {
                    return Ok(vec![Diagnostic::error("GitLab authentication failed")
                        .with_detail(e.to_string())
                        .with_attribute("token")])
                },
            }
        }

        *self.client.write().await = Some(Arc::new(client));
        info!("GitLab provider configured");
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.client.write().await.take();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.resource(resource_type)?.validate(&config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.resource(resource_type)?.schema();
        Ok(plan_resource(&schema, prior_state.as_ref(), &proposed_state))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.create(&client, planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Option<Value>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.read(&client, current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.update(&client, prior_state, planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.delete(&client, current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let state = self.resource(resource_type)?.import(id)?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.data_source(data_source_type)?.validate(&config))
    }

    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let client = self.client().await?;
        data_source.read(&client, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use serde_json::json;

    #[test]
    fn test_registry() {
        let provider = GitlabProvider::new();
        let metadata = provider.metadata();
        assert_eq!(metadata.resources, vec!["gitlab_pages_domain", "gitlab_user"]);
        assert_eq!(metadata.data_sources, vec!["gitlab_users"]);

        let schema = provider.schema();
        assert!(schema.provider.attribute("token").unwrap().flags.sensitive);
    }

    #[tokio::test]
    async fn test_calls_before_configure_fail() {
        let provider = GitlabProvider::new();
        let err = provider
            .create("gitlab_user", json!({"name": "n"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));

        let err = provider.read_data_source("gitlab_users", json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }

    #[tokio::test]
    async fn test_unknown_types() {
        let provider = GitlabProvider::new();
        let err = provider.read("gitlab_widget", json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(name) if name == "gitlab_widget"));

        let err = provider
            .validate_data_source_config("gitlab_widgets", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownDataSource(_)));
    }

    #[tokio::test]
    async fn test_import_passes_id_through() {
        let provider = GitlabProvider::new();
        let imported = provider
            .import_resource("gitlab_pages_domain", "42:example.com")
            .await
            .unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].state, json!({"id": "42:example.com"}));
    }

    #[tokio::test]
    async fn test_stop_drops_client() {
        let client = GitlabClient::new(ClientConfig::new("glpat-test")).unwrap();
        let provider = GitlabProvider::with_client(client);
        assert!(provider.client().await.is_ok());

        provider.stop().await.unwrap();
        assert!(matches!(provider.client().await, Err(ProviderError::NotConfigured)));
    }
}
