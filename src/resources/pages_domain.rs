//! `gitlab_pages_domain`: custom domains and TLS certificates for GitLab Pages.
//!
//! The API has no single-field key for a pages domain, so the resource ID is
//! the composite `<project>:<domain>`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{from_state, Resource};
use crate::client::{CreatePagesDomainOptions, GitlabClient, PagesDomain, UpdatePagesDomainOptions};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::utils::{build_two_part_id, parse_two_part_id};

const ID_FORMAT: &str = "<project>:<domain>";

/// State model for `gitlab_pages_domain`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PagesDomainModel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub auto_ssl_enabled: Option<bool>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub verification_code: Option<String>,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub expired: Option<bool>,
}

impl PagesDomainModel {
    /// Overwrite the model with what the API reports. `key` is never returned
    /// and keeps its configured value.
    fn apply(&mut self, pages: &PagesDomain) {
        self.domain = pages.domain.clone();
        self.auto_ssl_enabled = Some(pages.auto_ssl_enabled);
        self.url = Some(pages.url.clone());
        self.verification_code = Some(pages.verification_code.clone());
        self.verified = Some(pages.verified);

        let certificate = pages.certificate.clone().unwrap_or_default();
        self.expired = Some(certificate.expired);
        if let Some(pem) = certificate.certificate {
            self.certificate = Some(pem);
        }
    }

    fn build_id(&mut self) {
        self.id = Some(build_two_part_id(&self.project, &self.domain));
    }

    fn parse_id(&self) -> Result<(String, String), ProviderError> {
        parse_two_part_id(self.id.as_deref().unwrap_or_default(), ID_FORMAT)
    }
}

/// The `gitlab_pages_domain` resource.
pub struct PagesDomainResource;

#[async_trait::async_trait]
impl Resource for PagesDomainResource {
    fn type_name(&self) -> &'static str {
        "gitlab_pages_domain"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "Connects custom domains and TLS certificates in GitLab Pages. \
                 Upstream API: https://docs.gitlab.com/ee/api/pages_domains.html",
            )
            .with_attribute(
                "id",
                Attribute::computed_string()
                    .with_use_state_for_unknown()
                    .with_description("The ID of this resource, in the format of project:domain"),
            )
            .with_attribute(
                "domain",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The custom domain indicated by the user."),
            )
            .with_attribute(
                "project",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The ID or URL-encoded path of the project owned by the authenticated user."),
            )
            .with_attribute(
                "auto_ssl_enabled",
                Attribute::optional_computed_bool()
                    .conflicts_with(&["certificate"])
                    .with_description("Enables automatic generation of SSL certificates issued by Let's Encrypt for custom domains."),
            )
            .with_attribute(
                "key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("The certificate key in PEM format."),
            )
            .with_attribute(
                "url",
                Attribute::computed_string().with_description("The URL for the given domain."),
            )
            .with_attribute(
                "verified",
                Attribute::computed_bool().with_description("Whether the domain is verified."),
            )
            .with_attribute(
                "verification_code",
                Attribute::computed_string()
                    .sensitive()
                    .with_description("The verification code for the domain."),
            )
            .with_attribute(
                "certificate",
                Attribute::optional_computed_string()
                    .conflicts_with(&["auto_ssl_enabled"])
                    .with_description("The certificate in PEM format with intermediates following in most specific to least specific order."),
            )
            .with_attribute(
                "expired",
                Attribute::optional_computed_bool()
                    .with_description("Whether the certificate is expired."),
            )
    }

    async fn create(&self, client: &GitlabClient, planned: Value) -> Result<Value, ProviderError> {
        let mut model: PagesDomainModel = from_state(planned)?;

        let options = CreatePagesDomainOptions {
            domain: model.domain.clone(),
            auto_ssl_enabled: model.auto_ssl_enabled,
            certificate: model.certificate.clone(),
            key: model.key.clone(),
        };

        let pages = client
            .create_pages_domain(&model.project, &options)
            .await
            .map_err(|e| {
                ProviderError::api(
                    format!("Error creating pages domain for project {}", model.project),
                    e,
                )
            })?;

        model.apply(&pages);
        model.build_id();

        debug!(url = ?model.url, project = %model.project, "created pages domain");
        Ok(serde_json::to_value(model)?)
    }

    async fn read(
        &self,
        client: &GitlabClient,
        current: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let mut model: PagesDomainModel = from_state(current)?;
        let (project, domain) = model.parse_id()?;

        match client.get_pages_domain(&project, &domain).await {
            Ok(pages) => {
                model.project = project;
                model.apply(&pages);
                Ok(Some(serde_json::to_value(model)?))
            },
            Err(e) if e.is_not_found() => {
                warn!(
                    project = %project,
                    domain = %domain,
                    "pages domain doesn't exist, removing from state"
                );
                Ok(None)
            },
            Err(e) => Err(ProviderError::api("Unable to read pages domain details", e)),
        }
    }

    async fn update(
        &self,
        client: &GitlabClient,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let mut model: PagesDomainModel = from_state(planned)?;

        let options = UpdatePagesDomainOptions {
            auto_ssl_enabled: model.auto_ssl_enabled,
            certificate: model.certificate.clone(),
            key: model.key.clone(),
        };

        let pages = client
            .update_pages_domain(&model.project, &model.domain, &options)
            .await
            .map_err(|e| {
                ProviderError::api(
                    format!("Error updating pages domain for project {}", model.project),
                    e,
                )
            })?;

        model.apply(&pages);
        model.build_id();

        debug!(url = ?model.url, project = %model.project, "updated pages domain");
        Ok(serde_json::to_value(model)?)
    }

    async fn delete(&self, client: &GitlabClient, current: Value) -> Result<(), ProviderError> {
        let model: PagesDomainModel = from_state(current)?;
        let (project, domain) = model.parse_id()?;

        match client.delete_pages_domain(&project, &domain).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(project = %project, domain = %domain, "pages domain already deleted");
                Ok(())
            },
            Err(e) => Err(ProviderError::api("Unable to delete pages domain", e)),
        }
    }
}
