//! Pages domains API: `/projects/:id/pages/domains`.

use serde::{Deserialize, Serialize};

use super::{path_segment, ApiError, GitlabClient};

/// A custom domain attached to a project's GitLab Pages site.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PagesDomain {
    pub domain: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub verification_code: String,
    #[serde(default)]
    pub enabled_until: Option<String>,
    #[serde(default)]
    pub auto_ssl_enabled: bool,
    #[serde(default)]
    pub certificate: Option<PagesDomainCertificate>,
}

/// Certificate details reported for a pages domain.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PagesDomainCertificate {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub certificate_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreatePagesDomainOptions {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_ssl_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdatePagesDomainOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_ssl_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

fn domains_path(project: &str) -> String {
    format!("projects/{}/pages/domains", path_segment(project))
}

fn domain_path(project: &str, domain: &str) -> String {
    format!("{}/{}", domains_path(project), path_segment(domain))
}

impl GitlabClient {
    pub async fn create_pages_domain(
        &self,
        project: &str,
        options: &CreatePagesDomainOptions,
    ) -> Result<PagesDomain, ApiError> {
        self.post(&domains_path(project), options).await
    }

    pub async fn get_pages_domain(
        &self,
        project: &str,
        domain: &str,
    ) -> Result<PagesDomain, ApiError> {
        self.get(&domain_path(project, domain)).await
    }

    pub async fn update_pages_domain(
        &self,
        project: &str,
        domain: &str,
        options: &UpdatePagesDomainOptions,
    ) -> Result<PagesDomain, ApiError> {
        self.put(&domain_path(project, domain), options).await
    }

    pub async fn delete_pages_domain(&self, project: &str, domain: &str) -> Result<(), ApiError> {
        self.delete(&domain_path(project, domain)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_options_omit_unset_fields() {
        let options = CreatePagesDomainOptions {
            domain: "example.com".to_string(),
            auto_ssl_enabled: Some(true),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({"domain": "example.com", "auto_ssl_enabled": true})
        );

        let empty = UpdatePagesDomainOptions::default();
        assert_eq!(serde_json::to_value(&empty).unwrap(), json!({}));
    }

    #[test]
    fn test_pages_domain_tolerates_sparse_response() {
        let domain: PagesDomain = serde_json::from_value(json!({
            "domain": "example.com",
            "url": "http://example.com"
        }))
        .unwrap();
        assert!(!domain.verified);
        assert!(domain.certificate.is_none());
    }

    #[test]
    fn test_domain_path_encodes_project_path() {
        assert_eq!(
            domain_path("group/site", "docs.example.com"),
            "projects/group%2Fsite/pages/domains/docs.example.com"
        );
    }
}
