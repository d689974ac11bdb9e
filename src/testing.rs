//! Helpers for exercising a [`ProviderService`] without a gRPC server.
//!
//! ```ignore
//! use gitlab_provider::testing::ProviderTester;
//! use gitlab_provider::GitlabProvider;
//! use serde_json::json;
//!
//! let tester = ProviderTester::new(GitlabProvider::new());
//! tester.configure(json!({"token": "glpat-x", "base_url": server.base_url()})).await?;
//! let state = tester
//!     .lifecycle_create("gitlab_pages_domain", json!({"project": "42", "domain": "example.com"}))
//!     .await?;
//! ```

use serde_json::Value;
use thiserror::Error;

use crate::error::ProviderError;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// Drives a provider through the same calls the host would make.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider; error diagnostics become [`TestError::Diagnostics`].
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, config.clone(), config)
            .await
    }

    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), config.clone(), config)
            .await
    }

    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read_data_source(data_source_type, config).await
    }

    /// validate → plan → create → read. Returns the refreshed state.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, config.clone())
            .await?;
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created)
            .await?
            .ok_or(TestError::Gone)
    }

    /// validate → plan → update → read. Returns the refreshed state.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, config.clone())
            .await?;
        let plan = self
            .plan_update(resource_type, prior_state.clone(), config)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated)
            .await?
            .ok_or(TestError::Gone)
    }

    /// plan destroy → delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), TestError> {
        self.plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await?;
        Ok(())
    }

    /// Import by ID and refresh, the way the host completes an import.
    pub async fn import_and_read(&self, resource_type: &str, id: &str) -> Result<Value, TestError> {
        let imported = self.import_resource(resource_type, id).await?;
        let Some(first) = imported.into_iter().next() else {
            return Err(TestError::Gone);
        };
        self.read(&first.resource_type, first.state)
            .await?
            .ok_or(TestError::Gone)
    }
}

/// Failure of a tester operation.
#[derive(Debug, Error)]
pub enum TestError {
    /// The operation returned error diagnostics.
    #[error("operation failed with diagnostics: {}", format_diagnostics(.0))]
    Diagnostics(Vec<Diagnostic>),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A read reported the object as gone.
    #[error("resource no longer exists")]
    Gone,
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| {
            let mut line = d.summary.clone();
            if let Some(detail) = &d.detail {
                line.push_str(": ");
                line.push_str(detail);
            }
            if let Some(attr) = &d.attribute {
                line.push_str(&format!(" (at {})", attr));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Panics unless the plan has changes and no replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty() && !plan.requires_replace,
        "Expected an in-place update, got {} change(s), requires_replace = {}",
        plan.changes.len(),
        plan.requires_replace
    );
}

pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Panics unless some error diagnostic's summary contains `substring`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.summary.contains(substring)),
        "Expected an error containing '{}', got: {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::plan_resource;
    use crate::schema::{Attribute, Schema};
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Keeps objects in memory, keyed by `name`.
    #[derive(Default)]
    struct MemoryProvider {
        objects: Mutex<HashMap<String, Value>>,
    }

    fn widget_schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string().with_use_state_for_unknown())
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("size", Attribute::optional_int64().with_default(json!(1)))
    }

    #[async_trait::async_trait]
    impl ProviderService for MemoryProvider {
        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new().with_resource("memory_widget", widget_schema())
        }

        async fn configure(&self, _config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
            Ok(vec![])
        }

        async fn validate_resource_config(
            &self,
            _resource_type: &str,
            config: Value,
        ) -> Result<Vec<Diagnostic>, ProviderError> {
            Ok(crate::validation::validate(&widget_schema(), &config))
        }

        async fn plan(
            &self,
            _resource_type: &str,
            prior_state: Option<Value>,
            proposed_state: Value,
            _config: Value,
        ) -> Result<PlanResult, ProviderError> {
            Ok(plan_resource(&widget_schema(), prior_state.as_ref(), &proposed_state))
        }

        async fn create(&self, _resource_type: &str, mut planned: Value) -> Result<Value, ProviderError> {
            let name = planned["name"].as_str().unwrap_or_default().to_string();
            planned["id"] = json!(name);
            self.objects.lock().await.insert(name, planned.clone());
            Ok(planned)
        }

        async fn read(&self, _resource_type: &str, current: Value) -> Result<Option<Value>, ProviderError> {
            let id = current["id"].as_str().unwrap_or_default();
            Ok(self.objects.lock().await.get(id).cloned())
        }

        async fn update(
            &self,
            _resource_type: &str,
            _prior: Value,
            planned: Value,
        ) -> Result<Value, ProviderError> {
            let id = planned["id"].as_str().unwrap_or_default().to_string();
            self.objects.lock().await.insert(id, planned.clone());
            Ok(planned)
        }

        async fn delete(&self, _resource_type: &str, current: Value) -> Result<(), ProviderError> {
            let id = current["id"].as_str().unwrap_or_default();
            self.objects.lock().await.remove(id);
            Ok(())
        }

        async fn import_resource(
            &self,
            resource_type: &str,
            id: &str,
        ) -> Result<Vec<ImportedResource>, ProviderError> {
            Ok(vec![ImportedResource::new(resource_type, json!({"id": id}))])
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let tester = ProviderTester::new(MemoryProvider::default());
        tester.configure(json!({})).await.unwrap();
        assert_eq!(tester.resource_types(), vec!["memory_widget"]);

        let state = tester
            .lifecycle_create("memory_widget", json!({"name": "w1"}))
            .await
            .unwrap();
        assert_eq!(state, json!({"id": "w1", "name": "w1", "size": 1}));

        let plan = tester
            .plan_update("memory_widget", state.clone(), json!({"name": "w1", "size": 3}))
            .await
            .unwrap();
        assert_plan_updates_in_place(&plan);
        assert_plan_changes_attribute(&plan, "size");

        let state = tester
            .lifecycle_update("memory_widget", state, json!({"name": "w1", "size": 3}))
            .await
            .unwrap();
        assert_eq!(state["size"], 3);

        let imported = tester.import_and_read("memory_widget", "w1").await.unwrap();
        assert_eq!(imported, state);

        tester.lifecycle_delete("memory_widget", state.clone()).await.unwrap();
        assert!(tester.read("memory_widget", state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_plan_helpers() {
        let tester = ProviderTester::new(MemoryProvider::default());
        let prior = json!({"id": "w1", "name": "w1", "size": 1});

        let plan = tester.plan_create("memory_widget", json!({"name": "w1"})).await.unwrap();
        assert_plan_creates(&plan);

        let plan = tester
            .plan_update("memory_widget", prior.clone(), json!({"name": "w1"}))
            .await
            .unwrap();
        assert_plan_no_changes(&plan);

        let plan = tester
            .plan_update("memory_widget", prior, json!({"name": "w2"}))
            .await
            .unwrap();
        assert_plan_replaces(&plan);
    }

    #[tokio::test]
    async fn test_lifecycle_create_reports_validation() {
        let tester = ProviderTester::new(MemoryProvider::default());
        let err = tester
            .lifecycle_create("memory_widget", json!({"size": 2}))
            .await
            .unwrap_err();
        match err {
            TestError::Diagnostics(diagnostics) => {
                assert_error_contains(&diagnostics, "Missing required attribute 'name'")
            },
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_assert_no_errors() {
        assert_no_errors(&[Diagnostic::warning("Just a warning")]);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("An error")]);
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("field1"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = err.to_string();
        assert!(display.contains("First error (at field1)"));
        assert!(display.contains("Second error: More info"));
    }
}
