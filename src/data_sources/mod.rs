//! Read-only data sources.

mod users;

pub use users::{UsersDataSource, UsersQuery};

use serde_json::Value;

use crate::client::GitlabClient;
use crate::error::ProviderError;
use crate::schema::{Diagnostic, Schema};
use crate::validation;

/// A data source type exposed by the provider.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Full type name, e.g. `gitlab_users`.
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.schema(), config)
    }

    /// Query the API and return the configuration with computed attributes filled in.
    async fn read(&self, client: &GitlabClient, config: Value) -> Result<Value, ProviderError>;
}

/// Every data source the provider registers.
pub fn all() -> Vec<Box<dyn DataSource>> {
    vec![Box::new(UsersDataSource)]
}
