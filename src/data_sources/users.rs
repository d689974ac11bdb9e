//! `gitlab_users`: search users, collecting every page.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::DataSource;
use crate::client::{GitlabClient, ListUsersOptions};
use crate::error::ProviderError;
use crate::resources::from_state;
use crate::schema::{Attribute, AttributeType, Schema};

/// Filters accepted by `gitlab_users`, plus the computed outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsersQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub blocked: Option<bool>,
    #[serde(default)]
    pub extern_uid: Option<String>,
    #[serde(default)]
    pub extern_provider: Option<String>,
    #[serde(default)]
    pub created_before: Option<String>,
    #[serde(default)]
    pub created_after: Option<String>,
}

impl UsersQuery {
    fn list_options(&self) -> ListUsersOptions {
        ListUsersOptions {
            search: self.search.clone(),
            active: self.active,
            blocked: self.blocked,
            extern_uid: self.extern_uid.clone(),
            provider: self.extern_provider.clone(),
            order_by: self.order_by.clone(),
            sort: self.sort.clone(),
            created_before: self.created_before.clone(),
            created_after: self.created_after.clone(),
        }
    }

    /// Stable ID for a query: the same filters always give the same ID.
    pub fn id(&self) -> Result<String, ProviderError> {
        let canonical = serde_json::to_vec(&self.list_options())?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }
}

fn user_object_type() -> AttributeType {
    use AttributeType::{Bool, Int64, String};

    AttributeType::object([
        ("id", Int64),
        ("username", String),
        ("email", String),
        ("name", String),
        ("state", String),
        ("is_admin", Bool),
        ("can_create_group", Bool),
        ("can_create_project", Bool),
        ("projects_limit", Int64),
        ("external", Bool),
        ("extern_uid", String),
        ("provider", String),
        ("note", String),
        ("namespace_id", Int64),
        ("organization", String),
        ("website_url", String),
        ("avatar_url", String),
        ("bio", String),
        ("location", String),
        ("created_at", String),
        ("last_sign_in_at", String),
    ])
}

/// The `gitlab_users` data source.
pub struct UsersDataSource;

#[async_trait::async_trait]
impl DataSource for UsersDataSource {
    fn type_name(&self) -> &'static str {
        "gitlab_users"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "Retrieves information about GitLab users. Some attributes require \
                 administrator privileges. Upstream API: https://docs.gitlab.com/ee/api/users.html#list-users",
            )
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "search",
                Attribute::optional_string()
                    .with_description("Search users by username, name or email."),
            )
            .with_attribute(
                "order_by",
                Attribute::optional_string()
                    .one_of(&["id", "name", "username", "created_at", "updated_at"])
                    .with_description("Order the users' list by `id`, `name`, `username`, `created_at` or `updated_at`."),
            )
            .with_attribute(
                "sort",
                Attribute::optional_string()
                    .one_of(&["asc", "desc"])
                    .with_description("Sort users' list in asc or desc order."),
            )
            .with_attribute(
                "active",
                Attribute::optional_bool().with_description("Filter users that are active."),
            )
            .with_attribute(
                "blocked",
                Attribute::optional_bool().with_description("Filter users that are blocked."),
            )
            .with_attribute(
                "extern_uid",
                Attribute::optional_string()
                    .with_description("Lookup users by external UID. (Requires administrator privileges)"),
            )
            .with_attribute(
                "extern_provider",
                Attribute::optional_string()
                    .with_description("Lookup users by external provider. (Requires administrator privileges)"),
            )
            .with_attribute(
                "created_before",
                Attribute::optional_string()
                    .with_description("Search for users created before a specific date. (Requires administrator privileges)"),
            )
            .with_attribute(
                "created_after",
                Attribute::optional_string()
                    .with_description("Search for users created after a specific date. (Requires administrator privileges)"),
            )
            .with_attribute(
                "users",
                Attribute::computed_list(user_object_type())
                    .with_description("The list of users."),
            )
    }

    async fn read(&self, client: &GitlabClient, config: Value) -> Result<Value, ProviderError> {
        let query: UsersQuery = from_state(config.clone())?;

        let users = client
            .list_users(&query.list_options())
            .await
            .map_err(|e| ProviderError::api("Unable to list users", e))?;
        debug!(count = users.len(), "read gitlab_users");

        let mut state = match config {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        state.insert("id".to_string(), Value::String(query.id()?));
        state.insert("users".to_string(), serde_json::to_value(users)?);
        Ok(Value::Object(state))
    }
}
