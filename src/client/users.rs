//! Users API: `/users`, `/users/:id` and the state actions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ApiError, GitlabClient};

const PER_PAGE: &str = "100";
const NEXT_PAGE_HEADER: &str = "x-next-page";

/// A GitLab user as returned to administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub can_create_group: bool,
    #[serde(default)]
    pub can_create_project: bool,
    #[serde(default)]
    pub projects_limit: i64,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub extern_uid: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub namespace_id: Option<i64>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_sign_in_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateUserOptions {
    pub email: String,
    pub username: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_password: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_confirmation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_create_group: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateUserOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reconfirmation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_create_group: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl UpdateUserOptions {
    /// Whether any field would be sent.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Query filters for `GET /users`, sent as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListUsersOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extern_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<String>,
}

impl GitlabClient {
    pub async fn create_user(&self, options: &CreateUserOptions) -> Result<User, ApiError> {
        self.post("users", options).await
    }

    pub async fn get_user(&self, id: i64) -> Result<User, ApiError> {
        self.get(&format!("users/{}", id)).await
    }

    pub async fn update_user(&self, id: i64, options: &UpdateUserOptions) -> Result<User, ApiError> {
        self.put(&format!("users/{}", id), options).await
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("users/{}", id)).await
    }

    pub async fn block_user(&self, id: i64) -> Result<(), ApiError> {
        self.post_action(&format!("users/{}/block", id)).await
    }

    pub async fn unblock_user(&self, id: i64) -> Result<(), ApiError> {
        self.post_action(&format!("users/{}/unblock", id)).await
    }

    pub async fn deactivate_user(&self, id: i64) -> Result<(), ApiError> {
        self.post_action(&format!("users/{}/deactivate", id)).await
    }

    pub async fn activate_user(&self, id: i64) -> Result<(), ApiError> {
        self.post_action(&format!("users/{}/activate", id)).await
    }

    /// List every user matching the filters, following `X-Next-Page`.
    pub async fn list_users(&self, options: &ListUsersOptions) -> Result<Vec<User>, ApiError> {
        let mut users = Vec::new();
        let mut page = "1".to_string();
        let mut seen = HashSet::new();

        loop {
            seen.insert(page.clone());
            let response = self
                .send(reqwest::Method::GET, "users", |req| {
                    req.query(options)
                        .query(&[("per_page", PER_PAGE), ("page", page.as_str())])
                })
                .await?;

            let next_page = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string);

            let batch: Vec<User> = response.json().await?;
            debug!(page = %page, count = batch.len(), "Listed users page");
            users.extend(batch);

            match next_page {
                Some(next) if seen.contains(&next) => {
                    warn!(page = %page, next = %next, "Next page was already listed, stopping");
                    break;
                },
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_user_options_use_api_names() {
        let options = CreateUserOptions {
            email: "jane@example.com".to_string(),
            username: "jane".to_string(),
            name: "Jane".to_string(),
            reset_password: Some(true),
            admin: Some(false),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({
                "email": "jane@example.com",
                "username": "jane",
                "name": "Jane",
                "reset_password": true,
                "admin": false
            })
        );
    }

    #[test]
    fn test_update_user_options_is_empty() {
        assert!(UpdateUserOptions::default().is_empty());
        let options = UpdateUserOptions {
            note: Some("hi".to_string()),
            ..Default::default()
        };
        assert!(!options.is_empty());
    }

    #[test]
    fn test_user_deserializes_admin_view() {
        let user: User = serde_json::from_value(json!({
            "id": 7,
            "username": "jane",
            "email": "jane@example.com",
            "name": "Jane",
            "state": "active",
            "is_admin": true,
            "projects_limit": 10,
            "namespace_id": 12,
            "note": null
        }))
        .unwrap();
        assert_eq!(user.id, 7);
        assert!(user.is_admin);
        assert_eq!(user.namespace_id, Some(12));
        assert!(user.note.is_none());
    }
}
