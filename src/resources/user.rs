//! `gitlab_user`: user accounts. Requires an administrator token.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{from_state, lenient_int64, Resource};
use crate::client::{ApiError, CreateUserOptions, GitlabClient, UpdateUserOptions, User};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

const ID_FORMAT: &str = "<user id>";
const PASSWORD_GROUP: &[&str] = &["password", "reset_password"];

const ACTIVE: &str = "active";
const BLOCKED: &str = "blocked";
const DEACTIVATED: &str = "deactivated";

/// State model for `gitlab_user`.
///
/// `password`, `reset_password` and `skip_confirmation` are never returned by
/// the API; reads keep whatever the state already holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserModel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub reset_password: Option<bool>,
    #[serde(default)]
    pub skip_confirmation: Option<bool>,
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub can_create_group: Option<bool>,
    #[serde(default)]
    pub is_external: Option<bool>,
    #[serde(default, deserialize_with = "lenient_int64")]
    pub projects_limit: Option<i64>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_int64")]
    pub namespace_id: Option<i64>,
}

impl UserModel {
    fn user_id(&self) -> Result<i64, ProviderError> {
        let id = self.id.as_deref().unwrap_or_default();
        id.parse().map_err(|e: std::num::ParseIntError| ProviderError::InvalidId {
            id: id.to_string(),
            expected: ID_FORMAT,
            reason: e.to_string(),
        })
    }

    fn desired_state(&self) -> &str {
        self.state.as_deref().unwrap_or(ACTIVE)
    }

    fn apply(&mut self, user: &User) {
        self.id = Some(user.id.to_string());
        self.name = user.name.clone();
        self.username = user.username.clone();
        self.email = user.email.clone();
        self.is_admin = Some(user.is_admin);
        self.can_create_group = Some(user.can_create_group);
        self.is_external = Some(user.external);
        self.projects_limit = Some(user.projects_limit);
        self.note = user.note.clone().filter(|note| !note.is_empty());
        self.state = Some(user.state.clone());
        self.namespace_id = user.namespace_id;
    }

    fn create_options(&self) -> CreateUserOptions {
        CreateUserOptions {
            email: self.email.clone(),
            username: self.username.clone(),
            name: self.name.clone(),
            password: self.password.clone(),
            reset_password: self.reset_password,
            skip_confirmation: self.skip_confirmation,
            admin: self.is_admin,
            can_create_group: self.can_create_group,
            projects_limit: self.projects_limit,
            external: self.is_external,
            note: self.note.clone(),
        }
    }

    /// Only the profile fields that differ from `prior`.
    fn update_options(&self, prior: &UserModel) -> UpdateUserOptions {
        let email_changed = self.email != prior.email;
        UpdateUserOptions {
            email: email_changed.then(|| self.email.clone()),
            username: (self.username != prior.username).then(|| self.username.clone()),
            name: (self.name != prior.name).then(|| self.name.clone()),
            skip_reconfirmation: email_changed.then(|| self.skip_confirmation.unwrap_or(true)),
            admin: changed(&self.is_admin, &prior.is_admin),
            can_create_group: changed(&self.can_create_group, &prior.can_create_group),
            projects_limit: changed(&self.projects_limit, &prior.projects_limit),
            external: changed(&self.is_external, &prior.is_external),
            // Clearing the note sends an empty string.
            note: (self.note != prior.note).then(|| self.note.clone().unwrap_or_default()),
        }
    }
}

fn changed<T: PartialEq + Copy>(new: &Option<T>, old: &Option<T>) -> Option<T> {
    if new != old {
        *new
    } else {
        None
    }
}

/// Move a user between `active`, `blocked` and `deactivated`.
///
/// Returns the state the user is in afterwards. States GitLab manages on its
/// own (`ldap_blocked`, `blocked_pending_approval`) cannot be activated here
/// and are returned unchanged.
async fn transition_state(
    client: &GitlabClient,
    id: i64,
    from: &str,
    to: &str,
) -> Result<String, ApiError> {
    if from == to {
        return Ok(to.to_string());
    }
    debug!(user_id = id, from, to, "changing user state");

    match (from, to) {
        (BLOCKED, ACTIVE) => client.unblock_user(id).await?,
        (DEACTIVATED, ACTIVE) => client.activate_user(id).await?,
        (_, BLOCKED) => client.block_user(id).await?,
        (BLOCKED, DEACTIVATED) => {
            client.unblock_user(id).await?;
            client.deactivate_user(id).await?
        },
        (_, DEACTIVATED) => client.deactivate_user(id).await?,
        _ => {
            warn!(user_id = id, from, to, "user state can't be changed by the provider");
            return Ok(from.to_string());
        },
    }
    Ok(to.to_string())
}

/// The `gitlab_user` resource.
pub struct UserResource;

#[async_trait::async_trait]
impl Resource for UserResource {
    fn type_name(&self) -> &'static str {
        "gitlab_user"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "Manages the lifecycle of a user. Requires administrator privileges. \
                 Upstream API: https://docs.gitlab.com/ee/api/users.html",
            )
            .with_attribute(
                "id",
                Attribute::computed_string()
                    .with_use_state_for_unknown()
                    .with_description("The ID of the user."),
            )
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the user."),
            )
            .with_attribute(
                "username",
                Attribute::required_string().with_description("The username of the user."),
            )
            .with_attribute(
                "email",
                Attribute::required_string()
                    .with_description("The e-mail address of the user."),
            )
            .with_attribute(
                "password",
                Attribute::optional_string()
                    .sensitive()
                    .at_least_one_of(PASSWORD_GROUP)
                    .with_description("The password of the user."),
            )
            .with_attribute(
                "reset_password",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .at_least_one_of(PASSWORD_GROUP)
                    .with_description("Send user password reset link."),
            )
            .with_attribute(
                "skip_confirmation",
                Attribute::optional_bool()
                    .with_default(json!(true))
                    .with_description("Whether to skip confirmation."),
            )
            .with_attribute(
                "is_admin",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description("Boolean, defaults to false. Whether to enable administrative privileges"),
            )
            .with_attribute(
                "can_create_group",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description("Boolean, defaults to false. Whether to allow the user to create groups."),
            )
            .with_attribute(
                "is_external",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description("Boolean, defaults to false. Whether a user has access only to some internal or private projects."),
            )
            .with_attribute(
                "projects_limit",
                Attribute::optional_int64()
                    .with_default(json!(0))
                    .with_description("Integer, defaults to 0. Number of projects user can create."),
            )
            .with_attribute(
                "note",
                Attribute::optional_string().with_description("The note associated to the user."),
            )
            .with_attribute(
                "state",
                Attribute::optional_string()
                    .with_default(json!(ACTIVE))
                    .one_of(&[ACTIVE, BLOCKED, DEACTIVATED])
                    .with_description("String, defaults to 'active'. The state of the user account."),
            )
            .with_attribute(
                "namespace_id",
                Attribute::computed_int64()
                    .with_use_state_for_unknown()
                    .with_description("The ID of the user's namespace."),
            )
    }

    async fn create(&self, client: &GitlabClient, planned: Value) -> Result<Value, ProviderError> {
        let mut model: UserModel = from_state(planned)?;
        let desired = model.desired_state().to_string();

        let user = client
            .create_user(&model.create_options())
            .await
            .map_err(|e| ProviderError::api("Error creating user", e))?;
        debug!(user_id = user.id, username = %user.username, "created user");

        model.apply(&user);
        match transition_state(client, user.id, &user.state, &desired).await {
            Ok(state) => {
                model.state = Some(state);
                Ok(serde_json::to_value(model)?)
            },
            // The user exists now; hand its state back with the error so it stays tracked.
            Err(e) => Err(ProviderError::incomplete(
                serde_json::to_value(model)?,
                ProviderError::api(format!("Error changing state of user {} to {}", user.id, desired), e),
            )),
        }
    }

    async fn read(
        &self,
        client: &GitlabClient,
        current: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let mut model: UserModel = from_state(current)?;
        let id = model.user_id()?;

        match client.get_user(id).await {
            Ok(user) => {
                model.apply(&user);
                Ok(Some(serde_json::to_value(model)?))
            },
            Err(e) if e.is_not_found() => {
                warn!(user_id = id, "user doesn't exist, removing from state");
                Ok(None)
            },
            Err(e) => Err(ProviderError::api("Unable to read user details", e)),
        }
    }

    async fn update(
        &self,
        client: &GitlabClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: UserModel = from_state(prior)?;
        let mut model: UserModel = from_state(planned)?;
        let id = prior.user_id()?;
        model.id = prior.id.clone();
        let desired = model.desired_state().to_string();

        let options = model.update_options(&prior);
        if !options.is_empty() {
            let user = client
                .update_user(id, &options)
                .await
                .map_err(|e| ProviderError::api(format!("Error updating user {}", id), e))?;
            debug!(user_id = id, "updated user");
            model.apply(&user);
        }

        match transition_state(client, id, prior.desired_state(), &desired).await {
            Ok(state) => {
                model.state = Some(state);
                Ok(serde_json::to_value(model)?)
            },
            Err(e) => {
                model.state = prior.state.clone();
                Err(ProviderError::incomplete(
                    serde_json::to_value(model)?,
                    ProviderError::api(format!("Error changing state of user {} to {}", id, desired), e),
                ))
            },
        }
    }

    async fn delete(&self, client: &GitlabClient, current: Value) -> Result<(), ProviderError> {
        let model: UserModel = from_state(current)?;
        let id = model.user_id()?;

        match client.delete_user(id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(user_id = id, "user already deleted");
                Ok(())
            },
            Err(e) => Err(ProviderError::api(format!("Error deleting user {}", id), e)),
        }
    }

    fn import(&self, id: &str) -> Result<Value, ProviderError> {
        Ok(json!({
            "id": id,
            "reset_password": false,
            "skip_confirmation": true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> UserModel {
        UserModel {
            id: Some("7".to_string()),
            name: "Jane".to_string(),
            username: "jane".to_string(),
            email: "jane@example.com".to_string(),
            password: Some("secret123".to_string()),
            reset_password: Some(false),
            skip_confirmation: Some(true),
            is_admin: Some(false),
            can_create_group: Some(false),
            is_external: Some(false),
            projects_limit: Some(0),
            note: None,
            state: Some(ACTIVE.to_string()),
            namespace_id: Some(12),
        }
    }

    #[test]
    fn test_user_id_must_be_numeric() {
        assert_eq!(model().user_id().unwrap(), 7);

        let bad = UserModel {
            id: Some("jane".to_string()),
            ..model()
        };
        let err = bad.user_id().unwrap_err();
        assert!(matches!(err, ProviderError::InvalidId { expected: "<user id>", .. }));
        assert_eq!(err.to_diagnostic().summary, "Invalid resource ID format");
    }

    #[test]
    fn test_update_options_only_changed_fields() {
        let prior = model();
        assert!(model().update_options(&prior).is_empty());

        let planned = UserModel {
            email: "jane@corp.example".to_string(),
            projects_limit: Some(10),
            note: Some("ops".to_string()),
            ..model()
        };
        let options = planned.update_options(&prior);
        assert_eq!(options.email.as_deref(), Some("jane@corp.example"));
        assert_eq!(options.skip_reconfirmation, Some(true));
        assert_eq!(options.projects_limit, Some(10));
        assert_eq!(options.note.as_deref(), Some("ops"));
        assert!(options.name.is_none());
        assert!(options.admin.is_none());
    }

    #[test]
    fn test_clearing_note_sends_empty_string() {
        let prior = UserModel {
            note: Some("ops".to_string()),
            ..model()
        };
        let options = model().update_options(&prior);
        assert_eq!(options.note.as_deref(), Some(""));
    }

    #[test]
    fn test_apply_keeps_write_only_attributes() {
        let user: User = serde_json::from_value(json!({
            "id": 7,
            "username": "jane",
            "email": "jane@example.com",
            "name": "Jane Doe",
            "state": "blocked",
            "projects_limit": 5,
            "external": true,
            "note": ""
        }))
        .unwrap();

        let mut state = model();
        state.apply(&user);
        assert_eq!(state.name, "Jane Doe");
        assert_eq!(state.state.as_deref(), Some(BLOCKED));
        assert_eq!(state.is_external, Some(true));
        assert_eq!(state.projects_limit, Some(5));
        assert!(state.note.is_none());
        assert_eq!(state.password.as_deref(), Some("secret123"));
        assert_eq!(state.skip_confirmation, Some(true));
    }

    #[test]
    fn test_import_sets_write_only_defaults() {
        let state = UserResource.import("42").unwrap();
        assert_eq!(state, json!({"id": "42", "reset_password": false, "skip_confirmation": true}));
    }

    #[test]
    fn test_schema_requires_password_or_reset() {
        let diagnostics = UserResource.validate(&json!({
            "name": "Jane",
            "username": "jane",
            "email": "jane@example.com"
        }));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].summary,
            "At least one of either password or reset_password must be defined"
        );

        let diagnostics = UserResource.validate(&json!({
            "name": "Jane",
            "username": "jane",
            "email": "jane@example.com",
            "reset_password": true,
            "state": "banned"
        }));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("state"));
    }

    #[test]
    fn test_projects_limit_accepts_integral_float() {
        let model: UserModel = from_state(json!({"id": "1", "projects_limit": 10.0})).unwrap();
        assert_eq!(model.projects_limit, Some(10));
        assert!(from_state::<UserModel>(json!({"projects_limit": 1.5})).is_err());
    }
}
