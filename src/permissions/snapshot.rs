use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use super::ids::{self, Action};

/// Where the cache stands. `Loading` means "not yet known", which is different from "known and denied".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PermissionStatus {
    Loading,
    Ready,
    Unauthenticated,
    Failed(String),
}

impl PermissionStatus {
    pub fn is_loading(&self) -> bool { matches!(self, PermissionStatus::Loading) }
}

/// User classification returned next to the permission set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "UserTypeWire")]
pub struct UserType {
    pub id: Option<String>,
    pub label: Option<String>,
    pub level: Option<String>,
}

impl UserType {
    pub fn labelled<S: Into<String>>(label: S) -> Self {
        Self { id: None, label: Some(label.into()), level: None }
    }

    /// Best display name: the label, else the id.
    pub fn name(&self) -> Option<&str> {
        self.label.as_deref().or(self.id.as_deref())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserTypeWire {
    Label(String),
    Record {
        #[serde(default, deserialize_with = "opt_string_or_number")]
        id: Option<String>,
        #[serde(rename = "type", default)]
        label: Option<String>,
        #[serde(rename = "permission", default, deserialize_with = "opt_string_or_number")]
        level: Option<String>,
    },
}

impl From<UserTypeWire> for UserType {
    fn from(w: UserTypeWire) -> Self {
        match w {
            UserTypeWire::Label(label) => UserType::labelled(label),
            UserTypeWire::Record { id, label, level } => UserType { id, label, level },
        }
    }
}

/// Identity echoed by the permission endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub user_type: Option<UserType>,
}

/// Body of a successful permission fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PermissionGrant {
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub user_type: Option<UserType>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl PermissionGrant {
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { permissions: permissions.into_iter().map(Into::into).collect(), ..Default::default() }
    }

    pub fn with_user_type(mut self, user_type: UserType) -> Self {
        self.user_type = Some(user_type);
        self
    }
}

pub(crate) fn opt_string_or_number<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match v {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(other) => return Err(serde::de::Error::custom(format!("expected string or number, got {other}"))),
    })
}

/// Immutable view of the permission state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSnapshot {
    status: PermissionStatus,
    permissions: HashSet<String>,
    user_type: Option<UserType>,
    user_info: Option<UserInfo>,
}

impl PermissionSnapshot {
    pub fn loading() -> Self { Self::empty(PermissionStatus::Loading) }

    pub fn unauthenticated() -> Self { Self::empty(PermissionStatus::Unauthenticated) }

    pub fn failed<S: Into<String>>(reason: S) -> Self { Self::empty(PermissionStatus::Failed(reason.into())) }

    fn empty(status: PermissionStatus) -> Self {
        Self { status, permissions: HashSet::new(), user_type: None, user_info: None }
    }

    pub fn ready(grant: PermissionGrant) -> Self {
        let user_info = UserInfo {
            user_id: grant.user_id,
            username: grant.username,
            user_type: grant.user_type.clone(),
        };
        Self {
            status: PermissionStatus::Ready,
            permissions: grant.permissions.into_iter().collect(),
            user_type: grant.user_type,
            user_info: Some(user_info),
        }
    }

    /// Same data, different status. Used to flag an in-flight refresh.
    pub(crate) fn with_status(&self, status: PermissionStatus) -> Self {
        Self { status, ..self.clone() }
    }

    pub fn status(&self) -> &PermissionStatus { &self.status }
    pub fn is_loading(&self) -> bool { self.status.is_loading() }
    pub fn user_type(&self) -> Option<&UserType> { self.user_type.as_ref() }
    pub fn user_info(&self) -> Option<&UserInfo> { self.user_info.as_ref() }
    pub fn permissions(&self) -> impl Iterator<Item = &str> { self.permissions.iter().map(String::as_str) }
    pub fn len(&self) -> usize { self.permissions.len() }
    pub fn is_empty(&self) -> bool { self.permissions.is_empty() }

    pub fn has_permission(&self, id: &str) -> bool { self.permissions.contains(id) }

    fn can(&self, resource: &str, action: Action) -> bool {
        self.has_permission(&ids::permission_id(resource, &action))
    }

    pub fn can_read(&self, resource: &str) -> bool { self.can(resource, Action::Read) }
    pub fn can_write(&self, resource: &str) -> bool { self.can(resource, Action::Write) }
    pub fn can_delete(&self, resource: &str) -> bool { self.can(resource, Action::Delete) }
    pub fn can_create(&self, resource: &str) -> bool { self.can(resource, Action::Create) }

    pub fn is_admin(&self) -> bool {
        self.has_permission(ids::ADMIN_USERS) || self.has_permission(ids::ADMIN_ROLES)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        ids.iter().any(|p| self.has_permission(p.as_ref()))
    }

    pub fn has_all_permissions<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        ids.iter().all(|p| self.has_permission(p.as_ref()))
    }

    pub fn can_manage_users(&self) -> bool { self.has_permission(ids::ADMIN_USERS) }
    pub fn can_manage_roles(&self) -> bool { self.has_permission(ids::ADMIN_ROLES) }
    pub fn can_access_dashboard(&self) -> bool { self.has_permission(ids::DASHBOARD_VIEW) }
    pub fn can_manage_inventory(&self) -> bool { self.has_permission(ids::INVENTORY_WRITE) }
    pub fn can_view_inventory(&self) -> bool { self.has_permission(ids::INVENTORY_READ) }
}

impl Default for PermissionSnapshot {
    fn default() -> Self { Self::loading() }
}
