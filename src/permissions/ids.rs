//! Permission identifiers.
//!
//! Ids are opaque strings of the form `"<resource>.<action>"`. The cache never parses them;
//! only the convenience predicates compose ids from a resource and a fixed action.

use std::fmt;
use std::str::FromStr;

pub const ADMIN_USERS: &str = "admin.users";
pub const ADMIN_ROLES: &str = "admin.roles";
pub const DASHBOARD_VIEW: &str = "dashboard.view";
pub const INVENTORY_READ: &str = "inventory.read";
pub const INVENTORY_WRITE: &str = "inventory.write";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Write,
    Delete,
    Create,
    /// Any other suffix; checked verbatim.
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::Create => "create",
            Action::Other(s) => s.as_str(),
        }
    }
}

impl FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "read" => Action::Read,
            "write" => Action::Write,
            "delete" => Action::Delete,
            "create" => Action::Create,
            other => Action::Other(other.to_string()),
        })
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(a) => a,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

pub fn permission_id(resource: &str, action: &Action) -> String {
    format!("{}.{}", resource, action.as_str())
}

/// Split on the last `.`; both halves must be non-empty.
pub fn split_permission_id(id: &str) -> Option<(&str, &str)> {
    let (resource, action) = id.rsplit_once('.')?;
    if resource.is_empty() || action.is_empty() {
        return None;
    }
    Some((resource, action))
}

pub fn is_well_formed(id: &str) -> bool {
    split_permission_id(id).is_some()
}
