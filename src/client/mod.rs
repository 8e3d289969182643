//! Shared request layer for the REST backend.

mod api;
mod source;

pub use api::{is_auth_rejection, ApiClient, AuthExpired, LOGIN_ENDPOINT};
pub use source::{HttpPermissionSource, PERMISSIONS_ENDPOINT};
