//! Permission resolution and access gating.
//!
//! [`PermissionCache`] owns the session's permission set, [`PermissionSnapshot`] answers
//! predicates against it, and [`AccessGate`]/[`GateWatcher`] turn those answers into
//! render decisions.

pub mod ids;
mod cache;
mod gate;
pub(crate) mod snapshot;

pub use cache::{PermissionCache, PermissionSource};
pub use gate::{AccessGate, GateState, GateWatcher, Requirement};
pub use ids::Action;
pub use snapshot::{PermissionGrant, PermissionSnapshot, PermissionStatus, UserInfo, UserType};
