//! Client-side access layer for the inventory backend: credential storage, the session's
//! permission cache, permission predicates and access gates.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod permissions;
pub mod session;

pub use error::{AppError, AppResult};
