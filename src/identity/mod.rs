//! Credential handling for the logged-in user.
//! Keep the public surface thin and split implementation across sub-modules.

mod credential;
mod store;

pub use credential::{Credential, UserIdentity};
pub use store::{CredentialBackend, CredentialStore, FileBackend, MemoryBackend, TOKEN_KEY, USER_KEY};
