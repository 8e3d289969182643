use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Identity echo stored next to the token. Informational only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    #[serde(rename = "id")]
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub user_type_id: Option<String>,
}

/// Bearer token plus the identity it was issued for.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    identity: UserIdentity,
}

impl Credential {
    pub fn new<S: Into<String>>(token: S, identity: UserIdentity) -> AppResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AppError::unauthenticated("credential token is empty"));
        }
        if !is_header_safe(&token) {
            return Err(AppError::unauthenticated("credential token cannot be sent as a bearer header"));
        }
        if identity.user_id.trim().is_empty() {
            return Err(AppError::unauthenticated("credential user id is empty"));
        }
        Ok(Self { token, identity })
    }

    pub fn token(&self) -> &str { &self.token }
    pub fn identity(&self) -> &UserIdentity { &self.identity }
    pub fn user_id(&self) -> &str { &self.identity.user_id }
    pub fn username(&self) -> &str { &self.identity.username }
}

/// Whether `token` survives `Authorization: Bearer <token>` encoding.
pub(crate) fn is_header_safe(token: &str) -> bool {
    HeaderValue::from_str(&format!("Bearer {token}")).is_ok()
}

// Keep the token out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}
