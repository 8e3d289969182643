use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use super::api::ApiClient;
use crate::error::{AppError, AppResult};
use crate::permissions::{PermissionGrant, PermissionSource};

pub const PERMISSIONS_ENDPOINT: &str = "/api/auth/permissions";

/// Reads the current user's permission set from the backend.
#[derive(Debug, Clone)]
pub struct HttpPermissionSource {
    api: ApiClient,
    endpoint: String,
}

impl HttpPermissionSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api, endpoint: PERMISSIONS_ENDPOINT.to_string() }
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl PermissionSource for HttpPermissionSource {
    async fn fetch(&self, token: &str) -> AppResult<PermissionGrant> {
        let resp = self
            .api
            .request::<()>(Method::GET, &self.endpoint, None, Some(token))
            .await
            .map_err(AppError::into_fetch_failure)?;
        let bytes = resp.bytes().await.map_err(|e| AppError::from(e).into_fetch_failure())?;
        let grant: PermissionGrant = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::fetch_failed("decode_error".to_string(), format!("malformed permission body: {e}")))?;
        debug!("permissions.source fetched count={}", grant.permissions.len());
        Ok(grant)
    }
}
