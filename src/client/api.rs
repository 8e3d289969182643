use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::identity::{Credential, CredentialStore, UserIdentity};
use crate::permissions::snapshot::opt_string_or_number;

pub const LOGIN_ENDPOINT: &str = "/auth/login";

/// Raised once per rejected authenticated call. The session root listens for it and logs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthExpired {
    pub status: u16,
    pub method: String,
    pub endpoint: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    user_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    user_type_id: Option<String>,
}

/// Shared request layer. Every call to the backend goes through [`ApiClient::request`], which
/// attaches the bearer token and turns 401/422 on authenticated calls into session teardown.
#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    client: reqwest::Client,
    store: Arc<CredentialStore>,
    expired: broadcast::Sender<AuthExpired>,
}

impl ApiClient {
    pub fn new(config: &Config, store: Arc<CredentialStore>) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = config.request_timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build()?;
        Ok(Self::with_client(config.api_url.clone(), client, store))
    }

    pub fn with_client(mut base: Url, client: reqwest::Client, store: Arc<CredentialStore>) -> Self {
        // join() replaces the last segment unless the base ends with '/'
        if !base.path().ends_with('/') {
            let p = format!("{}/", base.path());
            base.set_path(&p);
        }
        let (expired, _) = broadcast::channel(16);
        Self { base, client, store, expired }
    }

    pub fn base(&self) -> &Url { &self.base }

    pub fn credentials(&self) -> &Arc<CredentialStore> { &self.store }

    pub fn subscribe_expired(&self) -> broadcast::Receiver<AuthExpired> { self.expired.subscribe() }

    pub fn url(&self, endpoint: &str) -> AppResult<Url> {
        self.base
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| AppError::config("invalid_endpoint".to_string(), format!("{endpoint}: {e}")))
    }

    /// Send one request. `bearer` set means the call is authenticated and subject to the
    /// expiry interceptor.
    pub async fn request<B>(&self, method: Method, endpoint: &str, body: Option<&B>, bearer: Option<&str>) -> AppResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(endpoint)?;
        let mut req = self.client.request(method.clone(), url);
        if let Some(token) = bearer {
            let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) else {
                warn!("api.{} {} stored token is not a valid header value; clearing session", method, endpoint);
                self.store.clear();
                return Err(AppError::stale("token is not a valid header value"));
            };
            req = req.header(AUTHORIZATION, value);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req.send().await.map_err(|e| {
            warn!("api.{} {} transport failure: {}", method, endpoint, e);
            AppError::from(e)
        })?;
        let status = resp.status();
        debug!("api.{} {} status={}", method, endpoint, status.as_u16());

        if bearer.is_some() && is_auth_rejection(status) {
            self.expire(status, &method, endpoint);
            return Err(AppError::expired(status.as_u16()));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::http(status.as_u16(), format!("{method} {endpoint} failed: {}", text.trim())));
        }
        Ok(resp)
    }

    /// Like [`request`](Self::request) but resolves the bearer from the credential store when `auth` is set.
    pub async fn send<B>(&self, method: Method, endpoint: &str, body: Option<&B>, auth: bool) -> AppResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let token = if auth { self.store.token() } else { None };
        if auth && token.is_none() {
            debug!("api.{} {} sent without credential", method, endpoint);
        }
        self.request(method, endpoint, body, token.as_deref()).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, auth: bool) -> AppResult<T> {
        let resp = self.send::<()>(Method::GET, endpoint, None, auth).await?;
        decode(resp).await
    }

    pub async fn post_json<B, T>(&self, endpoint: &str, body: &B, auth: bool) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.send(Method::POST, endpoint, Some(body), auth).await?;
        decode(resp).await
    }

    pub async fn put_json<B, T>(&self, endpoint: &str, body: &B, auth: bool) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.send(Method::PUT, endpoint, Some(body), auth).await?;
        decode(resp).await
    }

    pub async fn delete(&self, endpoint: &str, auth: bool) -> AppResult<()> {
        self.send::<()>(Method::DELETE, endpoint, None, auth).await?;
        Ok(())
    }

    /// POST /auth/login and store the resulting credential.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<Credential> {
        let body = serde_json::json!({"username": username, "password": password});
        let resp = match self.send(Method::POST, LOGIN_ENDPOINT, Some(&body), false).await {
            Ok(r) => r,
            Err(AppError::Http { status, .. }) if status == 401 || status == 403 => {
                return Err(AppError::unauthenticated(format!("login rejected for '{username}'")));
            }
            Err(e) => return Err(e),
        };
        let lr: LoginResponse = decode(resp).await?;
        let identity = UserIdentity {
            user_id: lr.user_id.unwrap_or_default(),
            username: lr.username.unwrap_or_else(|| username.to_string()),
            user_type_id: lr.user_type_id,
        };
        let credential = Credential::new(lr.access_token, identity)
            .map_err(|e| AppError::decode(format!("login response incomplete: {}", e.message())))?;
        self.store.set(&credential)?;
        debug!("api.login user={}", credential.username());
        Ok(credential)
    }

    fn expire(&self, status: StatusCode, method: &Method, endpoint: &str) {
        warn!("api.{} {} rejected credential status={}; clearing session", method, endpoint, status.as_u16());
        self.store.clear();
        // no receiver just means nobody is listening yet
        let _ = self.expired.send(AuthExpired {
            status: status.as_u16(),
            method: method.to_string(),
            endpoint: endpoint.to_string(),
        });
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base", &self.base.as_str()).finish_non_exhaustive()
    }
}

pub fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::UNPROCESSABLE_ENTITY
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> AppResult<T> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| AppError::decode(format!("unexpected response body: {e}")))
}
