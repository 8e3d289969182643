//! Composition root: one credential store, one permission cache and one request layer per
//! session, built once and handed to whatever renders the UI.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::{ApiClient, HttpPermissionSource};
use crate::config::Config;
use crate::error::AppResult;
use crate::identity::{Credential, CredentialStore};
use crate::permissions::{GateWatcher, PermissionCache, PermissionSnapshot, PermissionSource, Requirement};

pub struct AccessContext {
    store: Arc<CredentialStore>,
    cache: Arc<PermissionCache>,
    api: ApiClient,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl AccessContext {
    /// File-backed credentials under `config.session_dir`, permissions over HTTP.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let store = Arc::new(CredentialStore::on_disk(config.session_dir.clone()));
        let api = ApiClient::new(config, store.clone())?;
        let source = Arc::new(HttpPermissionSource::new(api.clone()));
        Ok(Self::new(store, api, source))
    }

    pub fn new(store: Arc<CredentialStore>, api: ApiClient, source: Arc<dyn PermissionSource>) -> Self {
        let cache = Arc::new(PermissionCache::new(store.clone(), source));
        Self { store, cache, api, listener: Mutex::new(None) }
    }

    pub fn store(&self) -> &Arc<CredentialStore> { &self.store }
    pub fn cache(&self) -> &Arc<PermissionCache> { &self.cache }
    pub fn api(&self) -> &ApiClient { &self.api }

    pub fn snapshot(&self) -> Arc<PermissionSnapshot> { self.cache.snapshot() }

    pub fn gate(&self, requirement: Requirement) -> GateWatcher {
        GateWatcher::new(requirement, self.cache.subscribe())
    }

    /// Log in and load permissions. A permission failure does not undo the login; it shows
    /// up as a `Failed` status on the snapshot so the host can offer a retry.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<Credential> {
        let credential = self.api.login(username, password).await?;
        info!("session.login user={}", credential.username());
        if let Err(e) = self.cache.initialize().await {
            warn!("session.login permissions unavailable: {}", e);
        }
        Ok(credential)
    }

    /// Resume a persisted session, if any.
    pub async fn resume(&self) -> AppResult<()> {
        self.cache.initialize().await
    }

    pub fn logout(&self) {
        self.store.clear();
        self.cache.clear();
        info!("session.logout");
    }

    /// Consume expiry signals from the request layer and tear the session down. Idempotent:
    /// a second call returns without starting another listener.
    pub fn spawn_expiry_listener(&self) {
        let mut slot = self.listener.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let mut rx = self.api.subscribe_expired();
        let store: Weak<CredentialStore> = Arc::downgrade(&self.store);
        let cache: Weak<PermissionCache> = Arc::downgrade(&self.cache);
        *slot = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => {
                        warn!("session.expired status={} via {} {}; logging out", ev.status, ev.method, ev.endpoint);
                    }
                    // missed signals were still expiries
                    Err(RecvError::Lagged(n)) => warn!("session.expired ({} signals coalesced); logging out", n),
                    Err(RecvError::Closed) => break,
                }
                let (Some(store), Some(cache)) = (store.upgrade(), cache.upgrade()) else { break };
                store.clear();
                cache.clear();
            }
        }));
    }
}

impl Drop for AccessContext {
    fn drop(&mut self) {
        self.cache.shutdown();
        if let Some(h) = self.listener.lock().take() {
            h.abort();
        }
    }
}

impl std::fmt::Debug for AccessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessContext")
            .field("api", &self.api)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
