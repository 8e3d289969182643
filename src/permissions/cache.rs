//! Session-scoped permission cache.
//!
//! One fetch per `initialize`/`refresh`, published as a whole [`PermissionSnapshot`] on a watch
//! channel. Readers always see a complete snapshot; subscribers wake on every replacement.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::ids;
use super::snapshot::{PermissionGrant, PermissionSnapshot, PermissionStatus};
use crate::error::{AppError, AppResult};
use crate::identity::CredentialStore;

/// Where permission sets come from. The HTTP implementation talks to the backend.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn fetch(&self, token: &str) -> AppResult<PermissionGrant>;
}

pub struct PermissionCache {
    store: Arc<CredentialStore>,
    source: Arc<dyn PermissionSource>,
    state: watch::Sender<Arc<PermissionSnapshot>>,
    // bumped by clear(); settlements from an older epoch are dropped
    epoch: AtomicU64,
    torn_down: AtomicBool,
    settle: Mutex<()>,
}

impl PermissionCache {
    pub fn new(store: Arc<CredentialStore>, source: Arc<dyn PermissionSource>) -> Self {
        let (state, _) = watch::channel(Arc::new(PermissionSnapshot::loading()));
        Self {
            store,
            source,
            state,
            epoch: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
            settle: Mutex::new(()),
        }
    }

    /// First load for a session. Same contract as [`refresh`](Self::refresh).
    pub async fn initialize(&self) -> AppResult<()> {
        self.load("initialize").await
    }

    /// Always re-fetches; a failure empties the set.
    pub async fn refresh(&self) -> AppResult<()> {
        self.load("refresh").await
    }

    /// Drop everything without touching the network.
    pub fn clear(&self) {
        let _g = self.settle.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }
        self.state.send_replace(Arc::new(PermissionSnapshot::unauthenticated()));
        debug!("permissions.clear");
    }

    /// Stop publishing. Fetches still in flight settle into nothing.
    pub fn shutdown(&self) {
        let _g = self.settle.lock();
        self.torn_down.store(true, Ordering::SeqCst);
        debug!("permissions.shutdown");
    }

    pub fn is_shut_down(&self) -> bool { self.torn_down.load(Ordering::SeqCst) }

    pub fn snapshot(&self) -> Arc<PermissionSnapshot> { self.state.borrow().clone() }

    pub fn subscribe(&self) -> watch::Receiver<Arc<PermissionSnapshot>> { self.state.subscribe() }

    pub fn status(&self) -> PermissionStatus { self.state.borrow().status().clone() }

    async fn load(&self, op: &'static str) -> AppResult<()> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let Some(token) = self.store.token() else {
            self.publish(epoch, PermissionSnapshot::unauthenticated());
            debug!("permissions.{} skipped: no credential", op);
            return Err(AppError::unauthenticated("no credential present"));
        };

        self.mark_loading(epoch);
        debug!("permissions.{} fetching", op);
        match self.source.fetch(&token).await {
            Ok(grant) => {
                for id in grant.permissions.iter().filter(|p| !ids::is_well_formed(p)) {
                    debug!("permissions.{} backend sent malformed id '{}'", op, id);
                }
                let count = grant.permissions.len();
                let user_type = grant.user_type.as_ref().and_then(|t| t.name()).unwrap_or("-").to_string();
                if self.publish(epoch, PermissionSnapshot::ready(grant)) {
                    info!("permissions.{} loaded count={} user_type={}", op, count, user_type);
                } else {
                    debug!("permissions.{} result discarded: session changed while in flight", op);
                }
                Ok(())
            }
            Err(e) => {
                let e = e.into_fetch_failure();
                warn!("permissions.{} failed: {}", op, e);
                self.publish(epoch, PermissionSnapshot::failed(e.message()));
                Err(e)
            }
        }
    }

    fn mark_loading(&self, epoch: u64) {
        let _g = self.settle.lock();
        if self.is_stale(epoch) {
            return;
        }
        self.state.send_modify(|s| *s = Arc::new(s.with_status(PermissionStatus::Loading)));
    }

    fn publish(&self, epoch: u64, snapshot: PermissionSnapshot) -> bool {
        let _g = self.settle.lock();
        if self.is_stale(epoch) {
            return false;
        }
        self.state.send_replace(Arc::new(snapshot));
        true
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.torn_down.load(Ordering::SeqCst) || self.epoch.load(Ordering::SeqCst) != epoch
    }
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("status", &self.status())
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .field("torn_down", &self.is_shut_down())
            .finish()
    }
}
