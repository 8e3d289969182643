use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::credential::{Credential, UserIdentity};
use crate::error::{AppError, AppResult};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// String key/value persistence behind the credential store.
pub trait CredentialBackend: Send + Sync {
    fn read(&self, key: &str) -> AppResult<Option<String>>;
    fn write(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

/// Process-memory backend; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }
}

impl CredentialBackend for MemoryBackend {
    fn read(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }
    fn write(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
    fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One file per key under a session directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self { Self { dir: dir.into() } }

    pub fn dir(&self) -> &Path { &self.dir }

    fn path_for(&self, key: &str) -> PathBuf { self.dir.join(key) }
}

impl CredentialBackend for FileBackend {
    fn read(&self, key: &str) -> AppResult<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
    fn write(&self, key: &str, value: &str) -> AppResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        // write-then-rename so a crash never leaves a torn entry behind
        let tmp = self.path_for(&format!(".{key}.tmp"));
        let _ = std::fs::remove_file(&tmp);
        let mut file = owner_only().write(true).create_new(true).open(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, self.path_for(key))?;
        Ok(())
    }
    fn remove(&self, key: &str) -> AppResult<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// The token is a bearer secret; keep it readable by the owner only.
#[cfg(unix)]
fn owner_only() -> OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    let mut opts = OpenOptions::new();
    opts.mode(0o600);
    opts
}

#[cfg(not(unix))]
fn owner_only() -> OpenOptions { OpenOptions::new() }

#[derive(Debug, Serialize, Deserialize)]
struct StoredUser {
    #[serde(flatten)]
    identity: UserIdentity,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

/// Single source of truth for "who is logged in, and with which token".
pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
    // serialises set/clear against get so readers never see a half-written pair
    guard: RwLock<()>,
}

impl CredentialStore {
    pub fn new(backend: Box<dyn CredentialBackend>) -> Self {
        Self { backend, guard: RwLock::new(()) }
    }

    pub fn in_memory() -> Self { Self::new(Box::new(MemoryBackend::new())) }

    pub fn on_disk<P: Into<PathBuf>>(dir: P) -> Self { Self::new(Box::new(FileBackend::new(dir))) }

    pub fn set(&self, credential: &Credential) -> AppResult<()> {
        let user = StoredUser { identity: credential.identity().clone(), saved_at: Some(Utc::now()) };
        let user_json = serde_json::to_string(&user)?;
        let _w = self.guard.write();
        self.backend.write(TOKEN_KEY, credential.token())?;
        if let Err(e) = self.backend.write(USER_KEY, &user_json) {
            let _ = self.backend.remove(TOKEN_KEY);
            return Err(e);
        }
        debug!("credential.set user={}", credential.user_id());
        Ok(())
    }

    pub fn clear(&self) {
        let _w = self.guard.write();
        self.clear_locked();
    }

    fn clear_locked(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.backend.remove(key) {
                warn!("credential.clear key={} failed: {}", key, e);
            }
        }
        debug!("credential.clear");
    }

    /// Current credential, or `None`. Partial or unreadable state is wiped on the way out.
    pub fn get(&self) -> Option<Credential> {
        let loaded = {
            let _r = self.guard.read();
            self.load()
        };
        if let Ok(found) = loaded {
            return found;
        }
        // a set() may have landed between the two locks; only wipe what is still broken
        let _w = self.guard.write();
        match self.load() {
            Ok(found) => found,
            Err(e) => {
                warn!("credential.get discarding persisted credential: {}", e);
                self.clear_locked();
                None
            }
        }
    }

    fn load(&self) -> AppResult<Option<Credential>> {
        let token = self.backend.read(TOKEN_KEY)?;
        let user = self.backend.read(USER_KEY)?;
        match (token, user) {
            (None, None) => Ok(None),
            (Some(token), Some(user)) => {
                let stored: StoredUser = serde_json::from_str(&user)
                    .map_err(|e| AppError::stale(format!("user record does not parse: {e}")))?;
                Credential::new(token.trim().to_string(), stored.identity)
                    .map(Some)
                    .map_err(|e| AppError::stale(e.message().to_string()))
            }
            (Some(_), None) => Err(AppError::stale("token present without user record")),
            (None, Some(_)) => Err(AppError::stale("user record present without token")),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.get().map(|c| c.token().to_string())
    }

    pub fn is_authenticated(&self) -> bool { self.get().is_some() }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}
