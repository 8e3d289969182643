//! Declarative guards for protected regions.

use std::sync::Arc;

use tokio::sync::watch;

use super::ids::{self, Action};
use super::snapshot::PermissionSnapshot;

/// What a protected region asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Permission(String),
    AnyOf(Vec<String>),
    AllOf(Vec<String>),
    ResourceAction { resource: String, action: Action },
}

impl Requirement {
    pub fn permission<S: Into<String>>(id: S) -> Self { Requirement::Permission(id.into()) }

    /// `require_all` picks AND over OR.
    pub fn list<I, S>(ids: I, require_all: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if require_all { Requirement::AllOf(ids) } else { Requirement::AnyOf(ids) }
    }

    pub fn resource_action<R: Into<String>, A: Into<Action>>(resource: R, action: A) -> Self {
        Requirement::ResourceAction { resource: resource.into(), action: action.into() }
    }

    /// Decision against a loaded snapshot; ignores the loading flag.
    pub fn is_granted(&self, snap: &PermissionSnapshot) -> bool {
        match self {
            Requirement::Permission(id) => snap.has_permission(id),
            Requirement::AnyOf(list) => snap.has_any_permission(list.as_slice()),
            Requirement::AllOf(list) => snap.has_all_permissions(list.as_slice()),
            Requirement::ResourceAction { resource, action } => match action {
                Action::Read => snap.can_read(resource),
                Action::Write => snap.can_write(resource),
                Action::Delete => snap.can_delete(resource),
                Action::Create => snap.can_create(resource),
                Action::Other(_) => snap.has_permission(&ids::permission_id(resource, action)),
            },
        }
    }

    pub fn evaluate(&self, snap: &PermissionSnapshot) -> GateState {
        if snap.is_loading() {
            GateState::Loading
        } else if self.is_granted(snap) {
            GateState::Granted
        } else {
            GateState::Denied
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateState {
    Loading,
    Granted,
    Denied,
}

/// Protected content with its fallback and loading placeholder.
#[derive(Debug, Clone)]
pub struct AccessGate<T> {
    requirement: Requirement,
    content: T,
    fallback: Option<T>,
    placeholder: Option<T>,
}

impl<T> AccessGate<T> {
    pub fn new(requirement: Requirement, content: T) -> Self {
        Self { requirement, content, fallback: None, placeholder: None }
    }

    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_placeholder(mut self, placeholder: T) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn requirement(&self) -> &Requirement { &self.requirement }

    pub fn state(&self, snap: &PermissionSnapshot) -> GateState { self.requirement.evaluate(snap) }

    /// `None` means render nothing.
    pub fn render(&self, snap: &PermissionSnapshot) -> Option<&T> {
        match self.state(snap) {
            GateState::Loading => self.placeholder.as_ref(),
            GateState::Granted => Some(&self.content),
            GateState::Denied => self.fallback.as_ref(),
        }
    }
}

/// Recomputes a requirement every time the cache publishes a new snapshot.
#[derive(Debug, Clone)]
pub struct GateWatcher {
    requirement: Requirement,
    rx: watch::Receiver<Arc<PermissionSnapshot>>,
}

impl GateWatcher {
    pub fn new(requirement: Requirement, rx: watch::Receiver<Arc<PermissionSnapshot>>) -> Self {
        Self { requirement, rx }
    }

    pub fn current(&self) -> GateState {
        let snap = self.rx.borrow().clone();
        self.requirement.evaluate(&snap)
    }

    /// Waits for the next snapshot and returns the recomputed state.
    /// `None` once the cache is gone.
    pub async fn changed(&mut self) -> Option<GateState> {
        self.rx.changed().await.ok()?;
        let snap = self.rx.borrow_and_update().clone();
        Some(self.requirement.evaluate(&snap))
    }

    /// Waits until the state is no longer `Loading`.
    pub async fn settled(&mut self) -> Option<GateState> {
        let snap = self
            .rx
            .wait_for(|s| !s.is_loading())
            .await
            .ok()?
            .clone();
        Some(self.requirement.evaluate(&snap))
    }
}
