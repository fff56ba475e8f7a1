// src/broker/mod.rs

//! Scoped resource broker.
//!
//! Code running inside a task needs batch information (user, batch id,
//! execution id, batch arguments) without every call signature carrying it.
//! A [`ResourceBroker`] keeps one stack of [`ResourceSession`]s per
//! [`Scope`]; lookups walk from the innermost session outwards, so a nested
//! session shadows its parent until it is closed.
//!
//! The broker is an explicit, cloneable handle rather than a global: the
//! engine hands it to every executor through [`crate::exec::TaskContext`].
//! Clones share both stacks. [`ResourceBroker::task_view`] shares the
//! process stack but starts an empty local one; the engine gives each
//! dispatched task its own view so concurrent tasks never see each other's
//! local sessions.

pub mod context;
pub mod session;

use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::errors::{PhasedagError, Result};

pub use context::ExecutionContext;
pub use session::{Bindings, ResourceSession};

/// Visibility domain of a session stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Run-wide sessions, e.g. the one opened by the artifact executor.
    Process,
    /// Call-local sessions layered over the process scope.
    Local,
}

impl Scope {
    /// Order in which scopes are searched by [`ResourceBroker::find`].
    pub const SEARCH_ORDER: [Scope; 2] = [Scope::Local, Scope::Process];
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Process => f.write_str("process"),
            Scope::Local => f.write_str("local"),
        }
    }
}

type SessionStack = Vec<Arc<ResourceSession>>;

#[derive(Debug, Default)]
struct ProcessStack {
    sessions: Mutex<SessionStack>,
    next_id: AtomicU64,
}

#[derive(Debug, Default)]
struct BrokerInner {
    process: Arc<ProcessStack>,
    local: Mutex<SessionStack>,
}

/// Scope-stacked, typed key -> value registry.
#[derive(Debug, Clone, Default)]
pub struct ResourceBroker {
    inner: Arc<BrokerInner>,
}

impl ResourceBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker sharing this one's process sessions, with its own empty
    /// local stack.
    pub fn task_view(&self) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                process: Arc::clone(&self.inner.process),
                local: Mutex::default(),
            }),
        }
    }

    fn stack(&self, scope: Scope) -> MutexGuard<'_, SessionStack> {
        let lock = match scope {
            Scope::Process => &self.inner.process.sessions,
            Scope::Local => &self.inner.local,
        };
        lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new session on top of `scope`'s stack.
    ///
    /// `initializer` runs exactly once, before the session becomes visible.
    /// If it fails, nothing is attached and the error is returned.
    pub fn attach<F>(&self, scope: Scope, initializer: F) -> Result<SessionHandle>
    where
        F: FnOnce(&mut Bindings) -> anyhow::Result<()>,
    {
        let mut bindings = Bindings::default();
        initializer(&mut bindings).map_err(PhasedagError::ResourceInit)?;

        let session = self.push(scope, bindings);
        Ok(SessionHandle {
            broker: self.clone(),
            session,
        })
    }

    fn push(&self, scope: Scope, bindings: Bindings) -> Arc<ResourceSession> {
        let id = self.inner.process.next_id.fetch_add(1, Ordering::Relaxed);
        let mut stack = self.stack(scope);
        let parent = stack.last().map(Arc::downgrade).unwrap_or_default();
        let session = Arc::new(ResourceSession::new(id, scope, parent, bindings));
        stack.push(Arc::clone(&session));
        debug!(%scope, session = id, depth = stack.len(), "attached resource session");
        session
    }

    fn top(&self, scope: Scope) -> Option<Arc<ResourceSession>> {
        self.stack(scope).last().cloned()
    }

    /// Nearest binding for `T`, searching local sessions before process ones.
    pub fn find<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Scope::SEARCH_ORDER
            .into_iter()
            .filter_map(|scope| self.top(scope))
            .find_map(|session| session.find::<T>())
    }

    /// Like [`ResourceBroker::find`], but a missing binding is an error.
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.find::<T>()
            .ok_or_else(|| PhasedagError::ResourceNotPrepared(type_name::<T>()))
    }

    /// Bind `value` into the innermost active session.
    ///
    /// With no active session, an implicit process session is opened; it
    /// stays until [`ResourceBroker::close_all`].
    pub fn put<T: Any + Send + Sync>(&self, value: T) {
        let target = Scope::SEARCH_ORDER
            .into_iter()
            .find_map(|scope| self.top(scope));

        match target {
            Some(session) => {
                session.put(value);
            }
            None => {
                debug!(resource = type_name::<T>(), "no active session; opening implicit process session");
                let mut bindings = Bindings::default();
                bindings.put(value);
                self.push(Scope::Process, bindings);
            }
        }
    }

    /// Number of open sessions in `scope`.
    pub fn depth(&self, scope: Scope) -> usize {
        self.stack(scope).len()
    }

    /// Forcibly close the process sessions and this view's local ones.
    pub fn close_all(&self) {
        for scope in Scope::SEARCH_ORDER {
            let drained: SessionStack = self.stack(scope).drain(..).collect();
            for session in &drained {
                session.mark_closed();
            }
            if !drained.is_empty() {
                debug!(%scope, closed = drained.len(), "closed all resource sessions");
            }
        }
    }

    fn detach(&self, session: &Arc<ResourceSession>) {
        let scope = session.scope();
        let mut stack = self.stack(scope);

        let Some(pos) = stack.iter().position(|s| Arc::ptr_eq(s, session)) else {
            debug!(%scope, session = session.id(), "session already removed from stack");
            return;
        };

        let removed: SessionStack = stack.drain(pos..).collect();
        if removed.len() > 1 {
            warn!(
                %scope,
                session = session.id(),
                nested = removed.len() - 1,
                "closing session with nested sessions still open; closing those too"
            );
        }
        for s in &removed {
            s.mark_closed();
        }
        debug!(%scope, session = session.id(), depth = stack.len(), "closed resource session");
    }
}

/// Owner of one attached session; closing it detaches the session.
///
/// Dropping the handle closes the session, so every exit path releases it.
#[derive(Debug)]
pub struct SessionHandle {
    broker: ResourceBroker,
    session: Arc<ResourceSession>,
}

impl SessionHandle {
    pub fn session(&self) -> &Arc<ResourceSession> {
        &self.session
    }

    pub fn scope(&self) -> Scope {
        self.session.scope()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// Detach the session. Calling this again is a no-op.
    pub fn close(&mut self) {
        if self.session.is_closed() {
            return;
        }
        self.broker.detach(&self.session);
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
