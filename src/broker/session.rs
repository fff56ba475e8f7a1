// src/broker/session.rs

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::Scope;

type Binding = Arc<dyn Any + Send + Sync>;

/// Typed key -> instance map held by a [`ResourceSession`].
///
/// The key is the value's type; at most one instance per type.
#[derive(Default)]
pub struct Bindings {
    values: HashMap<TypeId, (&'static str, Binding)>,
}

impl Bindings {
    /// Bind `value` under its type, returning the instance it replaced.
    pub fn put<T: Any + Send + Sync>(&mut self, value: T) -> Option<Arc<T>> {
        self.put_shared(Arc::new(value))
    }

    pub fn put_shared<T: Any + Send + Sync>(&mut self, value: Arc<T>) -> Option<Arc<T>> {
        let value: Binding = value;
        self.values
            .insert(TypeId::of::<T>(), (type_name::<T>(), value))
            .and_then(|(_, old)| old.downcast::<T>().ok())
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|(_, v)| Arc::clone(v).downcast::<T>().ok())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.values.values().map(|(name, _)| name))
            .finish()
    }
}

/// One node of a scope's session stack.
pub struct ResourceSession {
    id: u64,
    scope: Scope,
    /// Enclosing session of the same scope; lookup only.
    parent: Weak<ResourceSession>,
    bindings: RwLock<Bindings>,
    closed: AtomicBool,
}

impl ResourceSession {
    pub(super) fn new(
        id: u64,
        scope: Scope,
        parent: Weak<ResourceSession>,
        bindings: Bindings,
    ) -> Self {
        Self {
            id,
            scope,
            parent,
            bindings: RwLock::new(bindings),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn parent(&self) -> Option<Arc<ResourceSession>> {
        self.parent.upgrade()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Look up `T` in this session only.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get::<T>()
    }

    /// Look up `T` in this session, then its ancestors.
    pub fn find<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        if !self.is_closed() {
            if let Some(v) = self.get::<T>() {
                return Some(v);
            }
        }
        let mut next = self.parent();
        while let Some(session) = next {
            if !session.is_closed() {
                if let Some(v) = session.get::<T>() {
                    return Some(v);
                }
            }
            next = session.parent();
        }
        None
    }

    pub(super) fn put<T: Any + Send + Sync>(&self, value: T) -> Option<Arc<T>> {
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .put(value)
    }

    /// Marks the session closed; returns `false` if it already was.
    pub(super) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for ResourceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSession")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("closed", &self.is_closed())
            .field(
                "bindings",
                &*self.bindings.read().unwrap_or_else(PoisonError::into_inner),
            )
            .finish()
    }
}
