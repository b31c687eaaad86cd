//! Revocable subscription handles
//!
//! A [`Connection`] remembers the (store, signal, subscriber) triple created
//! by a connect call. It does not keep the store alive: once the owner is
//! gone the connection simply reports itself as disconnected.
//!
//! The handle holds a weak reference to the subscriber, which keeps its
//! allocation (and so its identity) from being reused by a later callable.

use crate::signal::{SignalStore, StoreInner};
use crate::value::{Callable, Identity, WeakCallable};
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

pub struct Connection {
    store: Weak<StoreInner>,
    name: Rc<str>,
    callable: WeakCallable,
    identity: Identity,
    weak: bool,
    detached: Cell<bool>,
}

impl Connection {
    /// Strongly subscribe `callable` to `name` on `store`.
    pub fn connect(store: &SignalStore, name: &str, callable: &Callable) -> Self {
        store.connect(name, callable);
        Self::new(store, name, callable, false)
    }

    /// Weakly subscribe `callable` to `name` on `store`.
    pub fn connect_weak(store: &SignalStore, name: &str, callable: &Callable) -> Self {
        store.connect_weak(name, callable);
        Self::new(store, name, callable, true)
    }

    fn new(store: &SignalStore, name: &str, callable: &Callable, weak: bool) -> Self {
        Self {
            store: store.downgrade(),
            name: Rc::from(name),
            callable: callable.downgrade(),
            identity: callable.identity(),
            weak,
            detached: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// The subscriber, while anything still owns it.
    pub fn subscriber(&self) -> Option<Callable> {
        self.callable.upgrade()
    }

    /// Whether the subscriber is still present on the signal. Always false
    /// once [`disconnect`](Self::disconnect) was called on this handle.
    pub fn connected(&self) -> bool {
        if self.detached.get() {
            return false;
        }
        self.store
            .upgrade()
            .map(SignalStore::from_inner)
            .is_some_and(|store| store.is_connected(&self.name, self.identity))
    }

    /// Remove the subscription. Only the first call has any effect.
    pub fn disconnect(&self) -> bool {
        if self.detached.replace(true) {
            return false;
        }
        match self.store.upgrade() {
            Some(inner) => SignalStore::from_inner(inner).disconnect_identity(&self.name, self.identity),
            None => false,
        }
    }

    /// Tie the subscription to the returned guard's lifetime.
    pub fn scoped(self) -> ScopedConnection {
        ScopedConnection(self)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("signal", &self.name)
            .field("identity", &self.identity)
            .field("weak", &self.weak)
            .field("alive", &self.callable.is_alive())
            .field("connected", &self.connected())
            .finish()
    }
}

/// A [`Connection`] that disconnects when dropped.
#[derive(Debug)]
pub struct ScopedConnection(Connection);

impl ScopedConnection {
    pub fn connected(&self) -> bool {
        self.0.connected()
    }

    pub fn disconnect(&self) -> bool {
        self.0.disconnect()
    }

    /// Keep the subscription past the guard's lifetime.
    pub fn release(self) -> Connection {
        let inner = &self.0;
        let kept = Connection {
            store: inner.store.clone(),
            name: inner.name.clone(),
            callable: inner.callable.clone(),
            identity: inner.identity,
            weak: inner.weak,
            detached: Cell::new(inner.detached.get()),
        };
        // The guard's own drop becomes a no-op.
        inner.detached.set(true);
        kept
    }
}

impl From<Connection> for ScopedConnection {
    fn from(connection: Connection) -> Self {
        connection.scoped()
    }
}

impl std::ops::Deref for ScopedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.0
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.0.disconnect();
    }
}
