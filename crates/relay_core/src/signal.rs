//! Signal stores: named subscriber lists with synchronous emission
//!
//! A [`SignalStore`] belongs to exactly one owner (an object, a class, or the
//! runtime's global store) and maps a hashed signal name to two ordered slot
//! lists:
//!
//! - **strong** slots hold an identity retained in the runtime's
//!   [`RefRegistry`](crate::RefRegistry), keeping the callable alive;
//! - **weak** slots hold a [`WeakCallable`] and are skipped (and pruned) once
//!   the callable has been dropped everywhere else.
//!
//! A signal entry exists only while it has at least one slot.
//!
//! # Emission
//!
//! `emit` snapshots the slot lists before calling anything. Subscribers
//! connected during an emission are first called by the next one; subscribers
//! disconnected during an emission still receive the call already in flight.
//! No store borrow is held while a subscriber runs, so subscribers may freely
//! connect, disconnect or emit on the same store.

use crate::connection::Connection;
use crate::diagnostics::{
    SIGNALS_DELIVERED, SIGNALS_EMITTED, STRAY_DISCONNECT, WEAK_PRUNED,
};
use crate::runtime::Shared;
use crate::value::{Callable, Identity, Value, WeakCallable};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};
use xxhash_rust::xxh64::xxh64;

/// Hashed signal name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
    pub fn of(name: &str) -> Self {
        Self(xxh64(name.as_bytes(), 0))
    }

    #[inline]
    pub fn to_bits(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

enum Strength {
    Strong,
    Weak,
}

struct Signal {
    name: Rc<str>,
    strong: Vec<Identity>,
    weak: Vec<WeakCallable>,
}

impl Signal {
    fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            strong: Vec::new(),
            weak: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.strong.is_empty() && self.weak.is_empty()
    }
}

pub(crate) struct StoreInner {
    owner: Rc<str>,
    signals: RefCell<BTreeMap<SignalId, Signal>>,
    shared: Rc<Shared>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let signals = std::mem::take(self.signals.get_mut());
        for signal in signals.into_values() {
            for identity in signal.strong {
                self.shared.release_slot(identity);
            }
        }
    }
}

/// Per-owner table of signals.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct SignalStore {
    inner: Rc<StoreInner>,
}

impl SignalStore {
    pub(crate) fn new(shared: Rc<Shared>, owner: impl Into<Rc<str>>) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                owner: owner.into(),
                signals: RefCell::new(BTreeMap::new()),
                shared,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<StoreInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreInner> {
        Rc::downgrade(&self.inner)
    }

    /// Label of the owner, used in diagnostics.
    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    /// Interface bound to one signal of this store.
    pub fn signal(&self, name: &str) -> SignalInterface {
        SignalInterface {
            store: self.clone(),
            name: Rc::from(name),
        }
    }

    /// Subscribe `callable`, keeping it alive until disconnected.
    pub fn connect(&self, name: &str, callable: &Callable) {
        let identity = self.inner.shared.refs.retain_callable(callable);
        self.inner
            .signals
            .borrow_mut()
            .entry(SignalId::of(name))
            .or_insert_with(|| Signal::new(name))
            .strong
            .push(identity);
        trace!(owner = %self.inner.owner, signal = name, %identity, "connect");
    }

    /// Subscribe `callable` without keeping it alive.
    pub fn connect_weak(&self, name: &str, callable: &Callable) {
        self.inner
            .signals
            .borrow_mut()
            .entry(SignalId::of(name))
            .or_insert_with(|| Signal::new(name))
            .weak
            .push(callable.downgrade());
        trace!(owner = %self.inner.owner, signal = name, identity = %callable.identity(), "connect weak");
    }

    /// Remove one subscription of `callable`; returns whether one was found.
    pub fn disconnect(&self, name: &str, callable: &Callable) -> bool {
        self.disconnect_identity(name, callable.identity())
    }

    pub(crate) fn disconnect_identity(&self, name: &str, identity: Identity) -> bool {
        let id = SignalId::of(name);
        let found = {
            let mut signals = self.inner.signals.borrow_mut();
            let mut found = None;
            if let Some(signal) = signals.get_mut(&id) {
                if let Some(pos) = signal.strong.iter().position(|slot| *slot == identity) {
                    signal.strong.remove(pos);
                    found = Some(Strength::Strong);
                } else if let Some(pos) =
                    signal.weak.iter().position(|slot| slot.identity() == identity)
                {
                    signal.weak.remove(pos);
                    found = Some(Strength::Weak);
                }
                if signal.is_empty() {
                    signals.remove(&id);
                    debug!(owner = %self.inner.owner, signal = name, "signal has no subscribers left");
                }
            }
            found
        };

        let shared = &self.inner.shared;
        match found {
            Some(Strength::Strong) => {
                shared.release_slot(identity);
                true
            }
            Some(Strength::Weak) => true,
            None => {
                if shared.settings.warn_on_stray_disconnect {
                    shared.diagnostics.protocol_warning(
                        STRAY_DISCONNECT,
                        format_args!(
                            "disconnect of {identity} from '{name}' on {}: not connected",
                            self.inner.owner
                        ),
                    );
                }
                false
            }
        }
    }

    /// Call every subscriber of `name` with its own copy of `args`.
    ///
    /// Strong subscribers run first, in connection order, then live weak
    /// subscribers. A failing subscriber is reported and skipped over.
    /// Returns the number of subscribers called; an unobserved signal is 0.
    pub fn emit(&self, name: &str, args: &[Value]) -> usize {
        let id = SignalId::of(name);
        let shared = &self.inner.shared;

        let (strong, weak, pruned) = {
            let mut signals = self.inner.signals.borrow_mut();
            let Some(signal) = signals.get_mut(&id) else {
                trace!(owner = %self.inner.owner, signal = name, "emit without subscribers");
                return 0;
            };

            let pruned = if shared.settings.prune_dead_weak_slots {
                let before = signal.weak.len();
                signal.weak.retain(|slot| slot.is_alive());
                before - signal.weak.len()
            } else {
                0
            };

            let strong = signal.strong.clone();
            let weak: Vec<Callable> = signal.weak.iter().filter_map(|slot| slot.upgrade()).collect();
            if signal.is_empty() {
                signals.remove(&id);
            }
            (strong, weak, pruned)
        };

        let counters = shared.diagnostics.counters();
        if pruned > 0 {
            counters.add(WEAK_PRUNED, pruned as u64);
            debug!(owner = %self.inner.owner, signal = name, pruned, "pruned dead weak slots");
        }

        let strong: Vec<Callable> = strong
            .into_iter()
            .filter_map(|identity| match shared.refs.lookup(identity) {
                Some(Value::Function(callable)) => Some(callable),
                _ => {
                    debug!(signal = name, %identity, "strong slot lost its reference");
                    None
                }
            })
            .collect();

        counters.bump(SIGNALS_EMITTED);
        let mut delivered = 0;
        for subscriber in strong.iter().chain(weak.iter()) {
            let forwarded = args.to_vec();
            if let Err(error) = subscriber.call(&forwarded) {
                shared.diagnostics.subscriber_error(name, &error);
            }
            delivered += 1;
        }
        counters.add(SIGNALS_DELIVERED, delivered as u64);
        delivered
    }

    /// Whether `name` currently has an entry.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.signals.borrow().contains_key(&SignalId::of(name))
    }

    /// Strong plus live weak subscribers of `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .signals
            .borrow()
            .get(&SignalId::of(name))
            .map_or(0, |signal| {
                signal.strong.len() + signal.weak.iter().filter(|slot| slot.is_alive()).count()
            })
    }

    pub fn is_connected(&self, name: &str, identity: Identity) -> bool {
        self.inner
            .signals
            .borrow()
            .get(&SignalId::of(name))
            .is_some_and(|signal| {
                signal.strong.contains(&identity)
                    || signal
                        .weak
                        .iter()
                        .any(|slot| slot.identity() == identity && slot.is_alive())
            })
    }

    /// Number of signals with at least one slot.
    pub fn len(&self) -> usize {
        self.inner.signals.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.signals.borrow().is_empty()
    }

    /// Names of active signals, sorted.
    pub fn names(&self) -> Vec<Rc<str>> {
        let mut names: Vec<Rc<str>> = self
            .inner
            .signals
            .borrow()
            .values()
            .map(|signal| signal.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Drop every subscription; returns how many signals were removed.
    pub fn clear(&self) -> usize {
        let signals = std::mem::take(&mut *self.inner.signals.borrow_mut());
        let count = signals.len();
        for signal in signals.into_values() {
            for identity in signal.strong {
                self.inner.shared.release_slot(identity);
            }
        }
        count
    }
}

impl fmt::Debug for SignalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalStore")
            .field("owner", &self.inner.owner)
            .field("signals", &self.names())
            .finish()
    }
}

/// One named signal of a store, as handed out by `obj[":name"]`.
#[derive(Clone)]
pub struct SignalInterface {
    store: SignalStore,
    name: Rc<str>,
}

impl SignalInterface {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> SignalId {
        SignalId::of(&self.name)
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    pub fn connect(&self, callable: &Callable) -> Connection {
        Connection::connect(&self.store, &self.name, callable)
    }

    pub fn connect_weak(&self, callable: &Callable) -> Connection {
        Connection::connect_weak(&self.store, &self.name, callable)
    }

    pub fn disconnect(&self, callable: &Callable) -> bool {
        self.store.disconnect(&self.name, callable)
    }

    pub fn emit(&self, args: &[Value]) -> usize {
        self.store.emit(&self.name, args)
    }

    pub fn subscriber_count(&self) -> usize {
        self.store.subscriber_count(&self.name)
    }

    pub fn is_active(&self) -> bool {
        self.store.contains(&self.name)
    }
}

impl fmt::Debug for SignalInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalInterface")
            .field("owner", &self.store.owner())
            .field("name", &self.name)
            .finish()
    }
}
