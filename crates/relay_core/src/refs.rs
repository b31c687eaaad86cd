//! Cross-boundary reference registry
//!
//! Keeps host-held script values alive independent of the script engine's
//! collector. Entries are keyed by [`Identity`] and counted manually: a value
//! stays in the table exactly while its count is positive.

use crate::diagnostics::{Diagnostics, REFS_UNDERFLOW};
use crate::error::ArgumentError;
use crate::value::{Callable, Identity, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// Outcome of [`RefRegistry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Still referenced; carries the remaining count.
    Retained(usize),
    /// Count reached zero and the entry was removed.
    Dropped,
    /// The identity was not retained (reported as a protocol warning).
    Unknown,
}

struct RefEntry {
    value: Value,
    count: usize,
}

/// Identity-keyed table of retained values with manual counts.
pub struct RefRegistry {
    entries: RefCell<HashMap<Identity, RefEntry>>,
    diagnostics: Rc<Diagnostics>,
}

impl RefRegistry {
    pub(crate) fn new(diagnostics: Rc<Diagnostics>) -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            diagnostics,
        }
    }

    /// Retain `value`, returning the identity to release it with later.
    ///
    /// Only reference values can be retained; scalars have no stable identity.
    pub fn retain(&self, value: &Value) -> Result<Identity, ArgumentError> {
        let identity = value
            .identity()
            .ok_or_else(|| ArgumentError::type_mismatch(1, "reference value", value.type_name()))?;
        self.retain_as(identity, value);
        Ok(identity)
    }

    pub(crate) fn retain_callable(&self, callable: &Callable) -> Identity {
        let identity = callable.identity();
        self.retain_as(identity, &Value::Function(callable.clone()));
        identity
    }

    fn retain_as(&self, identity: Identity, value: &Value) {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(identity).or_insert_with(|| RefEntry {
            value: value.clone(),
            count: 0,
        });
        entry.count += 1;
        trace!(%identity, count = entry.count, "retain");
    }

    /// Drop one reference to `identity`.
    ///
    /// Releasing an identity that is not retained is reported and ignored.
    pub fn release(&self, identity: Identity) -> Release {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            match entries.get(&identity).map(|entry| entry.count) {
                None => None,
                Some(count) if count > 1 => {
                    if let Some(entry) = entries.get_mut(&identity) {
                        entry.count = count - 1;
                    }
                    trace!(%identity, count = count - 1, "release");
                    return Release::Retained(count - 1);
                }
                Some(_) => entries.remove(&identity),
            }
        };

        match removed {
            // Dropped outside the borrow: the value may be an object whose
            // finalizer releases further references.
            Some(entry) => {
                trace!(%identity, "release (dropped)");
                drop(entry);
                Release::Dropped
            }
            None => {
                self.diagnostics.protocol_warning(
                    REFS_UNDERFLOW,
                    format_args!("BUG: reference not found: {identity}"),
                );
                Release::Unknown
            }
        }
    }

    pub fn lookup(&self, identity: Identity) -> Option<Value> {
        self.entries
            .borrow()
            .get(&identity)
            .map(|entry| entry.value.clone())
    }

    /// Current count for `identity` (zero when absent).
    pub fn count(&self, identity: Identity) -> usize {
        self.entries
            .borrow()
            .get(&identity)
            .map_or(0, |entry| entry.count)
    }

    pub fn contains(&self, identity: Identity) -> bool {
        self.entries.borrow().contains_key(&identity)
    }

    /// Number of distinct retained identities.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Remove every entry regardless of count, returning how many there were.
    pub(crate) fn clear(&self) -> usize {
        let drained: Vec<RefEntry> = self
            .entries
            .borrow_mut()
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        let count = drained.len();
        drop(drained);
        count
    }
}

impl fmt::Debug for RefRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::PROTOCOL_WARNINGS;
    use crate::value::List;

    fn registry() -> RefRegistry {
        RefRegistry::new(Rc::new(Diagnostics::default()))
    }

    #[test]
    fn count_tracks_retains_minus_releases() {
        let refs = registry();
        let list = Value::from(List::new());

        let id = refs.retain(&list).unwrap();
        assert_eq!(refs.retain(&list).unwrap(), id);
        assert_eq!(refs.count(id), 2);
        assert_eq!(refs.lookup(id), Some(list.clone()));

        assert_eq!(refs.release(id), Release::Retained(1));
        assert_eq!(refs.release(id), Release::Dropped);
        assert_eq!(refs.count(id), 0);
        assert!(!refs.contains(id));
        assert!(refs.lookup(id).is_none());
        assert!(refs.is_empty());
    }

    #[test]
    fn release_below_zero_is_a_warning_not_a_crash() {
        let diagnostics = Rc::new(Diagnostics::default());
        let refs = RefRegistry::new(diagnostics.clone());
        let list = Value::from(List::new());

        let id = refs.retain(&list).unwrap();
        assert_eq!(refs.release(id), Release::Dropped);
        assert_eq!(refs.release(id), Release::Unknown);
        assert_eq!(refs.release(id), Release::Unknown);
        assert_eq!(refs.count(id), 0);

        if relay_metrics::ENABLED {
            assert_eq!(diagnostics.counters().get(REFS_UNDERFLOW), 2);
            assert_eq!(diagnostics.counters().get(PROTOCOL_WARNINGS), 2);
        }
    }

    #[test]
    fn scalars_cannot_be_retained() {
        let refs = registry();
        let err = refs.retain(&Value::from(42)).unwrap_err();
        assert_eq!(err.position(), Some(1));
        assert!(refs.is_empty());
    }

    #[test]
    fn retained_value_outlives_caller_handle() {
        let refs = registry();
        let callable = Callable::new(|_| Ok(Value::from("alive")));
        let weak = callable.downgrade();

        let id = refs.retain_callable(&callable);
        drop(callable);
        assert!(weak.is_alive());

        let revived = refs.lookup(id).unwrap();
        let result = revived.as_function().unwrap().call(&[]).unwrap();
        assert_eq!(result, Value::from("alive"));
        drop(revived);

        refs.release(id);
        assert!(!weak.is_alive());
    }

    #[test]
    fn clear_drops_everything() {
        let refs = registry();
        let a = Value::from(List::new());
        let b = Value::from(List::new());
        refs.retain(&a).unwrap();
        refs.retain(&a).unwrap();
        refs.retain(&b).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs.clear(), 2);
        assert!(refs.is_empty());
    }
}
