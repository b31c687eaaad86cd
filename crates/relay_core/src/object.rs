//! Script-visible object instances and member dispatch
//!
//! Member lookup order for a key:
//!
//! 1. a name starting with [`SIGIL`] selects a signal of the object's store;
//! 2. a property along the class chain (getter / setter);
//! 3. a plain per-instance field;
//! 4. a method along the class chain;
//! 5. the class's index (or newindex) miss handler.

use crate::class::{Class, Method};
use crate::connection::Connection;
use crate::error::{ArgumentError, RuntimeError};
use crate::refs::{RefRegistry, Release};
use crate::runtime::Shared;
use crate::signal::{SignalInterface, SignalStore};
use crate::value::{CallResult, Callable, Identity, Value};
use std::any::{type_name, Any};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// Prefix routing a member name to the signal namespace.
pub const SIGIL: char = ':';

/// Member key: a name or an integer index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Name(Rc<str>),
    Index(i64),
}

impl Key {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(name) => Some(name),
            Key::Index(_) => None,
        }
    }

    /// Signal name when the key uses the sigil.
    pub fn signal_name(&self) -> Option<&str> {
        self.as_name().and_then(|name| name.strip_prefix(SIGIL))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(Rc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(Rc::from(name))
    }
}

impl From<i64> for Key {
    fn from(index: i64) -> Self {
        Key::Index(index)
    }
}

impl From<i32> for Key {
    fn from(index: i32) -> Self {
        Key::Index(i64::from(index))
    }
}

/// Outcome of a successful member lookup.
#[derive(Clone)]
pub enum Member {
    Signal(SignalInterface),
    Value(Value),
    Method(Method),
}

impl Member {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Member::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Signal(signal) => f.debug_tuple("Signal").field(&signal.name()).finish(),
            Member::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Member::Method(_) => f.write_str("Method"),
        }
    }
}

struct ObjectInner {
    class: Rc<Class>,
    signals: SignalStore,
    items: RefRegistry,
    native: RefCell<Box<dyn Any>>,
    fields: RefCell<HashMap<Key, Value>>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        if let Some(finalize) = self.class.finalizer() {
            finalize(&mut **self.native.get_mut());
        }
        self.class.instance_dropped();
        trace!(class = self.class.name(), "object finalized");
    }
}

/// Shared handle to an instance of a registered class.
///
/// The instance is finalized when the last handle is dropped.
#[derive(Clone)]
pub struct ObjectHandle(Rc<ObjectInner>);

impl ObjectHandle {
    pub(crate) fn new(class: Rc<Class>, shared: &Rc<Shared>) -> Self {
        let native = class.allocate();
        class.instance_created();
        Self(Rc::new(ObjectInner {
            signals: SignalStore::new(shared.clone(), format!("{} object", class.name())),
            items: RefRegistry::new(shared.diagnostics.clone()),
            native: RefCell::new(native),
            fields: RefCell::new(HashMap::new()),
            class,
        }))
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.0.class
    }

    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }

    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Look up `key`; `Ok(None)` when nothing answers it.
    pub fn get_member(&self, key: impl Into<Key>) -> Result<Option<Member>, RuntimeError> {
        let key = key.into();
        if let Key::Name(name) = &key {
            if let Some(signal) = name.strip_prefix(SIGIL) {
                return Ok(Some(Member::Signal(self.0.signals.signal(signal))));
            }
            if let Some(property) = self.0.class.properties().lookup(name) {
                return property.get(self).map(|value| Some(Member::Value(value)));
            }
        }
        if let Some(value) = self.raw_get(&key) {
            return Ok(Some(Member::Value(value)));
        }
        if let Some(method) = key.as_name().and_then(|name| self.0.class.method(name)) {
            return Ok(Some(Member::Method(method)));
        }
        if let Some(handler) = self.0.class.index_miss_handler() {
            let value = handler(self, &key)?;
            return Ok((!value.is_nil()).then_some(Member::Value(value)));
        }
        Ok(None)
    }

    /// Value view of [`get_member`](Self::get_member).
    ///
    /// Methods come back as functions bound to this object; signals and
    /// missing members read as nil.
    pub fn get(&self, key: impl Into<Key>) -> CallResult {
        Ok(match self.get_member(key)? {
            Some(Member::Value(value)) => value,
            Some(Member::Method(method)) => {
                let receiver = self.clone();
                Value::Function(Callable::new(move |args| method(&receiver, args)))
            }
            Some(Member::Signal(_)) | None => Value::Nil,
        })
    }

    /// Assign `key`. A property setter consumes the value; anything else,
    /// read-only properties and sigil keys included, lands in plain storage
    /// (or the newindex-miss handler). Getters and signals still shadow the
    /// stored field on read.
    pub fn set_member(&self, key: impl Into<Key>, value: Value) -> Result<(), RuntimeError> {
        let key = key.into();
        if let Key::Name(name) = &key {
            let setter = self
                .0
                .class
                .properties()
                .lookup(name)
                .and_then(|property| property.setter().cloned());
            if let Some(setter) = setter {
                return setter(self, value);
            }
        }
        let has_field = self.0.fields.borrow().contains_key(&key);
        if !has_field {
            if let Some(handler) = self.0.class.newindex_miss_handler() {
                return handler(self, &key, value);
            }
        }
        self.raw_set(key, value);
        Ok(())
    }

    /// Plain field, bypassing properties and handlers.
    pub fn raw_get(&self, key: &Key) -> Option<Value> {
        self.0.fields.borrow().get(key).cloned()
    }

    /// Store a plain field; nil removes it.
    pub fn raw_set(&self, key: impl Into<Key>, value: Value) {
        let key = key.into();
        let previous = if value.is_nil() {
            self.0.fields.borrow_mut().remove(&key)
        } else {
            self.0.fields.borrow_mut().insert(key, value)
        };
        drop(previous);
    }

    /// Call `name` with this object as receiver.
    ///
    /// Class methods are tried first, then a function stored in a plain
    /// field (which receives the object as its first argument).
    pub fn call_method(&self, name: &str, args: &[Value]) -> CallResult {
        if let Some(method) = self.0.class.method(name) {
            return method(self, args);
        }
        if let Some(Value::Function(function)) = self.raw_get(&Key::from(name)) {
            let mut forwarded = Vec::with_capacity(args.len() + 1);
            forwarded.push(Value::Object(self.clone()));
            forwarded.extend_from_slice(args);
            return function.call(&forwarded);
        }
        Err(RuntimeError::UnknownMethod {
            class: self.0.class.name().to_string(),
            method: name.to_string(),
        })
    }

    /// The object's own signal store.
    pub fn signals(&self) -> &SignalStore {
        &self.0.signals
    }

    /// Interface for signal `name` (with or without the sigil).
    pub fn signal(&self, name: &str) -> SignalInterface {
        self.0.signals.signal(strip_sigil(name))
    }

    pub fn connect_signal(&self, name: &str, callable: &Callable) -> Connection {
        Connection::connect(&self.0.signals, strip_sigil(name), callable)
    }

    pub fn connect_signal_weak(&self, name: &str, callable: &Callable) -> Connection {
        Connection::connect_weak(&self.0.signals, strip_sigil(name), callable)
    }

    pub fn disconnect_signal(&self, name: &str, callable: &Callable) -> bool {
        self.0.signals.disconnect(strip_sigil(name), callable)
    }

    pub fn emit_signal(&self, name: &str, args: &[Value]) -> usize {
        self.0.signals.emit(strip_sigil(name), args)
    }

    /// Emit `property.<name>` with no arguments.
    pub fn emit_property_changed(&self, property: &str) -> usize {
        self.0.signals.emit(&format!("property.{property}"), &[])
    }

    /// Borrow the native state as a `T`.
    pub fn native<T: Any>(&self) -> Result<Ref<'_, T>, RuntimeError> {
        let state = self
            .0
            .native
            .try_borrow()
            .map_err(|_| self.state_borrowed())?;
        Ref::filter_map(state, |state| state.downcast_ref::<T>())
            .map_err(|_| self.state_mismatch::<T>())
    }

    /// Mutably borrow the native state as a `T`.
    pub fn native_mut<T: Any>(&self) -> Result<RefMut<'_, T>, RuntimeError> {
        let state = self
            .0
            .native
            .try_borrow_mut()
            .map_err(|_| self.state_borrowed())?;
        RefMut::filter_map(state, |state| state.downcast_mut::<T>())
            .map_err(|_| self.state_mismatch::<T>())
    }

    fn state_borrowed(&self) -> RuntimeError {
        RuntimeError::StateBorrowed {
            class: self.0.class.name().to_string(),
        }
    }

    fn state_mismatch<T>(&self) -> RuntimeError {
        ArgumentError::type_mismatch(1, type_name::<T>(), "object").into()
    }

    /// Keep `value` alive for as long as this object holds it.
    pub fn ref_item(&self, value: &Value) -> Result<Identity, ArgumentError> {
        self.0.items.retain(value)
    }

    pub fn unref_item(&self, identity: Identity) -> Release {
        self.0.items.release(identity)
    }

    pub fn item(&self, identity: Identity) -> Option<Value> {
        self.0.items.lookup(identity)
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.0.class.name(), self.identity())
    }
}

fn strip_sigil(name: &str) -> &str {
    name.strip_prefix(SIGIL).unwrap_or(name)
}
