//! Script-visible values crossing the host boundary
//!
//! The scripting engine owns its own value space; these are the values the
//! runtime passes to and receives from it. Scalars are plain data, reference
//! values (functions, lists, tables, objects) are `Rc`-backed and carry a
//! stable [`Identity`] for the lifetime of their allocation.

use crate::error::RuntimeError;
use crate::object::ObjectHandle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

pub type CallResult = Result<Value, RuntimeError>;

type CallableFn = dyn Fn(&[Value]) -> CallResult;

/// Stable identity of a reference value (the address of its allocation).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(usize);

impl Identity {
    pub(crate) fn of<T: ?Sized>(rc: &Rc<T>) -> Self {
        Self(Rc::as_ptr(rc) as *const () as usize)
    }

    pub(crate) fn of_weak<T: ?Sized>(weak: &Weak<T>) -> Self {
        Self(Weak::as_ptr(weak) as *const () as usize)
    }

    pub fn to_bits(self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A reference-counted callable: script function or native closure.
#[derive(Clone)]
pub struct Callable(Rc<CallableFn>);

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> CallResult + 'static,
    {
        Self(Rc::new(f))
    }

    #[inline]
    pub fn call(&self, args: &[Value]) -> CallResult {
        (self.0)(args)
    }

    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }

    pub fn downgrade(&self) -> WeakCallable {
        WeakCallable {
            inner: Rc::downgrade(&self.0),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.identity())
    }
}

/// Non-owning reference to a [`Callable`].
///
/// The allocation (and therefore the identity) stays reserved while any weak
/// handle exists, so a dead slot can still be matched and removed.
#[derive(Clone)]
pub struct WeakCallable {
    inner: Weak<CallableFn>,
}

impl WeakCallable {
    pub fn upgrade(&self) -> Option<Callable> {
        self.inner.upgrade().map(Callable)
    }

    pub fn identity(&self) -> Identity {
        Identity::of_weak(&self.inner)
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakCallable({}, alive: {})", self.identity(), self.is_alive())
    }
}

/// Shared, mutable array value.
#[derive(Clone, Default)]
pub struct List(Rc<RefCell<Vec<Value>>>);

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }
}

impl From<Vec<Value>> for List {
    fn from(values: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(values)))
    }
}

/// Shared, mutable string-keyed table value.
#[derive(Clone, Default)]
pub struct Table(Rc<RefCell<HashMap<String, Value>>>);

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.0.borrow().get(field).cloned()
    }

    /// Store a field; setting `Nil` removes it.
    pub fn set(&self, field: impl Into<String>, value: Value) {
        let field = field.into();
        let previous = if value.is_nil() {
            self.0.borrow_mut().remove(&field)
        } else {
            self.0.borrow_mut().insert(field, value)
        };
        drop(previous);
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn fields(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }
}

/// A value in the script-visible value space.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Str(Rc<str>),
    List(List),
    Table(Table),
    Function(Callable),
    Object(ObjectHandle),
}

impl Value {
    /// Name of the value's type as scripts see it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) | Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Object(_) => "object",
        }
    }

    /// Identity of reference values; scalars and strings have none.
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Value::List(list) => Some(list.identity()),
            Value::Table(table) => Some(table.identity()),
            Value::Function(callable) => Some(callable.identity()),
            Value::Object(object) => Some(object.identity()),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of integers and floats.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Callable> {
        match self {
            Value::Function(callable) => Some(callable),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(list) => write!(f, "list({})", list.identity()),
            Value::Table(table) => write!(f, "table({})", table.identity()),
            Value::Function(callable) => write!(f, "function({})", callable.identity()),
            Value::Object(object) => {
                write!(f, "{}({})", object.class().name(), object.identity())
            }
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Callable> for Value {
    fn from(callable: Callable) -> Self {
        Value::Function(callable)
    }
}

impl From<ObjectHandle> for Value {
    fn from(object: ObjectHandle) -> Self {
        Value::Object(object)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}

impl From<Table> for Value {
    fn from(table: Table) -> Self {
        Value::Table(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_have_no_identity() {
        assert_eq!(Value::Nil.identity(), None);
        assert_eq!(Value::from(3).identity(), None);
        assert_eq!(Value::from("text").identity(), None);
    }

    #[test]
    fn reference_identity_survives_clone() {
        let f = Callable::new(|_| Ok(Value::Nil));
        let value = Value::from(f.clone());
        assert_eq!(value.identity(), Some(f.identity()));
        assert_eq!(value.clone(), value);

        let other = Callable::new(|_| Ok(Value::Nil));
        assert_ne!(Value::from(other), value);
    }

    #[test]
    fn weak_callable_keeps_identity_after_death() {
        let f = Callable::new(|_| Ok(Value::from(1)));
        let weak = f.downgrade();
        let identity = f.identity();
        assert!(weak.is_alive());
        assert_eq!(weak.upgrade().map(|c| c.identity()), Some(identity));

        drop(f);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
        assert_eq!(weak.identity(), identity);
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(Value::from(2), Value::from(2.0));
        assert_ne!(Value::from(2), Value::from(2.5));
        assert_eq!(Value::from(7).as_number(), Some(7.0));
    }

    #[test]
    fn table_set_nil_removes_field() {
        let table = Table::new();
        table.set("width", Value::from(3));
        assert_eq!(table.get("width"), Some(Value::from(3)));
        table.set("width", Value::Nil);
        assert!(table.get("width").is_none());
        assert!(table.is_empty());
    }
}
