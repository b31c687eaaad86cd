//! Classes, properties and the class registry
//!
//! A class is registered once from a [`ClassDescriptor`]. Registration wires
//! the subclass's property table to its parent's (a read-through chain, not a
//! copy), so properties added to a parent later are visible from every
//! subclass.

use crate::error::RuntimeError;
use crate::object::{Key, ObjectHandle};
use crate::runtime::Shared;
use crate::signal::SignalStore;
use crate::value::{CallResult, Value};
use once_cell::unsync::OnceCell;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

pub type Getter = Rc<dyn Fn(&ObjectHandle) -> CallResult>;
pub type Setter = Rc<dyn Fn(&ObjectHandle, Value) -> Result<(), RuntimeError>>;
pub type Method = Rc<dyn Fn(&ObjectHandle, &[Value]) -> CallResult>;
pub type Allocator = Rc<dyn Fn() -> Box<dyn Any>>;
pub type Finalizer = Rc<dyn Fn(&mut dyn Any)>;
pub type IndexHandler = Rc<dyn Fn(&ObjectHandle, &Key) -> CallResult>;
pub type NewIndexHandler = Rc<dyn Fn(&ObjectHandle, &Key, Value) -> Result<(), RuntimeError>>;

/// A computed member: getter plus optional setter.
#[derive(Clone)]
pub struct Property {
    name: Rc<str>,
    getter: Getter,
    setter: Option<Setter>,
}

impl Property {
    pub fn new<G, S>(name: &str, getter: G, setter: S) -> Self
    where
        G: Fn(&ObjectHandle) -> CallResult + 'static,
        S: Fn(&ObjectHandle, Value) -> Result<(), RuntimeError> + 'static,
    {
        Self::read_only(name, getter).with_setter(setter)
    }

    pub fn read_only<G>(name: &str, getter: G) -> Self
    where
        G: Fn(&ObjectHandle) -> CallResult + 'static,
    {
        Self {
            name: Rc::from(name),
            getter: Rc::new(getter),
            setter: None,
        }
    }

    pub fn with_setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(&ObjectHandle, Value) -> Result<(), RuntimeError> + 'static,
    {
        self.setter = Some(Rc::new(setter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_read_only(&self) -> bool {
        self.setter.is_none()
    }

    pub fn get(&self, object: &ObjectHandle) -> CallResult {
        (self.getter)(object)
    }

    pub(crate) fn setter(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

/// Property table of one class, falling back to its parent's table.
pub struct PropertyTable {
    class: Rc<str>,
    entries: RefCell<HashMap<Rc<str>, Property>>,
    parent: OnceCell<Rc<PropertyTable>>,
}

impl PropertyTable {
    fn new(class: Rc<str>) -> Self {
        Self {
            class,
            entries: RefCell::new(HashMap::new()),
            parent: OnceCell::new(),
        }
    }

    /// Declare `property` on this class. A parent's property of the same
    /// name is shadowed; redeclaring one of this class's own is an error.
    pub fn insert(&self, property: Property) -> Result<(), RuntimeError> {
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(&property.name) {
            return Err(RuntimeError::DuplicateProperty {
                class: self.class.to_string(),
                property: property.name.to_string(),
            });
        }
        entries.insert(property.name.clone(), property);
        Ok(())
    }

    /// Find `name` here or along the parent chain.
    pub fn lookup(&self, name: &str) -> Option<Property> {
        let mut table = self;
        loop {
            if let Some(property) = table.entries.borrow().get(name) {
                return Some(property.clone());
            }
            table = table.parent.get().map(Rc::as_ref)?;
        }
    }

    /// Whether `name` is declared on this class itself.
    pub fn declares(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }

    pub(crate) fn inherit(&self, parent: Rc<PropertyTable>) -> Result<(), RuntimeError> {
        self.parent
            .set(parent)
            .map_err(|_| RuntimeError::AlreadyInherited {
                class: self.class.to_string(),
            })
    }

    pub fn parent(&self) -> Option<&Rc<PropertyTable>> {
        self.parent.get()
    }

    /// Every visible property name, own and inherited, sorted.
    pub fn names(&self) -> Vec<Rc<str>> {
        let mut names = Vec::new();
        let mut table = Some(self);
        while let Some(current) = table {
            names.extend(current.entries.borrow().keys().cloned());
            table = current.parent.get().map(Rc::as_ref);
        }
        names.sort();
        names.dedup();
        names
    }
}

/// A registered class.
pub struct Class {
    name: Rc<str>,
    parent: Option<Rc<Class>>,
    allocator: Option<Allocator>,
    finalizer: Option<Finalizer>,
    methods: HashMap<Rc<str>, Method>,
    properties: Rc<PropertyTable>,
    signals: SignalStore,
    index_miss: RefCell<Option<IndexHandler>>,
    newindex_miss: RefCell<Option<NewIndexHandler>>,
    instances: Cell<usize>,
}

impl Class {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Rc<Class>> {
        self.parent.as_ref()
    }

    /// This class followed by its ancestors.
    pub fn chain(&self) -> impl Iterator<Item = &Class> {
        std::iter::successors(Some(self), |class| class.parent.as_deref())
    }

    pub fn is_subclass_of(&self, name: &str) -> bool {
        self.chain().any(|class| &*class.name == name)
    }

    pub fn properties(&self) -> &Rc<PropertyTable> {
        &self.properties
    }

    /// Class-level signals, shared by every instance.
    pub fn signals(&self) -> &SignalStore {
        &self.signals
    }

    /// Number of live instances of exactly this class.
    pub fn instances(&self) -> usize {
        self.instances.get()
    }

    pub(crate) fn instance_created(&self) {
        self.instances.set(self.instances.get() + 1);
    }

    pub(crate) fn instance_dropped(&self) {
        self.instances.set(self.instances.get().saturating_sub(1));
    }

    pub fn method(&self, name: &str) -> Option<Method> {
        self.chain()
            .find_map(|class| class.methods.get(name))
            .cloned()
    }

    /// Native state for a new instance, from the nearest allocator.
    pub(crate) fn allocate(&self) -> Box<dyn Any> {
        match self.chain().find_map(|class| class.allocator.as_ref()) {
            Some(allocator) => allocator(),
            None => Box::new(()),
        }
    }

    pub(crate) fn finalizer(&self) -> Option<Finalizer> {
        self.chain()
            .find_map(|class| class.finalizer.as_ref())
            .cloned()
    }

    pub fn set_index_miss_handler<F>(&self, handler: F)
    where
        F: Fn(&ObjectHandle, &Key) -> CallResult + 'static,
    {
        *self.index_miss.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn set_newindex_miss_handler<F>(&self, handler: F)
    where
        F: Fn(&ObjectHandle, &Key, Value) -> Result<(), RuntimeError> + 'static,
    {
        *self.newindex_miss.borrow_mut() = Some(Rc::new(handler));
    }

    pub(crate) fn index_miss_handler(&self) -> Option<IndexHandler> {
        self.chain()
            .find_map(|class| class.index_miss.borrow().clone())
    }

    pub(crate) fn newindex_miss_handler(&self) -> Option<NewIndexHandler> {
        self.chain()
            .find_map(|class| class.newindex_miss.borrow().clone())
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|parent| parent.name()))
            .field("instances", &self.instances.get())
            .finish()
    }
}

/// Builder describing a class to register.
///
/// ```
/// # use relay_core::{ClassDescriptor, Property, Value};
/// let descriptor = ClassDescriptor::new("Button")
///     .parent("Object")
///     .allocator(|| 0_i64)
///     .property(Property::read_only("kind", |_| Ok(Value::from("button"))));
/// assert_eq!(descriptor.name(), "Button");
/// ```
pub struct ClassDescriptor {
    name: String,
    parent: Option<String>,
    allocator: Option<Allocator>,
    finalizer: Option<Finalizer>,
    methods: Vec<(Rc<str>, Method)>,
    properties: Vec<Property>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            allocator: None,
            finalizer: None,
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Create each instance's native state.
    pub fn allocator<T, F>(mut self, allocate: F) -> Self
    where
        T: Any,
        F: Fn() -> T + 'static,
    {
        self.allocator = Some(Rc::new(move || Box::new(allocate()) as Box<dyn Any>));
        self
    }

    /// Run on an instance's native state just before it is dropped.
    ///
    /// Only called when the state is a `T`; a subclass allocating a
    /// different type should install its own finalizer.
    pub fn finalizer<T, F>(mut self, finalize: F) -> Self
    where
        T: Any,
        F: Fn(&mut T) + 'static,
    {
        self.finalizer = Some(Rc::new(move |state: &mut dyn Any| {
            if let Some(state) = state.downcast_mut::<T>() {
                finalize(state);
            }
        }));
        self
    }

    pub fn method<F>(mut self, name: &str, method: F) -> Self
    where
        F: Fn(&ObjectHandle, &[Value]) -> CallResult + 'static,
    {
        self.methods.push((Rc::from(name), Rc::new(method)));
        self
    }

    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn properties(mut self, properties: impl IntoIterator<Item = Property>) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref()
    }
}

pub(crate) struct ClassRegistry {
    classes: Vec<Rc<Class>>,
    name_lookup: HashMap<Rc<str>, usize>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            name_lookup: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        descriptor: ClassDescriptor,
        shared: &Rc<Shared>,
    ) -> Result<Rc<Class>, RuntimeError> {
        if self.name_lookup.contains_key(descriptor.name.as_str()) {
            return Err(RuntimeError::DuplicateClass {
                name: descriptor.name,
            });
        }

        let parent = match &descriptor.parent {
            Some(parent) => Some(self.get(parent).ok_or_else(|| RuntimeError::UnknownClass {
                name: parent.clone(),
            })?),
            None => None,
        };

        let name: Rc<str> = Rc::from(descriptor.name);
        let properties = Rc::new(PropertyTable::new(name.clone()));
        for property in descriptor.properties {
            properties.insert(property)?;
        }
        if let Some(parent) = &parent {
            properties.inherit(parent.properties.clone())?;
        }

        let mut methods = HashMap::new();
        for (method_name, method) in descriptor.methods {
            methods.insert(method_name, method);
        }

        let class = Rc::new(Class {
            signals: SignalStore::new(shared.clone(), format!("class {name}")),
            name: name.clone(),
            parent,
            allocator: descriptor.allocator,
            finalizer: descriptor.finalizer,
            methods,
            properties,
            index_miss: RefCell::new(None),
            newindex_miss: RefCell::new(None),
            instances: Cell::new(0),
        });

        debug!(
            class = %name,
            parent = class.parent.as_ref().map(|parent| parent.name()),
            "registered class"
        );
        self.name_lookup.insert(name, self.classes.len());
        self.classes.push(class.clone());
        Ok(class)
    }

    pub fn get(&self, name: &str) -> Option<Rc<Class>> {
        self.name_lookup
            .get(name)
            .and_then(|index| self.classes.get(*index))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn as_slice(&self) -> &[Rc<Class>] {
        &self.classes
    }

    /// Registered classes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<Class>> {
        self.classes.iter()
    }
}
