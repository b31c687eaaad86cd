//! Runtime: owner of the process-wide tables
//!
//! `Runtime::init` creates the reference registry, the global signal store
//! and the class registry (with the root `Object` class); `shutdown` tears
//! them down and reports anything still retained.

use crate::class::{Class, ClassDescriptor, ClassRegistry, Property};
use crate::connection::Connection;
use crate::diagnostics::{Diagnostics, DEPRECATED_CALL};
use crate::error::{ArgumentError, RuntimeError};
use crate::object::ObjectHandle;
use crate::refs::{RefRegistry, Release};
use crate::settings::RuntimeSettings;
use crate::signal::SignalStore;
use crate::value::{Callable, Identity, Value};
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, info, trace, warn};

/// Name of the root class every runtime starts with.
pub const OBJECT_CLASS: &str = "Object";

/// Global signal emitted by [`Runtime::deprecate`].
pub const DEPRECATION_SIGNAL: &str = "debug.deprecation";

/// Global signal emitted by [`Runtime::emit_startup`].
pub const STARTUP_SIGNAL: &str = "startup";

/// Well-known keys of the runtime's slot table.
pub mod keys {
    pub const OBJECT_REGISTRY: &str = "relay.object.registry";
    pub const GLOBAL_SIGNALS: &str = "relay.signals.global";
    pub const CLASS_REGISTRY: &str = "relay.class.registry";
}

/// State every store and object of one runtime points back to.
pub(crate) struct Shared {
    pub(crate) refs: RefRegistry,
    pub(crate) settings: RuntimeSettings,
    pub(crate) diagnostics: Rc<Diagnostics>,
    shut_down: Cell<bool>,
}

impl Shared {
    pub(crate) fn new(settings: RuntimeSettings) -> Rc<Self> {
        let diagnostics = Rc::new(Diagnostics::new(&settings));
        Rc::new(Self {
            refs: RefRegistry::new(diagnostics.clone()),
            diagnostics,
            settings,
            shut_down: Cell::new(false),
        })
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.get()
    }

    /// Drop the registry reference held by a strong subscriber slot.
    ///
    /// Shutdown empties the registry wholesale, so slots of stores that
    /// outlive it (objects still held by the host) have nothing to release.
    pub(crate) fn release_slot(&self, identity: Identity) {
        if self.is_shut_down() && !self.refs.contains(identity) {
            trace!(%identity, "slot released after shutdown");
            return;
        }
        self.refs.release(identity);
    }
}

/// A process-wide table located by one of the [`keys`].
#[derive(Debug)]
pub enum Slot<'a> {
    References(&'a RefRegistry),
    GlobalSignals(&'a SignalStore),
    Classes(&'a [Rc<Class>]),
}

/// What [`Runtime::shutdown`] tore down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub global_signals_cleared: usize,
    pub class_signals_cleared: usize,
    pub leaked_refs: usize,
}

pub struct Runtime {
    shared: Rc<Shared>,
    classes: ClassRegistry,
    globals: SignalStore,
}

impl Runtime {
    pub fn init(settings: RuntimeSettings) -> Result<Self, RuntimeError> {
        let shared = Shared::new(settings);
        let mut classes = ClassRegistry::new();
        classes.register(ClassDescriptor::new(OBJECT_CLASS), &shared)?;
        let globals = SignalStore::new(shared.clone(), "global");

        info!(version = crate::VERSION, "relay runtime initialized");
        Ok(Self {
            shared,
            classes,
            globals,
        })
    }

    pub fn new() -> Result<Self, RuntimeError> {
        Self::init(RuntimeSettings::default())
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.shared.settings
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.shared.diagnostics
    }

    pub fn refs(&self) -> &RefRegistry {
        &self.shared.refs
    }

    pub fn retain(&self, value: &Value) -> Result<Identity, ArgumentError> {
        self.shared.refs.retain(value)
    }

    pub fn release(&self, identity: Identity) -> Release {
        self.shared.refs.release(identity)
    }

    pub fn lookup(&self, identity: Identity) -> Option<Value> {
        self.shared.refs.lookup(identity)
    }

    /// Locate a process-wide table by its well-known key.
    pub fn slot(&self, key: &str) -> Option<Slot<'_>> {
        match key {
            keys::OBJECT_REGISTRY => Some(Slot::References(&self.shared.refs)),
            keys::GLOBAL_SIGNALS => Some(Slot::GlobalSignals(&self.globals)),
            keys::CLASS_REGISTRY => Some(Slot::Classes(self.classes.as_slice())),
            _ => None,
        }
    }

    // Classes

    pub fn register_class(&mut self, descriptor: ClassDescriptor) -> Result<Rc<Class>, RuntimeError> {
        self.classes.register(descriptor, &self.shared)
    }

    pub fn find_class(&self, name: &str) -> Option<Rc<Class>> {
        self.classes.get(name)
    }

    pub fn class(&self, name: &str) -> Result<Rc<Class>, RuntimeError> {
        self.find_class(name).ok_or_else(|| RuntimeError::UnknownClass {
            name: name.to_string(),
        })
    }

    pub fn add_property(&self, class: &str, property: Property) -> Result<(), RuntimeError> {
        self.class(class)?.properties().insert(property)
    }

    /// Declare several properties; stops at the first duplicate.
    pub fn add_properties(
        &self,
        class: &str,
        properties: impl IntoIterator<Item = Property>,
    ) -> Result<(), RuntimeError> {
        let class = self.class(class)?;
        for property in properties {
            class.properties().insert(property)?;
        }
        Ok(())
    }

    pub fn construct(&self, class: &str) -> Result<ObjectHandle, RuntimeError> {
        let class = self.class(class)?;
        Ok(ObjectHandle::new(class, &self.shared))
    }

    // Global signals

    pub fn global_signals(&self) -> &SignalStore {
        &self.globals
    }

    pub fn connect_signal(&self, name: &str, callable: &Callable) -> Connection {
        Connection::connect(&self.globals, name, callable)
    }

    pub fn connect_signal_weak(&self, name: &str, callable: &Callable) -> Connection {
        Connection::connect_weak(&self.globals, name, callable)
    }

    pub fn disconnect_signal(&self, name: &str, callable: &Callable) -> bool {
        self.globals.disconnect(name, callable)
    }

    pub fn emit_signal(&self, name: &str, args: &[Value]) -> usize {
        self.globals.emit(name, args)
    }

    // Class signals

    pub fn connect_class_signal(
        &self,
        class: &str,
        name: &str,
        callable: &Callable,
    ) -> Result<Connection, RuntimeError> {
        Ok(Connection::connect(self.class(class)?.signals(), name, callable))
    }

    pub fn disconnect_class_signal(
        &self,
        class: &str,
        name: &str,
        callable: &Callable,
    ) -> Result<bool, RuntimeError> {
        Ok(self.class(class)?.signals().disconnect(name, callable))
    }

    pub fn emit_class_signal(&self, class: &str, name: &str, args: &[Value]) -> Result<usize, RuntimeError> {
        Ok(self.class(class)?.signals().emit(name, args))
    }

    /// Warn that `function` is deprecated and announce it on
    /// `debug.deprecation`.
    pub fn deprecate(&self, function: &str, replacement: &str) -> usize {
        self.shared.diagnostics.protocol_warning(
            DEPRECATED_CALL,
            format_args!("{function}: This function is deprecated and will be removed, see {replacement}"),
        );
        self.globals.emit(DEPRECATION_SIGNAL, &[Value::from(function)])
    }

    pub fn emit_startup(&self) -> usize {
        debug!("emitting startup");
        self.globals.emit(STARTUP_SIGNAL, &[])
    }

    /// Drop every global and class subscription, then the reference registry.
    pub fn shutdown(self) -> ShutdownReport {
        let global_signals_cleared = self.globals.clear();
        let class_signals_cleared: usize = self
            .classes
            .iter()
            .map(|class| class.signals().clear())
            .sum();

        let leaked_refs = self.shared.refs.len();
        if leaked_refs > 0 && self.shared.settings.report_leaks_on_shutdown {
            warn!(leaked_refs, "references still retained at shutdown");
        }
        self.shared.shut_down.set(true);
        self.shared.refs.clear();

        let report = ShutdownReport {
            global_signals_cleared,
            class_signals_cleared,
            leaked_refs,
        };
        info!(?report, "relay runtime shut down");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::check_integer;
    use crate::diagnostics::{PROTOCOL_WARNINGS, REFS_UNDERFLOW};
    use crate::value::List;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct CounterState {
        value: i64,
    }

    fn counter_descriptor() -> ClassDescriptor {
        ClassDescriptor::new("Counter")
            .parent(OBJECT_CLASS)
            .allocator(CounterState::default)
            .property(Property::new(
                "value",
                |object| Ok(Value::from(object.native::<CounterState>()?.value)),
                |object, value| {
                    object.native_mut::<CounterState>()?.value = check_integer(&value, 3)?;
                    object.emit_property_changed("value");
                    Ok(())
                },
            ))
    }

    fn hit_counter(hits: &Rc<Cell<u32>>) -> Callable {
        let hits = hits.clone();
        Callable::new(move |_| {
            hits.set(hits.get() + 1);
            Ok(Value::Nil)
        })
    }

    #[test]
    fn init_registers_root_class() {
        let runtime = Runtime::new().unwrap();
        let object = runtime.find_class(OBJECT_CLASS).unwrap();
        assert!(object.parent().is_none());
        assert!(matches!(runtime.construct("Nope"), Err(RuntimeError::UnknownClass { .. })));
    }

    #[test]
    fn counter_value_change_notifies_once() {
        let mut runtime = Runtime::new().unwrap();
        runtime.register_class(counter_descriptor()).unwrap();
        let counter = runtime.construct("Counter").unwrap();

        let calls = Rc::new(RefCell::new(Vec::new()));
        let subscriber = {
            let calls = calls.clone();
            Callable::new(move |args| {
                calls.borrow_mut().push(args.len());
                Ok(Value::Nil)
            })
        };
        let _connection = counter.signal(":property.value").connect(&subscriber);

        counter.set_member("value", Value::from(5)).unwrap();

        assert_eq!(*calls.borrow(), vec![0]);
        assert_eq!(counter.get("value").unwrap(), Value::from(5));

        let err = counter.set_member("value", Value::from(1.5)).unwrap_err();
        assert!(matches!(err, RuntimeError::Argument(_)));
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn subclass_reads_parent_property_added_later() {
        let mut runtime = Runtime::new().unwrap();
        runtime.register_class(ClassDescriptor::new("Parent")).unwrap();
        runtime
            .register_class(ClassDescriptor::new("Child").parent("Parent"))
            .unwrap();
        runtime
            .add_property("Parent", Property::read_only("p", |_| Ok(Value::from(10))))
            .unwrap();

        let child = runtime.construct("Child").unwrap();
        assert_eq!(child.get("p").unwrap(), Value::from(10));

        let err = runtime
            .add_properties(
                "Parent",
                [
                    Property::read_only("q", |_| Ok(Value::Nil)),
                    Property::read_only("p", |_| Ok(Value::Nil)),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateProperty { .. }));
        assert!(runtime.add_property("Ghost", Property::read_only("p", |_| Ok(Value::Nil))).is_err());
    }

    #[test]
    fn global_signals_and_deprecation() {
        let runtime = Runtime::new().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let listener = {
            let seen = seen.clone();
            Callable::new(move |args| {
                seen.borrow_mut().push(args.to_vec());
                Ok(Value::Nil)
            })
        };
        let hits = Rc::new(Cell::new(0));

        let _deprecation = runtime.connect_signal(DEPRECATION_SIGNAL, &listener).scoped();
        let _startup = runtime.connect_signal(STARTUP_SIGNAL, &hit_counter(&hits)).scoped();

        assert_eq!(runtime.deprecate("old_api", "new_api"), 1);
        assert_eq!(*seen.borrow(), vec![vec![Value::from("old_api")]]);
        assert_eq!(runtime.emit_startup(), 1);
        assert_eq!(hits.get(), 1);
        if relay_metrics::ENABLED {
            assert_eq!(runtime.diagnostics().counters().get(DEPRECATED_CALL), 1);
            assert_eq!(runtime.diagnostics().counters().get(PROTOCOL_WARNINGS), 1);
        }
    }

    #[test]
    fn class_signals_are_shared_by_name() {
        let mut runtime = Runtime::new().unwrap();
        runtime.register_class(counter_descriptor()).unwrap();
        let hits = Rc::new(Cell::new(0));
        let callable = hit_counter(&hits);

        let connection = runtime
            .connect_class_signal("Counter", "request::activate", &callable)
            .unwrap();
        assert_eq!(runtime.emit_class_signal("Counter", "request::activate", &[]).unwrap(), 1);
        assert_eq!(hits.get(), 1);
        assert!(connection.connected());

        assert!(runtime
            .disconnect_class_signal("Counter", "request::activate", &callable)
            .unwrap());
        assert!(!connection.connected());
        assert!(runtime.emit_class_signal("Missing", "x", &[]).is_err());
    }

    #[test]
    fn well_known_slots_resolve() {
        let runtime = Runtime::new().unwrap();
        assert!(matches!(runtime.slot(keys::OBJECT_REGISTRY), Some(Slot::References(_))));
        assert!(matches!(runtime.slot(keys::GLOBAL_SIGNALS), Some(Slot::GlobalSignals(_))));
        match runtime.slot(keys::CLASS_REGISTRY) {
            Some(Slot::Classes(classes)) => assert_eq!(classes[0].name(), OBJECT_CLASS),
            other => panic!("unexpected slot: {other:?}"),
        }
        assert!(runtime.slot("relay.unknown").is_none());
    }

    #[test]
    fn retained_values_are_counted() {
        let runtime = Runtime::new().unwrap();
        let list = Value::from(List::new());
        let id = runtime.retain(&list).unwrap();
        runtime.retain(&list).unwrap();

        assert_eq!(runtime.release(id), Release::Retained(1));
        assert_eq!(runtime.lookup(id), Some(list));
        assert_eq!(runtime.release(id), Release::Dropped);
        assert_eq!(runtime.release(id), Release::Unknown);
        assert!(runtime.retain(&Value::from(1.0)).is_err());
    }

    #[test]
    fn shutdown_clears_everything_and_reports_leaks() {
        let mut runtime = Runtime::new().unwrap();
        runtime.register_class(counter_descriptor()).unwrap();
        let hits = Rc::new(Cell::new(0));
        let callable = hit_counter(&hits);

        let global = runtime.connect_signal("startup", &callable);
        runtime.connect_signal("tick", &callable);
        runtime
            .connect_class_signal("Counter", "new", &callable)
            .unwrap();
        runtime.retain(&Value::from(List::new())).unwrap();

        let report = runtime.shutdown();
        assert_eq!(
            report,
            ShutdownReport {
                global_signals_cleared: 2,
                class_signals_cleared: 1,
                leaked_refs: 1,
            }
        );
        assert!(!global.connected());
        assert!(!global.disconnect());
    }

    #[test]
    fn objects_outliving_shutdown_release_quietly() {
        let mut runtime = Runtime::new().unwrap();
        runtime.register_class(counter_descriptor()).unwrap();
        let shared = runtime.shared.clone();
        let hits = Rc::new(Cell::new(0));
        let callable = hit_counter(&hits);

        let held = runtime.construct("Counter").unwrap();
        held.connect_signal("property.value", &callable);
        let disconnected_later = runtime.construct("Counter").unwrap();
        disconnected_later.connect_signal("tick", &callable);

        let report = runtime.shutdown();
        assert_eq!(report.leaked_refs, 1);
        assert!(shared.is_shut_down());
        assert!(shared.refs.is_empty());

        assert!(disconnected_later.disconnect_signal("tick", &callable));
        held.connect_signal("late", &callable);
        assert_eq!(shared.refs.count(callable.identity()), 1);
        drop(held);
        drop(disconnected_later);

        assert!(shared.refs.is_empty());
        if relay_metrics::ENABLED {
            assert_eq!(shared.diagnostics.counters().get(REFS_UNDERFLOW), 0);
            assert_eq!(shared.diagnostics.counters().get(PROTOCOL_WARNINGS), 0);
        }
    }
}
