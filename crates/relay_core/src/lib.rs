//! Relay Core
//!
//! Object/class/signal runtime for script-visible native objects:
//! - Reference registry (keeps host-held script values alive)
//! - Signal stores with strong and weak subscriptions
//! - Class registry with single-parent inheritance and property chaining
//! - Revocable and scoped connection handles
//!
//! Everything here is single-threaded (`Rc`/`RefCell`); a [`Runtime`] is the
//! explicit owner of the process-wide tables and is torn down with
//! [`Runtime::shutdown`].

pub mod check;
pub mod class;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod object;
pub mod refs;
pub mod runtime;
pub mod settings;
pub mod signal;
pub mod value;

pub use class::{Class, ClassDescriptor, Property, PropertyTable};
pub use connection::{Connection, ScopedConnection};
pub use diagnostics::Diagnostics;
pub use error::{ArgumentError, RuntimeError};
pub use object::{Key, Member, ObjectHandle, SIGIL};
pub use refs::{RefRegistry, Release};
pub use runtime::{
    keys, Runtime, ShutdownReport, Slot, DEPRECATION_SIGNAL, OBJECT_CLASS, STARTUP_SIGNAL,
};
pub use settings::RuntimeSettings;
pub use signal::{SignalId, SignalInterface, SignalStore};
pub use value::{CallResult, Callable, Identity, List, Table, Value, WeakCallable};

/// Runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
