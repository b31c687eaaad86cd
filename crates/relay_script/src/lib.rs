//! Relay Scripting Host
//!
//! JavaScript subscribers via QuickJS
//!
//! ## Architecture
//!
//! - **Runtime:** one QuickJS runtime and context per [`ScriptRuntime`]
//! - **Subscribers:** global script functions wrapped as relay callables
//! - **FFI:** scalars, lists and tables are copied across the boundary

pub mod ffi;
pub mod runtime;

pub use runtime::{ScriptError, ScriptRuntime};
pub use rquickjs;
