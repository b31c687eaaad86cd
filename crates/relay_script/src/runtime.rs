//! Script runtime management
//!
//! Wraps a QuickJS runtime and hands out script functions as relay
//! [`Callable`]s, so they can subscribe to signals like native closures.
//!
//! Subscribers are resolved by global name at call time and must be invoked
//! from the host side: a subscriber called while the same script context is
//! already executing cannot re-enter it.

use crate::ffi::{from_js, to_js};
use relay_core::{Callable, CallResult, RuntimeError, Value};
use rquickjs::function::Rest;
use rquickjs::{Context, Ctx, Function, Runtime};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script engine error: {0}")]
    Engine(#[from] rquickjs::Error),

    #[error("script raised: {message}")]
    Exception { message: String },

    #[error("global '{name}' is not a function")]
    NotAFunction { name: String },

    #[error("failed to read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Script execution context
pub struct ScriptRuntime {
    subscribers: RefCell<HashMap<String, Callable>>,
    context: Context,
    #[allow(dead_code)] // Kept alive for context lifetime
    runtime: Runtime,
}

impl ScriptRuntime {
    pub fn new() -> Result<Self, ScriptError> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;

        Ok(Self {
            subscribers: RefCell::new(HashMap::new()),
            context,
            runtime,
        })
    }

    pub fn execute_file(&self, path: &Path) -> Result<(), ScriptError> {
        let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "executing script file");
        self.execute(&source)
    }

    pub fn execute(&self, source: &str) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            ctx.eval::<(), _>(source)
                .map_err(|error| script_error(&ctx, error))
        })
    }

    /// Evaluate an expression and convert its result.
    pub fn eval_value(&self, source: &str) -> Result<Value, ScriptError> {
        self.context.with(|ctx| {
            let value: rquickjs::Value = ctx
                .eval(source)
                .map_err(|error| script_error(&ctx, error))?;
            Ok(from_js(&value)?)
        })
    }

    pub fn set_global(&self, name: &str, value: &Value) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            let converted = to_js(&ctx, value)?;
            ctx.globals().set(name, converted)?;
            Ok(())
        })
    }

    /// Callable running the global script function `name`.
    ///
    /// Repeated calls return the same callable, so the result can be used to
    /// disconnect what an earlier call connected.
    pub fn subscriber(&self, name: &str) -> Result<Callable, ScriptError> {
        if let Some(callable) = self.subscribers.borrow().get(name) {
            return Ok(callable.clone());
        }

        let is_function = self.context.with(|ctx| {
            ctx.globals()
                .get::<_, rquickjs::Value>(name)
                .map(|value| value.is_function())
        })?;
        if !is_function {
            return Err(ScriptError::NotAFunction {
                name: name.to_string(),
            });
        }

        let context = self.context.clone();
        let global: Rc<str> = Rc::from(name);
        let callable = Callable::new(move |args| call_global(&context, &global, args));
        self.subscribers
            .borrow_mut()
            .insert(name.to_string(), callable.clone());
        debug!(function = name, identity = %callable.identity(), "script subscriber created");
        Ok(callable)
    }

    /// Call a JavaScript function by name.
    pub fn call_function(&self, name: &str, args: &[Value]) -> CallResult {
        call_global(&self.context, name, args)
    }
}

fn call_global(context: &Context, name: &str, args: &[Value]) -> CallResult {
    context.with(|ctx| {
        let function: Function = ctx
            .globals()
            .get(name)
            .map_err(|_| RuntimeError::script(format!("global '{name}' is not a function")))?;
        let converted = args
            .iter()
            .map(|arg| to_js(&ctx, arg))
            .collect::<rquickjs::Result<Vec<_>>>()
            .map_err(|error| RuntimeError::script(error.to_string()))?;

        let result: rquickjs::Value = function
            .call((Rest(converted),))
            .map_err(|error| RuntimeError::script(script_error(&ctx, error).to_string()))?;
        from_js(&result).map_err(|error| RuntimeError::script(error.to_string()))
    })
}

fn script_error(ctx: &Ctx<'_>, error: rquickjs::Error) -> ScriptError {
    if !matches!(error, rquickjs::Error::Exception) {
        return ScriptError::Engine(error);
    }
    let caught = ctx.catch();
    let message = caught
        .as_exception()
        .and_then(|exception| exception.message())
        .or_else(|| caught.as_string().and_then(|s| s.to_string().ok()))
        .unwrap_or_else(|| "uncaught exception".to_string());
    ScriptError::Exception { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{List, Runtime as RelayRuntime};

    #[test]
    fn script_subscriber_receives_emitted_args() {
        let script = ScriptRuntime::new().unwrap();
        script
            .execute("var calls = []; function on_value(a, b) { calls.push([a, b]); }")
            .unwrap();
        let relay = RelayRuntime::new().unwrap();
        let subscriber = script.subscriber("on_value").unwrap();

        let _connection = relay.connect_signal("value", &subscriber).scoped();
        assert_eq!(relay.emit_signal("value", &[Value::from(1), Value::from("two")]), 1);
        assert_eq!(relay.emit_signal("value", &[Value::from(2.5), Value::Nil]), 1);

        let calls = script.eval_value("calls").unwrap();
        let calls = calls.as_list().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls.get(0).unwrap().as_list().unwrap().to_vec(),
            vec![Value::from(1), Value::from("two")]
        );
        assert_eq!(
            calls.get(1).unwrap().as_list().unwrap().to_vec(),
            vec![Value::from(2.5), Value::Nil]
        );
    }

    #[test]
    fn subscriber_identity_is_stable_per_name() {
        let script = ScriptRuntime::new().unwrap();
        script.execute("function f() {}").unwrap();

        let first = script.subscriber("f").unwrap();
        let second = script.subscriber("f").unwrap();
        assert_eq!(first.identity(), second.identity());

        let relay = RelayRuntime::new().unwrap();
        relay.connect_signal("x", &first);
        assert!(relay.disconnect_signal("x", &second));
        assert!(!relay.global_signals().contains("x"));
    }

    #[test]
    fn throwing_subscriber_does_not_stop_emission() {
        let script = ScriptRuntime::new().unwrap();
        script
            .execute("var hits = 0; function boom() { throw new Error('nope'); } function count() { hits += 1; }")
            .unwrap();

        let boom = script.subscriber("boom").unwrap();
        let err = boom.call(&[]).unwrap_err();
        assert!(err.to_string().contains("nope"));

        let relay = RelayRuntime::new().unwrap();
        let _a = relay.connect_signal("x", &boom).scoped();
        let _b = relay.connect_signal("x", &script.subscriber("count").unwrap()).scoped();
        assert_eq!(relay.emit_signal("x", &[]), 2);
        assert_eq!(script.eval_value("hits").unwrap(), Value::from(1));
    }

    #[test]
    fn non_function_globals_are_rejected() {
        let script = ScriptRuntime::new().unwrap();
        script.execute("var answer = 42;").unwrap();
        assert!(matches!(
            script.subscriber("answer"),
            Err(ScriptError::NotAFunction { .. })
        ));
        assert!(script.subscriber("missing").is_err());
    }

    #[test]
    fn tables_and_lists_cross_the_boundary() {
        let script = ScriptRuntime::new().unwrap();
        let list = List::from(vec![Value::from(true), Value::from("x")]);
        script.set_global("items", &Value::from(list)).unwrap();
        assert_eq!(script.eval_value("items.length").unwrap(), Value::from(2));

        let table = script.eval_value("({ width: 3, label: 'ok' })").unwrap();
        let table = table.as_table().unwrap();
        assert_eq!(table.get("width"), Some(Value::from(3)));
        assert_eq!(table.get("label"), Some(Value::from("ok")));
    }

    #[test]
    fn syntax_errors_surface_as_exceptions() {
        let script = ScriptRuntime::new().unwrap();
        assert!(matches!(
            script.execute("function ("),
            Err(ScriptError::Exception { .. })
        ));
    }
}
