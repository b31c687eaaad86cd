//! Relay Runtime
//!
//! Demo binary: boots a runtime, registers a `Counter` class, wires a script
//! subscriber to its `property.value` signal and shuts everything down.
//!
//! Usage: `relay [settings.json] [script.js]`

use anyhow::{Context, Result};
use relay_core::check::check_integer;
use relay_core::{ClassDescriptor, Property, Runtime, RuntimeSettings, Value, OBJECT_CLASS};
use relay_script::ScriptRuntime;
use std::path::Path;

const DEFAULT_SCRIPT: &str = r#"
var changes = 0;
function on_value_changed() { changes += 1; }
function on_startup() { }
"#;

#[derive(Default)]
struct CounterState {
    value: i64,
}

fn counter_class() -> ClassDescriptor {
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

fn load_settings(path: Option<&str>) -> Result<RuntimeSettings> {
    let Some(path) = path else {
        return Ok(RuntimeSettings::default());
    };
    let source = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    RuntimeSettings::from_json(&source).with_context(|| format!("parsing {path}"))
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let settings = load_settings(args.next().as_deref())?;
    let script_path = args.next();

    tracing::info!("Relay v{}", relay_core::VERSION);
    let mut runtime = Runtime::init(settings)?;
    runtime.register_class(counter_class())?;

    let script = ScriptRuntime::new()?;
    match &script_path {
        Some(path) => script.execute_file(Path::new(path))?,
        None => script.execute(DEFAULT_SCRIPT)?,
    }

    let startup = runtime
        .connect_signal("startup", &script.subscriber("on_startup")?)
        .scoped();
    runtime.emit_startup();

    let counter = runtime.construct("Counter")?;
    let connection = counter.connect_signal(":property.value", &script.subscriber("on_value_changed")?);
    counter.set_member("value", Value::from(5))?;
    tracing::info!(
        value = ?counter.get("value")?,
        changes = ?script.eval_value("changes")?,
        "counter updated"
    );
    connection.disconnect();

    for (name, count) in runtime.diagnostics().counters().snapshot() {
        tracing::info!(counter = name, count, "metrics");
    }

    drop(startup);
    let report = runtime.shutdown();
    tracing::info!(?report, "shutdown complete");

    Ok(())
}
