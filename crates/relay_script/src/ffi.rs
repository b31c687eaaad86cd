//! Value conversion between relay and QuickJS
//!
//! Scalars, lists and tables are copied across. Host functions are not
//! exported to scripts; host objects cross as a plain `{ class, id }` record.

use relay_core::{List, Table, Value};
use rquickjs::{Array, Ctx, IntoJs, Object, Undefined};
use tracing::trace;

pub fn to_js<'js>(ctx: &Ctx<'js>, value: &Value) -> rquickjs::Result<rquickjs::Value<'js>> {
    match value {
        Value::Nil => Undefined.into_js(ctx),
        Value::Boolean(b) => (*b).into_js(ctx),
        Value::Integer(i) => match i32::try_from(*i) {
            Ok(small) => small.into_js(ctx),
            Err(_) => (*i as f64).into_js(ctx),
        },
        Value::Number(n) => (*n).into_js(ctx),
        Value::Str(s) => (&**s).into_js(ctx),
        Value::List(list) => {
            let array = Array::new(ctx.clone())?;
            for (index, item) in list.to_vec().iter().enumerate() {
                array.set(index, to_js(ctx, item)?)?;
            }
            array.into_js(ctx)
        }
        Value::Table(table) => {
            let object = Object::new(ctx.clone())?;
            for (field, item) in table.fields() {
                object.set(field, to_js(ctx, &item)?)?;
            }
            object.into_js(ctx)
        }
        Value::Object(handle) => {
            let object = Object::new(ctx.clone())?;
            object.set("class", handle.class().name())?;
            object.set("id", handle.identity().to_bits() as f64)?;
            object.into_js(ctx)
        }
        Value::Function(callable) => {
            trace!(identity = %callable.identity(), "host function passed to script as undefined");
            Undefined.into_js(ctx)
        }
    }
}

pub fn from_js(value: &rquickjs::Value<'_>) -> rquickjs::Result<Value> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Nil);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Value::Boolean(b));
    }
    if let Some(i) = value.as_int() {
        return Ok(Value::Integer(i64::from(i)));
    }
    if let Some(n) = value.as_float() {
        return Ok(Value::Number(n));
    }
    if let Some(s) = value.as_string() {
        return Ok(Value::from(s.to_string()?));
    }
    if let Some(array) = value.as_array() {
        let list = List::new();
        for item in array.iter::<rquickjs::Value>() {
            list.push(from_js(&item?)?);
        }
        return Ok(Value::List(list));
    }
    if value.is_function() {
        return Ok(Value::Nil);
    }
    if let Some(object) = value.as_object() {
        let table = Table::new();
        for entry in object.props::<String, rquickjs::Value>() {
            let (field, item) = entry?;
            table.set(field, from_js(&item)?);
        }
        return Ok(Value::Table(table));
    }
    Ok(Value::Nil)
}
