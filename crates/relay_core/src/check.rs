//! Argument validation for native callables
//!
//! Positions are 1-based. `opt_*` variants treat a missing or nil argument as
//! the default. `getopt_*` read a table field: a missing field or one that is
//! not a number yields the default, while a number that fails the integer or
//! range check is an error.

use crate::error::ArgumentError;
use crate::value::{Callable, Table, Value};

/// Argument at 1-based `position`, if present.
pub fn arg(args: &[Value], position: usize) -> Option<&Value> {
    position.checked_sub(1).and_then(|index| args.get(index))
}

pub fn check_number(value: &Value, position: usize) -> Result<f64, ArgumentError> {
    value
        .as_number()
        .ok_or_else(|| ArgumentError::type_mismatch(position, "number", value.type_name()))
}

pub fn check_number_range(
    value: &Value,
    position: usize,
    min: f64,
    max: f64,
) -> Result<f64, ArgumentError> {
    let number = check_number(value, position)?;
    if number < min || number > max {
        return Err(ArgumentError::Range {
            position,
            min,
            max,
            value: number,
        });
    }
    Ok(number)
}

pub fn opt_number_range(
    value: Option<&Value>,
    position: usize,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64, ArgumentError> {
    match value {
        None | Some(Value::Nil) => Ok(default),
        Some(value) => check_number_range(value, position, min, max),
    }
}

/// Integral number; `2.0` passes, `2.5` does not, nor does anything outside
/// the `i64` range.
pub fn check_integer(value: &Value, position: usize) -> Result<i64, ArgumentError> {
    match value {
        Value::Integer(integer) => Ok(*integer),
        Value::Number(number) if is_integral(*number) => Ok(*number as i64),
        Value::Number(_) => Err(ArgumentError::type_mismatch(position, "integer", "number")),
        other => Err(ArgumentError::type_mismatch(position, "integer", other.type_name())),
    }
}

// 2^63 is exactly representable but one past `i64::MAX`.
fn is_integral(number: f64) -> bool {
    number.fract() == 0.0 && number >= i64::MIN as f64 && number < i64::MAX as f64
}

pub fn check_integer_range(
    value: &Value,
    position: usize,
    min: f64,
    max: f64,
) -> Result<i64, ArgumentError> {
    let integer = check_integer(value, position)?;
    let as_number = integer as f64;
    if as_number < min || as_number > max {
        return Err(ArgumentError::Range {
            position,
            min,
            max,
            value: as_number,
        });
    }
    Ok(integer)
}

pub fn opt_integer(value: Option<&Value>, position: usize, default: i64) -> Result<i64, ArgumentError> {
    match value {
        None | Some(Value::Nil) => Ok(default),
        Some(value) => check_integer(value, position),
    }
}

pub fn opt_integer_range(
    value: Option<&Value>,
    position: usize,
    default: i64,
    min: f64,
    max: f64,
) -> Result<i64, ArgumentError> {
    match value {
        None | Some(Value::Nil) => Ok(default),
        Some(value) => check_integer_range(value, position, min, max),
    }
}

pub fn check_boolean(value: &Value, position: usize) -> Result<bool, ArgumentError> {
    value
        .as_bool()
        .ok_or_else(|| ArgumentError::type_mismatch(position, "boolean", value.type_name()))
}

pub fn check_string(value: &Value, position: usize) -> Result<&str, ArgumentError> {
    value
        .as_str()
        .ok_or_else(|| ArgumentError::type_mismatch(position, "string", value.type_name()))
}

pub fn check_function(value: &Value, position: usize) -> Result<&Callable, ArgumentError> {
    value
        .as_function()
        .ok_or_else(|| ArgumentError::type_mismatch(position, "function", value.type_name()))
}

/// Lists and tables both count as tables.
pub fn check_table(value: &Value, position: usize) -> Result<(), ArgumentError> {
    match value {
        Value::Table(_) | Value::List(_) => Ok(()),
        other => Err(ArgumentError::type_mismatch(position, "table", other.type_name())),
    }
}

fn numeric_field(table: &Table, field: &str) -> Option<Value> {
    table
        .get(field)
        .filter(|value| matches!(value, Value::Integer(_) | Value::Number(_)))
}

fn field_range(field: &str, min: f64, max: f64, value: f64) -> ArgumentError {
    ArgumentError::FieldRange {
        field: field.to_string(),
        min,
        max,
        value,
    }
}

pub fn getopt_number(table: &Table, field: &str, default: f64) -> f64 {
    numeric_field(table, field)
        .and_then(|value| value.as_number())
        .unwrap_or(default)
}

pub fn getopt_number_range(
    table: &Table,
    field: &str,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64, ArgumentError> {
    let Some(number) = numeric_field(table, field).and_then(|value| value.as_number()) else {
        return Ok(default);
    };
    if number < min || number > max {
        return Err(field_range(field, min, max, number));
    }
    Ok(number)
}

pub fn getopt_integer(table: &Table, field: &str, default: i64) -> Result<i64, ArgumentError> {
    match numeric_field(table, field) {
        None => Ok(default),
        Some(value) => check_integer(&value, 1).map_err(|_| ArgumentError::FieldType {
            field: field.to_string(),
            expected: "integer",
            got: "number",
        }),
    }
}

pub fn getopt_integer_range(
    table: &Table,
    field: &str,
    default: i64,
    min: f64,
    max: f64,
) -> Result<i64, ArgumentError> {
    let integer = getopt_integer(table, field, default)?;
    if numeric_field(table, field).is_some() {
        let as_number = integer as f64;
        if as_number < min || as_number > max {
            return Err(field_range(field, min, max, as_number));
        }
    }
    Ok(integer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_checks_report_position() {
        assert_eq!(check_number(&Value::from(2.5), 1), Ok(2.5));
        assert_eq!(check_number(&Value::from(3), 1), Ok(3.0));

        let err = check_number(&Value::from("3"), 2).unwrap_err();
        assert_eq!(err.to_string(), "bad argument #2 (number expected, got string)");

        let err = check_number_range(&Value::from(1.5), 3, 0.0, 1.0).unwrap_err();
        assert_eq!(err.position(), Some(3));
        assert!(matches!(err, ArgumentError::Range { value, .. } if value == 1.5));
    }

    #[test]
    fn integers_must_be_integral() {
        assert_eq!(check_integer(&Value::from(4.0), 1), Ok(4));
        assert_eq!(check_integer(&Value::from(-7), 1), Ok(-7));

        let err = check_integer(&Value::from(4.5), 2).unwrap_err();
        assert_eq!(err.to_string(), "bad argument #2 (integer expected, got number)");
        assert!(check_integer(&Value::from(f64::NAN), 1).is_err());
        assert!(check_integer(&Value::Nil, 1).is_err());

        assert_eq!(check_integer_range(&Value::from(5), 1, 0.0, 10.0), Ok(5));
        assert!(check_integer_range(&Value::from(11), 1, 0.0, 10.0).is_err());
    }

    #[test]
    fn integral_numbers_beyond_i64_are_rejected() {
        let err = check_integer(&Value::from(1e300), 1).unwrap_err();
        assert_eq!(err.to_string(), "bad argument #1 (integer expected, got number)");
        assert!(check_integer(&Value::from(-1e19), 1).is_err());
        assert!(check_integer(&Value::from(2f64.powi(63)), 1).is_err());
        assert!(check_integer(&Value::from(f64::INFINITY), 1).is_err());

        assert_eq!(check_integer(&Value::from(-(2f64.powi(63))), 1), Ok(i64::MIN));
        assert_eq!(check_integer(&Value::from(1e15), 1), Ok(1_000_000_000_000_000));
    }

    #[test]
    fn optional_arguments_fall_back_on_nil() {
        let args = [Value::from(3), Value::Nil];
        assert_eq!(opt_integer(arg(&args, 1), 1, 9), Ok(3));
        assert_eq!(opt_integer(arg(&args, 2), 2, 9), Ok(9));
        assert_eq!(opt_integer(arg(&args, 3), 3, 9), Ok(9));
        assert!(arg(&args, 0).is_none());

        assert_eq!(opt_number_range(None, 1, 0.5, 0.0, 1.0), Ok(0.5));
        assert!(opt_number_range(Some(&Value::from(2)), 1, 0.5, 0.0, 1.0).is_err());
        assert_eq!(opt_integer_range(Some(&Value::Nil), 1, 4, 0.0, 3.0), Ok(4));
        assert!(opt_integer_range(Some(&Value::from(4)), 1, 0, 0.0, 3.0).is_err());
    }

    #[test]
    fn non_number_types() {
        assert_eq!(check_boolean(&Value::from(true), 1), Ok(true));
        assert!(check_boolean(&Value::from(1), 1).is_err());
        assert_eq!(check_string(&Value::from("name"), 1), Ok("name"));

        let callable = Callable::new(|_| Ok(Value::Nil));
        let function = Value::from(callable.clone());
        assert_eq!(check_function(&function, 1).map(Callable::identity), Ok(callable.identity()));
        assert!(check_function(&Value::from("f"), 1).is_err());

        assert!(check_table(&Value::from(Table::new()), 1).is_ok());
        let err = check_table(&Value::from(false), 4).unwrap_err();
        assert_eq!(err.to_string(), "bad argument #4 (table expected, got boolean)");
    }

    #[test]
    fn table_fields_with_defaults() {
        let table = Table::new();
        table.set("width", Value::from(12));
        table.set("opacity", Value::from(0.5));
        table.set("label", Value::from("not a number"));
        table.set("ratio", Value::from(1.5));

        assert_eq!(getopt_number(&table, "opacity", 1.0), 0.5);
        assert_eq!(getopt_number(&table, "missing", 1.0), 1.0);
        assert_eq!(getopt_number(&table, "label", 1.0), 1.0);

        assert_eq!(getopt_integer(&table, "width", 0), Ok(12));
        assert_eq!(getopt_integer(&table, "label", 3), Ok(3));
        assert!(matches!(
            getopt_integer(&table, "ratio", 0),
            Err(ArgumentError::FieldType { ref field, .. }) if field == "ratio"
        ));

        assert_eq!(getopt_number_range(&table, "opacity", 1.0, 0.0, 1.0), Ok(0.5));
        assert!(getopt_number_range(&table, "width", 1.0, 0.0, 1.0).is_err());
        assert_eq!(getopt_integer_range(&table, "missing", 50, 0.0, 10.0), Ok(50));
        assert!(matches!(
            getopt_integer_range(&table, "width", 0, 0.0, 10.0),
            Err(ArgumentError::FieldRange { value, .. }) if value == 12.0
        ));
    }
}
