//! Serde-based binding for PostgreSQL statements.
//!
//! Values are bound by serializing a `Storable` to JSON and walking its
//! columns in order, and rows are read back by building the same JSON
//! shape from the row and deserializing it.

use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, Column, Row, TypeInfo};

use book_service::float_column::non_finite_label;
use book_service::{Storable, StorageError};

fn bind_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::StorageError(e.to_string())
}

/// Build `INSERT ... RETURNING <id>` for the writable columns.
pub(crate) fn build_insert_sql(table: &str, columns: &[&str], id_column: &str) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        table,
        columns.join(", "),
        placeholders.join(", "),
        id_column
    )
}

/// Build `UPDATE <table> SET a = $1, b = $2, ...` for the writable columns.
///
/// Returns the SQL and the next free parameter index.
pub(crate) fn build_update_sql(table: &str, columns: &[&str]) -> (String, usize) {
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| format!("{} = ${}", column, idx + 1))
        .collect();
    (
        format!("UPDATE {} SET {}", table, assignments.join(", ")),
        columns.len() + 1,
    )
}

/// Bind every writable column of `item`, in `writable_columns()` order.
pub(crate) fn bind_writable_values<T: Storable>(
    args: &mut PgArguments,
    item: &T,
) -> Result<Vec<&'static str>, StorageError> {
    let json = serde_json::to_value(item)?;
    let obj = json.as_object().ok_or_else(|| {
        StorageError::StorageError("Expected JSON object for Storable type".to_string())
    })?;

    let mut columns = Vec::new();
    for (column, column_type) in T::writable_columns() {
        let value = obj.get(column).cloned().unwrap_or(Value::Null);
        bind_json_value(args, &value, column_type)?;
        columns.push(column);
    }
    Ok(columns)
}

/// Deserialize a PostgreSQL row to a Storable type.
///
/// Null values are omitted so serde defaults apply.
pub fn deserialize_row<T: Storable>(row: &PgRow) -> Result<T, StorageError> {
    let mut obj = serde_json::Map::new();
    for column in T::columns() {
        let value = extract_column_value(row, column)?;
        if !value.is_null() {
            obj.insert((*column).to_string(), value);
        }
    }

    serde_json::from_value(Value::Object(obj))
        .map_err(|e| StorageError::StorageError(format!("Deserialization error: {}", e)))
}

/// Bind a JSON value to PgArguments using the declared column type.
fn bind_json_value(
    args: &mut PgArguments,
    value: &Value,
    column_type: &str,
) -> Result<(), StorageError> {
    match value {
        Value::Null => match column_type {
            "datetime" => args.add(None::<chrono::DateTime<chrono::Utc>>),
            "bigint" => args.add(None::<i64>),
            "integer" => args.add(None::<i32>),
            "double" => args.add(None::<f64>),
            _ => args.add(None::<String>),
        }
        .map_err(bind_error)?,
        Value::Number(n) => match column_type {
            "integer" => {
                let v = n
                    .as_i64()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(|| bind_error(format!("{} does not fit an integer column", n)))?;
                args.add(v).map_err(bind_error)?;
            }
            "double" => {
                let v = n
                    .as_f64()
                    .ok_or_else(|| bind_error(format!("{} is not a double", n)))?;
                args.add(v).map_err(bind_error)?;
            }
            _ => {
                let v = n
                    .as_i64()
                    .ok_or_else(|| bind_error(format!("{} does not fit a bigint column", n)))?;
                args.add(v).map_err(bind_error)?;
            }
        },
        Value::String(s) => match column_type {
            "datetime" => {
                let dt = chrono::DateTime::parse_from_rfc3339(s)
                    .map_err(|e| StorageError::StorageError(format!("Invalid datetime: {}", e)))?;
                args.add(dt.with_timezone(&chrono::Utc))
                    .map_err(bind_error)?;
            }
            // NaN and the infinities arrive as strings
            "double" => {
                let v: f64 = s
                    .parse()
                    .map_err(|_| bind_error(format!("'{}' is not a double", s)))?;
                args.add(v).map_err(bind_error)?;
            }
            _ => args.add(s.as_str()).map_err(bind_error)?,
        },
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
            return Err(StorageError::StorageError(format!(
                "unsupported value for {} column: {}",
                column_type, value
            )));
        }
    }

    Ok(())
}

/// JSON for a float column value, in the shape `float_column` reads.
fn float_value(n: f64) -> Value {
    match (non_finite_label(n), serde_json::Number::from_f64(n)) {
        (None, Some(number)) => Value::Number(number),
        (Some(label), _) => Value::String(label.to_string()),
        (None, None) => Value::Null,
    }
}

/// Extract a column value from a row as JSON
fn extract_column_value(row: &PgRow, column: &str) -> Result<Value, StorageError> {
    let idx = row
        .columns()
        .iter()
        .position(|c| c.name() == column)
        .ok_or_else(|| StorageError::StorageError(format!("Column not found: {}", column)))?;

    let type_name = row.columns()[idx].type_info().name();

    let value = match type_name {
        "INT2" => {
            let v: Option<i16> = row.try_get(idx).map_err(bind_error)?;
            v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null)
        }
        "INT4" => {
            let v: Option<i32> = row.try_get(idx).map_err(bind_error)?;
            v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null)
        }
        "INT8" => {
            let v: Option<i64> = row.try_get(idx).map_err(bind_error)?;
            v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null)
        }
        "FLOAT4" => {
            let v: Option<f32> = row.try_get(idx).map_err(bind_error)?;
            v.map(|n| float_value(f64::from(n))).unwrap_or(Value::Null)
        }
        "FLOAT8" => {
            let v: Option<f64> = row.try_get(idx).map_err(bind_error)?;
            v.map(float_value).unwrap_or(Value::Null)
        }
        "TIMESTAMPTZ" => {
            let v: Option<chrono::DateTime<chrono::Utc>> = row.try_get(idx).map_err(bind_error)?;
            // Microsecond precision with Z, matching StorageDatetime's serde format
            v.map(|dt| Value::String(dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)))
                .unwrap_or(Value::Null)
        }
        _ => {
            // VARCHAR, TEXT, CHAR, etc.
            let v: Option<String> = row.try_get(idx).map_err(bind_error)?;
            v.map(Value::String).unwrap_or(Value::Null)
        }
    };

    Ok(value)
}
