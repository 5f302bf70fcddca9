//! Backend-native cell values and their normalization into portable JSON.
//!
//! Backends decode columns into [`NativeValue`] without deciding how each type
//! is presented. [`normalize`] is the single place where fixed-point decimals,
//! byte strings, temporal values, and tuples become JSON primitives.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

/// Capability of rendering a date/time-like value in its canonical ISO 8601
/// form. Anything implementing it is normalized to that text, whatever its
/// concrete type.
pub trait IsoFormat: fmt::Debug + Send + Sync {
    fn iso_format(&self) -> String;
}

impl IsoFormat for NaiveDate {
    fn iso_format(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }
}

impl IsoFormat for NaiveTime {
    fn iso_format(&self) -> String {
        self.format("%H:%M:%S%.f").to_string()
    }
}

impl IsoFormat for NaiveDateTime {
    fn iso_format(&self) -> String {
        self.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    }
}

impl<Tz> IsoFormat for DateTime<Tz>
where
    Tz: TimeZone + fmt::Debug + Send + Sync,
    Tz::Offset: fmt::Display + Send + Sync,
{
    fn iso_format(&self) -> String {
        self.to_rfc3339()
    }
}

#[derive(Clone, Debug)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Temporal(Arc<dyn IsoFormat>),
    Tuple(Vec<NativeValue>),
    Sequence(Vec<NativeValue>),
    Mapping(BTreeMap<String, NativeValue>),
}

impl NativeValue {
    pub fn temporal<T>(value: T) -> Self
    where
        T: IsoFormat + 'static,
    {
        Self::Temporal(Arc::new(value))
    }
}

/// Converts a native value tree into an equivalent tree of JSON primitives.
///
/// Non-finite floats have no JSON representation and become `null`.
pub fn normalize(value: NativeValue) -> Value {
    match value {
        NativeValue::Null => Value::Null,
        NativeValue::Bool(flag) => Value::Bool(flag),
        NativeValue::Int(number) => Value::Number(number.into()),
        NativeValue::Float(number) => float_value(number),
        NativeValue::Decimal(decimal) => decimal.to_f64().map(float_value).unwrap_or(Value::Null),
        NativeValue::Text(text) => Value::String(text),
        NativeValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        NativeValue::Temporal(temporal) => Value::String(temporal.iso_format()),
        NativeValue::Tuple(items) | NativeValue::Sequence(items) => {
            Value::Array(items.into_iter().map(normalize).collect())
        }
        NativeValue::Mapping(entries) => Value::Object(
            entries.into_iter().map(|(key, value)| (key, normalize(value))).collect::<Map<_, _>>(),
        ),
    }
}

/// Normalizes one result row.
pub fn normalize_row(row: Vec<NativeValue>) -> Vec<Value> {
    row.into_iter().map(normalize).collect()
}

fn float_value(number: f64) -> Value {
    Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
}

impl From<Value> for NativeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => Self::Int(integer),
                None => Self::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(text) => Self::Text(text),
            Value::Array(items) => Self::Sequence(items.into_iter().map(Self::from).collect()),
            Value::Object(entries) => Self::Mapping(
                entries.into_iter().map(|(key, value)| (key, Self::from(value))).collect(),
            ),
        }
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
