//! Typed, bounds-checked access to positional call arguments.

use serde_json::{Map, Value};

use crate::error::DispatchError;

/// Positional arguments of one call.
///
/// Every accessor validates both the index and the JSON type; nothing is
/// indexed unchecked.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: Vec<Value>,
}

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get(&self, index: usize) -> Result<&Value, DispatchError> {
        self.values.get(index).ok_or_else(|| {
            DispatchError::InvalidArguments(format!("missing argument at position {index}"))
        })
    }

    fn mismatch(index: usize, expected: &str, found: &Value) -> DispatchError {
        DispatchError::InvalidArguments(format!(
            "argument {index} must be {expected}, got {}",
            type_name(found)
        ))
    }

    pub fn str(&self, index: usize) -> Result<&str, DispatchError> {
        let value = self.get(index)?;
        value
            .as_str()
            .ok_or_else(|| Self::mismatch(index, "a string", value))
    }

    pub fn string(&self, index: usize) -> Result<String, DispatchError> {
        self.str(index).map(str::to_string)
    }

    pub fn bool(&self, index: usize) -> Result<bool, DispatchError> {
        let value = self.get(index)?;
        value
            .as_bool()
            .ok_or_else(|| Self::mismatch(index, "a boolean", value))
    }

    pub fn int(&self, index: usize) -> Result<i64, DispatchError> {
        let value = self.get(index)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| Self::mismatch(index, "an integer", value))
    }

    pub fn object(&self, index: usize) -> Result<Map<String, Value>, DispatchError> {
        let value = self.get(index)?;
        value
            .as_object()
            .cloned()
            .ok_or_else(|| Self::mismatch(index, "an object", value))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
