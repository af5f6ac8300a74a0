//! Detects a model that keeps requesting the same call.
//!
//! Two calls are the same when their trimmed names match and their arguments are
//! equal once string-encoded JSON is decoded and integral floats are read as
//! integers.

use serde_json::Value;
use shopmate_core::FunctionCall;

/// True when `next` repeats `previous` and the sequence must stop.
pub fn should_stop(previous: &FunctionCall, next: &FunctionCall) -> bool {
    previous.name.trim() == next.name.trim()
        && normalized_arguments(previous) == normalized_arguments(next)
}

/// Decoded arguments with integral floats rewritten as integers.
///
/// Object key order is already irrelevant to `Value` equality.
pub fn normalized_arguments(call: &FunctionCall) -> Value {
    normalize(call.decoded_arguments())
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Number(number) => match number.as_f64() {
            Some(float)
                if number.is_f64() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 =>
            {
                Value::from(float as i64)
            }
            _ => Value::Number(number),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(key, value)| (key, normalize(value))).collect())
        }
        other => other,
    }
}

/// Remembers the last executed call of one sequence.
#[derive(Clone, Debug, Default)]
pub struct LoopGuard {
    last: Option<FunctionCall>,
}

impl LoopGuard {
    pub fn is_repeat(&self, next: &FunctionCall) -> bool {
        self.last.as_ref().is_some_and(|previous| should_stop(previous, next))
    }

    pub fn record(&mut self, call: &FunctionCall) {
        self.last = Some(call.clone());
    }
}
