//! Object <-> JSON codec backed by `serde_json`.
//!
//! An object whose enumerable keys are exactly its indices encodes as an
//! array; anything else encodes as a JSON object with stringified keys.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Number};

use super::{ObjectRef, Value, format_number};
use crate::vm::Vm;

/// Largest integer that survives an `f64` round trip.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn encode(vm: &mut Vm, value: &Value) -> Result<String> {
    let json = to_json(vm, value)?;
    Ok(serde_json::to_string(&json)?)
}

pub fn decode(vm: &mut Vm, text: &str) -> Result<Value> {
    let json: serde_json::Value = serde_json::from_str(text).context("invalid JSON")?;
    Ok(from_json(vm, &json))
}

pub fn to_json(vm: &mut Vm, value: &Value) -> Result<serde_json::Value> {
    let mut visiting = Vec::new();
    encode_value(vm, value, &mut visiting)
}

fn encode_number(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn encode_value(vm: &mut Vm, value: &Value, visiting: &mut Vec<u64>) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Empty => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => encode_number(*n),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Type(ty) => serde_json::Value::String(ty.name().to_string()),
        Value::Object(obj) if obj.borrow().is_function() => serde_json::Value::Null,
        Value::Object(obj) => {
            if visiting.contains(&obj.id()) {
                bail!("cannot encode a cyclic object as JSON");
            }
            visiting.push(obj.id());
            let out = encode_object(vm, obj, visiting);
            visiting.pop();
            out?
        }
    })
}

fn encode_object(vm: &mut Vm, obj: &ObjectRef, visiting: &mut Vec<u64>) -> Result<serde_json::Value> {
    let keys = vm.object_keys(obj)?;
    let values = vm.object_values(obj)?;
    let index_count = obj.borrow().index_count();

    if keys.len() == index_count && keys.iter().all(|k| matches!(k, Value::Number(_))) {
        let items = values
            .iter()
            .map(|v| encode_value(vm, v, visiting))
            .collect::<Result<Vec<_>>>()?;
        return Ok(serde_json::Value::Array(items));
    }

    let mut map = Map::new();
    for (key, value) in keys.iter().zip(&values) {
        let name = match key {
            Value::String(s) => s.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
            Value::Type(ty) => ty.name().to_string(),
            other => bail!("{} keys cannot be encoded as JSON", other.kind_name()),
        };
        map.insert(name, encode_value(vm, value, visiting)?);
    }
    Ok(serde_json::Value::Object(map))
}

pub fn from_json(vm: &mut Vm, json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Empty,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => {
            let values = items.iter().map(|item| from_json(vm, item)).collect();
            vm.new_index_object(values)
        }
        serde_json::Value::Object(map) => {
            let obj = vm.new_object();
            for (key, item) in map {
                let value = from_json(vm, item);
                obj.borrow_mut().set_str(key, value);
            }
            Value::Object(obj)
        }
    }
}
