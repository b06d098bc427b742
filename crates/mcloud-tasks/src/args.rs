//! Task handlers receive arguments as a positional `Vec<Value>` plus a
//! keyword `Map<String, Value>`, mirroring the wire protocol's RPC call
//! shape. These helpers let each task read a named parameter the same way
//! regardless of which half of the call carried it, matching the
//! original's single Python call signature that accepted both.

use std::collections::HashMap;

use mcloud_shared::{McloudError, McloudResult};
use serde_json::{Map, Value};

fn positional_or_kwarg<'a>(
    args: &'a [Value],
    kwargs: &'a Map<String, Value>,
    index: usize,
    key: &str,
) -> Option<&'a Value> {
    args.get(index).filter(|v| !v.is_null()).or_else(|| kwargs.get(key))
}

/// Coerce a scalar JSON value to a string. Accepts both `String` and
/// `Number` since JSON-over-the-wire arguments like a ticket id or a
/// custom port are sometimes sent as numbers.
pub fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn require_str(args: &[Value], kwargs: &Map<String, Value>, index: usize, key: &str) -> McloudResult<String> {
    positional_or_kwarg(args, kwargs, index, key)
        .and_then(stringify)
        .ok_or_else(|| McloudError::ValueError(format!("missing required argument `{key}`")))
}

pub fn opt_str(args: &[Value], kwargs: &Map<String, Value>, index: usize, key: &str) -> Option<String> {
    positional_or_kwarg(args, kwargs, index, key).and_then(stringify)
}

pub fn opt_bool(args: &[Value], kwargs: &Map<String, Value>, index: usize, key: &str, default: bool) -> bool {
    positional_or_kwarg(args, kwargs, index, key)
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

pub fn opt_u16(args: &[Value], kwargs: &Map<String, Value>, index: usize, key: &str) -> Option<u16> {
    positional_or_kwarg(args, kwargs, index, key).and_then(|v| match v {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

/// Reads a JSON array argument into a list of strings, used for
/// passthrough command vectors like `machine`'s docker-machine arguments.
pub fn opt_str_vec(args: &[Value], kwargs: &Map<String, Value>, index: usize, key: &str) -> Vec<String> {
    let Some(Value::Array(items)) = positional_or_kwarg(args, kwargs, index, key) else {
        return Vec::new();
    };
    items.iter().filter_map(stringify).collect()
}

/// Reads a `{name: value}` JSON object into a string map, matching the
/// original's plain `dict` environment/variable arguments.
pub fn opt_env(args: &[Value], kwargs: &Map<String, Value>, index: usize, key: &str) -> HashMap<String, String> {
    let Some(Value::Object(map)) = positional_or_kwarg(args, kwargs, index, key) else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| stringify(v).map(|v| (k.clone(), v)))
        .collect()
}
