//! Response unwrapping and dataset extraction
//!
//! Gateways disagree on where a list lives (`agents`, `data.agents`,
//! `result.items`, a bare array...). One ordered list of strategies handles
//! every shape; callers never sniff payloads themselves.

use serde_json::{Map, Value};

/// Collection keys, in priority order
pub const COLLECTION_KEYS: &[&str] = &[
    "agents", "channels", "sessions", "files", "skills", "logs", "jobs", "entries", "items", "data",
];

/// Envelope keys searched one level deep
const ENVELOPE_KEYS: &[&str] = &["result", "payload", "data"];

/// Keys whose object-map form (`{"telegram": {...}}`) is flattened as a last resort
const KEYED_MAP_KEYS: &[&str] = &["channels", "agents", "sessions", "skills"];

type Strategy = fn(&Value, Option<&str>) -> Option<Vec<Value>>;

/// Extraction strategies, tried in order
const STRATEGIES: &[Strategy] = &[
    bare_array,
    preferred_key,
    known_key,
    nested_known_key,
    keyed_map,
];

/// Extract the dataset array from a payload, or an empty list
pub fn extract_dataset(payload: &Value) -> Vec<Value> {
    extract_dataset_with(payload, None)
}

/// Like [`extract_dataset`], trying `preferred` before the generic keys
pub fn extract_dataset_with(payload: &Value, preferred: Option<&str>) -> Vec<Value> {
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(payload, preferred))
        .unwrap_or_default()
}

/// Whether any strategy recognises the payload as a dataset
pub fn looks_like_dataset(payload: &Value, preferred: Option<&str>) -> bool {
    STRATEGIES.iter().any(|strategy| strategy(payload, preferred).is_some())
}

fn bare_array(payload: &Value, _: Option<&str>) -> Option<Vec<Value>> {
    payload.as_array().cloned()
}

fn preferred_key(payload: &Value, preferred: Option<&str>) -> Option<Vec<Value>> {
    let key = preferred?;
    array_at(payload, key).or_else(|| {
        ENVELOPE_KEYS
            .iter()
            .find_map(|env| payload.get(env).and_then(|inner| array_at(inner, key)))
    })
}

fn known_key(payload: &Value, _: Option<&str>) -> Option<Vec<Value>> {
    COLLECTION_KEYS.iter().find_map(|key| array_at(payload, key))
}

fn nested_known_key(payload: &Value, _: Option<&str>) -> Option<Vec<Value>> {
    ENVELOPE_KEYS.iter().find_map(|env| {
        let inner = payload.get(env)?;
        if inner.is_object() {
            COLLECTION_KEYS.iter().find_map(|key| array_at(inner, key))
        } else {
            None
        }
    })
}

fn keyed_map(payload: &Value, preferred: Option<&str>) -> Option<Vec<Value>> {
    let keys = preferred
        .into_iter()
        .chain(KEYED_MAP_KEYS.iter().copied());
    for key in keys {
        let candidates = std::iter::once(payload.get(key)).chain(
            ENVELOPE_KEYS
                .iter()
                .map(|env| payload.get(env).and_then(|inner| inner.get(key))),
        );
        for map in candidates.flatten().filter_map(Value::as_object) {
            if let Some(items) = flatten_keyed_map(map) {
                return Some(items);
            }
        }
    }
    None
}

fn flatten_keyed_map(map: &Map<String, Value>) -> Option<Vec<Value>> {
    if map.is_empty() || !map.values().all(Value::is_object) {
        return None;
    }
    Some(
        map.iter()
            .map(|(id, entry)| {
                let mut entry = entry.clone();
                if let Some(obj) = entry.as_object_mut() {
                    obj.entry("id").or_insert_with(|| Value::String(id.clone()));
                }
                entry
            })
            .collect(),
    )
}

fn array_at(value: &Value, key: &str) -> Option<Vec<Value>> {
    value.get(key).and_then(Value::as_array).cloned()
}

/// Unwrap a `/tools/invoke` body.
///
/// `{ok:true, result:{content:[{type:"text", text}]}}` yields the parsed
/// text; anything else yields the raw `result` (or the whole body when there
/// is no `result`).
pub fn unwrap_tool_result(body: Value) -> Value {
    let result = match body {
        Value::Object(mut map) if map.contains_key("result") => map.remove("result").unwrap_or(Value::Null),
        other => return other,
    };

    match first_text_block(&result) {
        Some(text) => serde_json::from_str(text).unwrap_or(result),
        None => result,
    }
}

fn first_text_block(result: &Value) -> Option<&str> {
    result
        .get("content")?
        .as_array()?
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))?
        .get("text")?
        .as_str()
}
