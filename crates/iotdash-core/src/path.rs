//! Slash-separated paths into a JSON tree.
//!
//! The remote store exposes one JSON document addressed by paths such as
//! `iot/monitoring/fan/value`. These helpers apply the store's write
//! semantics to a local [`Value`]: writing `null` deletes, and objects left
//! empty by a write disappear, so an empty subtree reads back as `null`.

use serde_json::{Map, Value};

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Join path parts with `/`, dropping empty segments.
///
/// ```
/// use iotdash_core::path::join;
///
/// assert_eq!(join(&["/iot/monitoring/", "fan", "value"]), "iot/monitoring/fan/value");
/// assert_eq!(join(&["", "fan"]), "fan");
/// ```
pub fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|p| segments(p))
        .collect::<Vec<_>>()
        .join("/")
}

/// Read the value at `path`, or `Value::Null` if absent.
pub fn get(root: &Value, path: &str) -> Value {
    let mut node = root;
    for segment in segments(path) {
        match node.get(segment) {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    node.clone()
}

/// Replace the value at `path`. Writing `null` removes the node.
pub fn set(root: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = segments(path).collect();
    if value.is_null() {
        remove_segments(root, &parts);
    } else {
        let slot = slot_mut(root, &parts);
        *slot = value;
    }
    prune(root);
}

/// Write several children of `path` in one step.
///
/// Keys of `fields` may themselves be multi-segment paths
/// (`"fan/value"`), which is how batched value writes are expressed.
pub fn update(root: &mut Value, path: &str, fields: Map<String, Value>) {
    for (relative, value) in fields {
        let target = join(&[path, relative.as_str()]);
        let parts: Vec<&str> = segments(&target).collect();
        if value.is_null() {
            remove_segments(root, &parts);
        } else {
            *slot_mut(root, &parts) = value;
        }
    }
    prune(root);
}

/// Remove the node at `path`.
pub fn remove(root: &mut Value, path: &str) {
    let parts: Vec<&str> = segments(path).collect();
    remove_segments(root, &parts);
    prune(root);
}

/// Walk to `parts`, creating objects along the way and replacing any scalar
/// that sits where an object is needed.
fn slot_mut<'a>(root: &'a mut Value, parts: &[&str]) -> &'a mut Value {
    let mut node = root;
    for segment in parts {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            unreachable!("node was just made an object");
        };
        node = map.entry(segment.to_string()).or_insert(Value::Null);
    }
    node
}

fn remove_segments(root: &mut Value, parts: &[&str]) {
    let Some((last, parents)) = parts.split_last() else {
        *root = Value::Null;
        return;
    };

    let mut node = root;
    for segment in parents {
        match node.get_mut(*segment) {
            Some(child) => node = child,
            None => return,
        }
    }
    if let Value::Object(map) = node {
        map.remove(*last);
    }
}

/// Drop `null` members and empty objects. Returns `true` if `value` itself
/// ended up empty.
fn prune(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => {
            map.retain(|_, child| !prune(child));
            if map.is_empty() {
                *value = Value::Null;
                true
            } else {
                false
            }
        }
        Value::Null => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_missing_is_null() {
        let root = json!({"iot": {"monitoring": {"fan": {"value": 1}}}});
        assert_eq!(get(&root, "iot/monitoring/fan/value"), json!(1));
        assert_eq!(get(&root, "iot/other"), Value::Null);
        assert_eq!(get(&root, "iot/monitoring/fan/value/deeper"), Value::Null);
        assert_eq!(get(&root, ""), root);
    }

    #[test]
    fn test_set_creates_parents() {
        let mut root = Value::Null;
        set(&mut root, "iot/monitoring/lamp", json!({"type": "switch", "value": 0}));
        assert_eq!(
            root,
            json!({"iot": {"monitoring": {"lamp": {"type": "switch", "value": 0}}}})
        );
    }

    #[test]
    fn test_set_replaces_scalar_parent() {
        let mut root = json!({"a": 5});
        set(&mut root, "a/b", json!(1));
        assert_eq!(root, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_set_null_removes_and_prunes() {
        let mut root = json!({"iot": {"monitoring": {"lamp": {"value": 1}}}});
        set(&mut root, "iot/monitoring/lamp", Value::Null);
        assert_eq!(root, Value::Null);
    }

    #[test]
    fn test_update_with_nested_keys() {
        let mut root = json!({
            "fan": {"type": "dimmer", "value": 0, "upper_limit": 1024, "unit": "RPM"},
            "temp": {"type": "sensor", "value": 0, "upper_limit": 50, "unit": "C"}
        });
        let mut fields = Map::new();
        fields.insert("fan/value".to_string(), json!(512.5));
        fields.insert("temp/value".to_string(), json!(21.0));
        update(&mut root, "", fields);

        assert_eq!(root["fan"]["value"], json!(512.5));
        assert_eq!(root["fan"]["unit"], json!("RPM"));
        assert_eq!(root["temp"]["value"], json!(21.0));
    }

    #[test]
    fn test_remove_keeps_siblings() {
        let mut root = json!({"m": {"a": 1, "b": 2}});
        remove(&mut root, "m/a");
        assert_eq!(root, json!({"m": {"b": 2}}));
        remove(&mut root, "m/missing/deep");
        assert_eq!(root, json!({"m": {"b": 2}}));
    }

    #[test]
    fn test_set_empty_object_reads_as_null() {
        let mut root = json!({"m": {"a": 1}});
        set(&mut root, "m", json!({}));
        assert_eq!(root, Value::Null);
    }
}
