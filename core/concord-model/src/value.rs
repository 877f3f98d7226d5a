use serde_json::{Map, Value};

/// Type-aware equality for setting values.
///
/// Numbers compare by numeric value, so an integer default matches a stored
/// float with the same value. Arrays and objects compare element-wise.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// String representation used when a value cannot be cast to its declared
/// type. Strings are returned bare; everything else as JSON text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Presentation form of a value for difference listings.
///
/// Objects and arrays are serialized to JSON text. If serialization fails the
/// value's own display form is used instead.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string(value).unwrap_or_else(|_| format!("{value}"))
        }
        other => other.to_string(),
    }
}

/// Inserts `value` into a nested object tree, creating intermediate objects
/// and replacing any non-object value that sits on the path.
pub fn insert_at_path(tree: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [leaf] => {
            tree.insert((*leaf).to_string(), value);
        }
        [head, rest @ ..] => {
            let child = tree
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                insert_at_path(child, rest, value);
            }
        }
    }
}

/// Looks up a value inside nested objects.
pub fn value_at_path<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, segment| current.as_object()?.get(segment.as_ref()))
}

/// Removes the value at `path`, returning it. Intermediate objects are left
/// in place even when they become empty.
pub fn remove_at_path<S: AsRef<str>>(tree: &mut Map<String, Value>, path: &[S]) -> Option<Value> {
    match path {
        [] => None,
        [leaf] => tree.remove(leaf.as_ref()),
        [head, rest @ ..] => match tree.get_mut(head.as_ref()) {
            Some(Value::Object(child)) => remove_at_path(child, rest),
            _ => None,
        },
    }
}
