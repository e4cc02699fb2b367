use serde_json::Value;

/// Merge `overlay` into `base` key by key. Objects merge recursively, anything else in
/// `overlay` replaces what `base` had.
pub fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// `max-line-length` and `max_line_length` both become `maxLineLength`.
#[must_use]
pub fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.trim().chars() {
        if c == '-' || c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_merge_nested_objects() {
        let mut base = json!({"plugins": {"a": {"x": 1, "y": 2}, "b": {"z": 3}}});
        merge(&mut base, &json!({"plugins": {"a": {"y": 20}, "c": {}}}));
        assert_eq!(
            base,
            json!({"plugins": {"a": {"x": 1, "y": 20}, "b": {"z": 3}, "c": {}}})
        );
    }

    #[test]
    fn test_merge_replaces_non_objects() {
        let mut base = json!({"ignore": ["E1", "E2"], "debug": false});
        merge(&mut base, &json!({"ignore": ["W5"], "debug": {"verbose": true}}));
        assert_eq!(base, json!({"ignore": ["W5"], "debug": {"verbose": true}}));
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("max-line-length"), "maxLineLength");
        assert_eq!(camel_case("hang_closing"), "hangClosing");
        assert_eq!(camel_case("ignore"), "ignore");
        assert_eq!(camel_case("-leading"), "leading");
    }
}
