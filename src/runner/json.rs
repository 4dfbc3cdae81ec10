use serde_json::Value;

/// Resolve a dotted path like `$.tokens.access`, `$.items[0].id` or
/// `$[2].name` against a JSON document. Returns `None` when any segment is
/// missing. Deliberately small; this is the subset scenario files need.
pub fn lookup<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = json;
    let trimmed = path.strip_prefix('$').unwrap_or(path);

    for part in trimmed.split('.').filter(|p| !p.is_empty()) {
        let mut rest = part;
        loop {
            match rest.find('[') {
                Some(open) => {
                    let field = &rest[..open];
                    if !field.is_empty() {
                        current = current.get(field)?;
                    }
                    let close = rest[open..].find(']')? + open;
                    let index: usize = rest[open + 1..close].parse().ok()?;
                    current = current.get(index)?;
                    rest = &rest[close + 1..];
                    if rest.is_empty() {
                        break;
                    }
                }
                None => {
                    current = current.get(rest)?;
                    break;
                }
            }
        }
    }
    Some(current)
}

/// Render a looked-up value the way a capture stores it: strings unquoted,
/// everything else as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
