use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

fn data_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([a-zA-Z0-9_.\-]+)").expect("data reference pattern is valid"))
}

/// Looks up a dotted path such as `abilities.str.mod`.
pub fn get_property<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |value, key| match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Replaces every `@path` reference in `formula` with the value found in `data`.
///
/// References with no value are replaced by `missing` when given and left
/// untouched otherwise; `warn` logs each of them.
pub fn replace_formula_data(formula: &str, data: &Value, missing: Option<&str>, warn: bool) -> String {
    data_ref()
        .replace_all(formula, |caps: &Captures| {
            let path = &caps[1];
            match get_property(data, path) {
                Some(Value::Null) | None => {
                    if warn {
                        log::warn!("formula {:?} references missing data @{}", formula, path);
                    }
                    missing.map_or_else(|| caps[0].to_string(), str::to_string)
                }
                Some(Value::String(s)) => s.trim().to_string(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}
