//! Canonical dotenv serializer. Output always re-parses to the same map; the
//! original comments, blank lines and quoting choices are not reproduced.

/// Serializes key/value pairs, one `KEY=value` line each.
pub fn stringify<I, K, V>(entries: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let lines: Vec<String> = entries
        .into_iter()
        .filter_map(|(key, value)| format_entry(key.as_ref(), Some(value.as_ref())))
        .collect();
    lines.join("\n")
}

/// Like [`stringify`], but absent values are written as `KEY=`.
pub fn stringify_optional<I, K, V>(entries: I) -> String
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let lines: Vec<String> = entries
        .into_iter()
        .filter_map(|(key, value)| format_entry(key.as_ref(), value.as_ref().map(|v| v.as_ref())))
        .collect();
    lines.join("\n")
}

fn format_entry(key: &str, value: Option<&str>) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.unwrap_or_default();
    if needs_quotes(value) {
        Some(format!("{key}=\"{}\"", escape(value)))
    } else {
        Some(format!("{key}={value}"))
    }
}

/// A bare value must survive trimming, comment stripping and quote detection
/// in the parser unchanged.
fn needs_quotes(value: &str) -> bool {
    value.starts_with('\'')
        || value
            .chars()
            .any(|c| matches!(c, '"' | '\\' | '#') || c.is_whitespace())
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}
