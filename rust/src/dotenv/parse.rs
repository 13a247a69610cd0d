//! Line scanner for dotenv text.
//!
//! Malformed lines (no `=`, empty key) are skipped. The only hard error is a
//! double-quoted value that is never closed, since continuing would swallow
//! every key after it.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unclosed quote in value for key '{key}'")]
    UnclosedQuote { key: String },
}

/// Parses dotenv text into a key/value map. Later duplicates win.
pub fn parse(text: &str) -> Result<BTreeMap<String, String>, ParseError> {
    let mut entries = BTreeMap::new();
    let mut lines = text.split('\n');

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((raw_key, raw_value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = raw_key.trim();
        if key.is_empty() {
            continue;
        }

        let value = decode_value(key, raw_value.trim(), &mut lines)?;
        entries.insert(key.to_string(), value);
    }

    Ok(entries)
}

fn decode_value<'a, I>(key: &str, value: &'a str, rest: &mut I) -> Result<String, ParseError>
where
    I: Iterator<Item = &'a str>,
{
    if value.len() > 1 && value.starts_with('\'') && value.ends_with('\'') {
        return Ok(value[1..value.len() - 1].to_string());
    }
    if value.len() > 1 && value.starts_with('"') && value.ends_with('"') {
        return Ok(unescape(&value[1..value.len() - 1]));
    }
    if let Some(opening) = value.strip_prefix('"') {
        return read_multiline(key, opening, rest);
    }

    let uncommented = match value.find('#') {
        Some(index) => &value[..index],
        None => value,
    };
    Ok(uncommented.trim().to_string())
}

/// Collects raw lines until one ends (ignoring trailing whitespace) with `"`.
fn read_multiline<'a, I>(key: &str, opening: &'a str, rest: &mut I) -> Result<String, ParseError>
where
    I: Iterator<Item = &'a str>,
{
    let mut parts = vec![opening];
    for line in rest.by_ref() {
        let end = line.trim_end();
        if let Some(last) = end.strip_suffix('"') {
            parts.push(last);
            return Ok(unescape(&parts.join("\n")));
        }
        parts.push(line);
    }
    Err(ParseError::UnclosedQuote {
        key: key.to_string(),
    })
}

/// Single-pass expansion of `\n`, `\r`, `\t`, `\"` and `\\`. Unknown escapes are
/// kept as written.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{parse, unescape, ParseError};

    fn single(text: &str, key: &str) -> String {
        let map = parse(text).expect("parse");
        map.get(key).cloned().unwrap_or_else(|| panic!("missing {key}"))
    }

    #[test]
    fn parses_basic_pairs_and_comments() {
        let map = parse("# comment\nKEY=value\n\n   # indented comment\nOTHER = spaced ").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["KEY"], "value");
        assert_eq!(map["OTHER"], "spaced");
    }

    #[test]
    fn skips_malformed_lines() {
        let map = parse("no equals here\n=orphan\n  = also orphan\nGOOD=1").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["GOOD"], "1");
    }

    #[test]
    fn later_duplicates_win() {
        assert_eq!(single("A=1\nA=2", "A"), "2");
    }

    #[test]
    fn value_keeps_equals_signs() {
        assert_eq!(single("URL=postgres://u:p@h/db?a=b", "URL"), "postgres://u:p@h/db?a=b");
    }

    #[test]
    fn empty_values_are_kept() {
        let map = parse("EMPTY=\nQUOTED=\"\"\nSINGLE=''").unwrap();
        assert_eq!(map["EMPTY"], "");
        assert_eq!(map["QUOTED"], "");
        assert_eq!(map["SINGLE"], "");
    }

    #[test]
    fn unquoted_values_stop_at_inline_comment() {
        assert_eq!(single("KEY=value # trailing note", "KEY"), "value");
        assert_eq!(single("KEY=#all comment", "KEY"), "");
    }

    #[test]
    fn double_quotes_expand_escapes() {
        assert_eq!(single(r#"KEY="a\nb""#, "KEY"), "a\nb");
        assert_eq!(single(r#"KEY="tab\there\r""#, "KEY"), "tab\there\r");
        assert_eq!(single(r#"KEY="say \"hi\"""#, "KEY"), "say \"hi\"");
        assert_eq!(single(r##"KEY="# not a comment""##, "KEY"), "# not a comment");
    }

    #[test]
    fn single_quotes_are_literal() {
        assert_eq!(single(r"KEY='a\nb'", "KEY"), r"a\nb");
        assert_eq!(single("KEY='# kept'", "KEY"), "# kept");
    }

    #[test]
    fn escaped_backslash_is_not_reinterpreted() {
        assert_eq!(unescape(r"\\n"), r"\n");
        assert_eq!(unescape(r"a\\\\b"), r"a\\b");
        assert_eq!(unescape(r"\q"), r"\q");
        assert_eq!(unescape("end\\"), "end\\");
    }

    #[test]
    fn multiline_value_drops_trailing_whitespace() {
        let map = parse("KEY=\"first\nsecond\"   \nOTHER=value").unwrap();
        assert_eq!(map["KEY"], "first\nsecond");
        assert_eq!(map["OTHER"], "value");
    }

    #[test]
    fn multiline_value_spans_several_lines() {
        let text = "CERT=\"-----BEGIN-----\n  abc\n\n  def\n-----END-----\"\r\nNEXT=1";
        let map = parse(text).unwrap();
        assert_eq!(map["CERT"], "-----BEGIN-----\n  abc\n\n  def\n-----END-----");
        assert_eq!(map["NEXT"], "1");
    }

    #[test]
    fn lone_quote_opens_multiline_value() {
        let map = parse("KEY=\"\nbody\n\"").unwrap();
        assert_eq!(map["KEY"], "\nbody\n");
    }

    #[test]
    fn unclosed_quote_is_an_error() {
        let err = parse("FIRST=1\nKEY=\"unclosed\nmore\nLAST=2").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnclosedQuote {
                key: "KEY".to_string()
            }
        );
        assert!(err.to_string().contains("KEY"));
    }

    #[test]
    fn unclosed_single_quote_is_unquoted() {
        assert_eq!(single("KEY='open", "KEY"), "'open");
    }

    #[test]
    fn crlf_input_is_trimmed() {
        let map = parse("A=1\r\nB=\"two\"\r\n").unwrap();
        assert_eq!(map["A"], "1");
        assert_eq!(map["B"], "two");
    }
}
