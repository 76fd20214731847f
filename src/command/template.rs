//! Variable placeholder resolution for command-line templates.
//!
//! Supported forms: `$name`, `${name}`, `${name.a.b}`, `${name[0]}` and any
//! chain of the two (`${name.a[2].b}`). The longest identifier/path chain
//! after the `$` is one placeholder.
//!
//! Roots whose value is missing or falsy are left in the text untouched.
//! Paths that cannot be walked resolve to the empty string.

use std::collections::HashMap;
use std::future::Future;
use std::ops::Range;

use serde_json::{Map, Value};

/// One step of a placeholder path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A placeholder occurrence inside a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Byte range of the whole occurrence, including `$`, braces and path.
    pub span: Range<usize>,
    pub root: &'a str,
    pub path: Vec<Segment>,
}

/// Find every placeholder occurrence in `template`, left to right.
pub fn scan(template: &str) -> Vec<Placeholder<'_>> {
    let bytes = template.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            if let Some(placeholder) = parse_at(template, i) {
                i = placeholder.span.end;
                found.push(placeholder);
                continue;
            }
        }
        i += 1;
    }
    found
}

/// Distinct root variable names, in order of first appearance.
pub fn variables(template: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for placeholder in scan(template) {
        if !names.contains(&placeholder.root) {
            names.push(placeholder.root);
        }
    }
    names
}

fn is_word(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn take_word(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && is_word(bytes[end]) {
        end += 1;
    }
    end
}

fn parse_at(template: &str, start: usize) -> Option<Placeholder<'_>> {
    let bytes = template.as_bytes();
    let mut j = start + 1;
    let braced = bytes.get(j) == Some(&b'{');
    if braced {
        j += 1;
    }

    let root_end = take_word(bytes, j);
    if root_end == j {
        return None;
    }
    let root = &template[j..root_end];
    j = root_end;

    let mut path = Vec::new();
    loop {
        match bytes.get(j) {
            Some(b'.') => {
                let end = take_word(bytes, j + 1);
                if end == j + 1 {
                    break;
                }
                path.push(Segment::Key(template[j + 1..end].to_string()));
                j = end;
            }
            Some(b'[') => {
                let mut end = j + 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end == j + 1 || bytes.get(end) != Some(&b']') {
                    break;
                }
                let Ok(index) = template[j + 1..end].parse::<usize>() else {
                    break;
                };
                path.push(Segment::Index(index));
                j = end + 1;
            }
            _ => break,
        }
    }

    if braced && bytes.get(j) == Some(&b'}') {
        j += 1;
    }

    Some(Placeholder {
        span: start..j,
        root,
        path,
    })
}

/// JavaScript-style truthiness: `null`, `false`, `0` and `""` are not provided.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Walk `path` against `value`. `None` when any step does not exist.
pub fn walk(value: &Value, path: &[Segment]) -> Option<Value> {
    let Some((segment, rest)) = path.split_first() else {
        return Some(value.clone());
    };
    match (value, segment) {
        (Value::Object(map), Segment::Key(key)) => walk(map.get(key)?, rest),
        (Value::Object(map), Segment::Index(index)) => walk(map.get(&index.to_string())?, rest),
        (Value::Array(items), Segment::Index(index)) => walk(items.get(*index)?, rest),
        (Value::Array(items), Segment::Key(key)) => {
            walk(items.get(key.parse::<usize>().ok()?)?, rest)
        }
        (Value::String(s), Segment::Index(index)) => {
            walk(&Value::String(s.chars().nth(*index)?.to_string()), rest)
        }
        _ => None,
    }
}

/// Text spliced into a template for a resolved value.
pub fn render(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Substitute already-looked-up root values into `template`.
///
/// Roots missing from `values` keep their literal text. A template that is
/// exactly one placeholder yields the walked value itself, not its text.
pub fn substitute(template: &str, values: &HashMap<&str, Value>) -> Value {
    let placeholders = scan(template);

    if let [only] = placeholders.as_slice() {
        if only.span == (0..template.len()) {
            return match values.get(only.root) {
                Some(value) => walk(value, &only.path).unwrap_or_else(|| Value::String(String::new())),
                None => Value::String(template.to_string()),
            };
        }
    }

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for placeholder in &placeholders {
        out.push_str(&template[last..placeholder.span.start]);
        match values.get(placeholder.root) {
            Some(value) => out.push_str(&render(walk(value, &placeholder.path).as_ref())),
            None => out.push_str(&template[placeholder.span.clone()]),
        }
        last = placeholder.span.end;
    }
    out.push_str(&template[last..]);
    Value::String(out)
}

/// Resolve every placeholder in `template` against an asynchronous lookup.
///
/// `lookup` is awaited once per distinct root name.
pub async fn resolve<F, Fut>(template: &str, mut lookup: F) -> Value
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Option<Value>>,
{
    let mut values = HashMap::new();
    for name in variables(template) {
        if let Some(value) = lookup(name).await {
            if is_truthy(&value) {
                values.insert(name, value);
            }
        }
    }
    substitute(template, &values)
}

/// Synchronous resolution against a JSON object.
pub fn resolve_str(template: &str, params: &Map<String, Value>) -> String {
    let values = variables(template)
        .into_iter()
        .filter_map(|name| {
            params
                .get(name)
                .filter(|value| is_truthy(value))
                .map(|value| (name, value.clone()))
        })
        .collect();
    match substitute(template, &values) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Like [`resolve_str`], but placeholders whose root is missing or falsy
/// become empty instead of staying literal.
///
/// Resolved values are never rescanned, so a value containing `$word` is
/// kept intact.
pub fn resolve_blanking(template: &str, params: &Map<String, Value>) -> String {
    let values = variables(template)
        .into_iter()
        .map(|name| {
            let value = params
                .get(name)
                .filter(|value| is_truthy(value))
                .cloned()
                .unwrap_or_else(|| Value::String(String::new()));
            (name, value)
        })
        .collect();
    match substitute(template, &values) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Placeholders that do not sit inside a double-quoted shell word.
///
/// Backslash escapes are honoured outside single quotes.
pub fn unquoted(template: &str) -> Vec<Placeholder<'_>> {
    let bytes = template.as_bytes();
    let mut placeholders = scan(template).into_iter().peekable();
    let mut found = Vec::new();
    let (mut single, mut double) = (false, false);
    let mut i = 0;
    while i < bytes.len() {
        while let Some(placeholder) = placeholders.next_if(|p| p.span.start <= i) {
            if !double {
                found.push(placeholder);
            }
        }
        match bytes[i] {
            b'\\' if !single => i += 1,
            b'\'' if !double => single = !single,
            b'"' if !single => double = !double,
            _ => {}
        }
        i += 1;
    }
    found
}

/// Blank out any placeholder still present in `text`.
pub fn strip_unresolved(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for placeholder in scan(text) {
        out.push_str(&text[last..placeholder.span.start]);
        last = placeholder.span.end;
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_placeholders_outside_double_quotes() {
        fn roots(template: &str) -> Vec<&str> {
            unquoted(template).into_iter().map(|p| p.root).collect()
        }
        assert!(roots(r#"report "${name}" --kind "$kind.x""#).is_empty());
        assert_eq!(roots("report ${name} \"$ok\" '$single'"), ["name", "single"]);
        assert_eq!(roots(r#"say \$x "$y""#), ["x"]);
        assert_eq!(roots(r#"say "a \" $b" $c"#), ["c"]);
        assert_eq!(roots(r#"mix "$a"$b"#), ["b"]);
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn resolve_json(template: &str, source: Value) -> Value {
        let source = params(source);
        resolve(template, |name| {
            let value = source.get(name).cloned();
            async move { value }
        })
        .await
    }

    #[test]
    fn scan_finds_longest_chain() {
        let found = scan("cmd ${user.addresses[1].city} $x.y and $");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].root, "user");
        assert_eq!(
            found[0].path,
            vec![
                Segment::Key("addresses".into()),
                Segment::Index(1),
                Segment::Key("city".into()),
            ]
        );
        assert_eq!(found[1].root, "x");
        assert_eq!(found[1].path, vec![Segment::Key("y".into())]);
    }

    #[test]
    fn scan_stops_at_non_path_characters() {
        let template = r#"--name "$name""#;
        let found = scan(template);
        assert_eq!(found.len(), 1);
        assert_eq!(&template[found[0].span.clone()], "$name");
    }

    #[test]
    fn variables_are_distinct_in_first_appearance_order() {
        assert_eq!(variables("$b ${a.x} ${b[0]} $c $a"), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn template_without_placeholders_is_unchanged() {
        let out = resolve_json("cmd --flag value", json!({"flag": "x"})).await;
        assert_eq!(out, json!("cmd --flag value"));
    }

    #[tokio::test]
    async fn resolves_dotted_path() {
        let out = resolve_json("cmd --name ${user.name}", json!({"user": {"name": "Ada"}})).await;
        assert_eq!(out, json!("cmd --name Ada"));
    }

    #[tokio::test]
    async fn missing_variable_is_left_literal() {
        let out = resolve_json("cmd ${missing}", json!({})).await;
        assert_eq!(out, json!("cmd ${missing}"));
    }

    #[tokio::test]
    async fn falsy_root_is_left_literal() {
        let out = resolve_json("cmd $count $flag", json!({"count": 0, "flag": ""})).await;
        assert_eq!(out, json!("cmd $count $flag"));
    }

    #[tokio::test]
    async fn index_access_on_whole_template() {
        let out = resolve_json("${items[1]}", json!({"items": ["a", "b", "c"]})).await;
        assert_eq!(out, json!("b"));
    }

    #[tokio::test]
    async fn whole_template_keeps_non_string_type() {
        let out = resolve_json("${user}", json!({"user": {"id": 7}})).await;
        assert_eq!(out, json!({"id": 7}));

        let out = resolve_json("$count", json!({"count": 3})).await;
        assert_eq!(out, json!(3));
    }

    #[tokio::test]
    async fn invalid_nested_path_yields_empty_string() {
        let out = resolve_json(
            "a=${user.name.first} b=${user[3]} c=$user.missing",
            json!({"user": {"name": "Ada"}}),
        )
        .await;
        assert_eq!(out, json!("a= b= c="));
    }

    #[tokio::test]
    async fn multiple_roots_and_repeated_occurrences() {
        let out = resolve_json(
            "${a.x}-${b}-${a.y[0]}-$b",
            json!({"a": {"x": 1, "y": [true]}, "b": "B"}),
        )
        .await;
        assert_eq!(out, json!("1-B-true-B"));
    }

    #[tokio::test]
    async fn lookup_called_once_per_root() {
        let mut calls = Vec::new();
        let out = resolve("$a $a ${a.b}", |name| {
            calls.push(name.to_string());
            async { Some(json!({"b": "x"})) }
        })
        .await;
        assert_eq!(calls, vec!["a"]);
        assert_eq!(out, json!(r#"{"b":"x"} {"b":"x"} x"#));
    }

    #[test]
    fn resolve_str_over_map() {
        let source = params(json!({"tmpDir": "/tmp/x", "n": 2}));
        assert_eq!(resolve_str("ls ${tmpDir} -n $n $other", &source), "ls /tmp/x -n 2 $other");
    }

    #[test]
    fn resolve_blanking_empties_missing_roots_only() {
        let params = params(json!({"name": "$HOME", "n": 0, "user": {"id": 7}}));
        assert_eq!(
            resolve_blanking("run $name ${n} ${user.id} ${gone.x}!", &params),
            "run $HOME  7 !"
        );
        assert_eq!(resolve_blanking("$gone", &params), "");
    }

    #[test]
    fn strip_unresolved_blanks_leftovers() {
        assert_eq!(strip_unresolved("cmd ${missing} --x $y.z end"), "cmd  --x  end");
        assert_eq!(strip_unresolved("no placeholders"), "no placeholders");
    }

    #[test]
    fn string_index_and_numeric_keys() {
        assert_eq!(walk(&json!("abc"), &[Segment::Index(1)]), Some(json!("b")));
        assert_eq!(
            walk(&json!(["x", "y"]), &[Segment::Key("1".into())]),
            Some(json!("y"))
        );
        assert_eq!(walk(&json!(null), &[Segment::Key("a".into())]), None);
    }
}
