//! JSON backend
//!
//! The document is parsed once into a [`Value`]; chains navigate it with
//! `key`, `index` and `path` steps.

use super::{Backend, BackendConfig, Item, Parse};
use crate::error::{Error, Result};
use crate::value::Value;

/// Parsed JSON document.
///
/// Config keys:
/// - `pointer` (str): JSON pointer selecting the root, e.g. `/data/items`
pub struct JsonDocument {
    value: Value,
}

impl JsonDocument {
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Parse for JsonDocument {
    const NAME: &'static str = "json";

    fn parse(raw: &str, config: &BackendConfig) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(raw).map_err(|e| Error::Backend {
            backend: Self::NAME,
            reason: e.to_string(),
        })?;

        let json = match config.get("pointer").and_then(serde_json::Value::as_str) {
            Some(pointer) => json.pointer(pointer).cloned().unwrap_or_default(),
            None => json,
        };

        Ok(Self {
            value: Value::from_json(json),
        })
    }
}

impl Backend for JsonDocument {
    fn root(&self) -> Item<'_> {
        Item::Value(self.value.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(i64),
    /// `[*]`: apply the rest of the path to every element.
    Wildcard,
}

/// Split `a.b[0].c`, `items[*].id` or `[-1]` into path segments.
fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = path.trim();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("[*]") {
            segments.push(Segment::Wildcard);
            rest = after;
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']')?;
            let inner = after[..end].trim();
            let inner = inner.trim_matches(|c| c == '"' || c == '\'');
            match inner.parse::<i64>() {
                Ok(idx) => segments.push(Segment::Index(idx)),
                Err(_) => segments.push(Segment::Key(inner.to_string())),
            }
            rest = &after[end + 1..];
        } else {
            let rest_key = rest.strip_prefix('.').unwrap_or(rest);
            let end = rest_key
                .find(|c| c == '[' || c == '.')
                .unwrap_or(rest_key.len());
            if end > 0 {
                segments.push(Segment::Key(rest_key[..end].to_string()));
            }
            rest = &rest_key[end..];
        }
    }

    Some(segments)
}

pub(crate) fn index_list(items: &[Value], idx: i64) -> Option<&Value> {
    let len = items.len() as i64;
    let idx = if idx < 0 { len + idx } else { idx };
    if idx < 0 {
        return None;
    }
    items.get(idx as usize)
}

fn navigate(value: &Value, segments: &[Segment]) -> Option<Value> {
    let Some((head, tail)) = segments.split_first() else {
        return Some(value.clone());
    };

    match (head, value) {
        (Segment::Key(key), Value::Map(map)) => navigate(map.get(key)?, tail),
        (Segment::Index(idx), Value::List(items)) => navigate(index_list(items, *idx)?, tail),
        (Segment::Wildcard, Value::List(items)) => Some(Value::List(
            items.iter().filter_map(|item| navigate(item, tail)).collect(),
        )),
        _ => None,
    }
}

/// Navigate `value` by a dot/bracket path. Missing keys, out of range
/// indexes and type mismatches yield null.
///
/// `[*]` expands a list: the rest of the path is applied to each element and
/// elements where it misses are dropped.
pub fn navigate_path(value: &Value, path: &str) -> Value {
    parse_path(path)
        .and_then(|segments| navigate(value, &segments))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        Value::from_json(json!({
            "name": "shop",
            "items": [
                {"id": 1, "tags": ["a", "b"]},
                {"id": 2, "tags": []},
                {"title": "no id"}
            ],
            "nested": {"deep": {"value": 42}}
        }))
    }

    #[test]
    fn test_parse_path_syntax() {
        assert_eq!(
            parse_path("items[0].id").unwrap(),
            vec![
                Segment::Key("items".into()),
                Segment::Index(0),
                Segment::Key("id".into())
            ]
        );
        assert_eq!(
            parse_path("items[*].id").unwrap(),
            vec![
                Segment::Key("items".into()),
                Segment::Wildcard,
                Segment::Key("id".into())
            ]
        );
        assert_eq!(parse_path("[-1]").unwrap(), vec![Segment::Index(-1)]);
        assert!(parse_path("items[0").is_none());
    }

    #[test]
    fn test_navigate_path() {
        let doc = doc();
        assert_eq!(navigate_path(&doc, "name"), Value::from("shop"));
        assert_eq!(navigate_path(&doc, "nested.deep.value"), Value::Int(42));
        assert_eq!(navigate_path(&doc, "items[0].tags[1]"), Value::from("b"));
        assert_eq!(navigate_path(&doc, "items[-1].title"), Value::from("no id"));
        assert_eq!(navigate_path(&doc, "items[*].id"), Value::from(vec![1, 2]));
        assert_eq!(navigate_path(&doc, "missing.key"), Value::Null);
        assert_eq!(navigate_path(&doc, "items[10]"), Value::Null);
        assert_eq!(navigate_path(&doc, "name[0]"), Value::Null);
    }

    #[test]
    fn test_pointer_config() {
        let mut config = BackendConfig::new();
        config.insert("pointer".into(), json!("/data"));
        let doc = JsonDocument::parse(r#"{"data": {"a": 1}}"#, &config).unwrap();
        assert_eq!(navigate_path(doc.value(), "a"), Value::Int(1));
    }

    #[test]
    fn test_invalid_json() {
        let err = JsonDocument::parse("{not json", &BackendConfig::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Backend { backend: "json", .. }));
    }
}
