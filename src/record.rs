//! Materialized records

use std::fmt;

use serde::{Serialize, Serializer};

use crate::schema::Schema;
use crate::value::{Map, Value};

/// One materialized instance of a [`Schema`].
///
/// Holds the raw input and one value per registered field. Names starting
/// with `_` are resolved and readable with [`get`](Record::get) but hidden
/// from [`dict`](Record::dict) and the repr.
#[derive(Clone)]
pub struct Record {
    schema: Schema,
    raw: String,
    values: Map,
}

fn is_public(name: &str) -> bool {
    !name.starts_with('_')
}

impl Record {
    pub(crate) fn new(schema: Schema, raw: String, values: Map) -> Self {
        Self { schema, raw, values }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// All stored values, private ones included.
    pub fn values(&self) -> &Map {
        &self.values
    }

    /// Evaluate a computed parameter.
    pub fn computed(&self, name: &str) -> Option<Value> {
        self.schema.computed(name).map(|f| f(self))
    }

    /// Public output: computed parameters, then the public registered fields
    /// in declaration order.
    pub fn to_map(&self) -> Map {
        let mut out = Map::new();
        for name in self.schema.computed_names().filter(|n| is_public(n)) {
            if let Some(value) = self.computed(name) {
                out.insert(name.to_string(), value);
            }
        }
        for name in self.schema.field_names().filter(|n| is_public(n)) {
            if let Some(value) = self.values.get(name) {
                out.insert(name.to_string(), value.clone());
            }
        }
        out
    }

    /// JSON form of [`to_map`](Record::to_map), nested records converted
    /// recursively.
    pub fn dict(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.to_map()
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// `Name(field:type=value, nested=Name(...))`
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name())?;
        for (i, (name, value)) in self.to_map().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                Value::Record(record) => write!(f, "{name}={record}")?,
                other => write!(f, "{name}:{}={other}", other.type_name())?,
            }
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name() && self.values == other.values
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.to_map())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainBuilder;
    use crate::field::Field;
    use crate::shape::Shape;
    use serde_json::json;

    fn schemas() -> (Schema, Schema) {
        let inner = Schema::builder("Inner")
            .field("n", Shape::Int, Field::mock("1"))
            .build()
            .unwrap();
        let outer = Schema::builder("Outer")
            .field("title", Shape::Str, Field::raw().strip())
            .field("_secret", Shape::Str, Field::mock("hidden"))
            .field(
                "inner",
                Shape::record(&inner),
                Field::nested(&inner, |raw: &str| Some(raw.to_string())),
            )
            .computed("title_len", |r| {
                Value::from(r.get("title").and_then(Value::as_str).map_or(0, |s| s.len() as i64))
            })
            .build()
            .unwrap();
        (inner, outer)
    }

    #[test]
    fn test_repr() {
        let (_, outer) = schemas();
        let record = outer.parse(" spam ").unwrap();
        assert_eq!(
            record.to_string(),
            r#"Outer(title_len:int=4, title:str="spam", inner=Inner(n:int=1))"#
        );
    }

    #[test]
    fn test_dict_and_serialize() {
        let (_, outer) = schemas();
        let record = outer.parse("spam").unwrap();
        let expected = json!({"title_len": 4, "title": "spam", "inner": {"n": 1}});

        assert_eq!(record.dict(), expected);
        assert_eq!(serde_json::to_value(&record).unwrap(), expected);
        assert_eq!(
            record.dict().to_string(),
            r#"{"title_len":4,"title":"spam","inner":{"n":1}}"#
        );
        assert_eq!(record.get("_secret"), Some(&Value::from("hidden")));
        assert_eq!(record.computed("title_len"), Some(Value::Int(4)));
        assert_eq!(record.computed("missing"), None);
    }

    #[test]
    fn test_set_and_plain() {
        let (inner, outer) = schemas();
        let mut record = outer.parse("spam").unwrap();
        record.set("title", "eggs");
        assert_eq!(record.dict()["title"], json!("eggs"));

        let nested = record.get("inner").cloned().unwrap();
        assert_eq!(nested.as_record().unwrap().schema().name(), inner.name());
        assert_eq!(nested.into_plain().to_json(), json!({"n": 1}));
    }
}
