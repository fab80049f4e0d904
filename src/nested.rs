//! Nested records
//!
//! A nested field crops the raw input into one or many parts and
//! materializes another schema on each part. The crop helpers below cover
//! the common cases; any `Fn(&str)` closure works too.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use scraper::Html;
use tracing::debug;

use crate::backends::parse_selector;
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::schema::Schema;
use crate::value::Value;

pub type Crop = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;
pub type CropAll = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

#[derive(Clone)]
pub enum Nested {
    /// One record from one cropped part.
    One { schema: Schema, crop: Crop },
    /// One record per cropped part.
    Many { schema: Schema, crop: CropAll },
}

impl Nested {
    pub fn schema(&self) -> &Schema {
        match self {
            Nested::One { schema, .. } | Nested::Many { schema, .. } => schema,
        }
    }

    /// Records for `raw`. A singular crop that finds nothing yields null; a
    /// list crop that finds nothing yields an empty list. Both fall back to
    /// the field default.
    pub(crate) fn resolve(&self, raw: &str) -> Result<Value> {
        match self {
            Nested::One { schema, crop } => match crop(raw) {
                Some(part) => Ok(Value::from(schema.parse(&part)?)),
                None => {
                    debug!("nested `{}`: crop found nothing", schema.name());
                    Ok(Value::Null)
                }
            },
            Nested::Many { schema, crop } => {
                let parts = crop(raw);
                debug!("nested `{}`: {} parts", schema.name(), parts.len());
                parts
                    .iter()
                    .map(|part| schema.parse(part).map(Value::from))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            }
        }
    }

    /// The declared shape must be the nested schema (singular) or a list of
    /// it (list crop).
    pub(crate) fn check_shape(&self, schema: &str, field: &str, shape: &Shape) -> Result<()> {
        let target = self.schema();
        let matches = match (self, shape) {
            (Nested::One { .. }, Shape::Record(s)) => s.name() == target.name(),
            (Nested::One { .. }, Shape::Optional(inner)) => {
                matches!(&**inner, Shape::Record(s) if s.name() == target.name())
            }
            (Nested::Many { .. }, Shape::List(inner)) => {
                matches!(&**inner, Shape::Record(s) if s.name() == target.name())
            }
            _ => false,
        };
        if matches {
            return Ok(());
        }
        Err(Error::NestedShape {
            schema: schema.to_string(),
            field: field.to_string(),
            expected: target.name().to_string(),
            found: shape.to_string(),
        })
    }
}

impl fmt::Debug for Nested {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nested::One { schema, .. } => write!(f, "Nested({})", schema.name()),
            Nested::Many { schema, .. } => write!(f, "Nested(list[{}])", schema.name()),
        }
    }
}

/// Outer html of the first element matching `query`.
pub fn crop_css(query: &str) -> Result<impl Fn(&str) -> Option<String> + Send + Sync + 'static> {
    let selector = parse_selector(query)?;
    Ok(move |raw: &str| {
        let document = Html::parse_document(raw);
        let found = document.select(&selector).next().map(|el| el.html());
        found
    })
}

/// Outer html of every element matching `query`.
pub fn crop_css_all(query: &str) -> Result<impl Fn(&str) -> Vec<String> + Send + Sync + 'static> {
    let selector = parse_selector(query)?;
    Ok(move |raw: &str| {
        let document = Html::parse_document(raw);
        let found = document.select(&selector).map(|el| el.html()).collect();
        found
    })
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Pattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn crop_match(regex: &Regex, caps: &regex::Captures<'_>) -> Option<String> {
    let group = if regex.captures_len() > 1 { 1 } else { 0 };
    caps.get(group).map(|m| m.as_str().to_string())
}

/// First match of `pattern`: group 1 when the pattern has groups, else the
/// whole match.
pub fn crop_regex(pattern: &str) -> Result<impl Fn(&str) -> Option<String> + Send + Sync + 'static> {
    let regex = compile(pattern)?;
    Ok(move |raw: &str| regex.captures(raw).and_then(|caps| crop_match(&regex, &caps)))
}

/// Every match of `pattern`, as in [`crop_regex`].
pub fn crop_regex_all(pattern: &str) -> Result<impl Fn(&str) -> Vec<String> + Send + Sync + 'static> {
    let regex = compile(pattern)?;
    Ok(move |raw: &str| {
        regex
            .captures_iter(raw)
            .filter_map(|caps| crop_match(&regex, &caps))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainBuilder;
    use crate::field::Field;
    use crate::record::Record;
    use serde_json::json;

    const ITEMS: &str = r#"
    <ul>
        <li><p>item 1</p><div class="price">100</div><div class="available">yes</div></li>
        <li><p>item 2</p><div class="price">200</div><div class="available">no</div></li>
        <li><p>item 3</p><div class="price">300</div><div class="available">yes</div></li>
        <li><p>item 4</p><div class="price">400</div><div class="available">no</div></li>
        <li><p>item 5</p><div class="price">500</div><div class="available">yes</div></li>
    </ul>
    "#;

    fn item_schema() -> Schema {
        Schema::builder("Item")
            .field("name", Shape::Str, Field::html().css("p").first().text())
            .field("price", Shape::Int, Field::html().css("div.price").first().text())
            .field(
                "available",
                Shape::Bool,
                Field::html()
                    .css("div.available")
                    .first()
                    .text()
                    .callback(|v| Value::Bool(v.as_str() == Some("yes"))),
            )
            .build()
            .unwrap()
    }

    fn price(record: &Record) -> i64 {
        record.get("price").and_then(Value::as_i64).unwrap_or(0)
    }

    #[test]
    fn test_nested_scenario() {
        let item = item_schema();
        let schema = Schema::builder("Items")
            .field(
                "first_item",
                Shape::record(&item),
                Field::nested(&item, crop_css("li").unwrap()),
            )
            .field(
                "items",
                Shape::list(Shape::record(&item)),
                Field::nested_list(&item, crop_css_all("li").unwrap()),
            )
            .computed("max_by_price", |record| {
                record
                    .get("items")
                    .and_then(Value::as_list)
                    .and_then(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_record)
                            .max_by_key(|r| price(r))
                    })
                    .map(|r| Value::from(r.clone()))
                    .unwrap_or_default()
            })
            .build()
            .unwrap();

        let record = schema.parse(ITEMS).unwrap();
        let dict = record.dict();

        assert_eq!(
            dict["first_item"],
            json!({"name": "item 1", "price": 100, "available": true})
        );
        assert_eq!(dict["items"].as_array().unwrap().len(), 5);
        assert_eq!(
            dict["items"][1],
            json!({"name": "item 2", "price": 200, "available": false})
        );
        assert_eq!(
            dict["max_by_price"],
            json!({"name": "item 5", "price": 500, "available": true})
        );
    }

    #[test]
    fn test_nested_empty_crop_uses_default() {
        let item = item_schema();
        let schema = Schema::builder("Empty")
            .field(
                "first_item",
                Shape::optional(Shape::record(&item)),
                Field::nested(&item, crop_css("table").unwrap()),
            )
            .field(
                "items",
                Shape::list(Shape::record(&item)),
                Field::nested_list(&item, crop_css_all("table").unwrap()).default(Vec::<Value>::new()),
            )
            .build()
            .unwrap();

        let record = schema.parse(ITEMS).unwrap();
        assert_eq!(record.get("first_item"), Some(&Value::Null));
        assert_eq!(record.get("items"), Some(&Value::List(vec![])));
    }

    #[test]
    fn test_nested_factory() {
        let item = item_schema();
        let schema = Schema::builder("Prices")
            .field(
                "prices",
                Shape::list(Shape::record(&item)),
                Field::nested_list(&item, crop_css_all("li").unwrap())
                    .factory(|v| Value::from(v.as_list().map_or(0, |items| items.len() as i64))),
            )
            .build()
            .unwrap();

        let record = schema.parse(ITEMS).unwrap();
        assert_eq!(record.get("prices"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_nested_shape_mismatch() {
        let item = item_schema();
        let err = Schema::builder("Bad")
            .field("items", Shape::Str, Field::nested_list(&item, crop_css_all("li").unwrap()))
            .build()
            .err()
            .unwrap();
        match err {
            Error::NestedShape { field, expected, found, .. } => {
                assert_eq!(field, "items");
                assert_eq!(expected, "Item");
                assert_eq!(found, "str");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_crop_regex() {
        let crop = crop_regex(r"<b>(.*?)</b>").unwrap();
        assert_eq!(crop("a <b>x</b> <b>y</b>").as_deref(), Some("x"));

        let crop_all = crop_regex_all(r"\d+").unwrap();
        assert_eq!(crop_all("1 a 22"), vec!["1", "22"]);

        assert!(crop_regex("(").is_err());
        assert!(crop_css("li[[").is_err());
    }
}
