//! Schema definitions from JSON
//!
//! A [`SchemaDef`] describes a schema as data so callers outside Rust (the
//! FFI layer, config files) can declare fields without closures:
//!
//! ```json
//! {
//!   "name": "Product",
//!   "fail_tolerance": 1,
//!   "fields": [
//!     {"name": "title", "type": "str", "source": "html",
//!      "steps": [{"op": "css", "query": "h1"}, {"op": "first"}, {"op": "text"}]},
//!     {"name": "price", "type": "float", "source": "html",
//!      "steps": [{"op": "css", "query": ".price"}, {"op": "first"}, {"op": "text"}],
//!      "alternatives": [{"steps": [{"op": "re_search", "pattern": "\\$(\\d+)"}, {"op": "index", "index": 1}]}]}
//!   ]
//! }
//! ```

use std::collections::HashMap;

use serde::Deserialize;

use crate::backends::{BackendConfig, HtmlDocument, JsonDocument};
use crate::chain::{ChainBuilder, Op};
use crate::error::{Error, Result};
use crate::field::{Field, Source};
use crate::nested::{crop_css, crop_css_all, Nested};
use crate::schema::{Schema, SchemaBuilder};
use crate::shape::Shape;
use crate::value::Value;

fn default_true() -> bool {
    true
}

fn default_tolerance() -> i64 {
    -1
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDef {
    pub name: String,
    #[serde(default = "default_true")]
    pub type_cast: bool,
    #[serde(default = "default_tolerance")]
    pub fail_tolerance: i64,
    #[serde(default = "default_true")]
    pub hooks_priority: bool,
    /// Backend name (`html`, `json`) to construction config.
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDef {
    /// Raw input text.
    #[default]
    Text,
    Html,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    /// Required on schema fields, not needed on alternatives.
    #[serde(default)]
    pub name: String,
    /// Textual shape such as `list[int]`. Ignored for nested fields.
    #[serde(rename = "type", default)]
    pub shape: Option<String>,
    #[serde(default)]
    pub source: SourceDef,
    #[serde(default)]
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Descriptors tried in order while the previous one gives its default.
    /// Alternatives may not have alternatives of their own.
    #[serde(default)]
    pub alternatives: Vec<FieldDef>,
    #[serde(default)]
    pub nested: Option<NestedDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NestedDef {
    pub schema: Box<SchemaDef>,
    /// Css query cropping the input into the nested parts.
    pub css: String,
    /// One record per match instead of the first match only.
    #[serde(default)]
    pub many: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepDef {
    Css {
        query: String,
    },
    Text,
    Attr {
        name: String,
    },
    Attrs,
    OuterHtml,
    InnerHtml,
    Parent,
    Children,
    Get,
    #[serde(rename = "getall")]
    GetAll,
    Index {
        index: i64,
    },
    First,
    Key {
        key: String,
    },
    Path {
        path: String,
    },
    Keys,
    Values,
    Items,
    ConcatL {
        value: String,
    },
    ConcatR {
        value: String,
    },
    Replace {
        old: String,
        new: String,
        #[serde(default)]
        count: Option<usize>,
    },
    ReSearch {
        pattern: String,
        #[serde(default)]
        groupdict: bool,
    },
    #[serde(rename = "re_findall")]
    ReFindAll {
        pattern: String,
        #[serde(default)]
        groupdict: bool,
    },
    Strip {
        #[serde(default)]
        chars: Option<String>,
    },
    Lstrip {
        #[serde(default)]
        chars: Option<String>,
    },
    Rstrip {
        #[serde(default)]
        chars: Option<String>,
    },
    Upper,
    Lower,
    Capitalize,
    Count {
        sub: String,
    },
    Join {
        #[serde(default)]
        sep: String,
    },
    Split {
        #[serde(default)]
        sep: Option<String>,
    },
    JsObject,
    JsObjects,
    JsVars,
}

impl StepDef {
    pub fn to_op(&self) -> Result<Op> {
        let op = match self {
            StepDef::Css { query } => Op::Css(query.clone()),
            StepDef::Text => Op::Text,
            StepDef::Attr { name } => Op::Attr(name.clone()),
            StepDef::Attrs => Op::Attrs,
            StepDef::OuterHtml => Op::OuterHtml,
            StepDef::InnerHtml => Op::InnerHtml,
            StepDef::Parent => Op::Parent,
            StepDef::Children => Op::Children,
            StepDef::Get => Op::Get,
            StepDef::GetAll => Op::GetAll,
            StepDef::Index { index } => Op::Index(*index),
            StepDef::First => Op::Index(0),
            StepDef::Key { key } => Op::Key(key.clone()),
            StepDef::Path { path } => Op::Path(path.clone()),
            StepDef::Keys => Op::Keys,
            StepDef::Values => Op::Values,
            StepDef::Items => Op::Items,
            StepDef::ConcatL { value } => Op::ConcatL(value.clone()),
            StepDef::ConcatR { value } => Op::ConcatR(value.clone()),
            StepDef::Replace { old, new, count } => Op::Replace {
                old: old.clone(),
                new: new.clone(),
                count: *count,
            },
            StepDef::ReSearch { pattern, groupdict } => Op::re_search(pattern, *groupdict)?,
            StepDef::ReFindAll { pattern, groupdict } => Op::re_findall(pattern, *groupdict)?,
            StepDef::Strip { chars } => Op::Strip(chars.clone()),
            StepDef::Lstrip { chars } => Op::LStrip(chars.clone()),
            StepDef::Rstrip { chars } => Op::RStrip(chars.clone()),
            StepDef::Upper => Op::Upper,
            StepDef::Lower => Op::Lower,
            StepDef::Capitalize => Op::Capitalize,
            StepDef::Count { sub } => Op::Count(sub.clone()),
            StepDef::Join { sep } => Op::Join(sep.clone()),
            StepDef::Split { sep } => Op::split(sep.as_deref())?,
            StepDef::JsObject => Op::JsObject,
            StepDef::JsObjects => Op::JsObjects,
            StepDef::JsVars => Op::JsVars,
        };
        Ok(op)
    }
}

impl FieldDef {
    fn to_field(&self) -> Result<Field> {
        let mut field = match &self.nested {
            Some(nested) => {
                let schema = nested.schema.build()?;
                if nested.many {
                    Field::nested_list(&schema, crop_css_all(&nested.css)?)
                } else {
                    Field::nested(&schema, crop_css(&nested.css)?)
                }
            }
            None => match self.source {
                SourceDef::Text => Field::raw(),
                SourceDef::Html => Field::html(),
                SourceDef::Json => Field::json(),
            },
        };

        for step in &self.steps {
            field = field.step(step.to_op()?);
        }
        if let Some(default) = &self.default {
            field = field.default(Value::from_json(default.clone()));
        }
        Ok(field)
    }

    /// Declared shape; nested fields take it from their built descriptor.
    fn to_shape(&self, field: &Field) -> Result<Shape> {
        if let Source::Nested(nested) = field.source() {
            let record = Shape::record(nested.schema());
            return Ok(match nested {
                Nested::One { .. } => record,
                Nested::Many { .. } => Shape::list(record),
            });
        }
        match &self.shape {
            Some(text) => text.parse(),
            None => Ok(Shape::Any),
        }
    }

    fn uses_json(&self) -> bool {
        self.nested.is_none() && self.source == SourceDef::Json
            || self.alternatives.iter().any(FieldDef::uses_json)
    }
}

impl SchemaDef {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Definition(e.to_string()))
    }

    fn with_backend(builder: SchemaBuilder, name: &str, config: BackendConfig) -> Result<SchemaBuilder> {
        match name {
            "html" => Ok(builder.backend::<HtmlDocument>(config)),
            "json" => Ok(builder.backend::<JsonDocument>(config)),
            other => Err(Error::Definition(format!("unknown backend `{other}`"))),
        }
    }

    /// Build the schema. Backends used by fields but missing from
    /// `backends` are configured with an empty config.
    pub fn build(&self) -> Result<Schema> {
        let mut builder = Schema::builder(&self.name)
            .type_cast(self.type_cast)
            .fail_tolerance(self.fail_tolerance)
            .hooks_priority(self.hooks_priority);

        if !self.backends.contains_key("json") && self.fields.iter().any(FieldDef::uses_json) {
            builder = builder.backend::<JsonDocument>(BackendConfig::new());
        }
        for (name, config) in &self.backends {
            builder = Self::with_backend(builder, name, config.clone())?;
        }

        for def in &self.fields {
            if def.name.is_empty() {
                return Err(Error::Definition(format!("`{}`: field without a name", self.name)));
            }
            let first = def.to_field()?;
            let shape = def.to_shape(&first)?;
            let mut fields = vec![first];
            for alternative in &def.alternatives {
                if !alternative.alternatives.is_empty() {
                    return Err(Error::Definition(format!(
                        "`{}.{}`: alternatives cannot be nested",
                        self.name, def.name
                    )));
                }
                fields.push(alternative.to_field()?);
            }
            builder = builder.fallback(&def.name, shape, fields);
        }

        builder.build()
    }
}
