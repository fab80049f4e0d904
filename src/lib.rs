//! Declarative extraction schemas for markup
//!
//! A [`Schema`] names typed fields, each resolved from raw input (plain text,
//! HTML, JSON) by a chain of operations, then passed through the default,
//! filter, callback and factory/cast pipeline:
//!
//! ```
//! use markup_schema::prelude::*;
//!
//! let schema = Schema::builder("Digits")
//!     .field("digits", Shape::list(Shape::Int), Field::raw().re_findall(r"\d+"))
//!     .field("word", Shape::Str, Field::raw().re_search(r"(hello) world").index(1))
//!     .build()
//!     .unwrap();
//!
//! let record = schema.parse("1 2 3 hello world 4").unwrap();
//! assert_eq!(record.get("word").and_then(Value::as_str), Some("hello"));
//! ```
//!
//! Also provides an FFI interface taking the schema as JSON
//! (see [`definition`] and [`ffi`]).

pub mod backends;
pub mod chain;
pub mod definition;
pub mod error;
pub mod ffi;
pub mod field;
pub mod nested;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod shape;
pub mod validate;
pub mod value;

pub use backends::{Backend, BackendConfig, HtmlDocument, JsonDocument, Parse};
pub use chain::{ChainBuilder, Op};
pub use definition::SchemaDef;
pub use error::{Error, Result};
pub use ffi::*;
pub use field::Field;
pub use nested::{crop_css, crop_css_all, crop_regex, crop_regex_all};
pub use record::Record;
pub use schema::{Schema, SchemaBuilder};
pub use shape::Shape;
pub use validate::PreValidator;
pub use value::{Map, Value};

pub mod prelude {
    pub use crate::backends::{BackendConfig, HtmlDocument, JsonDocument};
    pub use crate::chain::ChainBuilder;
    pub use crate::field::Field;
    pub use crate::nested::{crop_css, crop_css_all, crop_regex, crop_regex_all};
    pub use crate::record::Record;
    pub use crate::schema::Schema;
    pub use crate::shape::Shape;
    pub use crate::validate::PreValidator;
    pub use crate::value::{Map, Value};
}
