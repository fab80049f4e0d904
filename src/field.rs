//! Field descriptors
//!
//! A [`Field`] says where a value comes from (raw text, a backend, a fixed
//! mock value, or a nested schema), which operation chain turns that source
//! into a raw value, and how the pipeline post-processes it.

use std::fmt;
use std::sync::Arc;

use crate::backends::{BackendCache, BackendConfig, BackendKind, HtmlDocument, Item, JsonDocument, Parse};
use crate::chain::{Chain, ChainBuilder};
use crate::error::Result;
use crate::nested::Nested;
use crate::pipeline::{Callback, Factory, Filter, Hooks, Stage};
use crate::schema::Schema;
use crate::value::Value;

/// What a field's chain starts from.
#[derive(Clone)]
pub enum Source {
    /// The raw input string.
    Raw,
    /// Root of a backend context built from the raw input.
    Backend(BackendKind),
    /// A fixed value, independent of the input.
    Mock(Value),
    /// Records of another schema built from cropped parts of the input.
    Nested(Nested),
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Raw => f.write_str("Raw"),
            Source::Backend(kind) => write!(f, "Backend({})", kind.name()),
            Source::Mock(value) => write!(f, "Mock({value})"),
            Source::Nested(nested) => write!(f, "{nested:?}"),
        }
    }
}

#[derive(Clone)]
pub struct Field {
    source: Source,
    chain: Chain,
    default: Option<Value>,
    filter: Option<Filter>,
    callback: Option<Callback>,
    factory: Option<Factory>,
}

impl Field {
    fn with_source(source: Source) -> Self {
        Self {
            source,
            chain: Chain::new(),
            default: None,
            filter: None,
            callback: None,
            factory: None,
        }
    }

    /// Field over the raw input text.
    pub fn raw() -> Self {
        Self::with_source(Source::Raw)
    }

    /// Field over the [`HtmlDocument`] backend.
    pub fn html() -> Self {
        Self::backend::<HtmlDocument>()
    }

    /// Field over the [`JsonDocument`] backend.
    pub fn json() -> Self {
        Self::backend::<JsonDocument>()
    }

    pub fn backend<B: Parse>() -> Self {
        Self::with_source(Source::Backend(BackendKind::of::<B>()))
    }

    /// Field yielding a fixed value instead of reading the input.
    pub fn mock(value: impl Into<Value>) -> Self {
        Self::with_source(Source::Mock(value.into()))
    }

    /// Single nested record built from the part of the input `crop` selects.
    pub fn nested<F>(schema: &Schema, crop: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::with_source(Source::Nested(Nested::One {
            schema: schema.clone(),
            crop: Arc::new(crop),
        }))
    }

    /// List of nested records, one per part `crop` returns.
    pub fn nested_list<F>(schema: &Schema, crop: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        Self::with_source(Source::Nested(Nested::Many {
            schema: schema.clone(),
            crop: Arc::new(crop),
        }))
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Keep list elements (or map values) for which `f` returns true.
    pub fn filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(f));
        self
    }

    /// Transform the value, element-wise for lists and maps.
    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(f));
        self
    }

    /// Produce the final value. Disables the type cast for this field.
    pub fn factory<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(f));
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        match self.source {
            Source::Backend(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub(crate) fn filter_fn(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub(crate) fn callback_fn(&self) -> Option<&Callback> {
        self.callback.as_ref()
    }

    pub(crate) fn factory_fn(&self) -> Option<&Factory> {
        self.factory.as_ref()
    }

    /// Raw extraction: run the chain against this field's source.
    ///
    /// `config` is the construction config for a backend source.
    pub(crate) fn extract_raw(&self, cache: &mut BackendCache<'_>, config: &BackendConfig) -> Result<Value> {
        match &self.source {
            Source::Raw => {
                let raw = Item::Value(Value::Str(cache.raw().to_string()));
                Ok(self.chain.run(raw)?.into_value())
            }
            Source::Mock(value) => Ok(self.chain.run(Item::Value(value.clone()))?.into_value()),
            Source::Backend(kind) => {
                let backend = cache.get(*kind, config)?;
                Ok(self.chain.run(backend.root())?.into_value())
            }
            Source::Nested(nested) => nested.resolve(cache.raw()),
        }
    }

    /// Run this descriptor on `raw` outside any schema: the chain and the
    /// field's own default, filter, callback and factory. No hooks and no
    /// type cast; backends are built with an empty config.
    pub fn extract(&self, raw: &str) -> Result<Value> {
        self.chain.validate()?;
        let mut cache = BackendCache::new(raw);
        let value = self.extract_raw(&mut cache, &BackendConfig::new())?;
        let hooks = Hooks::default();
        Ok(Stage::standalone(&hooks).run(self, value)?.value)
    }
}

impl ChainBuilder for Field {
    fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("source", &self.source)
            .field("chain", &self.chain)
            .field("default", &self.default)
            .field("filter", &self.filter.is_some())
            .field("callback", &self.callback.is_some())
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_extract_standalone() {
        let field = Field::raw().re_findall(r"\d+");
        assert_eq!(
            field.extract("a1b22c333").unwrap(),
            Value::from(vec!["1", "22", "333"])
        );

        let field = Field::html().css("title").first().text();
        let html = "<html><head><title>Page</title></head></html>";
        assert_eq!(field.extract(html).unwrap(), Value::from("Page"));
    }

    #[test]
    fn test_extract_no_cast_and_default() {
        let field = Field::raw()
            .re_search(r"price: (\d+)")
            .index(1)
            .default("0");
        assert_eq!(field.extract("price: 15").unwrap(), Value::from("15"));
        assert_eq!(field.extract("no price").unwrap(), Value::from("0"));
    }

    #[test]
    fn test_mock_field() {
        let field = Field::mock(vec![3, 1, 2]).apply(|v| {
            let max = v.as_list().and_then(|items| items.iter().filter_map(Value::as_i64).max());
            Value::from(max)
        });
        assert_eq!(field.extract("ignored").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_json_field() {
        let field = Field::json().path("items[*].name");
        let raw = r#"{"items": [{"name": "a"}, {"name": "b"}]}"#;
        assert_eq!(field.extract(raw).unwrap(), Value::from(vec!["a", "b"]));
    }

    #[test]
    fn test_extract_reports_builder_errors() {
        let field = Field::raw().re_search("(unclosed");
        assert!(matches!(field.extract("x"), Err(Error::Pattern { .. })));
    }

    #[test]
    fn test_backend_kind() {
        assert_eq!(Field::html().backend_kind(), Some(BackendKind::of::<HtmlDocument>()));
        assert_eq!(Field::raw().backend_kind(), None);
        assert!(Field::json().chain().is_empty());
    }
}
