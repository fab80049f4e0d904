//! Value pipeline
//!
//! Post-processing applied to every raw extraction, in a fixed order:
//!
//! 1. an empty (falsy) result is replaced by the default
//! 2. filter, for list and map values only
//! 3. callback, element-wise for lists and maps
//! 4. factory, or the type cast when no factory is set
//!
//! Each step may come from the field itself or from a name-keyed schema hook.
//! With `hooks_priority` on (the default) the hook wins.
//!
//! A result equal to the effective default counts as a miss, whatever the raw
//! extraction was. Fallback chains move on and the tolerance counter grows on
//! a miss.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::field::Field;
use crate::shape::{cast, Shape};
use crate::value::Value;

pub type Filter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type Callback = Arc<dyn Fn(Value) -> Value + Send + Sync>;
pub type Factory = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Per-schema hooks keyed by field name.
#[derive(Clone, Default)]
pub struct Hooks {
    defaults: HashMap<String, Value>,
    filters: HashMap<String, Filter>,
    callbacks: HashMap<String, Callback>,
    factories: HashMap<String, Factory>,
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
            && self.filters.is_empty()
            && self.callbacks.is_empty()
            && self.factories.is_empty()
    }

    pub(crate) fn set_default(&mut self, name: &str, value: Value) {
        self.defaults.insert(name.to_string(), value);
    }

    pub(crate) fn set_filter(&mut self, name: &str, filter: Filter) {
        self.filters.insert(name.to_string(), filter);
    }

    pub(crate) fn set_callback(&mut self, name: &str, callback: Callback) {
        self.callbacks.insert(name.to_string(), callback);
    }

    pub(crate) fn set_factory(&mut self, name: &str, factory: Factory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Merge `other` over `self`; entries of `other` replace existing ones.
    pub(crate) fn merge(&mut self, other: &Hooks) {
        self.defaults.extend(other.defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.filters.extend(other.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.callbacks.extend(other.callbacks.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.factories.extend(other.factories.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// Result of running one descriptor through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Resolved {
    pub value: Value,
    /// The final value equals the effective default.
    pub defaulted: bool,
}

/// Context a field value is processed in.
pub(crate) struct Stage<'a> {
    pub schema: &'a str,
    pub name: &'a str,
    /// Declared shape, `None` when casting is off.
    pub shape: Option<&'a Shape>,
    pub hooks: &'a Hooks,
    pub hooks_priority: bool,
}

impl<'a> Stage<'a> {
    /// Stage for a field used outside a schema: no hooks, no cast.
    pub fn standalone(hooks: &'a Hooks) -> Self {
        Self {
            schema: "<standalone>",
            name: "<field>",
            shape: None,
            hooks,
            hooks_priority: true,
        }
    }

    fn pick<'v, T: ?Sized>(&self, direct: Option<&'v T>, hook: Option<&'v T>) -> Option<&'v T> {
        if self.hooks_priority {
            hook.or(direct)
        } else {
            direct.or(hook)
        }
    }

    pub fn run(&self, field: &Field, raw: Value) -> Result<Resolved> {
        let (schema, name) = (self.schema, self.name);

        let default = self
            .pick(field.default_value(), self.hooks.defaults.get(name))
            .cloned()
            .unwrap_or_default();
        let mut value = if raw.is_truthy() {
            raw
        } else {
            debug!("{}.{}: empty result {}, set default {}", schema, name, raw, default);
            default.clone()
        };

        if let Some(filter) = self.pick(field.filter_fn(), self.hooks.filters.get(name)) {
            value = match value {
                Value::List(items) => {
                    debug!("{}.{}: filter list", schema, name);
                    Value::List(items.into_iter().filter(|v| filter(v)).collect())
                }
                Value::Map(map) => {
                    debug!("{}.{}: filter dict", schema, name);
                    Value::Map(map.into_iter().filter(|(_, v)| filter(v)).collect())
                }
                other => other,
            };
        }

        if let Some(callback) = self.pick(field.callback_fn(), self.hooks.callbacks.get(name)) {
            debug!("{}.{}: callback", schema, name);
            value = match value {
                Value::List(items) => Value::List(items.into_iter().map(|v| callback(v)).collect()),
                Value::Map(map) => Value::Map(map.into_iter().map(|(k, v)| (k, callback(v))).collect()),
                other => callback(other),
            };
        }

        if let Some(factory) = self.pick(field.factory_fn(), self.hooks.factories.get(name)) {
            debug!("{}.{}: factory", schema, name);
            value = factory(value);
        } else if let Some(shape) = self.shape {
            debug!("{}.{}: cast to {}", schema, name, shape);
            value = cast(shape, value)?;
        }

        let defaulted = value == default;
        Ok(Resolved { value, defaulted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Map;

    fn stage<'a>(shape: Option<&'a Shape>, hooks: &'a Hooks, hooks_priority: bool) -> Stage<'a> {
        Stage {
            schema: "Test",
            name: "spam",
            shape,
            hooks,
            hooks_priority,
        }
    }

    #[test]
    fn test_default_on_empty() {
        let hooks = Hooks::default();
        let field = Field::raw().default("fail");
        for empty in [Value::Null, "".into(), Value::List(vec![]), Value::Int(0)] {
            let resolved = stage(None, &hooks, true).run(&field, empty).unwrap();
            assert_eq!(resolved.value, Value::from("fail"));
            assert!(resolved.defaulted);
        }

        let resolved = stage(None, &hooks, true).run(&Field::raw(), Value::Null).unwrap();
        assert_eq!(resolved.value, Value::Null);
        assert!(resolved.defaulted);
    }

    #[test]
    fn test_defaulted_compares_final_value() {
        let hooks = Hooks::default();

        // extracted text that happens to equal the default
        let field = Field::raw().default("N/A");
        let resolved = stage(None, &hooks, true).run(&field, "N/A".into()).unwrap();
        assert!(resolved.defaulted);

        // a callback turning the default into something else
        let field = Field::raw()
            .default("d1")
            .callback(|v| Value::Str(format!("{}!", v.to_text())));
        let resolved = stage(None, &hooks, true).run(&field, Value::Null).unwrap();
        assert_eq!(resolved.value, Value::from("d1!"));
        assert!(!resolved.defaulted);

        // the hook default is the one compared against when it wins
        let mut hooks = Hooks::default();
        hooks.set_default("spam", "hook".into());
        let field = Field::raw().default("direct");
        let resolved = stage(None, &hooks, true).run(&field, "direct".into()).unwrap();
        assert!(!resolved.defaulted);
        let resolved = stage(None, &hooks, false).run(&field, "direct".into()).unwrap();
        assert!(resolved.defaulted);
    }

    #[test]
    fn test_filter_ignores_strings() {
        let hooks = Hooks::default();
        let field = Field::raw().filter(|v| v.as_str() != Some("a"));

        let resolved = stage(None, &hooks, true).run(&field, "abc".into()).unwrap();
        assert_eq!(resolved.value, Value::from("abc"));

        let resolved = stage(None, &hooks, true)
            .run(&field, Value::from(vec!["a", "b", "a", "c"]))
            .unwrap();
        assert_eq!(resolved.value, Value::from(vec!["b", "c"]));

        let mut map = Map::new();
        map.insert("x".into(), "a".into());
        map.insert("y".into(), "b".into());
        let resolved = stage(None, &hooks, true).run(&field, Value::Map(map)).unwrap();
        assert_eq!(resolved.value.as_map().unwrap().len(), 1);
    }

    #[test]
    fn test_callback_element_wise() {
        let hooks = Hooks::default();
        let field = Field::raw().callback(|v| Value::Str(format!("<{}>", v.to_text())));

        let resolved = stage(None, &hooks, true)
            .run(&field, Value::from(vec!["a", "b"]))
            .unwrap();
        assert_eq!(resolved.value, Value::from(vec!["<a>", "<b>"]));

        let resolved = stage(None, &hooks, true).run(&field, "c".into()).unwrap();
        assert_eq!(resolved.value, Value::from("<c>"));
    }

    #[test]
    fn test_factory_overrides_cast() {
        let hooks = Hooks::default();
        let shape = Shape::Int;
        let field = Field::raw().factory(|v| Value::List(vec![v]));

        let resolved = stage(Some(&shape), &hooks, true).run(&field, "10".into()).unwrap();
        assert_eq!(resolved.value, Value::from(vec!["10"]));

        let resolved = stage(Some(&shape), &hooks, true)
            .run(&Field::raw(), "10".into())
            .unwrap();
        assert_eq!(resolved.value, Value::Int(10));
    }

    #[test]
    fn test_hooks_priority() {
        let mut hooks = Hooks::default();
        hooks.set_default("spam", "hook".into());
        hooks.set_factory("spam", Arc::new(|v: Value| Value::Str(format!("hook:{}", v.to_text()))));

        let field = Field::raw()
            .default("direct")
            .factory(|v| Value::Str(format!("direct:{}", v.to_text())));

        let resolved = stage(None, &hooks, true).run(&field, Value::Null).unwrap();
        assert_eq!(resolved.value, Value::from("hook:hook"));

        let resolved = stage(None, &hooks, false).run(&field, Value::Null).unwrap();
        assert_eq!(resolved.value, Value::from("direct:direct"));

        // hooks fill in what the field does not configure
        let resolved = stage(None, &hooks, false).run(&Field::raw(), Value::Null).unwrap();
        assert_eq!(resolved.value, Value::from("hook:hook"));
    }

    #[test]
    fn test_cast_error_propagates() {
        let hooks = Hooks::default();
        let shape = Shape::Int;
        let result = stage(Some(&shape), &hooks, true).run(&Field::raw(), "ten".into());
        assert!(result.is_err());
    }
}
