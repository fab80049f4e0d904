//! Schemas and record materialization
//!
//! A [`Schema`] is the immutable field registry built once by
//! [`SchemaBuilder`]: for every field name, the declared [`Shape`] and one or
//! more [`Field`] descriptors tried in order. Materializing a record builds
//! each backend at most once, resolves the fields in declaration order and
//! tracks how many of them fell back to their default.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::backends::{BackendCache, BackendConfig, BackendKind, HtmlDocument, Parse};
use crate::error::{Error, Result};
use crate::field::{Field, Source};
use crate::pipeline::{Hooks, Resolved, Stage};
use crate::record::Record;
use crate::shape::Shape;
use crate::validate::PreValidator;
use crate::value::{Map, Value};

/// Value derived from an already resolved record.
pub type Computed = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

#[derive(Clone)]
struct Declared {
    shape: Shape,
    fields: Vec<Field>,
}

#[derive(Clone)]
struct Config {
    backends: HashMap<BackendKind, BackendConfig>,
    type_cast: bool,
    fail_tolerance: i64,
    hooks_priority: bool,
}

impl Default for Config {
    fn default() -> Self {
        let mut backends = HashMap::new();
        backends.insert(BackendKind::of::<HtmlDocument>(), BackendConfig::new());
        Self {
            backends,
            type_cast: true,
            fail_tolerance: -1,
            hooks_priority: true,
        }
    }
}

struct SchemaInner {
    name: String,
    fields: IndexMap<String, Declared>,
    computed: IndexMap<String, Computed>,
    config: Config,
    hooks: Hooks,
    validators: Vec<PreValidator>,
    required: Vec<BackendKind>,
}

/// Immutable, cheaply clonable field registry.
#[derive(Clone)]
pub struct Schema(Arc<SchemaInner>);

/// Builder for [`Schema`].
///
/// The `HtmlDocument` backend is configured by default; other backends need
/// an explicit [`backend`](SchemaBuilder::backend) call.
pub struct SchemaBuilder {
    name: String,
    fields: IndexMap<String, Declared>,
    computed: IndexMap<String, Computed>,
    config: Config,
    hooks: Hooks,
    validators: Vec<PreValidator>,
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

impl SchemaBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: IndexMap::new(),
            computed: IndexMap::new(),
            config: Config::default(),
            hooks: Hooks::default(),
            validators: Vec::new(),
        }
    }

    /// Start from `parent`: its fields, computed values, configuration, hooks
    /// and validators. Fields declared again keep the parent's position.
    pub fn extend(mut self, parent: &Schema) -> Self {
        let inner = &parent.0;
        for (name, declared) in &inner.fields {
            self.fields.insert(name.clone(), declared.clone());
        }
        for (name, computed) in &inner.computed {
            self.computed.insert(name.clone(), computed.clone());
        }
        self.config.backends.extend(
            inner
                .config
                .backends
                .iter()
                .map(|(kind, config)| (*kind, config.clone())),
        );
        self.config.type_cast = inner.config.type_cast;
        self.config.fail_tolerance = inner.config.fail_tolerance;
        self.config.hooks_priority = inner.config.hooks_priority;
        self.hooks.merge(&inner.hooks);
        self.validators.extend(inner.validators.iter().cloned());
        self
    }

    /// Construction config for backend `B`.
    pub fn backend<B: Parse>(mut self, config: BackendConfig) -> Self {
        self.config.backends.insert(BackendKind::of::<B>(), config);
        self
    }

    pub fn type_cast(mut self, enabled: bool) -> Self {
        self.config.type_cast = enabled;
        self
    }

    /// Number of fields allowed to fall back to their default: `< 0`
    /// disables tracking, `0` makes the first default fatal.
    pub fn fail_tolerance(mut self, tolerance: i64) -> Self {
        self.config.fail_tolerance = tolerance;
        self
    }

    /// Whether name-keyed hooks override the field's own configuration.
    pub fn hooks_priority(mut self, enabled: bool) -> Self {
        self.config.hooks_priority = enabled;
        self
    }

    pub fn field(self, name: &str, shape: Shape, field: Field) -> Self {
        self.fallback(name, shape, [field])
    }

    /// Several descriptors for one name: the first whose processed value is
    /// not its default wins, otherwise the last one's result is used.
    pub fn fallback(mut self, name: &str, shape: Shape, fields: impl IntoIterator<Item = Field>) -> Self {
        let declared = Declared {
            shape,
            fields: fields.into_iter().collect(),
        };
        self.fields.insert(name.to_string(), declared);
        self
    }

    pub fn computed<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.computed.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn hook_default(mut self, names: &[&str], value: impl Into<Value>) -> Self {
        let value = value.into();
        for name in names {
            self.hooks.set_default(name, value.clone());
        }
        self
    }

    pub fn hook_filter<F>(mut self, names: &[&str], f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let f: crate::pipeline::Filter = Arc::new(f);
        for name in names {
            self.hooks.set_filter(name, f.clone());
        }
        self
    }

    pub fn hook_callback<F>(mut self, names: &[&str], f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let f: crate::pipeline::Callback = Arc::new(f);
        for name in names {
            self.hooks.set_callback(name, f.clone());
        }
        self
    }

    pub fn hook_factory<F>(mut self, names: &[&str], f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let f: crate::pipeline::Factory = Arc::new(f);
        for name in names {
            self.hooks.set_factory(name, f.clone());
        }
        self
    }

    pub fn pre_validate(mut self, validator: PreValidator) -> Self {
        self.validators.push(validator);
        self
    }

    fn check_field(&self, name: &str, declared: &Declared, field: &Field) -> Result<()> {
        field.chain().validate()?;
        match field.source() {
            Source::Backend(kind) if !self.config.backends.contains_key(kind) => {
                Err(Error::MissingBackendConfig {
                    schema: self.name.clone(),
                    field: name.to_string(),
                    backend: kind.name(),
                })
            }
            Source::Nested(nested) => {
                nested.check_shape(&self.name, name, &declared.shape)?;
                if !field.chain().is_empty() {
                    return Err(Error::config(
                        &self.name,
                        format!("nested field `{name}` does not take operations"),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Validate the registry and freeze it.
    pub fn build(mut self) -> Result<Schema> {
        self.fields.retain(|name, _| {
            let keep = !is_dunder(name);
            if !keep {
                debug!("`{}`: skip `{}`", self.name, name);
            }
            keep
        });

        let mut required = Vec::new();
        for (name, declared) in &self.fields {
            if declared.fields.is_empty() {
                let e = Error::config(&self.name, format!("field `{name}` has no descriptors"));
                error!("{}", e);
                return Err(e);
            }
            for field in &declared.fields {
                if let Err(e) = self.check_field(name, declared, field) {
                    error!("{}", e);
                    return Err(e);
                }
                if let Some(kind) = field.backend_kind() {
                    if !required.contains(&kind) {
                        required.push(kind);
                    }
                }
            }
        }

        debug!(
            "`{}` built: {} fields, backends {:?}",
            self.name,
            self.fields.len(),
            required
        );

        Ok(Schema(Arc::new(SchemaInner {
            name: self.name,
            fields: self.fields,
            computed: self.computed,
            config: self.config,
            hooks: self.hooks,
            validators: self.validators,
            required,
        })))
    }
}

impl Schema {
    pub fn builder(name: &str) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Registered field names in declaration order, private ones included.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.fields.keys().map(String::as_str)
    }

    pub fn shape(&self, name: &str) -> Option<&Shape> {
        self.0.fields.get(name).map(|declared| &declared.shape)
    }

    /// Descriptors registered for `name`, in fallback order.
    pub fn fields(&self, name: &str) -> Option<&[Field]> {
        self.0.fields.get(name).map(|declared| declared.fields.as_slice())
    }

    pub fn computed_names(&self) -> impl Iterator<Item = &str> {
        self.0.computed.keys().map(String::as_str)
    }

    pub(crate) fn computed(&self, name: &str) -> Option<&Computed> {
        self.0.computed.get(name)
    }

    /// Distinct backend types the descriptors need.
    pub fn required_backends(&self) -> &[BackendKind] {
        &self.0.required
    }

    /// Materialize a record from `raw`.
    pub fn parse(&self, raw: &str) -> Result<Record> {
        self.materialize(raw, true, Map::new())
    }

    /// Materialize a record. With `parse` off no field is resolved and the
    /// record holds only `overrides`; otherwise `overrides` replace resolved
    /// values.
    pub fn materialize(&self, raw: &str, parse: bool, overrides: Map) -> Result<Record> {
        let mut values = if parse { self.resolve(raw)? } else { Map::new() };
        values.extend(overrides);
        Ok(Record::new(self.clone(), raw.to_string(), values))
    }

    /// Record from already known values, without parsing.
    pub fn from_kwargs(&self, values: Map) -> Record {
        Record::new(self.clone(), String::new(), values)
    }

    pub fn from_list<S: AsRef<str>>(&self, raws: impl IntoIterator<Item = S>) -> Result<Vec<Record>> {
        raws.into_iter().map(|raw| self.parse(raw.as_ref())).collect()
    }

    /// Record from the part of `raw` selected by `crop`, `None` when the
    /// crop finds nothing.
    pub fn from_crop_rule<F>(&self, raw: &str, crop: F) -> Result<Option<Record>>
    where
        F: Fn(&str) -> Option<String>,
    {
        crop(raw).map(|part| self.parse(&part)).transpose()
    }

    /// One record per part of `raw` returned by `crop`.
    pub fn from_crop_rule_list<F>(&self, raw: &str, crop: F) -> Result<Vec<Record>>
    where
        F: Fn(&str) -> Vec<String>,
    {
        self.from_list(crop(raw))
    }

    fn resolve(&self, raw: &str) -> Result<Map> {
        let inner = &self.0;
        let total = inner.fields.len();
        info!("Start parse `{}`. Fields count: {}", inner.name, total);

        for validator in &inner.validators {
            validator.check(&inner.name, raw)?;
        }

        let mut cache = BackendCache::new(raw);
        let mut values = Map::with_capacity(total);
        let mut fails = 0usize;
        let tolerance = inner.config.fail_tolerance;

        for (name, declared) in &inner.fields {
            let stage = Stage {
                schema: &inner.name,
                name,
                shape: inner.config.type_cast.then_some(&declared.shape),
                hooks: &inner.hooks,
                hooks_priority: inner.config.hooks_priority,
            };
            let resolved = self.resolve_field(&stage, &declared.fields, &mut cache)?;

            if resolved.defaulted && tolerance >= 0 {
                fails += 1;
                warn!(
                    "[{}] Failed parse `{}.{}`, set `{}`",
                    fails, inner.name, name, resolved.value
                );
                if fails as i64 > tolerance {
                    return Err(Error::ToleranceExceeded {
                        schema: inner.name.clone(),
                        failed: fails,
                        total,
                    });
                }
            }

            debug!("`{}.{}` = {}", inner.name, name, resolved.value);
            values.insert(name.clone(), resolved.value);
        }

        debug!(
            "`{}` done. Fields fails: {}, backends built: {}",
            inner.name,
            fails,
            cache.len()
        );
        Ok(values)
    }

    fn resolve_field(&self, stage: &Stage<'_>, fields: &[Field], cache: &mut BackendCache<'_>) -> Result<Resolved> {
        let empty = BackendConfig::new();
        let config = |field: &Field| {
            field
                .backend_kind()
                .and_then(|kind| self.0.config.backends.get(&kind))
                .unwrap_or(&empty)
        };

        let Some((last, alternatives)) = fields.split_last() else {
            return Err(Error::config(stage.schema, format!("field `{}` has no descriptors", stage.name)));
        };

        for (i, field) in alternatives.iter().enumerate() {
            let raw = field.extract_raw(cache, config(field))?;
            let resolved = stage.run(field, raw)?;
            if !resolved.defaulted {
                return Ok(resolved);
            }
            debug!(
                "`{}.{}`: descriptor {} gave its default, try next",
                stage.schema, stage.name, i
            );
        }

        let raw = last.extract_raw(cache, config(last))?;
        stage.run(last, raw)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .0
            .fields
            .iter()
            .map(|(name, declared)| format!("{name}: {}", declared.shape))
            .collect();
        f.debug_struct("Schema")
            .field("name", &self.0.name)
            .field("fields", &fields)
            .finish()
    }
}
