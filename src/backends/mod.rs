//! Markup backends
//!
//! A backend turns the raw input of a record into a context that operation
//! chains run against. Each backend type is built at most once per record and
//! shared by every field that asks for it.

mod html;
mod json;

pub use html::*;
pub use json::*;

use std::any::TypeId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::Result;
use crate::value::Value;

/// Construction options for one backend type (a JSON object).
pub type BackendConfig = serde_json::Map<String, serde_json::Value>;

/// A constructed backend context.
pub trait Backend {
    /// Context the operation chain starts from.
    fn root(&self) -> Item<'_>;
}

/// Backends buildable from raw input and configuration.
pub trait Parse: Backend + Sized + 'static {
    /// Short name used in logs and errors.
    const NAME: &'static str;

    fn parse(raw: &str, config: &BackendConfig) -> Result<Self>;
}

fn build_boxed<B: Parse>(raw: &str, config: &BackendConfig) -> Result<Box<dyn Backend>> {
    Ok(Box::new(B::parse(raw, config)?))
}

/// Identity of a backend type, attached to field descriptors.
#[derive(Clone, Copy)]
pub struct BackendKind {
    id: TypeId,
    name: &'static str,
    build: fn(&str, &BackendConfig) -> Result<Box<dyn Backend>>,
}

impl BackendKind {
    pub fn of<B: Parse>() -> Self {
        Self {
            id: TypeId::of::<B>(),
            name: B::NAME,
            build: build_boxed::<B>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn build(&self, raw: &str, config: &BackendConfig) -> Result<Box<dyn Backend>> {
        (self.build)(raw, config)
    }
}

impl PartialEq for BackendKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BackendKind {}

impl Hash for BackendKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackendKind({})", self.name)
    }
}

/// Per-record cache of constructed backends.
pub(crate) struct BackendCache<'r> {
    raw: &'r str,
    built: HashMap<BackendKind, Box<dyn Backend>>,
}

impl<'r> BackendCache<'r> {
    pub(crate) fn new(raw: &'r str) -> Self {
        Self {
            raw,
            built: HashMap::new(),
        }
    }

    pub(crate) fn raw(&self) -> &'r str {
        self.raw
    }

    /// Number of backends built so far.
    pub(crate) fn len(&self) -> usize {
        self.built.len()
    }

    pub(crate) fn get(&mut self, kind: BackendKind, config: &BackendConfig) -> Result<&dyn Backend> {
        let backend = match self.built.entry(kind) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!("build `{}` backend", kind.name);
                entry.insert(kind.build(self.raw, config)?)
            }
        };
        Ok(&**backend)
    }
}

/// Node capabilities a markup backend exposes to operation chains.
pub trait Element<'d>: fmt::Debug {
    /// Descendants (and possibly the node itself) matching a css query.
    fn css(&self, query: &str) -> Result<Vec<Node<'d>>>;
    /// Text content, trimmed.
    fn text(&self) -> String;
    fn attr(&self, name: &str) -> Option<String>;
    fn attrs(&self) -> IndexMap<String, Value>;
    fn outer_html(&self) -> String;
    fn inner_html(&self) -> String;
    fn parent(&self) -> Option<Node<'d>>;
    /// Child elements, text nodes skipped.
    fn children(&self) -> Vec<Node<'d>>;
}

pub type Node<'d> = Rc<dyn Element<'d> + 'd>;

/// Value threaded through an operation chain: a backend node, a list of
/// items, or plain data.
#[derive(Debug, Clone)]
pub enum Item<'d> {
    Node(Node<'d>),
    List(Vec<Item<'d>>),
    Value(Value),
}

impl<'d> Item<'d> {
    pub fn null() -> Self {
        Item::Value(Value::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Item::Node(_) => "node",
            Item::List(_) => "list",
            Item::Value(v) => v.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Item::Value(Value::Null))
    }

    /// Plain data form. Nodes serialize to their outer html.
    pub fn into_value(self) -> Value {
        match self {
            Item::Node(node) => Value::Str(node.outer_html()),
            Item::List(items) => Value::List(items.into_iter().map(Item::into_value).collect()),
            Item::Value(v) => v,
        }
    }

    /// Split a list-like item into its elements; anything else is returned
    /// unchanged as the error.
    pub(crate) fn into_items(self) -> std::result::Result<Vec<Item<'d>>, Item<'d>> {
        match self {
            Item::List(items) => Ok(items),
            Item::Value(Value::List(values)) => Ok(values.into_iter().map(Item::Value).collect()),
            other => Err(other),
        }
    }
}

impl From<Value> for Item<'_> {
    fn from(value: Value) -> Self {
        Item::Value(value)
    }
}
