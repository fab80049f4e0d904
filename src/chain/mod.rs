//! Operation chains
//!
//! A [`Chain`] is an ordered list of [`Op`] steps built with the fluent
//! [`ChainBuilder`] methods. Running it folds the steps left to right over an
//! [`Item`], starting from a backend root or the raw input text.
//!
//! Every op declares how it treats lists through [`Arity`]: element-wise ops
//! are broadcast over list items, indexing and aggregate ops see the whole
//! list.

mod js;

use std::fmt;
use std::sync::Arc;

use regex::{Captures, Regex};
use tracing::trace;

use crate::backends::{index_list, navigate_path, Item};
use crate::error::{Error, Result};
use crate::value::{Map, Value};

pub use js::{parse_object, parse_objects, parse_vars};

/// Function applied to the whole current value by [`Op::Apply`].
pub type ApplyFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// How an op treats a list value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// The op sees the value as is, lists included.
    Whole,
    /// The op runs on every list element, the result keeps the list shape.
    Each,
    /// The op runs on every list element and the per-element lists are
    /// concatenated.
    FlatEach,
}

#[derive(Clone)]
pub enum Op {
    // markup capabilities
    Css(String),
    Text,
    Attr(String),
    Attrs,
    OuterHtml,
    InnerHtml,
    Parent,
    Children,

    // access
    Get,
    GetAll,
    Index(i64),
    Key(String),
    Path(String),
    Keys,
    Values,
    Items,

    // special
    Apply(ApplyFn),
    ConcatL(String),
    ConcatR(String),
    Replace {
        old: String,
        new: String,
        count: Option<usize>,
    },
    ReSearch {
        regex: Regex,
        groupdict: bool,
    },
    ReFindAll {
        regex: Regex,
        groupdict: bool,
    },
    Strip(Option<String>),
    LStrip(Option<String>),
    RStrip(Option<String>),
    Upper,
    Lower,
    Capitalize,
    Count(String),
    Join(String),
    Split(Option<String>),
    JsObject,
    JsObjects,
    JsVars,
}

fn compile(pattern: &str, groupdict: bool) -> Result<Regex> {
    let regex = Regex::new(pattern).map_err(|e| Error::Pattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    if groupdict && !regex.capture_names().any(|name| name.is_some()) {
        return Err(Error::NoNamedGroups {
            pattern: pattern.to_string(),
        });
    }
    Ok(regex)
}

impl Op {
    pub fn re_search(pattern: &str, groupdict: bool) -> Result<Op> {
        Ok(Op::ReSearch {
            regex: compile(pattern, groupdict)?,
            groupdict,
        })
    }

    pub fn re_findall(pattern: &str, groupdict: bool) -> Result<Op> {
        Ok(Op::ReFindAll {
            regex: compile(pattern, groupdict)?,
            groupdict,
        })
    }

    /// Split on `sep`, or on whitespace runs when `None`.
    pub fn split(sep: Option<&str>) -> Result<Op> {
        match sep {
            Some("") => Err(Error::EmptySeparator { op: "split" }),
            sep => Ok(Op::Split(sep.map(String::from))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Css(_) => "css",
            Op::Text => "text",
            Op::Attr(_) => "attr",
            Op::Attrs => "attrs",
            Op::OuterHtml => "outer_html",
            Op::InnerHtml => "inner_html",
            Op::Parent => "parent",
            Op::Children => "children",
            Op::Get => "get",
            Op::GetAll => "getall",
            Op::Index(_) => "index",
            Op::Key(_) => "key",
            Op::Path(_) => "path",
            Op::Keys => "keys",
            Op::Values => "values",
            Op::Items => "items",
            Op::Apply(_) => "apply",
            Op::ConcatL(_) => "concat_l",
            Op::ConcatR(_) => "concat_r",
            Op::Replace { .. } => "replace",
            Op::ReSearch { .. } => "re_search",
            Op::ReFindAll { .. } => "re_findall",
            Op::Strip(_) => "strip",
            Op::LStrip(_) => "lstrip",
            Op::RStrip(_) => "rstrip",
            Op::Upper => "upper",
            Op::Lower => "lower",
            Op::Capitalize => "capitalize",
            Op::Count(_) => "count",
            Op::Join(_) => "join",
            Op::Split(_) => "split",
            Op::JsObject => "js_object",
            Op::JsObjects => "js_objects",
            Op::JsVars => "js_vars",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Op::Css(_) | Op::Children => Arity::FlatEach,
            Op::Attrs
            | Op::Get
            | Op::GetAll
            | Op::Index(_)
            | Op::Path(_)
            | Op::Keys
            | Op::Values
            | Op::Items
            | Op::Apply(_)
            | Op::Join(_) => Arity::Whole,
            _ => Arity::Each,
        }
    }

    /// Run the op on `item`, broadcasting over lists according to its arity.
    pub fn apply<'d>(&self, item: Item<'d>) -> Result<Item<'d>> {
        match self.arity() {
            Arity::Whole => self.apply_whole(item),
            Arity::Each => match item.into_items() {
                Ok(items) => items
                    .into_iter()
                    .map(|item| self.apply(item))
                    .collect::<Result<Vec<_>>>()
                    .map(Item::List),
                Err(item) if item.is_null() => Ok(item),
                Err(item) => self.apply_one(item),
            },
            Arity::FlatEach => match item.into_items() {
                Ok(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        match self.apply(item)? {
                            Item::List(found) => out.extend(found),
                            other if other.is_null() => {}
                            other => out.push(other),
                        }
                    }
                    Ok(Item::List(out))
                }
                Err(item) if item.is_null() => Ok(item),
                Err(item) => self.apply_one(item),
            },
        }
    }

    fn mismatch(&self, item: &Item<'_>) -> Error {
        Error::OpMismatch {
            op: self.to_string(),
            found: item.kind(),
        }
    }

    fn apply_whole<'d>(&self, item: Item<'d>) -> Result<Item<'d>> {
        match self {
            Op::Attrs => match item {
                Item::Node(node) => Ok(Item::Value(Value::Map(node.attrs()))),
                Item::List(items) => match items.into_iter().next() {
                    Some(first) => self.apply_whole(first),
                    None => Ok(Item::Value(Value::Map(Map::new()))),
                },
                other => Err(self.mismatch(&other)),
            },
            Op::Get => match item {
                Item::List(items) => Ok(items
                    .into_iter()
                    .next()
                    .map(|first| Item::Value(first.into_value()))
                    .unwrap_or_else(Item::null)),
                Item::Value(Value::List(values)) => {
                    Ok(Item::Value(values.into_iter().next().unwrap_or_default()))
                }
                other => Ok(Item::Value(other.into_value())),
            },
            Op::GetAll => match item.into_items() {
                Ok(items) => Ok(Item::Value(Value::List(
                    items.into_iter().map(Item::into_value).collect(),
                ))),
                Err(item) if item.is_null() => Ok(Item::Value(Value::List(Vec::new()))),
                Err(item) => Ok(Item::Value(Value::List(vec![item.into_value()]))),
            },
            Op::Index(idx) => match item {
                Item::List(items) => {
                    let len = items.len() as i64;
                    let pos = if *idx < 0 { len + idx } else { *idx };
                    if pos < 0 || pos >= len {
                        return Ok(Item::null());
                    }
                    Ok(items.into_iter().nth(pos as usize).unwrap_or_else(Item::null))
                }
                Item::Value(Value::List(values)) => {
                    Ok(Item::Value(index_list(&values, *idx).cloned().unwrap_or_default()))
                }
                Item::Value(Value::Str(s)) => {
                    let chars: Vec<Value> = s.chars().map(|c| Value::Str(c.to_string())).collect();
                    Ok(Item::Value(index_list(&chars, *idx).cloned().unwrap_or_default()))
                }
                Item::Value(Value::Null) => Ok(Item::null()),
                other => Err(self.mismatch(&other)),
            },
            Op::Path(path) => match item {
                Item::Value(value) => Ok(Item::Value(navigate_path(&value, path))),
                Item::List(_) => Ok(Item::Value(navigate_path(&item.into_value(), path))),
                other => Err(self.mismatch(&other)),
            },
            Op::Keys | Op::Values | Op::Items => match item {
                Item::Value(Value::Map(map)) => Ok(Item::Value(map_view(self, map))),
                other => Err(self.mismatch(&other)),
            },
            Op::Apply(f) => Ok(Item::Value(f(item.into_value()))),
            Op::Join(sep) => match item.into_items() {
                Ok(items) => Ok(Item::Value(Value::Str(
                    items
                        .into_iter()
                        .map(|item| item.into_value().to_text())
                        .collect::<Vec<_>>()
                        .join(sep),
                ))),
                Err(item) if item.is_null() => Ok(item),
                Err(item) => Err(self.mismatch(&item)),
            },
            _ => self.apply_one(item),
        }
    }

    fn apply_one<'d>(&self, item: Item<'d>) -> Result<Item<'d>> {
        if let Item::Node(node) = &item {
            return match self {
                Op::Css(query) => Ok(Item::List(node.css(query)?.into_iter().map(Item::Node).collect())),
                Op::Text => Ok(Item::Value(Value::Str(node.text()))),
                Op::Attr(name) => Ok(Item::Value(node.attr(name).into())),
                Op::OuterHtml => Ok(Item::Value(Value::Str(node.outer_html()))),
                Op::InnerHtml => Ok(Item::Value(Value::Str(node.inner_html()))),
                Op::Parent => Ok(node.parent().map(Item::Node).unwrap_or_else(Item::null)),
                Op::Children => Ok(Item::List(node.children().into_iter().map(Item::Node).collect())),
                _ => Err(self.mismatch(&item)),
            };
        }

        match (self, item) {
            (Op::Key(key), Item::Value(Value::Map(mut map))) => {
                Ok(Item::Value(map.shift_remove(key).unwrap_or_default()))
            }
            (op, Item::Value(Value::Str(s))) => op.apply_str(s).map(Item::Value),
            (_, other) => Err(self.mismatch(&other)),
        }
    }

    fn apply_str(&self, s: String) -> Result<Value> {
        let value = match self {
            Op::ConcatL(left) => Value::Str(format!("{left}{s}")),
            Op::ConcatR(right) => Value::Str(format!("{s}{right}")),
            Op::Replace { old, new, count } => Value::Str(match count {
                Some(n) => s.replacen(old.as_str(), new, *n),
                None => s.replace(old.as_str(), new),
            }),
            Op::ReSearch { regex, groupdict } => match regex.captures(&s) {
                Some(caps) if *groupdict => Value::Map(named_groups(regex, &caps)),
                Some(caps) => Value::List(
                    caps.iter()
                        .map(|m| m.map(|m| Value::from(m.as_str())).unwrap_or_default())
                        .collect(),
                ),
                None => Value::Null,
            },
            Op::ReFindAll { regex, groupdict } => Value::List(findall(regex, *groupdict, &s)),
            Op::Strip(chars) => Value::Str(match chars {
                Some(cs) => s.trim_matches(|c| cs.contains(c)).to_string(),
                None => s.trim().to_string(),
            }),
            Op::LStrip(chars) => Value::Str(match chars {
                Some(cs) => s.trim_start_matches(|c| cs.contains(c)).to_string(),
                None => s.trim_start().to_string(),
            }),
            Op::RStrip(chars) => Value::Str(match chars {
                Some(cs) => s.trim_end_matches(|c| cs.contains(c)).to_string(),
                None => s.trim_end().to_string(),
            }),
            Op::Upper => Value::Str(s.to_uppercase()),
            Op::Lower => Value::Str(s.to_lowercase()),
            Op::Capitalize => Value::Str(capitalize(&s)),
            Op::Count(sub) => Value::Int(count_occurrences(&s, sub)),
            Op::Split(sep) => Value::List(match sep {
                Some(sep) if sep.is_empty() => return Err(Error::EmptySeparator { op: "split" }),
                Some(sep) => s.split(sep.as_str()).map(Value::from).collect(),
                None => s.split_whitespace().map(Value::from).collect(),
            }),
            Op::JsObject => parse_object(&s),
            Op::JsObjects => Value::List(parse_objects(&s)),
            Op::JsVars => parse_vars(&s).map(Value::Map).unwrap_or_default(),
            _ => {
                return Err(Error::OpMismatch {
                    op: self.to_string(),
                    found: "str",
                })
            }
        };
        Ok(value)
    }
}

fn map_view(op: &Op, map: Map) -> Value {
    match op {
        Op::Keys => Value::List(map.into_keys().map(Value::Str).collect()),
        Op::Values => Value::List(map.into_values().collect()),
        _ => Value::List(
            map.into_iter()
                .map(|(k, v)| Value::List(vec![Value::Str(k), v]))
                .collect(),
        ),
    }
}

fn named_groups(regex: &Regex, caps: &Captures<'_>) -> Map {
    regex
        .capture_names()
        .flatten()
        .map(|name| {
            let value = caps.name(name).map(|m| Value::from(m.as_str()));
            (name.to_string(), value.into())
        })
        .collect()
}

/// Group handling follows the usual `findall` convention: no groups yields
/// whole matches, one group yields that group, several yield lists.
fn findall(regex: &Regex, groupdict: bool, s: &str) -> Vec<Value> {
    let groups = regex.captures_len() - 1;
    regex
        .captures_iter(s)
        .map(|caps| {
            if groupdict {
                return Value::Map(named_groups(regex, &caps));
            }
            let group = |i: usize| Value::from(caps.get(i).map_or("", |m| m.as_str()));
            match groups {
                0 => group(0),
                1 => group(1),
                n => Value::List((1..=n).map(group).collect()),
            }
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn count_occurrences(s: &str, sub: &str) -> i64 {
    if sub.is_empty() {
        return s.chars().count() as i64 + 1;
    }
    s.matches(sub).count() as i64
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            Op::Css(arg) | Op::Attr(arg) | Op::Key(arg) | Op::Path(arg) => write!(f, "{name}({arg:?})"),
            Op::ConcatL(arg) | Op::ConcatR(arg) | Op::Count(arg) | Op::Join(arg) => {
                write!(f, "{name}({arg:?})")
            }
            Op::Index(idx) => write!(f, "{name}({idx})"),
            Op::Replace { old, new, count } => match count {
                Some(n) => write!(f, "{name}({old:?}, {new:?}, {n})"),
                None => write!(f, "{name}({old:?}, {new:?})"),
            },
            Op::ReSearch { regex, groupdict } | Op::ReFindAll { regex, groupdict } => {
                write!(f, "{name}({:?}, groupdict={groupdict})", regex.as_str())
            }
            Op::Strip(Some(arg)) | Op::LStrip(Some(arg)) | Op::RStrip(Some(arg)) => {
                write!(f, "{name}({arg:?})")
            }
            Op::Split(Some(arg)) => write!(f, "{name}({arg:?})"),
            _ => write!(f, "{name}()"),
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An ordered, immutable-after-build sequence of ops.
///
/// Builder mistakes (bad patterns, `keys` without `attrs`) are recorded and
/// reported by [`Chain::validate`], which schema build calls for every field.
#[derive(Clone, Default)]
pub struct Chain {
    steps: Vec<Op>,
    pending: Vec<Error>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Op] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, op: Op) {
        if matches!(op, Op::Keys | Op::Values | Op::Items) {
            match self.steps.last() {
                Some(Op::Attrs) => {}
                previous => self.pending.push(Error::ChainOrder {
                    op: op.name(),
                    previous: previous.map_or_else(|| "<start>".to_string(), Op::to_string),
                }),
            }
        }
        self.steps.push(op);
    }

    pub(crate) fn push_result(&mut self, op: Result<Op>) {
        match op {
            Ok(op) => self.push(op),
            Err(e) => self.pending.push(e),
        }
    }

    /// First builder error, if any.
    pub fn validate(&self) -> Result<()> {
        match self.pending.first() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn run<'d>(&self, initial: Item<'d>) -> Result<Item<'d>> {
        self.validate()?;
        let mut item = initial;
        for (i, op) in self.steps.iter().enumerate() {
            trace!("step {}: {} on {}", i, op, item.kind());
            item = op.apply(item)?;
        }
        Ok(item)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.steps).finish()
    }
}

/// Fluent chain construction, shared by [`Chain`] and
/// [`Field`](crate::Field).
pub trait ChainBuilder: Sized {
    fn chain_mut(&mut self) -> &mut Chain;

    fn step(mut self, op: Op) -> Self {
        self.chain_mut().push(op);
        self
    }

    /// Select descendant nodes by css query. Lists are flattened.
    fn css(self, query: &str) -> Self {
        self.step(Op::Css(query.to_string()))
    }

    fn text(self) -> Self {
        self.step(Op::Text)
    }

    fn attr(self, name: &str) -> Self {
        self.step(Op::Attr(name.to_string()))
    }

    /// Attributes of the node (or the first node of a list) as a map.
    fn attrs(self) -> Self {
        self.step(Op::Attrs)
    }

    fn outer_html(self) -> Self {
        self.step(Op::OuterHtml)
    }

    fn inner_html(self) -> Self {
        self.step(Op::InnerHtml)
    }

    fn parent(self) -> Self {
        self.step(Op::Parent)
    }

    fn children(self) -> Self {
        self.step(Op::Children)
    }

    /// First item, serialized.
    fn get(self) -> Self {
        self.step(Op::Get)
    }

    fn getall(self) -> Self {
        self.step(Op::GetAll)
    }

    /// Item at `idx`, negative counts from the end. Out of range is null.
    fn index(self, idx: i64) -> Self {
        self.step(Op::Index(idx))
    }

    fn first(self) -> Self {
        self.index(0)
    }

    fn key(self, key: &str) -> Self {
        self.step(Op::Key(key.to_string()))
    }

    /// Dot/bracket path such as `items[*].id`.
    fn path(self, path: &str) -> Self {
        self.step(Op::Path(path.to_string()))
    }

    fn keys(self) -> Self {
        self.step(Op::Keys)
    }

    fn values(self) -> Self {
        self.step(Op::Values)
    }

    fn items(self) -> Self {
        self.step(Op::Items)
    }

    fn apply<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.step(Op::Apply(Arc::new(f)))
    }

    fn concat_l(self, left: &str) -> Self {
        self.step(Op::ConcatL(left.to_string()))
    }

    fn concat_r(self, right: &str) -> Self {
        self.step(Op::ConcatR(right.to_string()))
    }

    fn replace(self, old: &str, new: &str) -> Self {
        self.step(Op::Replace {
            old: old.to_string(),
            new: new.to_string(),
            count: None,
        })
    }

    fn replace_n(self, old: &str, new: &str, count: usize) -> Self {
        self.step(Op::Replace {
            old: old.to_string(),
            new: new.to_string(),
            count: Some(count),
        })
    }

    /// First match as `[whole, group1, ...]`, null when nothing matches.
    fn re_search(mut self, pattern: &str) -> Self {
        self.chain_mut().push_result(Op::re_search(pattern, false));
        self
    }

    /// First match as a map of named groups.
    fn re_search_dict(mut self, pattern: &str) -> Self {
        self.chain_mut().push_result(Op::re_search(pattern, true));
        self
    }

    fn re_findall(mut self, pattern: &str) -> Self {
        self.chain_mut().push_result(Op::re_findall(pattern, false));
        self
    }

    fn re_findall_dict(mut self, pattern: &str) -> Self {
        self.chain_mut().push_result(Op::re_findall(pattern, true));
        self
    }

    fn strip(self) -> Self {
        self.step(Op::Strip(None))
    }

    fn strip_chars(self, chars: &str) -> Self {
        self.step(Op::Strip(Some(chars.to_string())))
    }

    fn lstrip(self, chars: Option<&str>) -> Self {
        self.step(Op::LStrip(chars.map(String::from)))
    }

    fn rstrip(self, chars: Option<&str>) -> Self {
        self.step(Op::RStrip(chars.map(String::from)))
    }

    fn upper(self) -> Self {
        self.step(Op::Upper)
    }

    fn lower(self) -> Self {
        self.step(Op::Lower)
    }

    fn capitalize(self) -> Self {
        self.step(Op::Capitalize)
    }

    /// Number of non-overlapping occurrences of `sub`.
    fn count(self, sub: &str) -> Self {
        self.step(Op::Count(sub.to_string()))
    }

    fn join(self, sep: &str) -> Self {
        self.step(Op::Join(sep.to_string()))
    }

    fn split(mut self, sep: &str) -> Self {
        self.chain_mut().push_result(Op::split(Some(sep)));
        self
    }

    fn split_whitespace(self) -> Self {
        self.step(Op::Split(None))
    }

    /// First JavaScript object or array literal (or `JSON.parse` argument).
    fn js_object(self) -> Self {
        self.step(Op::JsObject)
    }

    /// Every JavaScript object or array literal, as a list.
    fn js_objects(self) -> Self {
        self.step(Op::JsObjects)
    }

    /// Top-level variable assignments of a script.
    fn js_vars(self) -> Self {
        self.step(Op::JsVars)
    }
}

impl ChainBuilder for Chain {
    fn chain_mut(&mut self) -> &mut Chain {
        self
    }
}
