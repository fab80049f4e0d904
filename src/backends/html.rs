//! HTML backend
//!
//! Uses the scraper crate to parse the document once and select elements by
//! CSS selectors.

use std::rc::Rc;

use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};

use super::{Backend, BackendConfig, Element, Item, Node, Parse};
use crate::error::{Error, Result};
use crate::value::Value;

/// Parsed HTML document.
///
/// Config keys:
/// - `fragment` (bool): parse as a fragment instead of a full document
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn html(&self) -> &Html {
        &self.html
    }
}

impl Parse for HtmlDocument {
    const NAME: &'static str = "html";

    fn parse(raw: &str, config: &BackendConfig) -> Result<Self> {
        let fragment = config
            .get("fragment")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let html = if fragment {
            Html::parse_fragment(raw)
        } else {
            Html::parse_document(raw)
        };
        Ok(Self { html })
    }
}

impl Backend for HtmlDocument {
    fn root(&self) -> Item<'_> {
        Item::Node(Rc::new(HtmlNode(self.html.root_element())))
    }
}

pub(crate) fn parse_selector(query: &str) -> Result<Selector> {
    Selector::parse(query).map_err(|e| Error::Query {
        query: query.to_string(),
        reason: format!("{e:?}"),
    })
}

/// Element of an [`HtmlDocument`].
#[derive(Debug, Clone, Copy)]
pub struct HtmlNode<'d>(pub ElementRef<'d>);

impl<'d> HtmlNode<'d> {
    fn wrap(el: ElementRef<'d>) -> Node<'d> {
        Rc::new(HtmlNode(el))
    }
}

impl<'d> Element<'d> for HtmlNode<'d> {
    fn css(&self, query: &str) -> Result<Vec<Node<'d>>> {
        let selector = parse_selector(query)?;
        Ok(self.0.select(&selector).map(HtmlNode::wrap).collect())
    }

    fn text(&self) -> String {
        self.0.text().collect::<String>().trim().to_string()
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.0.value().attr(name).map(String::from)
    }

    fn attrs(&self) -> IndexMap<String, Value> {
        self.0
            .value()
            .attrs()
            .map(|(name, value)| (name.to_string(), Value::from(value)))
            .collect()
    }

    fn outer_html(&self) -> String {
        self.0.html()
    }

    fn inner_html(&self) -> String {
        self.0.inner_html()
    }

    fn parent(&self) -> Option<Node<'d>> {
        let parent = self.0.parent()?;
        ElementRef::wrap(parent).map(HtmlNode::wrap)
    }

    fn children(&self) -> Vec<Node<'d>> {
        self.0
            .children()
            .filter_map(ElementRef::wrap)
            .map(HtmlNode::wrap)
            .collect()
    }
}
