//! Markup pre-validation
//!
//! Validators run on the raw input before any field resolves. The first one
//! that fails aborts materialization with [`Error::PreValidation`].

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::backends::parse_selector;
use crate::error::{Error, Result};

#[derive(Clone)]
pub enum PreValidator {
    /// The regex must match somewhere in the input.
    Pattern(Regex),
    /// The css query must select at least one element.
    Css { query: String, selector: Selector },
    Custom {
        label: String,
        check: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    },
}

impl PreValidator {
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(PreValidator::Pattern)
            .map_err(|e| Error::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn css(query: &str) -> Result<Self> {
        Ok(PreValidator::Css {
            query: query.to_string(),
            selector: parse_selector(query)?,
        })
    }

    pub fn custom<F>(label: &str, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        PreValidator::Custom {
            label: label.to_string(),
            check: Arc::new(check),
        }
    }

    fn passes(&self, raw: &str) -> bool {
        match self {
            PreValidator::Pattern(regex) => regex.is_match(raw),
            PreValidator::Css { selector, .. } => {
                Html::parse_document(raw).select(selector).next().is_some()
            }
            PreValidator::Custom { check, .. } => check(raw),
        }
    }

    pub(crate) fn check(&self, schema: &str, raw: &str) -> Result<()> {
        if self.passes(raw) {
            debug!("`{}`: pre-validation {} passed", schema, self);
            return Ok(());
        }
        Err(Error::PreValidation {
            schema: schema.to_string(),
            reason: format!("{self} did not match"),
        })
    }
}

impl fmt::Display for PreValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreValidator::Pattern(regex) => write!(f, "re `{}`", regex.as_str()),
            PreValidator::Css { query, .. } => write!(f, "css `{query}`"),
            PreValidator::Custom { label, .. } => write!(f, "`{label}`"),
        }
    }
}

impl fmt::Debug for PreValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PreValidator({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_validator() {
        let validator = PreValidator::pattern(r"\d{3}").unwrap();
        assert!(validator.check("Test", "code 123").is_ok());

        let err = validator.check("Test", "no digits").unwrap_err();
        assert_eq!(
            err.to_string(),
            r"`Test` pre-validation failed: re `\d{3}` did not match"
        );
    }

    #[test]
    fn test_css_validator() {
        let validator = PreValidator::css("div.product").unwrap();
        assert!(validator.check("Test", r#"<div class="product"></div>"#).is_ok());
        assert!(validator.check("Test", "<p>nothing</p>").is_err());
        assert!(PreValidator::css("div[").is_err());
    }

    #[test]
    fn test_custom_validator() {
        let validator = PreValidator::custom("not empty", |raw| !raw.trim().is_empty());
        assert!(validator.check("Test", "x").is_ok());
        assert!(matches!(
            validator.check("Test", "  "),
            Err(Error::PreValidation { .. })
        ));
    }
}
