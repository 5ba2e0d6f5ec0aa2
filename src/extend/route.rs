//! Route rules for resources, middleware, and freeform handlers.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Invalid route pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A (method, path-pattern) predicate over inbound requests.
///
/// The pattern is a regular expression, anchored with `^`/`$` when the
/// caller did not anchor it. `""` and `"*"` match any path; method `"*"`
/// or `""` matches any method, otherwise comparison is exact and
/// case-sensitive. The compiled regex is built once at construction and
/// cached for the rule's lifetime; a malformed pattern fails registration
/// instead of silently matching nothing at runtime.
#[derive(Debug, Clone)]
pub struct RouteRule {
    method: String,
    pattern: String,
    regex: Option<Regex>,
}

impl RouteRule {
    pub fn new(method: impl Into<String>, pattern: impl Into<String>) -> Result<Self, RouteError> {
        let method = method.into();
        let pattern = pattern.into();

        let regex = if pattern.is_empty() || pattern == "*" {
            None
        } else {
            let anchored = Self::anchor(&pattern);
            let compiled = Regex::new(&anchored).map_err(|source| RouteError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            Some(compiled)
        };

        Ok(Self {
            method,
            pattern,
            regex,
        })
    }

    /// A rule matching every method and every path
    pub fn any() -> Self {
        Self {
            method: "*".to_string(),
            pattern: "*".to_string(),
            regex: None,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, method: &str, path: &str) -> bool {
        let matches_method = self.method == "*" || self.method.is_empty() || self.method == method;
        let matches_path = match &self.regex {
            None => true,
            Some(re) => re.is_match(path),
        };
        matches_method && matches_path
    }

    fn anchor(pattern: &str) -> String {
        let starts_with_caret = pattern.starts_with('^');
        let ends_with_dollar = pattern.ends_with('$');
        if starts_with_caret && ends_with_dollar {
            pattern.to_string()
        } else {
            format!(
                "{}{}{}",
                if starts_with_caret { "" } else { "^" },
                pattern,
                if ends_with_dollar { "" } else { "$" }
            )
        }
    }
}
