// Planner: decomposes a base query into one sub-query per theme

use crate::error::ConfigError;
use crate::models::SubQuery;
use std::fmt;
use std::sync::Arc;

pub const QUERY_PLACEHOLDER: &str = "{query}";

pub type TemplateFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A named lens applied to the base query.
#[derive(Clone)]
pub struct Theme {
    name: String,
    template: TemplateFn,
}

impl fmt::Debug for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Theme").field("name", &self.name).finish()
    }
}

impl Theme {
    /// Theme backed by an arbitrary rewrite. The function must be deterministic.
    pub fn new<F>(name: impl Into<String>, template: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            template: Arc::new(template),
        }
    }

    /// Theme whose rewrite substitutes the query into `pattern` at every `{query}`.
    pub fn from_pattern(name: impl Into<String>, pattern: &str) -> Result<Self, ConfigError> {
        let name = name.into();
        if !pattern.contains(QUERY_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder(name));
        }
        let pattern = pattern.to_string();
        Ok(Self::new(name, move |query| {
            pattern.replace(QUERY_PLACEHOLDER, query)
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, query: &str) -> String {
        (self.template)(query)
    }
}

/// Crisis / Exposure / Opportunity, used when no themes are configured.
pub fn default_themes() -> Vec<Theme> {
    vec![
        Theme::new("Crisis", |q| {
            format!("crisis, incident or disruption involving {q}")
        }),
        Theme::new("Exposure", |q| {
            format!("risk exposure and vulnerabilities related to {q}")
        }),
        Theme::new("Opportunity", |q| {
            format!("opportunities and positive outcomes arising from {q}")
        }),
    ]
}

/// Render one sub-query per theme, in theme order.
pub fn plan(query: &str, themes: &[Theme]) -> Vec<SubQuery> {
    themes
        .iter()
        .map(|theme| SubQuery {
            theme: theme.name().to_string(),
            text: theme.render(query),
        })
        .collect()
}
