use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scope hints narrowing a search, e.g. `region = "emea"`.
///
/// Passed through to the vector index as an exact-match metadata filter.
pub type ScopeHints = BTreeMap<String, String>;

/// One retrieval request as handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub caller: Option<String>,
    #[serde(default)]
    pub scope: Option<ScopeHints>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            caller: None,
            scope: None,
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn with_scope(mut self, scope: ScopeHints) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// A theme's rewrite of the base query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuery {
    pub theme: String,
    pub text: String,
}

/// Dense embedding returned by an embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Scalar metadata value attached to a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl MetadataValue {
    /// Text form used when matching scope hints.
    pub fn as_filter_text(&self) -> String {
        match self {
            MetadataValue::Bool(b) => b.to_string(),
            MetadataValue::Integer(i) => i.to_string(),
            MetadataValue::Float(f) => f.to_string(),
            MetadataValue::Text(s) => s.clone(),
        }
    }
}

/// One record retrieved from the vector index.
///
/// `score` is higher-is-better and only meaningful as an ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Hit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one theme's retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ThemeStatus {
    Ok,
    Failed { reason: String },
    Skipped { reason: String },
    Aborted { reason: String },
}

impl ThemeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ThemeStatus::Ok => "ok",
            ThemeStatus::Failed { .. } => "failed",
            ThemeStatus::Skipped { .. } => "skipped",
            ThemeStatus::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeResult {
    pub theme: String,
    pub sub_query: String,
    pub hits: Vec<Hit>,
    pub status: ThemeStatus,
}

impl CascadeResult {
    pub fn is_ok(&self) -> bool {
        self.status == ThemeStatus::Ok
    }

    /// Reason this slot carries no usable hits, if it did not succeed.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ThemeStatus::Ok => None,
            ThemeStatus::Failed { reason }
            | ThemeStatus::Skipped { reason }
            | ThemeStatus::Aborted { reason } => Some(reason),
        }
    }
}

/// Full answer to a cascade, one entry per configured theme in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeResponse {
    pub results: Vec<CascadeResult>,
}

impl CascadeResponse {
    pub fn theme(&self, name: &str) -> Option<&CascadeResult> {
        self.results.iter().find(|r| r.theme == name)
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| !r.is_ok())
    }

    pub fn theme_names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.theme.as_str()).collect()
    }
}

// API Request models
#[derive(Debug, Deserialize)]
pub struct CascadeRequest {
    pub query: String,
    #[serde(default)]
    pub caller: Option<String>,
    #[serde(default)]
    pub scope: Option<ScopeHints>,
}

impl From<CascadeRequest> for Query {
    fn from(request: CascadeRequest) -> Self {
        Query {
            text: request.query,
            caller: request.caller,
            scope: request.scope,
        }
    }
}
