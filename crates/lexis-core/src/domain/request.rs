use serde::{Deserialize, Serialize};

use crate::{Operation, ParamValue, Params};

/// A single analysis call. Created per request and discarded afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub operation: Operation,
    pub text: String,
    /// Explicit backend; the configured default for the operation is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
    /// Opaque caller identity used for rate limiting and audit only.
    pub principal: String,
}

impl AnalysisRequest {
    pub fn new(operation: Operation, text: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            operation,
            text: text.into(),
            backend: None,
            params: Params::new(),
            principal: principal.into(),
        }
    }

    pub fn sentiment(text: impl Into<String>, principal: impl Into<String>) -> Self {
        Self::new(Operation::Sentiment, text, principal)
    }

    pub fn summary(text: impl Into<String>, principal: impl Into<String>) -> Self {
        Self::new(Operation::Summary, text, principal)
    }

    pub fn keywords(text: impl Into<String>, principal: impl Into<String>) -> Self {
        Self::new(Operation::Keywords, text, principal)
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}
