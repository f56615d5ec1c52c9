//! Operation model: one sub-request of a batch.
//!
//! [`RawOperation`] is the wire descriptor as submitted by the caller.
//! [`OperationSpec`] is the validated, immutable form produced by
//! [`OperationSpec::from_raw`]. [`ResolvedOperation`] is what actually reaches
//! the dispatcher once placeholders have been rendered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Method used when a descriptor omits `method`.
pub const DEFAULT_METHOD: &str = "get";

/// Header map carried by operations and outcomes.
///
/// Uses `BTreeMap` so serialized headers (and therefore rendered header
/// templates) have a deterministic order.
pub type Headers = BTreeMap<String, String>;

/// Wire descriptor for a single operation, before validation.
///
/// Every field is optional at this level; `null` is treated the same as an
/// absent field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOperation {
    pub method: Option<String>,
    pub url: Option<String>,
    pub params: Option<Map<String, Value>>,
    pub headers: Option<Headers>,
    pub depends_on: Option<Vec<i64>>,
}

/// Construction-time validation failure for a single operation.
///
/// Surfaced as a batch-level error: one malformed operation aborts the whole
/// batch before anything executes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedOperation {
    #[error("operation {index}: method and url are required (received method {method:?}, url {url:?})")]
    MissingField {
        index: usize,
        method: Option<String>,
        url: Option<String>,
    },
    #[error("operation {index}: method {method:?} is not a valid request verb")]
    InvalidMethod { index: usize, method: String },
    #[error("operation {index}: depends_on must only reference previous operations (got {dependency})")]
    ForwardDependency { index: usize, dependency: i64 },
    #[error("operation {index}: {reason}")]
    Undecodable { index: usize, reason: String },
    #[error("operation {index} was submitted at position {position}")]
    OutOfOrder { index: usize, position: usize },
}

/// Validated, immutable description of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    index: usize,
    method: String,
    url: String,
    params: Map<String, Value>,
    headers: Headers,
    depends_on: Vec<usize>,
}

impl OperationSpec {
    /// Validates a raw descriptor found at position `index` of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedOperation`] when `method` or `url` is missing or
    /// empty, when `method` is not a plain verb, or when any `depends_on`
    /// entry is not strictly less than `index`.
    pub fn from_raw(index: usize, raw: RawOperation) -> Result<Self, MalformedOperation> {
        let method = raw.method.unwrap_or_else(|| DEFAULT_METHOD.to_string());
        let url = match raw.url {
            Some(url) if !url.is_empty() && !method.is_empty() => url,
            url => {
                return Err(MalformedOperation::MissingField {
                    index,
                    method: Some(method),
                    url,
                })
            }
        };

        if !method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(MalformedOperation::InvalidMethod { index, method });
        }

        let mut depends_on = Vec::new();
        for dependency in raw.depends_on.unwrap_or_default() {
            let position = usize::try_from(dependency)
                .ok()
                .filter(|d| *d < index)
                .ok_or(MalformedOperation::ForwardDependency { index, dependency })?;
            if !depends_on.contains(&position) {
                depends_on.push(position);
            }
        }

        Ok(Self {
            index,
            method,
            url,
            params: raw.params.unwrap_or_default(),
            headers: raw.headers.unwrap_or_default(),
            depends_on,
        })
    }

    /// Decodes and validates an arbitrary JSON value as the operation at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedOperation::Undecodable`] when the value does not
    /// have the descriptor shape, or any error from [`Self::from_raw`].
    pub fn from_value(index: usize, value: Value) -> Result<Self, MalformedOperation> {
        let raw: RawOperation =
            serde_json::from_value(value).map_err(|e| MalformedOperation::Undecodable {
                index,
                reason: e.to_string(),
            })?;
        Self::from_raw(index, raw)
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Indices of earlier operations this one depends on, in declaration order.
    #[must_use]
    pub fn depends_on(&self) -> &[usize] {
        &self.depends_on
    }

    #[must_use]
    pub fn has_dependencies(&self) -> bool {
        !self.depends_on.is_empty()
    }
}

/// An operation whose `url`, `params` and `headers` are concrete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOperation {
    pub index: usize,
    pub method: String,
    pub url: String,
    pub params: Map<String, Value>,
    pub headers: Headers,
}

impl From<&OperationSpec> for ResolvedOperation {
    fn from(spec: &OperationSpec) -> Self {
        Self {
            index: spec.index,
            method: spec.method.clone(),
            url: spec.url.clone(),
            params: spec.params.clone(),
            headers: spec.headers.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
