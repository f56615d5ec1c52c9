//! Results ledger: the ordered record of completed operation outcomes.

use serde::Serialize;
use serde_json::{json, Value};

use crate::operation::Headers;

/// Inclusive range of status codes classified as success.
pub const SUCCESS_CODES: std::ops::RangeInclusive<u16> = 200..=299;

/// Status used for operations short-circuited during resolution.
pub const UNPROCESSABLE_STATUS: u16 = 422;

/// Status used when the dispatcher itself fails.
pub const SERVER_ERROR_STATUS: u16 = 500;

/// Classified result of one processed operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub status: u16,
    pub headers: Headers,
    pub body: Value,
    #[serde(skip)]
    pub failed: bool,
}

impl ExecutionOutcome {
    /// Builds an outcome from a dispatcher response, classifying it by status.
    #[must_use]
    pub fn from_response(status: u16, headers: Headers, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
            failed: !SUCCESS_CODES.contains(&status),
        }
    }

    /// Outcome for an operation whose dependencies could not be resolved.
    #[must_use]
    pub fn unprocessable(message: &str) -> Self {
        Self {
            status: UNPROCESSABLE_STATUS,
            headers: Headers::new(),
            body: json!({ "error": message }),
            failed: true,
        }
    }

    /// Outcome for an operation whose dispatcher raised instead of responding.
    #[must_use]
    pub fn server_error(message: &str) -> Self {
        Self {
            status: SERVER_ERROR_STATUS,
            headers: Headers::new(),
            body: json!({ "error": { "message": message } }),
            failed: true,
        }
    }

    /// Value exposed to placeholder templates for this outcome.
    ///
    /// Failed outcomes are masked as `{"errors": true}` so templates never see
    /// an error payload as if it were data.
    #[must_use]
    pub fn template_value(&self) -> Value {
        if self.failed {
            json!({ "errors": true })
        } else {
            self.body.clone()
        }
    }
}

/// Append-only, index-aligned sequence of outcomes for one batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsLedger {
    outcomes: Vec<ExecutionOutcome>,
}

impl ResultsLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(capacity),
        }
    }

    /// Appends the outcome of the next operation and returns its index.
    pub fn push(&mut self, outcome: ExecutionOutcome) -> usize {
        self.outcomes.push(outcome);
        self.outcomes.len() - 1
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ExecutionOutcome> {
        self.outcomes.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionOutcome> {
        self.outcomes.iter()
    }

    /// Template context: `{"data": [outcome 0, outcome 1, ...]}`.
    #[must_use]
    pub fn template_context(&self) -> Value {
        let data: Vec<Value> = self
            .outcomes
            .iter()
            .map(ExecutionOutcome::template_value)
            .collect();
        json!({ "data": data })
    }

    #[must_use]
    pub fn into_outcomes(self) -> Vec<ExecutionOutcome> {
        self.outcomes
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
