//! Outer batch payload: decoding and validation of the operation list.

use serde::Deserialize;
use serde_json::Value;

use crate::operation::{MalformedOperation, OperationSpec};

/// Default cap on the number of operations in one batch.
pub const DEFAULT_MAX_OPERATIONS: usize = 50;

/// Batch payload as submitted by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    /// Raw operation descriptors, decoded one by one so errors can name the
    /// offending position.
    pub ops: Option<Vec<Value>>,
    /// Opt-in switch for placeholder substitution between operations.
    #[serde(default)]
    pub resolve_dependencies: bool,
}

/// Batch-level failure. Any of these aborts the batch before execution.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("invalid batch payload: {0}")]
    InvalidPayload(String),
    #[error("an operations array is required")]
    MissingOperations,
    #[error("only {limit} operations can be submitted at once, {count} were provided")]
    OperationLimitExceeded { limit: usize, count: usize },
    #[error(transparent)]
    MalformedOperation(#[from] MalformedOperation),
}

/// Validated batch ready for the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    operations: Vec<OperationSpec>,
    resolve_dependencies: bool,
}

impl Batch {
    /// Builds a batch from already-validated operations.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::MalformedOperation`] if the specs are not in
    /// index order starting at zero, since dependency indices would no
    /// longer point at the right ledger slots.
    pub fn new(
        operations: Vec<OperationSpec>,
        resolve_dependencies: bool,
    ) -> Result<Self, BatchError> {
        if let Some((position, op)) = operations
            .iter()
            .enumerate()
            .find(|(position, op)| op.index() != *position)
        {
            return Err(MalformedOperation::OutOfOrder {
                index: op.index(),
                position,
            }
            .into());
        }
        Ok(Self {
            operations,
            resolve_dependencies,
        })
    }

    /// Decodes a JSON payload and validates every operation in it.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchError`] if the payload is not valid JSON of the batch
    /// shape, has no `ops` array, exceeds `max_operations`, or contains a
    /// malformed operation.
    pub fn from_slice(payload: &[u8], max_operations: usize) -> Result<Self, BatchError> {
        let request: BatchRequest = serde_json::from_slice(payload)
            .map_err(|e| BatchError::InvalidPayload(e.to_string()))?;
        Self::from_request(request, max_operations)
    }

    /// Validates a decoded request.
    ///
    /// # Errors
    ///
    /// See [`Self::from_slice`].
    pub fn from_request(request: BatchRequest, max_operations: usize) -> Result<Self, BatchError> {
        let ops = request.ops.ok_or(BatchError::MissingOperations)?;
        if ops.len() > max_operations {
            return Err(BatchError::OperationLimitExceeded {
                limit: max_operations,
                count: ops.len(),
            });
        }

        let operations = ops
            .into_iter()
            .enumerate()
            .map(|(index, value)| OperationSpec::from_value(index, value))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            operations,
            resolve_dependencies: request.resolve_dependencies,
        })
    }

    #[must_use]
    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    #[must_use]
    pub fn resolve_dependencies(&self) -> bool {
        self.resolve_dependencies
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
