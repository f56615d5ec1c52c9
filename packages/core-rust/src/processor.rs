//! Sequential batch processor.
//!
//! Runs operations strictly in submission order. Each operation sees the
//! ledger of every operation before it; none of them can stop the batch.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use crate::batch::Batch;
use crate::ledger::{ExecutionOutcome, ResultsLedger};
use crate::operation::{Headers, OperationSpec, ResolvedOperation};
use crate::resolver::Resolver;

// ---------------------------------------------------------------------------
// Dispatch seam
// ---------------------------------------------------------------------------

/// What a dispatcher returns for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Value,
}

impl DispatchResponse {
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body,
        }
    }
}

/// Executes a single resolved operation against the downstream application.
///
/// Returning `Err` (or panicking) is a dispatch failure; the processor turns
/// it into a 500 outcome for that operation only.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, op: &ResolvedOperation) -> anyhow::Result<DispatchResponse>;
}

#[async_trait]
impl<D: Dispatch + ?Sized> Dispatch for std::sync::Arc<D> {
    async fn dispatch(&self, op: &ResolvedOperation) -> anyhow::Result<DispatchResponse> {
        (**self).dispatch(op).await
    }
}

// ---------------------------------------------------------------------------
// SequentialProcessor
// ---------------------------------------------------------------------------

/// Drives a batch through resolution and dispatch, one operation at a time.
#[derive(Debug)]
pub struct SequentialProcessor<D> {
    dispatcher: D,
    resolver: Resolver,
}

impl<D: Dispatch> SequentialProcessor<D> {
    #[must_use]
    pub fn new(dispatcher: D) -> Self {
        Self {
            dispatcher,
            resolver: Resolver::new(),
        }
    }

    /// Runs a validated batch.
    pub async fn run_batch(&self, batch: &Batch) -> Vec<ExecutionOutcome> {
        self.run(batch.operations(), batch.resolve_dependencies())
            .await
    }

    /// Runs `specs` in order and returns one outcome per spec.
    ///
    /// `specs[i].index()` must equal `i`, as [`Batch`] guarantees; dependency
    /// positions and `data[i]` address the ledger by that index.
    ///
    /// When `resolve_dependencies` is false, placeholders are sent to the
    /// dispatcher verbatim and `depends_on` is ignored.
    pub async fn run(
        &self,
        specs: &[OperationSpec],
        resolve_dependencies: bool,
    ) -> Vec<ExecutionOutcome> {
        debug!(
            operations = specs.len(),
            resolve_dependencies, "running batch"
        );

        let mut ledger = ResultsLedger::with_capacity(specs.len());
        for (position, op) in specs.iter().enumerate() {
            debug_assert_eq!(op.index(), position, "operation out of position");
            let span = info_span!(
                "batch_operation",
                index = op.index(),
                method = %op.method(),
                status = tracing::field::Empty,
                duration_ms = tracing::field::Empty,
            );

            let outcome = async {
                let start = Instant::now();
                let outcome = self.execute(op, &ledger, resolve_dependencies).await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::Span::current().record("status", outcome.status);
                tracing::Span::current().record("duration_ms", duration_ms);
                outcome
            }
            .instrument(span)
            .await;

            ledger.push(outcome);
        }

        ledger.into_outcomes()
    }

    async fn execute(
        &self,
        op: &OperationSpec,
        ledger: &ResultsLedger,
        resolve_dependencies: bool,
    ) -> ExecutionOutcome {
        let resolved = if resolve_dependencies && op.has_dependencies() {
            match self.resolver.resolve(op, ledger) {
                Ok(resolved) => resolved,
                Err(err) => {
                    debug!(error = %err, "operation short-circuited");
                    return ExecutionOutcome::unprocessable(err.public_message());
                }
            }
        } else {
            ResolvedOperation::from(op)
        };

        self.dispatch(&resolved).await
    }

    async fn dispatch(&self, resolved: &ResolvedOperation) -> ExecutionOutcome {
        match AssertUnwindSafe(self.dispatcher.dispatch(resolved))
            .catch_unwind()
            .await
        {
            Ok(Ok(response)) => {
                ExecutionOutcome::from_response(response.status, response.headers, response.body)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "dispatch failed");
                ExecutionOutcome::server_error(&err.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(panic = %message, "dispatch panicked");
                ExecutionOutcome::server_error(&message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "dispatcher panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
