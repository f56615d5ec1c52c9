//! Dependency resolution: renders an operation's placeholders against the
//! outcomes of the operations it depends on.

use crate::ledger::ResultsLedger;
use crate::operation::{Headers, OperationSpec, ResolvedOperation};
use crate::template::{PlaceholderError, TemplateRenderer};

/// Message reported when a dependency's outcome was itself a failure.
pub const DEPENDENCY_FAILURE_MESSAGE: &str = "one of the dependent requests failed";

/// Message reported when placeholders could not be rendered.
pub const PLACEHOLDER_ERROR_MESSAGE: &str = "please check your placeholders";

/// Why an operation could not be resolved.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("operation {index} depends on failed operation {dependency}")]
    DependencyFailure { index: usize, dependency: usize },
    #[error("operation {index}: {source}")]
    Placeholder {
        index: usize,
        #[source]
        source: PlaceholderError,
    },
}

impl ResolutionError {
    /// Fixed, caller-facing message for this kind of failure.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::DependencyFailure { .. } => DEPENDENCY_FAILURE_MESSAGE,
            Self::Placeholder { .. } => PLACEHOLDER_ERROR_MESSAGE,
        }
    }
}

/// Resolves operations against a results ledger.
#[derive(Debug, Default)]
pub struct Resolver {
    renderer: TemplateRenderer,
}

impl Resolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces the concrete form of `op`.
    ///
    /// Every index in `op.depends_on()` is expected to already have an entry
    /// in `ledger`; a missing entry is treated as a failed dependency. Neither
    /// `op` nor `ledger` is modified.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::DependencyFailure`] before rendering
    /// anything if a dependency failed, and [`ResolutionError::Placeholder`]
    /// if the url, params or headers cannot be rendered.
    pub fn resolve(
        &self,
        op: &OperationSpec,
        ledger: &ResultsLedger,
    ) -> Result<ResolvedOperation, ResolutionError> {
        let index = op.index();

        if let Some(&dependency) = op
            .depends_on()
            .iter()
            .find(|&&d| ledger.get(d).map_or(true, |outcome| outcome.failed))
        {
            return Err(ResolutionError::DependencyFailure { index, dependency });
        }

        let ctx = ledger.template_context();
        let placeholder = |source| ResolutionError::Placeholder { index, source };

        let url = self.renderer.render_str(op.url(), &ctx).map_err(placeholder)?;
        let params = self
            .renderer
            .render_json(op.params(), &ctx)
            .map_err(placeholder)?;
        let headers: Headers = self
            .renderer
            .render_json(op.headers(), &ctx)
            .map_err(placeholder)?;

        Ok(ResolvedOperation {
            index,
            method: op.method().to_string(),
            url,
            params,
            headers,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
