//! Batchwire core: operation model, placeholder resolver, and sequential batch processor.

pub mod batch;
pub mod ledger;
pub mod operation;
pub mod processor;
pub mod resolver;
pub mod template;

pub use batch::{Batch, BatchError, BatchRequest, DEFAULT_MAX_OPERATIONS};
pub use ledger::{ExecutionOutcome, ResultsLedger, SUCCESS_CODES};
pub use operation::{Headers, MalformedOperation, OperationSpec, RawOperation, ResolvedOperation};
pub use processor::{Dispatch, DispatchResponse, SequentialProcessor};
pub use resolver::{ResolutionError, Resolver};
pub use template::{PlaceholderError, TemplateRenderer};
