use batchwire_core::DEFAULT_MAX_OPERATIONS;

/// Batch endpoint configuration.
///
/// Controls where the endpoint is mounted, how large a batch may be, and the
/// limits applied while its operations are dispatched.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Path the batch endpoint is mounted at.
    pub endpoint: String,
    /// Maximum number of operations accepted in one batch.
    pub max_operations: usize,
    /// Timeout for a single dispatched operation in milliseconds.
    pub operation_timeout_ms: u64,
    /// Maximum number of batches processed concurrently before load shedding.
    pub max_concurrent_batches: u32,
    /// Largest sub-response body the dispatcher will buffer, in bytes.
    pub max_response_body_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            endpoint: "/batch".to_string(),
            max_operations: DEFAULT_MAX_OPERATIONS,
            operation_timeout_ms: 30_000,
            max_concurrent_batches: 1000,
            max_response_body_bytes: 16 * 1024 * 1024,
        }
    }
}
