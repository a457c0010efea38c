// ============================================================
// Layer 5 — ML Errors
// ============================================================
// Typed failures of the loss and trainer. The application layer
// turns them into anyhow errors with `?`.

/// Errors raised by the DPO loss and trainer.
///
/// Tensor-level failures (bad indices inside a gather, mismatched
/// broadcasts) still surface as Burn panics; these variants cover what
/// can be checked before a kernel ever runs.
#[derive(Debug, thiserror::Error)]
pub enum DpoError {
    /// Invalid hyperparameters.
    #[error("configuration error: {0}")]
    Config(String),
    /// Batch tensors that cannot be combined.
    #[error("shape mismatch: {0}")]
    Shape(String),
    /// Reading tensor values back to the host failed.
    #[error("tensor data error: {0}")]
    Data(String),
}

/// Result type for DPO operations.
pub type DpoResult<T> = std::result::Result<T, DpoError>;
