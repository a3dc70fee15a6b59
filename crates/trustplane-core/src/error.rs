use thiserror::Error;

pub type TrustPlaneResult<T> = Result<T, TrustPlaneError>;

/// Error taxonomy shared by the core and the coordinator daemon.
///
/// Variants map one-to-one onto the categories callers branch on:
/// integrity failures are fatal to the operation, `CasConflict` is
/// retryable with a fresh read, authorization failures are terminal, and
/// the precondition variants (`NoManifest`, `NeedsRecovery`) are sentinel
/// conditions for bootstrap-vs-recover branching.
#[derive(Debug, Error)]
pub enum TrustPlaneError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Content-addressed read-back produced different bytes than the
    /// requested address. Indicates backend tampering or corruption.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// The latest-transition signature did not verify.
    #[error("invalid signature on latest transition")]
    InvalidSignature,

    /// Compare-and-swap lost against a concurrent writer. The caller must
    /// re-fetch the current head and retry; nothing retries internally.
    #[error("concurrent update: latest transition changed")]
    CasConflict,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No manifest has ever been set in this history.
    #[error("no manifest set")]
    NoManifest,

    /// The cached state is stale; the instance must run the recovery
    /// protocol before serving further requests.
    #[error("coordinator requires recovery")]
    NeedsRecovery,

    #[error("internal error: {0}")]
    Internal(String),
}

impl TrustPlaneError {
    /// Transient errors a caller may retry with backoff. Integrity,
    /// authorization, and precondition failures are excluded because
    /// retrying them cannot help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CasConflict | Self::Internal(_))
    }
}
