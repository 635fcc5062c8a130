//! Context-construction error variants.

/// Failure to construct a [`HashWx`](crate::HashWx) context.
///
/// `exec` itself has no recoverable errors, and page-protection failures
/// during `make` are treated as fatal host misconfiguration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The compiled mode was requested, but the build target has no native
    /// backend. Callers fall back to the interpreted mode.
    #[error("compiled mode is not supported on this target")]
    NotSupported,
    /// Reserving the executable page failed.
    #[error("failed to reserve executable memory")]
    Allocation(#[source] std::io::Error),
}
