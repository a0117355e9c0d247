/// Classification of provider failures.
///
/// Used by the caching layer to decide how a failed fetch is handled.
///
/// # Behavior Summary
///
/// | Kind | Try fallback? | Surfaced to caller? |
/// |------|---------------|---------------------|
/// | `Transient` | Yes | No, stale cache keeps serving |
/// | `InvalidData` | Yes | No |
/// | `AccessRestricted` | Yes (other provider) | No, feature degrades for that data |
/// | `Configuration` | No | Yes, fails fast |
/// | `Cancelled` | No | No |
/// | `Unsupported` | Yes (other provider) | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Network error, timeout, 5xx or rate limiting.
    /// Retried on the next natural refresh cycle.
    Transient,

    /// Placeholder quote, unknown symbol, malformed parameters or empty data.
    /// Treated like a transient failure, but triggers the fallback symbol.
    InvalidData,

    /// 401/403 or plan-limited endpoint.
    AccessRestricted,

    /// Missing credential for a key scope. A setup defect, not a runtime condition.
    Configuration,

    /// The caller cancelled the request.
    Cancelled,

    /// The provider does not implement the operation.
    Unsupported,
}

impl ErrorKind {
    /// Whether the error must propagate instead of being absorbed.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Configuration)
    }

    /// Whether trying the next candidate (fallback symbol or provider) makes sense.
    pub fn allows_fallback(self) -> bool {
        !matches!(self, Self::Configuration | Self::Cancelled)
    }
}
