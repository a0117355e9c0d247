use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Per-request context handed to every provider call.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Credential scope, usually the tab id ("global", "metals", ...)
    pub scope: Arc<str>,

    /// Cancelling the token aborts the in-flight HTTP call
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(scope: impl Into<Arc<str>>) -> Self {
        Self {
            scope: scope.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
