use tokio_util::sync::CancellationToken;

/// Abortable handle for the requests issued on behalf of one view.
///
/// Dropping the scope cancels whatever is still in flight, so a response that
/// arrives after the view went away is discarded instead of applied.
#[derive(Debug, Default)]
pub struct RequestScope {
    token: CancellationToken,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A nested scope that is cancelled with this one.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
