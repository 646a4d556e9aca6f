//! Handle to the proactive refresh task.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running proactive refresh loop.
#[derive(Debug)]
pub(crate) struct ScheduledRefresh {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledRefresh {
    pub(crate) fn new(cancel: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { cancel, handle }
    }

    /// Whether the loop is still running and not cancelled.
    pub(crate) fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }

    /// Ask the loop to stop. The loop observes this at its next await.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}
