//! Stop switch for the notification phase of a run

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared flag checked by the delivery driver before each recipient.
///
/// Tripping it leaves the index untouched; recipients not yet reached are
/// reported as cancelled and messages already handed to the transport stay sent.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    stopped: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop handing out further deliveries. Returns `false` if the run was
    /// already stopped.
    pub fn cancel(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        if first {
            info!("Notification run cancelled, remaining recipients will be skipped");
        }
        first
    }
}
