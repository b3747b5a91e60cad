use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::PassError;

/// Cooperative cancellation flag shared between a host and a running pass.
///
/// The driver checks it before every node and before every output item; a
/// cancelled pass commits nothing.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> Result<(), PassError> {
        if self.is_cancelled() {
            Err(PassError::Cancelled)
        } else {
            Ok(())
        }
    }
}
