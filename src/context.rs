//! Scan cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, ScanError};

/// Cancellation handle shared by the engine and every plugin of a scan.
///
/// Clones share the same flag, so a caller can keep one clone and cancel a
/// scan that runs on another task.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ScanContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Request cancellation of the scan.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if the scan has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns an error if the scan was cancelled or its deadline passed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ScanError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared() {
        let ctx = ScanContext::new();
        let other = ctx.clone();
        assert!(ctx.check().is_ok());

        other.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(ScanError::Cancelled)));
    }

    #[test]
    fn test_deadline() {
        let ctx = ScanContext::with_timeout(Duration::from_secs(0));
        assert!(matches!(ctx.check(), Err(ScanError::DeadlineExceeded)));

        let ctx = ScanContext::with_timeout(Duration::from_secs(3600));
        assert!(ctx.check().is_ok());
    }
}
