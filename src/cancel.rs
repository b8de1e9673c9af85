//! Cooperative cancellation
//!
//! Long-running stages (calibration in particular) poll a shared token
//! between units of work and bail out with [`ConvertError::Cancelled`]
//! when it has been tripped. Cancellation never interrupts a unit of work
//! mid-flight.
//!
//! [`ConvertError::Cancelled`]: crate::error::ConvertError::Cancelled

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ConvertError, ConvertResult};

/// Cloneable cancellation flag shared between a driver and a worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an untripped token
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token; every clone observes it
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once the token has been tripped
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Error out if the token has been tripped
    pub fn check(&self) -> ConvertResult<()> {
        if self.is_cancelled() {
            Err(ConvertError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(ConvertError::Cancelled)));
    }
}
