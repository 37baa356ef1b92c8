//! Cancellation token for blocking calls
//!
//! Blocking read/write calls poll their token between timed waits and
//! fail with `Interrupted` once it fires. This is the portable stand-in
//! for signal interruption of a sleeping caller. Tokens can be linked
//! to form parent-child relationships.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{FlowError, FlowResult};

/// Token for checking and triggering cancellation
///
/// Cloning shares the underlying flag. A token created with
/// [`CancellationToken::dummy`] never fires and never allocates.
#[derive(Clone)]
pub struct CancellationToken {
    inner: CancellationInner,
}

#[derive(Clone)]
enum CancellationInner {
    Owned(Arc<OwnedCancellation>),
    /// Never cancels
    Dummy,
}

struct OwnedCancellation {
    cancelled: AtomicBool,
    parent: Option<CancellationToken>,
}

impl CancellationToken {
    /// Create a new independent cancellation token
    pub fn new() -> Self {
        Self {
            inner: CancellationInner::Owned(Arc::new(OwnedCancellation {
                cancelled: AtomicBool::new(false),
                parent: None,
            })),
        }
    }

    /// Create a token that never cancels
    pub fn dummy() -> Self {
        Self {
            inner: CancellationInner::Dummy,
        }
    }

    /// Create a child token linked to this one
    ///
    /// Cancelling the parent also cancels the child, not vice versa.
    pub fn child(&self) -> Self {
        Self {
            inner: CancellationInner::Owned(Arc::new(OwnedCancellation {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            })),
        }
    }

    /// Check if cancellation was requested, here or in a parent
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            CancellationInner::Owned(arc) => {
                if arc.cancelled.load(Ordering::Acquire) {
                    return true;
                }
                if let Some(ref parent) = arc.parent {
                    return parent.is_cancelled();
                }
                false
            }
            CancellationInner::Dummy => false,
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        match &self.inner {
            CancellationInner::Owned(arc) => {
                arc.cancelled.store(true, Ordering::Release);
            }
            CancellationInner::Dummy => {}
        }
    }

    /// Return `Err(Interrupted)` if cancelled
    #[inline]
    pub fn check(&self) -> FlowResult<()> {
        if self.is_cancelled() {
            Err(FlowError::Interrupted)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
