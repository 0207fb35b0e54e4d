//! OS signal hooks for cancellation.
//!
//! Signal delivery uses the flag-registration pattern: the handler only
//! sets an `AtomicBool`, and the scheduler polls armed flags at the start
//! of each tick, cancelling the paired token outside signal context. On
//! targets without signal support the watch request is silently declined
//! and the paired source simply never signal-cancels.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::cancel::CancelToken;

/// One armed signal watch, polled by the scheduler each tick.
pub(crate) struct SignalWatch {
    pub(crate) sig: i32,
    pub(crate) flag: Arc<AtomicBool>,
    pub(crate) token: CancelToken,
    #[cfg(unix)]
    pub(crate) hook: signal_hook::SigId,
}

impl SignalWatch {
    /// Removes the OS-level handler backing this watch.
    pub(crate) fn unhook(&self) {
        #[cfg(unix)]
        signal_hook::low_level::unregister(self.hook);
    }
}

/// Returns true if this build can hook OS signals.
#[must_use]
pub(crate) const fn supported() -> bool {
    cfg!(unix)
}

/// Arms a watch that cancels `token` when the OS delivers `sig`.
///
/// Returns false (leaving the token untouched) when signal support is
/// unavailable or the signal cannot be hooked (e.g. SIGKILL).
#[cfg(unix)]
pub(crate) fn watch(sig: i32, token: CancelToken) -> bool {
    let flag = Arc::new(AtomicBool::new(false));
    match signal_hook::flag::register(sig, Arc::clone(&flag)) {
        Ok(hook) => {
            super::scheduler::Scheduler::global().add_signal_watch(SignalWatch {
                sig,
                flag,
                token,
                hook,
            });
            true
        }
        Err(_) => false,
    }
}

/// Arms a watch that cancels `token` when the OS delivers `sig`.
///
/// Returns false (leaving the token untouched) when signal support is
/// unavailable or the signal cannot be hooked (e.g. SIGKILL).
#[cfg(not(unix))]
pub(crate) fn watch(sig: i32, token: CancelToken) -> bool {
    let _ = (sig, token);
    false
}
