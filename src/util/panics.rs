//! Panic isolation for producers and plugins.
//!
//! Panics caught by [`isolate`] are expected and end up as stubs or failed
//! plugins, so the hook sends them to the log instead of stderr. Panics
//! anywhere else still reach the original hook.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

thread_local! {
    static ISOLATION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        ISOLATION_DEPTH.with(|d| d.set(d.get() + 1));
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        ISOLATION_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Whether the current thread is inside [`isolate`].
pub fn is_isolated() -> bool {
    ISOLATION_DEPTH.with(|d| d.get() > 0)
}

/// Run `f`, turning a panic into `Err(message)`.
pub fn isolate<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    let _guard = DepthGuard::enter();
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

/// Install a hook that logs isolated panics at debug level and forwards
/// all others to the previously installed hook.
///
/// Call once from `main` after logging is set up.
pub fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if is_isolated() {
            tracing::debug!(panic = %info, "Isolated panic");
        } else {
            original_hook(info);
        }
    }));
}
