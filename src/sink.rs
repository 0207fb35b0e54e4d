//! Background-error side channel.
//!
//! Errors raised by detached callbacks (token callbacks, timer callbacks,
//! microtasks, fiber wrappers) are never allowed to destabilize promise or
//! loop state. They are routed here instead. The default sink logs through
//! `tracing::warn!`; embedders can install their own hook.

use std::any::Any;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::error::Error;

type Hook = Box<dyn Fn(&str, &Error) + Send + Sync>;

static HOOK: OnceLock<Mutex<Option<Hook>>> = OnceLock::new();

fn hook_cell() -> &'static Mutex<Option<Hook>> {
    HOOK.get_or_init(|| Mutex::new(None))
}

/// Installs a background-error hook, replacing any previous one.
///
/// The hook receives a short origin label ("timer callback", "token
/// callback", ...) and the error. It runs on whatever thread reported the
/// error and must not block.
pub fn set_background_error_hook(hook: impl Fn(&str, &Error) + Send + Sync + 'static) {
    *hook_cell().lock() = Some(Box::new(hook));
}

/// Removes the installed hook, restoring the default `tracing` sink.
pub fn clear_background_error_hook() {
    *hook_cell().lock() = None;
}

/// Reports an error from a detached callback.
pub(crate) fn report(origin: &str, error: &Error) {
    let guard = hook_cell().lock();
    if let Some(hook) = guard.as_ref() {
        hook(origin, error);
    } else {
        tracing::warn!(origin, error = %error, "background callback error");
    }
}

/// Converts a caught panic payload into an error and reports it.
pub(crate) fn report_panic(origin: &str, payload: &(dyn Any + Send)) {
    let text = payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "panic payload of unknown type".to_owned())
        },
        |s| (*s).to_owned(),
    );
    report(origin, &Error::user(format!("panicked: {text}")));
}

/// Converts a caught panic payload into an error without reporting it.
pub(crate) fn panic_error(payload: &(dyn Any + Send)) -> Error {
    let text = payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "panic payload of unknown type".to_owned())
        },
        |s| (*s).to_owned(),
    );
    Error::user(format!("panicked: {text}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn custom_hook_receives_reports() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        set_background_error_hook(move |origin, error| {
            if origin == "unit test" && error.is_cancelled() {
                seen2.fetch_add(1, Ordering::SeqCst);
            }
        });
        report("unit test", &Error::cancelled_default());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        clear_background_error_hook();
    }

    #[test]
    fn panic_error_extracts_str_and_string_payloads() {
        let err = panic_error(&"boom");
        assert!(err.message().contains("boom"));
        let err = panic_error(&String::from("kapow"));
        assert!(err.message().contains("kapow"));
    }
}
