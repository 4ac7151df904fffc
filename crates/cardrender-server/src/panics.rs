//! Panic reporting for the job and route failure boundaries.
//!
//! `catch_unwind` only hands back the panic payload. To log where a panic
//! happened, a panic hook records the backtrace on the panicking thread,
//! and the boundary that caught the panic takes it afterwards.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic;
use std::sync::Once;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs the backtrace-recording hook once per process.
///
/// The previously installed hook still runs after the backtrace is stored.
pub fn capture_backtraces() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

/// Takes the backtrace of the last panic on this thread.
pub fn take_backtrace() -> Option<Backtrace> {
    LAST_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// Takes the last backtrace on this thread, rendered for a log field.
pub(crate) fn backtrace_text() -> String {
    take_backtrace()
        .map(|backtrace| backtrace.to_string())
        .unwrap_or_else(|| "unavailable".to_string())
}

/// Message carried by a panic payload.
pub(crate) fn message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
