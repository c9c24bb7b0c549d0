/// Batch interruption flag
///
/// SIGINT/SIGTERM only flip an atomic; the batch runner polls it between
/// candidates and unwinds normally so the cleanup guard still runs.
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn interrupt_handler(_sig: libc::c_int) {
    // Async-signal-safe: a single atomic store, nothing else.
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to the interruption flag
pub fn install_interrupt_handlers() {
    let handler = interrupt_handler as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}
