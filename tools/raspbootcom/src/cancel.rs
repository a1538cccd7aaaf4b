//! Cooperative shutdown.
//!
//! Signal handlers only raise a flag; every blocking loop on the host
//! polls it at each retry, so a pending upload stops at the next byte
//! or chunk boundary.
use std::{
    io, mem, ptr,
    sync::atomic::{AtomicBool, Ordering},
};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

const SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

/// Handle on a process wide cancellation flag.
#[derive(Debug, Copy, Clone)]
pub struct Cancellation {
    flag: &'static AtomicBool,
}

impl Cancellation {
    pub const fn new(flag: &'static AtomicBool) -> Self { Self { flag } }

    pub fn cancel(&self) { self.flag.store(true, Ordering::SeqCst) }

    pub fn is_cancelled(&self) -> bool { self.flag.load(Ordering::SeqCst) }
}

extern "C" fn on_signal(_: libc::c_int) { SHUTDOWN.store(true, Ordering::SeqCst) }

/// Routes SIGINT, SIGTERM and SIGHUP to the shutdown flag.
///
/// The handlers are installed without `SA_RESTART`, so a blocked
/// `poll` returns early and the caller gets to look at the flag.
pub fn install_signal_handlers() -> io::Result<Cancellation> {
    for signal in SIGNALS {
        // NOTE(Safety) The handler only touches an atomic, and the
        // action struct is fully initialised before use.
        unsafe {
            let mut action: libc::sigaction = mem::zeroed();
            action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(signal, &action, ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(Cancellation::new(&SHUTDOWN))
}
