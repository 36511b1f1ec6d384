//! SIGINT/SIGTERM/SIGHUP handling.
//!
//! The handler only raises a flag. Long running work (child processes, downloads) polls the flag
//! and returns [`Interrupted`], so the error unwinds through the scoped guards that unmount the
//! tmpfs and remove the staging tree.
use std::{
    ffi::c_int,
    io::{self, Read, Write},
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use thiserror::Error;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("interrupted")]
pub struct Interrupted;

extern "C" fn on_signal(_signal: c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the interrupt handlers for the rest of the process lifetime.
pub fn install_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // SAFETY: `on_signal` only stores to an atomic, which is async-signal-safe.
        unsafe { sigaction(signal, &action) }
            .context(format!("failed to install a handler for {signal}"))?;
    }
    Ok(())
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Fail with [`Interrupted`] if a signal arrived.
pub fn check() -> Result<(), Interrupted> {
    if is_interrupted() {
        Err(Interrupted)
    } else {
        Ok(())
    }
}

/// Raise the flag as if a signal arrived.
#[doc(hidden)]
pub fn trigger() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

#[doc(hidden)]
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Fails reads and writes once an interrupt arrived.
///
/// `io::copy` retries on `ErrorKind::Interrupted`, so the error is reported as `Other`.
pub struct Interruptible<T>(pub T);

fn io_check() -> io::Result<()> {
    check().map_err(io::Error::other)
}

impl<R: Read> Read for Interruptible<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io_check()?;
        self.0.read(buf)
    }
}

impl<W: Write> Write for Interruptible<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io_check()?;
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
