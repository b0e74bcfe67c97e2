//! Log setup. Everything goes to stderr so stdout carries only the
//! conversation; `RUST_LOG` overrides the default `info` level.
//!
//! While a progress bar is routed with [`route_through`], each log line is
//! written with the bar suspended, so the spinner and the log never share a
//! terminal line.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use indicatif::ProgressBar;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

static ACTIVE_BAR: Mutex<Option<ProgressBar>> = Mutex::new(None);

pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(BarAwareStderr)
        .init();
}

/// Keeps log output clear of `bar` until the guard is dropped.
pub fn route_through(bar: &ProgressBar) -> ProgressRoute {
    set_active(Some(bar.clone()));
    ProgressRoute(())
}

pub struct ProgressRoute(());

impl Drop for ProgressRoute {
    fn drop(&mut self) {
        set_active(None);
    }
}

fn set_active(bar: Option<ProgressBar>) {
    *ACTIVE_BAR.lock().unwrap_or_else(PoisonError::into_inner) = bar;
}

fn active_bar() -> Option<ProgressBar> {
    ACTIVE_BAR
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[derive(Debug, Clone, Copy, Default)]
struct BarAwareStderr;

impl<'a> MakeWriter<'a> for BarAwareStderr {
    type Writer = BarAwareStderr;

    fn make_writer(&'a self) -> Self::Writer {
        *self
    }
}

impl Write for BarAwareStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match active_bar() {
            Some(bar) => bar.suspend(|| io::stderr().write(buf)),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}
