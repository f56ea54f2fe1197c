//! Crate-wide error type.
//!
//! Mirrors the taxonomy of spec §7: configuration, format, I/O, physics and
//! memory errors, each carried as a value rather than a panic, plus a
//! catch-all for glue-level failures (bincode, std::io) that don't need a
//! bespoke variant.

use std::sync::{Mutex, OnceLock};
use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration: null physics/state, unknown particle, bad
    /// scheme/index, out-of-range cutoff or ratio, missing PRNG, missing
    /// limit in an infinite uniform medium, forward-tau with decay-weighted
    /// mode.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// MDF or stopping-power-table parse error, or binary-dump version
    /// mismatch.
    #[error("format error: {0}")]
    Format(String),
    /// Cannot open/create an MDF, stopping-power, or dump file.
    #[error("I/O error: {0}")]
    Io(String),
    /// Non-positive density, non-normalised direction, runaway magnetic
    /// rotation.
    #[error("physics error: {0}")]
    Physics(String),
    /// Allocation failure (arena construction).
    #[error("memory error: {0}")]
    Memory(String),
    /// Error that does not originate in this crate.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        let message = e.to_string();
        raise("I/O", "std::io::Error::into", &message);
        Self::Io(message)
    }
}

impl Error {
    /// Builds a [`Error::Configuration`] and raises it through the
    /// process-wide sink (spec §5/§7), tagging the call site by file for the
    /// handler/catch-mode consumer.
    #[track_caller]
    pub fn configuration(message: impl Into<String>) -> Self {
        let message = message.into();
        raise("configuration", std::panic::Location::caller().file(), &message);
        Self::Configuration(message)
    }

    /// Builds a [`Error::Format`] and raises it through the process-wide
    /// sink.
    #[track_caller]
    pub fn format(message: impl Into<String>) -> Self {
        let message = message.into();
        raise("format", std::panic::Location::caller().file(), &message);
        Self::Format(message)
    }

    /// Builds a [`Error::Io`] and raises it through the process-wide sink.
    #[track_caller]
    pub fn io(message: impl Into<String>) -> Self {
        let message = message.into();
        raise("I/O", std::panic::Location::caller().file(), &message);
        Self::Io(message)
    }

    /// Builds a [`Error::Physics`] and raises it through the process-wide
    /// sink.
    #[track_caller]
    pub fn physics(message: impl Into<String>) -> Self {
        let message = message.into();
        raise("physics", std::panic::Location::caller().file(), &message);
        Self::Physics(message)
    }

    /// Builds a [`Error::Memory`] and raises it through the process-wide
    /// sink.
    #[track_caller]
    pub fn memory(message: impl Into<String>) -> Self {
        let message = message.into();
        raise("memory", std::panic::Location::caller().file(), &message);
        Self::Memory(message)
    }
}

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A registered handler, invoked with `(code, function, message)` whenever
/// an error surfaces and process-wide catch mode is not active.
pub type ErrorHandler = fn(kind: &'static str, function: &'static str, message: &str);

fn default_handler(kind: &'static str, function: &'static str, message: &str) {
    eprintln!("pumas: {kind} error in `{function}`: {message}");
}

struct ErrorSink {
    handler: ErrorHandler,
    catching: bool,
    latched: Option<(String, String, String)>,
}

static SINK: OnceLock<Mutex<ErrorSink>> = OnceLock::new();

fn sink() -> &'static Mutex<ErrorSink> {
    SINK.get_or_init(|| {
        Mutex::new(ErrorSink {
            handler: default_handler,
            catching: false,
            latched: None,
        })
    })
}

/// Replaces the process-wide error handler. Configured once at start-up, per
/// spec §5.
pub fn set_handler(handler: ErrorHandler) {
    sink().lock().unwrap().handler = handler;
}

/// Enables or disables "error catching" mode: while enabled, the first
/// raised error is latched and the handler is suppressed until `reset` is
/// called.
pub fn set_catching(catching: bool) {
    let mut s = sink().lock().unwrap();
    s.catching = catching;
    if !catching {
        s.latched = None;
    }
}

/// Clears any latched error, re-arming catch mode to accept a new one.
pub fn reset() {
    sink().lock().unwrap().latched = None;
}

/// Returns the latched `(kind, function, message)` triple, if any.
pub fn latched() -> Option<(String, String, String)> {
    sink().lock().unwrap().latched.clone()
}

/// Raises an error through the process-wide sink: latches it in catch mode,
/// otherwise invokes the registered handler.
pub fn raise(kind: &'static str, function: &'static str, message: &str) {
    let mut s = sink().lock().unwrap();
    if s.catching {
        if s.latched.is_none() {
            s.latched = Some((kind.to_string(), function.to_string(), message.to_string()));
        }
    } else {
        (s.handler)(kind, function, message);
    }
}
