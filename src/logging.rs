//! Crate-internal log macros.
//!
//! With the `logging` feature each macro forwards to the `tracing` macro of
//! the same level. Without it they expand to nothing, so library users who
//! do not install a subscriber pay nothing.
//!
//! Call sites use them as statements:
//!
//! ```rust,ignore
//! use crate::logging::{debug, info};
//!
//! info!(packages = project.packages().len(), "loaded project");
//! debug!(directory = %dir.display(), files = group.files.len(), "read source group");
//! ```

// Named `log_*` and re-exported under the level names: a plain
// `macro_rules! warn` would clash with the built-in `#[warn]` attribute.

/// Very detailed internal steps: resolution attempts, allocations.
#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => { tracing::trace!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {};
}

/// Per-operation details: groups read, reports built.
#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

/// Lifecycle events such as a finished load.
#[cfg(feature = "logging")]
macro_rules! log_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_info {
    ($($arg:tt)*) => {};
}

/// Unexpected but handled: a signature that cannot be lowered, a released call.
#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

/// Failures that propagate as errors.
#[cfg(feature = "logging")]
macro_rules! log_error {
    ($($arg:tt)*) => { tracing::error!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_error {
    ($($arg:tt)*) => {};
}

pub(crate) use log_debug as debug;
pub(crate) use log_error as error;
pub(crate) use log_info as info;
pub(crate) use log_trace as trace;
pub(crate) use log_warn as warn;
