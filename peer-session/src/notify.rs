//! User-facing notifications.
//!
//! The engine reports significant lifecycle events (connected, connection
//! lost, send failure, initialization failure) through a single
//! [`NotificationSink`]. The default sink writes them to the log.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info, warn};

/// How prominent a notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Informational.
    Info,
    /// Something completed.
    Success,
    /// Degraded but recoverable.
    Warning,
    /// An operation failed.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

type NotifyFn = dyn Fn(&str, Severity) + Send + Sync;

/// Callback receiving `(message, severity)`.
#[derive(Clone)]
pub struct NotificationSink(Arc<NotifyFn>);

impl NotificationSink {
    /// Wrap a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, Severity) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Sink that logs through `tracing`.
    pub fn logging() -> Self {
        Self::new(|message, severity| match severity {
            Severity::Info | Severity::Success => info!(%severity, "{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Error => error!("{}", message),
        })
    }

    /// Deliver a notification. A panicking callback is logged and ignored.
    pub fn notify(&self, message: &str, severity: Severity) {
        if catch_unwind(AssertUnwindSafe(|| (self.0)(message, severity))).is_err() {
            warn!(message, "Notification sink panicked");
        }
    }
}

impl Default for NotificationSink {
    fn default() -> Self {
        Self::logging()
    }
}

impl fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationSink").finish_non_exhaustive()
    }
}
