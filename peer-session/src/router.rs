//! MessageRouter - typed publish/dispatch over the engine's channel.
//!
//! Handlers are registered per message kind and run in registration order.
//! One failing handler never stops the others, and kinds nobody listens to
//! are dropped quietly so newer peers cannot crash older ones.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use peer_types::Envelope;
use serde_json::Value;

use crate::engine::ConnectionEngine;
use crate::error::SessionError;
use crate::transport::TransportFactory;

/// Error a handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Box<dyn FnMut(&Value) -> Result<(), HandlerError> + Send + Sync>;

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that completed.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

impl DispatchReport {
    /// True when no handler was registered for the kind.
    pub fn is_unhandled(&self) -> bool {
        self.delivered == 0 && self.failed == 0
    }
}

/// Demultiplexes inbound envelopes to per-kind handler lists.
#[derive(Default)]
pub struct MessageRouter {
    handlers: HashMap<String, Vec<Handler>>,
}

impl MessageRouter {
    /// Create a router with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `kind`.
    ///
    /// The same closure registered twice runs twice. There is no way to
    /// unregister.
    pub fn on_message<H>(&mut self, kind: impl Into<String>, handler: H)
    where
        H: FnMut(&Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers
            .entry(kind.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Run every handler registered for the envelope's kind.
    pub fn dispatch(&mut self, envelope: &Envelope) -> DispatchReport {
        let mut report = DispatchReport::default();

        let Some(handlers) = self.handlers.get_mut(&envelope.kind) else {
            tracing::debug!("No handlers for {:?}, dropping", envelope.kind);
            return report;
        };

        for handler in handlers.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&envelope.payload)));
            let failure = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            report.failed += 1;
            tracing::warn!(
                "{}",
                SessionError::HandlerFailure {
                    kind: envelope.kind.clone(),
                    reason: failure,
                }
            );
        }

        report
    }

    /// Frame `payload` as a `kind` envelope and send it through the engine.
    ///
    /// Returns the engine's result unchanged.
    pub async fn publish<F: TransportFactory>(
        &self,
        engine: &ConnectionEngine<F>,
        kind: &str,
        payload: Value,
    ) -> bool {
        engine.send(&Envelope::new(kind, payload)).await
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: &str) -> usize {
        self.handlers.get(kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("MessageRouter").field("kinds", &kinds).finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
