//! Push-to-pull event delivery for one runtime invocation.
//!
//! A [`CliRuntime`](crate::runtime::base::CliRuntime) run owns the push side
//! (it can emit as fast as the child produces output); the channel bridge
//! owns the pull side, awaiting one event at a time. Built on
//! `tokio::sync::mpsc::unbounded_channel` so the producer never blocks on a
//! slow or absent consumer.

use tokio::sync::mpsc;

use crate::types::AgentEvent;

/// Create a fresh `(EventEmitter, EventReceiver)` pair for one run.
#[must_use]
pub fn channel() -> (EventEmitter, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventEmitter { tx }, EventReceiver { rx })
}

/// Sends [`AgentEvent`]s into the channel.
///
/// If the paired [`EventReceiver`] has been dropped, `emit` silently
/// discards the event — a runtime must never fail because nobody is
/// listening anymore.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl EventEmitter {
    pub fn emit(&self, event: AgentEvent) {
        let _ = self.tx.send(event);
    }
}

/// Receives [`AgentEvent`]s from the paired [`EventEmitter`].
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<AgentEvent>,
}

impl EventReceiver {
    /// Await the next event. Returns `None` once the emitter has been
    /// dropped and the buffer is drained — a well-behaved runtime always
    /// sends a `Done` before that happens.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }
}
