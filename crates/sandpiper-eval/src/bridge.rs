//! Runtime Bridge: the capabilities a session needs from its host.
//!
//! The engine never reads input, writes output or reports failures on its
//! own. Everything goes through a [`RuntimeBridge`] handed to the session at
//! construction.
//!
//! ## Channel Architecture
//!
//! [`ChannelBridge`] is the stock implementation for hosts that run their own
//! loop:
//!
//! - Events: sent via `tokio::sync::mpsc::UnboundedSender` (never blocks the interpreter)
//! - Input replies: received via a per-request `tokio::sync::oneshot` channel
//!
//! Dropping the reply sender abandons the pending request.

use std::io::Write;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::diagnostics::ErrorRecord;

/// Why an input request produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputError {
    /// The host tore the request down; the session stops without an error record.
    #[error("input request abandoned")]
    Abandoned,

    /// The host has no more input. Surfaces in the script as `EOFError`.
    #[error("end of input")]
    Eof,
}

/// Host capabilities consumed by a session.
///
/// Sessions run on a single-threaded executor, so implementations do not
/// need to be `Send`.
#[allow(async_fn_in_trait)]
pub trait RuntimeBridge {
    /// Deliver one line of input for a suspended `input(...)` call.
    ///
    /// May stay pending indefinitely; the session is cancelled by dropping
    /// this future.
    async fn request_input(&self, prompt: Option<&str>) -> Result<String, InputError>;

    /// Text the script printed.
    fn write_output(&self, text: &str) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    /// Called at most once per session, always before [`signal_completion`](Self::signal_completion).
    fn report_error(&self, record: &ErrorRecord);

    /// Called exactly once per session, on every exit path.
    fn signal_completion(&self);
}

/// An event forwarded by [`ChannelBridge`].
#[derive(Debug)]
pub enum HostEvent {
    /// The script is suspended until a line is sent on `reply`.
    InputRequested {
        prompt: Option<String>,
        reply: oneshot::Sender<String>,
    },
    Output(String),
    Error(ErrorRecord),
    Completed,
}

/// A bridge that forwards every capability over a channel.
///
/// This is cloneable so the host can keep a copy for its own bookkeeping.
#[derive(Debug, Clone)]
pub struct ChannelBridge {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl ChannelBridge {
    /// Create a new bridge from a sender.
    pub fn new(tx: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self { tx }
    }

    /// Create a bridge together with the receiving end of its event stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl RuntimeBridge for ChannelBridge {
    async fn request_input(&self, prompt: Option<&str>) -> Result<String, InputError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(HostEvent::InputRequested {
                prompt: prompt.map(str::to_owned),
                reply,
            })
            .map_err(|_| InputError::Abandoned)?;
        response.await.map_err(|_| InputError::Abandoned)
    }

    fn write_output(&self, text: &str) {
        let _ = self.tx.send(HostEvent::Output(text.to_string()));
    }

    fn report_error(&self, record: &ErrorRecord) {
        let _ = self.tx.send(HostEvent::Error(record.clone()));
    }

    fn signal_completion(&self) {
        let _ = self.tx.send(HostEvent::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge_round_trips_input() {
        let (bridge, mut events) = ChannelBridge::channel();
        let host = async {
            match events.recv().await {
                Some(HostEvent::InputRequested { prompt, reply }) => {
                    assert_eq!(prompt.as_deref(), Some("Name: "));
                    reply.send("Ada".to_string()).unwrap();
                }
                other => panic!("Expected input request, got {:?}", other),
            }
        };
        let (line, ()) = tokio::join!(bridge.request_input(Some("Name: ")), host);
        assert_eq!(line, Ok("Ada".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_reply_abandons_request() {
        let (bridge, mut events) = ChannelBridge::channel();
        let host = async {
            // Dropping the event drops the reply sender.
            let event = events.recv().await;
            assert!(matches!(event, Some(HostEvent::InputRequested { .. })));
        };
        let (line, ()) = tokio::join!(bridge.request_input(None), host);
        assert_eq!(line, Err(InputError::Abandoned));
    }

    #[tokio::test]
    async fn test_closed_channel_abandons_request() {
        let (bridge, events) = ChannelBridge::channel();
        drop(events);
        assert_eq!(bridge.request_input(None).await, Err(InputError::Abandoned));
    }

    #[test]
    fn test_events_are_forwarded_in_order() {
        let (bridge, mut events) = ChannelBridge::channel();
        bridge.write_output("hi\n");
        bridge.signal_completion();
        assert!(matches!(events.try_recv(), Ok(HostEvent::Output(text)) if text == "hi\n"));
        assert!(matches!(events.try_recv(), Ok(HostEvent::Completed)));
    }
}
