//! Queues between the session and the presentation layer.
//!
//! The session keeps the receiving end of the outbound queue for its whole
//! lifetime, so messages typed while the connection is down are sent once it
//! comes back.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

use crate::events::{ChatMessage, Pulse, StatusUpdate};

/// The presentation layer's end of the queues.
pub struct Presentation {
    pub messages: UnboundedReceiver<ChatMessage>,
    pub status: UnboundedReceiver<StatusUpdate>,
    pub outbound: UnboundedSender<String>,
    pub nicknames: UnboundedSender<String>,
}

/// The session's end of the queues.
pub struct SessionChannels {
    pub(crate) display: UnboundedSender<ChatMessage>,
    pub(crate) status: StatusSender,
    pub(crate) outbound_tx: UnboundedSender<String>,
    pub(crate) outbound_rx: UnboundedReceiver<String>,
    pub(crate) nicknames: UnboundedReceiver<String>,
    pub(crate) history_tx: UnboundedSender<ChatMessage>,
    pub(crate) history_rx: UnboundedReceiver<ChatMessage>,
}

pub fn channels() -> (SessionChannels, Presentation) {
    let (display, messages) = unbounded_channel();
    let (status_tx, status) = unbounded_channel();
    let (outbound_tx, outbound_rx) = unbounded_channel();
    let (nicknames_tx, nicknames) = unbounded_channel();
    let (history_tx, history_rx) = unbounded_channel();

    let session = SessionChannels {
        display,
        status: StatusSender(status_tx),
        outbound_tx: outbound_tx.clone(),
        outbound_rx,
        nicknames,
        history_tx,
        history_rx,
    };
    let presentation = Presentation {
        messages,
        status,
        outbound: outbound_tx,
        nicknames: nicknames_tx,
    };

    (session, presentation)
}

/// Publishes status updates; a presentation layer that stopped listening is
/// not an error for the session.
#[derive(Clone)]
pub struct StatusSender(UnboundedSender<StatusUpdate>);

impl StatusSender {
    pub fn report(&self, update: StatusUpdate) {
        if let Err(error) = self.0.send(update) {
            debug!(update = ?error.0, "status queue has no receiver");
        }
    }
}

/// Sender half of the per-attempt liveness channel.
#[derive(Clone)]
pub struct PulseSender(UnboundedSender<Pulse>);

impl PulseSender {
    pub fn pulse(&self, pulse: Pulse) {
        // The watchdog is gone only while the cohort is being torn down.
        let _ = self.0.send(pulse);
    }
}

/// A status queue for handshakes run outside a [`Presentation`].
pub fn status_channel() -> (StatusSender, UnboundedReceiver<StatusUpdate>) {
    let (tx, rx) = unbounded_channel();
    (StatusSender(tx), rx)
}

pub fn pulse_channel() -> (PulseSender, UnboundedReceiver<Pulse>) {
    let (tx, rx) = unbounded_channel();
    (PulseSender(tx), rx)
}
