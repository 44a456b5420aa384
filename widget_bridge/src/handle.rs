//! One embedded widget instance, independent of how it is wired up.
//!
//! Two realizations exist: a WebView-style bridge that moves JSON text
//! ([`WebViewChannel`]) and an element-style event bus that moves typed
//! envelopes ([`ElementChannel`]). Both sit behind [`WidgetChannel`].

use crate::error::Result;
use crate::protocol::{self, Envelope, HostCommand};
use std::sync::mpsc::{Sender, SyncSender, TrySendError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("outbound queue is full")]
    Full,
    #[error("widget side of the channel is gone")]
    Disconnected,
    #[error("envelope could not be encoded")]
    Encode,
}

pub trait WidgetChannel {
    fn post(&mut self, envelope: &Envelope) -> std::result::Result<(), ChannelError>;

    fn close(&mut self) {}
}

/// Inbound traffic as it arrives from either realization.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Typed(Envelope),
}

impl Inbound {
    pub fn into_envelope(self) -> Result<Envelope> {
        match self {
            Self::Text(text) => protocol::decode(&text),
            Self::Typed(envelope) => envelope.validated(),
        }
    }

    /// Raw form for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Typed(envelope) => envelope
                .to_text()
                .unwrap_or_else(|_| envelope.kind.clone()),
        }
    }
}

impl From<String> for Inbound {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Inbound {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Envelope> for Inbound {
    fn from(envelope: Envelope) -> Self {
        Self::Typed(envelope)
    }
}

/// Serializes envelopes to text on a bounded queue drained by a writer.
pub struct WebViewChannel {
    tx: SyncSender<String>,
    capacity: usize,
    dropped: u64,
}

impl WebViewChannel {
    pub fn new(tx: SyncSender<String>, capacity: usize) -> Self {
        Self {
            tx,
            capacity,
            dropped: 0,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl WidgetChannel for WebViewChannel {
    fn post(&mut self, envelope: &Envelope) -> std::result::Result<(), ChannelError> {
        let text = envelope.to_text().map_err(|_| ChannelError::Encode)?;
        match self.tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_text)) => {
                self.dropped += 1;
                if self.dropped == 1 || self.dropped.is_power_of_two() {
                    warn!(
                        capacity = self.capacity,
                        dropped = self.dropped,
                        "widget outbound queue full; dropping envelopes"
                    );
                }
                Err(ChannelError::Full)
            }
            Err(TrySendError::Disconnected(_text)) => Err(ChannelError::Disconnected),
        }
    }
}

/// Hands typed envelopes to an element event bus.
pub struct ElementChannel {
    tx: Sender<Envelope>,
}

impl ElementChannel {
    pub fn new(tx: Sender<Envelope>) -> Self {
        Self { tx }
    }
}

impl WidgetChannel for ElementChannel {
    fn post(&mut self, envelope: &Envelope) -> std::result::Result<(), ChannelError> {
        self.tx
            .send(envelope.clone())
            .map_err(|_| ChannelError::Disconnected)
    }
}

/// Owns the channel subscription for one widget. Sending while detached is
/// a no-op, so callers may send defensively.
#[derive(Default)]
pub struct WidgetHandle {
    channel: Option<Box<dyn WidgetChannel>>,
    sent: u64,
    skipped: u64,
}

impl WidgetHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when an existing channel was replaced.
    pub fn attach(&mut self, channel: Box<dyn WidgetChannel>) -> bool {
        let replaced = self.release();
        self.channel = Some(channel);
        replaced
    }

    pub fn is_attached(&self) -> bool {
        self.channel.is_some()
    }

    pub fn send(&mut self, command: &HostCommand) -> bool {
        match command.to_envelope() {
            Ok(envelope) => self.post(&envelope),
            Err(err) => {
                self.skipped += 1;
                warn!(kind = command.kind(), "widget send failed: {err}");
                false
            }
        }
    }

    pub fn post(&mut self, envelope: &Envelope) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            self.skipped += 1;
            debug!(kind = %envelope.kind, "widget channel not attached; send skipped");
            return false;
        };

        match channel.post(envelope) {
            Ok(()) => {
                self.sent += 1;
                true
            }
            Err(err) => {
                self.skipped += 1;
                warn!(kind = %envelope.kind, "widget send failed: {err}");
                false
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn dispose(&mut self) {
        if self.release() {
            debug!("widget channel released");
        }
    }

    fn release(&mut self) -> bool {
        match self.channel.take() {
            Some(mut channel) => {
                channel.close();
                true
            }
            None => false,
        }
    }
}

impl Drop for WidgetHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}
