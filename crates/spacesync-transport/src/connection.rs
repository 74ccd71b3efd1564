//! In-process duplex byte channel
//!
//! Each end sends framed bytes and receives what the other end sent.
//! Dropping an end closes the peer's receiver.

use bytes::Bytes;
use tokio::sync::mpsc;

/// One end of a framed duplex channel
pub struct Connection {
    sender: mpsc::UnboundedSender<Bytes>,
    receiver: mpsc::UnboundedReceiver<Bytes>,
}

impl Connection {
    /// Create two connected ends
    pub fn pair() -> (Connection, Connection) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Connection { sender: a_tx, receiver: b_rx },
            Connection { sender: b_tx, receiver: a_rx },
        )
    }

    pub fn into_parts(self) -> (mpsc::UnboundedSender<Bytes>, mpsc::UnboundedReceiver<Bytes>) {
        (self.sender, self.receiver)
    }
}
