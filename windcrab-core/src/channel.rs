//! Local channels between the partition router and window operator threads.
//!
//! Bounded crossbeam channels: a full channel blocks the sender, which
//! propagates backpressure to the source.

use crate::types::StreamElement;
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

/// Default channel buffer size.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Sender side of a local channel.
#[derive(Clone)]
pub struct LocalChannelSender<T> {
    sender: Sender<StreamElement<T>>,
}

impl<T> LocalChannelSender<T> {
    /// Send a stream element. Blocks while the channel is full.
    pub fn send(&self, element: StreamElement<T>) -> Result<()> {
        self.sender
            .send(element)
            .map_err(|_| anyhow!("channel closed: receiver dropped"))
    }
}

/// Receiver side of a local channel.
pub struct LocalChannelReceiver<T> {
    receiver: Receiver<StreamElement<T>>,
}

impl<T> LocalChannelReceiver<T> {
    /// Iterate until every sender is dropped.
    pub fn iter(&self) -> impl Iterator<Item = StreamElement<T>> + '_ {
        self.receiver.iter()
    }
}

/// Create a bounded local channel pair.
pub fn local_channel<T>(capacity: usize) -> (LocalChannelSender<T>, LocalChannelReceiver<T>) {
    let (sender, receiver) = bounded(capacity);
    (
        LocalChannelSender { sender },
        LocalChannelReceiver { receiver },
    )
}
