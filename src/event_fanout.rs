//! Transport-only event fanout (spec §5, §7 multi-subscriber delivery).
//!
//! `EventFanout` delivers `StreamChunk`s to live subscribers of a task. It
//! does not buffer history beyond the broadcast channel's own backlog and
//! does not know about interactions or sessions.

use tokio::sync::broadcast;

use crate::events::StreamChunk;

const FANOUT_BUFFER: usize = 256;

pub struct EventFanout {
    sender: broadcast::Sender<StreamChunk>,
}

impl EventFanout {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FANOUT_BUFFER);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamChunk> {
        self.sender.subscribe()
    }

    pub fn publish(&self, chunk: StreamChunk) {
        let _ = self.sender.send(chunk);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventFanout {
    fn default() -> Self {
        Self::new()
    }
}
