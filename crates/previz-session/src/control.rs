//! The bounded control queue.
//!
//! The engine is single-threaded; the file watcher and GUI run
//! elsewhere and signal session transitions through this queue. The
//! core drains it between frame renders, so a message never interrupts
//! a render in progress.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// A request marshalled onto the core thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// The watched script changed; re-run it.
    Rerun,
    /// Shut the session down after the current render returns.
    Shutdown,
}

/// Sending half, handed to the watcher/GUI threads.
#[derive(Clone)]
pub struct ControlSender {
    tx: Sender<ControlMessage>,
}

impl ControlSender {
    /// Enqueue a message; drops it when the queue is full (the core
    /// will see the earlier, equivalent signal anyway).
    pub fn signal(&self, message: ControlMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Receiving half, owned by the session driver.
pub struct ControlQueue {
    rx: Receiver<ControlMessage>,
}

impl ControlQueue {
    /// Create a queue bounded to `capacity` pending messages.
    pub fn new(capacity: usize) -> (ControlSender, ControlQueue) {
        let (tx, rx) = bounded(capacity);
        (ControlSender { tx }, ControlQueue { rx })
    }

    /// Non-blocking poll for the next message.
    pub fn poll(&self) -> Option<ControlMessage> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<ControlMessage> {
        let mut messages = Vec::new();
        while let Some(message) = self.poll() {
            messages.push(message);
        }
        messages
    }
}
