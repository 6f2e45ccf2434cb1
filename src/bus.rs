use std::sync::mpsc::{self, Receiver, Sender};

/// Notifications between screen regions that do not own each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSignal {
    /// A filter editor was closed; the grid should re-project.
    FiltersClosed,
    /// Column set or panel sizes changed; every cached row height is stale.
    LayoutChanged,
    /// Row at this visible index may have changed height, along with those below it.
    RowResized(usize),
    /// The log was replaced or reordered.
    RowsReplaced,
}

/// Fan-out of `UiSignal`s to every live subscriber.
#[derive(Debug, Default)]
pub struct SignalBus {
    subscribers: Vec<Sender<UiSignal>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<UiSignal> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Subscribers whose receiver was dropped are pruned here.
    pub fn publish(&mut self, signal: UiSignal) {
        self.subscribers
            .retain(|tx| tx.send(signal.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
