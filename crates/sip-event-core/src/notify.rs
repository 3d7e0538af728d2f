//! Fan-out of event results to notification consumers

use tokio::sync::broadcast;
use tracing::trace;

use crate::result::EventResult;

/// Broadcasts every result that changed something.
///
/// Slow subscribers lag and lose the oldest results rather than blocking
/// event handling.
#[derive(Debug, Clone)]
pub struct ResultNotifier {
    sender: broadcast::Sender<EventResult>,
}

impl ResultNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventResult> {
        self.sender.subscribe()
    }

    /// Returns the number of subscribers reached. `NothingChanged` is never sent.
    pub fn publish(&self, result: &EventResult) -> usize {
        if result.is_nothing_changed() {
            return 0;
        }
        match self.sender.send(result.clone()) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No subscribers for {}", result);
                0
            }
        }
    }
}
