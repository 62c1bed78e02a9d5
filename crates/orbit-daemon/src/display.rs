use orbit_proto::protocol::DisplayState;
use orbit_proto::sink::DisplaySink;
use tokio::sync::{broadcast, watch};

use crate::BroadcastMessage;

/// Publishes machine snapshots to every surface: the latest value sits in a
/// `watch` channel for readers that arrive late (new clients, HTTP), and a
/// `DisplayUpdated` broadcast wakes connected clients.
pub struct ChannelDisplay {
    state_tx: watch::Sender<DisplayState>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl ChannelDisplay {
    pub fn new(broadcast_tx: broadcast::Sender<BroadcastMessage>) -> (Self, watch::Receiver<DisplayState>) {
        let (state_tx, state_rx) = watch::channel(DisplayState::default());
        (
            Self {
                state_tx,
                broadcast_tx,
            },
            state_rx,
        )
    }
}

impl DisplaySink for ChannelDisplay {
    fn apply(&mut self, display: &DisplayState) {
        self.state_tx.send_replace(display.clone());
        // No receivers is fine.
        let _ = self.broadcast_tx.send(BroadcastMessage::DisplayUpdated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_proto::protocol::PlayerMode;

    #[test]
    fn test_apply_updates_watch_and_notifies() {
        let (broadcast_tx, mut broadcast_rx) = broadcast::channel(4);
        let (mut display, state_rx) = ChannelDisplay::new(broadcast_tx);

        let snapshot = DisplayState {
            rev: 3,
            mode: PlayerMode::LocalPlaying,
            title: "Oke".to_string(),
            ..Default::default()
        };
        display.apply(&snapshot);

        assert_eq!(*state_rx.borrow(), snapshot);
        assert!(matches!(
            broadcast_rx.try_recv(),
            Ok(BroadcastMessage::DisplayUpdated)
        ));
    }
}
