use std::time::Instant;

use crate::protocol::{PlayerMode, RemoteTrack};

/// What the provider last reported as playing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteNowPlaying {
    pub track: RemoteTrack,
    pub cover_url: Option<String>,
}

/// Authoritative player record.  Owned by `PlayerMachine`; nothing else
/// mutates it.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub mode: PlayerMode,
    /// Index into the local playlist, always `< playlist.len()`.
    pub local_index: usize,
    /// Flips to true once, on the first user gesture.
    pub audio_unlocked: bool,
    /// Last applied poll completion, successful or failed.
    pub last_remote_check: Option<Instant>,
    /// Set while `mode == RemotePlaying`.
    pub remote: Option<RemoteNowPlaying>,
    /// At least one poll result (or the unlock timeout) has been applied.
    pub status_known: bool,
    pub unlock_prompt: bool,
    /// The ambient cue was refused by the sink and must start after unlock.
    pub cue_blocked: bool,
    /// A local track was requested and has not reported `Started` yet.
    pub loading: bool,
    /// Bumped on every local start; a retry timer carrying an older value is stale.
    pub retry_token: u64,
}

impl PlayerState {
    pub fn new(local_index: usize) -> Self {
        Self {
            mode: PlayerMode::AwaitingUnlock,
            local_index,
            audio_unlocked: false,
            last_remote_check: None,
            remote: None,
            status_known: false,
            unlock_prompt: false,
            cue_blocked: false,
            loading: false,
            retry_token: 0,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.mode == PlayerMode::RemotePlaying
    }

    /// The play/pause control is disabled exactly while remote is playing.
    pub fn toggle_enabled(&self) -> bool {
        !self.is_remote()
    }
}
