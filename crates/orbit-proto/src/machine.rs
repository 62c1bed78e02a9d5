//! The player state machine.
//!
//! ```text
//!   AwaitingUnlock ──gesture──────────────▶ LocalPlaying ◀──toggle──▶ LocalPaused
//!        │  ▲                                  │   ▲                     │
//!        │  └──idle/unavailable (locked)──┐    │   └─idle/unavailable─┐  │
//!        └──poll: playing──────────────▶ RemotePlaying ◀──poll: playing─┴──┘
//! ```
//!
//! Every public handler is one transition.  It mutates `PlayerState`, issues
//! at most one logical audio command (stop-then-start counts as one), and then
//! publishes a single display snapshot.  Handlers run one at a time on the
//! caller's thread, so the display never shows text from one state next to
//! audio from another.
//!
//! Timers are not owned here.  A handler that needs a delayed follow-up leaves
//! a `RetryRequest` for the runtime to pick up with `take_scheduled_retry`.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::PlayerError;
use crate::playlist::Playlist;
use crate::protocol::{
    DisplayState, PlayerMode, RemoteStatus, ToggleIcon, CHECKING_ARTIST, CHECKING_TITLE,
    NO_STATUS_ARTIST, NO_STATUS_TITLE,
};
use crate::sink::{AudioEvent, AudioSink, DisplaySink};
use crate::state::{PlayerState, RemoteNowPlaying};

#[derive(Debug, Clone)]
pub struct MachineSettings {
    /// Looped while a remote track is playing.
    pub ambient_cue: String,
    /// Backoff before retrying after a local track fails to load.
    pub retry_delay: Duration,
    pub placeholder_cover: String,
}

/// A delayed local restart requested by the machine.  Hand `token` back to
/// `on_retry_due` once `delay` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRequest {
    pub token: u64,
    pub delay: Duration,
}

pub struct PlayerMachine<A: AudioSink, D: DisplaySink> {
    state: PlayerState,
    playlist: Playlist,
    settings: MachineSettings,
    audio: A,
    display: D,
    published: DisplayState,
    retry_pending: bool,
    scheduled_retry: Option<RetryRequest>,
}

impl<A: AudioSink, D: DisplaySink> PlayerMachine<A, D> {
    pub fn new(
        playlist: Playlist,
        start_index: usize,
        settings: MachineSettings,
        audio: A,
        display: D,
    ) -> Self {
        let start_index = start_index % playlist.len();
        let mut machine = Self {
            state: PlayerState::new(start_index),
            playlist,
            settings,
            audio,
            display,
            published: DisplayState::default(),
            retry_pending: false,
            scheduled_retry: None,
        };
        let initial = machine.compose(0);
        machine.display.apply(&initial);
        machine.published = initial;
        machine
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Last snapshot handed to the display sink.
    pub fn snapshot(&self) -> &DisplayState {
        &self.published
    }

    pub fn take_scheduled_retry(&mut self) -> Option<RetryRequest> {
        self.scheduled_retry.take()
    }

    // ── Poll results ──────────────────────────────────────────────────────────

    pub fn on_poll_result(&mut self, status: RemoteStatus, now: Instant) {
        self.state.last_remote_check = Some(now);
        self.apply_status(status);
        self.publish();
    }

    /// No poll resolved within the unlock timeout: behave as if the provider
    /// were unavailable.  Ignored once any result has been applied.
    pub fn on_unlock_timeout(&mut self) {
        if self.state.status_known {
            return;
        }
        info!("player: no now-playing status yet, falling back");
        self.apply_status(RemoteStatus::Unavailable(
            "no poll result before timeout".to_string(),
        ));
        self.publish();
    }

    fn apply_status(&mut self, status: RemoteStatus) {
        self.state.status_known = true;
        match status {
            RemoteStatus::Playing { track, cover_url } => {
                let now_playing = RemoteNowPlaying { track, cover_url };
                if self.state.is_remote() {
                    if self.state.remote.as_ref() != Some(&now_playing) {
                        info!(
                            "player: remote track changed to {:?} by {:?}",
                            now_playing.track.title, now_playing.track.artist
                        );
                        self.state.remote = Some(now_playing);
                    }
                    return;
                }
                self.enter_remote(now_playing);
            }
            RemoteStatus::Idle => self.fall_back(),
            RemoteStatus::Unavailable(reason) => {
                debug!("player: provider unavailable: {}", reason);
                self.fall_back();
            }
        }
    }

    fn fall_back(&mut self) {
        match self.state.mode {
            PlayerMode::RemotePlaying => self.leave_remote(),
            PlayerMode::AwaitingUnlock => self.state.unlock_prompt = true,
            PlayerMode::LocalPlaying | PlayerMode::LocalPaused => {}
        }
    }

    fn enter_remote(&mut self, now_playing: RemoteNowPlaying) {
        info!(
            "player: remote playing {:?} by {:?}",
            now_playing.track.title, now_playing.track.artist
        );
        self.cancel_retry();
        self.state.loading = false;

        self.audio.stop();
        self.audio.load(&self.settings.ambient_cue);
        self.audio.set_loop(true);
        self.state.cue_blocked = match self.audio.play() {
            Ok(()) => false,
            Err(PlayerError::PlaybackBlocked) => {
                debug!("player: ambient cue blocked until unlock");
                true
            }
            Err(e) => {
                warn!("player: ambient cue failed to start: {}", e);
                false
            }
        };
        self.state.unlock_prompt = self.state.cue_blocked && !self.state.audio_unlocked;

        self.state.mode = PlayerMode::RemotePlaying;
        self.state.remote = Some(now_playing);
    }

    fn leave_remote(&mut self) {
        info!("player: remote stopped");
        self.audio.stop();
        self.state.remote = None;
        self.state.cue_blocked = false;

        if self.state.audio_unlocked {
            self.start_local();
        } else {
            self.state.mode = PlayerMode::AwaitingUnlock;
            self.state.unlock_prompt = true;
        }
    }

    // ── User input ────────────────────────────────────────────────────────────

    /// Any interaction with the page.  Only the first one does anything.
    pub fn on_user_gesture(&mut self) {
        if self.state.audio_unlocked {
            return;
        }
        info!("player: audio unlocked");
        self.state.audio_unlocked = true;
        self.state.unlock_prompt = false;
        self.audio.unlock();

        match self.state.mode {
            PlayerMode::AwaitingUnlock => self.start_local(),
            PlayerMode::RemotePlaying if self.state.cue_blocked => match self.audio.play() {
                Ok(()) => self.state.cue_blocked = false,
                Err(e) => warn!("player: ambient cue still refused after unlock: {}", e),
            },
            _ => {}
        }
        self.publish();
    }

    pub fn on_toggle_pressed(&mut self) {
        match self.state.mode {
            PlayerMode::RemotePlaying | PlayerMode::AwaitingUnlock => {
                debug!("player: toggle ignored in {:?}", self.state.mode);
                return;
            }
            PlayerMode::LocalPlaying => {
                self.audio.pause();
                self.state.mode = PlayerMode::LocalPaused;
            }
            PlayerMode::LocalPaused if self.retry_pending => self.start_local(),
            PlayerMode::LocalPaused => match self.audio.play() {
                Ok(()) => self.state.mode = PlayerMode::LocalPlaying,
                Err(e) => warn!("player: resume refused: {}", e),
            },
        }
        self.publish();
    }

    // ── Audio notifications ───────────────────────────────────────────────────

    pub fn on_audio_event(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::Started => self.on_track_started(),
            AudioEvent::Ended => self.on_track_ended(),
            AudioEvent::Error(reason) => self.on_track_load_error(&reason),
        }
    }

    pub fn on_track_started(&mut self) {
        if self.state.mode == PlayerMode::LocalPlaying && self.state.loading {
            self.state.loading = false;
            self.publish();
        }
    }

    pub fn on_track_ended(&mut self) {
        match self.state.mode {
            PlayerMode::RemotePlaying => {
                debug!("player: ambient cue ended, restarting");
                self.audio.rewind();
                if let Err(e) = self.audio.play() {
                    debug!("player: ambient cue restart refused: {}", e);
                }
            }
            PlayerMode::LocalPlaying => {
                self.state.local_index = self.playlist.advance(self.state.local_index);
                self.start_local();
            }
            PlayerMode::AwaitingUnlock | PlayerMode::LocalPaused => return,
        }
        self.publish();
    }

    /// The current source could not be loaded.  Local playback moves on to
    /// the next track after `retry_delay`; the mode is left as is.  While
    /// paused the advance waits for the next toggle.
    pub fn on_track_load_error(&mut self, reason: &str) {
        match self.state.mode {
            PlayerMode::LocalPlaying | PlayerMode::LocalPaused => {
                let failed = self.playlist.current(self.state.local_index).file.clone();
                warn!("player: failed to play {}: {}", failed, reason);
                self.audio.stop();
                self.schedule_advance();
                if self.state.mode == PlayerMode::LocalPaused {
                    self.state.loading = false;
                }
            }
            PlayerMode::RemotePlaying => {
                warn!("player: ambient cue error: {}", reason);
                return;
            }
            PlayerMode::AwaitingUnlock => {
                debug!("player: audio error ignored in {:?}: {}", self.state.mode, reason);
                return;
            }
        }
        self.publish();
    }

    pub fn on_retry_due(&mut self, token: u64) {
        if !self.retry_pending || token != self.state.retry_token {
            debug!("player: stale retry {} ignored", token);
            return;
        }
        if self.state.mode != PlayerMode::LocalPlaying {
            return;
        }
        self.start_local();
        self.publish();
    }

    /// Stop audio for good (process shutdown).
    pub fn shutdown(&mut self) {
        self.cancel_retry();
        self.audio.stop();
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn start_local(&mut self) {
        self.cancel_retry();
        let track = self.playlist.current(self.state.local_index).clone();
        info!(
            "player: local track {} {:?} by {:?}",
            self.state.local_index, track.title, track.artist
        );

        self.audio.stop();
        self.audio.load(&track.file);
        self.audio.set_loop(false);
        match self.audio.play() {
            Ok(()) => {
                self.state.mode = PlayerMode::LocalPlaying;
                self.state.loading = true;
            }
            Err(PlayerError::PlaybackBlocked) if !self.state.audio_unlocked => {
                self.state.mode = PlayerMode::AwaitingUnlock;
                self.state.unlock_prompt = true;
                self.state.loading = false;
            }
            Err(e) => {
                warn!("player: failed to start {}: {}", track.file, e);
                self.audio.stop();
                self.state.mode = PlayerMode::LocalPlaying;
                self.schedule_advance();
            }
        }
    }

    fn schedule_advance(&mut self) {
        self.state.local_index = self.playlist.advance(self.state.local_index);
        self.state.retry_token += 1;
        self.state.loading = true;
        self.retry_pending = true;
        self.scheduled_retry = Some(RetryRequest {
            token: self.state.retry_token,
            delay: self.settings.retry_delay,
        });
    }

    fn cancel_retry(&mut self) {
        self.state.retry_token += 1;
        self.retry_pending = false;
        self.scheduled_retry = None;
    }

    fn publish(&mut self) {
        let candidate = self.compose(self.published.rev);
        if candidate == self.published {
            return;
        }
        let next = DisplayState {
            rev: self.published.rev + 1,
            ..candidate
        };
        self.display.apply(&next);
        self.published = next;
    }

    fn compose(&self, rev: u64) -> DisplayState {
        let placeholder = || self.settings.placeholder_cover.clone();
        let (title, artist, cover_url) = match self.state.mode {
            PlayerMode::RemotePlaying => match &self.state.remote {
                Some(np) => (
                    np.track.title.clone(),
                    np.track.artist.clone(),
                    np.cover_url.clone().unwrap_or_else(placeholder),
                ),
                None => (NO_STATUS_TITLE.to_string(), NO_STATUS_ARTIST.to_string(), placeholder()),
            },
            PlayerMode::LocalPlaying | PlayerMode::LocalPaused => {
                let track = self.playlist.current(self.state.local_index);
                let cover = if track.cover.is_empty() {
                    placeholder()
                } else {
                    track.cover.clone()
                };
                (track.title.clone(), track.artist.clone(), cover)
            }
            PlayerMode::AwaitingUnlock if self.state.status_known => {
                (NO_STATUS_TITLE.to_string(), NO_STATUS_ARTIST.to_string(), placeholder())
            }
            PlayerMode::AwaitingUnlock => {
                (CHECKING_TITLE.to_string(), CHECKING_ARTIST.to_string(), placeholder())
            }
        };

        let loading = match self.state.mode {
            PlayerMode::AwaitingUnlock => !self.state.status_known,
            PlayerMode::LocalPlaying | PlayerMode::LocalPaused => self.state.loading,
            PlayerMode::RemotePlaying => false,
        };

        let toggle_icon = match self.state.mode {
            PlayerMode::RemotePlaying | PlayerMode::LocalPlaying => ToggleIcon::Pause,
            PlayerMode::AwaitingUnlock | PlayerMode::LocalPaused => ToggleIcon::Play,
        };

        DisplayState {
            rev,
            mode: self.state.mode,
            title,
            artist,
            cover_url,
            loading,
            toggle_enabled: self.state.toggle_enabled(),
            toggle_icon,
            unlock_prompt: self.state.unlock_prompt,
            audio_unlocked: self.state.audio_unlocked,
        }
    }
}
