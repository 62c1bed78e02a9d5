//! Error taxonomy shared by the player core and its collaborators.
//!
//! None of these are fatal.  The state machine recovers from each one locally:
//! provider failures become `Unavailable`, blocked playback waits for the
//! unlock gesture, and load failures advance the playlist after a backoff.

/// Player errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlayerError {
    #[error("now-playing provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("playback blocked until the first user gesture")]
    PlaybackBlocked,

    #[error("failed to load {path}: {reason}")]
    TrackLoadFailure { path: String, reason: String },

    #[error("playlist must contain at least one track")]
    EmptyPlaylist,

    #[error("audio sink closed")]
    SinkClosed,
}
