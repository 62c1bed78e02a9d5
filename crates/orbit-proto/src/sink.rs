//! Output seams of the player: one audio stream and one display surface.
//!
//! The state machine is the only caller of either.  Completion, error, and
//! start notifications from the audio side travel back as events rather than
//! return values, since real backends report them asynchronously.

use crate::error::PlayerError;
use crate::protocol::DisplayState;

pub trait AudioSink {
    /// Replace the current source.  Playback does not start until `play`.
    fn load(&mut self, source: &str);
    fn set_loop(&mut self, looped: bool);
    /// Start or resume.  Fails with `PlaybackBlocked` before the unlock gesture.
    fn play(&mut self) -> Result<(), PlayerError>;
    fn pause(&mut self);
    fn stop(&mut self);
    /// Seek back to the start of the current source.
    fn rewind(&mut self);
    /// The first user gesture happened; later `play` calls may succeed.
    fn unlock(&mut self) {}
}

pub trait DisplaySink {
    fn apply(&mut self, display: &DisplayState);
}

/// Audio notifications fed back into the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    Started,
    Ended,
    Error(String),
}
