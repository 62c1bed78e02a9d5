//! Recording fakes for the audio and display sinks.

#![allow(dead_code)]

use std::time::Duration;

use orbit_proto::error::PlayerError;
use orbit_proto::machine::{MachineSettings, PlayerMachine};
use orbit_proto::playlist::Playlist;
use orbit_proto::protocol::{DisplayState, RemoteStatus, RemoteTrack};
use orbit_proto::sink::{AudioSink, DisplaySink};

pub const CUE: &str = "assets/audio/cue.mp4";
pub const PLACEHOLDER: &str = "assets/images/placeholder.gif";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load(String),
    Loop(bool),
    Play,
    Pause,
    Stop,
    Rewind,
    Unlock,
}

/// Single-stream audio fake.  With `gated` set it refuses `play` until
/// `unlock`, like a browser autoplay policy.
#[derive(Debug, Default)]
pub struct FakeAudio {
    pub calls: Vec<Call>,
    pub source: Option<String>,
    pub looped: bool,
    pub playing: bool,
    pub gated: bool,
    pub unlocked: bool,
}

impl AudioSink for FakeAudio {
    fn load(&mut self, source: &str) {
        self.calls.push(Call::Load(source.to_string()));
        self.source = Some(source.to_string());
        self.playing = false;
    }

    fn set_loop(&mut self, looped: bool) {
        self.calls.push(Call::Loop(looped));
        self.looped = looped;
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.calls.push(Call::Play);
        if self.gated && !self.unlocked {
            return Err(PlayerError::PlaybackBlocked);
        }
        if self.source.is_none() {
            return Err(PlayerError::SinkClosed);
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.calls.push(Call::Pause);
        self.playing = false;
    }

    fn stop(&mut self) {
        self.calls.push(Call::Stop);
        self.playing = false;
        self.source = None;
    }

    fn rewind(&mut self) {
        self.calls.push(Call::Rewind);
    }

    fn unlock(&mut self) {
        self.calls.push(Call::Unlock);
        self.unlocked = true;
    }
}

#[derive(Debug, Default)]
pub struct FakeDisplay {
    pub updates: Vec<DisplayState>,
}

impl DisplaySink for FakeDisplay {
    fn apply(&mut self, display: &DisplayState) {
        self.updates.push(display.clone());
    }
}

pub type TestMachine = PlayerMachine<FakeAudio, FakeDisplay>;

pub fn settings() -> MachineSettings {
    MachineSettings {
        ambient_cue: CUE.to_string(),
        retry_delay: Duration::from_secs(2),
        placeholder_cover: PLACEHOLDER.to_string(),
    }
}

pub fn machine_at(start_index: usize) -> TestMachine {
    PlayerMachine::new(
        Playlist::builtin(),
        start_index,
        settings(),
        FakeAudio::default(),
        FakeDisplay::default(),
    )
}

pub fn gated_machine_at(start_index: usize) -> TestMachine {
    let audio = FakeAudio {
        gated: true,
        ..Default::default()
    };
    PlayerMachine::new(
        Playlist::builtin(),
        start_index,
        settings(),
        audio,
        FakeDisplay::default(),
    )
}

pub fn playing(title: &str, artist: &str) -> RemoteStatus {
    RemoteStatus::Playing {
        track: RemoteTrack {
            title: title.to_string(),
            artist: artist.to_string(),
        },
        cover_url: Some(format!("https://covers.example/{}.png", title)),
    }
}
