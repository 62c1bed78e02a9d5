use serde::{Deserialize, Serialize};

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  The widget checks this on connect and can refuse to talk to
/// an incompatible daemon.
pub const PROTOCOL_VERSION: u32 = 1;

/// Title shown before the first poll has resolved.
pub const CHECKING_TITLE: &str = "Checking now playing...";
/// Artist line shown before the first poll has resolved.
pub const CHECKING_ARTIST: &str = "via Last.fm";
/// Title shown when nothing is playing remotely and local audio is still locked.
pub const NO_STATUS_TITLE: &str = "No status";
pub const NO_STATUS_ARTIST: &str = "Nothing playing right now";
/// Unlock prompt text.
pub const UNLOCK_PROMPT: &str = "Click anywhere for sound";
pub const UNKNOWN_TITLE: &str = "Unknown track";
pub const UNKNOWN_ARTIST: &str = "Unknown artist";

/// One entry of the local playlist.  Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Audio source handed to the audio sink (file path or URL).
    pub file: String,
    pub title: String,
    pub artist: String,
    /// Cover image reference (path or URL).
    #[serde(default)]
    pub cover: String,
}

/// Track metadata reported by the now-playing provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub title: String,
    pub artist: String,
}

/// Normalized provider payload.  Every field except `now_playing` may be
/// missing; placeholders are substituted when converting to `RemoteStatus`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub now_playing: bool,
    #[serde(default)]
    pub track_name: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
}

impl NowPlaying {
    pub fn into_status(self) -> RemoteStatus {
        if !self.now_playing {
            return RemoteStatus::Idle;
        }
        RemoteStatus::Playing {
            track: RemoteTrack {
                title: non_empty(self.track_name).unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
                artist: non_empty(self.artist_name)
                    .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            },
            cover_url: non_empty(self.cover_image_url),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Result of one poll of the now-playing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteStatus {
    Playing {
        track: RemoteTrack,
        cover_url: Option<String>,
    },
    Idle,
    Unavailable(String),
}

impl RemoteStatus {
    pub fn is_playing(&self) -> bool {
        matches!(self, RemoteStatus::Playing { .. })
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            RemoteStatus::Playing { .. } => "playing",
            RemoteStatus::Idle => "idle",
            RemoteStatus::Unavailable(_) => "unavailable",
        }
    }
}

/// Which source of truth currently owns the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerMode {
    #[default]
    AwaitingUnlock,
    RemotePlaying,
    LocalPlaying,
    LocalPaused,
}

impl PlayerMode {
    /// Short label for badges (≤6 chars).
    pub fn badge_label(&self) -> &'static str {
        match self {
            PlayerMode::AwaitingUnlock => "LOCKED",
            PlayerMode::RemotePlaying => "LIVE",
            PlayerMode::LocalPlaying => "LOCAL",
            PlayerMode::LocalPaused => "PAUSED",
        }
    }
}

/// Icon the play/pause control should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ToggleIcon {
    #[default]
    Play,
    Pause,
}

/// Everything the display surface needs to render the widget.  Produced as a
/// whole by the state machine after each transition; `rev` increases with
/// every update so clients can drop out-of-order snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    #[serde(default)]
    pub rev: u64,
    pub mode: PlayerMode,
    pub title: String,
    pub artist: String,
    pub cover_url: String,
    pub loading: bool,
    pub toggle_enabled: bool,
    pub toggle_icon: ToggleIcon,
    /// The unlock prompt is visible.
    pub unlock_prompt: bool,
    #[serde(default)]
    pub audio_unlocked: bool,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            rev: 0,
            mode: PlayerMode::AwaitingUnlock,
            title: CHECKING_TITLE.to_string(),
            artist: CHECKING_ARTIST.to_string(),
            cover_url: String::new(),
            loading: true,
            toggle_enabled: true,
            toggle_icon: ToggleIcon::Play,
            unlock_prompt: false,
            audio_unlocked: false,
        }
    }
}

/// Messages sent from a widget to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Any interaction with the widget surface; unlocks audio the first time.
    Gesture,
    /// The play/pause control.
    Toggle,
    GetState,
}

/// Messages sent from the daemon to widgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: daemon version + full display snapshot.
    Hello {
        protocol_version: u32,
        display: DisplayState,
    },
    Display {
        data: DisplayState,
    },
    Log {
        message: String,
    },
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Length of the first frame in `buf`, prefix included, once all of it
    /// has arrived.
    pub fn frame_len(buf: &[u8]) -> Option<usize> {
        if buf.len() < 4 {
            return None;
        }
        let len = 4 + u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        (buf.len() >= len).then_some(len)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frame_decodes_after_partial_read() {
        let encoded = Message::Command(Command::Toggle).encode().unwrap();
        assert!(Message::decode(&encoded[..encoded.len() - 1]).is_err());

        let (decoded, len) = Message::decode(&encoded).unwrap();
        assert_eq!(len, encoded.len());
        assert!(matches!(decoded, Message::Command(Command::Toggle)));
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(Message::frame_len(&[0, 0]), None);
        assert_eq!(Message::frame_len(&[0, 0, 0, 2, b'{']), None);
        assert_eq!(Message::frame_len(&[0, 0, 0, 2, b'{', b'}', 9]), Some(6));
    }

    #[test]
    fn test_hello_carries_display() {
        let display = DisplayState {
            rev: 7,
            title: "Song A".to_string(),
            ..Default::default()
        };
        let msg = Message::Broadcast(Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            display,
        });
        let encoded = msg.encode().unwrap();
        let (decoded, _) = Message::decode(&encoded).unwrap();
        match decoded {
            Message::Broadcast(Broadcast::Hello {
                protocol_version,
                display,
            }) => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(display.rev, 7);
                assert_eq!(display.title, "Song A");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_now_playing_substitutes_placeholders() {
        let status = NowPlaying {
            now_playing: true,
            track_name: Some("  ".to_string()),
            artist_name: None,
            cover_image_url: Some(String::new()),
        }
        .into_status();
        assert_eq!(
            status,
            RemoteStatus::Playing {
                track: RemoteTrack {
                    title: UNKNOWN_TITLE.to_string(),
                    artist: UNKNOWN_ARTIST.to_string(),
                },
                cover_url: None,
            }
        );
    }

    #[test]
    fn test_not_playing_is_idle() {
        let status = NowPlaying {
            now_playing: false,
            track_name: Some("Old song".to_string()),
            ..Default::default()
        }
        .into_status();
        assert_eq!(status, RemoteStatus::Idle);
    }
}
