//! Local playlist and its wrap-around sequencer.
//!
//! The playlist itself is immutable; the current index lives in `PlayerState`
//! and is moved only through `advance`.

use std::path::Path;

use crate::error::PlayerError;
use crate::protocol::Track;

#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Result<Self, PlayerError> {
        if tracks.is_empty() {
            return Err(PlayerError::EmptyPlaylist);
        }
        Ok(Self { tracks })
    }

    /// The three tracks shipped with the site.
    pub fn builtin() -> Self {
        let track = |file: &str, title: &str, artist: &str, cover: &str| Track {
            file: format!("assets/audio/{}", file),
            title: title.to_string(),
            artist: artist.to_string(),
            cover: format!("assets/images/{}", cover),
        };
        Self {
            tracks: vec![
                track("Maddy-Soma-OKE.mp4", "Oke", "Maddy Soma", "album-cover-oke.png"),
                track(
                    "Falling-In-Reverse-Prequel.mp4",
                    "Prequel",
                    "Falling In Reverse",
                    "album-cover-prequel.png",
                ),
                track(
                    "Godsmack-Bulletproof.mp4",
                    "Bulletproof",
                    "Godsmack",
                    "album-cover-bulletproof.png",
                ),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Track at `index`, wrapping out-of-range indices.
    pub fn current(&self, index: usize) -> &Track {
        &self.tracks[index % self.tracks.len()]
    }

    /// Index following `index`, wrapping to 0 after the last track.
    pub fn advance(&self, index: usize) -> usize {
        (index + 1) % self.tracks.len()
    }

    /// Random starting index, chosen once per session.
    pub fn random_start(&self) -> usize {
        use rand::Rng;
        rand::thread_rng().gen_range(0..self.tracks.len())
    }
}

// ── Loaders ──────────────────────────────────────────────────────────────────

/// Load a playlist file, choosing the format by extension (`.m3u`/`.m3u8`
/// are M3U, anything else is TOML).  Relative `file`/`cover` entries are
/// resolved against the playlist's directory.
pub fn load_playlist(path: &Path) -> anyhow::Result<Playlist> {
    let content = std::fs::read_to_string(path)?;
    let is_m3u = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("m3u") || e.eq_ignore_ascii_case("m3u8"))
        .unwrap_or(false);

    let mut tracks = if is_m3u {
        parse_m3u_from_str(&content)
    } else {
        parse_tracks_from_toml_str(&content)?
    };

    if let Some(base) = path.parent() {
        for track in &mut tracks {
            track.file = resolve(base, &track.file);
            if !track.cover.is_empty() {
                track.cover = resolve(base, &track.cover);
            }
        }
    }

    Ok(Playlist::new(tracks)?)
}

fn resolve(base: &Path, reference: &str) -> String {
    if reference.contains("://") || Path::new(reference).is_absolute() {
        reference.to_string()
    } else {
        base.join(reference).display().to_string()
    }
}

/// Intermediate struct that matches the TOML `[[track]]` table.
#[derive(Debug, serde::Deserialize)]
struct TomlPlaylistFile {
    #[serde(default)]
    track: Vec<TomlTrack>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlTrack {
    file: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    cover: String,
}

pub fn parse_tracks_from_toml_str(content: &str) -> anyhow::Result<Vec<Track>> {
    let file: TomlPlaylistFile = toml::from_str(content)?;
    let tracks = file
        .track
        .into_iter()
        .map(|t| {
            let title = if t.title.is_empty() {
                title_from_file(&t.file)
            } else {
                t.title
            };
            Track {
                file: t.file,
                title,
                artist: t.artist,
                cover: t.cover,
            }
        })
        .collect();
    Ok(tracks)
}

/// Parse an extended M3U playlist.  `#EXTINF:<secs>,Artist - Title` lines
/// name the entry that follows; entries without one are titled by file stem.
pub fn parse_m3u_from_str(content: &str) -> Vec<Track> {
    let mut tracks = Vec::new();
    let mut pending: Option<(String, String)> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            if let Some(comma_idx) = rest.find(',') {
                let label = rest[comma_idx + 1..].trim();
                pending = Some(match label.split_once(" - ") {
                    Some((artist, title)) => (title.trim().to_string(), artist.trim().to_string()),
                    None => (label.to_string(), String::new()),
                });
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let file = line.to_string();
        let (title, artist) = pending
            .take()
            .unwrap_or_else(|| (title_from_file(&file), String::new()));

        tracks.push(Track {
            file,
            title,
            artist,
            cover: String::new(),
        });
    }

    tracks
}

fn title_from_file(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file)
        .to_string()
}
