//! Now-playing lookup against Last.fm `user.getrecenttracks`.
//!
//! The provider either calls the Last.fm API directly (when both `api_key`
//! and `user` are configured) or fetches a relay endpoint that returns the
//! same `recenttracks` JSON, which keeps the key off the machine.

use std::time::Duration;

use async_trait::async_trait;
use orbit_proto::config::ProviderConfig;
use orbit_proto::error::PlayerError;
use orbit_proto::protocol::NowPlaying;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const LASTFM_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

#[async_trait]
pub trait NowPlayingProvider: Send + Sync {
    /// One lookup.  Transport, status, and parse failures all come back as
    /// errors; the caller treats them as "unavailable".
    async fn fetch(&self) -> anyhow::Result<NowPlaying>;

    fn describe(&self) -> String;
}

enum Source {
    Relay(String),
    Direct { api_key: String, user: String },
}

pub struct LastFmProvider {
    client: Client,
    source: Source,
}

impl LastFmProvider {
    pub fn from_config(config: &ProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("orbit/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let source = match (&config.api_key, &config.user) {
            (Some(api_key), Some(user)) if !api_key.is_empty() && !user.is_empty() => {
                Source::Direct {
                    api_key: api_key.clone(),
                    user: user.clone(),
                }
            }
            _ => Source::Relay(config.endpoint.clone()),
        };

        Ok(Self { client, source })
    }
}

#[async_trait]
impl NowPlayingProvider for LastFmProvider {
    async fn fetch(&self) -> anyhow::Result<NowPlaying> {
        let request = match &self.source {
            Source::Relay(url) => self.client.get(url),
            Source::Direct { api_key, user } => self.client.get(LASTFM_API_URL).query(&[
                ("method", "user.getrecenttracks"),
                ("user", user.as_str()),
                ("api_key", api_key.as_str()),
                ("format", "json"),
                ("limit", "1"),
            ]),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlayerError::ProviderUnavailable(format!("HTTP {}", status)).into());
        }

        let body = response.text().await?;
        let now_playing = parse_recent_tracks(&body)?;
        debug!("provider: {:?}", now_playing);
        Ok(now_playing)
    }

    fn describe(&self) -> String {
        match &self.source {
            Source::Relay(url) => format!("relay {}", url),
            Source::Direct { user, .. } => format!("last.fm user {}", user),
        }
    }
}

// ── recenttracks JSON ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RecentTracksResponse {
    recenttracks: Option<RecentTracks>,
    error: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    #[serde(default)]
    track: OneOrMany<LfmTrack>,
}

/// Last.fm collapses a single-element list into a bare object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::Many(items) => items.into_iter().next(),
            OneOrMany::One(item) => Some(item),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LfmTrack {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    artist: Option<LfmArtist>,
    #[serde(default)]
    image: Vec<LfmImage>,
    #[serde(rename = "@attr", default)]
    attr: Option<LfmAttr>,
}

#[derive(Debug, Deserialize)]
struct LfmArtist {
    #[serde(rename = "#text", default)]
    text: Option<String>,
    /// Present instead of `#text` in extended responses.
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LfmImage {
    #[serde(default)]
    size: String,
    #[serde(rename = "#text", default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct LfmAttr {
    #[serde(default)]
    nowplaying: Option<String>,
}

/// Normalize a `recenttracks` body.  Only the most recent track is looked
/// at, and it counts as playing only when flagged `nowplaying="true"`.
pub fn parse_recent_tracks(body: &str) -> anyhow::Result<NowPlaying> {
    let response: RecentTracksResponse = serde_json::from_str(body)?;

    if let Some(code) = response.error {
        let message = response.message.unwrap_or_default();
        return Err(PlayerError::ProviderUnavailable(format!(
            "last.fm error {}: {}",
            code, message
        ))
        .into());
    }

    let recent = response.recenttracks.ok_or_else(|| {
        PlayerError::ProviderUnavailable("response has no recenttracks".to_string())
    })?;

    let track = match recent.track.into_first() {
        Some(track) => track,
        None => return Ok(NowPlaying::default()),
    };

    let now_playing = track
        .attr
        .as_ref()
        .and_then(|a| a.nowplaying.as_deref())
        .map(|flag| flag == "true")
        .unwrap_or(false);
    if !now_playing {
        return Ok(NowPlaying::default());
    }

    let cover_image_url = track
        .image
        .iter()
        .find(|img| img.size == "large" && !img.url.is_empty())
        .or_else(|| track.image.iter().rev().find(|img| !img.url.is_empty()))
        .map(|img| img.url.clone());

    Ok(NowPlaying {
        now_playing: true,
        track_name: track.name,
        artist_name: track.artist.and_then(|a| a.text.or(a.name)),
        cover_image_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYING: &str = r##"{
        "recenttracks": {
            "track": [{
                "artist": {"mbid": "", "#text": "Deftones"},
                "name": "Change",
                "image": [
                    {"size": "small", "#text": "https://img.example/s.png"},
                    {"size": "large", "#text": "https://img.example/l.png"},
                    {"size": "extralarge", "#text": "https://img.example/xl.png"}
                ],
                "@attr": {"nowplaying": "true"}
            }, {
                "artist": {"#text": "Older"},
                "name": "Scrobbled",
                "date": {"uts": "1700000000"}
            }],
            "@attr": {"user": "someone", "total": "2"}
        }
    }"##;

    #[test]
    fn test_parse_now_playing() {
        let np = parse_recent_tracks(PLAYING).unwrap();
        assert!(np.now_playing);
        assert_eq!(np.track_name.as_deref(), Some("Change"));
        assert_eq!(np.artist_name.as_deref(), Some("Deftones"));
        assert_eq!(np.cover_image_url.as_deref(), Some("https://img.example/l.png"));
    }

    #[test]
    fn test_last_scrobble_is_not_playing() {
        let body = r##"{"recenttracks": {"track": [
            {"artist": {"#text": "A"}, "name": "B", "date": {"uts": "1"}}
        ]}}"##;
        assert_eq!(parse_recent_tracks(body).unwrap(), NowPlaying::default());
    }

    #[test]
    fn test_single_track_object_and_missing_fields() {
        let body = r##"{"recenttracks": {"track":
            {"name": "", "image": [{"size": "large", "#text": ""},
                                   {"size": "medium", "#text": "https://img.example/m.png"}],
             "@attr": {"nowplaying": "true"}}
        }}"##;
        let np = parse_recent_tracks(body).unwrap();
        assert!(np.now_playing);
        assert_eq!(np.artist_name, None);
        assert_eq!(np.cover_image_url.as_deref(), Some("https://img.example/m.png"));

        let status = np.into_status();
        assert!(status.is_playing());
    }

    #[test]
    fn test_empty_history_is_idle() {
        let body = r#"{"recenttracks": {"track": []}}"#;
        assert!(!parse_recent_tracks(body).unwrap().now_playing);
    }

    #[test]
    fn test_error_bodies() {
        let err = parse_recent_tracks(r#"{"error": 6, "message": "User not found"}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("User not found"));

        assert!(parse_recent_tracks(r#"{"something": "else"}"#).is_err());
        assert!(parse_recent_tracks("<html>bad gateway</html>").is_err());
    }
}
