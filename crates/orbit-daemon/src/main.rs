mod audio;
mod core;
mod display;
mod http;
mod mpv;
mod provider;
mod socket;

use std::sync::Arc;
use std::time::{Duration, Instant};

use orbit_proto::config::Config;
use orbit_proto::machine::{MachineSettings, PlayerMachine};
use orbit_proto::playlist::{load_playlist, Playlist};
use orbit_proto::poll::PollScheduler;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// A fetch still outstanding after this long is abandoned.
const MAX_POLL_IN_FLIGHT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    DisplayUpdated,
    Log(String),
}

/// A custom tracing layer that forwards log messages to the broadcast channel
struct BroadcastLayer {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastLayer {
    fn new(sender: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        // Only WARN and ERROR reach widgets
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = String::new();
        let now = chrono::Local::now();
        message.push_str(&format!("{} ", now.format("%H:%M:%S")));
        message.push_str(&format!("[{}] ", level));

        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // No receivers is OK
        let _ = self.sender.send(BroadcastMessage::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

fn load_local_playlist(config: &Config) -> Playlist {
    let path = &config.playlist.path;
    if !path.exists() {
        info!("No playlist at {:?}, using built-in tracks", path);
        return Playlist::builtin();
    }
    match load_playlist(path) {
        Ok(playlist) => {
            info!("Loaded {} tracks from {:?}", playlist.len(), path);
            playlist
        }
        Err(e) => {
            warn!("Failed to load playlist {:?}: {}; using built-in tracks", path, e);
            Playlist::builtin()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Broadcast channel first so logging can feed it
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    let data_dir = orbit_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    let broadcast_layer = BroadcastLayer::new(broadcast_tx.clone());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(broadcast_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,orbit_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let playlist = load_local_playlist(&config);
    let start_index = playlist.random_start();

    // Event channel: all external inputs funnel into PlayerCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::CoreEvent>(256);
    let shutdown = CancellationToken::new();

    let (audio_sink, audio_task) = audio::spawn(
        config.playback.volume,
        config.playback.require_gesture,
        event_tx.clone(),
    );
    let (display, display_rx) = display::ChannelDisplay::new(broadcast_tx.clone());

    let settings = MachineSettings {
        ambient_cue: config.playback.ambient_cue.clone(),
        retry_delay: config.playback.retry_delay(),
        placeholder_cover: config.provider.placeholder_cover.clone(),
    };
    let machine = PlayerMachine::new(playlist, start_index, settings, audio_sink, display);

    let scheduler = PollScheduler::new(
        config.poll.cadence(),
        config.poll.cache_ttl(),
        config.poll.unlock_timeout(),
        MAX_POLL_IN_FLIGHT,
        Instant::now(),
    );
    let provider = Arc::new(provider::LastFmProvider::from_config(&config.provider)?);

    let _socket_handle = socket::start_server(
        config.socket.bind_address.clone(),
        config.socket.port,
        display_rx.clone(),
        event_tx.clone(),
        broadcast_tx.clone(),
        shutdown.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            display_rx.clone(),
            event_tx.clone(),
            shutdown.clone(),
        );
    }

    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
        }
        ctrl_c_token.cancel();
    });

    info!("Daemon initialised, running event loop");
    let player_core = core::PlayerCore::new(machine, scheduler, provider, event_tx);
    player_core.run(event_rx, shutdown).await?;

    // Dropping the core dropped the sink; the worker stops mpv on its way out.
    if tokio::time::timeout(Duration::from_secs(2), audio_task).await.is_err() {
        warn!("Audio worker did not exit in time");
    }

    Ok(())
}
