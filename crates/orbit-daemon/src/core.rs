/// PlayerCore: single-owner event loop for the player.
///
/// Owns the `PlayerMachine` and the `PollScheduler` exclusively.  Client
/// commands, poll completions, and audio notifications arrive on one `mpsc`
/// channel; the poll interval, cadence switch, unlock timeout, and retry
/// delay are arms of the same `select!`, so no two transitions ever overlap.
///
/// Provider fetches run in spawned tasks and come back as `PollCompleted`
/// with the ticket they were issued under.
use std::sync::Arc;
use std::time::Instant;

use orbit_proto::machine::PlayerMachine;
use orbit_proto::poll::{PollDecision, PollScheduler, PollTicket};
use orbit_proto::protocol::{Command, RemoteStatus};
use orbit_proto::sink::AudioEvent;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audio::MpvSink;
use crate::display::ChannelDisplay;
use crate::provider::NowPlayingProvider;

// ── CoreEvent ─────────────────────────────────────────────────────────────────

/// All inputs into the PlayerCore loop besides its own timers.
#[derive(Debug)]
pub enum CoreEvent {
    /// A command from a widget or the HTTP API.
    ClientCommand(Command),
    PollCompleted {
        ticket: PollTicket,
        result: Result<RemoteStatus, String>,
    },
    Audio(AudioEvent),
}

// ── PlayerCore ────────────────────────────────────────────────────────────────

pub struct PlayerCore {
    machine: PlayerMachine<MpvSink, ChannelDisplay>,
    scheduler: PollScheduler,
    provider: Arc<dyn NowPlayingProvider>,
    /// Handed to fetch tasks so they can report back.
    event_tx: mpsc::Sender<CoreEvent>,
    /// Token and due time of the pending local retry, if any.
    retry: Option<(u64, Instant)>,
}

impl PlayerCore {
    pub fn new(
        machine: PlayerMachine<MpvSink, ChannelDisplay>,
        scheduler: PollScheduler,
        provider: Arc<dyn NowPlayingProvider>,
        event_tx: mpsc::Sender<CoreEvent>,
    ) -> Self {
        Self {
            machine,
            scheduler,
            provider,
            event_tx,
            retry: None,
        }
    }

    /// Run until `shutdown` is cancelled or every event sender is gone.
    pub async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<CoreEvent>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        info!(
            "PlayerCore: starting, polling {} ({})",
            self.provider.describe(),
            self.scheduler.cadence().describe()
        );

        // First tick fires immediately: the initial poll happens at startup.
        let mut poll_timer = tokio::time::interval(self.scheduler.interval(Instant::now()));
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let switch_at = self.scheduler.cadence_switch_at();
            let unlock_at = self.scheduler.unlock_deadline();
            let retry_at = self.retry.map(|(_, due)| due);

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("PlayerCore: shutdown requested");
                    break;
                }

                _ = poll_timer.tick() => self.poll(Instant::now()),

                _ = sleep_until(switch_at) => {
                    if let Some(interval) = self.scheduler.enter_steady() {
                        info!("PlayerCore: warm-up over, polling every {}s", interval.as_secs());
                        let start = tokio::time::Instant::now() + interval;
                        poll_timer = tokio::time::interval_at(start, interval);
                        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    }
                }

                _ = sleep_until(unlock_at) => {
                    if self.scheduler.take_unlock_timeout(Instant::now()) {
                        self.machine.on_unlock_timeout();
                    }
                }

                _ = sleep_until(retry_at) => {
                    if let Some((token, _)) = self.retry.take() {
                        self.machine.on_retry_due(token);
                    }
                }

                evt = event_rx.recv() => match evt {
                    Some(evt) => self.handle_event(evt),
                    None => {
                        info!("PlayerCore: event channel closed, shutting down");
                        break;
                    }
                },
            }

            if let Some(request) = self.machine.take_scheduled_retry() {
                debug!(
                    "PlayerCore: retry {} in {}ms",
                    request.token,
                    request.delay.as_millis()
                );
                self.retry = Some((request.token, Instant::now() + request.delay));
            }
        }

        self.machine.shutdown();
        Ok(())
    }

    fn handle_event(&mut self, evt: CoreEvent) {
        match evt {
            CoreEvent::ClientCommand(Command::Gesture) => {
                self.scheduler.cancel_unlock_timeout();
                self.machine.on_user_gesture();
            }
            CoreEvent::ClientCommand(Command::Toggle) => self.machine.on_toggle_pressed(),
            CoreEvent::ClientCommand(Command::GetState) => {}
            CoreEvent::PollCompleted { ticket, result } => {
                let now = Instant::now();
                if let Some(status) = self.scheduler.complete(ticket, result, now) {
                    debug!("PlayerCore: poll {} -> {}", ticket.id(), status.label());
                    self.machine.on_poll_result(status, now);
                }
            }
            CoreEvent::Audio(event) => self.machine.on_audio_event(event),
        }
    }

    fn poll(&mut self, now: Instant) {
        match self.scheduler.request(now) {
            PollDecision::Cached(status) => {
                debug!("PlayerCore: poll served from cache ({})", status.label());
                self.machine.on_poll_result(status, now);
            }
            PollDecision::InFlight => debug!("PlayerCore: poll skipped, fetch in flight"),
            PollDecision::Fetch(ticket) => {
                let provider = Arc::clone(&self.provider);
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let result = provider
                        .fetch()
                        .await
                        .map(|np| np.into_status())
                        .map_err(|e| e.to_string());
                    let _ = tx.send(CoreEvent::PollCompleted { ticket, result }).await;
                });
            }
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
