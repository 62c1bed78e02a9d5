//! mpv-backed `AudioSink`.
//!
//! `MpvSink` is the synchronous face the state machine talks to; every call
//! becomes an `AudioRequest` on an unbounded channel.  `AudioWorker` drains
//! that channel in order, owns the mpv process, and turns mpv's `file-loaded`
//! and `end-file` events back into `AudioEvent`s for the core loop.

use orbit_proto::error::PlayerError;
use orbit_proto::sink::{AudioEvent, AudioSink};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::CoreEvent;
use crate::mpv::{MpvDriver, MpvEvent, MpvHandle};

#[derive(Debug, Clone, PartialEq)]
enum AudioRequest {
    Load(String),
    SetLoop(bool),
    Play,
    Pause,
    Stop,
    Rewind,
}

pub struct MpvSink {
    tx: mpsc::UnboundedSender<AudioRequest>,
    /// Refuse `play` until `unlock`, like gesture-gated autoplay.
    require_gesture: bool,
    unlocked: bool,
}

impl MpvSink {
    fn send(&self, request: AudioRequest) {
        if self.tx.send(request).is_err() {
            warn!("audio: worker gone, command dropped");
        }
    }
}

impl AudioSink for MpvSink {
    fn load(&mut self, source: &str) {
        self.send(AudioRequest::Load(source.to_string()));
    }

    fn set_loop(&mut self, looped: bool) {
        self.send(AudioRequest::SetLoop(looped));
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        if self.require_gesture && !self.unlocked {
            return Err(PlayerError::PlaybackBlocked);
        }
        self.tx
            .send(AudioRequest::Play)
            .map_err(|_| PlayerError::SinkClosed)
    }

    fn pause(&mut self) {
        self.send(AudioRequest::Pause);
    }

    fn stop(&mut self) {
        self.send(AudioRequest::Stop);
    }

    fn rewind(&mut self) {
        self.send(AudioRequest::Rewind);
    }

    fn unlock(&mut self) {
        self.unlocked = true;
    }
}

/// Start the audio worker.  mpv itself is spawned lazily on the first load.
pub fn spawn(
    volume: f32,
    require_gesture: bool,
    core_tx: mpsc::Sender<CoreEvent>,
) -> (MpvSink, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (mpv_event_tx, mpv_event_rx) = mpsc::channel(64);

    let worker = AudioWorker {
        driver: MpvDriver::new(volume),
        handle: None,
        mpv_event_tx,
        core_tx,
        current_entry: None,
    };
    let task = tokio::spawn(worker.run(rx, mpv_event_rx));

    let sink = MpvSink {
        tx,
        require_gesture,
        unlocked: false,
    };
    (sink, task)
}

struct AudioWorker {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    mpv_event_tx: mpsc::Sender<MpvEvent>,
    core_tx: mpsc::Sender<CoreEvent>,
    /// Playlist entry of the last successful load; `end-file` for any other
    /// entry belongs to a replaced source.
    current_entry: Option<u64>,
}

impl AudioWorker {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<AudioRequest>,
        mut mpv_events: mpsc::Receiver<MpvEvent>,
    ) {
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                Some(evt) = mpv_events.recv() => self.handle_mpv_event(evt).await,
            }
        }
        info!("audio: sink dropped, stopping mpv");
        self.driver.kill().await;
    }

    async fn connected(&mut self) -> anyhow::Result<MpvHandle> {
        if let Some(handle) = &self.handle {
            if self.driver.process_alive() {
                return Ok(handle.clone());
            }
            warn!("audio: mpv process died, respawning");
        }
        self.handle = None;
        self.current_entry = None;
        let handle = self.driver.spawn_and_connect(self.mpv_event_tx.clone()).await?;
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    async fn handle_request(&mut self, request: AudioRequest) {
        debug!("audio: {:?}", request);

        if let AudioRequest::Load(path) = request {
            self.load(path).await;
            return;
        }

        // Without a live mpv there is nothing to control; the failed load
        // has already been reported.
        let Some(handle) = self.handle.clone() else {
            return;
        };
        let result = match request {
            AudioRequest::SetLoop(looped) => handle.set_loop_file(looped).await,
            AudioRequest::Play => handle.set_pause(false).await,
            AudioRequest::Pause => handle.set_pause(true).await,
            AudioRequest::Stop => {
                self.current_entry = None;
                handle.stop().await
            }
            AudioRequest::Rewind => handle.seek_start().await,
            AudioRequest::Load(_) => Ok(()),
        };
        if let Err(e) = result {
            debug!("audio: mpv command failed: {}", e);
        }
    }

    async fn load(&mut self, path: String) {
        let handle = match self.connected().await {
            Ok(handle) => handle,
            Err(e) => {
                self.report_failure(&path, e.to_string()).await;
                return;
            }
        };

        // Loaded paused; the machine follows up with an explicit play.
        if let Err(e) = handle.set_pause(true).await {
            debug!("audio: pause before load failed: {}", e);
        }
        match handle.load_file(&path).await {
            Ok(entry) => self.current_entry = entry,
            Err(e) => self.report_failure(&path, e.to_string()).await,
        }
    }

    async fn handle_mpv_event(&mut self, evt: MpvEvent) {
        match evt.event_name() {
            Some("file-loaded") => self.report(AudioEvent::Started).await,
            Some("end-file") => {
                if let (Some(entry), Some(current)) = (evt.playlist_entry_id(), self.current_entry) {
                    if entry != current {
                        debug!("audio: end-file for replaced entry {} ignored", entry);
                        return;
                    }
                }
                match evt.end_reason() {
                    Some("eof") => self.report(AudioEvent::Ended).await,
                    Some("error") => {
                        let reason = evt.file_error().unwrap_or("playback error").to_string();
                        self.report(AudioEvent::Error(reason)).await;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    async fn report_failure(&self, path: &str, reason: String) {
        let err = PlayerError::TrackLoadFailure {
            path: path.to_string(),
            reason,
        };
        warn!("audio: {}", err);
        self.report(AudioEvent::Error(err.to_string())).await;
    }

    async fn report(&self, event: AudioEvent) {
        if self.core_tx.send(CoreEvent::Audio(event)).await.is_err() {
            debug!("audio: core loop gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(require_gesture: bool) -> (MpvSink, mpsc::UnboundedReceiver<AudioRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = MpvSink {
            tx,
            require_gesture,
            unlocked: false,
        };
        (sink, rx)
    }

    #[test]
    fn test_play_is_gated_until_unlock() {
        let (mut sink, mut rx) = sink(true);
        sink.load("a.mp3");
        assert_eq!(sink.play(), Err(PlayerError::PlaybackBlocked));

        sink.unlock();
        assert_eq!(sink.play(), Ok(()));

        assert_eq!(rx.try_recv().unwrap(), AudioRequest::Load("a.mp3".to_string()));
        assert_eq!(rx.try_recv().unwrap(), AudioRequest::Play);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ungated_sink_plays_immediately() {
        let (mut sink, mut rx) = sink(false);
        assert_eq!(sink.play(), Ok(()));
        assert_eq!(rx.try_recv().unwrap(), AudioRequest::Play);
    }

    #[test]
    fn test_play_after_worker_exit_reports_closed() {
        let (mut sink, rx) = sink(false);
        drop(rx);
        assert_eq!(sink.play(), Err(PlayerError::SinkClosed));
        sink.stop();
    }
}
