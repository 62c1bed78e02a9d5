//! App: widget state and event loop.
//!
//! Terminal input is read on a blocking task and forwarded as
//! `AppMessage::Event`; the connection task forwards daemon broadcasts.  The
//! loop redraws after every message and sends commands out through `cmd_tx`.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use orbit_proto::protocol::{Broadcast, Command, DisplayState, PROTOCOL_VERSION};
use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ui;

const MAX_LOG_LINES: usize = 5;

#[derive(Debug)]
pub enum AppMessage {
    Event(Event),
    Connected,
    Disconnected,
    Daemon(Broadcast),
}

/// What a key press means in the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Quit,
    Send(Command),
    Ignore,
}

/// Until audio is unlocked every key is the unlock gesture.  Afterwards only
/// the toggle keys do anything, and only while the control is enabled.
pub fn key_action(display: Option<&DisplayState>, key: KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::Ignore;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return KeyAction::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            return KeyAction::Quit
        }
        _ => {}
    }

    let Some(display) = display else {
        return KeyAction::Ignore;
    };
    if !display.audio_unlocked {
        return KeyAction::Send(Command::Gesture);
    }
    match key.code {
        KeyCode::Char(' ') | KeyCode::Enter | KeyCode::Char('p') if display.toggle_enabled => {
            KeyAction::Send(Command::Toggle)
        }
        _ => KeyAction::Ignore,
    }
}

pub struct App {
    pub address: String,
    pub display: Option<DisplayState>,
    pub connected: bool,
    /// Daemon protocol version when it differs from ours.
    pub protocol_mismatch: Option<u32>,
    pub logs: VecDeque<String>,
    pub spinner_frame: usize,
    /// Where the toggle button was last drawn, for mouse hits.
    pub toggle_area: Option<Rect>,
    should_quit: bool,
    cmd_tx: mpsc::Sender<Command>,
}

impl App {
    pub fn new(address: String, cmd_tx: mpsc::Sender<Command>) -> Self {
        Self {
            address,
            display: None,
            connected: false,
            protocol_mismatch: None,
            logs: VecDeque::with_capacity(MAX_LOG_LINES),
            spinner_frame: 0,
            toggle_area: None,
            should_quit: false,
            cmd_tx,
        }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<AppMessage>, tx: mpsc::Sender<AppMessage>) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // ── Background task: keyboard/mouse events ────────────────────────────
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // Spinner animation while loading
        let mut spinner_tick = tokio::time::interval(Duration::from_millis(100));
        spinner_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| ui::draw(f, &mut self))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        self.handle_message(msg).await;
                        needs_redraw = true;
                    }
                    None => break,
                },

                _ = spinner_tick.tick() => {
                    if self.display.as_ref().is_some_and(|d| d.loading) || !self.connected {
                        self.spinner_frame = self.spinner_frame.wrapping_add(1);
                        needs_redraw = true;
                    }
                }
            }
        }

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        Ok(())
    }

    async fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Event(Event::Key(key)) => match key_action(self.display.as_ref(), key) {
                KeyAction::Quit => self.should_quit = true,
                KeyAction::Send(cmd) => self.send(cmd).await,
                KeyAction::Ignore => {}
            },
            AppMessage::Event(Event::Mouse(mouse)) => {
                if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
                    self.handle_click(mouse.column, mouse.row).await;
                }
            }
            AppMessage::Event(_) => {}
            AppMessage::Connected => {
                self.connected = true;
                self.push_log(format!("connected to {}", self.address));
            }
            AppMessage::Disconnected => {
                self.connected = false;
                self.push_log("daemon disconnected".to_string());
            }
            AppMessage::Daemon(broadcast) => self.apply_broadcast(broadcast),
        }
    }

    async fn handle_click(&mut self, column: u16, row: u16) {
        let Some(display) = self.display.as_ref() else {
            return;
        };
        if !display.audio_unlocked {
            self.send(Command::Gesture).await;
            return;
        }
        let on_toggle = self
            .toggle_area
            .is_some_and(|area| area.contains((column, row).into()));
        if on_toggle && display.toggle_enabled {
            self.send(Command::Toggle).await;
        }
    }

    pub fn apply_broadcast(&mut self, broadcast: Broadcast) {
        match broadcast {
            Broadcast::Hello {
                protocol_version,
                display,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    warn!(
                        "daemon speaks protocol {}, expected {}",
                        protocol_version, PROTOCOL_VERSION
                    );
                    self.protocol_mismatch = Some(protocol_version);
                } else {
                    self.protocol_mismatch = None;
                }
                let rev = display.rev;
                info!("hello from daemon, rev {}", rev);
                self.display = Some(display);
            }
            Broadcast::Display { data } => {
                // Replies and broadcasts can cross; never go backwards.
                let stale = self.display.as_ref().is_some_and(|d| data.rev < d.rev);
                if stale {
                    debug!("dropping stale display rev {}", data.rev);
                } else {
                    self.display = Some(data);
                }
            }
            Broadcast::Log { message } => self.push_log(message),
        }
    }

    fn push_log(&mut self, line: String) {
        if self.logs.len() == MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    async fn send(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).await.is_err() {
            warn!("connection task gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_proto::protocol::PlayerMode;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn unlocked(mode: PlayerMode) -> DisplayState {
        DisplayState {
            mode,
            audio_unlocked: true,
            toggle_enabled: mode != PlayerMode::RemotePlaying,
            ..Default::default()
        }
    }

    #[test]
    fn test_any_key_unlocks_first() {
        let locked = DisplayState::default();
        assert_eq!(
            key_action(Some(&locked), press(KeyCode::Char('x'))),
            KeyAction::Send(Command::Gesture)
        );
        assert_eq!(
            key_action(Some(&locked), press(KeyCode::Char(' '))),
            KeyAction::Send(Command::Gesture)
        );
        assert_eq!(key_action(Some(&locked), press(KeyCode::Esc)), KeyAction::Quit);
        assert_eq!(key_action(None, press(KeyCode::Char('x'))), KeyAction::Ignore);
    }

    #[test]
    fn test_toggle_keys_after_unlock() {
        let local = unlocked(PlayerMode::LocalPlaying);
        for code in [KeyCode::Char(' '), KeyCode::Enter, KeyCode::Char('p')] {
            assert_eq!(key_action(Some(&local), press(code)), KeyAction::Send(Command::Toggle));
        }
        assert_eq!(key_action(Some(&local), press(KeyCode::Char('x'))), KeyAction::Ignore);
    }

    #[test]
    fn test_toggle_disabled_while_remote() {
        let remote = unlocked(PlayerMode::RemotePlaying);
        assert_eq!(key_action(Some(&remote), press(KeyCode::Char(' '))), KeyAction::Ignore);
    }

    #[test]
    fn test_stale_display_is_dropped() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(1);
        let mut app = App::new("127.0.0.1:9877".to_string(), cmd_tx);

        let newer = DisplayState {
            rev: 5,
            title: "Oke".to_string(),
            ..Default::default()
        };
        let older = DisplayState {
            rev: 4,
            title: "Prequel".to_string(),
            ..Default::default()
        };
        app.apply_broadcast(Broadcast::Display { data: newer });
        app.apply_broadcast(Broadcast::Display { data: older });
        assert_eq!(app.display.as_ref().map(|d| d.title.as_str()), Some("Oke"));

        app.apply_broadcast(Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION + 1,
            display: DisplayState::default(),
        });
        assert_eq!(app.protocol_mismatch, Some(PROTOCOL_VERSION + 1));
        assert_eq!(app.display.as_ref().map(|d| d.rev), Some(0));
    }
}
