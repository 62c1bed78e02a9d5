//! Card rendering.
//!
//! ```text
//! ┌ orbit ───────────────── LIVE ┐
//! │ cover  https://…/large.png   │
//! │                              │
//! │ Song title                   │
//! │ Artist                       │
//! │ ⠋ loading                    │
//! │                              │
//! │          [ ❚❚ pause ]        │
//! │   Click anywhere for sound   │
//! └──────────────────────────────┘
//! ```

use orbit_proto::protocol::{DisplayState, PlayerMode, ToggleIcon, UNLOCK_PROMPT};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::App;
use crate::theme::{
    style_accent, style_border, style_default, style_muted, style_secondary, style_title,
    C_BADGE_LIVE, C_BADGE_PENDING, C_CONNECTING, C_MUTED, C_PLAYING, C_TAG,
};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const CARD_WIDTH: u16 = 52;
const CARD_HEIGHT: u16 = 11;

pub fn draw(f: &mut Frame, app: &mut App) {
    let area = f.area();
    let [card_row, log_row] = Layout::vertical([
        Constraint::Length(CARD_HEIGHT.min(area.height)),
        Constraint::Min(0),
    ])
    .areas(area);
    let [card] = Layout::horizontal([Constraint::Length(CARD_WIDTH.min(area.width))])
        .flex(ratatui::layout::Flex::Center)
        .areas(card_row);

    app.toggle_area = None;
    let spinner = SPINNER[app.spinner_frame % SPINNER.len()];

    let snapshot = if app.connected { app.display.clone() } else { None };
    match snapshot {
        Some(display) => app.toggle_area = draw_card(f, card, &display, spinner),
        None => draw_disconnected(f, card, &app.address, spinner),
    }

    if let Some(version) = app.protocol_mismatch {
        let warning = format!(" daemon protocol v{} differs from this widget", version);
        draw_logs(f, log_row, std::iter::once(warning.as_str()));
    } else {
        draw_logs(f, log_row, app.logs.iter().map(String::as_str));
    }
}

fn badge(mode: PlayerMode) -> Span<'static> {
    let color = match mode {
        PlayerMode::RemotePlaying => C_BADGE_LIVE,
        PlayerMode::AwaitingUnlock => C_BADGE_PENDING,
        PlayerMode::LocalPlaying => C_TAG,
        PlayerMode::LocalPaused => C_MUTED,
    };
    Span::styled(
        format!(" {} ", mode.badge_label()),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )
}

/// Draws the card and returns where the toggle button landed.
fn draw_card(f: &mut Frame, area: Rect, display: &DisplayState, spinner: &str) -> Option<Rect> {
    let block = Block::bordered()
        .border_style(style_border(display.mode != PlayerMode::AwaitingUnlock))
        .title(Line::from(Span::styled(" orbit ", style_accent())).left_aligned())
        .title(Line::from(badge(display.mode)).right_aligned());
    let inner = block.inner(area);
    f.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return None;
    }
    let text_width = inner.width.saturating_sub(2) as usize;

    let loading = if display.loading {
        Line::from(vec![
            Span::styled(format!("{} ", spinner), Style::default().fg(C_CONNECTING)),
            Span::styled("loading", style_muted()),
        ])
    } else {
        Line::default()
    };

    let lines = vec![
        Line::from(vec![
            Span::styled("cover  ", style_muted()),
            Span::styled(
                truncate(&display.cover_url, text_width.saturating_sub(7)),
                style_secondary(),
            ),
        ]),
        Line::default(),
        Line::from(Span::styled(truncate(&display.title, text_width), style_title())),
        Line::from(Span::styled(truncate(&display.artist, text_width), style_secondary())),
        loading,
    ];
    let body = Rect {
        x: inner.x + 1,
        width: inner.width.saturating_sub(2),
        ..inner
    };
    f.render_widget(Paragraph::new(lines), body);

    // Toggle button and prompt sit at fixed rows below the text.
    let toggle_row = inner.y + 6;
    let mut toggle_area = None;
    if toggle_row < inner.bottom() {
        let label = toggle_label(display.toggle_icon);
        let width = (label.width() as u16).min(inner.width);
        let rect = Rect {
            x: inner.x + (inner.width - width) / 2,
            y: toggle_row,
            width,
            height: 1,
        };
        let style = if display.toggle_enabled {
            Style::default().fg(C_PLAYING).add_modifier(Modifier::BOLD)
        } else {
            style_muted()
        };
        f.render_widget(Paragraph::new(Span::styled(label, style)), rect);
        toggle_area = Some(rect);
    }

    let prompt_row = inner.y + 7;
    if prompt_row < inner.bottom() {
        let rect = Rect {
            y: prompt_row,
            height: 1,
            ..inner
        };
        let line = if display.unlock_prompt || !display.audio_unlocked {
            Line::from(Span::styled(
                UNLOCK_PROMPT,
                style_accent().add_modifier(Modifier::BOLD),
            ))
        } else {
            Line::from(Span::styled("space play/pause · q quit", style_muted()))
        };
        f.render_widget(Paragraph::new(line).alignment(Alignment::Center), rect);
    }

    toggle_area
}

fn toggle_label(icon: ToggleIcon) -> &'static str {
    match icon {
        ToggleIcon::Play => "[ ▶ play ]",
        ToggleIcon::Pause => "[ ❚❚ pause ]",
    }
}

fn draw_disconnected(f: &mut Frame, area: Rect, address: &str, spinner: &str) {
    let block = Block::bordered()
        .border_style(style_border(false))
        .title(Line::from(Span::styled(" orbit ", style_accent())).left_aligned());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let lines = vec![
        Line::default(),
        Line::from(vec![
            Span::styled(format!("{} ", spinner), Style::default().fg(C_CONNECTING)),
            Span::styled("waiting for daemon", style_default()),
        ]),
        Line::from(Span::styled(address.to_string(), style_muted())),
    ];
    f.render_widget(Paragraph::new(lines).alignment(Alignment::Center), inner);
}

fn draw_logs<'a>(f: &mut Frame, area: Rect, lines: impl Iterator<Item = &'a str>) {
    if area.height == 0 {
        return;
    }
    let width = area.width as usize;
    let lines: Vec<Line> = lines
        .map(|l| Line::from(Span::styled(truncate(l, width), style_muted())))
        .collect();
    f.render_widget(Paragraph::new(lines), area);
}

/// Cut `s` to at most `max` terminal columns, marking the cut with `…`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.width() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in s.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}
