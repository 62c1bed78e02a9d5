mod common;

use std::time::{Duration, Instant};

use common::*;
use orbit_proto::machine::RetryRequest;
use orbit_proto::poll::{Cadence, PollDecision, PollScheduler};
use orbit_proto::protocol::{
    PlayerMode, RemoteStatus, ToggleIcon, NO_STATUS_TITLE, UNLOCK_PROMPT,
};
use rand::{Rng, SeedableRng};

fn scheduler(t0: Instant) -> PollScheduler {
    PollScheduler::new(
        Cadence::TwoPhase {
            warmup: Duration::from_secs(30),
            warmup_interval: Duration::from_secs(5),
            steady_interval: Duration::from_secs(30),
        },
        Duration::from_secs(5),
        Duration::from_secs(5),
        Duration::from_secs(10),
        t0,
    )
}

#[test]
fn remote_track_on_load_shows_metadata_and_loops_cue() {
    let t0 = Instant::now();
    let mut m = machine_at(0);

    m.on_poll_result(playing("Song A", "Artist A"), t0 + Duration::from_secs(1));

    let shown = m.snapshot();
    assert_eq!(shown.title, "Song A");
    assert_eq!(shown.artist, "Artist A");
    assert_eq!(shown.cover_url, "https://covers.example/Song A.png");
    assert!(!shown.toggle_enabled);
    assert_eq!(shown.mode, PlayerMode::RemotePlaying);
    assert_eq!(m.audio().source.as_deref(), Some(CUE));
    assert!(m.audio().looped);
    assert!(m.audio().playing);
    assert_eq!(m.state().last_remote_check, Some(t0 + Duration::from_secs(1)));
}

#[test]
fn failing_provider_without_click_shows_prompt_and_stays_silent() {
    let t0 = Instant::now();
    let mut sched = scheduler(t0);
    let mut m = gated_machine_at(1);

    let PollDecision::Fetch(ticket) = sched.request(t0) else {
        panic!("first poll must hit the provider");
    };
    let status = sched
        .complete(ticket, Err("HTTP 503".to_string()), t0 + Duration::from_millis(300))
        .expect("fresh ticket");
    m.on_poll_result(status, t0 + Duration::from_millis(300));

    assert!(!sched.take_unlock_timeout(t0 + Duration::from_secs(5)));
    let shown = m.snapshot();
    assert_eq!(shown.title, NO_STATUS_TITLE);
    assert!(shown.unlock_prompt);
    assert!(!shown.loading);
    assert_eq!(shown.mode, PlayerMode::AwaitingUnlock);
    assert!(!m.audio().playing);
    assert!(!UNLOCK_PROMPT.is_empty());
}

#[test]
fn hanging_provider_falls_back_after_unlock_timeout() {
    let t0 = Instant::now();
    let mut sched = scheduler(t0);
    let mut m = machine_at(0);

    assert!(matches!(sched.request(t0), PollDecision::Fetch(_)));
    assert!(!sched.take_unlock_timeout(t0 + Duration::from_secs(4)));
    assert!(sched.take_unlock_timeout(t0 + Duration::from_secs(5)));
    m.on_unlock_timeout();

    assert!(m.snapshot().unlock_prompt);
    assert_eq!(m.snapshot().title, NO_STATUS_TITLE);
    assert!(!m.audio().playing);
    assert!(!sched.take_unlock_timeout(t0 + Duration::from_secs(6)));
}

#[test]
fn unlock_timeout_after_a_result_changes_nothing() {
    let mut m = machine_at(0);
    m.on_poll_result(playing("Song A", "Artist A"), Instant::now());
    let before = m.snapshot().clone();

    m.on_unlock_timeout();

    assert_eq!(m.snapshot(), &before);
    assert_eq!(m.state().mode, PlayerMode::RemotePlaying);
}

#[test]
fn gesture_starts_local_track_at_start_index() {
    let mut m = machine_at(1);
    m.on_poll_result(RemoteStatus::Idle, Instant::now());
    assert!(m.snapshot().unlock_prompt);

    m.on_user_gesture();

    let expected = m.playlist().current(1).clone();
    let shown = m.snapshot();
    assert!(!shown.unlock_prompt);
    assert_eq!(shown.mode, PlayerMode::LocalPlaying);
    assert_eq!(shown.toggle_icon, ToggleIcon::Pause);
    assert_eq!(shown.title, expected.title);
    assert!(shown.loading);
    assert_eq!(m.audio().source.as_deref(), Some(expected.file.as_str()));
    assert!(!m.audio().looped);
    assert!(m.audio().playing);

    m.on_track_started();
    assert!(!m.snapshot().loading);
}

#[test]
fn second_gesture_is_a_no_op() {
    let mut m = machine_at(0);
    m.on_user_gesture();
    let calls = m.audio().calls.len();
    let updates = m.display().updates.len();

    m.on_user_gesture();

    assert_eq!(m.audio().calls.len(), calls);
    assert_eq!(m.display().updates.len(), updates);
}

#[test]
fn track_end_on_last_index_wraps_to_first() {
    let mut m = machine_at(2);
    m.on_user_gesture();
    m.on_track_started();
    assert_eq!(m.state().local_index, 2);

    m.on_track_ended();

    let first = m.playlist().current(0).clone();
    assert_eq!(m.state().local_index, 0);
    assert_eq!(m.audio().source.as_deref(), Some(first.file.as_str()));
    assert!(m.audio().playing);
    assert!(m.snapshot().loading);
    assert_eq!(m.snapshot().title, first.title);
}

#[test]
fn idle_after_remote_resumes_local_without_prompt() {
    let t0 = Instant::now();
    let mut m = machine_at(0);
    m.on_user_gesture();
    m.on_track_ended();
    assert_eq!(m.state().local_index, 1);

    m.on_poll_result(playing("Song A", "Artist A"), t0);
    assert_eq!(m.audio().source.as_deref(), Some(CUE));

    m.on_poll_result(RemoteStatus::Idle, t0 + Duration::from_secs(30));

    let second = m.playlist().current(1).clone();
    assert_eq!(m.state().mode, PlayerMode::LocalPlaying);
    assert_eq!(m.audio().source.as_deref(), Some(second.file.as_str()));
    assert!(!m.audio().looped);
    assert!(m.audio().playing);
    assert!(!m.snapshot().unlock_prompt);
    assert!(m.snapshot().toggle_enabled);
    assert_eq!(m.snapshot().title, second.title);
}

#[test]
fn idle_after_remote_while_locked_returns_to_prompt() {
    let mut m = machine_at(0);
    m.on_poll_result(playing("Song A", "Artist A"), Instant::now());
    m.on_poll_result(RemoteStatus::Unavailable("timeout".into()), Instant::now());

    assert_eq!(m.state().mode, PlayerMode::AwaitingUnlock);
    assert!(m.snapshot().unlock_prompt);
    assert!(m.audio().source.is_none());
    assert!(!m.audio().playing);
}

#[test]
fn toggle_is_ignored_while_remote() {
    let mut m = machine_at(0);
    m.on_user_gesture();
    m.on_poll_result(playing("Song A", "Artist A"), Instant::now());
    let calls = m.audio().calls.clone();
    let shown = m.snapshot().clone();

    m.on_toggle_pressed();
    m.on_toggle_pressed();

    assert_eq!(m.audio().calls, calls);
    assert_eq!(m.snapshot(), &shown);
    assert!(m.audio().playing);
}

#[test]
fn toggle_pauses_and_resumes_local() {
    let mut m = machine_at(0);
    m.on_user_gesture();

    m.on_toggle_pressed();
    assert_eq!(m.state().mode, PlayerMode::LocalPaused);
    assert_eq!(m.snapshot().toggle_icon, ToggleIcon::Play);
    assert!(!m.audio().playing);
    assert_eq!(m.audio().calls.last(), Some(&Call::Pause));

    m.on_toggle_pressed();
    assert_eq!(m.state().mode, PlayerMode::LocalPlaying);
    assert_eq!(m.snapshot().toggle_icon, ToggleIcon::Pause);
    assert!(m.audio().playing);
}

#[test]
fn same_remote_track_twice_does_not_restart_cue() {
    let mut m = machine_at(0);
    m.on_poll_result(playing("Song A", "Artist A"), Instant::now());
    let calls = m.audio().calls.len();
    let updates = m.display().updates.len();

    m.on_poll_result(playing("Song A", "Artist A"), Instant::now());
    assert_eq!(m.audio().calls.len(), calls);
    assert_eq!(m.display().updates.len(), updates);

    m.on_poll_result(playing("Song B", "Artist B"), Instant::now());
    assert_eq!(m.audio().calls.len(), calls);
    assert_eq!(m.snapshot().title, "Song B");
}

#[test]
fn cue_end_while_remote_rewinds_and_replays() {
    let mut m = machine_at(0);
    m.on_poll_result(playing("Song A", "Artist A"), Instant::now());
    let index = m.state().local_index;

    m.on_track_ended();

    let tail = &m.audio().calls[m.audio().calls.len() - 2..];
    assert_eq!(tail, &[Call::Rewind, Call::Play]);
    assert_eq!(m.state().local_index, index);
    assert_eq!(m.state().mode, PlayerMode::RemotePlaying);
}

#[test]
fn load_error_advances_and_retries_after_backoff() {
    let mut m = machine_at(0);
    m.on_user_gesture();
    let _ = m.take_scheduled_retry();

    m.on_track_load_error("no such file");

    assert_eq!(m.state().local_index, 1);
    assert_eq!(m.state().mode, PlayerMode::LocalPlaying);
    let RetryRequest { token, delay } = m.take_scheduled_retry().expect("retry scheduled");
    assert_eq!(delay, Duration::from_secs(2));
    assert!(m.take_scheduled_retry().is_none());

    m.on_retry_due(token);
    let second = m.playlist().current(1).clone();
    assert_eq!(m.audio().source.as_deref(), Some(second.file.as_str()));
    assert!(m.audio().playing);
}

#[test]
fn every_track_failing_still_cycles_the_playlist() {
    let mut m = machine_at(0);
    m.on_user_gesture();
    let len = m.playlist().len();

    let mut seen = Vec::new();
    for _ in 0..(len * 2) {
        m.on_track_load_error("decoder error");
        let retry = m.take_scheduled_retry().expect("retry scheduled");
        m.on_retry_due(retry.token);
        seen.push(m.state().local_index);
    }

    let expected: Vec<usize> = (1..=len * 2).map(|n| n % len).collect();
    assert_eq!(seen, expected);
}

#[test]
fn retry_is_dropped_once_remote_takes_over() {
    let mut m = machine_at(0);
    m.on_user_gesture();
    m.on_track_load_error("gone");
    let retry = m.take_scheduled_retry().expect("retry scheduled");

    m.on_poll_result(playing("Song A", "Artist A"), Instant::now());
    m.on_retry_due(retry.token);

    assert_eq!(m.audio().source.as_deref(), Some(CUE));
    assert_eq!(m.state().mode, PlayerMode::RemotePlaying);
}

#[test]
fn resume_after_failed_track_starts_the_next_one() {
    let mut m = machine_at(0);
    m.on_user_gesture();
    m.on_track_load_error("gone");
    let _ = m.take_scheduled_retry();
    m.on_toggle_pressed();
    assert_eq!(m.state().mode, PlayerMode::LocalPaused);

    m.on_toggle_pressed();

    let next = m.playlist().current(1).clone();
    assert_eq!(m.state().mode, PlayerMode::LocalPlaying);
    assert_eq!(m.audio().source.as_deref(), Some(next.file.as_str()));
}

#[test]
fn load_error_while_paused_restarts_on_next_track() {
    let mut m = machine_at(0);
    m.on_user_gesture();
    m.on_toggle_pressed();
    assert_eq!(m.state().mode, PlayerMode::LocalPaused);

    m.on_track_load_error("cannot open file");

    assert_eq!(m.state().mode, PlayerMode::LocalPaused);
    assert_eq!(m.state().local_index, 1);
    assert!(!m.snapshot().loading);
    // The backoff timer firing while paused starts nothing.
    let retry = m.take_scheduled_retry().expect("retry scheduled");
    m.on_retry_due(retry.token);
    assert_eq!(m.state().mode, PlayerMode::LocalPaused);
    assert!(m.audio().source.is_none());

    m.on_toggle_pressed();

    let next = m.playlist().current(1).clone();
    assert_eq!(m.state().mode, PlayerMode::LocalPlaying);
    assert_eq!(m.audio().source.as_deref(), Some(next.file.as_str()));
    assert!(m.audio().playing);
    assert!(m.snapshot().loading);
}

#[test]
fn ungated_cue_clears_stale_unlock_prompt() {
    let t0 = Instant::now();
    let mut m = machine_at(0);
    m.on_poll_result(RemoteStatus::Unavailable("timeout".to_string()), t0);
    assert!(m.snapshot().unlock_prompt);

    m.on_poll_result(playing("Song A", "Artist A"), t0 + Duration::from_secs(5));

    assert_eq!(m.state().mode, PlayerMode::RemotePlaying);
    assert!(m.audio().playing);
    assert!(!m.snapshot().unlock_prompt);
}

#[test]
fn blocked_cue_waits_for_gesture() {
    let mut m = gated_machine_at(0);
    m.on_poll_result(playing("Song A", "Artist A"), Instant::now());

    assert_eq!(m.state().mode, PlayerMode::RemotePlaying);
    assert!(m.state().cue_blocked);
    assert!(m.snapshot().unlock_prompt);
    assert_eq!(m.snapshot().title, "Song A");
    assert!(!m.audio().playing);

    m.on_user_gesture();

    assert!(!m.snapshot().unlock_prompt);
    assert!(m.audio().playing);
    assert_eq!(m.audio().source.as_deref(), Some(CUE));
    assert_eq!(m.state().mode, PlayerMode::RemotePlaying);
}

#[test]
fn each_transition_publishes_at_most_one_update() {
    let mut m = machine_at(0);
    let mut last = m.display().updates.len();
    let mut step = |m: &mut TestMachine, f: &dyn Fn(&mut TestMachine)| {
        f(m);
        let now = m.display().updates.len();
        assert!(now - last <= 1);
        last = now;
    };

    step(&mut m, &|m| m.on_poll_result(RemoteStatus::Idle, Instant::now()));
    step(&mut m, &|m| m.on_user_gesture());
    step(&mut m, &|m| m.on_poll_result(playing("A", "B"), Instant::now()));
    step(&mut m, &|m| m.on_poll_result(RemoteStatus::Idle, Instant::now()));
    step(&mut m, &|m| m.on_track_ended());

    let revs: Vec<u64> = m.display().updates.iter().map(|d| d.rev).collect();
    assert!(revs.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn remote_mode_tracks_latest_poll_result() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let mut m = machine_at(1);
    let mut last_poll_playing: Option<bool> = None;

    for _ in 0..2_000 {
        match rng.gen_range(0..9) {
            0 => {
                m.on_poll_result(playing("Song A", "Artist A"), Instant::now());
                last_poll_playing = Some(true);
            }
            1 => {
                m.on_poll_result(playing("Song B", "Artist B"), Instant::now());
                last_poll_playing = Some(true);
            }
            2 => {
                m.on_poll_result(RemoteStatus::Idle, Instant::now());
                last_poll_playing = Some(false);
            }
            3 => {
                m.on_poll_result(RemoteStatus::Unavailable("down".into()), Instant::now());
                last_poll_playing = Some(false);
            }
            4 => m.on_user_gesture(),
            5 => m.on_toggle_pressed(),
            6 => m.on_track_ended(),
            7 => m.on_track_load_error("flaky"),
            _ => {
                if let Some(retry) = m.take_scheduled_retry() {
                    m.on_retry_due(retry.token);
                }
            }
        }

        let remote = m.state().mode == PlayerMode::RemotePlaying;
        assert_eq!(remote, last_poll_playing == Some(true));
        assert_eq!(m.snapshot().toggle_enabled, !remote);
        assert!(m.state().local_index < m.playlist().len());
        if m.audio().playing {
            let expected = if remote {
                CUE.to_string()
            } else {
                m.playlist().current(m.state().local_index).file.clone()
            };
            assert_eq!(m.audio().source.as_deref(), Some(expected.as_str()));
        }
    }
}
