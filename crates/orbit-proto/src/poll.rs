//! Poll cadence, result cache, and in-flight bookkeeping for the now-playing
//! provider.
//!
//! `PollScheduler` decides *whether* a tick should hit the network; the daemon
//! owns the actual timers and performs the fetch.  Every fetch carries a
//! `PollTicket`; a completion whose ticket is no longer the outstanding one is
//! stale and is dropped instead of being applied.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::protocol::RemoteStatus;

// ── Cadence ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// `warmup_interval` until `warmup` has elapsed since start, then
    /// `steady_interval` for the rest of the session.
    TwoPhase {
        warmup: Duration,
        warmup_interval: Duration,
        steady_interval: Duration,
    },
    Fixed {
        interval: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Warmup,
    Steady,
}

impl Cadence {
    pub fn phase_at(&self, since_start: Duration) -> PollPhase {
        match self {
            Cadence::TwoPhase { warmup, .. } if since_start < *warmup => PollPhase::Warmup,
            _ => PollPhase::Steady,
        }
    }

    pub fn interval_at(&self, since_start: Duration) -> Duration {
        match (self, self.phase_at(since_start)) {
            (Cadence::TwoPhase { warmup_interval, .. }, PollPhase::Warmup) => *warmup_interval,
            (Cadence::TwoPhase { steady_interval, .. }, PollPhase::Steady) => *steady_interval,
            (Cadence::Fixed { interval }, _) => *interval,
        }
    }

    /// Offset from start at which the warm-up ends, if this cadence has one.
    pub fn switch_after(&self) -> Option<Duration> {
        match self {
            Cadence::TwoPhase { warmup, .. } => Some(*warmup),
            Cadence::Fixed { .. } => None,
        }
    }

    pub fn steady_interval(&self) -> Duration {
        match self {
            Cadence::TwoPhase { steady_interval, .. } => *steady_interval,
            Cadence::Fixed { interval } => *interval,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Cadence::TwoPhase {
                warmup,
                warmup_interval,
                steady_interval,
            } => format!(
                "two-phase: every {}s for the first {}s, then every {}s",
                warmup_interval.as_secs(),
                warmup.as_secs(),
                steady_interval.as_secs()
            ),
            Cadence::Fixed { interval } => format!("fixed: every {}s", interval.as_secs()),
        }
    }
}

// ── Cache ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CachedStatus {
    stored_at: Instant,
    status: RemoteStatus,
}

/// Single-slot cache of the last successful poll.
#[derive(Debug, Clone)]
pub struct StatusCache {
    ttl: Duration,
    entry: Option<CachedStatus>,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn get(&self, now: Instant) -> Option<&RemoteStatus> {
        self.entry
            .as_ref()
            .filter(|e| now.saturating_duration_since(e.stored_at) < self.ttl)
            .map(|e| &e.status)
    }

    pub fn store(&mut self, now: Instant, status: RemoteStatus) {
        self.entry = Some(CachedStatus {
            stored_at: now,
            status,
        });
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

// ── Scheduler ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PollTicket(u64);

impl PollTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollDecision {
    /// Served from cache; apply without touching the provider.
    Cached(RemoteStatus),
    /// Call the provider and report back with this ticket.
    Fetch(PollTicket),
    /// A fetch is already outstanding.
    InFlight,
}

#[derive(Debug)]
pub struct PollScheduler {
    cadence: Cadence,
    cache: StatusCache,
    started_at: Instant,
    /// An outstanding fetch older than this is abandoned and its ticket goes stale.
    max_in_flight: Duration,
    next_ticket: u64,
    in_flight: Option<(PollTicket, Instant)>,
    last_check: Option<Instant>,
    unlock_deadline: Option<Instant>,
    steady: bool,
}

impl PollScheduler {
    pub fn new(
        cadence: Cadence,
        cache_ttl: Duration,
        unlock_timeout: Duration,
        max_in_flight: Duration,
        started_at: Instant,
    ) -> Self {
        Self {
            cadence,
            cache: StatusCache::new(cache_ttl),
            started_at,
            max_in_flight,
            next_ticket: 1,
            in_flight: None,
            last_check: None,
            unlock_deadline: Some(started_at + unlock_timeout),
            steady: cadence.switch_after().is_none(),
        }
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Time of the last completed poll, successful or not.
    pub fn last_check(&self) -> Option<Instant> {
        self.last_check
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn request(&mut self, now: Instant) -> PollDecision {
        if let Some(status) = self.cache.get(now) {
            return PollDecision::Cached(status.clone());
        }

        if let Some((ticket, issued_at)) = self.in_flight {
            if now.saturating_duration_since(issued_at) < self.max_in_flight {
                return PollDecision::InFlight;
            }
            debug!("poll: abandoning ticket {} after {:?}", ticket.0, self.max_in_flight);
        }

        let ticket = PollTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight = Some((ticket, now));
        PollDecision::Fetch(ticket)
    }

    /// Record a provider completion.  Returns the status to apply, or `None`
    /// when the ticket is stale.  Failures come back as `Unavailable` and are
    /// never cached.  A cached status ages from when its fetch was issued,
    /// so fetch latency never shifts the cache window past the next tick.
    pub fn complete(
        &mut self,
        ticket: PollTicket,
        result: Result<RemoteStatus, String>,
        now: Instant,
    ) -> Option<RemoteStatus> {
        let issued_at = match self.in_flight {
            Some((outstanding, issued_at)) if outstanding == ticket => {
                self.in_flight = None;
                issued_at
            }
            _ => {
                debug!("poll: dropping stale result for ticket {}", ticket.0);
                return None;
            }
        };

        self.last_check = Some(now);
        self.unlock_deadline = None;

        let status = match result {
            Ok(RemoteStatus::Unavailable(reason)) | Err(reason) => {
                RemoteStatus::Unavailable(reason)
            }
            Ok(status) => {
                self.cache.store(issued_at, status.clone());
                status
            }
        };
        Some(status)
    }

    pub fn unlock_deadline(&self) -> Option<Instant> {
        self.unlock_deadline
    }

    pub fn cancel_unlock_timeout(&mut self) {
        self.unlock_deadline = None;
    }

    /// True exactly once, when the deadline has passed without a poll
    /// result or a cancellation.
    pub fn take_unlock_timeout(&mut self, now: Instant) -> bool {
        match self.unlock_deadline {
            Some(deadline) if now >= deadline => {
                self.unlock_deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn interval(&self, now: Instant) -> Duration {
        if self.steady {
            return self.cadence.steady_interval();
        }
        self.cadence
            .interval_at(now.saturating_duration_since(self.started_at))
    }

    /// When the warm-up timer should be replaced, or `None` once steady.
    pub fn cadence_switch_at(&self) -> Option<Instant> {
        if self.steady {
            return None;
        }
        self.cadence.switch_after().map(|after| self.started_at + after)
    }

    /// Leave the warm-up phase.  Returns the new interval the first time.
    pub fn enter_steady(&mut self) -> Option<Duration> {
        if self.steady {
            return None;
        }
        self.steady = true;
        Some(self.cadence.steady_interval())
    }
}
