//! In-game synchronization bookkeeping.
//!
//! While a lobby is InGame, the host broadcasts a `GameUpdate` every tick
//! and expects an `AckGameUpdate` from each guest. [`SyncTracker`] applies
//! the same consecutive-miss policy the connection layer uses for
//! heartbeats, scoped to the game session. [`TickPacer`] spaces the
//! broadcasts (and the guests' `ClientUpdate`s) on a fixed cadence.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use coinop_protocol::ClientId;

/// How many consecutive unacknowledged updates a peer may accumulate
/// before the session treats it as disconnected. Matches the heartbeat
/// miss threshold.
pub const DEFAULT_MAX_MISSED_ACKS: u32 = 3;

/// Update cadence for in-game state sync.
pub const DEFAULT_SYNC_RATE_HZ: u32 = 10;

// ---------------------------------------------------------------------------
// SyncTracker
// ---------------------------------------------------------------------------

/// Per-peer consecutive missed-ack counts for one game session.
///
/// Owned by the host's view; created at StartGame, dropped at EndGame.
#[derive(Debug)]
pub struct SyncTracker {
    outstanding: HashMap<ClientId, u32>,
    max_missed: u32,
}

impl SyncTracker {
    pub fn new(max_missed: u32) -> Self {
        Self {
            outstanding: HashMap::new(),
            max_missed,
        }
    }

    /// Starts tracking a peer with a clean slate.
    pub fn track(&mut self, id: ClientId) {
        self.outstanding.insert(id, 0);
    }

    /// Stops tracking a peer (it left or was dropped).
    pub fn forget(&mut self, id: &ClientId) {
        self.outstanding.remove(id);
    }

    /// Records that an update went out to every tracked peer.
    ///
    /// Increments every counter and returns the peers that have now crossed
    /// the miss threshold; those are removed from tracking — the caller
    /// treats them exactly like a disconnect.
    pub fn record_broadcast(&mut self) -> Vec<ClientId> {
        let mut lost = Vec::new();
        for (id, missed) in self.outstanding.iter_mut() {
            *missed += 1;
            if *missed > self.max_missed {
                lost.push(id.clone());
            }
        }
        for id in &lost {
            self.outstanding.remove(id);
            tracing::warn!(peer = %id, "peer missed too many acks, dropping from session");
        }
        lost
    }

    /// Records an ack from a peer, resetting its miss count.
    ///
    /// Returns `false` for peers the session isn't tracking (already
    /// dropped, or never part of this game) — the ack is ignored.
    pub fn record_ack(&mut self, id: &ClientId) -> bool {
        match self.outstanding.get_mut(id) {
            Some(missed) => {
                *missed = 0;
                true
            }
            None => false,
        }
    }

    pub fn tracked(&self) -> usize {
        self.outstanding.len()
    }
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MISSED_ACKS)
    }
}

// ---------------------------------------------------------------------------
// TickPacer
// ---------------------------------------------------------------------------

/// Fixed-interval pacing with skip-ahead on overrun.
///
/// The caller polls [`due`](Self::due) from whatever loop it already runs
/// (the view manager's render tick). When the process stalls past several
/// deadlines, the pacer reschedules from *now* instead of bursting to
/// catch up — late updates are worthless in a realtime sync.
#[derive(Debug)]
pub struct TickPacer {
    period: Duration,
    next: Instant,
}

impl TickPacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now(),
        }
    }

    pub fn with_rate(hz: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / hz.max(1) as f64))
    }

    /// Whether a tick is due at `now`. Advances the deadline when it is.
    pub fn due(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        // Skip ahead from now; never schedule a make-up burst.
        self.next = now + self.period;
        true
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

// =========================================================================
// Tests
// =========================================================================
