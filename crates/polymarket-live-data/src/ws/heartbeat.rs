/*
[INPUT]:  Ping send times and pong arrivals from the session loop
[OUTPUT]: Liveness verdicts and the next pong deadline
[POS]:    WebSocket layer - heartbeat bookkeeping (timers live in the session)
[UPDATE]: When changing ping/pong timing semantics
*/

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    TimedOut,
}

/// Tracks the outstanding ping and the most recent pong.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    ping_interval: Duration,
    pong_timeout: Duration,
    armed: bool,
    awaiting_since: Option<Instant>,
    last_pong: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
            armed: false,
            awaiting_since: None,
            last_pong: None,
        }
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    pub fn pong_timeout(&self) -> Duration {
        self.pong_timeout
    }

    /// Start monitoring; the connection counts as fresh at `now`.
    pub fn arm(&mut self, now: Instant) {
        self.armed = true;
        self.awaiting_since = None;
        self.last_pong = Some(now);
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.awaiting_since = None;
    }

    pub fn on_ping_sent(&mut self, now: Instant) {
        if self.armed && self.awaiting_since.is_none() {
            self.awaiting_since = Some(now);
        }
    }

    pub fn on_pong(&mut self, now: Instant) {
        self.last_pong = Some(now);
        self.awaiting_since = None;
    }

    pub fn last_pong(&self) -> Option<Instant> {
        self.last_pong
    }

    /// When the outstanding ping expires, if one is outstanding.
    pub fn pong_deadline(&self) -> Option<Instant> {
        if !self.armed {
            return None;
        }
        self.awaiting_since.map(|sent| sent + self.pong_timeout)
    }

    pub fn check(&self, now: Instant) -> Liveness {
        match self.pong_deadline() {
            Some(deadline) if now >= deadline => Liveness::TimedOut,
            _ => Liveness::Alive,
        }
    }
}
