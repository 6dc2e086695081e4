//! Flood control for inbound challenges.
//!
//! Answering a challenge costs the responder an ECDH and a decryption, so a
//! responder may shed load by answering `Flooded` with a backoff instead.
//!
//! Policies see the IP address the datagram actually arrived from. The
//! identifier and address inside a packet are written by the sender and can
//! be changed for every challenge.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Senders idle for this many windows are forgotten.
const IDLE_WINDOWS: u32 = 4;

pub trait FloodPolicy: Send + Sync {
    /// `Err(backoff)` when `source` must wait before challenging again.
    fn check(&self, source: &IpAddr) -> Result<(), Duration>;
}

/// Answers every challenge.
pub struct NoFloodPolicy;

impl FloodPolicy for NoFloodPolicy {
    fn check(&self, _source: &IpAddr) -> Result<(), Duration> {
        Ok(())
    }
}

/// Refuses every challenge with the same backoff.
pub struct AlwaysFlooded {
    backoff: Duration,
}

impl AlwaysFlooded {
    pub fn new(backoff: Duration) -> Self {
        AlwaysFlooded { backoff }
    }
}

impl FloodPolicy for AlwaysFlooded {
    fn check(&self, _source: &IpAddr) -> Result<(), Duration> {
        Err(self.backoff)
    }
}

///
/// At most `max` challenges per source address in any sliding `window`. The backoff is
/// the time until the oldest counted challenge leaves the window.
///
pub struct WindowFloodPolicy {
    max: usize,
    window: Duration,
    inner: Mutex<WindowState>,
}

struct WindowState {
    senders: AHashMap<IpAddr, VecDeque<Instant>>,
    last_cleanup: Instant,
}

impl WindowFloodPolicy {
    pub fn new(max: usize, window: Duration) -> Self {
        WindowFloodPolicy {
            max,
            window,
            inner: Mutex::new(WindowState {
                senders: AHashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    fn check_at(&self, source: &IpAddr, now: Instant) -> Result<(), Duration> {
        let mut inner = self.inner.lock();
        let window = self.window;

        if now.saturating_duration_since(inner.last_cleanup) >= window * IDLE_WINDOWS {
            inner.last_cleanup = now;
            inner.senders.retain(|_, seen| {
                seen.back()
                    .map(|last| now.saturating_duration_since(*last) < window)
                    .unwrap_or(false)
            });
        }

        let seen = inner.senders.entry(*source).or_insert_with(VecDeque::new);
        while let Some(oldest) = seen.front() {
            if now.saturating_duration_since(*oldest) >= window {
                seen.pop_front();
            } else {
                break;
            }
        }

        if seen.len() >= self.max {
            let backoff = seen
                .front()
                .map(|oldest| window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(window);
            return Err(backoff);
        }
        seen.push_back(now);
        Ok(())
    }

    pub fn tracked_senders(&self) -> usize {
        self.inner.lock().senders.len()
    }
}

impl FloodPolicy for WindowFloodPolicy {
    fn check(&self, source: &IpAddr) -> Result<(), Duration> {
        self.check_at(source, Instant::now())
    }
}
