use crate::debug::trace_rate_limit;

/// Paces client-authoritative sends to a fixed interval on the crate's
/// tick-driven timeline.
///
/// A client with authority does not transmit every tick; it transmits at a
/// capped rate so its bandwidth is bounded deliberately. Time is the caller's
/// f64-seconds clock rather than wall time, which keeps the limiter
/// deterministic under simulated ticks.
pub struct SendRateLimiter {
    interval: f64,
    last_send: Option<f64>,
    total_sent: u64,
    total_suppressed: u64,
}

impl SendRateLimiter {
    /// `rate` is the maximum number of sends per second.
    pub fn new(rate: f64) -> Self {
        let interval = if rate > 0.0 { 1.0 / rate } else { f64::INFINITY };

        Self {
            interval,
            last_send: None,
            total_sent: 0,
            total_suppressed: 0,
        }
    }

    /// Returns `true` and records the send if the interval has elapsed since
    /// the last acquired slot; otherwise the send should be suppressed.
    ///
    /// Slots advance by exact interval steps while the caller keeps up, and
    /// the comparison carries a small epsilon, so tick times like `i / 60.0`
    /// landing a rounding error short of a nominal boundary still acquire
    /// their slot instead of drifting below the configured rate.
    pub fn try_acquire(&mut self, now: f64) -> bool {
        let slack = self.interval * 1e-6;
        let allowed = match self.last_send {
            None => true,
            Some(last) => now - last >= self.interval - slack,
        };

        if allowed {
            self.last_send = Some(match self.last_send {
                Some(last) if now - last < self.interval * 2.0 => last + self.interval,
                _ => now,
            });
            self.total_sent += 1;
        } else {
            self.total_suppressed += 1;
        }

        trace_rate_limit(allowed, now, self.interval);
        allowed
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn reset(&mut self) {
        self.last_send = None;
    }

    pub fn stats(&self) -> SendRateStats {
        SendRateStats {
            total_sent: self.total_sent,
            total_suppressed: self.total_suppressed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SendRateStats {
    pub total_sent: u64,
    pub total_suppressed: u64,
}
