use crate::debug::trace_drift;

/// Tunables for the interpolation clock.
#[derive(Debug, Clone)]
pub struct TimeSyncConfig {
    /// How far the render clock trails the best-known server time, in
    /// seconds. Larger values trade latency for jitter tolerance.
    pub client_delay: f64,
    /// Playback-speed bounds while correcting drift. 1.0 is normal speed.
    pub catch_up_min: f64,
    pub catch_up_max: f64,
    /// Gap below which the clock is considered on target and the drift
    /// scale eases back toward 1.0.
    pub tolerance: f64,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            client_delay: 0.1,
            catch_up_min: 0.5,
            catch_up_max: 1.5,
            tolerance: 0.05,
        }
    }
}

impl TimeSyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_delay(mut self, delay: f64) -> Self {
        self.client_delay = delay;
        self
    }

    pub fn with_catch_up_bounds(mut self, min: f64, max: f64) -> Self {
        self.catch_up_min = min;
        self.catch_up_max = max;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Converts jittered snapshot arrival times into a smooth local render clock
/// trailing the best-known server clock by a fixed delay.
///
/// The clock never runs ahead of `latest_server_time - client_delay`; when it
/// falls behind (buffer underrun after a stall) playback speed is eased
/// toward `catch_up_max` so the gap closes over several ticks instead of
/// snapping.
pub struct TimeSync {
    config: TimeSyncConfig,
    latest_server_time: f64,
    interpolation_time: f64,
    drift_scale: f64,
    initialized: bool,
}

/// Per-tick fraction by which the drift scale moves toward its goal.
const DRIFT_EASE: f64 = 0.1;

impl TimeSync {
    pub fn new(config: TimeSyncConfig) -> Self {
        Self {
            config,
            latest_server_time: 0.0,
            interpolation_time: 0.0,
            drift_scale: 1.0,
            initialized: false,
        }
    }

    /// Record an observed server timestamp. Keeps a running maximum, so
    /// out-of-order arrivals can never move the clock backwards.
    pub fn observe(&mut self, timestamp: f64) {
        if !self.initialized {
            self.latest_server_time = timestamp;
            self.interpolation_time = timestamp - self.config.client_delay;
            self.initialized = true;
            return;
        }

        if timestamp > self.latest_server_time {
            self.latest_server_time = timestamp;
        }
    }

    /// Advance the render clock by `dt` seconds of local time.
    pub fn advance(&mut self, dt: f64) {
        if !self.initialized {
            return;
        }

        let target = self.latest_server_time - self.config.client_delay;
        let gap = target - self.interpolation_time;

        let goal = if gap > self.config.tolerance {
            self.config.catch_up_max
        } else if gap < -self.config.tolerance {
            self.config.catch_up_min
        } else {
            1.0
        };

        self.drift_scale += (goal - self.drift_scale) * DRIFT_EASE;
        self.drift_scale = self
            .drift_scale
            .clamp(self.config.catch_up_min, self.config.catch_up_max);

        self.interpolation_time += dt * self.drift_scale;

        // Running ahead of target would mean extrapolating; clamp down.
        if self.interpolation_time > target {
            self.interpolation_time = target;
        }

        trace_drift(self.interpolation_time, target, self.drift_scale);
    }

    pub fn interpolation_time(&self) -> f64 {
        self.interpolation_time
    }

    pub fn latest_server_time(&self) -> f64 {
        self.latest_server_time
    }

    pub fn drift_scale(&self) -> f64 {
        self.drift_scale
    }

    pub fn client_delay(&self) -> f64 {
        self.config.client_delay
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Forget all observed time. Used when a connection restarts.
    pub fn reset(&mut self) {
        self.latest_server_time = 0.0;
        self.interpolation_time = 0.0;
        self.drift_scale = 1.0;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_initializes_behind() {
        let mut sync = TimeSync::new(TimeSyncConfig::new().with_client_delay(0.1));
        sync.observe(5.0);

        assert!(sync.is_initialized());
        assert!((sync.interpolation_time() - 4.9).abs() < 1e-9);
    }

    #[test]
    fn test_latest_server_time_is_running_max() {
        let mut sync = TimeSync::new(TimeSyncConfig::default());
        sync.observe(5.0);
        sync.observe(7.0);
        sync.observe(6.0);

        assert_eq!(sync.latest_server_time(), 7.0);
    }

    #[test]
    fn test_never_exceeds_target_during_stall() {
        let mut sync = TimeSync::new(TimeSyncConfig::new().with_client_delay(0.1));
        sync.observe(10.0);

        // Server time frozen at 10.0 over one second of 60 Hz local ticks.
        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            sync.advance(dt);
            assert!(sync.interpolation_time() <= 10.0 - 0.1 + 1e-9);
        }
    }

    #[test]
    fn test_monotonic_advance() {
        let mut sync = TimeSync::new(TimeSyncConfig::default());
        sync.observe(0.0);

        let dt = 1.0 / 60.0;
        let mut previous = sync.interpolation_time();
        for i in 1..120 {
            sync.observe(i as f64 * dt);
            sync.advance(dt);
            assert!(sync.interpolation_time() >= previous);
            previous = sync.interpolation_time();
        }
    }

    #[test]
    fn test_catch_up_after_stall() {
        let mut sync = TimeSync::new(
            TimeSyncConfig::new()
                .with_client_delay(0.1)
                .with_catch_up_bounds(0.5, 1.5),
        );
        sync.observe(0.0);

        let dt = 1.0 / 60.0;

        // Stall: clock pinned at target while server time stands still.
        for _ in 0..30 {
            sync.advance(dt);
        }

        // Burst of fresh server time leaves the clock well behind target.
        sync.observe(1.0);
        let behind = (sync.latest_server_time() - 0.1) - sync.interpolation_time();
        assert!(behind > 0.5);

        // Catch-up speeds playback above normal but within bounds.
        for _ in 0..30 {
            sync.advance(dt);
            assert!(sync.drift_scale() <= 1.5 + 1e-9);
        }
        assert!(sync.drift_scale() > 1.0);

        let now_behind = (sync.latest_server_time() - 0.1) - sync.interpolation_time();
        assert!(now_behind < behind);
    }

    #[test]
    fn test_drift_scale_settles_back_to_normal() {
        let mut sync = TimeSync::new(TimeSyncConfig::default());
        sync.observe(0.0);

        let dt = 1.0 / 60.0;
        for i in 1..600 {
            sync.observe(i as f64 * dt);
            sync.advance(dt);
        }

        assert!((sync.drift_scale() - 1.0).abs() < 0.2);
    }
}
