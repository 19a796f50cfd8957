use crate::transform::TransformState;

/// Divergence thresholds, one per position axis plus one rotation angle.
///
/// These double as the quantization precision advertised to an external
/// serializer: a delta below threshold is never transmitted, so encoding
/// finer than the threshold is wasted precision.
#[derive(Debug, Clone)]
pub struct DirtyConfig {
    pub position_precision: [f32; 3],
    /// Quaternion angle threshold in radians.
    pub rotation_precision: f32,
}

impl Default for DirtyConfig {
    fn default() -> Self {
        Self {
            position_precision: [0.01, 0.01, 0.01],
            rotation_precision: 0.01,
        }
    }
}

impl DirtyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position_precision(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position_precision = [x, y, z];
        self
    }

    pub fn with_rotation_precision(mut self, radians: f32) -> Self {
        self.rotation_precision = radians;
        self
    }
}

/// Decides whether the current transform has diverged enough from the last
/// transmitted baseline to be worth sending again.
///
/// Thresholds are relative to the last transmitted state, not a sliding
/// average: on trigger, the baseline rebases to the current transform.
pub struct DirtyDetector {
    config: DirtyConfig,
    baseline: Option<TransformState>,
    needs_update: bool,
    trigger_count: u64,
}

impl DirtyDetector {
    pub fn new(config: DirtyConfig) -> Self {
        Self {
            config,
            baseline: None,
            needs_update: false,
            trigger_count: 0,
        }
    }

    /// Compare `current` against the baseline. Returns `true` and rebases the
    /// baseline to `current` when any position axis delta exceeds its
    /// threshold or the rotation angle exceeds the angular threshold. The
    /// first check after construction or `rebase` to a cleared state always
    /// triggers.
    pub fn check(&mut self, current: TransformState) -> bool {
        let dirty = match self.baseline {
            None => true,
            Some(baseline) => {
                let delta = (current.position - baseline.position).abs();
                let angle = baseline.angle_to(&current);

                delta.x > self.config.position_precision[0]
                    || delta.y > self.config.position_precision[1]
                    || delta.z > self.config.position_precision[2]
                    || angle > self.config.rotation_precision
            }
        };

        if dirty {
            self.baseline = Some(current);
            self.needs_update = true;
            self.trigger_count += 1;
        }

        dirty
    }

    /// Force the baseline to `state` without triggering. Used after a
    /// teleport or an authority change so the next comparison is against the
    /// post-discontinuity transform.
    pub fn rebase(&mut self, state: TransformState) {
        self.baseline = Some(state);
        self.needs_update = false;
    }

    /// Mark dirty unconditionally, rebasing to `state`. Used when a
    /// client-authoritative update must be rebroadcast regardless of
    /// thresholds.
    pub fn mark_dirty(&mut self, state: TransformState) {
        self.baseline = Some(state);
        self.needs_update = true;
        self.trigger_count += 1;
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Consume the pending flag after the update has been sent.
    pub fn clear_needs_update(&mut self) {
        self.needs_update = false;
    }

    pub fn baseline(&self) -> Option<&TransformState> {
        self.baseline.as_ref()
    }

    pub fn trigger_count(&self) -> u64 {
        self.trigger_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn detector() -> DirtyDetector {
        DirtyDetector::new(DirtyConfig::new().with_position_precision(0.1, 0.1, 0.1))
    }

    #[test]
    fn test_first_check_always_triggers() {
        let mut d = detector();
        assert!(d.check(TransformState::IDENTITY));
    }

    #[test]
    fn test_below_threshold_does_not_trigger() {
        let mut d = detector();
        d.rebase(TransformState::from_position(Vec3::ZERO));

        assert!(!d.check(TransformState::from_position(Vec3::new(0.05, 0.0, 0.0))));
        assert!(!d.needs_update());
    }

    #[test]
    fn test_above_threshold_triggers_and_rebases() {
        let mut d = detector();
        d.rebase(TransformState::from_position(Vec3::ZERO));

        let moved = TransformState::from_position(Vec3::new(0.2, 0.0, 0.0));
        assert!(d.check(moved));
        assert!(d.needs_update());
        assert_eq!(d.baseline().unwrap().position, moved.position);

        // Thresholds are relative to the new baseline now.
        assert!(!d.check(TransformState::from_position(Vec3::new(0.25, 0.0, 0.0))));
    }

    #[test]
    fn test_per_axis_thresholds_independent() {
        let config = DirtyConfig::new().with_position_precision(0.1, 1.0, 1.0);
        let mut d = DirtyDetector::new(config);
        d.rebase(TransformState::from_position(Vec3::ZERO));

        assert!(!d.check(TransformState::from_position(Vec3::new(0.0, 0.5, 0.5))));
        assert!(d.check(TransformState::from_position(Vec3::new(0.2, 0.0, 0.0))));
    }

    #[test]
    fn test_rotation_threshold() {
        let config = DirtyConfig::new()
            .with_position_precision(10.0, 10.0, 10.0)
            .with_rotation_precision(0.1);
        let mut d = DirtyDetector::new(config);
        d.rebase(TransformState::IDENTITY);

        let slight = TransformState::new(Vec3::ZERO, Quat::from_rotation_y(0.05));
        let wide = TransformState::new(Vec3::ZERO, Quat::from_rotation_y(0.5));

        assert!(!d.check(slight));
        assert!(d.check(wide));
    }

    #[test]
    fn test_mark_dirty_bypasses_thresholds() {
        let mut d = detector();
        d.rebase(TransformState::IDENTITY);

        d.mark_dirty(TransformState::from_position(Vec3::new(0.001, 0.0, 0.0)));
        assert!(d.needs_update());

        d.clear_needs_update();
        assert!(!d.needs_update());
    }
}
