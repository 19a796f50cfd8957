use crate::debug::trace_snapshot_drop;
use crate::transform::TransformState;
use std::collections::VecDeque;

/// A timestamped transform sample, exclusively owned by the buffer storing it.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub timestamp: f64,
    pub state: TransformState,
}

/// Per-entity time-ordered history of snapshots.
///
/// Timestamps are non-decreasing from head to tail. New samples are appended
/// at the tail; a sample older than the tail is dropped rather than inserted,
/// so one malformed update can never corrupt ordering for the entity.
pub struct SnapshotBuffer {
    snapshots: VecDeque<Snapshot>,
    dropped_out_of_order: u64,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self {
            snapshots: VecDeque::new(),
            dropped_out_of_order: 0,
        }
    }

    /// Append a sample at the tail. Returns `false` if the timestamp is older
    /// than the current tail, in which case the sample is dropped and the
    /// buffer is left unchanged.
    pub fn push(&mut self, timestamp: f64, state: TransformState) -> bool {
        if let Some(tail) = self.snapshots.back() {
            if timestamp < tail.timestamp {
                self.dropped_out_of_order += 1;
                trace_snapshot_drop(timestamp, tail.timestamp);
                return false;
            }
        }

        self.snapshots.push_back(Snapshot { timestamp, state });
        true
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn earliest(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    /// Interpolated state at `query_time`.
    ///
    /// Queries before the earliest sample return the earliest state; queries
    /// past the latest sample hold the latest state (no extrapolation in
    /// either direction, so a network stall never causes overshoot). Returns
    /// `None` only when the buffer is empty.
    pub fn sample(&self, query_time: f64) -> Option<TransformState> {
        let first = self.snapshots.front()?;
        let last = self.snapshots.back()?;

        if query_time <= first.timestamp {
            return Some(first.state);
        }

        if query_time >= last.timestamp {
            return Some(last.state);
        }

        for i in 0..self.snapshots.len() - 1 {
            let a = &self.snapshots[i];
            let b = &self.snapshots[i + 1];

            if query_time >= a.timestamp && query_time <= b.timestamp {
                let span = b.timestamp - a.timestamp;
                if span <= 0.0 {
                    return Some(b.state);
                }

                let t = ((query_time - a.timestamp) / span) as f32;
                return Some(TransformState::interpolate(a.state, b.state, t));
            }
        }

        Some(last.state)
    }

    /// Prune entries older than `cutoff` from the head, always retaining the
    /// newest entry at or before `cutoff` as the left anchor for later
    /// queries. A query between the cutoff and the next sample must still
    /// find a bracketing pair.
    pub fn remove_older_than(&mut self, cutoff: f64) {
        while self.snapshots.len() >= 2 && self.snapshots[1].timestamp <= cutoff {
            self.snapshots.pop_front();
        }
    }

    /// Empty the buffer. Used on teleport and authority loss so no stale
    /// sample is ever interpolated against post-reset state; the next push
    /// succeeds regardless of its timestamp.
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn dropped_out_of_order(&self) -> u64 {
        self.dropped_out_of_order
    }
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn at_x(x: f32) -> TransformState {
        TransformState::from_position(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_bracket_matches_direct_interpolation() {
        let mut buffer = SnapshotBuffer::new();
        buffer.push(1.0, at_x(0.0));
        buffer.push(2.0, at_x(10.0));

        let sampled = buffer.sample(1.25).unwrap();
        let direct = TransformState::interpolate(at_x(0.0), at_x(10.0), 0.25);

        assert!(sampled.position.abs_diff_eq(direct.position, 1e-6));
    }

    #[test]
    fn test_exact_at_endpoints() {
        let mut buffer = SnapshotBuffer::new();
        buffer.push(1.0, at_x(0.0));
        buffer.push(2.0, at_x(10.0));

        assert_eq!(buffer.sample(1.0).unwrap(), at_x(0.0));
        assert_eq!(buffer.sample(2.0).unwrap(), at_x(10.0));
    }

    #[test]
    fn test_no_extrapolation_either_side() {
        let mut buffer = SnapshotBuffer::new();
        buffer.push(1.0, at_x(0.0));
        buffer.push(2.0, at_x(10.0));

        assert_eq!(buffer.sample(0.5).unwrap(), at_x(0.0));
        assert_eq!(buffer.sample(99.0).unwrap(), at_x(10.0));
    }

    #[test]
    fn test_single_entry_returned_directly() {
        let mut buffer = SnapshotBuffer::new();
        buffer.push(5.0, at_x(3.0));

        assert_eq!(buffer.sample(1.0).unwrap(), at_x(3.0));
        assert_eq!(buffer.sample(5.0).unwrap(), at_x(3.0));
        assert_eq!(buffer.sample(9.0).unwrap(), at_x(3.0));
    }

    #[test]
    fn test_empty_buffer_samples_none() {
        let buffer = SnapshotBuffer::new();
        assert!(buffer.sample(1.0).is_none());
    }

    #[test]
    fn test_out_of_order_push_ignored() {
        let mut buffer = SnapshotBuffer::new();
        assert!(buffer.push(1.0, at_x(0.0)));
        assert!(buffer.push(2.0, at_x(1.0)));
        assert!(!buffer.push(1.5, at_x(99.0)));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.sample(2.0).unwrap(), at_x(1.0));
        assert_eq!(buffer.dropped_out_of_order(), 1);
    }

    #[test]
    fn test_equal_timestamp_accepted() {
        let mut buffer = SnapshotBuffer::new();
        assert!(buffer.push(1.0, at_x(0.0)));
        assert!(buffer.push(1.0, at_x(2.0)));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_prune_keeps_left_anchor() {
        let mut buffer = SnapshotBuffer::new();
        buffer.push(1.0, at_x(0.0));
        buffer.push(2.0, at_x(1.0));
        buffer.push(3.0, at_x(2.0));

        buffer.remove_older_than(2.5);

        // Entry at 2.0 survives as the bracket left of 2.5.
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.earliest().unwrap().timestamp, 2.0);

        let sampled = buffer.sample(2.5).unwrap();
        assert!(sampled.position.x > 1.0 && sampled.position.x < 2.0);
    }

    #[test]
    fn test_prune_never_strands_sole_entry() {
        let mut buffer = SnapshotBuffer::new();
        buffer.push(1.0, at_x(0.0));

        buffer.remove_older_than(100.0);

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.sample(100.0).unwrap(), at_x(0.0));
    }

    #[test]
    fn test_clear_then_any_timestamp() {
        let mut buffer = SnapshotBuffer::new();
        buffer.push(100.0, at_x(0.0));
        buffer.clear();

        assert!(buffer.is_empty());
        assert!(buffer.push(1.0, at_x(5.0)));
        assert_eq!(buffer.sample(1.0).unwrap(), at_x(5.0));
    }
}
