use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A spatial transform sample: position plus unit-quaternion rotation.
///
/// Immutable value type; always copied, never aliased.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    pub position: Vec3,
    pub rotation: Quat,
}

impl TransformState {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Blend between two states with `t` clamped to `[0, 1]`.
    ///
    /// Position is lerped component-wise; rotation takes the shortest-arc
    /// spherical blend and is renormalized to unit length. No extrapolation
    /// happens outside the clamp range.
    pub fn interpolate(a: Self, b: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);

        Self {
            position: a.position.lerp(b.position, t),
            rotation: a.rotation.slerp(b.rotation, t).normalize(),
        }
    }

    /// Angle in radians between this state's rotation and `other`'s.
    pub fn angle_to(&self, other: &Self) -> f32 {
        self.rotation.angle_between(other.rotation)
    }

    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.position.abs_diff_eq(other.position, epsilon)
            && self.angle_to(other) <= epsilon
    }
}

impl Default for TransformState {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_interpolate_midpoint() {
        let a = TransformState::from_position(Vec3::ZERO);
        let b = TransformState::from_position(Vec3::new(10.0, -4.0, 2.0));

        let mid = TransformState::interpolate(a, b, 0.5);

        assert!(mid.position.abs_diff_eq(Vec3::new(5.0, -2.0, 1.0), 1e-6));
    }

    #[test]
    fn test_interpolate_endpoints_exact() {
        let a = TransformState::new(Vec3::X, Quat::from_rotation_y(0.3));
        let b = TransformState::new(Vec3::Y, Quat::from_rotation_y(1.1));

        let start = TransformState::interpolate(a, b, 0.0);
        let end = TransformState::interpolate(a, b, 1.0);
        assert!(start.approx_eq(&a, 1e-5));
        assert!(end.approx_eq(&b, 1e-5));
    }

    #[test]
    fn test_interpolate_clamps_t() {
        let a = TransformState::from_position(Vec3::ZERO);
        let b = TransformState::from_position(Vec3::X);

        let below = TransformState::interpolate(a, b, -2.0);
        let above = TransformState::interpolate(a, b, 3.0);

        assert!(below.position.abs_diff_eq(a.position, 1e-6));
        assert!(above.position.abs_diff_eq(b.position, 1e-6));
    }

    #[test]
    fn test_interpolate_rotation_stays_unit() {
        let a = TransformState::new(Vec3::ZERO, Quat::from_rotation_z(0.1));
        let b = TransformState::new(Vec3::ZERO, Quat::from_rotation_z(FRAC_PI_2));

        let mid = TransformState::interpolate(a, b, 0.37);

        assert!((mid.rotation.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_angle_to() {
        let a = TransformState::new(Vec3::ZERO, Quat::IDENTITY);
        let b = TransformState::new(Vec3::ZERO, Quat::from_rotation_y(FRAC_PI_2));

        assert!((a.angle_to(&b) - FRAC_PI_2).abs() < 1e-5);
    }
}
