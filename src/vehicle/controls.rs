//! Driver input as a per-frame value object, plus the smoothed control state
//! the dynamics integrate.

use serde::{Deserialize, Serialize};

use super::config::VehicleConfig;

/// Lower bound of the smoothed throttle (full reverse).
pub const ACCEL_MIN: f32 = -0.5;
/// Upper bound of the smoothed throttle.
pub const ACCEL_MAX: f32 = 1.0;
/// Steering is normalized to `[-STEER_LIMIT, STEER_LIMIT]`, positive = left.
pub const STEER_LIMIT: f32 = 1.0;

/// Which buttons are held this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsSnapshot {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub brake: bool,
    pub boost: bool,
}

impl ControlsSnapshot {
    pub const IDLE: Self = Self {
        forward: false,
        backward: false,
        left: false,
        right: false,
        brake: false,
        boost: false,
    };

    pub fn forward() -> Self {
        Self {
            forward: true,
            ..Self::IDLE
        }
    }
}

/// Smoothed driver intent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlState {
    pub acceleration: f32, // ACCEL_MIN..=ACCEL_MAX
    pub steering: f32,     // -1..=1, positive = left
    pub braking: bool,
    pub boosting: bool,
}

impl ControlState {
    /// One tick of smoothing. Held buttons ramp additively; released ones decay
    /// multiplicatively toward 0. Forward beats backward, left beats right.
    pub fn update(&mut self, input: &ControlsSnapshot, cfg: &VehicleConfig) {
        let accel = if input.forward {
            self.acceleration + cfg.accel_step
        } else if input.backward {
            self.acceleration - cfg.accel_step
        } else {
            self.acceleration * cfg.accel_decay
        };
        self.acceleration = sanitize(accel).clamp(ACCEL_MIN, ACCEL_MAX);

        let steer = if input.left {
            self.steering + cfg.steer_step
        } else if input.right {
            self.steering - cfg.steer_step
        } else {
            self.steering * cfg.steer_decay
        };
        self.steering = sanitize(steer).clamp(-STEER_LIMIT, STEER_LIMIT);

        self.braking = input.brake;
        self.boosting = input.boost;
    }

    /// Adds noise to the steering, keeping it in range.
    pub fn nudge_steering(&mut self, delta: f32) {
        self.steering = sanitize(self.steering + delta).clamp(-STEER_LIMIT, STEER_LIMIT);
    }

    /// Throttle as applied this tick. Boost scales the output only; the stored
    /// acceleration is never inflated by it.
    pub fn throttle(&self, boost_multiplier: f32) -> f32 {
        if self.boosting {
            self.acceleration * boost_multiplier
        } else {
            self.acceleration
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[inline]
fn sanitize(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::SEDAN;
    use proptest::prelude::*;

    #[test]
    fn throttle_ramps_and_saturates() {
        let mut c = ControlState::default();
        let input = ControlsSnapshot::forward();
        c.update(&input, &SEDAN);
        assert!((c.acceleration - 0.02).abs() < 1e-6);
        for _ in 0..100 {
            c.update(&input, &SEDAN);
        }
        assert_eq!(c.acceleration, ACCEL_MAX);
    }

    #[test]
    fn reverse_is_limited_to_half() {
        let mut c = ControlState::default();
        let input = ControlsSnapshot {
            backward: true,
            ..ControlsSnapshot::IDLE
        };
        for _ in 0..100 {
            c.update(&input, &SEDAN);
        }
        assert_eq!(c.acceleration, ACCEL_MIN);
    }

    #[test]
    fn released_inputs_decay_toward_zero() {
        let mut c = ControlState {
            acceleration: 1.0,
            steering: -1.0,
            ..ControlState::default()
        };
        c.update(&ControlsSnapshot::IDLE, &SEDAN);
        assert!((c.acceleration - 0.95).abs() < 1e-6);
        assert!((c.steering + 0.9).abs() < 1e-6);
        for _ in 0..300 {
            c.update(&ControlsSnapshot::IDLE, &SEDAN);
        }
        assert!(c.acceleration.abs() < 1e-4);
        assert!(c.steering.abs() < 1e-4);
    }

    #[test]
    fn boost_is_not_persisted() {
        let mut c = ControlState::default();
        let boosted = ControlsSnapshot {
            forward: true,
            boost: true,
            ..ControlsSnapshot::IDLE
        };
        for _ in 0..60 {
            c.update(&boosted, &SEDAN);
        }
        assert_eq!(c.acceleration, 1.0);
        assert!((c.throttle(1.5) - 1.5).abs() < 1e-6);

        c.update(&ControlsSnapshot::forward(), &SEDAN);
        assert_eq!(c.throttle(1.5), 1.0);
    }

    #[test]
    fn left_steers_positive() {
        let mut c = ControlState::default();
        let input = ControlsSnapshot {
            left: true,
            ..ControlsSnapshot::IDLE
        };
        c.update(&input, &SEDAN);
        assert!(c.steering > 0.0);
    }

    fn any_snapshot() -> impl Strategy<Value = ControlsSnapshot> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>())
            .prop_map(|(forward, backward, left, right, brake, boost)| ControlsSnapshot {
                forward,
                backward,
                left,
                right,
                brake,
                boost,
            })
    }

    proptest! {
        #[test]
        fn smoothed_controls_stay_in_range(
            inputs in prop::collection::vec(any_snapshot(), 0..400),
            noise in prop::collection::vec(-5.0f32..5.0, 0..400),
        ) {
            let mut c = ControlState::default();
            for (i, input) in inputs.iter().enumerate() {
                c.update(input, &SEDAN);
                if let Some(n) = noise.get(i) {
                    c.nudge_steering(*n);
                }
                prop_assert!((ACCEL_MIN..=ACCEL_MAX).contains(&c.acceleration));
                prop_assert!((-STEER_LIMIT..=STEER_LIMIT).contains(&c.steering));
            }
        }
    }
}
