//! First/third person camera rig.
//!
//! Positions follow the vehicle's yaw only, so the view does not roll or
//! pitch with the chassis. The rig's output is a [`Camera`] for the main pass.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_3};

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::math::{Pose, yaw_rotation};
use crate::scene::Camera;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_deg: f32,
    pub third_person_distance: f32,
    pub third_person_height: f32,
    /// Extra distance/height at full speed factor.
    pub speed_pullback: f32,
    pub speed_rise: f32,
    /// km/h at which the speed factor saturates.
    pub speed_factor_kmh: f32,
    /// Random offset per km/h above `jitter_threshold_kmh`.
    pub jitter_threshold_kmh: f32,
    pub jitter_per_kmh: f32,
    pub seat: [f32; 3],
    pub seat_adjust_limit: f32,
    pub head_bob_intensity: f32,
    pub head_bob_frequency: f32,
    pub head_bob_min_kmh: f32,
    pub look_sensitivity: f32,
    pub max_pitch: f32,
    pub max_yaw: f32,
    pub smoothing: f32,
    pub cinematic_smoothing: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_deg: 75.0,
            third_person_distance: 15.0,
            third_person_height: 5.0,
            speed_pullback: 5.0,
            speed_rise: 2.0,
            speed_factor_kmh: 100.0,
            jitter_threshold_kmh: 50.0,
            jitter_per_kmh: 0.01,
            seat: SeatView::Driver.position(),
            seat_adjust_limit: 1.0,
            head_bob_intensity: 0.05,
            head_bob_frequency: 0.1,
            head_bob_min_kmh: 1.0,
            look_sensitivity: 0.002,
            max_pitch: FRAC_PI_3,
            max_yaw: FRAC_PI_2,
            smoothing: 0.1,
            cinematic_smoothing: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraMode {
    FirstPerson,
    #[default]
    ThirdPerson,
}

/// Seat presets for the first person view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatView {
    Hood,
    Driver,
    Passenger,
    Rear,
}

impl SeatView {
    pub fn position(self) -> [f32; 3] {
        match self {
            SeatView::Hood => [0.0, 1.8, 3.5],
            SeatView::Driver => [0.8, 2.2, 1.5],
            SeatView::Passenger => [-0.8, 2.2, 1.5],
            SeatView::Rear => [0.0, 2.2, -1.5],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatControl {
    Height,
    Distance,
}

/// Mouse look in first person. Positive pitch looks up, positive yaw left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LookAround {
    pub enabled: bool,
    pub pitch: f32,
    pub yaw: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeatAdjustment {
    pub height: f32,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Shake {
    intensity: f32,
    duration: f32,
    remaining: f32,
}

/// What the rig follows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSubject {
    pub pose: Pose,
    pub speed_kmh: f32,
}

pub struct CameraRig {
    config: CameraConfig,
    mode: CameraMode,
    camera: Camera,
    target: Point3<f32>,
    seat: Vector3<f32>,
    seat_adjust: SeatAdjustment,
    look: LookAround,
    cinematic: bool,
    shake: Option<Shake>,
    bob_time: f32,
    rng: StdRng,
}

impl CameraRig {
    pub fn new(config: CameraConfig, seed: u64) -> Self {
        Self {
            camera: Camera::new(config.fov_deg),
            seat: Vector3::from(config.seat),
            config,
            mode: CameraMode::ThirdPerson,
            target: Point3::origin(),
            seat_adjust: SeatAdjustment::default(),
            look: LookAround::default(),
            cinematic: false,
            shake: None,
            bob_time: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn target(&self) -> Point3<f32> {
        self.target
    }

    pub fn look(&self) -> LookAround {
        self.look
    }

    pub fn seat_adjustment(&self) -> SeatAdjustment {
        self.seat_adjust
    }

    pub fn is_cinematic(&self) -> bool {
        self.cinematic
    }

    pub fn is_shaking(&self) -> bool {
        self.shake.is_some()
    }

    /// Flips between first and third person. Look-around is enabled and
    /// zeroed on entering first person, disabled and zeroed on leaving.
    pub fn toggle_mode(&mut self) -> CameraMode {
        self.mode = match self.mode {
            CameraMode::FirstPerson => CameraMode::ThirdPerson,
            CameraMode::ThirdPerson => CameraMode::FirstPerson,
        };
        self.look = LookAround {
            enabled: self.mode == CameraMode::FirstPerson,
            pitch: 0.0,
            yaw: 0.0,
        };
        debug!("Camera mode {:?}", self.mode);
        self.mode
    }

    /// Mouse movement in pixels. Ignored unless looking around.
    pub fn look_by(&mut self, dx: f32, dy: f32) {
        if self.mode != CameraMode::FirstPerson || !self.look.enabled {
            return;
        }
        if !(dx.is_finite() && dy.is_finite()) {
            return;
        }
        let s = self.config.look_sensitivity;
        self.look.yaw = (self.look.yaw - dx * s).clamp(-self.config.max_yaw, self.config.max_yaw);
        self.look.pitch =
            (self.look.pitch - dy * s).clamp(-self.config.max_pitch, self.config.max_pitch);
    }

    /// Seat tweaks only apply in first person.
    pub fn adjust_seat(&mut self, control: SeatControl, value: f32) {
        if self.mode != CameraMode::FirstPerson || !value.is_finite() {
            return;
        }
        let limit = self.config.seat_adjust_limit;
        let v = value.clamp(-limit, limit);
        match control {
            SeatControl::Height => self.seat_adjust.height = v,
            SeatControl::Distance => self.seat_adjust.distance = v,
        }
    }

    pub fn reset_seat(&mut self) {
        self.seat_adjust = SeatAdjustment::default();
    }

    pub fn set_seat_view(&mut self, view: SeatView) {
        if self.mode == CameraMode::FirstPerson {
            self.seat = Vector3::from(view.position());
        }
    }

    pub fn set_cinematic(&mut self, enabled: bool) {
        self.cinematic = enabled;
    }

    fn smoothing(&self) -> f32 {
        if self.cinematic {
            self.config.cinematic_smoothing
        } else {
            self.config.smoothing
        }
    }

    /// Starts an impact shake that fades out over `duration` seconds.
    pub fn add_shake(&mut self, intensity: f32, duration: f32) {
        if intensity.is_finite() && duration.is_finite() && intensity > 0.0 && duration > 0.0 {
            self.shake = Some(Shake {
                intensity,
                duration,
                remaining: duration,
            });
        }
    }

    /// Head bob offset in seat space. Zero at or below the minimum speed.
    pub fn head_bob(&self, time: f32, speed_kmh: f32) -> Vector3<f32> {
        let cfg = &self.config;
        if !(speed_kmh > cfg.head_bob_min_kmh) || !time.is_finite() {
            return Vector3::zeros();
        }
        let amount = cfg.head_bob_intensity * (speed_kmh / cfg.speed_factor_kmh).min(1.0);
        let phase = time * cfg.head_bob_frequency * speed_kmh;
        Vector3::new((phase * 0.7).cos() * amount * 0.5, phase.sin() * amount, 0.0)
    }

    /// Recomputes the view. No-op without a subject.
    pub fn update(&mut self, subject: Option<&CameraSubject>, dt: f32) {
        let Some(subject) = subject else { return };
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.bob_time += dt;

        let yaw = yaw_rotation(subject.pose.yaw());
        let origin = subject.pose.position;
        self.target = match self.mode {
            CameraMode::ThirdPerson => self.third_person_target(&origin, &yaw, subject.speed_kmh),
            CameraMode::FirstPerson => {
                let offset = self.seat
                    + Vector3::new(0.0, self.seat_adjust.height, self.seat_adjust.distance)
                    + self.head_bob(self.bob_time, subject.speed_kmh);
                origin + yaw * offset
            }
        };
        self.apply_shake(dt);

        let s = self.smoothing();
        self.camera.position += (self.target - self.camera.position) * s;

        match self.mode {
            CameraMode::ThirdPerson => self.camera.look_at(&origin),
            CameraMode::FirstPerson => {
                self.camera.rotation = yaw
                    * yaw_rotation(self.look.yaw)
                    * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -self.look.pitch);
            }
        }
    }

    fn third_person_target(
        &mut self,
        origin: &Point3<f32>,
        yaw: &UnitQuaternion<f32>,
        speed_kmh: f32,
    ) -> Point3<f32> {
        let cfg = &self.config;
        let k = (speed_kmh.abs() / cfg.speed_factor_kmh).min(1.0);
        let offset = Vector3::new(
            0.0,
            cfg.third_person_height + k * cfg.speed_rise,
            -(cfg.third_person_distance + k * cfg.speed_pullback),
        );
        let mut target = origin + yaw * offset;

        if speed_kmh > cfg.jitter_threshold_kmh {
            let amount = (speed_kmh - cfg.jitter_threshold_kmh) * cfg.jitter_per_kmh;
            target.x += self.rng.gen_range(-0.5_f32..0.5) * amount;
            target.y += self.rng.gen_range(-0.5_f32..0.5) * amount;
        }
        target
    }

    fn apply_shake(&mut self, dt: f32) {
        let Some(shake) = self.shake.as_mut() else { return };
        shake.remaining -= dt;
        if shake.remaining <= 0.0 {
            self.shake = None;
            return;
        }
        let amount = shake.intensity * (shake.remaining / shake.duration);
        let jitter = Vector3::new(
            self.rng.gen_range(-0.5_f32..0.5),
            self.rng.gen_range(-0.5_f32..0.5),
            self.rng.gen_range(-0.5_f32..0.5),
        );
        self.target += jitter * amount;
    }
}
