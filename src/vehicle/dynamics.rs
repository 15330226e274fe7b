//! Per-tick vehicle integration.
//!
//! Thrust and steering torque go through the physics body's force
//! accumulators. Braking, drag, lateral grip and the speed governor are
//! direct overrides on the body's linear velocity.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rapier3d::prelude::RigidBodyHandle;
use tracing::{debug, info};

use super::config::VehicleConfig;
use super::controls::{ControlState, ControlsSnapshot};
use super::performance::{Grip, Performance};
use super::telemetry::Telemetry;
use super::upgrades::{Unlocks, UpgradeEvent};
use crate::math::{Pose, horizontal, horizontal_speed};
use crate::physics::PhysicsWorld;

pub const MIN_GEAR: u8 = 1;
pub const MAX_GEAR: u8 = 6;

const MS_TO_KMH: f32 = 3.6;
const SKID_STEERING: f32 = 0.7;
const SKID_SPEED: f32 = 5.0; // m/s

/// Read-only view of the chassis, refreshed from the body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub pose: Pose,
    pub velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub speed: f32, // horizontal, m/s
    pub speed_kmh: f32,
    pub rpm: f32,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            pose: Pose::identity(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            speed: 0.0,
            speed_kmh: 0.0,
            rpm: 0.0,
        }
    }
}

/// Result of `add_damage`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    pub damage: f32,
    /// Damage is past the dent/instability threshold.
    pub visual_damage: bool,
}

pub struct VehicleDynamics {
    config: VehicleConfig,
    body: Option<RigidBodyHandle>,
    controls: ControlState,
    performance: Performance,
    grip: Grip,
    unlocks: Unlocks,
    gear: u8,
    engine_cut: bool,
    state: VehicleState,
    rng: StdRng,
}

impl VehicleDynamics {
    pub fn new(config: VehicleConfig, seed: u64) -> Self {
        let mut state = VehicleState::default();
        state.pose.position = config.spawn.into();
        state.rpm = config.base_rpm;
        Self {
            performance: Performance::new(config.engine_power, config.max_speed),
            grip: Grip::new(config.base_grip),
            config,
            body: None,
            controls: ControlState::default(),
            unlocks: Unlocks::default(),
            gear: MIN_GEAR,
            engine_cut: false,
            state,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates the chassis body at the configured spawn point.
    pub fn spawn(&mut self, world: &mut PhysicsWorld) -> RigidBodyHandle {
        let cfg = &self.config;
        let handle = world.create_chassis(
            cfg.spawn,
            cfg.chassis_half_extents,
            cfg.mass,
            cfg.linear_damping,
            self.angular_damping(),
        );
        self.attach(world, handle);
        handle
    }

    /// Drives an existing body.
    pub fn attach(&mut self, world: &mut PhysicsWorld, handle: RigidBodyHandle) {
        self.body = Some(handle);
        self.sync_from_body(world);
    }

    pub fn body(&self) -> Option<RigidBodyHandle> {
        self.body
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn controls(&self) -> &ControlState {
        &self.controls
    }

    pub fn damage(&self) -> f32 {
        self.performance.damage()
    }

    pub fn engine_power(&self) -> f32 {
        self.performance.engine_power()
    }

    pub fn max_speed(&self) -> f32 {
        self.performance.max_speed()
    }

    pub fn grip(&self) -> f32 {
        self.grip.effective()
    }

    pub fn unlocks(&self) -> Unlocks {
        self.unlocks
    }

    pub fn gear(&self) -> u8 {
        self.gear
    }

    pub fn engine_cut(&self) -> bool {
        self.engine_cut
    }

    pub fn has_visual_damage(&self) -> bool {
        self.damage() > self.config.visual_damage_threshold
    }

    /// One fixed tick: smooth controls, queue thrust and steering torque,
    /// then override the horizontal velocity (brake, drag, grip, governor).
    ///
    /// No-op until a body is attached.
    pub fn tick(&mut self, world: &mut PhysicsWorld, input: &ControlsSnapshot, dt: f32) {
        let Some(handle) = self.body else { return };
        let (Some(pose), Some(mut vel)) = (world.pose(handle), world.linvel(handle)) else {
            return;
        };
        let cfg = self.config;

        self.controls.update(input, &cfg);

        let damage = self.performance.damage();
        if damage > cfg.visual_damage_threshold {
            let instability = (damage - cfg.visual_damage_threshold) * cfg.instability_per_damage;
            let jitter = self.rng.gen_range(-0.5_f32..0.5) * instability;
            self.controls.nudge_steering(jitter);
        }

        // Thrust along the body's forward axis, projected onto the ground.
        let forward = pose.forward();
        let boost = if self.unlocks.turbo {
            cfg.turbo_boost_multiplier
        } else {
            cfg.boost_multiplier
        };
        let throttle = if self.engine_cut {
            0.0
        } else {
            self.controls.throttle(boost)
        };
        let thrust = horizontal(&forward) * (throttle * self.performance.engine_power());
        world.add_force(handle, thrust);

        let speed = horizontal_speed(&vel);
        let torque = self.controls.steering * cfg.max_steer_angle * speed * cfg.turn_gain;
        world.add_torque(handle, Vector3::new(0.0, torque, 0.0));

        if self.controls.braking {
            let k = if self.unlocks.brakes {
                cfg.upgraded_brake_factor
            } else {
                cfg.brake_factor
            };
            scale_horizontal(&mut vel, k);
        }

        let drag = (cfg.drag_base - horizontal_speed(&vel) * cfg.drag_per_speed).clamp(0.0, 1.0);
        scale_horizontal(&mut vel, drag);

        // Tires bleed off sideways velocity.
        let fwd_h = horizontal(&forward);
        if fwd_h.norm_squared() > 1e-8 {
            let f = fwd_h.normalize();
            let left = Vector3::new(f.z, 0.0, -f.x);
            let lateral = vel.dot(&left);
            let bleed = (cfg.tire_friction * self.grip.effective() * dt).clamp(0.0, 1.0);
            vel -= left * (lateral * bleed);
        }

        self.govern(&mut vel);
        world.set_linvel(handle, vel);

        self.refresh(pose, vel, world.angvel(handle).unwrap_or_else(Vector3::zeros));
    }

    /// Re-reads the body after a physics step. Re-applies the governor so the
    /// integrated velocity never exceeds the effective top speed.
    pub fn sync_from_body(&mut self, world: &mut PhysicsWorld) {
        let Some(handle) = self.body else { return };
        let (Some(pose), Some(mut vel)) = (world.pose(handle), world.linvel(handle)) else {
            return;
        };
        if self.govern(&mut vel) {
            world.set_linvel(handle, vel);
        }
        let angvel = world.angvel(handle).unwrap_or_else(Vector3::zeros);
        self.refresh(pose, vel, angvel);
    }

    fn govern(&self, vel: &mut Vector3<f32>) -> bool {
        let speed = horizontal_speed(vel);
        let max = self.performance.max_speed();
        if speed > max {
            scale_horizontal(vel, if speed > 0.0 { max / speed } else { 0.0 });
            true
        } else {
            false
        }
    }

    fn refresh(&mut self, pose: Pose, velocity: Vector3<f32>, angular_velocity: Vector3<f32>) {
        let speed = horizontal_speed(&velocity);
        self.state = VehicleState {
            pose,
            velocity,
            angular_velocity,
            speed,
            speed_kmh: speed * MS_TO_KMH,
            rpm: self.rpm_for(speed),
        };
    }

    /// `base + ratio * (max - base) / gear`, ratio = speed / top speed in [0, 1].
    pub fn rpm_for(&self, speed: f32) -> f32 {
        let ratio = (speed.abs() / self.performance.max_speed().max(1e-3)).clamp(0.0, 1.0);
        let cfg = &self.config;
        cfg.base_rpm + ratio * (cfg.max_rpm - cfg.base_rpm) / self.gear as f32
    }

    pub fn speed_ratio(&self) -> f32 {
        (self.state.speed / self.performance.max_speed().max(1e-3)).clamp(0.0, 1.0)
    }

    pub fn add_damage(&mut self, amount: f32) -> DamageOutcome {
        let damage = self.performance.add_damage(amount);
        debug!("Vehicle damage now {:.1}", damage);
        DamageOutcome {
            damage,
            visual_damage: damage > self.config.visual_damage_threshold,
        }
    }

    pub fn repair(&mut self) {
        self.performance.repair();
        info!("Vehicle repaired");
    }

    /// Ambient grip factor (weather). Stacks with tire upgrades.
    pub fn set_grip(&mut self, multiplier: f32) {
        self.grip.set_weather(multiplier);
    }

    pub fn apply_upgrade(&mut self, world: &mut PhysicsWorld, upgrade: UpgradeEvent) {
        match upgrade {
            UpgradeEvent::Engine(factor) => self.performance.scale_base_power(factor),
            UpgradeEvent::Tires(factor) => self.grip.apply_upgrade(factor),
            UpgradeEvent::Turbo(on) => self.unlocks.turbo = on,
            UpgradeEvent::Brakes(on) => self.unlocks.brakes = on,
            UpgradeEvent::Exhaust(on) => self.unlocks.exhaust = on,
            UpgradeEvent::Suspension(on) => {
                self.unlocks.suspension = on;
                if let Some(handle) = self.body {
                    world.set_angular_damping(handle, self.angular_damping());
                }
            }
        }
        info!("Applied upgrade {:?}", upgrade);
    }

    fn angular_damping(&self) -> f32 {
        if self.unlocks.suspension {
            self.config.suspension_angular_damping
        } else {
            self.config.angular_damping
        }
    }

    pub fn set_gear(&mut self, gear: u8) {
        self.gear = gear.clamp(MIN_GEAR, MAX_GEAR);
    }

    pub fn shift_up(&mut self) {
        self.set_gear(self.gear.saturating_add(1));
    }

    pub fn shift_down(&mut self) {
        self.set_gear(self.gear.saturating_sub(1));
    }

    /// Out of fuel: controls still smooth but produce no thrust.
    pub fn set_engine_cut(&mut self, cut: bool) {
        self.engine_cut = cut;
    }

    /// Re-places the chassis upright and at rest. Damage is kept.
    pub fn reset(&mut self, world: &mut PhysicsWorld, position: [f32; 3]) {
        self.controls.clear();
        if let Some(handle) = self.body {
            world.reset_body(handle, position);
            self.sync_from_body(world);
        }
        info!("Vehicle reset to {:?}", position);
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            speed_kmh: self.state.speed_kmh,
            rpm: self.state.rpm,
            gear: self.gear,
            damage: self.damage(),
            grip: self.grip(),
            fuel: 0.0,
            acceleration: self.controls.acceleration,
            steering: self.controls.steering,
            braking: self.controls.braking,
            boosting: self.controls.boosting,
            brake_intensity: if self.controls.braking { self.speed_ratio() } else { 0.0 },
            engine_cut: self.engine_cut,
            skidding: self.controls.steering.abs() > SKID_STEERING && self.state.speed > SKID_SPEED,
            unlocks: self.unlocks,
        }
    }
}

#[inline]
fn scale_horizontal(v: &mut Vector3<f32>, k: f32) {
    v.x *= k;
    v.z *= k;
}
