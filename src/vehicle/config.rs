use serde::{Deserialize, Serialize};

/// Tunables for the arcade vehicle model.
///
/// "Per tick" factors are applied once per fixed physics sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub mass: f32,                      // kg
    pub engine_power: f32,              // N of thrust at full throttle, undamaged
    pub max_speed: f32,                 // m/s, undamaged top speed
    pub max_steer_angle: f32,           // radians
    pub turn_gain: f32,                 // tunable; torque = steer * max_steer * speed * gain

    // --- Control smoothing (per tick) ---
    pub accel_step: f32,                // throttle ramp while held
    pub accel_decay: f32,               // multiplicative return to 0
    pub steer_step: f32,                // steering ramp while held
    pub steer_decay: f32,               // multiplicative return to centre
    pub boost_multiplier: f32,          // thrust scale while boost held
    pub turbo_boost_multiplier: f32,    // same, once the turbo is unlocked

    // --- Velocity overrides (per tick) ---
    pub brake_factor: f32,              // horizontal velocity scale while braking
    pub upgraded_brake_factor: f32,     // same, with performance brakes
    pub drag_base: f32,                 // drag = base - speed * per_speed
    pub drag_per_speed: f32,

    // --- Tires ---
    pub base_grip: f32,                 // grip multiplier before weather/upgrades
    pub tire_friction: f32,             // lateral velocity removed per second at grip 1

    // --- Engine note ---
    pub base_rpm: f32,
    pub max_rpm: f32,

    // --- Chassis ---
    pub chassis_half_extents: [f32; 3], // [hx, hy, hz] meters
    pub spawn: [f32; 3],                // world spawn position
    pub linear_damping: f32,
    pub angular_damping: f32,           // yaw settles without steering input
    pub suspension_angular_damping: f32, // with the suspension upgrade

    // --- Damage ---
    pub visual_damage_threshold: f32,   // dents + steering instability above this
    pub instability_per_damage: f32,    // steering noise per damage point over threshold
}

/// Mid-size hatchback; stock arcade tuning.
pub const SEDAN: VehicleConfig = VehicleConfig {
    mass: 1500.0,
    engine_power: 90_000.0,
    max_speed: 20.0,
    max_steer_angle: 0.5,
    turn_gain: 4_000.0,

    accel_step: 0.02,
    accel_decay: 0.95,
    steer_step: 0.03,
    steer_decay: 0.9,
    boost_multiplier: 1.5,
    turbo_boost_multiplier: 1.75,

    brake_factor: 0.9,
    upgraded_brake_factor: 0.85,
    drag_base: 0.98,
    drag_per_speed: 0.001,

    base_grip: 1.0,
    tire_friction: 5.0,

    base_rpm: 800.0,
    max_rpm: 6000.0,

    chassis_half_extents: [2.25, 0.9, 4.0],
    spawn: [0.0, 2.0, 0.0],
    linear_damping: 0.0,
    angular_damping: 2.0,
    suspension_angular_damping: 3.0,

    visual_damage_threshold: 50.0,
    instability_per_damage: 0.001,
};

impl Default for VehicleConfig {
    fn default() -> Self {
        SEDAN
    }
}
