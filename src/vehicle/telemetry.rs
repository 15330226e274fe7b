use serde::Serialize;

use super::upgrades::Unlocks;

/// Per-frame HUD/audio signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Telemetry {
    pub speed_kmh: f32,
    pub rpm: f32,
    pub gear: u8,
    pub damage: f32,
    pub grip: f32,
    pub fuel: f32, // 0..=100, filled in by the session
    pub acceleration: f32,
    pub steering: f32,
    pub braking: bool,
    pub boosting: bool,
    /// 0..1, braking scaled by speed ratio; drives the brake squeal.
    pub brake_intensity: f32,
    pub engine_cut: bool,
    /// Hard steering at speed; drives tire squeal.
    pub skidding: bool,
    pub unlocks: Unlocks,
}

impl Telemetry {
    pub fn with_fuel(mut self, fuel: f32) -> Self {
        self.fuel = fuel;
        self
    }
}
