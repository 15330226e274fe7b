//! Game state around the car: fuel and the gear selector.

use serde::Serialize;
use tracing::info;

use crate::vehicle::dynamics::{MAX_GEAR, MIN_GEAR};

pub const FULL_TANK: f32 = 100.0;

const FUEL_PER_KMH: f32 = 0.001;
const FUEL_IDLE: f32 = 0.0005;
const BOOST_FUEL_FACTOR: f32 = 2.0;

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    fuel: f32,
    gear: u8,
    frames: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            fuel: FULL_TANK,
            gear: MIN_GEAR,
            frames: 0,
        }
    }

    pub fn fuel(&self) -> f32 {
        self.fuel
    }

    pub fn gear(&self) -> u8 {
        self.gear
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_out_of_fuel(&self) -> bool {
        self.fuel <= 0.0
    }

    /// Burns one frame's worth of fuel. Returns true once the tank is empty.
    pub fn consume(&mut self, speed_kmh: f32, boosting: bool) -> bool {
        self.frames += 1;
        let speed = if speed_kmh.is_finite() { speed_kmh.abs() } else { 0.0 };
        let mut burn = speed * FUEL_PER_KMH + FUEL_IDLE;
        if boosting {
            burn *= BOOST_FUEL_FACTOR;
        }
        let was_empty = self.is_out_of_fuel();
        self.fuel = (self.fuel - burn).max(0.0);
        if self.is_out_of_fuel() && !was_empty {
            info!("Out of fuel");
        }
        self.is_out_of_fuel()
    }

    pub fn refuel(&mut self) {
        self.fuel = FULL_TANK;
    }

    pub fn shift_up(&mut self) -> u8 {
        self.gear = (self.gear + 1).min(MAX_GEAR);
        self.gear
    }

    pub fn shift_down(&mut self) -> u8 {
        self.gear = self.gear.saturating_sub(1).max(MIN_GEAR);
        self.gear
    }
}
