//! Arcade vehicle model: smoothed controls, damage/grip/upgrades and the
//! per-tick force integration against the chassis body.

pub mod config;
pub mod controls;
pub mod dynamics;
pub mod performance;
pub mod telemetry;
pub mod upgrades;

pub use config::{SEDAN, VehicleConfig};
pub use controls::{ControlState, ControlsSnapshot};
pub use dynamics::{DamageOutcome, VehicleDynamics, VehicleState};
pub use performance::{Grip, Performance};
pub use telemetry::Telemetry;
pub use upgrades::{Unlocks, UpgradeEvent};
