//! Simulation configuration.
//!
//! Every section falls back to its defaults, so a config file only needs the
//! fields it changes:
//!
//! ```json
//! { "server": { "bind": "127.0.0.1:9100" }, "vehicle": { "max_speed": 25.0 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::camera::CameraConfig;
use crate::error::ConfigError;
use crate::mirrors::MirrorConfig;
use crate::vehicle::VehicleConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub server: ServerConfig,
    pub physics: PhysicsConfig,
    pub vehicle: VehicleConfig,
    pub camera: CameraConfig,
    pub mirrors: MirrorConfig,
    pub world: WorldConfig,
    /// Seed for every random effect (camera jitter, dents, rain drops).
    pub seed: u64,
}

impl SimConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Simulation frames per second.
    pub tick_hz: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9001".to_string(),
            tick_hz: 60,
        }
    }
}

/// Friction/restitution pair for a collider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub friction: f32,
    pub restitution: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialTable {
    pub ground: Material,
    pub road: Material,
    pub building: Material,
    /// Chassis friction is combined with `min`, so 0 makes ground contact
    /// frictionless and leaves grip to the tire model.
    pub chassis: Material,
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self {
            ground: Material { friction: 0.4, restitution: 0.3 },
            road: Material { friction: 0.8, restitution: 0.1 },
            building: Material { friction: 0.8, restitution: 0.3 },
            chassis: Material { friction: 0.0, restitution: 0.2 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Vertical gravity (m/s^2), negative is down.
    pub gravity: f32,
    /// Fixed sub-step length in seconds.
    pub time_step: f32,
    /// Upper bound of sub-steps per frame; leftover time is dropped.
    pub max_sub_steps: u32,
    /// Half size of the square ground slab.
    pub ground_half_extent: f32,
    /// Spawn a static ground slab with its top at y = 0.
    pub ground: bool,
    pub materials: MaterialTable,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: -9.82,
            time_step: 1.0 / 60.0,
            max_sub_steps: 3,
            ground_half_extent: 500.0,
            ground: true,
            materials: MaterialTable::default(),
        }
    }
}

/// Static collision geometry handed over by the world builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub roads: Vec<RoadSpec>,
    pub buildings: Vec<BuildingSpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoadSpec {
    pub start: [f32; 2], // (x, z)
    pub end: [f32; 2],
    pub width: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BuildingSpec {
    pub position: [f32; 3], // centre
    pub size: [f32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg = SimConfig::from_json("{}").unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:9001");
        assert_eq!(cfg.physics.max_sub_steps, 3);
        assert!((cfg.vehicle.max_speed - 20.0).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = SimConfig::from_json(
            r#"{ "server": { "tick_hz": 30 }, "vehicle": { "max_speed": 25.0 }, "seed": 7 }"#,
        )
        .unwrap();
        assert_eq!(cfg.server.tick_hz, 30);
        assert_eq!(cfg.server.bind, "0.0.0.0:9001");
        assert!((cfg.vehicle.max_speed - 25.0).abs() < f32::EPSILON);
        assert!((cfg.vehicle.mass - 1500.0).abs() < f32::EPSILON);
        assert_eq!(cfg.seed, 7);
        assert!(cfg.world.roads.is_empty());
    }

    #[test]
    fn world_geometry_parses() {
        let cfg = SimConfig::from_json(
            r#"{ "world": { "roads": [{ "start": [0, -50], "end": [0, 50], "width": 12 }],
                            "buildings": [{ "position": [30, 10, 0], "size": [10, 20, 10] }] } }"#,
        )
        .unwrap();
        assert_eq!(cfg.world.roads.len(), 1);
        assert_eq!(cfg.world.buildings[0].size, [10.0, 20.0, 10.0]);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = SimConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reports_bad_json() {
        let path = std::env::temp_dir().join(format!("roadster-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let err = SimConfig::load(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
