//! Composition root: owns every subsystem and runs them in frame order.
//!
//! Per frame: physics sub-steps (dynamics tick, step, read back) → session →
//! presentation sync → camera → mirror poses/effects → mirror passes → main
//! pass. Each stage reads what the previous one wrote this frame.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::camera::{CameraMode, CameraRig, CameraSubject, LookAround, SeatControl, SeatView};
use crate::config::SimConfig;
use crate::error::RenderError;
use crate::math::{p3, q4, v3};
use crate::mirrors::{MirrorName, MirrorRenderer, MirrorSnapshot};
use crate::physics::{MaterialKind, PhysicsWorld};
use crate::presentation::VehiclePresentation;
use crate::scene::{FrameRecorder, Renderer, Scene};
use crate::session::Session;
use crate::vehicle::{ControlsSnapshot, Telemetry, UpgradeEvent, VehicleDynamics};
use crate::weather::Weather;

/// Shake per damage point, and how long it lasts (s).
const SHAKE_PER_DAMAGE: f32 = 0.02;
const SHAKE_DURATION: f32 = 0.5;

/// Discrete events from the UI / shops / world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SimCommand {
    ToggleCamera,
    Look { dx: f32, dy: f32 },
    /// `control` is a UI id such as `leftMirrorH`; `value` is degrees.
    AdjustMirror { control: String, value: f32 },
    ResetMirrors,
    AdjustSeat { control: SeatControl, value: f32 },
    ResetSeat,
    SeatView { view: SeatView },
    Cinematic { enabled: bool },
    SetWeather { weather: Weather },
    Upgrade { upgrade: UpgradeEvent },
    Repair,
    Damage { amount: f32 },
    Refuel,
    ShiftUp,
    ShiftDown,
    CleanMirror { mirror: MirrorName },
    DriverHeight { height: f32 },
    Reset,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleSnapshot {
    pub position: [f32; 3],
    pub rotation: [f32; 4], // x, y, z, w
    pub velocity: [f32; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraSnapshot {
    pub mode: CameraMode,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub look: LookAround,
    pub cinematic: bool,
}

/// Everything a client needs to draw one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
    pub tick: u64,
    pub telemetry: Telemetry,
    pub vehicle: VehicleSnapshot,
    pub camera: CameraSnapshot,
    pub mirrors: Vec<MirrorSnapshot>,
    pub weather: Weather,
    pub headlights: bool,
    pub dents: usize,
}

pub struct Simulation<R: Renderer = FrameRecorder> {
    config: SimConfig,
    world: PhysicsWorld,
    scene: Scene,
    renderer: R,
    dynamics: VehicleDynamics,
    presentation: VehiclePresentation,
    camera: CameraRig,
    mirrors: MirrorRenderer,
    session: Session,
    weather: Weather,
    rng: StdRng,
    tick: u64,
}

impl Simulation<FrameRecorder> {
    /// Headless simulation with a recording renderer.
    pub fn headless(config: SimConfig) -> Result<Self, RenderError> {
        Self::new(config, FrameRecorder::default())
    }
}

impl<R: Renderer> Simulation<R> {
    pub fn new(config: SimConfig, mut renderer: R) -> Result<Self, RenderError> {
        let seed = config.seed;
        let mut world = PhysicsWorld::new(&config.physics);
        for road in &config.world.roads {
            world.create_road_segment(road.start, road.end, road.width);
        }
        for b in &config.world.buildings {
            world.create_static_box(b.position, b.size, MaterialKind::Building);
        }

        let mut scene = Scene::new();
        let presentation = VehiclePresentation::build(&mut scene);

        let mut dynamics = VehicleDynamics::new(config.vehicle, seed);
        dynamics.spawn(&mut world);

        let mirrors =
            MirrorRenderer::new(config.mirrors.clone(), &mut renderer, seed.wrapping_add(1))?;
        let camera = CameraRig::new(config.camera.clone(), seed.wrapping_add(2));

        let mut sim = Self {
            config,
            world,
            scene,
            renderer,
            dynamics,
            presentation,
            camera,
            mirrors,
            session: Session::new(),
            weather: Weather::Clear,
            rng: StdRng::seed_from_u64(seed.wrapping_add(3)),
            tick: 0,
        };
        sim.set_weather(Weather::Clear);
        info!(
            "Simulation ready ({} static bodies from world config)",
            sim.config.world.roads.len() + sim.config.world.buildings.len()
        );
        Ok(sim)
    }

    /// Advances one rendered frame of `dt` seconds.
    pub fn frame(&mut self, controls: &ControlsSnapshot, dt: f32) {
        self.tick += 1;
        self.renderer.begin_frame();

        let step = self.world.time_step();
        for _ in 0..self.world.substeps_due(dt) {
            self.dynamics.tick(&mut self.world, controls, step);
            self.world.step();
            self.dynamics.sync_from_body(&mut self.world);
        }

        let empty = self.session.consume(self.dynamics.state().speed_kmh, controls.boost);
        self.dynamics.set_engine_cut(empty);

        let state = *self.dynamics.state();
        let has_body = self.dynamics.body().is_some();
        self.presentation.sync(
            &mut self.scene,
            &state.pose,
            state.speed,
            self.dynamics.controls().steering,
            self.dynamics.config().max_steer_angle,
        );

        let subject = has_body.then_some(CameraSubject {
            pose: state.pose,
            speed_kmh: state.speed_kmh,
        });
        self.camera.update(subject.as_ref(), dt);

        let vehicle_pose = has_body.then_some(state.pose);
        self.mirrors.update(vehicle_pose.as_ref());
        if self.mirrors.should_render(self.camera.mode() == CameraMode::FirstPerson) {
            self.mirrors.render(&mut self.scene, &mut self.renderer, &self.presentation);
        }

        self.renderer.render(&self.scene, self.camera.camera());
    }

    pub fn apply(&mut self, command: SimCommand) {
        debug!("command {:?}", command);
        match command {
            SimCommand::ToggleCamera => {
                self.camera.toggle_mode();
            }
            SimCommand::Look { dx, dy } => self.camera.look_by(dx, dy),
            SimCommand::AdjustMirror { control, value } => {
                self.mirrors.adjust_mirror(&control, value);
            }
            SimCommand::ResetMirrors => self.mirrors.reset_all(),
            SimCommand::AdjustSeat { control, value } => self.camera.adjust_seat(control, value),
            SimCommand::ResetSeat => self.camera.reset_seat(),
            SimCommand::SeatView { view } => self.camera.set_seat_view(view),
            SimCommand::Cinematic { enabled } => self.camera.set_cinematic(enabled),
            SimCommand::SetWeather { weather } => self.set_weather(weather),
            SimCommand::Upgrade { upgrade } => {
                self.dynamics.apply_upgrade(&mut self.world, upgrade)
            }
            SimCommand::Repair => {
                self.dynamics.repair();
                self.presentation.repair(&mut self.scene);
            }
            SimCommand::Damage { amount } => self.add_damage(amount),
            SimCommand::Refuel => {
                self.session.refuel();
                self.dynamics.set_engine_cut(false);
            }
            SimCommand::ShiftUp => {
                let gear = self.session.shift_up();
                self.dynamics.set_gear(gear);
            }
            SimCommand::ShiftDown => {
                let gear = self.session.shift_down();
                self.dynamics.set_gear(gear);
            }
            SimCommand::CleanMirror { mirror } => self.mirrors.clean_mirror(mirror),
            SimCommand::DriverHeight { height } => {
                self.mirrors.auto_adjust_for_driver_height(height)
            }
            SimCommand::Reset => {
                let spawn = self.dynamics.config().spawn;
                self.dynamics.reset(&mut self.world, spawn);
            }
        }
    }

    fn add_damage(&mut self, amount: f32) {
        let outcome = self.dynamics.add_damage(amount);
        if outcome.visual_damage {
            self.presentation.add_visual_damage(&mut self.scene, &mut self.rng);
        }
        if amount.is_finite() && amount > 0.0 {
            self.camera.add_shake(amount * SHAKE_PER_DAMAGE, SHAKE_DURATION);
        }
    }

    fn set_weather(&mut self, weather: Weather) {
        let effects = weather.effects();
        self.weather = weather;
        self.dynamics.set_grip(effects.grip);
        self.mirrors.apply_weather(&effects);
        self.presentation.set_headlights(&mut self.scene, effects.headlights);
        info!("Weather set to {}", weather);
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        let state = self.dynamics.state();
        let cam = self.camera.camera();
        FrameSnapshot {
            tick: self.tick,
            telemetry: self.dynamics.telemetry().with_fuel(self.session.fuel()),
            vehicle: VehicleSnapshot {
                position: p3(&state.pose.position),
                rotation: q4(&state.pose.rotation),
                velocity: v3(&state.velocity),
            },
            camera: CameraSnapshot {
                mode: self.camera.mode(),
                position: p3(&cam.position),
                rotation: q4(&cam.rotation),
                look: self.camera.look(),
                cinematic: self.camera.is_cinematic(),
            },
            mirrors: self.mirrors.snapshot(),
            weather: self.weather,
            headlights: self.presentation.headlights_on(&self.scene),
            dents: self.presentation.dent_count(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn weather(&self) -> Weather {
        self.weather
    }

    pub fn dynamics(&self) -> &VehicleDynamics {
        &self.dynamics
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    pub fn mirrors(&self) -> &MirrorRenderer {
        &self.mirrors
    }

    pub fn presentation(&self) -> &VehiclePresentation {
        &self.presentation
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_tagged_json() {
        let json = r#"{"command":"adjust_mirror","control":"leftMirrorH","value":15}"#;
        let cmd: SimCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            cmd,
            SimCommand::AdjustMirror {
                control: "leftMirrorH".into(),
                value: 15.0
            }
        );
        let cmd: SimCommand =
            serde_json::from_str(r#"{"command":"upgrade","upgrade":{"type":"tires","value":1.3}}"#)
                .unwrap();
        assert_eq!(
            cmd,
            SimCommand::Upgrade {
                upgrade: UpgradeEvent::Tires(1.3)
            }
        );
        let cmd: SimCommand =
            serde_json::from_str(r#"{"command":"set_weather","weather":"storm"}"#).unwrap();
        assert_eq!(cmd, SimCommand::SetWeather { weather: Weather::Storm });
    }

    #[test]
    fn third_person_frame_renders_main_pass_only() {
        let mut sim = Simulation::headless(SimConfig::default()).unwrap();
        sim.frame(&ControlsSnapshot::IDLE, 1.0 / 60.0);
        let passes = sim.renderer().passes();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].target, None);
    }

    #[test]
    fn first_person_frame_renders_mirrors_before_main_pass() {
        let mut sim = Simulation::headless(SimConfig::default()).unwrap();
        sim.apply(SimCommand::ToggleCamera);
        sim.frame(&ControlsSnapshot::IDLE, 1.0 / 60.0);
        let passes = sim.renderer().passes();
        assert_eq!(passes.len(), 4);
        assert!(passes[..3].iter().all(|p| p.target.is_some()));
        assert_eq!(passes[3].target, None);
        // Main pass sees the car again.
        let body = sim.presentation().body_nodes()[0];
        assert!(passes[3].drawn.contains(&body));
    }

    #[test]
    fn weather_drives_grip_lights_and_mirrors() {
        let mut sim = Simulation::headless(SimConfig::default()).unwrap();
        sim.apply(SimCommand::Upgrade {
            upgrade: UpgradeEvent::Tires(1.3),
        });
        sim.apply(SimCommand::SetWeather { weather: Weather::Rain });
        assert!((sim.dynamics().grip() - 0.65 * 1.3).abs() < 1e-6);
        assert!(!sim.snapshot().headlights);
        assert!(sim.mirrors().drop_count(MirrorName::Rear) > 0);

        sim.apply(SimCommand::SetWeather { weather: Weather::Night });
        assert!(sim.snapshot().headlights);
        assert_eq!(sim.mirrors().drop_count(MirrorName::Rear), 0);
    }

    #[test]
    fn damage_dents_and_shakes() {
        let mut sim = Simulation::headless(SimConfig::default()).unwrap();
        sim.apply(SimCommand::Damage { amount: 30.0 });
        assert_eq!(sim.snapshot().dents, 0);
        assert!(sim.camera().is_shaking());
        sim.apply(SimCommand::Damage { amount: 30.0 });
        assert_eq!(sim.snapshot().dents, 3);
        sim.apply(SimCommand::Repair);
        let snap = sim.snapshot();
        assert_eq!(snap.dents, 0);
        assert_eq!(snap.telemetry.damage, 0.0);
    }

    #[test]
    fn gear_commands_feed_rpm() {
        let mut sim = Simulation::headless(SimConfig::default()).unwrap();
        sim.apply(SimCommand::ShiftUp);
        sim.apply(SimCommand::ShiftUp);
        assert_eq!(sim.dynamics().gear(), 3);
        assert_eq!(sim.session().gear(), 3);
        sim.apply(SimCommand::ShiftDown);
        assert_eq!(sim.snapshot().telemetry.gear, 2);
    }

    #[test]
    fn snapshot_serializes() {
        let mut sim = Simulation::headless(SimConfig::default()).unwrap();
        sim.apply(SimCommand::ToggleCamera);
        sim.frame(&ControlsSnapshot::forward(), 1.0 / 60.0);
        let json = serde_json::to_value(sim.snapshot()).unwrap();
        assert_eq!(json["tick"], 1);
        assert_eq!(json["camera"]["mode"], "first_person");
        assert_eq!(json["weather"], "clear");
        assert_eq!(json["mirrors"].as_array().map(Vec::len), Some(3));
        assert!(json["telemetry"]["fuel"].as_f64().unwrap() < 100.0);
    }
}
