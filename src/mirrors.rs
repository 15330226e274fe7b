//! Rear-view mirrors: three off-screen passes per frame.
//!
//! Each mirror owns a camera, a fixed-size render target and a user
//! adjustment. Adjustments rotate the mirror's look direction in the vehicle
//! frame, before the vehicle's own rotation, so they turn with the car.
//!
//! Render protocol per frame:
//! 1. remember the bound render target
//! 2. per mirror: hide the whole car and this mirror's surface, bind and clear
//!    the mirror target, render, restore visibility, apply overlays
//! 3. rebind the remembered target
//!
//! A mirror without a camera (not yet posed) or without a live target is
//! skipped; the others still render.

use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::RenderError;
use crate::math::{Pose, euler_xyz, p3};
use crate::presentation::{VehiclePresentation, mirror_attachment};
use crate::scene::{Camera, OverlayEffect, RenderTargetId, Renderer, Scene};
use crate::weather::WeatherEffects;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorName {
    Left,
    Right,
    Rear,
}

impl MirrorName {
    pub const ALL: [MirrorName; 3] = [MirrorName::Left, MirrorName::Right, MirrorName::Rear];

    pub fn index(self) -> usize {
        match self {
            MirrorName::Left => 0,
            MirrorName::Right => 1,
            MirrorName::Rear => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MirrorName::Left => "left",
            MirrorName::Right => "right",
            MirrorName::Rear => "rear",
        }
    }

    /// Unadjusted look direction, vehicle frame. Side mirrors look back and
    /// out, slightly down.
    pub fn base_direction(self) -> Vector3<f32> {
        match self {
            MirrorName::Left => Vector3::new(1.0, -0.2, -1.0).normalize(),
            MirrorName::Right => Vector3::new(-1.0, -0.2, -1.0).normalize(),
            MirrorName::Rear => Vector3::new(0.0, 0.0, -1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorAxis {
    Horizontal,
    Vertical,
}

/// Parses UI control ids such as `leftMirrorH` or `rearMirrorV`.
pub fn parse_control(id: &str) -> Option<(MirrorName, MirrorAxis)> {
    let (name, axis) = id.split_once("Mirror")?;
    let name = MirrorName::ALL.into_iter().find(|n| n.as_str() == name)?;
    let axis = match axis {
        "H" => MirrorAxis::Horizontal,
        "V" => MirrorAxis::Vertical,
        _ => return None,
    };
    Some((name, axis))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MirrorAdjustment {
    pub horizontal_deg: f32,
    pub vertical_deg: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub side_target: [u32; 2],
    pub rear_target: [u32; 2],
    pub side_fov_deg: f32,
    pub rear_fov_deg: f32,
    pub max_adjust_deg: f32,
    pub baseline_driver_height: f32, // m
    pub height_adjust_deg_per_m: f32,
    pub rear_height_factor: f32,
    pub drops_per_intensity: f32,
    pub drop_slide: f32,   // surface units per frame
    pub drop_floor: f32,   // drops below this fall off
    pub drop_max_delay: u32, // frames before a new drop starts sliding
    pub clean_frames: u32,
    /// Only render mirrors in first person.
    pub first_person_only: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            side_target: [256, 256],
            rear_target: [512, 256],
            side_fov_deg: 75.0,
            rear_fov_deg: 60.0,
            max_adjust_deg: 45.0,
            baseline_driver_height: 1.75,
            height_adjust_deg_per_m: 10.0,
            rear_height_factor: 0.5,
            drops_per_intensity: 20.0,
            drop_slide: 0.001,
            drop_floor: -0.1,
            drop_max_delay: 120,
            clean_frames: 10,
            first_person_only: true,
        }
    }
}

impl MirrorConfig {
    pub fn target_size(&self, name: MirrorName) -> [u32; 2] {
        match name {
            MirrorName::Left | MirrorName::Right => self.side_target,
            MirrorName::Rear => self.rear_target,
        }
    }

    fn fov(&self, name: MirrorName) -> f32 {
        match name {
            MirrorName::Left | MirrorName::Right => self.side_fov_deg,
            MirrorName::Rear => self.rear_fov_deg,
        }
    }
}

/// Overlay intensities, 0..1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MirrorEffects {
    pub fog: f32,
    pub rain: f32,
    pub glare: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RainDrop {
    x: f32,
    y: f32,
    delay: u32,
}

#[derive(Debug, Clone)]
struct Mirror {
    name: MirrorName,
    camera: Option<Camera>,
    look_target: Point3<f32>,
    target: RenderTargetId,
    adjustment: MirrorAdjustment,
    drops: Vec<RainDrop>,
    cleaning: u32, // frames left
}

impl Mirror {
    fn new(name: MirrorName, target: RenderTargetId) -> Self {
        Self {
            name,
            camera: None,
            look_target: Point3::origin(),
            target,
            adjustment: MirrorAdjustment::default(),
            drops: Vec::new(),
            cleaning: 0,
        }
    }
}

/// Per-mirror state for the frame snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorSnapshot {
    pub name: MirrorName,
    pub position: [f32; 3],
    pub look_target: [f32; 3],
    pub resolution: [u32; 2],
    pub adjustment: MirrorAdjustment,
    pub drops: usize,
    pub cleaning: bool,
}

pub struct MirrorRenderer {
    config: MirrorConfig,
    mirrors: [Mirror; 3],
    effects: MirrorEffects,
    rng: StdRng,
}

impl MirrorRenderer {
    /// Allocates the three targets. Allocation failure is a host failure and
    /// is returned as is.
    pub fn new<R: Renderer + ?Sized>(
        config: MirrorConfig,
        renderer: &mut R,
        seed: u64,
    ) -> Result<Self, RenderError> {
        let mut alloc = |name: MirrorName| -> Result<Mirror, RenderError> {
            let [w, h] = config.target_size(name);
            let target = renderer.create_render_target(w, h)?;
            debug!("Mirror {} target {:?} ({}x{})", name.as_str(), target, w, h);
            Ok(Mirror::new(name, target))
        };
        let mirrors = [
            alloc(MirrorName::Left)?,
            alloc(MirrorName::Right)?,
            alloc(MirrorName::Rear)?,
        ];
        Ok(Self {
            config,
            mirrors,
            effects: MirrorEffects::default(),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    fn mirror(&self, name: MirrorName) -> &Mirror {
        &self.mirrors[name.index()]
    }

    fn mirror_mut(&mut self, name: MirrorName) -> &mut Mirror {
        &mut self.mirrors[name.index()]
    }

    pub fn camera(&self, name: MirrorName) -> Option<&Camera> {
        self.mirror(name).camera.as_ref()
    }

    pub fn render_target(&self, name: MirrorName) -> RenderTargetId {
        self.mirror(name).target
    }

    pub fn adjustment(&self, name: MirrorName) -> MirrorAdjustment {
        self.mirror(name).adjustment
    }

    pub fn effects(&self) -> MirrorEffects {
        self.effects
    }

    pub fn drop_count(&self, name: MirrorName) -> usize {
        self.mirror(name).drops.len()
    }

    /// Drop positions on the mirror surface (x, y).
    pub fn drop_positions(&self, name: MirrorName) -> impl Iterator<Item = [f32; 2]> + '_ {
        self.mirror(name).drops.iter().map(|d| [d.x, d.y])
    }

    pub fn is_cleaning(&self, name: MirrorName) -> bool {
        self.mirror(name).cleaning > 0
    }

    /// Applies a UI control value (absolute degrees). Unknown ids are ignored;
    /// returns whether the id was recognised.
    pub fn adjust_mirror(&mut self, control_id: &str, value: f32) -> bool {
        match parse_control(control_id) {
            Some((name, axis)) => {
                self.set_adjustment(name, axis, value);
                true
            }
            None => {
                trace!("ignoring unknown mirror control {control_id:?}");
                false
            }
        }
    }

    pub fn set_adjustment(&mut self, name: MirrorName, axis: MirrorAxis, degrees: f32) {
        if !degrees.is_finite() {
            return;
        }
        let limit = self.config.max_adjust_deg;
        let v = degrees.clamp(-limit, limit);
        let adj = &mut self.mirror_mut(name).adjustment;
        match axis {
            MirrorAxis::Horizontal => adj.horizontal_deg = v,
            MirrorAxis::Vertical => adj.vertical_deg = v,
        }
    }

    pub fn reset_all(&mut self) {
        for m in &mut self.mirrors {
            m.adjustment = MirrorAdjustment::default();
        }
    }

    /// Tilts the mirrors for a driver of `height` meters.
    pub fn auto_adjust_for_driver_height(&mut self, height: f32) {
        if !height.is_finite() {
            return;
        }
        let offset =
            (height - self.config.baseline_driver_height) * self.config.height_adjust_deg_per_m;
        self.set_adjustment(MirrorName::Left, MirrorAxis::Vertical, offset);
        self.set_adjustment(MirrorName::Right, MirrorAxis::Vertical, offset);
        self.set_adjustment(
            MirrorName::Rear,
            MirrorAxis::Vertical,
            offset * self.config.rear_height_factor,
        );
    }

    /// World look direction for `name` on a vehicle with `vehicle` pose.
    pub fn look_direction(&self, name: MirrorName, vehicle: &Pose) -> Vector3<f32> {
        let adj = self.mirror(name).adjustment;
        let local = euler_xyz(
            adj.vertical_deg.to_radians(),
            adj.horizontal_deg.to_radians(),
            0.0,
        ) * name.base_direction();
        vehicle.rotation * local
    }

    /// Re-poses every mirror camera from the vehicle pose.
    pub fn update_poses(&mut self, vehicle: &Pose) {
        for name in MirrorName::ALL {
            let position = vehicle.transform_point(&mirror_attachment(name));
            let look_target = position + self.look_direction(name, vehicle);
            let fov = self.config.fov(name);
            let m = self.mirror_mut(name);
            let camera = m.camera.get_or_insert_with(|| Camera::new(fov));
            camera.position = position;
            camera.look_at(&look_target);
            m.look_target = look_target;
        }
    }

    /// Per-frame update: camera poses, rain drop sliding, cleaning animation.
    /// No-op without a vehicle.
    pub fn update(&mut self, vehicle: Option<&Pose>) {
        let Some(vehicle) = vehicle else { return };
        self.update_poses(vehicle);

        let slide = self.config.drop_slide;
        let floor = self.config.drop_floor;
        for m in &mut self.mirrors {
            for d in &mut m.drops {
                if d.delay > 0 {
                    d.delay -= 1;
                } else {
                    d.y -= slide;
                }
            }
            m.drops.retain(|d| d.y >= floor);
            m.cleaning = m.cleaning.saturating_sub(1);
        }
    }

    pub fn set_weather_effect(&mut self, effect: OverlayEffect, intensity: f32) {
        let i = if intensity.is_finite() { intensity.clamp(0.0, 1.0) } else { 0.0 };
        match effect {
            OverlayEffect::Fog => self.effects.fog = i,
            OverlayEffect::Glare => self.effects.glare = i,
            OverlayEffect::Rain => {
                self.effects.rain = i;
                self.scatter_drops(i);
            }
        }
    }

    pub fn apply_weather(&mut self, weather: &WeatherEffects) {
        self.set_weather_effect(OverlayEffect::Fog, weather.mirror_fog);
        self.set_weather_effect(OverlayEffect::Rain, weather.mirror_rain);
        self.set_weather_effect(OverlayEffect::Glare, weather.mirror_glare);
    }

    fn scatter_drops(&mut self, intensity: f32) {
        let count = (intensity * self.config.drops_per_intensity).floor() as usize;
        let max_delay = self.config.drop_max_delay;
        for i in 0..self.mirrors.len() {
            let drops = (0..count)
                .map(|_| RainDrop {
                    x: self.rng.gen_range(-0.15..0.15),
                    y: self.rng.gen_range(-0.1..0.1),
                    delay: self.rng.gen_range(0..=max_delay),
                })
                .collect();
            self.mirrors[i].drops = drops;
        }
    }

    /// Wipes drops off one mirror and starts the cleaning animation.
    pub fn clean_mirror(&mut self, name: MirrorName) {
        let frames = self.config.clean_frames;
        let m = self.mirror_mut(name);
        m.drops.clear();
        m.cleaning = frames;
    }

    /// Mirror passes follow the camera mode unless configured otherwise.
    pub fn should_render(&self, first_person: bool) -> bool {
        first_person || !self.config.first_person_only
    }

    /// Runs the three off-screen passes.
    pub fn render<R: Renderer + ?Sized>(
        &self,
        scene: &mut Scene,
        renderer: &mut R,
        presentation: &VehiclePresentation,
    ) {
        let saved = renderer.render_target();
        let car = presentation.root();

        for m in &self.mirrors {
            let Some(camera) = m.camera.as_ref() else {
                trace!("mirror {} not posed yet, skipping", m.name.as_str());
                continue;
            };
            let target = m.target;
            if !renderer.has_render_target(target) {
                trace!("mirror {} target missing, skipping", m.name.as_str());
                continue;
            }

            {
                let hidden = scene.hide_temporarily(&[car, presentation.mirror_surface(m.name)]);
                renderer.set_render_target(Some(target));
                renderer.clear();
                renderer.render(hidden.scene(), camera);
            }
            self.apply_overlays(renderer, target);
        }

        renderer.set_render_target(saved);
    }

    fn apply_overlays<R: Renderer + ?Sized>(&self, renderer: &mut R, target: RenderTargetId) {
        let e = self.effects;
        for (effect, intensity) in [
            (OverlayEffect::Fog, e.fog),
            (OverlayEffect::Rain, e.rain),
            (OverlayEffect::Glare, e.glare),
        ] {
            if intensity > 0.0 {
                renderer.apply_overlay(target, effect, intensity);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<MirrorSnapshot> {
        self.mirrors
            .iter()
            .filter_map(|m| {
                let camera = m.camera.as_ref()?;
                Some(MirrorSnapshot {
                    name: m.name,
                    position: p3(&camera.position),
                    look_target: p3(&m.look_target),
                    resolution: self.config.target_size(m.name),
                    adjustment: m.adjustment,
                    drops: m.drops.len(),
                    cleaning: m.cleaning > 0,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::yaw_rotation;
    use crate::scene::FrameRecorder;
    use proptest::prelude::*;
    use std::f32::consts::FRAC_PI_2;

    fn setup() -> (Scene, FrameRecorder, VehiclePresentation, MirrorRenderer) {
        let mut scene = Scene::new();
        let mut recorder = FrameRecorder::default();
        let car = VehiclePresentation::build(&mut scene);
        let mirrors = MirrorRenderer::new(MirrorConfig::default(), &mut recorder, 5).unwrap();
        (scene, recorder, car, mirrors)
    }

    #[test]
    fn parses_control_ids() {
        assert_eq!(parse_control("leftMirrorH"), Some((MirrorName::Left, MirrorAxis::Horizontal)));
        assert_eq!(parse_control("rearMirrorV"), Some((MirrorName::Rear, MirrorAxis::Vertical)));
        assert_eq!(parse_control("rightMirrorZ"), None);
        assert_eq!(parse_control("seatHeight"), None);
    }

    #[test]
    fn targets_have_fixed_sizes() {
        let (_, recorder, _, mirrors) = setup();
        let size = |n| recorder.target_size(mirrors.render_target(n));
        assert_eq!(size(MirrorName::Left), Some((256, 256)));
        assert_eq!(size(MirrorName::Right), Some((256, 256)));
        assert_eq!(size(MirrorName::Rear), Some((512, 256)));
    }

    #[test]
    fn allocation_failure_propagates() {
        let mut tiny = FrameRecorder::new(256);
        let err = MirrorRenderer::new(MirrorConfig::default(), &mut tiny, 1).err();
        assert!(matches!(err, Some(RenderError::TargetAllocation { width: 512, .. })));
    }

    #[test]
    fn adjustments_clamp_and_ignore_unknown_ids() {
        let (_, _, _, mut mirrors) = setup();
        assert!(mirrors.adjust_mirror("leftMirrorH", 90.0));
        assert!(!mirrors.adjust_mirror("frontMirrorH", 10.0));
        assert_eq!(mirrors.adjustment(MirrorName::Left).horizontal_deg, 45.0);
        mirrors.adjust_mirror("leftMirrorH", f32::NAN);
        assert_eq!(mirrors.adjustment(MirrorName::Left).horizontal_deg, 45.0);
    }

    #[test]
    fn driver_height_tilts_mirrors() {
        let (_, _, _, mut mirrors) = setup();
        mirrors.auto_adjust_for_driver_height(1.95);
        assert!((mirrors.adjustment(MirrorName::Left).vertical_deg - 2.0).abs() < 1e-4);
        assert!((mirrors.adjustment(MirrorName::Right).vertical_deg - 2.0).abs() < 1e-4);
        assert!((mirrors.adjustment(MirrorName::Rear).vertical_deg - 1.0).abs() < 1e-4);
    }

    #[test]
    fn cameras_sit_on_attachments_and_look_back() {
        let (_, _, _, mut mirrors) = setup();
        let pose = Pose::identity();
        mirrors.update(Some(&pose));
        let rear = mirrors.camera(MirrorName::Rear).unwrap();
        assert!((rear.position - Point3::new(0.0, 2.8, 1.8)).norm() < 1e-5);
        assert!((rear.forward() - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-5);

        let left = mirrors.camera(MirrorName::Left).unwrap();
        assert!(left.forward().x > 0.0 && left.forward().z < 0.0);
        let right = mirrors.camera(MirrorName::Right).unwrap();
        assert!(right.forward().x < 0.0 && right.forward().z < 0.0);
    }

    #[test]
    fn vertical_adjustment_is_vehicle_relative() {
        let (_, _, _, mut mirrors) = setup();
        mirrors.set_adjustment(MirrorName::Rear, MirrorAxis::Vertical, 20.0);
        let turned = Pose::new(Point3::origin(), yaw_rotation(FRAC_PI_2));
        let straight = mirrors.look_direction(MirrorName::Rear, &Pose::identity());
        let rotated = mirrors.look_direction(MirrorName::Rear, &turned);
        assert!((rotated - yaw_rotation(FRAC_PI_2) * straight).norm() < 1e-5);
        // Tilt stays a tilt: no sideways drift after turning.
        assert!((rotated.y - straight.y).abs() < 1e-5);
    }

    #[test]
    fn render_restores_visibility_and_target() {
        let (mut scene, mut recorder, car, mut mirrors) = setup();
        let tree = scene.add("world.tree", None, Pose::identity());
        mirrors.update(Some(&Pose::identity()));
        let rt = recorder.create_render_target(64, 64).unwrap();
        recorder.set_render_target(Some(rt));
        scene.set_visible(car.mirror_surface(MirrorName::Rear), false);

        let before = scene.visibility_flags();
        mirrors.render(&mut scene, &mut recorder, &car);
        assert_eq!(scene.visibility_flags(), before);
        assert_eq!(recorder.render_target(), Some(rt));
        assert_eq!(scene.visible(car.mirror_surface(MirrorName::Rear)), Some(false));

        let passes = recorder.passes();
        assert_eq!(passes.len(), 3);
        for (pass, name) in passes.iter().zip(MirrorName::ALL) {
            assert_eq!(pass.target, Some(mirrors.render_target(name)));
            assert!(pass.cleared);
            // No part of the car, wheels and other mirrors included.
            assert_eq!(pass.drawn, vec![tree], "{name:?} pass drew car nodes");
        }
    }

    #[test]
    fn missing_camera_or_target_skips_only_that_mirror() {
        let (mut scene, mut recorder, car, mut mirrors) = setup();
        mirrors.render(&mut scene, &mut recorder, &car);
        assert!(recorder.passes().is_empty());

        mirrors.update(Some(&Pose::identity()));
        // A renderer that only knows the first target.
        let mut other = FrameRecorder::default();
        other.create_render_target(256, 256).unwrap();
        mirrors.render(&mut scene, &mut other, &car);
        assert_eq!(other.passes().len(), 1);
        assert_eq!(other.passes()[0].target, Some(mirrors.render_target(MirrorName::Left)));
    }

    #[test]
    fn overlays_follow_weather() {
        let (mut scene, mut recorder, car, mut mirrors) = setup();
        mirrors.update(Some(&Pose::identity()));
        mirrors.apply_weather(&crate::weather::Weather::Storm.effects());
        mirrors.render(&mut scene, &mut recorder, &car);
        let effects: Vec<_> = recorder.overlays().iter().map(|o| o.effect).collect();
        assert_eq!(effects.len(), 6);
        assert!(!effects.contains(&OverlayEffect::Glare));
    }

    #[test]
    fn rain_drops_slide_off_and_cleaning_wipes() {
        let (_, _, _, mut mirrors) = setup();
        mirrors.set_weather_effect(OverlayEffect::Rain, 0.6);
        for name in MirrorName::ALL {
            assert_eq!(mirrors.drop_count(name), 12);
            for [x, y] in mirrors.drop_positions(name) {
                assert!(x.abs() <= 0.15 && y.abs() <= 0.1);
            }
        }
        mirrors.clean_mirror(MirrorName::Left);
        assert_eq!(mirrors.drop_count(MirrorName::Left), 0);
        assert!(mirrors.is_cleaning(MirrorName::Left));

        let pose = Pose::identity();
        for _ in 0..10 {
            mirrors.update(Some(&pose));
        }
        assert!(!mirrors.is_cleaning(MirrorName::Left));

        // Delay (<= 120 frames) plus at most 200 frames of sliding.
        for _ in 0..400 {
            mirrors.update(Some(&pose));
        }
        assert_eq!(mirrors.drop_count(MirrorName::Right), 0);
    }

    #[test]
    fn snapshot_lists_posed_mirrors() {
        let (_, _, _, mut mirrors) = setup();
        assert!(mirrors.snapshot().is_empty());
        mirrors.update(Some(&Pose::identity()));
        let snap = mirrors.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[2].resolution, [512, 256]);
    }

    proptest! {
        #[test]
        fn reset_all_zeroes_everything(
            values in prop::collection::vec((0usize..6, -1000.0f32..1000.0), 0..30),
        ) {
            let (_, _, _, mut mirrors) = setup();
            let ids = [
                "leftMirrorH",
                "leftMirrorV",
                "rightMirrorH",
                "rightMirrorV",
                "rearMirrorH",
                "rearMirrorV",
            ];
            for (i, v) in values {
                mirrors.adjust_mirror(ids[i], v);
            }
            mirrors.reset_all();
            for name in MirrorName::ALL {
                prop_assert_eq!(mirrors.adjustment(name), MirrorAdjustment::default());
            }
            mirrors.reset_all();
            for name in MirrorName::ALL {
                prop_assert_eq!(mirrors.adjustment(name), MirrorAdjustment::default());
            }
        }
    }
}
