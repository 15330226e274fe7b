//! Visual vehicle kept in lock-step with the chassis body.
//!
//! Every part the rest of the frame needs (body, wheels, lamps, mirror
//! surfaces) is created once and held as a named handle.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::Rng;
use tracing::debug;

use crate::math::{Pose, yaw_rotation};
use crate::mirrors::MirrorName;
use crate::scene::{NodeId, Scene};

const WHEEL_SPIN_PER_SPEED: f32 = 0.1; // rad per frame per m/s
const STEERING_WHEEL_TURN: f32 = 0.5;  // rad at full lock
const STEERING_WHEEL_TILT: f32 = -0.3;
const DENTS_PER_HIT: usize = 3;
const MAX_DENTS: usize = 12;

/// Local positions, vehicle frame (+X left, +Z forward).
const WHEEL_POSITIONS: [[f32; 3]; 4] = [
    [2.0, 0.5, 2.8],   // front left
    [-2.0, 0.5, 2.8],  // front right
    [2.0, 0.5, -2.8],  // rear left
    [-2.0, 0.5, -2.8], // rear right
];
const HEADLIGHT_POSITIONS: [[f32; 3]; 2] = [[1.5, 1.2, 4.0], [-1.5, 1.2, 4.0]];
const STEERING_WHEEL_POSITION: [f32; 3] = [0.8, 1.8, 2.2];

/// Where each mirror surface sits on the car.
pub fn mirror_attachment(name: MirrorName) -> Point3<f32> {
    match name {
        MirrorName::Left => Point3::new(2.5, 2.5, 1.5),
        MirrorName::Right => Point3::new(-2.5, 2.5, 1.5),
        MirrorName::Rear => Point3::new(0.0, 2.8, 1.8),
    }
}

fn mirror_surface_yaw(name: MirrorName) -> f32 {
    match name {
        MirrorName::Left => -0.3,
        MirrorName::Right => 0.3,
        MirrorName::Rear => 0.0,
    }
}

#[derive(Debug, Clone)]
pub struct VehiclePresentation {
    root: NodeId,
    body: NodeId,
    roof: NodeId,
    wheels: [NodeId; 4],
    steering_wheel: NodeId,
    headlights: [NodeId; 2],
    mirror_surfaces: [NodeId; 3],
    dents: Vec<NodeId>,
    wheel_spin: f32,
}

impl VehiclePresentation {
    /// Builds the node tree. The car body and its parts hang under `body`;
    /// mirror surfaces are siblings of `body` so they can be hidden separately.
    pub fn build(scene: &mut Scene) -> Self {
        let root = scene.add("vehicle", None, Pose::identity());
        let body = scene.add("vehicle.body", Some(root), at([0.0, 1.0, 0.0]));
        let roof = scene.add("vehicle.roof", Some(root), at([0.0, 2.2, -0.5]));

        let wheels = WHEEL_POSITIONS.map(|p| scene.add("vehicle.wheel", Some(root), at(p)));
        let steering_wheel = scene.add(
            "vehicle.steering_wheel",
            Some(root),
            Pose::new(
                STEERING_WHEEL_POSITION.into(),
                steering_wheel_rotation(0.0),
            ),
        );
        let headlights =
            HEADLIGHT_POSITIONS.map(|p| scene.add("vehicle.headlight", Some(root), at(p)));

        let mirror_surfaces = MirrorName::ALL.map(|name| {
            scene.add(
                format!("vehicle.mirror.{}", name.as_str()),
                Some(root),
                Pose::new(mirror_attachment(name), yaw_rotation(mirror_surface_yaw(name))),
            )
        });

        // Lamps start dark.
        for lamp in headlights {
            scene.set_visible(lamp, false);
        }

        Self {
            root,
            body,
            roof,
            wheels,
            steering_wheel,
            headlights,
            mirror_surfaces,
            dents: Vec::new(),
            wheel_spin: 0.0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Shell nodes (body and roof).
    pub fn body_nodes(&self) -> [NodeId; 2] {
        [self.body, self.roof]
    }

    pub fn mirror_surface(&self, name: MirrorName) -> NodeId {
        self.mirror_surfaces[name.index()]
    }

    pub fn wheels(&self) -> &[NodeId; 4] {
        &self.wheels
    }

    pub fn steering_wheel(&self) -> NodeId {
        self.steering_wheel
    }

    pub fn dent_count(&self) -> usize {
        self.dents.len()
    }

    /// Copies the physics pose to the root and animates wheels and steering.
    pub fn sync(
        &mut self,
        scene: &mut Scene,
        pose: &Pose,
        speed: f32,
        steering: f32,
        max_steer: f32,
    ) {
        scene.set_local_pose(self.root, *pose);

        self.wheel_spin = (self.wheel_spin + speed * WHEEL_SPIN_PER_SPEED) % std::f32::consts::TAU;
        let spin = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.wheel_spin);
        let steer = yaw_rotation(steering * max_steer);
        for (i, wheel) in self.wheels.iter().enumerate() {
            let rotation = if i < 2 { steer * spin } else { spin };
            scene.set_local_rotation(*wheel, rotation);
        }

        scene.set_local_rotation(self.steering_wheel, steering_wheel_rotation(steering));
    }

    pub fn set_headlights(&self, scene: &mut Scene, on: bool) {
        for lamp in self.headlights {
            scene.set_visible(lamp, on);
        }
    }

    pub fn headlights_on(&self, scene: &Scene) -> bool {
        scene.visible(self.headlights[0]).unwrap_or(false)
    }

    /// Scatters a few dents over the body.
    pub fn add_visual_damage(&mut self, scene: &mut Scene, rng: &mut impl Rng) {
        for _ in 0..DENTS_PER_HIT {
            if self.dents.len() >= MAX_DENTS {
                break;
            }
            let p = [
                rng.gen_range(-2.0..2.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(-3.0..3.0),
            ];
            self.dents.push(scene.add("vehicle.dent", Some(self.body), at(p)));
        }
        debug!("Vehicle shows {} dents", self.dents.len());
    }

    pub fn repair(&mut self, scene: &mut Scene) {
        for dent in self.dents.drain(..) {
            scene.remove(dent);
        }
    }
}

fn at(p: [f32; 3]) -> Pose {
    Pose::new(p.into(), UnitQuaternion::identity())
}

fn steering_wheel_rotation(steering: f32) -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), STEERING_WHEEL_TILT)
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), steering * STEERING_WHEEL_TURN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn sync_moves_mirror_surfaces_with_the_car() {
        let mut scene = Scene::new();
        let mut car = VehiclePresentation::build(&mut scene);
        let pose = Pose::new(Point3::new(10.0, 0.0, 5.0), yaw_rotation(FRAC_PI_2));
        car.sync(&mut scene, &pose, 0.0, 0.0, 0.5);

        let left = scene.world_pose(car.mirror_surface(MirrorName::Left)).unwrap();
        // (2.5, 2.5, 1.5) yawed 90 deg left: x' = z, z' = -x
        assert!((left.position - Point3::new(11.5, 2.5, 2.5)).norm() < 1e-4);
    }

    #[test]
    fn front_wheels_follow_steering() {
        let mut scene = Scene::new();
        let mut car = VehiclePresentation::build(&mut scene);
        car.sync(&mut scene, &Pose::identity(), 0.0, 1.0, 0.5);
        let front = scene.local_pose(car.wheels()[0]).unwrap();
        let rear = scene.local_pose(car.wheels()[2]).unwrap();
        assert!((crate::math::yaw_of(&front.rotation) - 0.5).abs() < 1e-5);
        assert!(crate::math::yaw_of(&rear.rotation).abs() < 1e-5);
    }

    #[test]
    fn dents_are_capped_and_cleared_by_repair() {
        let mut scene = Scene::new();
        let mut car = VehiclePresentation::build(&mut scene);
        let mut rng = StdRng::seed_from_u64(3);
        let base = scene.len();
        for _ in 0..10 {
            car.add_visual_damage(&mut scene, &mut rng);
        }
        assert_eq!(car.dent_count(), MAX_DENTS);
        assert_eq!(scene.len(), base + MAX_DENTS);
        car.repair(&mut scene);
        assert_eq!(car.dent_count(), 0);
        assert_eq!(scene.len(), base);
    }

    #[test]
    fn headlights_toggle() {
        let mut scene = Scene::new();
        let car = VehiclePresentation::build(&mut scene);
        assert!(!car.headlights_on(&scene));
        car.set_headlights(&mut scene, true);
        assert!(car.headlights_on(&scene));
    }
}
