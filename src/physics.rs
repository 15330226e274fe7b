// ==============================================================================
// physics.rs: rigid body world (rapier3d boundary)
// ------------------------------------------------------------------------------
// Owns gravity, broad/narrow phase, the material table and the fixed-step loop.
// The vehicle code only talks to it through:
// - create_chassis(...)          dynamic box body for the car
// - create_static_box / create_road_segment   static collision geometry
// - add_force / add_torque       per-step forces (cleared after every step)
// - pose / linvel / angvel       read back for telemetry and presentation
// - set_linvel                   direct kinematic overrides (brake, drag, grip)
// - substeps_due + step          fixed sub-stepping with a max sub-step count
//
// Notes:
// - rapier keeps user forces until reset; step() resets them so callers get
//   "force for this step only" semantics.
// - Chassis colliders combine friction with `min` and carry friction 0, so the
//   box slides on the ground and the tire model in vehicle::dynamics owns grip.
// ==============================================================================

use rapier3d::prelude::*;
use tracing::{debug, warn};

use crate::config::{Material, MaterialTable, PhysicsConfig};
use crate::math::Pose;

/// Bodies beyond this distance (or non-finite) are considered exploded.
const WORLD_LIMIT: Real = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Ground,
    Road,
    Building,
    Chassis,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,                 // gravity vector
    pub integration: IntegrationParameters,    // fixed dt lives here
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,
    materials: MaterialTable,
    max_sub_steps: u32,
    accumulator: Real,                          // unconsumed frame time (s)
}

impl PhysicsWorld {
    pub fn new(config: &PhysicsConfig) -> Self {
        let mut world = Self {
            gravity: vector![0.0, config.gravity, 0.0],
            integration: IntegrationParameters {
                dt: config.time_step,
                ..IntegrationParameters::default()
            },
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            materials: config.materials.clone(),
            max_sub_steps: config.max_sub_steps.max(1),
            accumulator: 0.0,
        };

        if config.ground {
            world.create_ground(config.ground_half_extent);
        }

        world
    }

    pub fn time_step(&self) -> Real {
        self.integration.dt
    }

    pub fn material(&self, kind: MaterialKind) -> Material {
        match kind {
            MaterialKind::Ground => self.materials.ground,
            MaterialKind::Road => self.materials.road,
            MaterialKind::Building => self.materials.building,
            MaterialKind::Chassis => self.materials.chassis,
        }
    }

    // --------------------------------------------------
    // static geometry
    // --------------------------------------------------

    /// Big static slab whose top surface sits at y = 0.
    fn create_ground(&mut self, half_extent: Real) {
        let mat = self.materials.ground;
        let rb = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -1.0, 0.0])
            .build();
        let handle = self.bodies.insert(rb);

        let collider = ColliderBuilder::cuboid(half_extent, 1.0, half_extent)
            .friction(mat.friction)
            .restitution(mat.restitution)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        debug!(
            "Ground inserted. Bodies = {}, Colliders = {}",
            self.bodies.len(),
            self.colliders.len()
        );
    }

    /// Static box centred at `position` with full `size`.
    pub fn create_static_box(
        &mut self,
        position: [Real; 3],
        size: [Real; 3],
        kind: MaterialKind,
    ) -> RigidBodyHandle {
        let mat = self.material(kind);
        let rb = RigidBodyBuilder::fixed()
            .translation(vector![position[0], position[1], position[2]])
            .build();
        let handle = self.bodies.insert(rb);

        let collider = ColliderBuilder::cuboid(size[0] * 0.5, size[1] * 0.5, size[2] * 0.5)
            .friction(mat.friction)
            .restitution(mat.restitution)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Thin road slab between two ground points (x, z).
    pub fn create_road_segment(
        &mut self,
        start: [Real; 2],
        end: [Real; 2],
        width: Real,
    ) -> RigidBodyHandle {
        let mat = self.materials.road;
        let dx = end[0] - start[0];
        let dz = end[1] - start[1];
        let length = (dx * dx + dz * dz).sqrt();

        // Local +X runs along the segment.
        let angle = (-dz).atan2(dx);
        let rb = RigidBodyBuilder::fixed()
            .translation(vector![(start[0] + end[0]) * 0.5, 0.1, (start[1] + end[1]) * 0.5])
            .rotation(vector![0.0, angle, 0.0])
            .build();
        let handle = self.bodies.insert(rb);

        let collider = ColliderBuilder::cuboid(length * 0.5, 0.1, width * 0.5)
            .friction(mat.friction)
            .restitution(mat.restitution)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    // --------------------------------------------------
    // dynamic bodies
    // --------------------------------------------------

    /// Dynamic box chassis with the given total mass.
    pub fn create_chassis(
        &mut self,
        position: [Real; 3],
        half_extents: [Real; 3],
        mass: Real,
        linear_damping: Real,
        angular_damping: Real,
    ) -> RigidBodyHandle {
        let mat = self.materials.chassis;
        let [hx, hy, hz] = half_extents;
        let volume = 8.0 * hx * hy * hz;
        let density = mass / volume.max(1e-6); // ρ = m / V

        let rb = RigidBodyBuilder::dynamic()
            .translation(vector![position[0], position[1], position[2]])
            .linear_damping(linear_damping)
            .angular_damping(angular_damping)
            .ccd_enabled(true)
            .build();
        let handle = self.bodies.insert(rb);

        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .density(density)
            .friction(mat.friction)
            .friction_combine_rule(CoefficientCombineRule::Min)
            .restitution(mat.restitution)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        debug!("Created chassis body {:?} ({} kg)", handle, mass);
        handle
    }

    pub fn contains(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub fn add_force(&mut self, handle: RigidBodyHandle, force: Vector<Real>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.add_force(force, true);
        }
    }

    pub fn add_torque(&mut self, handle: RigidBodyHandle, torque: Vector<Real>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.add_torque(torque, true);
        }
    }

    pub fn pose(&self, handle: RigidBodyHandle) -> Option<Pose> {
        self.bodies
            .get(handle)
            .map(|body| Pose::from_isometry(body.position()))
    }

    pub fn linvel(&self, handle: RigidBodyHandle) -> Option<Vector<Real>> {
        self.bodies.get(handle).map(|body| *body.linvel())
    }

    pub fn angvel(&self, handle: RigidBodyHandle) -> Option<Vector<Real>> {
        self.bodies.get(handle).map(|body| *body.angvel())
    }

    pub fn set_linvel(&mut self, handle: RigidBodyHandle, linvel: Vector<Real>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(linvel, true);
        }
    }

    pub fn set_angular_damping(&mut self, handle: RigidBodyHandle, damping: Real) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_angular_damping(damping);
        }
    }

    /// Re-place a body upright at `position` with zero velocity.
    pub fn reset_body(&mut self, handle: RigidBodyHandle, position: [Real; 3]) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_position(
                Isometry::translation(position[0], position[1], position[2]),
                true,
            );
            body.set_linvel(Vector::zeros(), true);
            body.set_angvel(Vector::zeros(), true);
            body.reset_forces(true);
            body.reset_torques(true);
        }
    }

    // --------------------------------------------------
    // stepping
    // --------------------------------------------------

    /// Adds `dt` to the accumulator and returns how many fixed sub-steps are
    /// due, capped at `max_sub_steps`. Time beyond the cap is dropped.
    pub fn substeps_due(&mut self, dt: Real) -> u32 {
        if !dt.is_finite() || dt <= 0.0 {
            return 0;
        }
        let step = self.integration.dt;
        self.accumulator += dt;

        let mut due = 0;
        while self.accumulator >= step && due < self.max_sub_steps {
            self.accumulator -= step;
            due += 1;
        }
        if self.accumulator >= step {
            self.accumulator %= step;
        }
        due
    }

    /// Advance one fixed sub-step.
    pub fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        for (handle, body) in self.bodies.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }

            // Forces are per-step.
            body.reset_forces(false);
            body.reset_torques(false);

            // Safety: prevent bodies from exploding to insane coordinates
            let pos = *body.translation();
            let bad = !pos.x.is_finite()
                || !pos.y.is_finite()
                || !pos.z.is_finite()
                || pos.x.abs() > WORLD_LIMIT
                || pos.y.abs() > WORLD_LIMIT
                || pos.z.abs() > WORLD_LIMIT;

            if bad {
                body.set_position(Isometry::translation(0.0, 2.0, 0.0), true);
                body.set_linvel(Vector::zeros(), true);
                body.set_angvel(Vector::zeros(), true);
                warn!("Reset exploding body {:?} from {:?}", handle, pos);
            }
        }
    }
}
