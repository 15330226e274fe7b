//! Minimal scene graph and renderer seam.
//!
//! The simulation runs headless, so the graph only tracks what the render
//! protocol needs: a node hierarchy with local poses and visibility flags,
//! cameras, and off-screen targets owned by a [`Renderer`].

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::RenderError;
use crate::math::{Pose, look_rotation};

/// Slot index plus the slot's generation when the node was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub local: Pose,
    pub visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Generational arena of nodes. Freed slots are reused with a bumped
/// generation, so a stale id stops resolving instead of aliasing a new node.
#[derive(Debug, Default)]
pub struct Scene {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a visible node. A missing parent attaches the node at the root.
    pub fn add(&mut self, name: impl Into<String>, parent: Option<NodeId>, local: Pose) -> NodeId {
        let parent = parent.filter(|p| self.contains(*p));
        let node = Node {
            name: name.into(),
            local,
            visible: true,
            parent,
            children: Vec::new(),
        };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index: self.slots.len() as u32 - 1,
                    generation: 0,
                }
            }
        };
        if let Some(p) = parent.and_then(|p| self.node_mut(p)) {
            p.children.push(id);
        }
        trace!("scene: added node {:?}", id);
        id
    }

    /// Removes a node and its whole subtree. Returns false if it was not present.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(node) = self.take(id) else {
            return false;
        };
        if let Some(p) = node.parent.and_then(|p| self.node_mut(p)) {
            p.children.retain(|c| *c != id);
        }
        let mut stack = node.children;
        while let Some(child) = stack.pop() {
            if let Some(n) = self.take(child) {
                stack.extend(n.children);
            }
        }
        true
    }

    fn take(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn visible(&self, id: NodeId) -> Option<bool> {
        self.node(id).map(|n| n.visible)
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(n) = self.node_mut(id) {
            n.visible = visible;
        }
    }

    pub fn local_pose(&self, id: NodeId) -> Option<Pose> {
        self.node(id).map(|n| n.local)
    }

    pub fn set_local_pose(&mut self, id: NodeId, pose: Pose) {
        if let Some(n) = self.node_mut(id) {
            n.local = pose;
        }
    }

    pub fn set_local_rotation(&mut self, id: NodeId, rotation: UnitQuaternion<f32>) {
        if let Some(n) = self.node_mut(id) {
            n.local.rotation = rotation;
        }
    }

    /// Pose composed through every ancestor.
    pub fn world_pose(&self, id: NodeId) -> Option<Pose> {
        let mut node = self.node(id)?;
        let mut iso = node.local.isometry();
        while let Some(parent) = node.parent.and_then(|p| self.node(p)) {
            iso = parent.local.isometry() * iso;
            node = parent;
        }
        Some(Pose::from_isometry(&iso))
    }

    /// A node is drawn only if it and all its ancestors are visible.
    pub fn is_rendered(&self, id: NodeId) -> bool {
        let mut cur = self.node(id);
        while let Some(n) = cur {
            if !n.visible {
                return false;
            }
            cur = n.parent.and_then(|p| self.node(p));
        }
        self.contains(id)
    }

    /// Every node a render pass would draw, in slot order.
    pub fn rendered_nodes(&self) -> Vec<NodeId> {
        self.live()
            .map(|(id, _)| id)
            .filter(|id| self.is_rendered(*id))
            .collect()
    }

    /// Own visibility flag of every live node, in slot order.
    pub fn visibility_flags(&self) -> Vec<(NodeId, bool)> {
        self.live().map(|(id, n)| (id, n.visible)).collect()
    }

    fn live(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.node.as_ref().map(|n| {
                let id = NodeId {
                    index: i as u32,
                    generation: s.generation,
                };
                (id, n)
            })
        })
    }

    /// Hides `nodes` until the returned guard drops, then restores each one's
    /// previous flag. Missing ids are skipped.
    pub fn hide_temporarily(&mut self, nodes: &[NodeId]) -> HiddenNodes<'_> {
        let mut saved = Vec::with_capacity(nodes.len());
        for id in nodes {
            if let Some(n) = self.node_mut(*id) {
                saved.push((*id, n.visible));
                n.visible = false;
            }
        }
        HiddenNodes { scene: self, saved }
    }
}

/// Restores visibility flags on drop.
pub struct HiddenNodes<'a> {
    scene: &'a mut Scene,
    saved: Vec<(NodeId, bool)>,
}

impl HiddenNodes<'_> {
    pub fn scene(&self) -> &Scene {
        self.scene
    }
}

impl Drop for HiddenNodes<'_> {
    fn drop(&mut self) {
        // Reverse order so a node listed twice ends at its original flag.
        for (id, visible) in self.saved.drain(..).rev() {
            self.scene.set_visible(id, visible);
        }
    }
}

/// Perspective viewpoint. Local +Z is the view direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub fov_deg: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(75.0)
    }
}

impl Camera {
    pub fn new(fov_deg: f32) -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
            fov_deg,
        }
    }

    /// Turns the camera toward `target`. No-op if the target coincides with
    /// the camera position.
    pub fn look_at(&mut self, target: &Point3<f32>) {
        if let Some(r) = look_rotation(&(target - self.position)) {
            self.rotation = r;
        }
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * Vector3::z()
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }
}

/// Handle to an off-screen color target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RenderTargetId(pub u32);

/// Post-process applied to a finished off-screen image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayEffect {
    Fog,
    Rain,
    Glare,
}

/// Host renderer. `None` as a target means the default framebuffer.
pub trait Renderer {
    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<RenderTargetId, RenderError>;

    fn has_render_target(&self, target: RenderTargetId) -> bool;

    fn render_target(&self) -> Option<RenderTargetId>;

    fn set_render_target(&mut self, target: Option<RenderTargetId>);

    fn clear(&mut self);

    fn render(&mut self, scene: &Scene, camera: &Camera);

    fn apply_overlay(&mut self, _target: RenderTargetId, _effect: OverlayEffect, _intensity: f32) {}

    fn begin_frame(&mut self) {}
}

/// One recorded `render` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    pub target: Option<RenderTargetId>,
    pub camera: Camera,
    /// Nodes that were drawn.
    pub drawn: Vec<NodeId>,
    /// `clear` was called on this target before the pass.
    pub cleared: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayCall {
    pub target: RenderTargetId,
    pub effect: OverlayEffect,
    pub intensity: f32,
}

/// Headless renderer that records what would have been drawn.
#[derive(Debug)]
pub struct FrameRecorder {
    targets: Vec<(u32, u32)>,
    bound: Option<RenderTargetId>,
    cleared: bool,
    passes: Vec<RenderPass>,
    overlays: Vec<OverlayCall>,
    max_target_size: u32,
}

impl Default for FrameRecorder {
    fn default() -> Self {
        Self::new(FrameRecorder::DEFAULT_MAX_TARGET_SIZE)
    }
}

impl FrameRecorder {
    pub const DEFAULT_MAX_TARGET_SIZE: u32 = 4096;

    pub fn new(max_target_size: u32) -> Self {
        Self {
            targets: Vec::new(),
            bound: None,
            cleared: false,
            passes: Vec::new(),
            overlays: Vec::new(),
            max_target_size,
        }
    }

    pub fn target_size(&self, target: RenderTargetId) -> Option<(u32, u32)> {
        self.targets.get(target.0 as usize).copied()
    }

    pub fn passes(&self) -> &[RenderPass] {
        &self.passes
    }

    pub fn overlays(&self) -> &[OverlayCall] {
        &self.overlays
    }
}

impl Renderer for FrameRecorder {
    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<RenderTargetId, RenderError> {
        let max = self.max_target_size;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::TargetAllocation {
                width,
                height,
                reason: format!("size must be within 1..={}", self.max_target_size),
            });
        }
        let id = RenderTargetId(self.targets.len() as u32);
        self.targets.push((width, height));
        Ok(id)
    }

    fn has_render_target(&self, target: RenderTargetId) -> bool {
        (target.0 as usize) < self.targets.len()
    }

    fn render_target(&self) -> Option<RenderTargetId> {
        self.bound
    }

    fn set_render_target(&mut self, target: Option<RenderTargetId>) {
        self.bound = target;
        self.cleared = false;
    }

    fn clear(&mut self) {
        self.cleared = true;
    }

    fn render(&mut self, scene: &Scene, camera: &Camera) {
        self.passes.push(RenderPass {
            target: self.bound,
            camera: *camera,
            drawn: scene.rendered_nodes(),
            cleared: self.cleared,
        });
        self.cleared = false;
    }

    fn apply_overlay(&mut self, target: RenderTargetId, effect: OverlayEffect, intensity: f32) {
        self.overlays.push(OverlayCall {
            target,
            effect,
            intensity,
        });
    }

    fn begin_frame(&mut self) {
        self.passes.clear();
        self.overlays.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f32, y: f32, z: f32) -> Pose {
        Pose::new(Point3::new(x, y, z), UnitQuaternion::identity())
    }

    #[test]
    fn visibility_is_hierarchical() {
        let mut scene = Scene::new();
        let root = scene.add("root", None, Pose::identity());
        let child = scene.add("child", Some(root), Pose::identity());
        assert!(scene.is_rendered(child));
        scene.set_visible(root, false);
        assert_eq!(scene.visible(child), Some(true));
        assert!(!scene.is_rendered(child));
        assert!(scene.rendered_nodes().is_empty());
    }

    #[test]
    fn world_pose_composes_parents() {
        let mut scene = Scene::new();
        let root = scene.add(
            "root",
            None,
            Pose::new(
                Point3::new(10.0, 0.0, 0.0),
                crate::math::yaw_rotation(std::f32::consts::FRAC_PI_2),
            ),
        );
        let child = scene.add("child", Some(root), at(0.0, 1.0, 2.0));
        let p = scene.world_pose(child).unwrap().position;
        assert!((p - Point3::new(12.0, 1.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn remove_takes_the_subtree() {
        let mut scene = Scene::new();
        let root = scene.add("root", None, Pose::identity());
        let a = scene.add("a", Some(root), Pose::identity());
        let b = scene.add("b", Some(a), Pose::identity());
        let other = scene.add("other", None, Pose::identity());
        assert!(scene.remove(a));
        assert!(!scene.contains(b));
        assert!(scene.contains(root));
        assert!(scene.node(root).unwrap().children().is_empty());
        assert_eq!(scene.len(), 2);
        assert!(!scene.remove(a));
        assert!(scene.contains(other));
    }

    #[test]
    fn removed_slots_are_reused_and_stale_ids_stop_resolving() {
        let mut scene = Scene::new();
        let root = scene.add("root", None, Pose::identity());
        for _ in 0..50 {
            let dents: Vec<_> = (0..12)
                .map(|_| scene.add("dent", Some(root), Pose::identity()))
                .collect();
            for dent in &dents {
                scene.remove(*dent);
            }
            assert!(!scene.contains(dents[0]));
        }
        assert!(scene.slots.len() <= 13, "arena grew to {}", scene.slots.len());

        let old = scene.add("old", None, Pose::identity());
        scene.remove(old);
        let new = scene.add("new", None, Pose::identity());
        assert!(!scene.contains(old));
        assert!(!scene.remove(old));
        assert_eq!(scene.node(new).map(|n| n.name.as_str()), Some("new"));
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.visibility_flags().len(), 2);
    }

    #[test]
    fn hidden_nodes_restore_on_drop() {
        let mut scene = Scene::new();
        let a = scene.add("a", None, Pose::identity());
        let b = scene.add("b", None, Pose::identity());
        scene.set_visible(b, false);
        {
            let guard = scene.hide_temporarily(&[a, b, a]);
            assert_eq!(guard.scene().visible(a), Some(false));
        }
        assert_eq!(scene.visible(a), Some(true));
        assert_eq!(scene.visible(b), Some(false));
    }

    #[test]
    fn camera_look_at_points_local_z() {
        let mut cam = Camera::default();
        cam.position = Point3::new(0.0, 5.0, 0.0);
        cam.look_at(&Point3::new(0.0, 5.0, -10.0));
        assert!((cam.forward() - -Vector3::z()).norm() < 1e-5);

        let before = cam.rotation;
        let here = cam.position;
        cam.look_at(&here);
        assert_eq!(cam.rotation, before);
    }

    #[test]
    fn recorder_rejects_bad_targets_and_records_passes() {
        let mut r = FrameRecorder::new(1024);
        assert!(r.create_render_target(0, 256).is_err());
        assert!(r.create_render_target(2048, 256).is_err());
        let t = r.create_render_target(512, 256).unwrap();
        assert_eq!(r.target_size(t), Some((512, 256)));

        let scene = Scene::new();
        r.set_render_target(Some(t));
        r.clear();
        r.render(&scene, &Camera::default());
        r.set_render_target(None);
        r.render(&scene, &Camera::default());
        assert_eq!(r.passes().len(), 2);
        assert!(r.passes()[0].cleared);
        assert_eq!(r.passes()[0].target, Some(t));
        assert!(!r.passes()[1].cleared);

        r.begin_frame();
        assert!(r.passes().is_empty());
    }
}
