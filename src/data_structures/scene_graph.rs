//! Scene graph and hierarchical scene organization.
//!
//! A [`Node`] is a cheap, clonable handle to a shared transform-tree entry.
//! Parents own their children; children and render primitives only hold weak
//! back-references, so detaching a subtree is enough to drop it.
//!
//! World matrices are computed lazily: mutations mark the node and its
//! descendants dirty, and the matrix is rebuilt from the parent's world matrix
//! only when it is read.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

use cgmath::{EuclideanSpace, Matrix4, MetricSpace, Point3, Quaternion, SquareMatrix, Transform as _, Vector3};

use crate::{
    data_structures::{
        ray::Ray,
        transform::{LocalTransform, Transform},
    },
    render::{Renderer, primitive::RenderPrimitive},
};

/// Default distance a hit point is moved back along the ray.
pub const HIT_TEST_OFFSET: f32 = 0.001;

/// Per-node hooks driven by the scene once per frame.
pub trait NodeBehavior {
    /// Called once before the first update after a renderer becomes available.
    /// This is where GPU resources for the node are usually created.
    fn on_attached_to_renderer(&mut self, _node: &Node, _renderer: &mut Renderer) {}

    /// `time` is the time since the scene started, `delta` the time since the
    /// previous frame.
    fn on_update(&mut self, _node: &Node, _time: Duration, _delta: Duration) {}
}

pub(crate) struct NodeData {
    name: Option<String>,
    local: LocalTransform,
    local_matrix: Matrix4<f32>,
    local_dirty: bool,
    world_matrix: Matrix4<f32>,
    world_dirty: bool,
    parent: Weak<RefCell<NodeData>>,
    children: Vec<Node>,
    render_primitives: Vec<Rc<RenderPrimitive>>,
    visible: bool,
    selectable: bool,
    active_frame: u64,
    behavior: Option<Box<dyn NodeBehavior>>,
    behavior_attached: bool,
    #[cfg(test)]
    world_recomputes: usize,
}

impl NodeData {
    fn new(name: Option<String>, local: LocalTransform) -> Self {
        Self {
            name,
            local,
            local_matrix: Matrix4::identity(),
            local_dirty: true,
            world_matrix: Matrix4::identity(),
            world_dirty: true,
            parent: Weak::new(),
            children: Vec::new(),
            render_primitives: Vec::new(),
            visible: true,
            selectable: false,
            active_frame: 0,
            behavior: None,
            behavior_attached: false,
            #[cfg(test)]
            world_recomputes: 0,
        }
    }
}

/// The result of a successful hit test.
#[derive(Clone, Debug)]
pub struct HitResult {
    /// The selectable node whose geometry was hit.
    pub node: Node,
    /// World-space hit point, moved back slightly toward the ray origin.
    pub intersection: Point3<f32>,
    /// Distance from the ray origin to `intersection`.
    pub distance: f32,
}

#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        f.debug_struct("Node")
            .field("name", &data.name)
            .field("local", &data.local)
            .field("children", &data.children.len())
            .field("render_primitives", &data.render_primitives.len())
            .field("visible", &data.visible)
            .field("selectable", &data.selectable)
            .finish()
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

/// A non-owning reference to a node.
#[derive(Clone)]
pub(crate) struct WeakNode(Weak<RefCell<NodeData>>);

impl WeakNode {
    pub(crate) fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }

    pub(crate) fn points_to(&self, node: &Node) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&node.0))
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Node {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(NodeData::new(None, LocalTransform::default()))))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(Rc::new(RefCell::new(NodeData::new(
            Some(name.into()),
            LocalTransform::default(),
        ))))
    }

    pub fn name(&self) -> Option<String> {
        self.0.borrow().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.0.borrow_mut().name = Some(name.into());
    }

    /// `true` if both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.upgrade().map(Node)
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.borrow().children.clone()
    }

    /// Depth-first search below this node.
    pub fn find_child_by_name(&self, name: &str) -> Option<Node> {
        for child in self.children() {
            if child.0.borrow().name.as_deref() == Some(name) {
                return Some(child);
            }
            if let Some(found) = child.find_child_by_name(name) {
                return Some(found);
            }
        }
        None
    }

    fn is_ancestor_or_self(&self, other: &Node) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.ptr_eq(other) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Appends `child`, detaching it from its previous parent first.
    ///
    /// Adding a node to itself or to one of its own descendants is refused.
    pub fn add_child(&self, child: &Node) {
        if self.is_ancestor_or_self(child) {
            log::warn!("refusing to add a node as a descendant of itself");
            return;
        }
        if let Some(old_parent) = child.parent() {
            old_parent.remove_child(child);
        }
        {
            let mut data = self.0.borrow_mut();
            data.children.push(child.clone());
        }
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        child.mark_world_dirty();
        child.register_instances();
    }

    /// Detaches `child` and unregisters its subtree from every render
    /// primitive it references. Returns `false` if `child` is not a child of
    /// this node.
    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut data = self.0.borrow_mut();
            match data.children.iter().position(|c| c.ptr_eq(child)) {
                Some(idx) => {
                    data.children.remove(idx);
                    true
                }
                None => false,
            }
        };
        if removed {
            child.0.borrow_mut().parent = Weak::new();
            child.mark_world_dirty();
            child.unregister_instances();
        }
        removed
    }

    fn register_instances(&self) {
        for primitive in self.render_primitives() {
            primitive.add_instance(self);
        }
        for child in self.children() {
            child.register_instances();
        }
    }

    fn unregister_instances(&self) {
        for primitive in self.render_primitives() {
            primitive.remove_instance(self);
        }
        for child in self.children() {
            child.unregister_instances();
        }
    }

    pub fn add_render_primitive(&self, primitive: Rc<RenderPrimitive>) {
        primitive.add_instance(self);
        self.0.borrow_mut().render_primitives.push(primitive);
    }

    pub fn remove_render_primitive(&self, primitive: &Rc<RenderPrimitive>) -> bool {
        let removed = {
            let mut data = self.0.borrow_mut();
            match data
                .render_primitives
                .iter()
                .position(|p| Rc::ptr_eq(p, primitive))
            {
                Some(idx) => {
                    data.render_primitives.remove(idx);
                    true
                }
                None => false,
            }
        };
        if removed {
            primitive.remove_instance(self);
        }
        removed
    }

    pub fn clear_render_primitives(&self) {
        let primitives = std::mem::take(&mut self.0.borrow_mut().render_primitives);
        for primitive in primitives {
            primitive.remove_instance(self);
        }
    }

    pub fn render_primitives(&self) -> Vec<Rc<RenderPrimitive>> {
        self.0.borrow().render_primitives.clone()
    }

    pub fn visible(&self) -> bool {
        self.0.borrow().visible
    }

    /// An invisible node hides its whole subtree.
    pub fn set_visible(&self, visible: bool) {
        self.0.borrow_mut().visible = visible;
    }

    pub fn selectable(&self) -> bool {
        self.0.borrow().selectable
    }

    pub fn set_selectable(&self, selectable: bool) {
        self.0.borrow_mut().selectable = selectable;
    }

    pub fn set_behavior(&self, behavior: Box<dyn NodeBehavior>) {
        let mut data = self.0.borrow_mut();
        data.behavior = Some(behavior);
        data.behavior_attached = false;
    }

    pub fn active_frame(&self) -> u64 {
        self.0.borrow().active_frame
    }

    pub fn local_transform(&self) -> LocalTransform {
        self.0.borrow().local
    }

    /// Replaces the local transform. TRS and explicit matrices exclude each
    /// other; the last one set wins.
    pub fn set_local_transform(&self, local: LocalTransform) {
        {
            let mut data = self.0.borrow_mut();
            data.local = local;
            data.local_dirty = true;
        }
        self.mark_world_dirty();
    }

    fn modify_trs(&self, f: impl FnOnce(&mut Transform)) {
        let mut trs = self.0.borrow().local.to_trs();
        f(&mut trs);
        self.set_local_transform(LocalTransform::Trs(trs));
    }

    pub fn set_matrix(&self, matrix: Matrix4<f32>) {
        self.set_local_transform(LocalTransform::Matrix(matrix));
    }

    pub fn set_translation(&self, translation: Vector3<f32>) {
        self.modify_trs(|trs| trs.translation = translation);
    }

    pub fn set_rotation(&self, rotation: Quaternion<f32>) {
        self.modify_trs(|trs| trs.rotation = rotation);
    }

    pub fn set_scale(&self, scale: Vector3<f32>) {
        self.modify_trs(|trs| trs.scale = scale);
    }

    /// Decomposed from the explicit matrix if one is set.
    pub fn translation(&self) -> Vector3<f32> {
        self.0.borrow().local.to_trs().translation
    }

    pub fn rotation(&self) -> Quaternion<f32> {
        self.0.borrow().local.to_trs().rotation
    }

    pub fn scale(&self) -> Vector3<f32> {
        self.0.borrow().local.to_trs().scale
    }

    pub fn local_matrix(&self) -> Matrix4<f32> {
        let mut data = self.0.borrow_mut();
        if data.local_dirty {
            data.local_matrix = data.local.to_matrix();
            data.local_dirty = false;
        }
        data.local_matrix
    }

    fn mark_world_dirty(&self) {
        let children = {
            let mut data = self.0.borrow_mut();
            // a dirty node already has a dirty subtree
            if data.world_dirty {
                return;
            }
            data.world_dirty = true;
            data.children.clone()
        };
        for child in children {
            child.mark_world_dirty();
        }
    }

    /// The parent's world matrix times the local matrix, rebuilt only if
    /// something on the path to the root changed since the last read.
    pub fn world_matrix(&self) -> Matrix4<f32> {
        let parent = {
            let data = self.0.borrow();
            if !data.world_dirty {
                return data.world_matrix;
            }
            data.parent.upgrade().map(Node)
        };
        let local = self.local_matrix();
        let world = match parent {
            Some(parent) => parent.world_matrix() * local,
            None => local,
        };
        let mut data = self.0.borrow_mut();
        data.world_matrix = world;
        data.world_dirty = false;
        #[cfg(test)]
        {
            data.world_recomputes += 1;
        }
        world
    }

    /// Stamps this node, its primitives and its visible descendants active
    /// for `frame_id`. Invisible subtrees are skipped entirely.
    pub fn mark_active(&self, frame_id: u64) {
        let (primitives, children) = {
            let mut data = self.0.borrow_mut();
            if !data.visible {
                return;
            }
            data.active_frame = frame_id;
            (data.render_primitives.clone(), data.children.clone())
        };
        for primitive in primitives {
            primitive.mark_active(frame_id);
        }
        for child in children {
            child.mark_active(frame_id);
        }
    }

    /// Copies the subtree. Render primitives are shared, behaviors are not
    /// copied.
    ///
    /// The copy becomes an instance of its primitives once it is attached
    /// with [`Node::add_child`].
    pub fn deep_clone(&self) -> Node {
        let (data, children) = {
            let source = self.0.borrow();
            let mut data = NodeData::new(source.name.clone(), source.local);
            data.visible = source.visible;
            data.selectable = source.selectable;
            data.render_primitives = source.render_primitives.clone();
            (data, source.children.clone())
        };
        let clone = Node(Rc::new(RefCell::new(data)));
        for child in children {
            let child_clone = child.deep_clone();
            child_clone.0.borrow_mut().parent = Rc::downgrade(&clone.0);
            clone.0.borrow_mut().children.push(child_clone);
        }
        clone
    }

    /// Casts a ray given as a matrix (origin at its translation, pointing
    /// down its -Z axis) through the subtree.
    pub fn hit_test(&self, ray_matrix: &Matrix4<f32>) -> Option<HitResult> {
        self.hit_test_with_offset(ray_matrix, HIT_TEST_OFFSET)
    }

    pub fn hit_test_with_offset(&self, ray_matrix: &Matrix4<f32>, offset: f32) -> Option<HitResult> {
        let origin = ray_matrix.transform_point(Point3::origin());
        self.hit_test_inner(ray_matrix, origin, offset)
    }

    fn hit_test_inner(
        &self,
        ray_matrix: &Matrix4<f32>,
        origin: Point3<f32>,
        offset: f32,
    ) -> Option<HitResult> {
        if !self.visible() {
            return None;
        }
        if self.selectable() {
            return self
                .nearest_geometry_hit(ray_matrix, origin, offset)
                .map(|(intersection, distance)| HitResult {
                    node: self.clone(),
                    intersection,
                    distance,
                });
        }
        let mut best: Option<HitResult> = None;
        for child in self.children() {
            if let Some(hit) = child.hit_test_inner(ray_matrix, origin, offset) {
                if best.as_ref().is_none_or(|b| hit.distance < b.distance) {
                    best = Some(hit);
                }
            }
        }
        best
    }

    /// Tests the bounds of this node's primitives and of every visible
    /// descendant's, returning the nearest world-space hit.
    fn nearest_geometry_hit(
        &self,
        ray_matrix: &Matrix4<f32>,
        origin: Point3<f32>,
        offset: f32,
    ) -> Option<(Point3<f32>, f32)> {
        let mut best: Option<(Point3<f32>, f32)> = None;
        let world = self.world_matrix();
        if let Some(inverse) = world.invert() {
            let local_ray = Ray::from_matrix(&(inverse * ray_matrix));
            for primitive in self.render_primitives() {
                let Some(bounds) = primitive.bounds() else {
                    continue;
                };
                let Some(t) = bounds.intersect(&local_ray) else {
                    continue;
                };
                let local_point = local_ray.at((t - offset).max(0.0));
                let intersection = world.transform_point(local_point);
                let distance = origin.distance(intersection);
                if best.is_none_or(|(_, d)| distance < d) {
                    best = Some((intersection, distance));
                }
            }
        }
        for child in self.children() {
            if !child.visible() {
                continue;
            }
            if let Some(hit) = child.nearest_geometry_hit(ray_matrix, origin, offset) {
                if best.is_none_or(|(_, d)| hit.1 < d) {
                    best = Some(hit);
                }
            }
        }
        best
    }

    /// Runs behaviors depth-first. Each behavior is attached to the renderer
    /// before its first update once one is available.
    pub(crate) fn update_behaviors(
        &self,
        mut renderer: Option<&mut Renderer>,
        time: Duration,
        delta: Duration,
    ) {
        let (behavior, attached) = {
            let mut data = self.0.borrow_mut();
            (data.behavior.take(), data.behavior_attached)
        };
        if let Some(mut behavior) = behavior {
            let mut now_attached = attached;
            if !attached {
                if let Some(renderer) = renderer.as_deref_mut() {
                    behavior.on_attached_to_renderer(self, renderer);
                    now_attached = true;
                }
            }
            behavior.on_update(self, time, delta);
            let mut data = self.0.borrow_mut();
            // the behavior may have installed a replacement
            if data.behavior.is_none() {
                data.behavior = Some(behavior);
                data.behavior_attached = now_attached;
            }
        }
        for child in self.children() {
            child.update_behaviors(renderer.as_deref_mut(), time, delta);
        }
    }

    /// Makes every behavior in the subtree attach again on its next update.
    pub(crate) fn reset_behavior_attachment(&self) {
        self.0.borrow_mut().behavior_attached = false;
        for child in self.children() {
            child.reset_behavior_attachment();
        }
    }

    #[cfg(test)]
    fn world_recomputes(&self) -> usize {
        self.0.borrow().world_recomputes
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, Rotation3, Vector4};

    use super::*;

    #[test]
    fn repeated_mutations_recompute_once() {
        let parent = Node::new();
        let child = Node::new();
        parent.add_child(&child);
        let _ = child.world_matrix();
        let before = child.world_recomputes();

        for i in 0..10 {
            child.set_translation(Vector3::new(i as f32, 0.0, 0.0));
            child.set_rotation(Quaternion::from_angle_y(Deg(i as f32)));
            child.set_scale(Vector3::new(2.0, 2.0, 2.0));
            parent.set_translation(Vector3::new(0.0, i as f32, 0.0));
        }
        assert_eq!(child.world_recomputes(), before);

        let world = child.world_matrix();
        let _ = child.world_matrix();
        assert_eq!(child.world_recomputes(), before + 1);

        let expected = Matrix4::from_translation(Vector3::new(0.0, 9.0, 0.0))
            * Matrix4::from_translation(Vector3::new(9.0, 0.0, 0.0))
            * Matrix4::from(Quaternion::from_angle_y(Deg(9.0)))
            * Matrix4::from_scale(2.0);
        let a: [[f32; 4]; 4] = world.into();
        let b: [[f32; 4]; 4] = expected.into();
        for (ca, cb) in a.iter().zip(b.iter()) {
            for (x, y) in ca.iter().zip(cb.iter()) {
                assert!((x - y).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn unread_subtree_is_never_recomputed() {
        let root = Node::new();
        let child = Node::new();
        let grandchild = Node::new();
        root.add_child(&child);
        child.add_child(&grandchild);
        for i in 0..5 {
            root.set_translation(Vector3::new(i as f32, 0.0, 0.0));
            let _ = root.world_matrix();
        }
        assert_eq!(grandchild.world_recomputes(), 0);
        assert_eq!(child.world_recomputes(), 0);
        let p = grandchild.world_matrix() * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_eq!(p.x, 4.0);
        assert_eq!(child.world_recomputes(), 1);
    }
}
