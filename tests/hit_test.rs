use cgmath::{Deg, Matrix4, Point3, Rotation3, Quaternion, Vector3};
use stratum_ngin::data_structures::{
    ray::{Aabb, Ray},
    scene_graph::{HIT_TEST_OFFSET, Node},
};

use crate::common::test_utils::{add_cube, material, recording_renderer};

mod common;

/// A pointer at `(x, y, z)` looking down -Z.
fn pointer_at(x: f32, y: f32, z: f32) -> Matrix4<f32> {
    Matrix4::from_translation(Vector3::new(x, y, z))
}

fn assert_close(a: f32, b: f32) {
    assert!((a - b).abs() < 1e-4, "{a} != {b}");
}

#[test]
fn ray_down_negative_z_hits_the_front_face() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let (cube, _) = add_cube(&mut renderer, &root, &material("plain"));
    cube.set_selectable(true);

    let hit = root.hit_test(&pointer_at(0.0, 0.0, 5.0)).expect("cube should be hit");
    assert!(hit.node.ptr_eq(&cube));
    assert_close(hit.intersection.x, 0.0);
    assert_close(hit.intersection.y, 0.0);
    assert_close(hit.intersection.z, 0.5 + HIT_TEST_OFFSET);
    assert_close(hit.distance, 4.5 - HIT_TEST_OFFSET);
}

#[test]
fn ray_pointing_away_misses() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let (cube, _) = add_cube(&mut renderer, &root, &material("plain"));
    cube.set_selectable(true);

    let backwards = pointer_at(0.0, 0.0, 5.0) * Matrix4::from(Quaternion::from_angle_y(Deg(180.0)));
    assert!(root.hit_test(&backwards).is_none());
    assert!(root.hit_test(&pointer_at(3.0, 0.0, 5.0)).is_none());
}

#[test]
fn hit_respects_the_node_transform() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let (cube, _) = add_cube(&mut renderer, &root, &material("plain"));
    cube.set_selectable(true);
    cube.set_translation(Vector3::new(3.0, 0.0, 0.0));
    cube.set_scale(Vector3::new(2.0, 2.0, 2.0));

    assert!(root.hit_test(&pointer_at(0.0, 0.0, 5.0)).is_none());
    let hit = root.hit_test(&pointer_at(3.0, 0.0, 5.0)).expect("moved cube should be hit");
    assert_close(hit.intersection.z, 1.0 + 2.0 * HIT_TEST_OFFSET);
}

#[test]
fn nearest_child_wins() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let (far, _) = add_cube(&mut renderer, &root, &material("plain"));
    let (near, _) = add_cube(&mut renderer, &root, &material("plain"));
    far.set_selectable(true);
    near.set_selectable(true);
    far.set_translation(Vector3::new(0.0, 0.0, -3.0));

    let hit = root.hit_test(&pointer_at(0.0, 0.0, 5.0)).unwrap();
    assert!(hit.node.ptr_eq(&near));
}

#[test]
fn equal_distances_go_to_the_first_child() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let (first, _) = add_cube(&mut renderer, &root, &material("plain"));
    let (second, _) = add_cube(&mut renderer, &root, &material("plain"));
    first.set_selectable(true);
    second.set_selectable(true);

    let hit = root.hit_test(&pointer_at(0.0, 0.0, 5.0)).unwrap();
    assert!(hit.node.ptr_eq(&first));
}

#[test]
fn non_selectable_and_invisible_nodes_are_ignored() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let (cube, _) = add_cube(&mut renderer, &root, &material("plain"));
    assert!(root.hit_test(&pointer_at(0.0, 0.0, 5.0)).is_none());

    cube.set_selectable(true);
    cube.set_visible(false);
    assert!(root.hit_test(&pointer_at(0.0, 0.0, 5.0)).is_none());
}

#[test]
fn selectable_group_reports_itself_for_child_geometry() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let group = Node::named("group");
    root.add_child(&group);
    let (part, _) = add_cube(&mut renderer, &group, &material("plain"));
    part.set_translation(Vector3::new(0.0, 0.0, -1.0));
    group.set_selectable(true);

    let hit = root.hit_test(&pointer_at(0.0, 0.0, 5.0)).unwrap();
    assert!(hit.node.ptr_eq(&group));
    assert_close(hit.intersection.z, -0.5 + HIT_TEST_OFFSET);
}

#[test]
fn origin_inside_the_box_reports_the_exit() {
    let aabb = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
    let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, -1.0));
    assert_close(aabb.intersect(&ray).unwrap(), 1.0);

    let behind = Ray::new(Point3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, 1.0));
    assert!(aabb.intersect(&behind).is_none());
}
