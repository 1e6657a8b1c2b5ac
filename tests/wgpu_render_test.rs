#![cfg(feature = "integration-tests")]

use cgmath::{Deg, Matrix4, Vector3};
use futures::executor::block_on;
use stratum_ngin::{
    context::GpuContext,
    data_structures::{material::Material, scene_graph::Node},
    gpu::wgpu_api::WgpuConfig,
    render::{Renderer, RendererConfig, View},
};

use crate::common::test_utils::{init_test_logging, unit_cube};

mod common;

const VS: &str = "\
struct VertexInput {
    @location(0) POSITION: vec3<f32>,
#ifdef HAS_NORMAL
    @location(1) NORMAL: vec3<f32>,
#endif
};
@group(0) @binding(0) var<uniform> PROJECTION_MATRIX: mat4x4<f32>;
@group(0) @binding(1) var<uniform> VIEW_MATRIX: mat4x4<f32>;
@group(0) @binding(2) var<uniform> MODEL_MATRIX: mat4x4<f32>;
@vertex
fn vs_main(in: VertexInput) -> @builtin(position) vec4<f32> {
    return PROJECTION_MATRIX * VIEW_MATRIX * MODEL_MATRIX * vec4<f32>(in.POSITION, 1.0);
}
";

const FS: &str = "\
@group(0) @binding(3) var<uniform> baseColorFactor: vec4<f32>;
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return baseColorFactor;
}
";

const SIZE: u32 = 64;

fn red_material() -> Material {
    let mut material = Material::new("flat_red", VS, FS);
    material.define_uniform("baseColorFactor", &[1.0, 0.0, 0.0, 1.0], 4);
    material
}

#[test]
fn cube_covers_the_center_of_the_frame() {
    init_test_logging();
    let context = match block_on(GpuContext::headless()) {
        Ok(context) => context,
        Err(e) => {
            log::warn!("skipping, no GPU available: {:#}", e);
            return;
        }
    };
    let config = WgpuConfig {
        clear_color: wgpu::Color::WHITE,
        ..Default::default()
    };
    let target = context.create_target(&config, SIZE, SIZE);
    let mut api = context.api(config);
    api.set_target(target.color_view.clone(), target.depth_view.clone());
    let mut renderer = Renderer::new(Box::new(api), RendererConfig::default());

    let root = Node::new();
    let primitive = unit_cube(&mut renderer);
    let render_primitive = renderer
        .create_render_primitive(&primitive, &red_material())
        .expect("flat material should link");
    let cube = Node::new();
    cube.add_render_primitive(render_primitive);
    root.add_child(&cube);

    let view = View::new(
        cgmath::perspective(Deg(45.0), 1.0, 0.1, 100.0),
        Matrix4::from_translation(Vector3::new(0.0, 0.0, -3.0)),
    );
    let stats = renderer.draw_view_array(&root, &[view]);
    assert_eq!(stats.draw_calls, 1);

    let image = block_on(context.read_pixels(&target)).expect("readback");
    assert_eq!(*image.get_pixel(SIZE / 2, SIZE / 2), image::Rgba([255, 0, 0, 255]));
    assert_eq!(*image.get_pixel(0, 0), image::Rgba([255, 255, 255, 255]));
}

#[test]
fn empty_scene_renders_the_clear_color() {
    init_test_logging();
    let Ok(context) = block_on(GpuContext::headless()) else {
        return;
    };
    let config = WgpuConfig {
        clear_color: wgpu::Color::WHITE,
        ..Default::default()
    };
    let target = context.create_target(&config, SIZE, SIZE);
    let mut api = context.api(config);
    api.set_target(target.color_view.clone(), target.depth_view.clone());
    let mut renderer = Renderer::new(Box::new(api), RendererConfig::default());

    let stats = renderer.draw_view_array(&Node::new(), &[View::new(
        Matrix4::from_scale(1.0),
        Matrix4::from_scale(1.0),
    )]);
    assert_eq!(stats.draw_calls, 0);

    let image = block_on(context.read_pixels(&target)).expect("readback");
    assert!(image.pixels().all(|p| *p == image::Rgba([255, 255, 255, 255])));
}
