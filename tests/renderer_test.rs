use std::{cell::Cell, rc::Rc};

use anyhow::anyhow;
use cgmath::{Matrix4, Point3, SquareMatrix, Vector3};
use futures::{FutureExt, channel::oneshot};
use stratum_ngin::{
    data_structures::{
        material::{Capability, Material, RenderOrder},
        primitive::{AttributeSemantic, ComponentType, IndexType, Primitive, PrimitiveAttribute, Topology},
        scene_graph::Node,
        texture::{Texture, TextureData, TextureKey, TextureStream},
    },
    gpu::{BufferTarget, UniformValue, VertexBufferBinding, Viewport, recording::GpuCommand},
    render::{AssetId, RendererConfig, View},
    resources::buffer::BufferData,
};

use crate::common::test_utils::{
    FRAGMENT_SHADER, VERTEX_SHADER, add_cube, capability_calls, draw, last_frame, material,
    material_with_state, mono_view, recording_renderer, recording_renderer_with, unit_cube,
};

mod common;

fn model_translations_x(commands: &[GpuCommand]) -> Vec<f32> {
    commands
        .iter()
        .filter_map(|c| match c {
            GpuCommand::SetUniform {
                name,
                value: UniformValue::Mat4(m),
            } if name == "MODEL_MATRIX" => Some(m[12]),
            _ => None,
        })
        .collect()
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn is_state_call(c: &GpuCommand) -> bool {
    matches!(
        c,
        GpuCommand::SetCapability(..) | GpuCommand::SetBlendFunc(..) | GpuCommand::SetDepthFunc(..)
    )
}

#[test]
fn only_differing_state_is_applied() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    let a = material("diff");
    let b = material_with_state("diff", |s| {
        s.set_cull_face(false);
        s.set_stencil_test(true);
    });
    for m in [&a, &a, &b, &a] {
        add_cube(&mut renderer, &root, m);
    }

    let stats = draw(&mut renderer, &root);
    assert_eq!(stats.draw_calls, 4);
    assert_eq!(stats.program_binds, 1);
    assert_eq!(stats.material_binds, 4);

    let frame = last_frame(&log);
    // everything once for the first material, then two bits each way
    assert_eq!(capability_calls(&frame), 7 + 2 + 2);
    assert_eq!(frame.iter().filter(|c| matches!(c, GpuCommand::SetBlendFunc(..))).count(), 1);
    assert_eq!(frame.iter().filter(|c| matches!(c, GpuCommand::SetDepthFunc(..))).count(), 1);

    let draws: Vec<usize> = frame
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, GpuCommand::Draw(_)))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(draws.len(), 4);
    assert!(!frame[draws[0]..draws[1]].iter().any(is_state_call));
    assert_eq!(capability_calls(&frame[draws[1]..draws[2]]), 2);
    assert_eq!(capability_calls(&frame[draws[2]..draws[3]]), 2);
}

#[test]
fn every_bucket_starts_from_a_clean_slate() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    add_cube(&mut renderer, &root, &material("opaque"));
    let mut sky = material("sky");
    sky.render_order = RenderOrder::Sky;
    add_cube(&mut renderer, &root, &sky);

    draw(&mut renderer, &root);
    assert_eq!(capability_calls(&last_frame(&log)), 14);
}

#[test]
fn incomplete_primitives_wait_for_their_index_buffer() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let (tx, rx) = oneshot::channel::<Vec<u8>>();

    let vertices = renderer.create_render_buffer(
        BufferTarget::Vertex,
        BufferData::from_f32(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
    );
    let indices = renderer.create_render_buffer(
        BufferTarget::Index,
        BufferData::Pending(async move { rx.await.map_err(anyhow::Error::from) }.boxed_local()),
    );
    let primitive = Primitive::new(
        vec![PrimitiveAttribute::new(
            AttributeSemantic::Position,
            vertices,
            3,
            ComponentType::F32,
            0,
            0,
        )],
        3,
        Topology::Triangles,
    )
    .with_indices(indices.clone(), IndexType::U16)
    .with_bounds(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0));
    let render_primitive = renderer
        .create_render_primitive(&primitive, &material("gated"))
        .unwrap();
    let node = Node::new();
    node.add_render_primitive(render_primitive.clone());
    root.add_child(&node);

    for _ in 0..3 {
        let stats = draw(&mut renderer, &root);
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.skipped_incomplete, 1);
    }
    assert!(!render_primitive.is_complete());
    assert!(indices.handle().is_none());

    tx.send(vec![0, 0, 1, 0, 2, 0]).unwrap();
    let stats = draw(&mut renderer, &root);
    assert_eq!(stats.draw_calls, 1);
    assert!(render_primitive.is_complete());
    assert_eq!(indices.len(), 6);
}

#[test]
fn late_contents_of_a_dropped_buffer_are_ignored() {
    let (mut renderer, log) = recording_renderer();
    let (tx, rx) = oneshot::channel::<Vec<u8>>();
    let buffer = renderer.create_render_buffer(
        BufferTarget::Vertex,
        BufferData::Pending(async move { rx.await.map_err(anyhow::Error::from) }.boxed_local()),
    );
    drop(buffer);
    tx.send(vec![0; 12]).unwrap();
    renderer.pump();
    assert_eq!(log.count(|c| matches!(c, GpuCommand::CreateBuffer { .. })), 0);
}

#[test]
fn updates_to_a_loading_buffer_are_replayed() {
    let (mut renderer, log) = recording_renderer();
    let (tx, rx) = oneshot::channel::<Vec<u8>>();
    let buffer = renderer.create_render_buffer(
        BufferTarget::Vertex,
        BufferData::Pending(async move { rx.await.map_err(anyhow::Error::from) }.boxed_local()),
    );
    renderer.update_render_buffer(&buffer, 4, &[1, 2, 3, 4]);
    assert!(log.is_empty());

    tx.send(vec![0; 16]).unwrap();
    renderer.pump();
    let commands = log.take();
    assert!(matches!(commands[0], GpuCommand::CreateBuffer { len: 16, .. }));
    assert!(matches!(commands[1], GpuCommand::UpdateBuffer { offset: 4, len: 4, .. }));

    renderer.update_render_buffer(&buffer, 0, &[9; 8]);
    assert!(matches!(log.snapshot()[0], GpuCommand::UpdateBuffer { offset: 0, len: 8, .. }));
}

#[test]
fn programs_are_cached_by_name_and_defines() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    let (_, first) = add_cube(&mut renderer, &root, &material("shared"));
    let (_, second) = add_cube(&mut renderer, &root, &material("shared"));
    assert!(Rc::ptr_eq(first.material().program(), second.material().program()));

    let mut variant = material("shared");
    variant.set_define("DOUBLE_SIDED", "1");
    let (_, third) = add_cube(&mut renderer, &root, &variant);
    assert!(!Rc::ptr_eq(first.material().program(), third.material().program()));

    assert_eq!(renderer.program_count(), 2);
    assert_eq!(log.count(|c| matches!(c, GpuCommand::CreateProgram { .. })), 2);

    let plain = material("shared");
    let cube = unit_cube(&mut renderer);
    let defines = plain.program_defines(cube.attribute_mask());
    let looked_up = renderer.get_program(&plain, &defines);
    assert!(Rc::ptr_eq(&looked_up, first.material().program()));
}

#[test]
fn failed_programs_are_skipped_and_never_retried() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    let broken = Material::new("broken", VERTEX_SHADER, "uniform vec4 baseColorFactor;\n");
    let (_, first) = add_cube(&mut renderer, &root, &broken);
    let (_, second) = add_cube(&mut renderer, &root, &broken);
    add_cube(&mut renderer, &root, &material("working"));

    let program = first.material().program();
    assert!(!program.is_usable());
    assert!(program.diagnostic().unwrap().contains("link"));
    assert!(Rc::ptr_eq(program, second.material().program()));
    assert_eq!(renderer.program_count(), 2);

    let stats = draw(&mut renderer, &root);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(log.count(|c| matches!(c, GpuCommand::CreateProgram { .. })), 1);
}

#[test]
fn error_directive_fails_only_the_affected_variant() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let fragment = format!("#ifdef UNSUPPORTED\n#error feature not supported\n#endif\n{FRAGMENT_SHADER}");
    let ok = Material::new("guarded", VERTEX_SHADER, fragment.clone());
    let mut bad = Material::new("guarded", VERTEX_SHADER, fragment);
    bad.set_define("UNSUPPORTED", "1");

    let (_, ok) = add_cube(&mut renderer, &root, &ok);
    let (_, bad) = add_cube(&mut renderer, &root, &bad);
    assert!(ok.material().program().is_usable());
    assert!(
        bad.material()
            .program()
            .diagnostic()
            .unwrap()
            .contains("feature not supported")
    );
}

#[test]
fn buckets_draw_in_fixed_order() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();

    let mut additive = material("additive");
    additive.render_order = RenderOrder::Additive;
    let transparent = material_with_state("transparent", |s| s.set_blend(true));
    let mut sky = material("sky");
    sky.render_order = RenderOrder::Sky;
    let opaque = material("opaque");
    let mut ignored = material("ignored");
    ignored.render_order = RenderOrder::Ignore;

    for (m, x) in [(&additive, 4.0), (&transparent, 3.0), (&sky, 2.0), (&opaque, 1.0), (&ignored, 9.0)] {
        let (node, _) = add_cube(&mut renderer, &root, m);
        node.set_translation(Vector3::new(x, 0.0, 0.0));
    }

    assert_eq!(renderer.bucket(RenderOrder::Transparent).len(), 1);
    assert!(renderer.bucket(RenderOrder::Ignore).is_empty());

    let stats = draw(&mut renderer, &root);
    assert_eq!(stats.draw_calls, 4);
    assert_eq!(model_translations_x(&last_frame(&log)), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn primitives_sharing_a_program_are_kept_together() {
    for (sort_by_program, binds) in [(true, 2), (false, 3)] {
        let (mut renderer, _log) = recording_renderer_with(RendererConfig {
            sort_by_program,
            ..Default::default()
        });
        let root = Node::new();
        add_cube(&mut renderer, &root, &material("first"));
        add_cube(&mut renderer, &root, &material("second"));
        add_cube(&mut renderer, &root, &material("first"));

        let stats = draw(&mut renderer, &root);
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.program_binds, binds);
    }
}

#[test]
fn one_draw_per_visible_instance() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    let (first, primitive) = add_cube(&mut renderer, &root, &material("instanced"));
    first.set_translation(Vector3::new(1.0, 0.0, 0.0));
    for x in [2.0, 3.0] {
        let node = Node::new();
        node.set_translation(Vector3::new(x, 0.0, 0.0));
        node.add_render_primitive(primitive.clone());
        root.add_child(&node);
    }
    root.children()[1].set_visible(false);

    let stats = draw(&mut renderer, &root);
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.material_binds, 1);
    let frame = last_frame(&log);
    assert_eq!(frame.iter().filter(|c| matches!(c, GpuCommand::BindVertexLayout(_))).count(), 1);
    assert_eq!(model_translations_x(&frame), vec![1.0, 3.0]);

    root.remove_child(&first);
    assert_eq!(draw(&mut renderer, &root).draw_calls, 1);
}

#[test]
fn equal_texture_keys_share_one_gpu_texture() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    let mut red = material("textured");
    red.set_texture("baseColor", Rc::new(Texture::from_color([1.0, 0.0, 0.0, 1.0])));
    let mut also_red = material("textured");
    also_red.set_texture("baseColor", Rc::new(Texture::from_color([1.0, 0.0, 0.0, 1.0])));

    let (_, first) = add_cube(&mut renderer, &root, &red);
    let (_, second) = add_cube(&mut renderer, &root, &also_red);
    let a = first.material().samplers()[0].texture.clone().unwrap();
    let b = second.material().samplers()[0].texture.clone().unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(renderer.texture_count(), 1);
    assert_eq!(log.count(|c| matches!(c, GpuCommand::CreateTexture { .. })), 1);

    draw(&mut renderer, &root);
    let frame = last_frame(&log);
    // the sampler is pointed at its unit once, on first use of the program
    let sampler_sets = frame
        .iter()
        .filter(|c| {
            matches!(c, GpuCommand::SetUniform { name, value: UniformValue::Int(0) } if name == "baseColor")
        })
        .count();
    assert_eq!(sampler_sets, 1);
    assert_eq!(
        frame.iter().filter(|c| matches!(c, GpuCommand::BindTexture { unit: 0, .. })).count(),
        2
    );
}

#[test]
fn reusable_textures_feed_every_renderer() {
    let mut shared = material("shared");
    shared.set_texture("baseColor", Rc::new(Texture::from_color([0.0, 1.0, 0.0, 1.0])));
    let mut checker = material("checker");
    checker.set_texture(
        "baseColor",
        Rc::new(Texture::from_bytes(png_bytes(), Some("png"), Some("checker.png"))),
    );

    for _ in 0..2 {
        let (mut renderer, log) = recording_renderer();
        let root = Node::new();
        add_cube(&mut renderer, &root, &shared);
        add_cube(&mut renderer, &root, &checker);
        assert_eq!(draw(&mut renderer, &root).draw_calls, 2);
        assert_eq!(log.count(|c| matches!(c, GpuCommand::CreateTexture { .. })), 2);
    }
}

#[test]
fn pending_textures_belong_to_the_first_renderer() {
    let (_tx, rx) = oneshot::channel::<Vec<u8>>();
    let mut late = material("late");
    late.set_texture(
        "baseColor",
        Rc::new(Texture::from_future(
            TextureKey::Url("late.png".into()),
            async move { rx.await.map_err(anyhow::Error::from) }.boxed_local(),
        )),
    );

    let (mut first, _log) = recording_renderer();
    let first_root = Node::new();
    let (_, waiting) = add_cube(&mut first, &first_root, &late);
    draw(&mut first, &first_root);
    assert!(!waiting.material().is_complete());

    let (mut second, _log) = recording_renderer();
    let second_root = Node::new();
    let (_, starved) = add_cube(&mut second, &second_root, &late);
    assert_eq!(draw(&mut second, &second_root).draw_calls, 0);
    assert!(starved.material().samplers()[0].texture.as_ref().unwrap().completion().is_failed());
    assert!(starved.completion().is_failed());
}

#[test]
fn textures_arriving_later_unblock_their_primitives() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    let (tx, rx) = oneshot::channel::<Vec<u8>>();
    let mut textured = material("late");
    textured.set_texture(
        "baseColor",
        Rc::new(Texture::from_future(
            TextureKey::Url("late.png".into()),
            async move { rx.await.map_err(anyhow::Error::from) }.boxed_local(),
        )),
    );
    let (_, primitive) = add_cube(&mut renderer, &root, &textured);

    assert_eq!(draw(&mut renderer, &root).draw_calls, 0);
    tx.send(png_bytes()).unwrap();
    assert_eq!(draw(&mut renderer, &root).draw_calls, 1);
    assert!(primitive.material().is_complete());
    assert_eq!(
        log.count(|c| matches!(c, GpuCommand::CreateTexture { width: 2, height: 2, .. })),
        1
    );
}

#[test]
fn failed_textures_hide_only_their_primitive() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let mut broken = material("broken_texture");
    broken.set_texture(
        "baseColor",
        Rc::new(Texture::from_future(
            TextureKey::Named("missing".into()),
            async { Err::<Vec<u8>, _>(anyhow!("404")) }.boxed_local(),
        )),
    );
    let (_, failed) = add_cube(&mut renderer, &root, &broken);
    add_cube(&mut renderer, &root, &material("fine"));

    for _ in 0..2 {
        assert_eq!(draw(&mut renderer, &root).draw_calls, 1);
    }
    assert!(failed.completion().is_failed());
}

struct CountingStream(Rc<Cell<u8>>);

impl TextureStream for CountingStream {
    fn poll_frame(&mut self) -> Option<TextureData> {
        let n = self.0.get() + 1;
        self.0.set(n);
        Some(TextureData::solid(1, 1, [n, n, n, 255]))
    }
}

#[test]
fn streams_are_polled_while_in_use() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    let polls = Rc::new(Cell::new(0));
    let mut video = material("video");
    video.set_texture(
        "baseColor",
        Rc::new(Texture::from_stream(Box::new(CountingStream(polls.clone())))),
    );
    let (node, _) = add_cube(&mut renderer, &root, &video);

    assert_eq!(draw(&mut renderer, &root).draw_calls, 1);
    assert_eq!(polls.get(), 1);
    draw(&mut renderer, &root);
    assert_eq!(polls.get(), 2);
    assert_eq!(log.count(|c| matches!(c, GpuCommand::UpdateTexture { .. })), 1);

    node.set_visible(false);
    draw(&mut renderer, &root);
    assert_eq!(polls.get(), 3);
    draw(&mut renderer, &root);
    draw(&mut renderer, &root);
    assert_eq!(polls.get(), 3);
}

#[test]
fn disabled_write_masks_are_restored_after_the_frame() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    add_cube(
        &mut renderer,
        &root,
        &material_with_state("no_depth_write", |s| s.set_depth_mask(false)),
    );
    draw(&mut renderer, &root);

    let frame = last_frame(&log);
    let last_draw = frame.iter().rposition(|c| matches!(c, GpuCommand::Draw(_))).unwrap();
    let tail = &frame[last_draw..];
    assert!(tail.contains(&GpuCommand::SetCapability(Capability::DepthMask, true)));
    assert_eq!(tail.last(), Some(&GpuCommand::EndFrame));
}

#[test]
fn stereo_views_draw_each_instance_twice() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    add_cube(&mut renderer, &root, &material("stereo"));

    let left = mono_view().with_viewport(Viewport::new(0.0, 0.0, 400.0, 400.0));
    let right = View::new(mono_view().projection_matrix, Matrix4::from_translation(Vector3::new(-0.06, 0.0, 0.0)))
        .with_viewport(Viewport::new(400.0, 0.0, 400.0, 400.0))
        .with_eye_index(1);
    let stats = renderer.draw_view_array(&root, &[left, right]);
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.program_binds, 1);

    let frame = last_frame(&log);
    assert_eq!(frame.iter().filter(|c| matches!(c, GpuCommand::SetViewport(_))).count(), 2);
    let eyes: Vec<UniformValue> = frame
        .iter()
        .filter_map(|c| match c {
            GpuCommand::SetUniform { name, value } if name == "EYE_INDEX" => Some(value.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(eyes, vec![UniformValue::Int(0), UniformValue::Int(1)]);
}

#[test]
fn frame_ids_increase_and_stamp_nodes() {
    let (mut renderer, _log) = recording_renderer();
    let root = Node::new();
    let (node, primitive) = add_cube(&mut renderer, &root, &material("plain"));
    let first = draw(&mut renderer, &root);
    let second = draw(&mut renderer, &root);
    assert!(second.frame_id > first.frame_id);
    assert_eq!(node.active_frame(), second.frame_id);
    assert_eq!(primitive.active_frame(), second.frame_id);
    assert_eq!(renderer.frame_id(), second.frame_id);
}

#[test]
fn uniform_values_flow_into_draws() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    let (_, primitive) = add_cube(&mut renderer, &root, &material("tinted"));
    assert!(primitive.set_uniform("baseColorFactor", &[1.0, 0.0, 0.0, 1.0]));
    assert!(!primitive.set_uniform("unknown", &[1.0]));
    assert!(renderer.set_uniform("TIME", &[2.5]));
    assert!(!renderer.set_uniform("TIME", &[1.0; 5]));

    draw(&mut renderer, &root);
    let frame = last_frame(&log);
    assert!(frame.contains(&GpuCommand::SetUniform {
        name: "baseColorFactor".into(),
        value: UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]),
    }));
    assert!(frame.contains(&GpuCommand::SetUniform {
        name: "TIME".into(),
        value: UniformValue::Float(2.5),
    }));
    assert!(frame.contains(&GpuCommand::SetUniform {
        name: "VIEW_MATRIX".into(),
        value: UniformValue::mat4(&Matrix4::identity()),
    }));
}

fn vertex_layouts(commands: &[GpuCommand]) -> Vec<Vec<VertexBufferBinding>> {
    commands
        .iter()
        .filter_map(|c| match c {
            GpuCommand::BindVertexLayout(layout) => Some(layout.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn interleaved_attributes_share_one_vertex_buffer_binding() {
    let (mut renderer, log) = recording_renderer();
    let root = Node::new();
    let (_, cube) = add_cube(&mut renderer, &root, &material("plain"));
    assert_eq!(cube.vertex_buffer_count(), 1);

    draw(&mut renderer, &root);
    let layouts = vertex_layouts(&last_frame(&log));
    assert_eq!(layouts.len(), 1);
    assert_eq!(layouts[0].len(), 1);
    let offsets: Vec<u32> = layouts[0][0].attributes.iter().map(|a| a.byte_offset).collect();
    assert_eq!(offsets.len(), 3);
    assert!(offsets.contains(&0) && offsets.contains(&12) && offsets.contains(&20));
}

#[test]
fn separate_source_buffers_get_separate_bindings() {
    let (mut renderer, log) = recording_renderer();
    let positions = renderer.create_render_buffer(
        BufferTarget::Vertex,
        BufferData::from_f32(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
    );
    let normals = renderer.create_render_buffer(BufferTarget::Vertex, BufferData::from_f32(&[0.0; 9]));
    let triangle = Primitive::new(
        vec![
            PrimitiveAttribute::new(AttributeSemantic::Position, positions, 3, ComponentType::F32, 0, 0),
            PrimitiveAttribute::new(AttributeSemantic::Normal, normals, 3, ComponentType::F32, 0, 0),
        ],
        3,
        Topology::Triangles,
    );
    let primitive = renderer
        .create_render_primitive(&triangle, &material("plain"))
        .unwrap();
    assert_eq!(primitive.vertex_buffer_count(), 2);

    let root = Node::new();
    root.add_render_primitive(primitive);
    assert_eq!(draw(&mut renderer, &root).draw_calls, 1);
    let layouts = vertex_layouts(&last_frame(&log));
    assert_eq!(layouts.len(), 1);
    let bindings = &layouts[0];
    assert_eq!(bindings.len(), 2);
    assert_ne!(bindings[0].buffer, bindings[1].buffer);
    assert!(bindings.iter().all(|b| b.attributes.len() == 1));
}

#[test]
fn unlinkable_inputs_are_rejected() {
    let (mut renderer, _log) = recording_renderer();
    let cube = unit_cube(&mut renderer);
    assert!(renderer.create_render_primitive(&cube, &material("")).is_err());

    let normals = renderer.create_render_buffer(BufferTarget::Vertex, BufferData::from_f32(&[0.0; 9]));
    let headless = Primitive::new(
        vec![PrimitiveAttribute::new(
            AttributeSemantic::Normal,
            normals,
            3,
            ComponentType::F32,
            0,
            0,
        )],
        3,
        Topology::Triangles,
    );
    let err = renderer
        .create_render_primitive(&headless, &material("plain"))
        .unwrap_err();
    assert!(err.to_string().contains("POSITION"));
}

#[test]
fn asset_state_is_scoped_to_the_renderer() {
    let (mut renderer, _log) = recording_renderer();
    let id = AssetId::new();
    renderer.insert_asset_state(id, vec![1u32, 2]);
    assert_eq!(renderer.asset_state::<Vec<u32>>(id), Some(&vec![1, 2]));
    assert!(renderer.asset_state::<String>(id).is_none());
    assert!(renderer.asset_state::<Vec<u32>>(AssetId::new()).is_none());

    renderer.asset_state_mut::<Vec<u32>>(id).unwrap().push(3);
    assert_eq!(renderer.asset_state::<Vec<u32>>(id).map(Vec::len), Some(3));
    assert!(renderer.remove_asset_state(id));
    assert!(!renderer.remove_asset_state(id));
}
