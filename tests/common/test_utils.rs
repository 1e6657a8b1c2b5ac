use std::rc::Rc;

use cgmath::{Deg, Matrix4, Point3, SquareMatrix};
use stratum_ngin::{
    data_structures::{
        geometry::GeometryBuilder,
        material::{Material, MaterialState},
        primitive::Primitive,
        scene_graph::Node,
    },
    gpu::recording::{CommandLog, GpuCommand, RecordingApi},
    logging::{LoggingConfig, init_logging},
    render::{FrameStats, Renderer, RendererConfig, View, primitive::RenderPrimitive},
};

pub const VERTEX_SHADER: &str = "\
attribute vec3 POSITION;
#ifdef HAS_TEXCOORD_0
attribute vec2 TEXCOORD_0;
#endif
#ifdef HAS_NORMAL
attribute vec3 NORMAL;
#endif
uniform mat4 PROJECTION_MATRIX;
uniform mat4 VIEW_MATRIX;
uniform vec3 CAMERA_POSITION;
uniform int EYE_INDEX;
uniform mat4 MODEL_MATRIX;
void main() {}
";

pub const FRAGMENT_SHADER: &str = "\
#ifdef USE_BASE_COLOR
uniform sampler2D baseColor;
#endif
uniform vec4 baseColorFactor;
uniform float TIME;
void main() {}
";

pub fn init_test_logging() {
    init_logging(LoggingConfig {
        is_test: true,
        ..Default::default()
    });
}

pub fn recording_renderer() -> (Renderer, CommandLog) {
    recording_renderer_with(RendererConfig::default())
}

pub fn recording_renderer_with(config: RendererConfig) -> (Renderer, CommandLog) {
    init_test_logging();
    let log = CommandLog::new();
    let api = RecordingApi::with_log(log.clone());
    (Renderer::new(Box::new(api), config), log)
}

/// A material with a `baseColor` sampler slot and a `baseColorFactor` uniform.
pub fn material(name: &str) -> Material {
    let mut material = Material::new(name, VERTEX_SHADER, FRAGMENT_SHADER);
    material.define_sampler("baseColor");
    material.define_uniform("baseColorFactor", &[1.0, 1.0, 1.0, 1.0], 4);
    material
}

pub fn material_with_state(name: &str, configure: impl FnOnce(&mut MaterialState)) -> Material {
    let mut material = material(name);
    configure(&mut material.state);
    material
}

pub fn unit_cube(renderer: &mut Renderer) -> Primitive {
    let mut builder = GeometryBuilder::new();
    builder.push_box(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5));
    builder.finish_primitive(renderer)
}

/// A cube drawn with `material`, attached to a fresh node under `root`.
pub fn add_cube(renderer: &mut Renderer, root: &Node, material: &Material) -> (Node, Rc<RenderPrimitive>) {
    let primitive = unit_cube(renderer);
    let render_primitive = renderer
        .create_render_primitive(&primitive, material)
        .expect("cube primitive should link");
    let node = Node::new();
    node.add_render_primitive(render_primitive.clone());
    root.add_child(&node);
    (node, render_primitive)
}

pub fn mono_view() -> View {
    View::new(
        cgmath::perspective(Deg(60.0), 1.0, 0.1, 100.0),
        Matrix4::identity(),
    )
}

pub fn draw(renderer: &mut Renderer, root: &Node) -> FrameStats {
    renderer.draw_view_array(root, &[mono_view()])
}

/// The commands of the last recorded frame, `BeginFrame` to `EndFrame`.
pub fn last_frame(log: &CommandLog) -> Vec<GpuCommand> {
    let commands = log.snapshot();
    let start = commands
        .iter()
        .rposition(|c| *c == GpuCommand::BeginFrame)
        .expect("no frame recorded");
    commands[start..].to_vec()
}

pub fn capability_calls(commands: &[GpuCommand]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, GpuCommand::SetCapability(..)))
        .count()
}
