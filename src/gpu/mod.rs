//! The graphics API seam.
//!
//! The renderer talks to the GPU exclusively through [`GraphicsApi`], a small
//! fixed vocabulary of buffer, texture, program, state and draw calls. Two
//! implementations ship with the crate:
//!
//! - [`recording::RecordingApi`] records every call; used headless and in tests
//! - [`wgpu_api::WgpuApi`] maps the vocabulary onto cached wgpu pipelines

use std::collections::HashMap;

use crate::{
    data_structures::{
        material::{BlendFactor, Capability, DepthFunc},
        primitive::{ComponentType, IndexType, Topology},
        texture::{SamplerDesc, TextureData},
    },
    pipelines::shader::ProgramDefines,
};

pub mod recording;
pub mod wgpu_api;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
}

impl UniformValue {
    /// Picks the variant matching `values.len()`.
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        Some(match values.len() {
            1 => Self::Float(values[0]),
            2 => Self::Vec2(values.try_into().ok()?),
            3 => Self::Vec3(values.try_into().ok()?),
            4 => Self::Vec4(values.try_into().ok()?),
            9 => Self::Mat3(values.try_into().ok()?),
            16 => Self::Mat4(values.try_into().ok()?),
            _ => return None,
        })
    }

    pub fn mat4(matrix: &cgmath::Matrix4<f32>) -> Self {
        let cols: [[f32; 4]; 4] = (*matrix).into();
        let mut flat = [0.0; 16];
        for (i, col) in cols.iter().enumerate() {
            flat[i * 4..i * 4 + 4].copy_from_slice(col);
        }
        Self::Mat4(flat)
    }

    pub fn as_floats(&self) -> Vec<f32> {
        match self {
            Self::Int(v) => vec![*v as f32],
            Self::Float(v) => vec![*v],
            Self::Vec2(v) => v.to_vec(),
            Self::Vec3(v) => v.to_vec(),
            Self::Vec4(v) => v.to_vec(),
            Self::Mat3(v) => v.to_vec(),
            Self::Mat4(v) => v.to_vec(),
        }
    }
}

/// Shader sources plus the defines they are compiled with.
#[derive(Clone, Copy, Debug)]
pub struct ProgramSource<'a> {
    pub label: &'a str,
    pub vertex: &'a str,
    pub fragment: &'a str,
    pub defines: &'a ProgramDefines,
}

/// Attribute and uniform locations of a linked program.
#[derive(Clone, Debug, Default)]
pub struct ProgramReflection {
    pub attributes: HashMap<String, u32>,
    pub uniforms: HashMap<String, UniformLocation>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VertexAttributeBinding {
    pub location: u32,
    pub component_count: u32,
    pub component_type: ComponentType,
    pub normalized: bool,
    pub byte_offset: u32,
}

/// One vertex buffer and the attributes sourced from it.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexBufferBinding {
    pub buffer: BufferHandle,
    pub stride: u32,
    pub attributes: Vec<VertexAttributeBinding>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexBinding {
    pub buffer: BufferHandle,
    pub index_type: IndexType,
    pub byte_offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCommand {
    pub topology: Topology,
    pub element_count: u32,
    pub indices: Option<IndexBinding>,
}

/// The graphics calls the renderer issues.
///
/// Implementations keep whatever bound state the calls imply (current program,
/// capabilities, bound textures, vertex layout) until it is changed again.
pub trait GraphicsApi {
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> BufferHandle;

    fn update_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    fn create_texture(&mut self, data: &TextureData, sampler: &SamplerDesc) -> TextureHandle;

    fn update_texture(&mut self, texture: TextureHandle, data: &TextureData);

    /// Compiles and links a program and reflects its attribute/uniform locations.
    fn create_program(
        &mut self,
        source: ProgramSource<'_>,
    ) -> anyhow::Result<(ProgramHandle, ProgramReflection)>;

    fn use_program(&mut self, program: ProgramHandle);

    fn set_capability(&mut self, capability: Capability, enabled: bool);

    fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor);

    fn set_depth_func(&mut self, func: DepthFunc);

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);

    fn bind_vertex_layout(&mut self, layout: &[VertexBufferBinding]);

    fn set_viewport(&mut self, viewport: Viewport);

    fn draw(&mut self, command: &DrawCommand);

    fn begin_frame(&mut self) {}

    fn end_frame(&mut self) {}
}
