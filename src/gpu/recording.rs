//! A headless [`GraphicsApi`] that records every call.
//!
//! Shaders are written in a GLSL-like dialect: after preprocessing, every
//! `attribute`/`in` declaration of the vertex stage becomes an attribute and
//! every `uniform` declaration of either stage becomes a uniform. The last
//! token of a declaration is its name. An active `#error` fails compilation;
//! a stage without `main` fails linking.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use anyhow::bail;

use crate::{
    data_structures::{
        material::{BlendFactor, Capability, DepthFunc},
        texture::{SamplerDesc, TextureData},
    },
    gpu::{
        BufferHandle, BufferTarget, DrawCommand, GraphicsApi, ProgramHandle, ProgramReflection,
        ProgramSource, TextureHandle, UniformLocation, UniformValue, VertexBufferBinding,
        Viewport,
    },
    pipelines::shader::preprocess,
};

#[derive(Clone, Debug, PartialEq)]
pub enum GpuCommand {
    CreateBuffer {
        buffer: BufferHandle,
        target: BufferTarget,
        len: usize,
    },
    UpdateBuffer {
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    },
    CreateTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
    },
    UpdateTexture {
        texture: TextureHandle,
    },
    CreateProgram {
        program: ProgramHandle,
        label: String,
    },
    UseProgram(ProgramHandle),
    SetCapability(Capability, bool),
    SetBlendFunc(BlendFactor, BlendFactor),
    SetDepthFunc(DepthFunc),
    BindTexture {
        unit: u32,
        texture: TextureHandle,
    },
    SetUniform {
        name: String,
        value: UniformValue,
    },
    BindVertexLayout(Vec<VertexBufferBinding>),
    SetViewport(Viewport),
    Draw(DrawCommand),
    BeginFrame,
    EndFrame,
}

/// Shared view of the commands a [`RecordingApi`] issued.
///
/// Cloning shares the underlying log, so a test can keep one end while the
/// renderer owns the api.
#[derive(Clone, Debug, Default)]
pub struct CommandLog(Rc<RefCell<Vec<GpuCommand>>>);

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, command: GpuCommand) {
        log::trace!("{:?}", command);
        self.0.borrow_mut().push(command);
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn snapshot(&self) -> Vec<GpuCommand> {
        self.0.borrow().clone()
    }

    /// Returns and clears everything recorded so far.
    pub fn take(&self) -> Vec<GpuCommand> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn count(&self, predicate: impl Fn(&GpuCommand) -> bool) -> usize {
        self.0.borrow().iter().filter(|c| predicate(c)).count()
    }

    pub fn draw_count(&self) -> usize {
        self.count(|c| matches!(c, GpuCommand::Draw(_)))
    }
}

#[derive(Debug, Default)]
pub struct RecordingApi {
    log: CommandLog,
    next_handle: u32,
    next_location: u32,
    uniform_names: HashMap<UniformLocation, String>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// An api writing into an existing log.
    pub fn with_log(log: CommandLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }
}

fn declared_name(line: &str) -> Option<String> {
    let declaration = line.trim().trim_end_matches(';');
    let name = declaration.split_whitespace().last()?;
    let name = name.split('[').next().unwrap_or(name);
    (!name.is_empty()).then(|| name.to_string())
}

fn has_main(source: &str) -> bool {
    source.lines().any(|line| line.trim_start().starts_with("void main"))
}

impl GraphicsApi for RecordingApi {
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> BufferHandle {
        let buffer = BufferHandle(self.next_handle());
        self.log.push(GpuCommand::CreateBuffer {
            buffer,
            target,
            len: data.len(),
        });
        buffer
    }

    fn update_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        self.log.push(GpuCommand::UpdateBuffer {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn create_texture(&mut self, data: &TextureData, _sampler: &SamplerDesc) -> TextureHandle {
        let texture = TextureHandle(self.next_handle());
        self.log.push(GpuCommand::CreateTexture {
            texture,
            width: data.width,
            height: data.height,
        });
        texture
    }

    fn update_texture(&mut self, texture: TextureHandle, _data: &TextureData) {
        self.log.push(GpuCommand::UpdateTexture { texture });
    }

    fn create_program(
        &mut self,
        source: ProgramSource<'_>,
    ) -> anyhow::Result<(ProgramHandle, ProgramReflection)> {
        let vertex = preprocess(source.vertex, source.defines)?;
        let fragment = preprocess(source.fragment, source.defines)?;
        if !has_main(&vertex) {
            bail!("link error in `{}`: vertex stage has no main", source.label);
        }
        if !has_main(&fragment) {
            bail!("link error in `{}`: fragment stage has no main", source.label);
        }

        let mut reflection = ProgramReflection::default();
        for line in vertex.lines() {
            let first = line.split_whitespace().next();
            if matches!(first, Some("attribute") | Some("in")) {
                if let Some(name) = declared_name(line) {
                    let location = reflection.attributes.len() as u32;
                    reflection.attributes.entry(name).or_insert(location);
                }
            }
        }
        for line in vertex.lines().chain(fragment.lines()) {
            if line.split_whitespace().next() == Some("uniform") {
                if let Some(name) = declared_name(line) {
                    if reflection.uniforms.contains_key(&name) {
                        continue;
                    }
                    self.next_location += 1;
                    let location = UniformLocation(self.next_location);
                    self.uniform_names.insert(location, name.clone());
                    reflection.uniforms.insert(name, location);
                }
            }
        }

        let program = ProgramHandle(self.next_handle());
        self.log.push(GpuCommand::CreateProgram {
            program,
            label: source.label.to_string(),
        });
        Ok((program, reflection))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.log.push(GpuCommand::UseProgram(program));
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.log.push(GpuCommand::SetCapability(capability, enabled));
    }

    fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.log.push(GpuCommand::SetBlendFunc(src, dst));
    }

    fn set_depth_func(&mut self, func: DepthFunc) {
        self.log.push(GpuCommand::SetDepthFunc(func));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.log.push(GpuCommand::BindTexture { unit, texture });
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let name = self
            .uniform_names
            .get(&location)
            .cloned()
            .unwrap_or_else(|| format!("#{}", location.0));
        self.log.push(GpuCommand::SetUniform {
            name,
            value: value.clone(),
        });
    }

    fn bind_vertex_layout(&mut self, layout: &[VertexBufferBinding]) {
        self.log.push(GpuCommand::BindVertexLayout(layout.to_vec()));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.log.push(GpuCommand::SetViewport(viewport));
    }

    fn draw(&mut self, command: &DrawCommand) {
        self.log.push(GpuCommand::Draw(*command));
    }

    fn begin_frame(&mut self) {
        self.log.push(GpuCommand::BeginFrame);
    }

    fn end_frame(&mut self) {
        self.log.push(GpuCommand::EndFrame);
    }
}
