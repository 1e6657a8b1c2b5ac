//! [`GraphicsApi`] on top of wgpu.
//!
//! wgpu has no mutable fixed-function state, so this backend keeps the state
//! the renderer sets (program, capabilities, blend/depth functions, bound
//! textures, uniforms, vertex layout) and snapshots it for every draw. Draws
//! are encoded into a single render pass against the current target when the
//! frame ends. Pipelines are cached per program, material state, vertex layout
//! and topology.
//!
//! Shaders are WGSL. Uniforms live in bind group 0, one `var<uniform>` per
//! binding; textures live in bind group 1, each paired with a `<name>_sampler`.

use std::{collections::HashMap, num::NonZeroU64};

use anyhow::{anyhow, bail};
use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        material::{BlendFactor, Capability, DepthFunc, MaterialState},
        texture::{FilterMode, SamplerDesc, TextureData, WrapMode},
    },
    gpu::{
        BufferHandle, BufferTarget, DrawCommand, GraphicsApi, ProgramHandle, ProgramReflection,
        ProgramSource, TextureHandle, UniformLocation, UniformValue, VertexBufferBinding,
        Viewport,
    },
    pipelines::{
        PipelineDesc, mk_render_pipeline,
        shader::{WgslReflection, WgslUniformType, preprocess, reflect_wgsl},
        state,
    },
};

#[derive(Clone, Debug)]
pub struct WgpuConfig {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub clear_color: wgpu::Color,
}

impl Default for WgpuConfig {
    fn default() -> Self {
        Self {
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            depth_format: Some(Self::DEPTH_FORMAT),
            clear_color: wgpu::Color::BLACK,
        }
    }
}

impl WgpuConfig {
    /// Depth with a stencil aspect so stencil state can be honoured.
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
}

struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct WgpuProgram {
    label: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    reflection: WgslReflection,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_values: HashMap<u32, Vec<u8>>,
    sampler_units: HashMap<String, u32>,
}

#[derive(Clone, Copy)]
enum LocationKind {
    Uniform { binding: u32, ty: WgslUniformType },
    Sampler,
}

#[derive(Clone)]
struct LocationInfo {
    program: ProgramHandle,
    name: String,
    kind: LocationKind,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct BufferLayoutKey {
    stride: u64,
    attributes: Vec<(u32, wgpu::VertexFormat, u64)>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    state: u32,
    buffers: Vec<BufferLayoutKey>,
    topology: wgpu::PrimitiveTopology,
    strip_index_format: Option<wgpu::IndexFormat>,
}

struct RecordedDraw {
    pipeline: PipelineKey,
    program: ProgramHandle,
    uniforms: Vec<(u32, u64, u64)>,
    textures: Vec<(u32, u32, Option<TextureHandle>)>,
    vertex_buffers: Vec<(BufferHandle, u64)>,
    indices: Option<(BufferHandle, wgpu::IndexFormat, u64)>,
    element_count: u32,
    viewport: Option<Viewport>,
}

pub struct WgpuApi {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: WgpuConfig,
    next_handle: u32,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    textures: HashMap<TextureHandle, WgpuTexture>,
    programs: HashMap<ProgramHandle, WgpuProgram>,
    locations: HashMap<UniformLocation, LocationInfo>,
    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,
    fallback_texture: WgpuTexture,
    uniform_alignment: u64,

    current_program: Option<ProgramHandle>,
    state: MaterialState,
    bound_textures: HashMap<u32, TextureHandle>,
    vertex_layout: Vec<VertexBufferBinding>,
    viewport: Option<Viewport>,

    uniform_arena: Vec<u8>,
    draws: Vec<RecordedDraw>,
    target: Option<(wgpu::TextureView, Option<wgpu::TextureView>)>,
}

impl WgpuApi {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, config: WgpuConfig) -> Self {
        let fallback_texture = create_texture(
            &device,
            &queue,
            &TextureData::solid(1, 1, [255, 255, 255, 255]),
            &SamplerDesc::default(),
        );
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        Self {
            device,
            queue,
            config,
            next_handle: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            locations: HashMap::new(),
            pipelines: HashMap::new(),
            fallback_texture,
            uniform_alignment,
            current_program: None,
            state: MaterialState::default(),
            bound_textures: HashMap::new(),
            vertex_layout: Vec::new(),
            viewport: None,
            uniform_arena: Vec::new(),
            draws: Vec::new(),
            target: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn config(&self) -> &WgpuConfig {
        &self.config
    }

    /// Sets the attachments the next frame renders into.
    pub fn set_target(&mut self, color: wgpu::TextureView, depth: Option<wgpu::TextureView>) {
        self.target = Some((color, depth));
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn push_uniform(&mut self, bytes: &[u8]) -> u64 {
        let align = self.uniform_alignment.max(1);
        let offset = (self.uniform_arena.len() as u64).div_ceil(align) * align;
        self.uniform_arena.resize(offset as usize, 0);
        self.uniform_arena.extend_from_slice(bytes);
        offset
    }

    fn vertex_buffer_keys(&self) -> Option<(Vec<BufferLayoutKey>, Vec<(BufferHandle, u64)>)> {
        let mut keys = Vec::with_capacity(self.vertex_layout.len());
        let mut buffers = Vec::with_capacity(self.vertex_layout.len());
        for binding in &self.vertex_layout {
            let base = binding
                .attributes
                .iter()
                .map(|a| a.byte_offset)
                .min()
                .unwrap_or(0) as u64;
            let mut attributes = Vec::with_capacity(binding.attributes.len());
            for attribute in &binding.attributes {
                let Some(format) = state::vertex_format(
                    attribute.component_type,
                    attribute.component_count,
                    attribute.normalized,
                ) else {
                    log::warn!(
                        "no vertex format for {} x {:?} (normalized: {})",
                        attribute.component_count,
                        attribute.component_type,
                        attribute.normalized
                    );
                    return None;
                };
                attributes.push((attribute.location, format, attribute.byte_offset as u64 - base));
            }
            keys.push(BufferLayoutKey {
                stride: binding.stride as u64,
                attributes,
            });
            buffers.push((binding.buffer, base));
        }
        Some((keys, buffers))
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        let Some(program) = self.programs.get(&key.program) else {
            self.pipelines.insert(key.clone(), None);
            return;
        };
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
            .buffers
            .iter()
            .map(|b| {
                b.attributes
                    .iter()
                    .map(|(location, format, offset)| wgpu::VertexAttribute {
                        format: *format,
                        offset: *offset,
                        shader_location: *location,
                    })
                    .collect()
            })
            .collect();
        let layouts: Vec<wgpu::VertexBufferLayout> = key
            .buffers
            .iter()
            .zip(attributes.iter())
            .map(|(b, attributes)| wgpu::VertexBufferLayout {
                array_stride: b.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let material_state = MaterialState::from_bits(key.state);
        let desc = PipelineDesc {
            label: &program.label,
            color_format: self.config.color_format,
            depth_format: self.config.depth_format,
            blend: state::blend_state(&material_state),
            write_mask: state::color_writes(&material_state),
            cull_mode: state::cull_mode(&material_state),
            topology: key.topology,
            strip_index_format: key.strip_index_format,
            depth_stencil: self
                .config
                .depth_format
                .map(|format| state::depth_stencil_state(&material_state, format)),
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = mk_render_pipeline(
            &self.device,
            &program.pipeline_layout,
            &desc,
            &layouts,
            &program.vertex,
            &program.fragment,
        );
        let pipeline = match futures::executor::block_on(self.device.pop_error_scope()) {
            Some(e) => {
                log::error!("pipeline for `{}` is invalid: {}", program.label, e);
                None
            }
            None => {
                log::debug!("created pipeline #{} for `{}`", self.pipelines.len(), program.label);
                Some(pipeline)
            }
        };
        self.pipelines.insert(key.clone(), pipeline);
    }
}

fn address_mode(mode: WrapMode) -> wgpu::AddressMode {
    match mode {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    data: &TextureData,
    sampler: &SamplerDesc,
) -> WgpuTexture {
    let size = wgpu::Extent3d {
        width: data.width.max(1),
        height: data.height.max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: None,
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    write_texture(queue, &texture, data);
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: address_mode(sampler.wrap_s),
        address_mode_v: address_mode(sampler.wrap_t),
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter_mode(sampler.mag_filter),
        min_filter: filter_mode(sampler.min_filter),
        ..Default::default()
    });
    WgpuTexture {
        texture,
        view,
        sampler,
    }
}

fn write_texture(queue: &wgpu::Queue, texture: &wgpu::Texture, data: &TextureData) {
    if data.width == 0 || data.height == 0 {
        return;
    }
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        &data.pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * data.width),
            rows_per_image: Some(data.height),
        },
        wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        },
    );
}

/// Lays a value out the way `ty` expects it in a uniform buffer.
fn uniform_bytes(ty: WgslUniformType, value: &UniformValue) -> Vec<u8> {
    let floats = value.as_floats();
    let mut out = vec![0u8; ty.size() as usize];
    match ty {
        WgslUniformType::I32 => {
            let v = match value {
                UniformValue::Int(v) => *v,
                _ => floats.first().copied().unwrap_or(0.0) as i32,
            };
            out.copy_from_slice(bytemuck::bytes_of(&v));
        }
        WgslUniformType::U32 => {
            let v = match value {
                UniformValue::Int(v) => *v as u32,
                _ => floats.first().copied().unwrap_or(0.0) as u32,
            };
            out.copy_from_slice(bytemuck::bytes_of(&v));
        }
        WgslUniformType::Mat3 => {
            // each column padded to a vec4
            for (col, chunk) in floats.chunks(3).take(3).enumerate() {
                let bytes: &[u8] = bytemuck::cast_slice(chunk);
                out[col * 16..col * 16 + bytes.len()].copy_from_slice(bytes);
            }
        }
        _ => {
            let bytes: &[u8] = bytemuck::cast_slice(&floats);
            let len = bytes.len().min(out.len());
            out[..len].copy_from_slice(&bytes[..len]);
        }
    }
    out
}

impl GraphicsApi for WgpuApi {
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> BufferHandle {
        let usage = match target {
            BufferTarget::Vertex => wgpu::BufferUsages::VERTEX,
            BufferTarget::Index => wgpu::BufferUsages::INDEX,
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: data,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            });
        let handle = BufferHandle(self.next_handle());
        self.buffers.insert(handle, buffer);
        handle
    }

    fn update_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(target) = self.buffers.get(&buffer) else {
            log::warn!("update of unknown buffer {:?}", buffer);
            return;
        };
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            log::error!("buffer update at unaligned offset {}", offset);
            return;
        }
        let mut bytes = data.to_vec();
        let padded = (bytes.len() as u64).div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT;
        bytes.resize(padded as usize, 0);
        self.queue.write_buffer(target, offset, &bytes);
    }

    fn create_texture(&mut self, data: &TextureData, sampler: &SamplerDesc) -> TextureHandle {
        let texture = create_texture(&self.device, &self.queue, data, sampler);
        let handle = TextureHandle(self.next_handle());
        self.textures.insert(handle, texture);
        handle
    }

    fn update_texture(&mut self, texture: TextureHandle, data: &TextureData) {
        let Some(existing) = self.textures.get_mut(&texture) else {
            log::warn!("update of unknown texture {:?}", texture);
            return;
        };
        let size = existing.texture.size();
        if size.width == data.width && size.height == data.height {
            write_texture(&self.queue, &existing.texture, data);
        } else {
            let sampler = existing.sampler.clone();
            let mut replacement = create_texture(&self.device, &self.queue, data, &SamplerDesc::default());
            replacement.sampler = sampler;
            *existing = replacement;
        }
    }

    fn create_program(
        &mut self,
        source: ProgramSource<'_>,
    ) -> anyhow::Result<(ProgramHandle, ProgramReflection)> {
        let vertex_source = preprocess(source.vertex, source.defines)?;
        let fragment_source = preprocess(source.fragment, source.defines)?;
        let reflection = reflect_wgsl(&vertex_source, &fragment_source)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source.label),
                source: wgpu::ShaderSource::Wgsl(vertex_source.into()),
            });
        let fragment = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source.label),
                source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
            });
        if let Some(e) = futures::executor::block_on(self.device.pop_error_scope()) {
            bail!("`{}` failed to compile: {}", source.label, e);
        }

        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let uniform_entries: Vec<wgpu::BindGroupLayoutEntry> = reflection
            .uniforms
            .values()
            .map(|u| wgpu::BindGroupLayoutEntry {
                binding: u.binding,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let texture_entries: Vec<wgpu::BindGroupLayoutEntry> = reflection
            .textures
            .values()
            .flat_map(|t| {
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: t.binding,
                        visibility,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: t.sampler_binding,
                        visibility,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();
        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &uniform_entries,
                label: Some("uniform_bind_group_layout"),
            });
        let texture_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &texture_entries,
                label: Some("texture_bind_group_layout"),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(source.label),
                bind_group_layouts: &[&uniform_layout, &texture_layout],
                push_constant_ranges: &[],
            });

        let handle = ProgramHandle(self.next_handle());
        let mut program_reflection = ProgramReflection {
            attributes: reflection.attributes.clone(),
            uniforms: HashMap::new(),
        };
        let mut next_location = self.locations.len() as u32;
        for (name, uniform) in &reflection.uniforms {
            next_location += 1;
            let location = UniformLocation(next_location);
            self.locations.insert(
                location,
                LocationInfo {
                    program: handle,
                    name: name.clone(),
                    kind: LocationKind::Uniform {
                        binding: uniform.binding,
                        ty: uniform.ty,
                    },
                },
            );
            program_reflection.uniforms.insert(name.clone(), location);
        }
        for name in reflection.textures.keys() {
            next_location += 1;
            let location = UniformLocation(next_location);
            self.locations.insert(
                location,
                LocationInfo {
                    program: handle,
                    name: name.clone(),
                    kind: LocationKind::Sampler,
                },
            );
            program_reflection.uniforms.insert(name.clone(), location);
        }

        self.programs.insert(
            handle,
            WgpuProgram {
                label: source.label.to_string(),
                vertex,
                fragment,
                reflection,
                uniform_layout,
                texture_layout,
                pipeline_layout,
                uniform_values: HashMap::new(),
                sampler_units: HashMap::new(),
            },
        );
        Ok((handle, program_reflection))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.state.set_capability(capability, enabled);
    }

    fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.state.set_blend_func_src(src);
        self.state.set_blend_func_dst(dst);
    }

    fn set_depth_func(&mut self, func: DepthFunc) {
        self.state.set_depth_func(func);
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.bound_textures.insert(unit, texture);
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let Some(info) = self.locations.get(&location).cloned() else {
            log::warn!("unknown uniform location {:?}", location);
            return;
        };
        let Some(program) = self.programs.get_mut(&info.program) else {
            return;
        };
        match info.kind {
            LocationKind::Uniform { binding, ty } => {
                program
                    .uniform_values
                    .insert(binding, uniform_bytes(ty, value));
            }
            LocationKind::Sampler => {
                let unit = match value {
                    UniformValue::Int(unit) => *unit as u32,
                    other => other.as_floats().first().copied().unwrap_or(0.0) as u32,
                };
                program.sampler_units.insert(info.name, unit);
            }
        }
    }

    fn bind_vertex_layout(&mut self, layout: &[VertexBufferBinding]) {
        self.vertex_layout = layout.to_vec();
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    fn draw(&mut self, command: &DrawCommand) {
        let Some(program_handle) = self.current_program else {
            log::warn!("draw without a program");
            return;
        };
        let Some((buffers, vertex_buffers)) = self.vertex_buffer_keys() else {
            return;
        };
        let Some(program) = self.programs.get(&program_handle) else {
            return;
        };

        let uniform_values: Vec<(u32, Vec<u8>)> = program
            .reflection
            .uniforms
            .values()
            .map(|u| {
                let bytes = program
                    .uniform_values
                    .get(&u.binding)
                    .cloned()
                    .unwrap_or_else(|| vec![0; u.ty.size() as usize]);
                (u.binding, bytes)
            })
            .collect();
        let textures: Vec<(u32, u32, Option<TextureHandle>)> = program
            .reflection
            .textures
            .iter()
            .map(|(name, t)| {
                let unit = program.sampler_units.get(name).copied().unwrap_or(0);
                (t.binding, t.sampler_binding, self.bound_textures.get(&unit).copied())
            })
            .collect();

        let mut uniforms = Vec::with_capacity(uniform_values.len());
        for (binding, bytes) in uniform_values {
            let offset = self.push_uniform(&bytes);
            uniforms.push((binding, offset, bytes.len() as u64));
        }

        let index_type = command.indices.map(|i| i.index_type);
        let pipeline = PipelineKey {
            program: program_handle,
            state: self.state.bits(),
            buffers,
            topology: state::primitive_topology(command.topology),
            strip_index_format: state::strip_index_format(command.topology, index_type),
        };
        self.ensure_pipeline(&pipeline);

        self.draws.push(RecordedDraw {
            pipeline,
            program: program_handle,
            uniforms,
            textures,
            vertex_buffers,
            indices: command
                .indices
                .map(|i| (i.buffer, state::index_format(i.index_type), i.byte_offset as u64)),
            element_count: command.element_count,
            viewport: self.viewport,
        });
    }

    fn begin_frame(&mut self) {
        self.draws.clear();
        self.uniform_arena.clear();
        self.viewport = None;
    }

    fn end_frame(&mut self) {
        let draws = std::mem::take(&mut self.draws);
        let Some((color_view, depth_view)) = self.target.clone() else {
            if !draws.is_empty() {
                log::warn!("{} draws dropped: no render target set", draws.len());
            }
            return;
        };
        if let Err(e) = self.encode(&draws, &color_view, depth_view.as_ref()) {
            log::error!("frame could not be encoded: {:#}", e);
        }
        self.uniform_arena.clear();
    }
}

impl WgpuApi {
    fn encode(
        &self,
        draws: &[RecordedDraw],
        color_view: &wgpu::TextureView,
        depth_view: Option<&wgpu::TextureView>,
    ) -> anyhow::Result<()> {
        let mut arena = self.uniform_arena.clone();
        if arena.is_empty() {
            arena.resize(16, 0);
        }
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Uniform Arena"),
                contents: &arena,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut bind_groups = Vec::with_capacity(draws.len());
        for draw in draws {
            let program = self
                .programs
                .get(&draw.program)
                .ok_or_else(|| anyhow!("draw references unknown program {:?}", draw.program))?;
            let uniform_entries: Vec<wgpu::BindGroupEntry> = draw
                .uniforms
                .iter()
                .map(|(binding, offset, size)| wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &uniform_buffer,
                        offset: *offset,
                        size: NonZeroU64::new(*size),
                    }),
                })
                .collect();
            let mut texture_entries = Vec::with_capacity(draw.textures.len() * 2);
            for (binding, sampler_binding, texture) in &draw.textures {
                let texture = texture
                    .and_then(|t| self.textures.get(&t))
                    .unwrap_or(&self.fallback_texture);
                texture_entries.push(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
                texture_entries.push(wgpu::BindGroupEntry {
                    binding: *sampler_binding,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                });
            }
            let uniform_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &program.uniform_layout,
                entries: &uniform_entries,
                label: Some("uniform_bind_group"),
            });
            let texture_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &program.texture_layout,
                entries: &texture_entries,
                label: Some("texture_bind_group"),
            });
            bind_groups.push((uniform_group, texture_group));
        }

        let has_stencil = self
            .config
            .depth_format
            .is_some_and(|format| format.has_stencil_aspect());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.config.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: depth_view.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: has_stencil.then_some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(0),
                            store: wgpu::StoreOp::Store,
                        }),
                    }
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            for (draw, (uniform_group, texture_group)) in draws.iter().zip(bind_groups.iter()) {
                let Some(Some(pipeline)) = self.pipelines.get(&draw.pipeline) else {
                    continue;
                };
                render_pass.set_pipeline(pipeline);
                if let Some(viewport) = draw.viewport {
                    render_pass.set_viewport(
                        viewport.x,
                        viewport.y,
                        viewport.width,
                        viewport.height,
                        0.0,
                        1.0,
                    );
                }
                render_pass.set_bind_group(0, uniform_group, &[]);
                render_pass.set_bind_group(1, texture_group, &[]);
                let mut missing_buffer = false;
                for (slot, (buffer, offset)) in draw.vertex_buffers.iter().enumerate() {
                    match self.buffers.get(buffer) {
                        Some(buffer) => render_pass.set_vertex_buffer(slot as u32, buffer.slice(*offset..)),
                        None => missing_buffer = true,
                    }
                }
                if missing_buffer {
                    log::warn!("skipping draw with an unknown vertex buffer");
                    continue;
                }
                match draw.indices {
                    Some((buffer, format, offset)) => {
                        let Some(buffer) = self.buffers.get(&buffer) else {
                            continue;
                        };
                        render_pass.set_index_buffer(buffer.slice(offset..), format);
                        render_pass.draw_indexed(0..draw.element_count, 0, 0..1);
                    }
                    None => render_pass.draw(0..draw.element_count, 0..1),
                }
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
