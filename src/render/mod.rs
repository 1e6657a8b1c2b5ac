//! The renderer and its per-frame draw loop.
//!
//! [`Renderer`] owns the graphics backend and every cache scoped to it
//! (programs, textures, loader state). Drawables are created through
//! [`Renderer::create_render_primitive`] and registered in a render-order
//! bucket; each frame [`Renderer::draw_view_array`] marks the active subtree of
//! a root node and walks the buckets in order.
//!
//! # Draw loop
//!
//! - buckets are drawn Opaque, Sky, Transparent, Additive
//! - primitives not active this frame, incomplete, or bound to a failed
//!   program are skipped
//! - the program is only rebound when it changes; view uniforms are pushed
//!   with it when there is a single view
//! - material state is diffed against the previously applied state, so only
//!   the capability, blend and depth calls that differ are issued
//! - one draw per active node instance and view
//!

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::bail;
use cgmath::{Matrix4, SquareMatrix};
use futures::{
    FutureExt,
    executor::LocalPool,
    future::LocalBoxFuture,
    task::{LocalSpawnExt, SpawnError},
};

use crate::{
    data_structures::{
        material::{Capability, Material, MaterialState, RenderOrder},
        primitive::{AttributeSemantic, Primitive},
        scene_graph::{HIT_TEST_OFFSET, HitResult, Node},
        texture::{SamplerDesc, Texture, TextureData, TextureKey, TextureSource},
    },
    gpu::{BufferTarget, GraphicsApi, UniformValue, Viewport},
    pipelines::shader::ProgramDefines,
    render::{
        material::{RenderMaterial, RenderSampler, RenderUniform},
        primitive::RenderPrimitive,
    },
    resources::{
        Upload, UploadQueue,
        buffer::{BufferData, RenderBuffer},
        completion::wait_all,
        load_binary,
        program::{Program, ProgramCache},
        texture::RenderTexture,
    },
};

pub mod material;
pub mod primitive;

/// Uniform names the renderer fills in.
pub mod uniforms {
    pub const PROJECTION_MATRIX: &str = "PROJECTION_MATRIX";
    pub const VIEW_MATRIX: &str = "VIEW_MATRIX";
    pub const CAMERA_POSITION: &str = "CAMERA_POSITION";
    pub const EYE_INDEX: &str = "EYE_INDEX";
    pub const MODEL_MATRIX: &str = "MODEL_MATRIX";
}

#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Samplers beyond this many units are left unbound.
    pub max_texture_units: u32,
    /// How far hit points are pulled back toward the ray origin.
    pub hit_test_offset: f32,
    /// Keep primitives sharing a program next to each other in their bucket.
    pub sort_by_program: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_texture_units: 16,
            hit_test_offset: HIT_TEST_OFFSET,
            sort_by_program: true,
        }
    }
}

/// One eye or camera to draw the active set with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct View {
    pub projection_matrix: Matrix4<f32>,
    pub view_matrix: Matrix4<f32>,
    pub viewport: Option<Viewport>,
    pub eye_index: u32,
}

impl View {
    pub fn new(projection_matrix: Matrix4<f32>, view_matrix: Matrix4<f32>) -> Self {
        Self {
            projection_matrix,
            view_matrix,
            viewport: None,
            eye_index: 0,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn with_eye_index(mut self, eye_index: u32) -> Self {
        self.eye_index = eye_index;
        self
    }

    /// World-space camera position, the translation of the inverse view matrix.
    pub fn camera_position(&self) -> [f32; 3] {
        match self.view_matrix.invert() {
            Some(inverse) => [inverse.w.x, inverse.w.y, inverse.w.z],
            None => [0.0; 3],
        }
    }
}

/// Counters for one call to [`Renderer::draw_view_array`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_id: u64,
    pub draw_calls: u32,
    pub program_binds: u32,
    pub material_binds: u32,
    pub skipped_incomplete: u32,
}

static NEXT_ASSET_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque key into a renderer's loader-state side table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AssetId(u64);

impl AssetId {
    pub fn new() -> Self {
        Self(NEXT_ASSET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Renderer {
    api: Box<dyn GraphicsApi>,
    config: RendererConfig,
    frame_id: u64,
    programs: ProgramCache,
    textures: HashMap<TextureKey, Rc<RenderTexture>>,
    streams: Vec<Weak<RenderTexture>>,
    // frame whose active streams have already been advanced
    streams_polled_frame: Option<u64>,
    buckets: Vec<Vec<Weak<RenderPrimitive>>>,
    globals: Vec<RenderUniform>,
    pool: LocalPool,
    uploads: UploadQueue,
    assets: HashMap<AssetId, Box<dyn Any>>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.config)
            .field("frame_id", &self.frame_id)
            .field("programs", &self.programs.len())
            .field("textures", &self.textures.len())
            .field("assets", &self.assets.len())
            .finish()
    }
}

impl Renderer {
    pub fn new(api: Box<dyn GraphicsApi>, config: RendererConfig) -> Self {
        Self {
            api,
            config,
            frame_id: 0,
            programs: ProgramCache::default(),
            textures: HashMap::new(),
            streams: Vec::new(),
            streams_polled_frame: None,
            buckets: vec![Vec::new(); RenderOrder::BUCKETS.len()],
            globals: Vec::new(),
            pool: LocalPool::new(),
            uploads: UploadQueue::default(),
            assets: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Id of the last frame drawn, 0 before the first.
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn api_mut(&mut self) -> &mut dyn GraphicsApi {
        self.api.as_mut()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Runs `future` on the renderer's executor. It makes progress whenever
    /// the renderer is pumped.
    pub fn spawn_local(&self, future: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        self.pool.spawner().spawn_local(future)
    }

    pub fn create_render_buffer(&mut self, target: BufferTarget, data: BufferData) -> Rc<RenderBuffer> {
        let buffer = Rc::new(RenderBuffer::pending(target));
        match data {
            BufferData::Ready(bytes) => buffer.upload(self.api.as_mut(), &bytes),
            BufferData::Pending(bytes) => {
                let destination = Rc::downgrade(&buffer);
                let uploads = self.uploads.clone();
                let task = async move {
                    let result = bytes.await;
                    uploads.borrow_mut().push(Upload::Buffer(destination, result));
                };
                if let Err(e) = self.spawn_local(task.boxed_local()) {
                    log::warn!("could not schedule buffer load: {}", e);
                    buffer.fail();
                }
            }
        }
        buffer
    }

    /// Overwrites part of a buffer. Updates to a buffer that is still loading
    /// are applied once its contents arrive.
    pub fn update_render_buffer(&mut self, buffer: &RenderBuffer, offset: u64, data: &[u8]) {
        buffer.update(self.api.as_mut(), offset, data);
    }

    /// Returns the GPU texture for `texture`, creating it on the first request
    /// for its key.
    pub fn create_render_texture(&mut self, texture: &Texture) -> Rc<RenderTexture> {
        if let Some(existing) = self.textures.get(texture.key()) {
            return existing.clone();
        }
        let key = texture.key().clone();
        let sampler = texture.sampler;

        let render_texture = match texture.acquire_source() {
            Some(TextureSource::Stream(stream)) => {
                let render_texture = Rc::new(RenderTexture::streaming(key.clone(), sampler, stream));
                self.streams.push(Rc::downgrade(&render_texture));
                render_texture
            }
            Some(TextureSource::Data(data)) => {
                let render_texture = Rc::new(RenderTexture::pending(key.clone(), sampler));
                render_texture.upload(self.api.as_mut(), &data);
                render_texture
            }
            Some(TextureSource::Encoded(bytes, format)) => self.load_texture(
                key.clone(),
                sampler,
                async move { TextureData::decode(&bytes, format.as_deref()) }.boxed_local(),
            ),
            Some(TextureSource::Url(url)) => self.load_texture(
                key.clone(),
                sampler,
                async move {
                    let bytes = load_binary(&url).await?;
                    TextureData::decode(&bytes, url.rsplit('.').next())
                }
                .boxed_local(),
            ),
            Some(TextureSource::Pending(bytes)) => self.load_texture(
                key.clone(),
                sampler,
                async move { TextureData::decode(&bytes.await?, None) }.boxed_local(),
            ),
            None => {
                log::warn!("texture `{}` was already consumed by another renderer", key);
                let render_texture = Rc::new(RenderTexture::pending(key.clone(), sampler));
                render_texture.fail();
                render_texture
            }
        };
        self.textures.insert(key, render_texture.clone());
        render_texture
    }

    /// Decodes off the frame path; the pixels are uploaded at the next pump.
    fn load_texture(
        &mut self,
        key: TextureKey,
        sampler: SamplerDesc,
        decoded: LocalBoxFuture<'static, anyhow::Result<TextureData>>,
    ) -> Rc<RenderTexture> {
        let render_texture = Rc::new(RenderTexture::pending(key.clone(), sampler));
        let destination = Rc::downgrade(&render_texture);
        let uploads = self.uploads.clone();
        let task = async move {
            let result = decoded.await;
            uploads.borrow_mut().push(Upload::Texture(destination, result));
        };
        if let Err(e) = self.spawn_local(task.boxed_local()) {
            log::warn!("could not schedule load of texture `{}`: {}", key, e);
            render_texture.fail();
        }
        render_texture
    }

    pub fn get_program(&mut self, material: &Material, defines: &ProgramDefines) -> Rc<Program> {
        self.programs.get_or_create(self.api.as_mut(), material, defines)
    }

    /// Links `primitive` with `material` into a drawable and registers it in
    /// its render-order bucket.
    ///
    /// The result becomes drawable once every buffer and texture it reads is
    /// complete. Fails if the material has no name or the primitive has no
    /// `POSITION` attribute.
    pub fn create_render_primitive(
        &mut self,
        primitive: &Primitive,
        material: &Material,
    ) -> anyhow::Result<Rc<RenderPrimitive>> {
        if material.name().is_empty() {
            bail!("material without a name cannot be compiled");
        }
        if primitive.attribute(AttributeSemantic::Position).is_none() {
            bail!(
                "primitive for material `{}` has no POSITION attribute",
                material.name()
            );
        }

        let defines = material.program_defines(primitive.attribute_mask());
        let program = self.get_program(material, &defines);

        let mut samplers = Vec::with_capacity(material.samplers().len());
        for (unit, sampler) in material.samplers().iter().enumerate() {
            let texture = match &sampler.texture {
                Some(_) if unit as u32 >= self.config.max_texture_units => {
                    log::warn!(
                        "sampler `{}` of material `{}` exceeds {} texture units",
                        sampler.name,
                        material.name(),
                        self.config.max_texture_units
                    );
                    None
                }
                Some(texture) => Some(self.create_render_texture(texture)),
                None => None,
            };
            samplers.push(RenderSampler {
                name: sampler.name.clone(),
                texture,
            });
        }

        let uniforms = material
            .uniforms()
            .iter()
            .filter_map(|u| match UniformValue::from_slice(&u.value) {
                Some(value) => Some(RenderUniform {
                    name: u.name.clone(),
                    value,
                }),
                None => {
                    log::warn!(
                        "uniform `{}` of material `{}` has unsupported length {}",
                        u.name,
                        material.name(),
                        u.length
                    );
                    None
                }
            })
            .collect();

        let render_order = material.render_order.resolve(&material.state);
        let render_material = RenderMaterial::new(
            material.name().to_string(),
            material.state,
            render_order,
            program,
            samplers,
            uniforms,
        );
        let render_primitive = Rc::new(RenderPrimitive::new(primitive, render_material));

        let dependencies = render_primitive.dependencies();
        let completion = render_primitive.completion().clone();
        if dependencies.iter().all(|c| c.is_complete()) {
            completion.resolve();
        } else {
            let name = material.name().to_string();
            let task = async move {
                if wait_all(dependencies).await {
                    completion.resolve();
                } else {
                    log::warn!("a resource of primitive `{}` failed to load", name);
                    completion.fail();
                }
            };
            self.spawn_local(task.boxed_local())?;
        }

        if let Some(bucket) = render_order.bucket() {
            self.insert_into_bucket(bucket, &render_primitive);
        }
        Ok(render_primitive)
    }

    fn insert_into_bucket(&mut self, bucket: usize, render_primitive: &Rc<RenderPrimitive>) {
        let primitives = &mut self.buckets[bucket];
        let weak = Rc::downgrade(render_primitive);
        if self.config.sort_by_program {
            let program = render_primitive.material().program();
            let last_same = primitives.iter().rposition(|p| {
                p.upgrade()
                    .is_some_and(|p| Rc::ptr_eq(p.material().program(), program))
            });
            if let Some(idx) = last_same {
                primitives.insert(idx + 1, weak);
                return;
            }
        }
        primitives.push(weak);
    }

    /// Primitives registered for drawing in `order`, in draw order.
    pub fn bucket(&self, order: RenderOrder) -> Vec<Rc<RenderPrimitive>> {
        order
            .bucket()
            .map(|idx| self.buckets[idx].iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// A uniform pushed to every program it exists in, after the view uniforms.
    pub fn set_uniform(&mut self, name: &str, value: &[f32]) -> bool {
        let Some(value) = UniformValue::from_slice(value) else {
            log::warn!("uniform `{}` cannot hold {} values", name, value.len());
            return false;
        };
        match self.globals.iter_mut().find(|u| u.name == name) {
            Some(uniform) => uniform.value = value,
            None => self.globals.push(RenderUniform {
                name: name.to_string(),
                value,
            }),
        }
        true
    }

    /// Stores loader state that lives exactly as long as this renderer.
    pub fn insert_asset_state<T: Any>(&mut self, id: AssetId, state: T) {
        self.assets.insert(id, Box::new(state));
    }

    pub fn asset_state<T: Any>(&self, id: AssetId) -> Option<&T> {
        self.assets.get(&id)?.downcast_ref()
    }

    pub fn asset_state_mut<T: Any>(&mut self, id: AssetId) -> Option<&mut T> {
        self.assets.get_mut(&id)?.downcast_mut()
    }

    pub fn remove_asset_state(&mut self, id: AssetId) -> bool {
        self.assets.remove(&id).is_some()
    }

    /// Advances pending loads and applies whatever arrived.
    ///
    /// Completions resolved by the uploads are propagated in the same call,
    /// so a primitive whose last buffer arrived is drawable in the next frame.
    pub fn pump(&mut self) {
        self.pool.run_until_stalled();
        self.drain_uploads();
        self.poll_streams();
        self.pool.run_until_stalled();
    }

    fn drain_uploads(&mut self) {
        let uploads = std::mem::take(&mut *self.uploads.borrow_mut());
        for upload in uploads {
            match upload {
                Upload::Buffer(destination, result) => {
                    let Some(buffer) = destination.upgrade() else {
                        log::debug!("buffer was dropped before its contents arrived");
                        continue;
                    };
                    match result {
                        Ok(bytes) => buffer.upload(self.api.as_mut(), &bytes),
                        Err(e) => {
                            log::warn!("buffer failed to load: {:#}", e);
                            buffer.fail();
                        }
                    }
                }
                Upload::Texture(destination, result) => {
                    let Some(texture) = destination.upgrade() else {
                        log::debug!("texture was dropped before its contents arrived");
                        continue;
                    };
                    match result {
                        Ok(data) => texture.upload(self.api.as_mut(), &data),
                        Err(e) => {
                            log::warn!("texture `{}` failed to load: {:#}", texture.key(), e);
                            texture.fail();
                        }
                    }
                }
            }
        }
    }

    /// Streams are polled until their first frame arrives, then once per frame
    /// id while they were bound in that frame, however often the pool is pumped.
    fn poll_streams(&mut self) {
        self.streams.retain(|s| s.strong_count() > 0);
        let advance_active = self.streams_polled_frame != Some(self.frame_id);
        self.streams_polled_frame = Some(self.frame_id);
        let streams: Vec<Rc<RenderTexture>> = self.streams.iter().filter_map(Weak::upgrade).collect();
        for texture in streams {
            if !texture.is_complete() || (advance_active && texture.active_frame() == self.frame_id) {
                texture.poll_stream(self.api.as_mut());
            }
        }
    }

    /// Draws every visible primitive below `root` once per view.
    pub fn draw_view_array(&mut self, root: &Node, views: &[View]) -> FrameStats {
        self.pump();
        self.frame_id += 1;
        let frame_id = self.frame_id;
        let mut stats = FrameStats {
            frame_id,
            ..Default::default()
        };

        root.mark_active(frame_id);

        let api = self.api.as_mut();
        api.begin_frame();
        let single_view = views.len() == 1;
        let mut program: Option<Rc<Program>> = None;
        let mut applied: Option<MaterialState> = None;

        for bucket in self.buckets.iter_mut() {
            bucket.retain(|p| p.strong_count() > 0);
            let primitives: Vec<Rc<RenderPrimitive>> = bucket.iter().filter_map(Weak::upgrade).collect();
            let mut previous: Option<MaterialState> = None;

            for primitive in primitives {
                if primitive.active_frame() != frame_id {
                    continue;
                }
                if !primitive.is_complete() {
                    stats.skipped_incomplete += 1;
                    continue;
                }
                let material = primitive.material();
                let primitive_program = material.program();
                if !primitive_program.is_usable() {
                    continue;
                }
                let instances: Vec<Node> = primitive
                    .instances()
                    .into_iter()
                    .filter(|n| n.active_frame() == frame_id)
                    .collect();
                if instances.is_empty() {
                    continue;
                }
                let (Some(layout), Some(command)) = (primitive.vertex_layout(), primitive.draw_command())
                else {
                    stats.skipped_incomplete += 1;
                    continue;
                };

                if program
                    .as_ref()
                    .is_none_or(|p| !Rc::ptr_eq(p, primitive_program))
                {
                    primitive_program.use_program(api);
                    stats.program_binds += 1;
                    if single_view {
                        bind_view_uniforms(api, primitive_program, &views[0]);
                        bind_global_uniforms(api, primitive_program, &self.globals);
                    }
                    program = Some(primitive_program.clone());
                }

                let state = material.state();
                apply_state(api, previous.unwrap_or_else(|| state.inverse()), state);
                previous = Some(state);
                applied = Some(state);
                material.bind(api, frame_id);
                stats.material_binds += 1;

                api.bind_vertex_layout(&layout);
                for view in views {
                    if let Some(viewport) = view.viewport {
                        api.set_viewport(viewport);
                    }
                    if !single_view {
                        bind_view_uniforms(api, primitive_program, view);
                        bind_global_uniforms(api, primitive_program, &self.globals);
                    }
                    for node in &instances {
                        primitive_program.set_uniform(
                            api,
                            uniforms::MODEL_MATRIX,
                            &UniformValue::mat4(&node.world_matrix()),
                        );
                        api.draw(&command);
                        stats.draw_calls += 1;
                    }
                }
            }
        }

        if let Some(state) = applied {
            restore_masks(api, state);
        }
        api.end_frame();
        log::trace!("frame {}: {:?}", frame_id, stats);
        stats
    }

    /// Hit-tests `root` with the configured offset.
    pub fn hit_test(&self, root: &Node, ray_matrix: &Matrix4<f32>) -> Option<HitResult> {
        root.hit_test_with_offset(ray_matrix, self.config.hit_test_offset)
    }
}

fn bind_view_uniforms(api: &mut dyn GraphicsApi, program: &Program, view: &View) {
    program.set_uniform(
        api,
        uniforms::PROJECTION_MATRIX,
        &UniformValue::mat4(&view.projection_matrix),
    );
    program.set_uniform(api, uniforms::VIEW_MATRIX, &UniformValue::mat4(&view.view_matrix));
    program.set_uniform(
        api,
        uniforms::CAMERA_POSITION,
        &UniformValue::Vec3(view.camera_position()),
    );
    program.set_uniform(api, uniforms::EYE_INDEX, &UniformValue::Int(view.eye_index as i32));
}

fn bind_global_uniforms(api: &mut dyn GraphicsApi, program: &Program, globals: &[RenderUniform]) {
    for uniform in globals {
        program.set_uniform(api, &uniform.name, &uniform.value);
    }
}

/// Issues only the calls needed to go from `previous` to `state`.
fn apply_state(api: &mut dyn GraphicsApi, previous: MaterialState, state: MaterialState) {
    let caps = state.caps_diff(previous);
    if caps != 0 {
        for cap in Capability::ALL {
            if caps & cap.bit() != 0 {
                api.set_capability(cap, state.capability(cap));
            }
        }
    }
    if state.blend_diff(previous) {
        api.set_blend_func(state.blend_func_src(), state.blend_func_dst());
    }
    if state.depth_func_diff(previous) {
        api.set_depth_func(state.depth_func());
    }
}

/// Write masks left disabled by the last material are turned back on.
fn restore_masks(api: &mut dyn GraphicsApi, last: MaterialState) {
    for cap in [Capability::ColorMask, Capability::DepthMask] {
        if !last.capability(cap) {
            api.set_capability(cap, true);
        }
    }
}
