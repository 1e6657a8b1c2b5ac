//! The compiled form of a [`Material`](crate::data_structures::material::Material).

use std::{cell::RefCell, rc::Rc};

use crate::{
    data_structures::material::{MaterialState, RenderOrder},
    gpu::{GraphicsApi, UniformValue},
    resources::{completion::Completion, program::Program, texture::RenderTexture},
};

/// A sampler slot resolved to a GPU texture. The slot index is its texture unit.
#[derive(Debug)]
pub struct RenderSampler {
    pub name: String,
    pub texture: Option<Rc<RenderTexture>>,
}

#[derive(Debug)]
pub struct RenderUniform {
    pub name: String,
    pub value: UniformValue,
}

/// Material state, textures and uniform values bound to one compiled program.
#[derive(Debug)]
pub struct RenderMaterial {
    name: String,
    state: MaterialState,
    render_order: RenderOrder,
    program: Rc<Program>,
    samplers: Vec<RenderSampler>,
    uniforms: RefCell<Vec<RenderUniform>>,
}

impl RenderMaterial {
    pub(crate) fn new(
        name: String,
        state: MaterialState,
        render_order: RenderOrder,
        program: Rc<Program>,
        samplers: Vec<RenderSampler>,
        uniforms: Vec<RenderUniform>,
    ) -> Self {
        Self {
            name,
            state,
            render_order,
            program,
            samplers,
            uniforms: RefCell::new(uniforms),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> MaterialState {
        self.state
    }

    pub fn render_order(&self) -> RenderOrder {
        self.render_order
    }

    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    pub fn samplers(&self) -> &[RenderSampler] {
        &self.samplers
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms
            .borrow()
            .iter()
            .find(|u| u.name == name)
            .map(|u| u.value.clone())
    }

    /// Returns `false` if the material has no uniform called `name` or the
    /// value has an unsupported length.
    pub fn set_uniform(&self, name: &str, value: &[f32]) -> bool {
        let Some(value) = UniformValue::from_slice(value) else {
            log::warn!("uniform `{}` cannot hold {} values", name, value.len());
            return false;
        };
        match self.uniforms.borrow_mut().iter_mut().find(|u| u.name == name) {
            Some(uniform) => {
                uniform.value = value;
                true
            }
            None => false,
        }
    }

    /// Completions of every bound texture.
    pub(crate) fn texture_completions(&self) -> Vec<Completion> {
        self.samplers
            .iter()
            .filter_map(|s| s.texture.as_ref())
            .map(|t| t.completion().clone())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.samplers
            .iter()
            .filter_map(|s| s.texture.as_ref())
            .all(|t| t.is_complete())
    }

    /// Binds textures to their units and pushes uniform values. Textures bound
    /// here are stamped active for `frame_id`.
    pub(crate) fn bind(&self, api: &mut dyn GraphicsApi, frame_id: u64) {
        for (unit, sampler) in self.samplers.iter().enumerate() {
            let Some(texture) = &sampler.texture else { continue };
            if let Some(handle) = texture.handle() {
                api.bind_texture(unit as u32, handle);
                texture.mark_active(frame_id);
            }
        }
        for uniform in self.uniforms.borrow().iter() {
            self.program.set_uniform(api, &uniform.name, &uniform.value);
        }
    }
}
