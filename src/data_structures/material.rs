//! Declarative materials and their packed render state.
//!
//! A [`Material`] names a shader pair, a [`MaterialState`], a render-order
//! bucket and the sampler/uniform slots the shaders expect. The renderer
//! compiles it into a [`RenderMaterial`](crate::render::material::RenderMaterial)
//! once per primitive it decorates.
//!
//! [`MaterialState`] keeps every fixed-function toggle in one `u32` so two
//! states can be compared with a single integer compare and XOR-ed to learn
//! which groups (caps, blend function, depth function) differ.

use std::{collections::BTreeMap, rc::Rc};

use crate::{
    data_structures::{primitive::AttributeSemantic, texture::Texture},
    pipelines::shader::ProgramDefines,
};

/// Boolean capability bits, in bit order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    CullFace,
    Blend,
    DepthTest,
    StencilTest,
    ColorMask,
    DepthMask,
    StencilMask,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::CullFace,
        Capability::Blend,
        Capability::DepthTest,
        Capability::StencilTest,
        Capability::ColorMask,
        Capability::DepthMask,
        Capability::StencilMask,
    ];

    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero = 0,
    One = 1,
    SrcColor = 2,
    OneMinusSrcColor = 3,
    DstColor = 4,
    OneMinusDstColor = 5,
    SrcAlpha = 6,
    OneMinusSrcAlpha = 7,
    DstAlpha = 8,
    OneMinusDstAlpha = 9,
    SrcAlphaSaturate = 10,
}

impl BlendFactor {
    pub const ALL: [BlendFactor; 11] = [
        BlendFactor::Zero,
        BlendFactor::One,
        BlendFactor::SrcColor,
        BlendFactor::OneMinusSrcColor,
        BlendFactor::DstColor,
        BlendFactor::OneMinusDstColor,
        BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha,
        BlendFactor::SrcAlphaSaturate,
    ];

    fn from_code(code: u32) -> Self {
        Self::ALL
            .get(code as usize)
            .copied()
            .unwrap_or(BlendFactor::One)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Never = 0,
    Less = 1,
    Equal = 2,
    LessEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterEqual = 6,
    Always = 7,
}

impl DepthFunc {
    pub const ALL: [DepthFunc; 8] = [
        DepthFunc::Never,
        DepthFunc::Less,
        DepthFunc::Equal,
        DepthFunc::LessEqual,
        DepthFunc::Greater,
        DepthFunc::NotEqual,
        DepthFunc::GreaterEqual,
        DepthFunc::Always,
    ];

    fn from_code(code: u32) -> Self {
        Self::ALL
            .get(code as usize)
            .copied()
            .unwrap_or(DepthFunc::Less)
    }
}

const CAPS_MASK: u32 = 0x7f;
const BLEND_SRC_SHIFT: u32 = 7;
const BLEND_DST_SHIFT: u32 = 11;
const DEPTH_FUNC_SHIFT: u32 = 15;
const FIELD_MASK: u32 = 0xf;
const BLEND_SRC_MASK: u32 = FIELD_MASK << BLEND_SRC_SHIFT;
const BLEND_DST_MASK: u32 = FIELD_MASK << BLEND_DST_SHIFT;
const BLEND_FUNC_MASK: u32 = BLEND_SRC_MASK | BLEND_DST_MASK;
const DEPTH_FUNC_MASK: u32 = FIELD_MASK << DEPTH_FUNC_SHIFT;

/// Render state packed into a single integer.
///
/// Layout (LSB first): 7 capability bits, 4 bits blend source factor,
/// 4 bits blend destination factor, 4 bits depth comparison function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialState(u32);

impl Default for MaterialState {
    /// Back-face culling, depth test and writes, colour writes, straight alpha
    /// blend function (blending itself disabled) and `Less` depth comparison.
    fn default() -> Self {
        let mut state = Self(0);
        state.set_capability(Capability::CullFace, true);
        state.set_capability(Capability::DepthTest, true);
        state.set_capability(Capability::ColorMask, true);
        state.set_capability(Capability::DepthMask, true);
        state.set_blend_func_src(BlendFactor::SrcAlpha);
        state.set_blend_func_dst(BlendFactor::OneMinusSrcAlpha);
        state.set_depth_func(DepthFunc::Less);
        state
    }
}

impl MaterialState {
    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn capability(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn set_capability(&mut self, cap: Capability, enabled: bool) {
        if enabled {
            self.0 |= cap.bit();
        } else {
            self.0 &= !cap.bit();
        }
    }

    pub fn cull_face(&self) -> bool {
        self.capability(Capability::CullFace)
    }

    pub fn set_cull_face(&mut self, enabled: bool) {
        self.set_capability(Capability::CullFace, enabled);
    }

    pub fn blend(&self) -> bool {
        self.capability(Capability::Blend)
    }

    pub fn set_blend(&mut self, enabled: bool) {
        self.set_capability(Capability::Blend, enabled);
    }

    pub fn depth_test(&self) -> bool {
        self.capability(Capability::DepthTest)
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        self.set_capability(Capability::DepthTest, enabled);
    }

    pub fn stencil_test(&self) -> bool {
        self.capability(Capability::StencilTest)
    }

    pub fn set_stencil_test(&mut self, enabled: bool) {
        self.set_capability(Capability::StencilTest, enabled);
    }

    pub fn color_mask(&self) -> bool {
        self.capability(Capability::ColorMask)
    }

    pub fn set_color_mask(&mut self, enabled: bool) {
        self.set_capability(Capability::ColorMask, enabled);
    }

    pub fn depth_mask(&self) -> bool {
        self.capability(Capability::DepthMask)
    }

    pub fn set_depth_mask(&mut self, enabled: bool) {
        self.set_capability(Capability::DepthMask, enabled);
    }

    pub fn stencil_mask(&self) -> bool {
        self.capability(Capability::StencilMask)
    }

    pub fn set_stencil_mask(&mut self, enabled: bool) {
        self.set_capability(Capability::StencilMask, enabled);
    }

    pub fn blend_func_src(&self) -> BlendFactor {
        BlendFactor::from_code((self.0 & BLEND_SRC_MASK) >> BLEND_SRC_SHIFT)
    }

    pub fn set_blend_func_src(&mut self, factor: BlendFactor) {
        self.0 = (self.0 & !BLEND_SRC_MASK) | ((factor as u32) << BLEND_SRC_SHIFT);
    }

    pub fn blend_func_dst(&self) -> BlendFactor {
        BlendFactor::from_code((self.0 & BLEND_DST_MASK) >> BLEND_DST_SHIFT)
    }

    pub fn set_blend_func_dst(&mut self, factor: BlendFactor) {
        self.0 = (self.0 & !BLEND_DST_MASK) | ((factor as u32) << BLEND_DST_SHIFT);
    }

    pub fn depth_func(&self) -> DepthFunc {
        DepthFunc::from_code((self.0 & DEPTH_FUNC_MASK) >> DEPTH_FUNC_SHIFT)
    }

    pub fn set_depth_func(&mut self, func: DepthFunc) {
        self.0 = (self.0 & !DEPTH_FUNC_MASK) | ((func as u32) << DEPTH_FUNC_SHIFT);
    }

    /// Capability bits that differ from `other`.
    pub fn caps_diff(&self, other: MaterialState) -> u32 {
        (self.0 ^ other.0) & CAPS_MASK
    }

    pub fn blend_diff(&self, other: MaterialState) -> bool {
        (self.0 ^ other.0) & BLEND_FUNC_MASK != 0
    }

    pub fn depth_func_diff(&self, other: MaterialState) -> bool {
        (self.0 ^ other.0) & DEPTH_FUNC_MASK != 0
    }

    /// A state differing from `self` in every bit, used as "nothing applied yet".
    pub fn inverse(&self) -> MaterialState {
        MaterialState(!self.0)
    }
}

/// Coarse draw ordering. Buckets are drawn in declaration order; `Default`
/// is resolved to `Opaque` or `Transparent` when a render primitive is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RenderOrder {
    Opaque,
    Sky,
    Transparent,
    Additive,
    #[default]
    Default,
    /// Never drawn.
    Ignore,
}

impl RenderOrder {
    pub const BUCKETS: [RenderOrder; 4] = [
        RenderOrder::Opaque,
        RenderOrder::Sky,
        RenderOrder::Transparent,
        RenderOrder::Additive,
    ];

    pub fn resolve(self, state: &MaterialState) -> RenderOrder {
        match self {
            RenderOrder::Default if state.blend() => RenderOrder::Transparent,
            RenderOrder::Default => RenderOrder::Opaque,
            other => other,
        }
    }

    pub(crate) fn bucket(self) -> Option<usize> {
        Self::BUCKETS.iter().position(|order| *order == self)
    }
}

#[derive(Clone, Debug)]
pub struct MaterialSampler {
    pub name: String,
    pub texture: Option<Rc<Texture>>,
}

#[derive(Clone, Debug)]
pub struct MaterialUniform {
    pub name: String,
    pub value: Vec<f32>,
    pub length: usize,
}

/// CPU-side shader and state description.
///
/// The `name` is part of the program cache key: two materials sharing a name
/// must share shader sources.
#[derive(Clone, Debug)]
pub struct Material {
    name: String,
    vertex_source: String,
    fragment_source: String,
    pub state: MaterialState,
    pub render_order: RenderOrder,
    samplers: Vec<MaterialSampler>,
    uniforms: Vec<MaterialUniform>,
    defines: BTreeMap<String, String>,
}

impl Material {
    pub fn new(
        name: impl Into<String>,
        vertex_source: impl Into<String>,
        fragment_source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
            state: MaterialState::default(),
            render_order: RenderOrder::Default,
            samplers: Vec::new(),
            uniforms: Vec::new(),
            defines: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    pub fn samplers(&self) -> &[MaterialSampler] {
        &self.samplers
    }

    pub fn uniforms(&self) -> &[MaterialUniform] {
        &self.uniforms
    }

    pub fn sampler(&self, name: &str) -> Option<&MaterialSampler> {
        self.samplers.iter().find(|s| s.name == name)
    }

    pub fn uniform(&self, name: &str) -> Option<&MaterialUniform> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// Registers a named sampler slot. The slot's position is the texture unit
    /// it is bound to for the lifetime of the compiled program.
    pub fn define_sampler(&mut self, name: impl Into<String>) -> &mut MaterialSampler {
        let name = name.into();
        let idx = match self.samplers.iter().position(|s| s.name == name) {
            Some(idx) => {
                log::warn!("sampler `{}` defined twice on material `{}`", name, self.name);
                idx
            }
            None => {
                self.samplers.push(MaterialSampler {
                    name,
                    texture: None,
                });
                self.samplers.len() - 1
            }
        };
        &mut self.samplers[idx]
    }

    /// Registers a named uniform slot with its default value. `default` is
    /// truncated or zero-padded to `length` components.
    pub fn define_uniform(
        &mut self,
        name: impl Into<String>,
        default: &[f32],
        length: usize,
    ) -> &mut MaterialUniform {
        let name = name.into();
        let mut value = default.to_vec();
        value.resize(length, 0.0);
        let idx = match self.uniforms.iter().position(|u| u.name == name) {
            Some(idx) => {
                log::warn!("uniform `{}` defined twice on material `{}`", name, self.name);
                idx
            }
            None => {
                self.uniforms.push(MaterialUniform {
                    name,
                    value,
                    length,
                });
                self.uniforms.len() - 1
            }
        };
        &mut self.uniforms[idx]
    }

    /// Binds `texture` to a previously defined sampler. Returns `false` if no
    /// such slot exists.
    pub fn set_texture(&mut self, sampler: &str, texture: Rc<Texture>) -> bool {
        match self.samplers.iter_mut().find(|s| s.name == sampler) {
            Some(slot) => {
                slot.texture = Some(texture);
                true
            }
            None => {
                log::warn!("material `{}` has no sampler `{}`", self.name, sampler);
                false
            }
        }
    }

    pub fn set_uniform(&mut self, name: &str, value: &[f32]) -> bool {
        match self.uniforms.iter_mut().find(|u| u.name == name) {
            Some(slot) => {
                let length = slot.length;
                slot.value = value.to_vec();
                slot.value.resize(length, 0.0);
                true
            }
            None => false,
        }
    }

    /// A define that is added to every program built from this material.
    pub fn set_define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.defines.insert(name.into(), value.into());
    }

    /// Preprocessor defines for this material drawn with a primitive whose
    /// attribute set is `attribute_mask`.
    ///
    /// Every non-position attribute present adds `HAS_<SEMANTIC>`, every sampler
    /// with a bound texture adds `USE_<SAMPLER_NAME>` (upper snake case).
    pub fn program_defines(&self, attribute_mask: u32) -> ProgramDefines {
        let mut defines = ProgramDefines::new();
        for (name, value) in &self.defines {
            defines.insert(name.clone(), value.clone());
        }
        for semantic in AttributeSemantic::ALL {
            if semantic == AttributeSemantic::Position {
                continue;
            }
            if attribute_mask & semantic.mask() != 0 {
                defines.insert(format!("HAS_{}", semantic.name()), "1");
            }
        }
        for sampler in self.samplers.iter().filter(|s| s.texture.is_some()) {
            defines.insert(format!("USE_{}", upper_snake(&sampler.name)), "1");
        }
        defines
    }
}

fn upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        out.push(c.to_ascii_uppercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_names_become_upper_snake_defines() {
        assert_eq!(upper_snake("baseColorTex"), "BASE_COLOR_TEX");
        assert_eq!(upper_snake("occlusion"), "OCCLUSION");
        assert_eq!(upper_snake("EMISSIVE"), "EMISSIVE");
    }
}
