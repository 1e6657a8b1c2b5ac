//! Translation of packed material state and vertex layouts into wgpu pipeline
//! state.

use crate::data_structures::{
    material::{BlendFactor, DepthFunc, MaterialState},
    primitive::{ComponentType, IndexType, Topology},
};

pub fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::SrcAlphaSaturate => wgpu::BlendFactor::SrcAlphaSaturated,
    }
}

pub fn compare_function(func: DepthFunc) -> wgpu::CompareFunction {
    match func {
        DepthFunc::Never => wgpu::CompareFunction::Never,
        DepthFunc::Less => wgpu::CompareFunction::Less,
        DepthFunc::Equal => wgpu::CompareFunction::Equal,
        DepthFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        DepthFunc::Greater => wgpu::CompareFunction::Greater,
        DepthFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        DepthFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        DepthFunc::Always => wgpu::CompareFunction::Always,
    }
}

/// `None` when blending is disabled.
pub fn blend_state(state: &MaterialState) -> Option<wgpu::BlendState> {
    if !state.blend() {
        return None;
    }
    let component = wgpu::BlendComponent {
        src_factor: blend_factor(state.blend_func_src()),
        dst_factor: blend_factor(state.blend_func_dst()),
        operation: wgpu::BlendOperation::Add,
    };
    Some(wgpu::BlendState {
        color: component,
        alpha: component,
    })
}

pub fn color_writes(state: &MaterialState) -> wgpu::ColorWrites {
    if state.color_mask() {
        wgpu::ColorWrites::ALL
    } else {
        wgpu::ColorWrites::empty()
    }
}

pub fn cull_mode(state: &MaterialState) -> Option<wgpu::Face> {
    state.cull_face().then_some(wgpu::Face::Back)
}

/// Depth writes only happen while the depth test is enabled, as in GL.
pub fn depth_stencil_state(
    state: &MaterialState,
    format: wgpu::TextureFormat,
) -> wgpu::DepthStencilState {
    let depth_compare = if state.depth_test() {
        compare_function(state.depth_func())
    } else {
        wgpu::CompareFunction::Always
    };
    let stencil = if state.stencil_test() {
        let face = wgpu::StencilFaceState {
            compare: wgpu::CompareFunction::Always,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::Replace,
        };
        wgpu::StencilState {
            front: face,
            back: face,
            read_mask: 0xff,
            write_mask: if state.stencil_mask() { 0xff } else { 0 },
        }
    } else {
        wgpu::StencilState::default()
    };
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: state.depth_test() && state.depth_mask(),
        depth_compare,
        stencil,
        bias: wgpu::DepthBiasState::default(),
    }
}

pub fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Points => wgpu::PrimitiveTopology::PointList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

pub fn index_format(index_type: IndexType) -> wgpu::IndexFormat {
    match index_type {
        IndexType::U16 => wgpu::IndexFormat::Uint16,
        IndexType::U32 => wgpu::IndexFormat::Uint32,
    }
}

/// Strip topologies need the index format baked into the pipeline.
pub fn strip_index_format(topology: Topology, index_type: Option<IndexType>) -> Option<wgpu::IndexFormat> {
    match topology {
        Topology::LineStrip | Topology::TriangleStrip => index_type.map(index_format),
        _ => None,
    }
}

/// `None` for combinations wgpu has no vertex format for.
pub fn vertex_format(
    component_type: ComponentType,
    component_count: u32,
    normalized: bool,
) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    Some(match (component_type, component_count, normalized) {
        (ComponentType::F32, 1, _) => F::Float32,
        (ComponentType::F32, 2, _) => F::Float32x2,
        (ComponentType::F32, 3, _) => F::Float32x3,
        (ComponentType::F32, 4, _) => F::Float32x4,
        (ComponentType::U32, 1, false) => F::Uint32,
        (ComponentType::U32, 2, false) => F::Uint32x2,
        (ComponentType::U32, 3, false) => F::Uint32x3,
        (ComponentType::U32, 4, false) => F::Uint32x4,
        (ComponentType::U8, 2, true) => F::Unorm8x2,
        (ComponentType::U8, 4, true) => F::Unorm8x4,
        (ComponentType::U8, 2, false) => F::Uint8x2,
        (ComponentType::U8, 4, false) => F::Uint8x4,
        (ComponentType::I8, 2, true) => F::Snorm8x2,
        (ComponentType::I8, 4, true) => F::Snorm8x4,
        (ComponentType::I8, 2, false) => F::Sint8x2,
        (ComponentType::I8, 4, false) => F::Sint8x4,
        (ComponentType::U16, 2, true) => F::Unorm16x2,
        (ComponentType::U16, 4, true) => F::Unorm16x4,
        (ComponentType::U16, 2, false) => F::Uint16x2,
        (ComponentType::U16, 4, false) => F::Uint16x4,
        (ComponentType::I16, 2, true) => F::Snorm16x2,
        (ComponentType::I16, 4, true) => F::Snorm16x4,
        (ComponentType::I16, 2, false) => F::Sint16x2,
        (ComponentType::I16, 4, false) => F::Sint16x4,
        _ => return None,
    })
}
