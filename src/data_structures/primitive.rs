//! CPU-side description of a drawable surface.
//!
//! A [`Primitive`] is plain data: which buffers feed which vertex attributes,
//! an optional index buffer, the topology and a local-space bounding box. The
//! buffers themselves are [`RenderBuffer`]s created through the renderer, so a
//! loader can hand out a primitive before its bytes have arrived.

use std::rc::Rc;

use cgmath::Point3;

use crate::{data_structures::ray::Aabb, resources::buffer::RenderBuffer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    Position,
    Normal,
    Tangent,
    TexCoord0,
    TexCoord1,
    Color0,
}

impl AttributeSemantic {
    pub const ALL: [AttributeSemantic; 6] = [
        AttributeSemantic::Position,
        AttributeSemantic::Normal,
        AttributeSemantic::Tangent,
        AttributeSemantic::TexCoord0,
        AttributeSemantic::TexCoord1,
        AttributeSemantic::Color0,
    ];

    /// The attribute name shaders declare for this semantic.
    pub fn name(self) -> &'static str {
        match self {
            AttributeSemantic::Position => "POSITION",
            AttributeSemantic::Normal => "NORMAL",
            AttributeSemantic::Tangent => "TANGENT",
            AttributeSemantic::TexCoord0 => "TEXCOORD_0",
            AttributeSemantic::TexCoord1 => "TEXCOORD_1",
            AttributeSemantic::Color0 => "COLOR_0",
        }
    }

    pub fn mask(self) -> u32 {
        1 << (self as u32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    pub fn byte_size(self) -> u32 {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::U32 | ComponentType::F32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn byte_size(self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

/// One vertex attribute read out of a buffer.
#[derive(Clone, Debug)]
pub struct PrimitiveAttribute {
    pub semantic: AttributeSemantic,
    pub buffer: Rc<RenderBuffer>,
    pub component_count: u32,
    pub component_type: ComponentType,
    /// Zero means tightly packed.
    pub stride: u32,
    pub byte_offset: u32,
    pub normalized: bool,
}

impl PrimitiveAttribute {
    pub fn new(
        semantic: AttributeSemantic,
        buffer: Rc<RenderBuffer>,
        component_count: u32,
        component_type: ComponentType,
        stride: u32,
        byte_offset: u32,
    ) -> Self {
        Self {
            semantic,
            buffer,
            component_count,
            component_type,
            stride,
            byte_offset,
            normalized: false,
        }
    }

    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    /// The stride with tight packing resolved.
    pub fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            self.component_count * self.component_type.byte_size()
        } else {
            self.stride
        }
    }
}

#[derive(Clone, Debug)]
pub struct PrimitiveIndices {
    pub buffer: Rc<RenderBuffer>,
    pub index_type: IndexType,
    pub byte_offset: u32,
}

#[derive(Clone, Debug)]
pub struct Primitive {
    attributes: Vec<PrimitiveAttribute>,
    indices: Option<PrimitiveIndices>,
    element_count: u32,
    topology: Topology,
    bounds: Option<Aabb>,
}

impl Primitive {
    /// `element_count` is the number of indices when indexed, vertices otherwise.
    pub fn new(attributes: Vec<PrimitiveAttribute>, element_count: u32, topology: Topology) -> Self {
        Self {
            attributes,
            indices: None,
            element_count,
            topology,
            bounds: None,
        }
    }

    pub fn with_indices(mut self, buffer: Rc<RenderBuffer>, index_type: IndexType) -> Self {
        self.indices = Some(PrimitiveIndices {
            buffer,
            index_type,
            byte_offset: 0,
        });
        self
    }

    pub fn with_index_offset(mut self, byte_offset: u32) -> Self {
        if let Some(indices) = self.indices.as_mut() {
            indices.byte_offset = byte_offset;
        }
        self
    }

    pub fn with_bounds(mut self, min: Point3<f32>, max: Point3<f32>) -> Self {
        self.bounds = Some(Aabb::new(min, max));
        self
    }

    pub fn attributes(&self) -> &[PrimitiveAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, semantic: AttributeSemantic) -> Option<&PrimitiveAttribute> {
        self.attributes.iter().find(|a| a.semantic == semantic)
    }

    pub fn indices(&self) -> Option<&PrimitiveIndices> {
        self.indices.as_ref()
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn bounds(&self) -> Option<&Aabb> {
        self.bounds.as_ref()
    }

    /// Bitwise OR of [`AttributeSemantic::mask`] for every attribute present.
    pub fn attribute_mask(&self) -> u32 {
        self.attributes
            .iter()
            .fold(0, |mask, attribute| mask | attribute.semantic.mask())
    }
}
