//! The GPU-linked form of a [`Primitive`] and the instances that draw it.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use crate::{
    data_structures::{
        primitive::{Primitive, PrimitiveAttribute, PrimitiveIndices, Topology},
        ray::Aabb,
        scene_graph::{Node, WeakNode},
    },
    gpu::{DrawCommand, IndexBinding, VertexAttributeBinding, VertexBufferBinding},
    render::material::RenderMaterial,
    resources::{buffer::RenderBuffer, completion::Completion},
};

/// Attributes read from one buffer with one stride.
#[derive(Debug)]
pub(crate) struct AttributeBuffer {
    pub(crate) buffer: Rc<RenderBuffer>,
    pub(crate) stride: u32,
    pub(crate) attributes: Vec<PrimitiveAttribute>,
}

/// Groups attributes by source buffer so each buffer is bound once.
pub(crate) fn group_attributes(attributes: &[PrimitiveAttribute]) -> Vec<AttributeBuffer> {
    let mut groups: Vec<AttributeBuffer> = Vec::new();
    for attribute in attributes {
        let stride = attribute.effective_stride();
        match groups
            .iter_mut()
            .find(|g| Rc::ptr_eq(&g.buffer, &attribute.buffer) && g.stride == stride)
        {
            Some(group) => group.attributes.push(attribute.clone()),
            None => groups.push(AttributeBuffer {
                buffer: attribute.buffer.clone(),
                stride,
                attributes: vec![attribute.clone()],
            }),
        }
    }
    groups
}

/// A primitive bound to a material and program, drawn once per node instance
/// each frame it is active.
pub struct RenderPrimitive {
    attribute_buffers: Vec<AttributeBuffer>,
    indices: Option<PrimitiveIndices>,
    element_count: u32,
    topology: Topology,
    bounds: Option<Aabb>,
    material: RenderMaterial,
    completion: Completion,
    active_frame: Cell<u64>,
    instances: RefCell<Vec<WeakNode>>,
}

impl fmt::Debug for RenderPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPrimitive")
            .field("material", &self.material.name())
            .field("element_count", &self.element_count)
            .field("topology", &self.topology)
            .field("complete", &self.completion.is_complete())
            .field("instances", &self.instances.borrow().len())
            .finish()
    }
}

impl RenderPrimitive {
    pub(crate) fn new(primitive: &Primitive, material: RenderMaterial) -> Self {
        Self {
            attribute_buffers: group_attributes(primitive.attributes()),
            indices: primitive.indices().cloned(),
            element_count: primitive.element_count(),
            topology: primitive.topology(),
            bounds: primitive.bounds().copied(),
            material,
            completion: Completion::new(),
            active_frame: Cell::new(0),
            instances: RefCell::new(Vec::new()),
        }
    }

    pub fn material(&self) -> &RenderMaterial {
        &self.material
    }

    pub fn bounds(&self) -> Option<&Aabb> {
        self.bounds.as_ref()
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Number of distinct vertex buffers bound for this primitive.
    pub fn vertex_buffer_count(&self) -> usize {
        self.attribute_buffers.len()
    }

    /// Every resource this primitive waits for: attribute buffers, the index
    /// buffer and the textures of its material.
    pub(crate) fn dependencies(&self) -> Vec<Completion> {
        let mut completions: Vec<Completion> = self
            .attribute_buffers
            .iter()
            .map(|b| b.buffer.completion().clone())
            .collect();
        if let Some(indices) = &self.indices {
            completions.push(indices.buffer.completion().clone());
        }
        completions.extend(self.material.texture_completions());
        completions
    }

    /// Sets a uniform shared by every instance of this primitive.
    pub fn set_uniform(&self, name: &str, value: &[f32]) -> bool {
        self.material.set_uniform(name, value)
    }

    pub fn active_frame(&self) -> u64 {
        self.active_frame.get()
    }

    pub(crate) fn mark_active(&self, frame_id: u64) {
        self.active_frame.set(frame_id);
    }

    pub fn instance_count(&self) -> usize {
        self.instances.borrow().len()
    }

    /// Live nodes referencing this primitive, in registration order.
    pub fn instances(&self) -> Vec<Node> {
        self.instances
            .borrow()
            .iter()
            .filter_map(WeakNode::upgrade)
            .collect()
    }

    pub(crate) fn add_instance(&self, node: &Node) {
        let mut instances = self.instances.borrow_mut();
        if !instances.iter().any(|i| i.points_to(node)) {
            instances.push(node.downgrade());
        }
    }

    pub(crate) fn remove_instance(&self, node: &Node) {
        self.instances
            .borrow_mut()
            .retain(|i| !i.points_to(node) && i.is_alive());
    }

    /// The vertex layout for the current program, `None` while a buffer is
    /// still loading.
    pub(crate) fn vertex_layout(&self) -> Option<Vec<VertexBufferBinding>> {
        let program = self.material.program();
        let mut layout = Vec::with_capacity(self.attribute_buffers.len());
        for group in &self.attribute_buffers {
            let buffer = group.buffer.handle()?;
            let attributes: Vec<VertexAttributeBinding> = group
                .attributes
                .iter()
                .filter_map(|a| {
                    let location = program.attribute_location(a.semantic.name())?;
                    Some(VertexAttributeBinding {
                        location,
                        component_count: a.component_count,
                        component_type: a.component_type,
                        normalized: a.normalized,
                        byte_offset: a.byte_offset,
                    })
                })
                .collect();
            if attributes.is_empty() {
                continue;
            }
            layout.push(VertexBufferBinding {
                buffer,
                stride: group.stride,
                attributes,
            });
        }
        Some(layout)
    }

    pub(crate) fn draw_command(&self) -> Option<DrawCommand> {
        let indices = match &self.indices {
            Some(indices) => Some(IndexBinding {
                buffer: indices.buffer.handle()?,
                index_type: indices.index_type,
                byte_offset: indices.byte_offset,
            }),
            None => None,
        };
        Some(DrawCommand {
            topology: self.topology,
            element_count: self.element_count,
            indices,
        })
    }
}
