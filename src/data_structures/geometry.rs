//! Procedural geometry.
//!
//! [`GeometryBuilder`] accumulates interleaved vertices and 16 bit indices for
//! simple shapes and turns them into a [`Primitive`] backed by renderer
//! buffers. Misuse (pushing outside a geometry, indexing a vertex that was never
//! pushed) is a programming error and panics.

use std::mem;

use cgmath::{Point3, Vector3};

use crate::{
    data_structures::{
        primitive::{AttributeSemantic, ComponentType, IndexType, Primitive, PrimitiveAttribute, Topology},
        ray::Aabb,
    },
    gpu::BufferTarget,
    render::Renderer,
    resources::buffer::BufferData,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GeometryVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
    pub normal: [f32; 3],
}

impl GeometryVertex {
    const STRIDE: u32 = mem::size_of::<GeometryVertex>() as u32;
    const TEX_COORD_OFFSET: u32 = mem::size_of::<[f32; 3]>() as u32;
    const NORMAL_OFFSET: u32 = mem::size_of::<[f32; 5]>() as u32;
}

#[derive(Debug, Default)]
pub struct GeometryBuilder {
    vertices: Vec<GeometryVertex>,
    indices: Vec<u16>,
    // first vertex of the open geometry
    geometry_start: Option<usize>,
    bounds: Option<Aabb>,
    /// Emit triangles as `a, c, b` instead of `a, b, c`.
    pub flip_winding: bool,
}

impl GeometryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn vertices(&self) -> &[GeometryVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    /// Opens a geometry. Triangle indices are relative to its first vertex.
    pub fn start_geometry(&mut self) {
        assert!(
            self.geometry_start.is_none(),
            "start_geometry called while a geometry is still open"
        );
        self.geometry_start = Some(self.vertices.len());
    }

    pub fn end_geometry(&mut self) {
        assert!(
            self.geometry_start.is_some(),
            "end_geometry called without start_geometry"
        );
        self.geometry_start = None;
    }

    /// Returns the index of the new vertex within the open geometry.
    pub fn push_vertex(&mut self, position: [f32; 3], tex_coord: [f32; 2], normal: [f32; 3]) -> u16 {
        let start = self
            .geometry_start
            .expect("push_vertex called without start_geometry");
        assert!(
            self.vertices.len() < u16::MAX as usize,
            "geometry exceeds the 16 bit index range"
        );
        let point = Point3::from(position);
        match self.bounds.as_mut() {
            Some(bounds) => bounds.extend(point),
            None => self.bounds = Some(Aabb::new(point, point)),
        }
        self.vertices.push(GeometryVertex {
            position,
            tex_coord,
            normal,
        });
        (self.vertices.len() - 1 - start) as u16
    }

    pub fn push_triangle(&mut self, a: u16, b: u16, c: u16) {
        let start = self
            .geometry_start
            .expect("push_triangle called without start_geometry");
        for index in [a, b, c] {
            assert!(
                start + (index as usize) < self.vertices.len(),
                "triangle references vertex {} which was never pushed",
                index
            );
        }
        let [a, b, c] = [a, b, c].map(|i| (start + i as usize) as u16);
        if self.flip_winding {
            self.indices.extend_from_slice(&[a, c, b]);
        } else {
            self.indices.extend_from_slice(&[a, b, c]);
        }
    }

    /// An axis-aligned box with outward normals and per-face UVs.
    pub fn push_box(&mut self, min: Point3<f32>, max: Point3<f32>) {
        // (normal, u axis, v axis) per face
        let faces: [(Vector3<f32>, Vector3<f32>, Vector3<f32>); 6] = [
            (Vector3::unit_x(), -Vector3::unit_z(), Vector3::unit_y()),
            (-Vector3::unit_x(), Vector3::unit_z(), Vector3::unit_y()),
            (Vector3::unit_y(), Vector3::unit_x(), -Vector3::unit_z()),
            (-Vector3::unit_y(), Vector3::unit_x(), Vector3::unit_z()),
            (Vector3::unit_z(), Vector3::unit_x(), Vector3::unit_y()),
            (-Vector3::unit_z(), -Vector3::unit_x(), Vector3::unit_y()),
        ];
        let center = Point3::new(
            (min.x + max.x) * 0.5,
            (min.y + max.y) * 0.5,
            (min.z + max.z) * 0.5,
        );
        let half = (max - min) * 0.5;

        self.start_geometry();
        for (normal, u, v) in faces {
            let scale = |d: Vector3<f32>| Vector3::new(d.x * half.x, d.y * half.y, d.z * half.z);
            let face_center = center + scale(normal);
            let (du, dv) = (scale(u), scale(v));
            let corners = [
                (face_center - du - dv, [0.0, 1.0]),
                (face_center + du - dv, [1.0, 1.0]),
                (face_center + du + dv, [1.0, 0.0]),
                (face_center - du + dv, [0.0, 0.0]),
            ];
            let n = normal.into();
            let [i0, i1, i2, i3] = corners.map(|(p, uv)| self.push_vertex(p.into(), uv, n));
            self.push_triangle(i0, i1, i2);
            self.push_triangle(i2, i3, i0);
        }
        self.end_geometry();
    }

    /// A `width` x `depth` quad in the XZ plane facing +Y, centered at the origin.
    pub fn push_plane(&mut self, width: f32, depth: f32) {
        let (hw, hd) = (width * 0.5, depth * 0.5);
        self.start_geometry();
        let up = [0.0, 1.0, 0.0];
        let a = self.push_vertex([-hw, 0.0, hd], [0.0, 1.0], up);
        let b = self.push_vertex([hw, 0.0, hd], [1.0, 1.0], up);
        let c = self.push_vertex([hw, 0.0, -hd], [1.0, 0.0], up);
        let d = self.push_vertex([-hw, 0.0, -hd], [0.0, 0.0], up);
        self.push_triangle(a, b, c);
        self.push_triangle(c, d, a);
        self.end_geometry();
    }

    /// Uploads the accumulated geometry and describes it as an indexed
    /// triangle list with POSITION, TEXCOORD_0 and NORMAL attributes.
    pub fn finish_primitive(self, renderer: &mut Renderer) -> Primitive {
        assert!(
            self.geometry_start.is_none(),
            "finish_primitive called while a geometry is still open"
        );
        let vertex_buffer = renderer.create_render_buffer(
            BufferTarget::Vertex,
            BufferData::Ready(bytemuck::cast_slice(&self.vertices).to_vec()),
        );
        let index_buffer =
            renderer.create_render_buffer(BufferTarget::Index, BufferData::from_u16(&self.indices));

        let stride = GeometryVertex::STRIDE;
        let attributes = vec![
            PrimitiveAttribute::new(
                AttributeSemantic::Position,
                vertex_buffer.clone(),
                3,
                ComponentType::F32,
                stride,
                0,
            ),
            PrimitiveAttribute::new(
                AttributeSemantic::TexCoord0,
                vertex_buffer.clone(),
                2,
                ComponentType::F32,
                stride,
                GeometryVertex::TEX_COORD_OFFSET,
            ),
            PrimitiveAttribute::new(
                AttributeSemantic::Normal,
                vertex_buffer,
                3,
                ComponentType::F32,
                stride,
                GeometryVertex::NORMAL_OFFSET,
            ),
        ];
        let primitive = Primitive::new(attributes, self.indices.len() as u32, Topology::Triangles)
            .with_indices(index_buffer, IndexType::U16);
        match self.bounds {
            Some(bounds) => primitive.with_bounds(bounds.min, bounds.max),
            None => primitive,
        }
    }
}
