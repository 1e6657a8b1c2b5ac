//! Engine data structures: geometry, materials, textures and the scene graph.
//!
//! This module contains the CPU-side types a scene is described with:
//!
//! - `primitive` describes drawable surfaces (attributes, indices, bounds)
//! - `geometry` builds simple primitives procedurally
//! - `material` holds shader sources, slots and the packed render state
//! - `texture` contains texture descriptors and image decoding
//! - `transform` and `ray` are the math the scene graph is built on
//! - `scene_graph` enables hierarchical scene organization

pub mod geometry;
pub mod material;
pub mod primitive;
pub mod ray;
pub mod scene_graph;
pub mod texture;
pub mod transform;
