//! stratum-ngin
//!
//! A small retained-mode rendering engine: a scene graph with lazily computed
//! world matrices, declarative materials whose render state is packed into a
//! single integer, GPU resources that complete asynchronously, and a renderer
//! that draws in render-order buckets while issuing only the state changes
//! that actually differ between consecutive draws.
//!
//! High-level modules
//! - `context`: headless wgpu device/queue setup and offscreen targets
//! - `data_structures`: primitives, materials, textures and the scene graph
//! - `gpu`: the graphics API seam and its recording and wgpu backends
//! - `logging`: logger setup for native and web builds
//! - `pipelines`: shader preprocessing and wgpu pipeline state translation
//! - `render`: the renderer, render primitives and render materials
//! - `resources`: GPU resource wrappers, completion tracking and loaders
//! - `scene`: the per-frame host driver
//!

pub mod context;
pub mod data_structures;
pub mod gpu;
pub mod logging;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod scene;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use wgpu;
