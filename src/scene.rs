//! The per-frame host driver.
//!
//! A [`Scene`] owns the root [`Node`] and, once one is set, the [`Renderer`].
//! The host calls it once per displayed frame:
//!
//! 1. [`Scene::start_frame`] advances time and runs node behaviors
//! 2. [`Scene::draw_view_array`] draws the scene once per view (one for mono,
//!    two for stereo)
//! 3. [`Scene::end_frame`] lets pending loads make progress between frames
//!

use std::time::Duration;

use cgmath::Matrix4;
use instant::Instant;

use crate::{
    data_structures::scene_graph::{HIT_TEST_OFFSET, HitResult, Node},
    render::{FrameStats, Renderer, View},
};

#[derive(Debug)]
pub struct Scene {
    root: Node,
    renderer: Option<Renderer>,
    started: Instant,
    time: Option<Duration>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            root: Node::named("scene"),
            renderer: None,
            started: Instant::now(),
            time: None,
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Installs `renderer`, returning the previous one. Every behavior is
    /// attached to the new renderer before its next update.
    pub fn set_renderer(&mut self, renderer: Renderer) -> Option<Renderer> {
        self.root.reset_behavior_attachment();
        self.renderer.replace(renderer)
    }

    pub fn take_renderer(&mut self) -> Option<Renderer> {
        self.renderer.take()
    }

    pub fn renderer(&self) -> Option<&Renderer> {
        self.renderer.as_ref()
    }

    pub fn renderer_mut(&mut self) -> Option<&mut Renderer> {
        self.renderer.as_mut()
    }

    /// Advances to the current wall-clock time. Returns the time elapsed since
    /// the previous frame, zero on the first.
    pub fn start_frame(&mut self) -> Duration {
        let now = self.started.elapsed();
        self.start_frame_at(now)
    }

    /// Like [`Scene::start_frame`] with an explicit time since the scene
    /// started. Time never runs backwards; an earlier `time` yields a zero delta.
    pub fn start_frame_at(&mut self, time: Duration) -> Duration {
        let delta = match self.time {
            Some(previous) => time.saturating_sub(previous),
            None => Duration::ZERO,
        };
        self.time = Some(time);
        self.root.update_behaviors(self.renderer.as_mut(), time, delta);
        delta
    }

    /// `None` while no renderer is installed.
    pub fn draw_view_array(&mut self, views: &[View]) -> Option<FrameStats> {
        let renderer = self.renderer.as_mut()?;
        Some(renderer.draw_view_array(&self.root, views))
    }

    pub fn end_frame(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.pump();
        }
    }

    /// Casts a pointer ray through the whole scene.
    pub fn hit_test(&self, ray_matrix: &Matrix4<f32>) -> Option<HitResult> {
        match &self.renderer {
            Some(renderer) => renderer.hit_test(&self.root, ray_matrix),
            None => self.root.hit_test_with_offset(ray_matrix, HIT_TEST_OFFSET),
        }
    }
}
