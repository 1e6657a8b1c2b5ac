//! GPU textures with asynchronous completion.

use std::{
    cell::{Cell, RefCell},
    fmt,
};

use crate::{
    data_structures::texture::{SamplerDesc, TextureData, TextureKey, TextureStream},
    gpu::{GraphicsApi, TextureHandle},
    resources::completion::Completion,
};

/// A GPU texture shared by every material whose texture has the same key.
pub struct RenderTexture {
    key: TextureKey,
    sampler: SamplerDesc,
    handle: Cell<Option<TextureHandle>>,
    completion: Completion,
    stream: RefCell<Option<Box<dyn TextureStream>>>,
    active_frame: Cell<u64>,
}

impl fmt::Debug for RenderTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTexture")
            .field("key", &self.key)
            .field("handle", &self.handle.get())
            .field("completion", &self.completion)
            .field("streaming", &self.stream.borrow().is_some())
            .finish()
    }
}

impl RenderTexture {
    pub(crate) fn pending(key: TextureKey, sampler: SamplerDesc) -> Self {
        Self {
            key,
            sampler,
            handle: Cell::new(None),
            completion: Completion::new(),
            stream: RefCell::new(None),
            active_frame: Cell::new(0),
        }
    }

    pub(crate) fn streaming(
        key: TextureKey,
        sampler: SamplerDesc,
        stream: Box<dyn TextureStream>,
    ) -> Self {
        let texture = Self::pending(key, sampler);
        *texture.stream.borrow_mut() = Some(stream);
        texture
    }

    pub fn key(&self) -> &TextureKey {
        &self.key
    }

    /// `None` until the texture is complete.
    pub fn handle(&self) -> Option<TextureHandle> {
        if self.completion.is_complete() {
            self.handle.get()
        } else {
            None
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.borrow().is_some()
    }

    pub(crate) fn mark_active(&self, frame_id: u64) {
        self.active_frame.set(frame_id);
    }

    pub(crate) fn active_frame(&self) -> u64 {
        self.active_frame.get()
    }

    /// Creates or refreshes the GPU object and resolves the completion.
    pub(crate) fn upload(&self, api: &mut dyn GraphicsApi, data: &TextureData) {
        match self.handle.get() {
            Some(handle) => api.update_texture(handle, data),
            None => self
                .handle
                .set(Some(api.create_texture(data, &self.sampler))),
        }
        self.completion.resolve();
    }

    /// Pulls the next frame of a streaming texture, if one is ready.
    pub(crate) fn poll_stream(&self, api: &mut dyn GraphicsApi) -> bool {
        let frame = match self.stream.borrow_mut().as_mut() {
            Some(stream) => stream.poll_frame(),
            None => return false,
        };
        match frame {
            Some(data) => {
                self.upload(api, &data);
                true
            }
            None => false,
        }
    }

    pub(crate) fn fail(&self) {
        self.completion.fail();
    }
}
