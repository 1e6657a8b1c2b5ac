//! GPU buffers with asynchronous completion.

use std::{
    cell::{Cell, RefCell},
    fmt,
};

use futures::future::LocalBoxFuture;

use crate::{
    gpu::{BufferHandle, BufferTarget, GraphicsApi},
    resources::completion::Completion,
};

/// Buffer contents, either at hand or still loading.
pub enum BufferData {
    Ready(Vec<u8>),
    Pending(LocalBoxFuture<'static, anyhow::Result<Vec<u8>>>),
}

impl BufferData {
    pub fn from_f32(values: &[f32]) -> Self {
        BufferData::Ready(bytemuck::cast_slice(values).to_vec())
    }

    pub fn from_u16(values: &[u16]) -> Self {
        BufferData::Ready(bytemuck::cast_slice(values).to_vec())
    }

    pub fn from_u32(values: &[u32]) -> Self {
        BufferData::Ready(bytemuck::cast_slice(values).to_vec())
    }
}

impl From<Vec<u8>> for BufferData {
    fn from(bytes: Vec<u8>) -> Self {
        BufferData::Ready(bytes)
    }
}

/// A GPU buffer shared by every primitive that reads from it.
///
/// The raw handle is only handed out once the buffer is complete.
pub struct RenderBuffer {
    target: BufferTarget,
    handle: Cell<Option<BufferHandle>>,
    len: Cell<usize>,
    completion: Completion,
    // updates issued before the contents arrived
    pending_updates: RefCell<Vec<(u64, Vec<u8>)>>,
}

impl fmt::Debug for RenderBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderBuffer")
            .field("target", &self.target)
            .field("handle", &self.handle.get())
            .field("len", &self.len.get())
            .field("completion", &self.completion)
            .finish()
    }
}

impl RenderBuffer {
    pub(crate) fn pending(target: BufferTarget) -> Self {
        Self {
            target,
            handle: Cell::new(None),
            len: Cell::new(0),
            completion: Completion::new(),
            pending_updates: RefCell::new(Vec::new()),
        }
    }

    pub fn target(&self) -> BufferTarget {
        self.target
    }

    /// `None` until the buffer is complete.
    pub fn handle(&self) -> Option<BufferHandle> {
        if self.completion.is_complete() {
            self.handle.get()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len.get() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Creates the GPU object from loaded bytes, replays queued updates and
    /// resolves the completion.
    pub(crate) fn upload(&self, api: &mut dyn GraphicsApi, data: &[u8]) {
        let handle = api.create_buffer(self.target, data);
        self.handle.set(Some(handle));
        self.len.set(data.len());
        for (offset, bytes) in self.pending_updates.borrow_mut().drain(..) {
            api.update_buffer(handle, offset, &bytes);
        }
        self.completion.resolve();
    }

    pub(crate) fn update(&self, api: &mut dyn GraphicsApi, offset: u64, data: &[u8]) {
        match self.handle() {
            Some(handle) => api.update_buffer(handle, offset, data),
            None => self
                .pending_updates
                .borrow_mut()
                .push((offset, data.to_vec())),
        }
    }

    pub(crate) fn fail(&self) {
        self.pending_updates.borrow_mut().clear();
        self.completion.fail();
    }
}
