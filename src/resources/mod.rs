//! GPU-side resources (buffers, textures, programs), their completion
//! tracking and the logic for loading bytes from external files.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use crate::{
    data_structures::texture::TextureData,
    resources::{buffer::RenderBuffer, texture::RenderTexture},
};

pub mod buffer;
pub mod completion;
pub mod program;
pub mod texture;

/// Loaded contents waiting to be handed to the graphics API.
///
/// Async continuations cannot reach the backend, so they push here and the
/// renderer drains the queue at the next pump.
pub(crate) enum Upload {
    Buffer(Weak<RenderBuffer>, anyhow::Result<Vec<u8>>),
    Texture(Weak<RenderTexture>, anyhow::Result<TextureData>),
}

pub(crate) type UploadQueue = Rc<RefCell<Vec<Upload>>>;

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("window has no origin"))?;
    let base = reqwest::Url::parse(&format!("{}/assets/", origin))?;
    Ok(base.join(file_name)?)
}

/// Reads `file_name` from the `assets/` directory, or from the page origin
/// on the web.
pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = std::path::Path::new("./").join("assets").join(file_name);
        tokio::fs::read(path).await?
    };

    Ok(data)
}
