//! CPU-side textures and image decoding.
//!
//! A [`Texture`] is what a material's sampler slot points at: a cache key, a
//! sampler description and a source for its pixels. The renderer
//! turns it into a [`RenderTexture`](crate::resources::texture::RenderTexture),
//! sharing one GPU object between every texture with the same [`TextureKey`].

use std::{
    cell::RefCell,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::*;
use futures::future::LocalBoxFuture;
use image::{GenericImageView, ImageFormat, load_from_memory_with_format};

static NEXT_GENERATED_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of a texture for GPU-object deduplication.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureKey {
    /// Loaded from (or identified by) a URL or asset path.
    Url(String),
    /// Programmatically generated with a content-derived name.
    Named(String),
    /// Programmatically generated and never shared.
    Generated(u64),
}

impl TextureKey {
    pub fn generated() -> Self {
        TextureKey::Generated(NEXT_GENERATED_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TextureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureKey::Url(url) => write!(f, "{url}"),
            TextureKey::Named(name) => write!(f, "{name}"),
            TextureKey::Generated(id) => write!(f, "generated#{id}"),
        }
    }
}

/// Decoded RGBA8 pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl fmt::Debug for TextureData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl TextureData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            bail!(
                "{}x{} RGBA texture needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            );
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .cycle()
            .take(width as usize * height as usize * 4)
            .copied()
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Decodes raw image file contents (PNG, JPEG, ...).
    ///
    /// `format` is an optional extension hint (e.g. "png"); without it the
    /// format is guessed from the bytes.
    pub fn decode(bytes: &[u8], format: Option<&str>) -> Result<Self> {
        let img = match format.and_then(ImageFormat::from_extension) {
            None => image::load_from_memory(bytes)?,
            Some(fmt) => load_from_memory_with_format(bytes, fmt)?,
        };
        Ok(Self::from_image(&img))
    }

    pub fn from_image(img: &image::DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.to_rgba8().into_raw(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct SamplerDesc {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

/// A texture whose contents change over time, e.g. video frames.
///
/// Polled once per frame while the texture is in use; returning `None` keeps
/// the previous contents.
pub trait TextureStream {
    fn poll_frame(&mut self) -> Option<TextureData>;
}

pub enum TextureSource {
    /// Encoded image bytes with an optional format hint.
    Encoded(Vec<u8>, Option<String>),
    /// Fetched through [`load_binary`](crate::resources::load_binary).
    Url(String),
    /// Encoded image bytes arriving later.
    Pending(LocalBoxFuture<'static, Result<Vec<u8>>>),
    Data(TextureData),
    Stream(Box<dyn TextureStream>),
}

impl fmt::Debug for TextureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureSource::Encoded(bytes, format) => {
                write!(f, "Encoded({} bytes, {:?})", bytes.len(), format)
            }
            TextureSource::Url(url) => write!(f, "Url({url})"),
            TextureSource::Pending(_) => write!(f, "Pending"),
            TextureSource::Data(data) => write!(f, "{data:?}"),
            TextureSource::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// A texture as referenced by materials.
///
/// Encoded bytes, URLs and decoded data can feed any number of renderers.
/// Pending and streamed sources are consumed by the first renderer that
/// creates a GPU object for them.
#[derive(Debug)]
pub struct Texture {
    key: TextureKey,
    pub sampler: SamplerDesc,
    source: RefCell<Option<TextureSource>>,
}

impl Texture {
    pub fn new(key: TextureKey, source: TextureSource) -> Self {
        Self {
            key,
            sampler: SamplerDesc::default(),
            source: RefCell::new(Some(source)),
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(TextureKey::Url(url.clone()), TextureSource::Url(url))
    }

    /// Encoded bytes. Without a `key` the texture is never shared.
    pub fn from_bytes(bytes: Vec<u8>, format: Option<&str>, key: Option<&str>) -> Self {
        let key = key.map_or_else(TextureKey::generated, |k| TextureKey::Url(k.to_string()));
        Self::new(key, TextureSource::Encoded(bytes, format.map(str::to_string)))
    }

    pub fn from_future(key: TextureKey, bytes: LocalBoxFuture<'static, Result<Vec<u8>>>) -> Self {
        Self::new(key, TextureSource::Pending(bytes))
    }

    pub fn from_data(data: TextureData) -> Self {
        Self::new(TextureKey::generated(), TextureSource::Data(data))
    }

    /// A 1x1 texture of one colour. Equal colours share a GPU object.
    pub fn from_color(rgba: [f32; 4]) -> Self {
        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let rgba = [to_u8(rgba[0]), to_u8(rgba[1]), to_u8(rgba[2]), to_u8(rgba[3])];
        let key = TextureKey::Named(format!(
            "COLOR_{}_{}_{}_{}",
            rgba[0], rgba[1], rgba[2], rgba[3]
        ));
        Self::new(key, TextureSource::Data(TextureData::solid(1, 1, rgba)))
    }

    pub fn from_stream(stream: Box<dyn TextureStream>) -> Self {
        Self::new(TextureKey::generated(), TextureSource::Stream(stream))
    }

    pub fn with_sampler(mut self, sampler: SamplerDesc) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn key(&self) -> &TextureKey {
        &self.key
    }

    /// The pixel source for a new GPU object. Reusable sources stay in place.
    pub(crate) fn acquire_source(&self) -> Option<TextureSource> {
        let mut source = self.source.borrow_mut();
        match source.as_ref()? {
            TextureSource::Encoded(bytes, format) => {
                Some(TextureSource::Encoded(bytes.clone(), format.clone()))
            }
            TextureSource::Url(url) => Some(TextureSource::Url(url.clone())),
            TextureSource::Data(data) => Some(TextureSource::Data(data.clone())),
            TextureSource::Pending(_) | TextureSource::Stream(_) => source.take(),
        }
    }
}
