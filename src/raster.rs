//! Rasterizer seam and image encoding helpers.
//!
//! The rasterizer is an external collaborator: the engine only sees the
//! `Rasterizer` trait and talks to it through a `RendererHandle`, which is
//! initialized once and never reconstructed after success.

use base64::Engine as _;

use crate::error::{Error, Result};
use crate::scene::SceneNode;
use crate::OutputFormat;

/// Wrap raw image bytes into a self-contained data URI
pub fn encode_data_uri(bytes: &[u8], mime: &str) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Contract the external rasterizer implements
pub trait Rasterizer: Send {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn load_font(&mut self, bytes: &[u8]) -> Result<()>;

    /// Rasterize the scene into encoded image bytes
    fn render(
        &mut self,
        scene: &SceneNode,
        width: u32,
        height: u32,
        format: OutputFormat,
    ) -> Result<Vec<u8>>;

    /// Rasterize and wrap into a displayable data URI
    fn render_to_data_url(
        &mut self,
        scene: &SceneNode,
        width: u32,
        height: u32,
        format: OutputFormat,
    ) -> Result<String> {
        let bytes = self.render(scene, width, height, format)?;
        Ok(encode_data_uri(&bytes, format.mime_type()))
    }
}

/// Exclusive owner of the single rasterizer instance
pub struct RendererHandle {
    inner: Box<dyn Rasterizer>,
    ready: bool,
}

impl RendererHandle {
    pub fn new(inner: Box<dyn Rasterizer>) -> Self {
        Self {
            inner,
            ready: false,
        }
    }

    /// Idempotent: a ready handle stays ready.
    pub fn init(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }
        self.inner.init()?;
        self.ready = true;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn load_font(&mut self, bytes: &[u8]) -> Result<()> {
        self.require_ready()?;
        self.inner.load_font(bytes)
    }

    pub fn render_to_data_url(
        &mut self,
        scene: &SceneNode,
        width: u32,
        height: u32,
        format: OutputFormat,
    ) -> Result<String> {
        self.require_ready()?;
        self.inner.render_to_data_url(scene, width, height, format)
    }

    fn require_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(Error::Initialization("rasterizer is not initialized".into()))
        }
    }
}

/// Backend for embeddings that only need the front half of the pipeline.
/// Fonts are accepted and dropped; producing pixels is not supported.
pub struct NullRasterizer;

impl Rasterizer for NullRasterizer {
    fn load_font(&mut self, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    fn render(
        &mut self,
        _scene: &SceneNode,
        _width: u32,
        _height: u32,
        _format: OutputFormat,
    ) -> Result<Vec<u8>> {
        Err(Error::Rasterize(
            "no rasterizer backend configured".into(),
        ))
    }
}
