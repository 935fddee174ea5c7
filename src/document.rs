//! Document handle abstraction and rasterized page artifacts.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{RenderError, ViewerResult};

/// Rasterized page data.
#[derive(Debug, Clone)]
pub struct PageArtifact {
    /// Raw RGBA pixel data.
    pub pixels: Bytes,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Scale the page was rasterized at.
    pub scale: f64,
}

impl PageArtifact {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, scale: f64) -> Self {
        Self {
            pixels: Bytes::from(pixels),
            width,
            height,
            scale,
        }
    }

    /// Size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.pixels.len()
    }
}

/// Reference to a document to open.
#[derive(Debug, Clone)]
pub enum DocumentRef {
    /// Document on disk.
    Path(PathBuf),
    /// Document already loaded into memory.
    Memory(Bytes),
}

impl DocumentRef {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        DocumentRef::Path(path.into())
    }

    /// Short description for log lines.
    pub fn describe(&self) -> String {
        match self {
            DocumentRef::Path(path) => path.display().to_string(),
            DocumentRef::Memory(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }
}

/// An open document that can rasterize its pages.
///
/// Render calls arrive concurrently from the render pool, for distinct or identical pages,
/// and may race `release()`; a render after release should fail rather than panic.
pub trait DocumentHandle: Send + Sync {
    /// Total number of pages. Fixed for the lifetime of the handle.
    fn page_count(&self) -> u32;

    /// Natural width of a page (1-based index), if known. Used for fit-width scaling.
    fn page_width(&self, _index: u32) -> Option<f64> {
        None
    }

    /// Rasterize a page (1-based index) at the given scale. Called from worker threads.
    fn render_page(&self, index: u32, scale: f64) -> Result<PageArtifact, RenderError>;

    /// Free every resource held by the document. Idempotent.
    fn release(&self);
}

/// Opens documents into handles.
pub trait DocumentSource {
    /// Acquire a handle, failing with `ViewerError::DocumentOpenError`.
    fn open(&self, reference: &DocumentRef) -> ViewerResult<Arc<dyn DocumentHandle>>;
}
