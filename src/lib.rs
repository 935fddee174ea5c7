//! pageview_core - Viewport-driven incremental page renderer.
//!
//! This crate provides:
//! - Per-page slots with checked state transitions (Empty/Rendering/Rendered/Failed)
//! - Visibility-driven rendering of the visible window plus a prefetch radius
//! - Rasterization on a dedicated rayon pool, applied on the owner thread
//! - Distance-based eviction that keeps memory bounded while scrolling
//! - Whole-document transform options with page-range validation
//!
//! Usage:
//! ```ignore
//! use pageview_core::{DocumentRef, DocumentSession, ViewerConfig};
//!
//! let mut session = DocumentSession::new(ViewerConfig::default())?;
//! session.open(&pdf_source, DocumentRef::path("report.pdf"), Box::new(observer))?;
//!
//! // Host event loop
//! session.on_visibility(&batch)?;
//! session.pump();
//!
//! session.close();
//! ```

mod config;
mod document;
mod error;
mod evict;
mod region;
mod render;
mod session;
mod slot;
mod transform;
mod trigger;
mod window;
#[cfg(test)]
pub(crate) mod test_utils;

pub use config::ViewerConfig;
pub use document::{DocumentHandle, DocumentRef, DocumentSource, PageArtifact};
pub use error::{RenderError, ViewerError, ViewerResult};
pub use evict::{EvictionPolicy, EvictionStats};
pub use region::{DisplayRegion, RegionContent};
pub use render::{CompletionOutcome, RenderCompletion, RenderPriority, RenderScheduler, RenderStats};
pub use session::{DocumentSession, SessionState, SessionStats};
pub use slot::{PageSlot, RenderTicket, SlotPhase, SlotRegistry, SlotState};
pub use transform::{
    run_transform, DocumentMetadata, DocumentTransform, LockOptions, OfficeTarget, PageInstruction,
    PageNumberFormat, PageNumberOptions, PageNumberPosition, PageRange, RemoveOptions, SplitMethod,
    TransformError, TransformInput, TransformOptions, TransformOutput, WatermarkOptions,
};
pub use trigger::{CycleReport, ObservationId, ViewportObserver, ViewportTrigger, VisibilityChange};
pub use window::{evict_candidates, retain_order, should_evict, should_retain, VisibleWindow};
