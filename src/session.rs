//! Document session lifecycle: open, drive, close.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ViewerConfig;
use crate::document::{DocumentHandle, DocumentRef, DocumentSource};
use crate::error::{ViewerError, ViewerResult};
use crate::evict::EvictionPolicy;
use crate::render::RenderScheduler;
use crate::slot::{PageSlot, SlotRegistry, SlotState};
use crate::trigger::{CycleReport, ViewportObserver, ViewportTrigger, VisibilityChange};
use crate::window::VisibleWindow;

/// Lifecycle state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Open,
    Closed,
}

/// Combined render, eviction and retention statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub rendered: u64,
    pub failed: u64,
    pub discarded: u64,
    pub evicted: u64,
    pub bytes_released: u64,
    pub in_flight: usize,
    pub queued: usize,
    pub retained_pages: usize,
    pub retained_bytes: usize,
}

/// Everything that exists once a document is open.
struct OpenDocument {
    reference: DocumentRef,
    handle: Arc<dyn DocumentHandle>,
    registry: SlotRegistry,
    scheduler: RenderScheduler,
    eviction: EvictionPolicy,
    trigger: ViewportTrigger,
}

/// One open document shown in a scrollable viewer.
///
/// All methods run on the owning thread; rasterization happens on the render pool and is
/// applied by [`pump`](Self::pump) / [`pump_timeout`](Self::pump_timeout).
pub struct DocumentSession {
    config: ViewerConfig,
    state: SessionState,
    document: Option<OpenDocument>,
}

impl DocumentSession {
    pub fn new(config: ViewerConfig) -> ViewerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: SessionState::Uninitialized,
            document: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Open a document and start observing its page regions.
    ///
    /// On failure the session stays `Uninitialized`.
    pub fn open(
        &mut self,
        source: &dyn DocumentSource,
        reference: DocumentRef,
        observer: Box<dyn ViewportObserver>,
    ) -> ViewerResult<()> {
        if self.state != SessionState::Uninitialized {
            return Err(ViewerError::SessionState(self.state));
        }

        if let DocumentRef::Path(path) = &reference {
            if !path.exists() {
                return Err(ViewerError::DocumentOpenError(format!(
                    "Path does not exist: {}",
                    path.display()
                )));
            }
        }

        let handle = source.open(&reference)?;
        let page_count = handle.page_count();

        let scheduler = match RenderScheduler::new(Arc::clone(&handle), &self.config) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                handle.release();
                return Err(e);
            }
        };
        let registry = SlotRegistry::create_slots(page_count);
        let trigger = ViewportTrigger::start(
            observer,
            &registry,
            self.config.prefetch_radius,
            self.config.eviction_distance,
        );

        info!(document = %reference.describe(), page_count, "document opened");
        self.document = Some(OpenDocument {
            reference,
            handle,
            registry,
            scheduler,
            eviction: EvictionPolicy::new(),
            trigger,
        });
        self.state = SessionState::Open;
        Ok(())
    }

    /// Page count of the open document (0 before open).
    pub fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.registry.page_count())
            .unwrap_or(0)
    }

    /// Feed one visibility batch from the viewport observer.
    ///
    /// Ignored (returns `Ok(None)`) unless the session is open.
    pub fn on_visibility(&mut self, batch: &[VisibilityChange]) -> ViewerResult<Option<CycleReport>> {
        if self.state != SessionState::Open {
            return Ok(None);
        }
        let Some(doc) = self.document.as_mut() else {
            return Ok(None);
        };
        doc.trigger.cycle(
            batch,
            &mut doc.registry,
            &mut doc.scheduler,
            &mut doc.eviction,
        )
    }

    /// Apply render completions that have already arrived. Never blocks.
    pub fn pump(&mut self) -> usize {
        let Some(doc) = self.document.as_mut() else {
            return 0;
        };
        let window = doc.trigger.window();
        doc.scheduler.pump(&mut doc.registry, window.as_ref())
    }

    /// Wait up to `timeout` for a render to complete, then apply all arrived completions.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        let Some(doc) = self.document.as_mut() else {
            return 0;
        };
        let window = doc.trigger.window();
        doc.scheduler
            .pump_timeout(&mut doc.registry, window.as_ref(), timeout)
    }

    /// Whether renders are still running or waiting for capacity.
    pub fn is_busy(&self) -> bool {
        self.document
            .as_ref()
            .is_some_and(|doc| doc.scheduler.in_flight() > 0 || doc.scheduler.queued() > 0)
    }

    pub fn slot(&self, index: u32) -> ViewerResult<&PageSlot> {
        match &self.document {
            Some(doc) => doc.registry.get(index),
            None => Err(ViewerError::OutOfRange {
                index,
                page_count: 0,
            }),
        }
    }

    /// Slots in index order (empty before open).
    pub fn slots(&self) -> impl Iterator<Item = &PageSlot> + '_ {
        self.document.iter().flat_map(|doc| doc.registry.all())
    }

    /// Current visible window, if any page has been reported visible.
    pub fn window(&self) -> Option<VisibleWindow> {
        self.document.as_ref().and_then(|doc| doc.trigger.window())
    }

    pub fn stats(&self) -> SessionStats {
        let Some(doc) = &self.document else {
            return SessionStats::default();
        };
        let render = doc.scheduler.stats();
        let eviction = doc.eviction.stats();
        SessionStats {
            rendered: render.rendered,
            failed: render.failed,
            discarded: render.discarded,
            evicted: eviction.evicted,
            bytes_released: eviction.bytes_released,
            in_flight: doc.scheduler.in_flight(),
            queued: doc.scheduler.queued(),
            retained_pages: doc.registry.count(SlotState::Rendered),
            retained_bytes: doc.registry.retained_bytes(),
        }
    }

    /// Tear the session down. Idempotent and infallible.
    ///
    /// Stops observation, supersedes in-flight renders, evicts every rendered page and
    /// releases the document handle last. Renders still running afterwards are discarded
    /// when they complete.
    pub fn close(&mut self) {
        match self.state {
            SessionState::Closed => return,
            SessionState::Uninitialized => {
                self.state = SessionState::Closed;
                return;
            }
            SessionState::Open => {}
        }
        self.state = SessionState::Closed;

        let Some(doc) = self.document.as_mut() else {
            return;
        };
        doc.trigger.stop();
        doc.scheduler.shutdown();

        let snapshot: Vec<(u32, SlotState)> = doc
            .registry
            .all()
            .map(|slot| (slot.index(), slot.state()))
            .collect();
        for (index, state) in snapshot {
            let result = match state {
                SlotState::Rendering | SlotState::Failed => {
                    doc.scheduler.supersede(&mut doc.registry, index)
                }
                SlotState::Rendered => doc.eviction.evict_for_teardown(&mut doc.registry, index),
                SlotState::Empty => Ok(false),
            };
            if let Err(e) = result {
                warn!(page = index, error = %e, "slot teardown failed");
            }
        }

        // Settle anything that already finished; later arrivals are dropped the same way.
        let discarded = doc.scheduler.pump(&mut doc.registry, None);
        debug!(discarded, in_flight = doc.scheduler.in_flight(), "renders settled on close");

        doc.handle.release();
        info!(document = %doc.reference.describe(), "document closed");
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.close();
    }
}
