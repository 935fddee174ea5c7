//! Shared fakes for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::document::{DocumentHandle, DocumentRef, DocumentSource, PageArtifact};
use crate::error::{RenderError, ViewerError, ViewerResult};
use crate::region::DisplayRegion;
use crate::session::DocumentSession;
use crate::trigger::{ObservationId, ViewportObserver, VisibilityChange};

/// Install a test-friendly tracing subscriber. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Pump a session until no render is running or queued (10 s limit).
pub fn settle(session: &mut DocumentSession) {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while session.is_busy() && std::time::Instant::now() < deadline {
        session.pump_timeout(Duration::from_millis(50));
    }
}

/// In-memory document producing tiny solid artifacts.
///
/// `gated()` makes every render block until [`open_gate`](Self::open_gate) is called,
/// which lets tests observe slots in `Rendering`.
pub struct FakeDocument {
    page_count: u32,
    page_width: Option<f64>,
    failing: HashSet<u32>,
    gate: Mutex<bool>,
    gate_cv: Condvar,
    calls: Mutex<Vec<u32>>,
    released: AtomicBool,
    release_count: AtomicUsize,
}

impl FakeDocument {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            page_width: None,
            failing: HashSet::new(),
            gate: Mutex::new(true),
            gate_cv: Condvar::new(),
            calls: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
            release_count: AtomicUsize::new(0),
        }
    }

    pub fn gated(self) -> Self {
        *self.gate.lock() = false;
        self
    }

    pub fn failing(mut self, pages: &[u32]) -> Self {
        self.failing.extend(pages.iter().copied());
        self
    }

    pub fn with_page_width(mut self, width: f64) -> Self {
        self.page_width = Some(width);
        self
    }

    pub fn open_gate(&self) {
        *self.gate.lock() = true;
        self.gate_cv.notify_all();
    }

    /// How many times a page was handed to `render_page`.
    pub fn render_calls(&self, page: u32) -> usize {
        self.calls.lock().iter().filter(|&&p| p == page).count()
    }

    /// Pages in the order `render_page` was entered.
    pub fn render_order(&self) -> Vec<u32> {
        self.calls.lock().clone()
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }
}

impl DocumentHandle for FakeDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn page_width(&self, _index: u32) -> Option<f64> {
        self.page_width
    }

    fn render_page(&self, index: u32, scale: f64) -> Result<PageArtifact, RenderError> {
        self.calls.lock().push(index);

        {
            let mut open = self.gate.lock();
            while !*open {
                self.gate_cv.wait(&mut open);
            }
        }

        if self.released.load(Ordering::SeqCst) {
            return Err(RenderError::new(index, "document released"));
        }
        if self.failing.contains(&index) {
            return Err(RenderError::new(index, "corrupt page stream"));
        }
        Ok(PageArtifact::new(vec![0xff; 4 * 8 * 8], 8, 8, scale))
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.release_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Source handing out a shared [`FakeDocument`], or failing every open.
pub struct FakeSource {
    document: Option<Arc<FakeDocument>>,
}

impl FakeSource {
    pub fn new(document: Arc<FakeDocument>) -> Self {
        Self {
            document: Some(document),
        }
    }

    pub fn failing() -> Self {
        Self { document: None }
    }
}

impl DocumentSource for FakeSource {
    fn open(&self, reference: &DocumentRef) -> ViewerResult<Arc<dyn DocumentHandle>> {
        match &self.document {
            Some(doc) => {
                let handle: Arc<dyn DocumentHandle> = doc.clone();
                Ok(handle)
            }
            None => Err(ViewerError::DocumentOpenError(format!(
                "not a PDF: {}",
                reference.describe()
            ))),
        }
    }
}

#[derive(Default)]
struct ObserverState {
    next_id: u64,
    by_page: HashMap<u32, ObservationId>,
}

/// Observer recording registrations. Clones share state, so a test keeps one clone
/// while the session owns another.
#[derive(Clone, Default)]
pub struct FakeObserver {
    state: Arc<Mutex<ObserverState>>,
}

impl FakeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered_count(&self) -> usize {
        self.state.lock().by_page.len()
    }

    pub fn id_for(&self, page: u32) -> Option<ObservationId> {
        self.state.lock().by_page.get(&page).copied()
    }

    /// Batch marking `pages` visible. Unregistered pages are skipped.
    pub fn show(&self, pages: &[u32]) -> Vec<VisibilityChange> {
        self.batch(pages, true)
    }

    /// Batch marking `pages` hidden.
    pub fn hide(&self, pages: &[u32]) -> Vec<VisibilityChange> {
        self.batch(pages, false)
    }

    fn batch(&self, pages: &[u32], visible: bool) -> Vec<VisibilityChange> {
        pages
            .iter()
            .filter_map(|&page| self.id_for(page))
            .map(|observation| VisibilityChange {
                observation,
                visible,
            })
            .collect()
    }
}

impl ViewportObserver for FakeObserver {
    fn register(&mut self, region: &DisplayRegion) -> ObservationId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = ObservationId(state.next_id);
        state.by_page.insert(region.index(), id);
        id
    }

    fn unregister(&mut self, id: ObservationId) {
        self.state.lock().by_page.retain(|_, v| *v != id);
    }
}
