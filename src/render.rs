//! Render scheduling on a worker pool with owner-thread completion.
//!
//! Workers only rasterize. Every result travels back over a channel and is applied by the
//! owner through a ticket-guarded transition, so a result whose slot has moved on is dropped
//! instead of stored.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::config::ViewerConfig;
use crate::document::{DocumentHandle, PageArtifact};
use crate::error::{RenderError, ViewerError, ViewerResult};
use crate::slot::{RenderTicket, SlotPhase, SlotRegistry, SlotState};
use crate::window::{should_evict, VisibleWindow};

/// Check if per-render timing logs are enabled via env var.
fn render_timing_enabled() -> bool {
    std::env::var("PAGEVIEW_RENDER_TIMING").is_ok_and(|v| v == "1" || v == "true")
}

/// How urgently a page is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPriority {
    /// Inside the visible window. Never held back by the concurrency cap.
    Visible,
    /// Within the prefetch radius.
    Prefetch,
}

/// Result of one render task, posted from a worker to the owner.
#[derive(Debug)]
pub struct RenderCompletion {
    pub index: u32,
    pub ticket: RenderTicket,
    pub result: Result<PageArtifact, RenderError>,
    pub elapsed: Duration,
}

/// What happened when a completion was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Rendered,
    Failed,
    /// Slot moved on, or the page is already out of range; the result was dropped.
    Discarded,
}

/// Render counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub started: u64,
    pub rendered: u64,
    pub failed: u64,
    pub discarded: u64,
}

/// Starts at most one render per page and applies results.
///
/// The only component allowed to move a slot into `Rendering`, `Rendered` or `Failed`.
pub struct RenderScheduler {
    handle: Arc<dyn DocumentHandle>,
    config: ViewerConfig,
    /// Dedicated render pool so rasterization never runs on the owner thread.
    pool: rayon::ThreadPool,
    completions_tx: Sender<RenderCompletion>,
    completions_rx: Receiver<RenderCompletion>,
    next_ticket: u64,
    /// Tasks whose completion has not been applied yet, including superseded ones.
    outstanding: HashSet<RenderTicket>,
    /// Prefetch requests waiting for capacity, nearest first.
    queue: VecDeque<u32>,
    /// Cleared on shutdown; no new tasks start afterwards.
    accepting: bool,
    stats: RenderStats,
    /// Whether per-render timing is enabled (cached from PAGEVIEW_RENDER_TIMING env var).
    render_timing: bool,
}

impl RenderScheduler {
    pub fn new(handle: Arc<dyn DocumentHandle>, config: &ViewerConfig) -> ViewerResult<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|idx| format!("page-render-{}", idx));
        if config.render_threads > 0 {
            builder = builder.num_threads(config.render_threads);
        }
        let pool = builder.build()?;
        let (completions_tx, completions_rx) = crossbeam_channel::unbounded();

        Ok(Self {
            handle,
            config: config.clone(),
            pool,
            completions_tx,
            completions_rx,
            next_ticket: 0,
            outstanding: HashSet::new(),
            queue: VecDeque::new(),
            accepting: true,
            stats: RenderStats::default(),
            render_timing: render_timing_enabled(),
        })
    }

    /// Drop queued prefetch requests. Called at the start of every trigger cycle.
    pub fn begin_cycle(&mut self) {
        self.queue.clear();
    }

    fn has_capacity(&self) -> bool {
        self.config
            .max_concurrent_renders
            .map_or(true, |max| self.outstanding.len() < max)
    }

    /// Make sure a page is rendered or being rendered.
    ///
    /// No-op for `Rendered` and `Rendering` slots. `Failed` slots are retried.
    pub fn ensure_rendered(
        &mut self,
        registry: &mut SlotRegistry,
        index: u32,
        priority: RenderPriority,
    ) -> ViewerResult<()> {
        match registry.get(index)?.state() {
            SlotState::Rendered | SlotState::Rendering => return Ok(()),
            SlotState::Empty | SlotState::Failed => {}
        }
        if !self.accepting || self.queue.contains(&index) {
            return Ok(());
        }

        if priority == RenderPriority::Prefetch && !self.has_capacity() {
            self.queue.push_back(index);
            return Ok(());
        }
        self.start(registry, index)
    }

    fn start(&mut self, registry: &mut SlotRegistry, index: u32) -> ViewerResult<()> {
        let ticket = RenderTicket(self.next_ticket + 1);

        match registry.transition(
            index,
            &[SlotState::Empty, SlotState::Failed],
            SlotPhase::Rendering(ticket),
        ) {
            Ok(_) => {}
            // Another request already claimed this page
            Err(ViewerError::InvalidTransition { .. }) => return Ok(()),
            Err(e) => return Err(e),
        }

        self.next_ticket = ticket.0;
        self.outstanding.insert(ticket);
        self.stats.started += 1;
        debug!(page = index, ticket = ticket.0, "render started");

        let handle = Arc::clone(&self.handle);
        let config = self.config.clone();
        let tx = self.completions_tx.clone();
        self.pool.spawn(move || {
            let t0 = Instant::now();
            let scale = config.effective_scale(handle.page_width(index));
            let result = handle.render_page(index, scale);
            // The owner may be gone; the artifact is dropped with the message.
            let _ = tx.send(RenderCompletion {
                index,
                ticket,
                result,
                elapsed: t0.elapsed(),
            });
        });
        Ok(())
    }

    /// Return a `Rendering` or `Failed` slot to `Empty`.
    ///
    /// A superseded render keeps running; its completion no longer matches and is discarded.
    pub fn supersede(&mut self, registry: &mut SlotRegistry, index: u32) -> ViewerResult<bool> {
        match registry.transition(
            index,
            &[SlotState::Rendering, SlotState::Failed],
            SlotPhase::Empty,
        ) {
            Ok(SlotPhase::Rendering(ticket)) => {
                debug!(page = index, ticket = ticket.0, "render superseded");
                Ok(true)
            }
            Ok(_) => Ok(true),
            Err(ViewerError::InvalidTransition { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Stop accepting work. In-flight tasks finish and are discarded when pumped.
    pub fn shutdown(&mut self) {
        self.accepting = false;
        self.queue.clear();
    }

    /// Apply one completion on the owner thread.
    pub fn apply_completion(
        &mut self,
        registry: &mut SlotRegistry,
        completion: RenderCompletion,
        window: Option<&VisibleWindow>,
    ) -> CompletionOutcome {
        let RenderCompletion {
            index,
            ticket,
            result,
            elapsed,
        } = completion;
        self.outstanding.remove(&ticket);

        if self.render_timing {
            debug!(page = index, elapsed = ?elapsed, ok = result.is_ok(), "render timing");
        }

        let current = registry.get(index).ok().and_then(|slot| slot.pending_ticket());
        let outcome = if current != Some(ticket) {
            debug!(page = index, ticket = ticket.0, "stale render discarded");
            CompletionOutcome::Discarded
        } else {
            match result {
                Ok(artifact) => {
                    let out_of_range = window
                        .is_some_and(|w| should_evict(index, w, self.config.eviction_distance));
                    if out_of_range {
                        debug!(page = index, bytes = artifact.size_bytes(), "render no longer needed, discarded");
                        drop(artifact);
                        Self::finish(registry, index, SlotPhase::Empty);
                        CompletionOutcome::Discarded
                    } else {
                        debug!(page = index, bytes = artifact.size_bytes(), "render completed");
                        Self::finish(registry, index, SlotPhase::Rendered(artifact));
                        CompletionOutcome::Rendered
                    }
                }
                Err(err) => {
                    warn!(page = index, error = %err, "page render failed");
                    Self::finish(registry, index, SlotPhase::Failed(err));
                    CompletionOutcome::Failed
                }
            }
        };

        match outcome {
            CompletionOutcome::Rendered => self.stats.rendered += 1,
            CompletionOutcome::Failed => self.stats.failed += 1,
            CompletionOutcome::Discarded => self.stats.discarded += 1,
        }

        self.drain_queue(registry);
        outcome
    }

    fn finish(registry: &mut SlotRegistry, index: u32, phase: SlotPhase) {
        // Ticket was matched above, so the slot is Rendering.
        if let Err(e) = registry.transition(index, &[SlotState::Rendering], phase) {
            warn!(page = index, error = %e, "render completion rejected");
        }
    }

    /// Start queued prefetch requests while capacity allows.
    fn drain_queue(&mut self, registry: &mut SlotRegistry) {
        while self.accepting && self.has_capacity() {
            let Some(index) = self.queue.pop_front() else {
                break;
            };
            let eligible = registry
                .get(index)
                .map(|slot| matches!(slot.state(), SlotState::Empty | SlotState::Failed))
                .unwrap_or(false);
            if eligible {
                if let Err(e) = self.start(registry, index) {
                    warn!(page = index, error = %e, "queued render could not start");
                }
            }
        }
    }

    /// Apply every completion that has already arrived. Returns how many were applied.
    pub fn pump(&mut self, registry: &mut SlotRegistry, window: Option<&VisibleWindow>) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply_completion(registry, completion, window);
            applied += 1;
        }
        applied
    }

    /// Wait up to `timeout` for a completion, then apply everything that has arrived.
    pub fn pump_timeout(
        &mut self,
        registry: &mut SlotRegistry,
        window: Option<&VisibleWindow>,
        timeout: Duration,
    ) -> usize {
        if self.outstanding.is_empty() {
            return self.pump(registry, window);
        }
        match self.completions_rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.apply_completion(registry, completion, window);
                1 + self.pump(registry, window)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Renders started whose completion has not been applied yet.
    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeDocument;

    fn scheduler_for(doc: &Arc<FakeDocument>, config: ViewerConfig) -> RenderScheduler {
        let handle: Arc<dyn DocumentHandle> = doc.clone();
        RenderScheduler::new(handle, &config).unwrap()
    }

    fn settle(scheduler: &mut RenderScheduler, registry: &mut SlotRegistry, window: Option<&VisibleWindow>) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while (scheduler.in_flight() > 0 || scheduler.queued() > 0) && Instant::now() < deadline {
            scheduler.pump_timeout(registry, window, Duration::from_millis(50));
        }
    }

    #[test]
    fn test_render_single_page() {
        let doc = Arc::new(FakeDocument::new(3));
        let mut registry = SlotRegistry::create_slots(3);
        let mut scheduler = scheduler_for(&doc, ViewerConfig::default());

        scheduler
            .ensure_rendered(&mut registry, 2, RenderPriority::Visible)
            .unwrap();
        assert_eq!(registry.get(2).unwrap().state(), SlotState::Rendering);

        settle(&mut scheduler, &mut registry, None);

        let slot = registry.get(2).unwrap();
        assert_eq!(slot.state(), SlotState::Rendered);
        assert_eq!(slot.artifact().map(|a| a.scale), Some(1.2));
        assert_eq!(doc.render_calls(2), 1);
        assert_eq!(scheduler.stats().rendered, 1);
    }

    #[test]
    fn test_at_most_one_render_per_page() {
        let doc = Arc::new(FakeDocument::new(4).gated());
        let mut registry = SlotRegistry::create_slots(4);
        let mut scheduler = scheduler_for(&doc, ViewerConfig::default());

        for _ in 0..5 {
            scheduler
                .ensure_rendered(&mut registry, 3, RenderPriority::Visible)
                .unwrap();
        }
        assert_eq!(scheduler.in_flight(), 1);
        assert_eq!(scheduler.stats().started, 1);

        doc.open_gate();
        settle(&mut scheduler, &mut registry, None);

        // Already rendered: still a no-op
        scheduler
            .ensure_rendered(&mut registry, 3, RenderPriority::Visible)
            .unwrap();
        assert_eq!(doc.render_calls(3), 1);
        assert_eq!(registry.get(3).unwrap().state(), SlotState::Rendered);
    }

    #[test]
    fn test_failure_recorded_without_retry() {
        let doc = Arc::new(FakeDocument::new(8).failing(&[7]));
        let mut registry = SlotRegistry::create_slots(8);
        let mut scheduler = scheduler_for(&doc, ViewerConfig::default());

        scheduler
            .ensure_rendered(&mut registry, 7, RenderPriority::Visible)
            .unwrap();
        settle(&mut scheduler, &mut registry, None);

        let slot = registry.get(7).unwrap();
        assert_eq!(slot.state(), SlotState::Failed);
        assert!(slot.failure().is_some());
        assert_eq!(doc.render_calls(7), 1);
        assert_eq!(scheduler.stats().failed, 1);

        // A fresh request retries through the same path
        scheduler
            .ensure_rendered(&mut registry, 7, RenderPriority::Visible)
            .unwrap();
        settle(&mut scheduler, &mut registry, None);
        assert_eq!(doc.render_calls(7), 2);
    }

    #[test]
    fn test_lost_claim_keeps_ticket_sequence() {
        let doc = Arc::new(FakeDocument::new(3).gated());
        let mut registry = SlotRegistry::create_slots(3);
        let mut scheduler = scheduler_for(&doc, ViewerConfig::default());

        scheduler.start(&mut registry, 1).unwrap();
        // Page 1 is already claimed; this start must not use up a ticket
        scheduler.start(&mut registry, 1).unwrap();
        scheduler.start(&mut registry, 2).unwrap();

        assert_eq!(registry.get(1).unwrap().pending_ticket(), Some(RenderTicket(1)));
        assert_eq!(registry.get(2).unwrap().pending_ticket(), Some(RenderTicket(2)));
        assert_eq!(scheduler.stats().started, 2);

        doc.open_gate();
        settle(&mut scheduler, &mut registry, None);
    }

    #[test]
    fn test_superseded_completion_discarded() {
        let doc = Arc::new(FakeDocument::new(2).gated());
        let mut registry = SlotRegistry::create_slots(2);
        let mut scheduler = scheduler_for(&doc, ViewerConfig::default());

        scheduler
            .ensure_rendered(&mut registry, 1, RenderPriority::Visible)
            .unwrap();
        assert!(scheduler.supersede(&mut registry, 1).unwrap());
        assert_eq!(registry.get(1).unwrap().state(), SlotState::Empty);

        doc.open_gate();
        settle(&mut scheduler, &mut registry, None);

        let slot = registry.get(1).unwrap();
        assert_eq!(slot.state(), SlotState::Empty);
        assert!(slot.artifact().is_none());
        assert_eq!(scheduler.stats().discarded, 1);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_far_completion_discarded() {
        let doc = Arc::new(FakeDocument::new(50).gated());
        let mut registry = SlotRegistry::create_slots(50);
        let mut scheduler = scheduler_for(&doc, ViewerConfig::default());

        scheduler
            .ensure_rendered(&mut registry, 1, RenderPriority::Visible)
            .unwrap();
        doc.open_gate();

        // The window moved to the end before the completion was applied
        let window = VisibleWindow::new(50, 50);
        settle(&mut scheduler, &mut registry, Some(&window));

        let slot = registry.get(1).unwrap();
        assert_eq!(slot.state(), SlotState::Empty);
        assert!(slot.artifact().is_none());
        assert_eq!(scheduler.stats().discarded, 1);
    }

    #[test]
    fn test_prefetch_queue_respects_cap() {
        let doc = Arc::new(FakeDocument::new(10).gated());
        let mut registry = SlotRegistry::create_slots(10);
        let config = ViewerConfig {
            max_concurrent_renders: Some(1),
            ..Default::default()
        };
        let mut scheduler = scheduler_for(&doc, config);

        scheduler
            .ensure_rendered(&mut registry, 5, RenderPriority::Visible)
            .unwrap();
        scheduler
            .ensure_rendered(&mut registry, 6, RenderPriority::Prefetch)
            .unwrap();
        scheduler
            .ensure_rendered(&mut registry, 4, RenderPriority::Prefetch)
            .unwrap();
        // Queued requests are deduplicated
        scheduler
            .ensure_rendered(&mut registry, 6, RenderPriority::Prefetch)
            .unwrap();

        assert_eq!(scheduler.in_flight(), 1);
        assert_eq!(scheduler.queued(), 2);
        assert_eq!(registry.get(6).unwrap().state(), SlotState::Empty);

        doc.open_gate();
        settle(&mut scheduler, &mut registry, None);

        assert_eq!(doc.render_order(), vec![5, 6, 4]);
        assert_eq!(registry.count(SlotState::Rendered), 3);
    }

    #[test]
    fn test_visible_bypasses_cap() {
        let doc = Arc::new(FakeDocument::new(10).gated());
        let mut registry = SlotRegistry::create_slots(10);
        let config = ViewerConfig {
            max_concurrent_renders: Some(1),
            ..Default::default()
        };
        let mut scheduler = scheduler_for(&doc, config);

        for index in [3, 4, 5] {
            scheduler
                .ensure_rendered(&mut registry, index, RenderPriority::Visible)
                .unwrap();
        }
        assert_eq!(scheduler.in_flight(), 3);
        assert_eq!(registry.count(SlotState::Rendering), 3);

        doc.open_gate();
        settle(&mut scheduler, &mut registry, None);
    }

    #[test]
    fn test_shutdown_refuses_new_work() {
        let doc = Arc::new(FakeDocument::new(3));
        let mut registry = SlotRegistry::create_slots(3);
        let mut scheduler = scheduler_for(&doc, ViewerConfig::default());

        scheduler.shutdown();
        scheduler
            .ensure_rendered(&mut registry, 1, RenderPriority::Visible)
            .unwrap();
        assert_eq!(registry.get(1).unwrap().state(), SlotState::Empty);
        assert_eq!(doc.render_calls(1), 0);
    }

    #[test]
    fn test_out_of_range_request() {
        let doc = Arc::new(FakeDocument::new(3));
        let mut registry = SlotRegistry::create_slots(3);
        let mut scheduler = scheduler_for(&doc, ViewerConfig::default());

        let result = scheduler.ensure_rendered(&mut registry, 4, RenderPriority::Visible);
        assert!(matches!(result, Err(ViewerError::OutOfRange { .. })));
    }
}
