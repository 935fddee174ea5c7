//! Turns viewport visibility batches into render and eviction requests.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::ViewerResult;
use crate::evict::EvictionPolicy;
use crate::region::DisplayRegion;
use crate::render::{RenderPriority, RenderScheduler};
use crate::slot::SlotRegistry;
use crate::window::{evict_candidates, retain_order, VisibleWindow};

/// Handle returned by the observer for one registered region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservationId(pub u64);

/// One entry of a visibility batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityChange {
    pub observation: ObservationId,
    pub visible: bool,
}

/// Host primitive that watches regions for visibility.
///
/// Batches are delivered by the host to `DocumentSession::on_visibility`.
pub trait ViewportObserver {
    fn register(&mut self, region: &DisplayRegion) -> ObservationId;
    fn unregister(&mut self, id: ObservationId);
}

/// Outcome of one trigger cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub window: VisibleWindow,
    /// Pages passed to the scheduler, nearest first.
    pub requested: Vec<u32>,
    /// Pages whose artifacts were released.
    pub evicted: Vec<u32>,
}

/// Wraps the viewport observer and drives scheduling from its batches.
pub struct ViewportTrigger {
    observer: Box<dyn ViewportObserver>,
    observations: HashMap<ObservationId, u32>,
    visible: BTreeSet<u32>,
    window: Option<VisibleWindow>,
    prefetch_radius: u32,
    eviction_distance: u32,
    page_count: u32,
    active: bool,
}

impl ViewportTrigger {
    /// Register every slot's region with the observer.
    pub fn start(
        mut observer: Box<dyn ViewportObserver>,
        registry: &SlotRegistry,
        prefetch_radius: u32,
        eviction_distance: u32,
    ) -> Self {
        let observations = registry
            .all()
            .map(|slot| (observer.register(slot.region()), slot.index()))
            .collect();

        Self {
            observer,
            observations,
            visible: BTreeSet::new(),
            window: None,
            prefetch_radius,
            eviction_distance,
            page_count: registry.page_count(),
            active: true,
        }
    }

    /// Window computed by the most recent non-empty batch.
    pub fn window(&self) -> Option<VisibleWindow> {
        self.window
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Process one visibility batch.
    ///
    /// Returns `None` when stopped or when nothing is visible after the batch.
    pub fn cycle(
        &mut self,
        batch: &[VisibilityChange],
        registry: &mut SlotRegistry,
        scheduler: &mut RenderScheduler,
        eviction: &mut EvictionPolicy,
    ) -> ViewerResult<Option<CycleReport>> {
        if !self.active {
            return Ok(None);
        }

        for change in batch {
            let Some(&index) = self.observations.get(&change.observation) else {
                debug!(observation = change.observation.0, "visibility change for unknown region");
                continue;
            };
            if change.visible {
                self.visible.insert(index);
            } else {
                self.visible.remove(&index);
            }
        }

        let Some(window) = VisibleWindow::from_visible(self.visible.iter().copied()) else {
            return Ok(None);
        };
        self.window = Some(window);

        scheduler.begin_cycle();
        let requested = retain_order(&window, self.prefetch_radius, self.page_count);
        for &index in &requested {
            let priority = if window.contains(index) {
                RenderPriority::Visible
            } else {
                RenderPriority::Prefetch
            };
            scheduler.ensure_rendered(registry, index, priority)?;
        }

        let mut evicted = Vec::new();
        for index in evict_candidates(&window, self.eviction_distance, self.page_count) {
            if eviction.evict(registry, index, Some(&window))? {
                evicted.push(index);
            }
        }

        debug!(
            first = window.first(),
            last = window.last(),
            requested = requested.len(),
            evicted = evicted.len(),
            "viewport cycle"
        );
        Ok(Some(CycleReport {
            window,
            requested,
            evicted,
        }))
    }

    /// Unregister every region. Later batches are ignored. Idempotent.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        for (id, _) in self.observations.drain() {
            self.observer.unregister(id);
        }
        self.visible.clear();
    }
}
