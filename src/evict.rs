//! Distance-based release of rendered pages.

use tracing::debug;

use crate::error::ViewerResult;
use crate::slot::{SlotPhase, SlotRegistry, SlotState};
use crate::window::VisibleWindow;

/// Eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionStats {
    pub evicted: u64,
    pub bytes_released: u64,
}

/// Releases artifacts of pages that scrolled out of range.
///
/// The only component allowed to move a slot from `Rendered` back to `Empty`.
#[derive(Debug, Default)]
pub struct EvictionPolicy {
    stats: EvictionStats,
}

impl EvictionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict a rendered page unless it lies inside `window`.
    ///
    /// Returns whether an artifact was released. `Empty`, `Rendering` and `Failed`
    /// slots are left alone.
    pub fn evict(
        &mut self,
        registry: &mut SlotRegistry,
        index: u32,
        window: Option<&VisibleWindow>,
    ) -> ViewerResult<bool> {
        if window.is_some_and(|w| w.contains(index)) {
            return Ok(false);
        }
        self.release(registry, index)
    }

    /// Evict a rendered page regardless of visibility. Used during teardown.
    pub fn evict_for_teardown(&mut self, registry: &mut SlotRegistry, index: u32) -> ViewerResult<bool> {
        self.release(registry, index)
    }

    fn release(&mut self, registry: &mut SlotRegistry, index: u32) -> ViewerResult<bool> {
        if registry.get(index)?.state() != SlotState::Rendered {
            return Ok(false);
        }

        let previous = registry.transition(index, &[SlotState::Rendered], SlotPhase::Empty)?;
        if let SlotPhase::Rendered(artifact) = previous {
            let bytes = artifact.size_bytes();
            drop(artifact);
            self.stats.evicted += 1;
            self.stats.bytes_released += bytes as u64;
            debug!(page = index, bytes, "evicted page");
        }
        Ok(true)
    }

    pub fn stats(&self) -> EvictionStats {
        self.stats
    }
}
