//! Per-page slot state and the registry that owns it.
//!
//! Slots change state only through [`SlotRegistry::transition`], which checks the current
//! state against an allowed set. That check is what keeps a page from being rendered twice
//! at once.

use crate::document::PageArtifact;
use crate::error::{RenderError, ViewerError, ViewerResult};
use crate::region::DisplayRegion;

/// Render state of a page slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    Empty,
    Rendering,
    Rendered,
    Failed,
}

/// Identifies a single render task. A completion only lands if its ticket still matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTicket(pub(crate) u64);

/// Slot state together with the payload that state owns.
#[derive(Debug)]
pub enum SlotPhase {
    Empty,
    Rendering(RenderTicket),
    Rendered(PageArtifact),
    Failed(RenderError),
}

impl SlotPhase {
    pub fn state(&self) -> SlotState {
        match self {
            SlotPhase::Empty => SlotState::Empty,
            SlotPhase::Rendering(_) => SlotState::Rendering,
            SlotPhase::Rendered(_) => SlotState::Rendered,
            SlotPhase::Failed(_) => SlotState::Failed,
        }
    }
}

/// One page of the document.
#[derive(Debug)]
pub struct PageSlot {
    index: u32,
    phase: SlotPhase,
    region: DisplayRegion,
}

impl PageSlot {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn state(&self) -> SlotState {
        self.phase.state()
    }

    /// Rendered artifact, present only while `Rendered`.
    pub fn artifact(&self) -> Option<&PageArtifact> {
        match &self.phase {
            SlotPhase::Rendered(artifact) => Some(artifact),
            _ => None,
        }
    }

    /// Ticket of the in-flight render, present only while `Rendering`.
    pub fn pending_ticket(&self) -> Option<RenderTicket> {
        match self.phase {
            SlotPhase::Rendering(ticket) => Some(ticket),
            _ => None,
        }
    }

    /// Recorded failure, present only while `Failed`.
    pub fn failure(&self) -> Option<&RenderError> {
        match &self.phase {
            SlotPhase::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn region(&self) -> &DisplayRegion {
        &self.region
    }
}

/// Owns every page slot of a session, indexed 1..=page_count.
#[derive(Debug)]
pub struct SlotRegistry {
    slots: Vec<PageSlot>,
}

impl SlotRegistry {
    /// Create `page_count` empty slots, each with a fresh placeholder region.
    pub fn create_slots(page_count: u32) -> Self {
        let slots = (1..=page_count)
            .map(|index| PageSlot {
                index,
                phase: SlotPhase::Empty,
                region: DisplayRegion::new(index),
            })
            .collect();
        Self { slots }
    }

    pub fn page_count(&self) -> u32 {
        self.slots.len() as u32
    }

    fn position(&self, index: u32) -> ViewerResult<usize> {
        if index == 0 || index > self.page_count() {
            return Err(ViewerError::OutOfRange {
                index,
                page_count: self.page_count(),
            });
        }
        Ok(index as usize - 1)
    }

    pub fn get(&self, index: u32) -> ViewerResult<&PageSlot> {
        let pos = self.position(index)?;
        Ok(&self.slots[pos])
    }

    /// Move a slot from one of `from` to `to`, returning the phase it replaced.
    ///
    /// The replaced phase carries whatever payload the slot held (artifact, ticket or failure)
    /// so the caller can release it. The region is refreshed to match the new state.
    pub fn transition(
        &mut self,
        index: u32,
        from: &[SlotState],
        to: SlotPhase,
    ) -> ViewerResult<SlotPhase> {
        let pos = self.position(index)?;
        let slot = &mut self.slots[pos];

        let current = slot.state();
        if !from.contains(&current) {
            return Err(ViewerError::InvalidTransition {
                index,
                current,
                target: to.state(),
            });
        }

        match to.state() {
            SlotState::Empty | SlotState::Rendering => slot.region.show_placeholder(),
            SlotState::Rendered => slot.region.show_page(),
            SlotState::Failed => slot.region.show_error(),
        }

        Ok(std::mem::replace(&mut slot.phase, to))
    }

    /// Iterate slots in index order. Cheap to restart.
    pub fn all(&self) -> std::slice::Iter<'_, PageSlot> {
        self.slots.iter()
    }

    /// Number of slots in the given state.
    pub fn count(&self, state: SlotState) -> usize {
        self.slots.iter().filter(|s| s.state() == state).count()
    }

    /// Total bytes held by rendered artifacts.
    pub fn retained_bytes(&self) -> usize {
        self.slots
            .iter()
            .filter_map(PageSlot::artifact)
            .map(PageArtifact::size_bytes)
            .sum()
    }
}
