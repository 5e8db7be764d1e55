//! Ring-buffered marker text, keyed by app-managed marker id.
//!
//! The ring keeps the markers of the last `ring_slots` frames. Frame `f`
//! writes into slot `f % ring_slots`, which is cleared when that frame
//! begins, so memory stays bounded no matter how long the process renders.
//!
//! Ids are `slot * slot_capacity + index + 1`. They are unique among live
//! markers, never zero, and get reused once their slot is recycled: a token
//! resolved after `ring_slots` more frames yields whatever the slot holds
//! at that point, or nothing.

use compact_str::CompactString;
use crashmark_types::{
    FrameCounter, InvariantError, MarkerEntry, MarkerId, MarkerSlotSnapshot,
};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{MarkerError, MarkerResolver, MonitorConfig};

#[derive(Default)]
struct MarkerTable {
    /// Frame that owns this slot, `None` until first use.
    frame: Option<FrameCounter>,
    /// Marker text in id order: entry `i` belongs to id `slot * capacity + i + 1`.
    entries: Vec<CompactString>,
}

impl MarkerTable {
    fn reset(&mut self, frame: FrameCounter) {
        self.frame = Some(frame);
        self.entries.clear();
    }
}

pub struct MarkerStore {
    ring_slots: usize,
    slot_capacity: u64,
    ring: Mutex<Vec<MarkerTable>>,
}

impl MarkerStore {
    pub fn new(ring_slots: usize, slot_capacity: u64) -> Result<Self, InvariantError> {
        if ring_slots == 0 {
            return Err(InvariantError::ZeroSize("ring_slots"));
        }
        if slot_capacity == 0 {
            return Err(InvariantError::ZeroSize("slot_capacity"));
        }
        (ring_slots as u64)
            .checked_mul(slot_capacity)
            .ok_or(InvariantError::IdSpaceOverflow {
                ring_slots: ring_slots as u64,
                slot_capacity,
            })?;

        Ok(Self {
            ring_slots,
            slot_capacity,
            ring: Mutex::new((0..ring_slots).map(|_| MarkerTable::default()).collect()),
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, InvariantError> {
        Self::new(config.ring_slots, config.slot_capacity)
    }

    pub fn ring_slots(&self) -> usize {
        self.ring_slots
    }

    pub fn slot_capacity(&self) -> u64 {
        self.slot_capacity
    }

    /// Clear the slot `frame` maps to. Text stored there by an older frame
    /// becomes unresolvable.
    pub fn reset_current_slot(&self, frame: FrameCounter) {
        let slot = frame.slot(self.ring_slots);
        let mut ring = self.ring.lock();
        let table = &mut ring[slot];
        debug!(
            frame = frame.get(),
            slot,
            dropped = table.entries.len(),
            "resetting marker slot"
        );
        table.reset(frame);
    }

    /// Store `text` for `frame` and return its id.
    ///
    /// Fails with [`MarkerError::SlotFull`] once the frame has recorded
    /// `slot_capacity` markers; nothing is stored in that case.
    pub fn record_marker(
        &self,
        frame: FrameCounter,
        text: impl Into<CompactString>,
    ) -> Result<MarkerId, MarkerError> {
        let slot = frame.slot(self.ring_slots);
        let mut ring = self.ring.lock();
        let table = &mut ring[slot];

        if table.frame != Some(frame) {
            if let Some(previous) = table.frame {
                warn!(
                    frame = frame.get(),
                    previous = previous.get(),
                    slot,
                    "marker recorded before its slot was reset; resetting now"
                );
            }
            table.reset(frame);
        }

        let count = table.entries.len() as u64;
        if count >= self.slot_capacity {
            return Err(MarkerError::SlotFull {
                slot,
                capacity: self.slot_capacity,
            });
        }

        let id = MarkerId::encode(slot as u64, count, self.slot_capacity)?;
        let text = text.into();
        trace!(frame = frame.get(), id = id.get(), text = %text, "recorded marker");
        table.entries.push(text);
        Ok(id)
    }

    /// Text currently stored under `id`, if its slot still holds it.
    pub fn resolve(&self, id: MarkerId) -> Option<CompactString> {
        let slot = id.slot(self.slot_capacity);
        if slot >= self.ring_slots as u64 {
            return None;
        }
        let index = id.index_in_slot(self.slot_capacity) as usize;
        let ring = self.ring.lock();
        ring[slot as usize].entries.get(index).cloned()
    }

    /// Number of markers currently held across the whole ring.
    pub fn live_markers(&self) -> usize {
        self.ring.lock().iter().map(|t| t.entries.len()).sum()
    }

    /// Copy of every slot that has been used, oldest frame first.
    pub fn snapshot(&self) -> Vec<MarkerSlotSnapshot> {
        let ring = self.ring.lock();
        let mut slots: Vec<MarkerSlotSnapshot> = ring
            .iter()
            .enumerate()
            .filter_map(|(slot, table)| {
                let frame = table.frame?;
                let markers = table
                    .entries
                    .iter()
                    .enumerate()
                    .filter_map(|(index, text)| {
                        let id =
                            MarkerId::encode(slot as u64, index as u64, self.slot_capacity).ok()?;
                        Some(MarkerEntry {
                            id,
                            text: text.to_string(),
                        })
                    })
                    .collect();
                Some(MarkerSlotSnapshot {
                    slot: slot as u32,
                    frame: frame.get(),
                    markers,
                })
            })
            .collect();
        drop(ring);

        slots.sort_by_key(|s| s.frame);
        slots
    }
}

impl MarkerResolver for MarkerStore {
    fn resolve_marker(&self, id: MarkerId) -> Option<CompactString> {
        let resolved = self.resolve(id);
        if resolved.is_none() {
            debug!(id = id.get(), "marker id no longer resolvable");
        }
        resolved
    }
}
