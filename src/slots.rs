//! Slot resolution: picks the bookable time button closest to the requested time.
//
// Reservation pages render a short row of time buttons (usually seven) centred on the
// requested time. The search starts at the pivot button and widens one step at a time,
// visiting first the side the pivot label says the requested time lies on.

use crate::driver::ElementRef;
use crate::time_parser::{self, TimeOfDay};
use log::debug;
use serde::Serialize;

/// Position of the middle button in a seven-button row
pub const DEFAULT_PIVOT_INDEX: usize = 3;

/// Snapshot of one time button
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotDescriptor {
    pub label: String,
    pub time: Option<TimeOfDay>,
    pub available: bool,
    pub dom_index: usize,
    #[serde(skip)]
    pub element: Option<ElementRef>,
}

impl SlotDescriptor {
    /// Build a descriptor from the raw button text; unparsable text leaves `time` empty
    pub fn new(label: impl Into<String>, available: bool, dom_index: usize) -> Self {
        let label = label.into();
        let time = time_parser::parse(&label).ok();
        Self { label, time, available, dom_index, element: None }
    }

    pub fn with_element(mut self, element: ElementRef) -> Self {
        self.element = Some(element);
        self
    }

    fn bookable_time(&self) -> Option<TimeOfDay> {
        if self.available { self.time } else { None }
    }
}

/// Result of resolving a requested time against a slot row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSelection {
    Exact(SlotDescriptor),
    Alternatives { left: Option<SlotDescriptor>, right: Option<SlotDescriptor> },
    NoAvailability,
}

impl SlotSelection {
    /// The alternative nearer to `requested`; the earlier one wins a tie
    pub fn closest_alternative(&self, requested: TimeOfDay) -> Option<&SlotDescriptor> {
        let SlotSelection::Alternatives { left, right } = self else {
            return None;
        };
        let distance = |slot: &SlotDescriptor| {
            slot.time.map_or(u32::MAX, |t| time_parser::difference_minutes(t, requested))
        };
        match (left, right) {
            (Some(l), Some(r)) if distance(r) < distance(l) => Some(r),
            (Some(l), _) => Some(l),
            (None, r) => r.as_ref(),
        }
    }
}

/// Indices to visit, nearest to the pivot first.
///
/// The window never reaches further from the pivot than the pivot is from the first slot.
/// An out-of-range pivot falls back to plain ascending order.
pub fn traversal_order(len: usize, pivot: usize, pivot_later_than_requested: bool) -> Vec<usize> {
    if pivot >= len {
        return (0..len).collect();
    }

    let mut order = vec![pivot];
    for radius in 1..=pivot {
        let below = pivot - radius;
        let above = pivot + radius;
        let (first, second) = if pivot_later_than_requested {
            (Some(below), Some(above))
        } else {
            (Some(above), Some(below))
        };
        order.extend(first.into_iter().chain(second).filter(|&i| i < len));
    }
    order
}

/// Resolve `requested` against `slots`, searching outward from `pivot`
pub fn select_slot(slots: &[SlotDescriptor], requested: TimeOfDay, pivot: usize) -> SlotSelection {
    if slots.is_empty() {
        return SlotSelection::NoAvailability;
    }

    let base_time = slots.get(pivot).and_then(|slot| slot.time);
    let pivot_later = base_time.is_some_and(|base| base > requested);
    let order = traversal_order(slots.len(), pivot, pivot_later);
    debug!("Slot traversal order for {}: {:?}", requested, order);

    let mut left: Option<&SlotDescriptor> = None;
    let mut right: Option<&SlotDescriptor> = None;

    for idx in order {
        let slot = &slots[idx];
        let Some(time) = slot.bookable_time() else {
            debug!("Skipping slot {} ('{}'): not bookable", idx, slot.label);
            continue;
        };

        if time == requested {
            debug!("Exact requested time {} found at slot {}", requested, idx);
            return SlotSelection::Exact(slot.clone());
        } else if time < requested && left.is_none() {
            left = Some(slot);
        } else if time > requested && right.is_none() {
            right = Some(slot);
        }

        if left.is_some() && right.is_some() {
            break;
        }
    }

    if left.is_none() && right.is_none() {
        SlotSelection::NoAvailability
    } else {
        SlotSelection::Alternatives { left: left.cloned(), right: right.cloned() }
    }
}
