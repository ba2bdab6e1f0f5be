//! Locations, received items and the hint economy of one slot.

use std::collections::{BTreeSet, HashSet};

use multiworld_protocol::NetworkItem;

/// Per-slot progress as the room reports it.
///
/// Checked and missing locations are kept disjoint: a location moves from
/// `missing` to `checked` and never back. Received items are append-only
/// and deduplicated by `(item, location, player)`, so a replay of the full
/// inventory after a reconnect leaves the list unchanged.
///
/// The tracker knows nothing about names. Pair it with a
/// [`NameResolver`](crate::NameResolver) to render ids.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    checked: BTreeSet<i64>,
    missing: BTreeSet<i64>,
    items: Vec<NetworkItem>,
    seen: HashSet<(i64, i64, u32)>,
    hint_points: u32,
    hint_cost_percent: u32,
}

impl Tracker {
    /// Creates an empty tracker: no locations, no items, no hint points.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the location sets and hint points from a login reply.
    /// Received items are kept; the server replays them after every login
    /// and [`receive`](Self::receive) filters the repeats.
    pub fn seed(&mut self, checked: &[i64], missing: &[i64], hint_points: u32) {
        self.checked = checked.iter().copied().collect();
        self.missing = missing
            .iter()
            .copied()
            .filter(|id| !self.checked.contains(id))
            .collect();
        self.hint_points = hint_points;
    }

    /// Appends the items not seen before and returns them.
    ///
    /// Items are identified by `(item, location, player)`.
    pub fn receive(&mut self, items: &[NetworkItem]) -> Vec<NetworkItem> {
        let mut fresh = Vec::new();
        for item in items {
            if self.seen.insert((item.item, item.location, item.player)) {
                self.items.push(*item);
                fresh.push(*item);
            }
        }
        fresh
    }

    /// Marks locations checked. Returns how many were new.
    pub fn check(&mut self, locations: &[i64]) -> usize {
        let mut added = 0;
        for id in locations {
            self.missing.remove(id);
            if self.checked.insert(*id) {
                added += 1;
            }
        }
        added
    }

    /// Replaces the hint point balance. Returns whether the value changed.
    pub fn set_hint_points(&mut self, points: u32) -> bool {
        let changed = self.hint_points != points;
        self.hint_points = points;
        changed
    }

    /// Sets the share of all locations one hint costs, in percent.
    ///
    /// Taken from `RoomInfo.hint_cost`; a later `RoomUpdate` may change it.
    pub fn set_hint_cost_percent(&mut self, percent: u32) {
        self.hint_cost_percent = percent;
    }

    /// Location ids already checked, ascending.
    pub fn checked(&self) -> &BTreeSet<i64> {
        &self.checked
    }

    /// Location ids still to check, ascending. Never overlaps
    /// [`checked`](Self::checked).
    pub fn missing(&self) -> &BTreeSet<i64> {
        &self.missing
    }

    /// Every item received so far, in arrival order.
    pub fn items(&self) -> &[NetworkItem] {
        &self.items
    }

    /// How many copies of `item` were received.
    pub fn received_count(&self, item: i64) -> usize {
        self.items.iter().filter(|i| i.item == item).count()
    }

    /// Hint points the slot holds right now.
    pub fn hint_points(&self) -> u32 {
        self.hint_points
    }

    /// See [`set_hint_cost_percent`](Self::set_hint_cost_percent).
    pub fn hint_cost_percent(&self) -> u32 {
        self.hint_cost_percent
    }

    /// Checked plus missing locations.
    pub fn total_locations(&self) -> usize {
        self.checked.len() + self.missing.len()
    }

    /// Points one hint costs: `floor(total * percent / 100)`.
    pub fn hint_cost(&self) -> u32 {
        let cost = self.total_locations() as u64 * u64::from(self.hint_cost_percent) / 100;
        u32::try_from(cost).unwrap_or(u32::MAX)
    }

    /// Hints affordable with the current points. Zero while the cost is
    /// zero, which includes a slot with no locations.
    pub fn hints(&self) -> u32 {
        match self.hint_cost() {
            0 => 0,
            cost => self.hint_points / cost,
        }
    }
}
