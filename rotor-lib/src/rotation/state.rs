//! The in-memory `RotationState` triple and its invariants (spec §3).

use crate::endpoint::Endpoint;
use crate::tunnel::{Slot, SlotState};

#[derive(Default)]
pub struct RotationState {
    primary: Option<Endpoint>,
    secondary: Option<Endpoint>,
    staging: Option<Endpoint>,
    primary_state: SlotState,
    secondary_state: SlotState,
    staging_state: SlotState,
}

impl Default for SlotState {
    fn default() -> Self {
        SlotState::Empty
    }
}

impl RotationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self, slot: Slot) -> Option<&Endpoint> {
        match slot {
            Slot::Primary => self.primary.as_ref(),
            Slot::Secondary => self.secondary.as_ref(),
            Slot::Staging => self.staging.as_ref(),
        }
    }

    pub fn slot_state(&self, slot: Slot) -> SlotState {
        match slot {
            Slot::Primary => self.primary_state,
            Slot::Secondary => self.secondary_state,
            Slot::Staging => self.staging_state,
        }
    }

    /// Occupies `slot` with `endpoint` in the given state. Panics (a
    /// programmer error, not a runtime condition) if `endpoint` already
    /// occupies a different slot — callers must clear the old slot first.
    pub fn occupy(&mut self, slot: Slot, endpoint: Endpoint, state: SlotState) {
        debug_assert!(
            self.occupied_elsewhere(slot, &endpoint).is_none(),
            "endpoint must not occupy two slots at once"
        );
        match slot {
            Slot::Primary => {
                self.primary = Some(endpoint);
                self.primary_state = state;
            }
            Slot::Secondary => {
                self.secondary = Some(endpoint);
                self.secondary_state = state;
            }
            Slot::Staging => {
                self.staging = Some(endpoint);
                self.staging_state = state;
            }
        }
    }

    pub fn set_state(&mut self, slot: Slot, state: SlotState) {
        match slot {
            Slot::Primary => self.primary_state = state,
            Slot::Secondary => self.secondary_state = state,
            Slot::Staging => self.staging_state = state,
        }
    }

    pub fn clear(&mut self, slot: Slot) {
        match slot {
            Slot::Primary => {
                self.primary = None;
                self.primary_state = SlotState::Empty;
            }
            Slot::Secondary => {
                self.secondary = None;
                self.secondary_state = SlotState::Empty;
            }
            Slot::Staging => {
                self.staging = None;
                self.staging_state = SlotState::Empty;
            }
        }
    }

    fn occupied_elsewhere(&self, slot: Slot, endpoint: &Endpoint) -> Option<Slot> {
        for other in [Slot::Primary, Slot::Secondary, Slot::Staging] {
            if other != slot && self.endpoint(other) == Some(endpoint) {
                return Some(other);
            }
        }
        None
    }

    /// Endpoint names currently occupying any slot, for exclusion from
    /// candidate selection.
    pub fn occupied_names(&self) -> Vec<&str> {
        [&self.primary, &self.secondary, &self.staging]
            .into_iter()
            .flatten()
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Property 1 (spec §8): no endpoint occupies more than one slot.
    pub fn no_duplicate_endpoints(&self) -> bool {
        let names = self.occupied_names();
        let mut seen = std::collections::HashSet::new();
        names.into_iter().all(|n| seen.insert(n))
    }
}
