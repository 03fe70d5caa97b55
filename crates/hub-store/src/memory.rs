//! In-memory slot store.

use std::collections::HashMap;
use std::sync::Mutex;

use hub_core::{HubError, Result, SlotStore};

/// Slots kept in process memory; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySlotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with one slot pre-filled.
    pub fn with_slot(slot: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut slots) = store.slots.lock() {
            slots.insert(slot.to_string(), value.to_string());
        }
        store
    }
}

impl SlotStore for MemorySlotStore {
    fn load(&self, slot: &str) -> Result<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))?;
        Ok(slots.get(slot).cloned())
    }

    fn save(&self, slot: &str, value: &str) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))?;
        slots.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, slot: &str) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))?;
        slots.remove(slot);
        Ok(())
    }
}
