use termfleet_core::{SessionRecord, SlotId};

/// In-memory slot map. Single source of truth for "which slots are free"
/// within this process; the fleet host remains the durable source of truth
/// for what is actually running.
///
/// No internal locking: the owning `SlotPool` serializes every
/// read-modify-write behind one mutex.
pub struct Registry {
    slots: Vec<Option<SessionRecord>>,
}

impl Registry {
    pub fn new(max_instances: usize) -> Self {
        Self {
            slots: vec![None; max_instances],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, slot: SlotId) -> bool {
        slot >= 1 && (slot as usize) <= self.slots.len()
    }

    pub fn get(&self, slot: SlotId) -> Option<&SessionRecord> {
        self.slots.get(slot as usize - 1).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut SessionRecord> {
        self.slots.get_mut(slot as usize - 1).and_then(Option::as_mut)
    }

    /// Slot currently held by this owner, if any. Linear scan; the pool is
    /// small and bounded.
    pub fn find_by_owner(&self, owner_id: &str) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|r| r.owner_id == owner_id))
            .map(|i| i as SlotId + 1)
    }

    /// Lowest-numbered free slot.
    pub fn find_free(&self) -> Option<SlotId> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|i| i as SlotId + 1)
    }

    pub fn occupy(&mut self, slot: SlotId, record: SessionRecord) {
        self.slots[slot as usize - 1] = Some(record);
    }

    pub fn vacate(&mut self, slot: SlotId) -> Option<SessionRecord> {
        self.slots.get_mut(slot as usize - 1).and_then(Option::take)
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Occupied slots with their records, lowest slot first.
    pub fn records(&self) -> impl Iterator<Item = (SlotId, &SessionRecord)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|r| (i as SlotId + 1, r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_returns_lowest_slot() {
        let mut reg = Registry::new(3);
        assert_eq!(reg.find_free(), Some(1));
        reg.occupy(1, SessionRecord::new("u1", "EURUSD", "M15"));
        assert_eq!(reg.find_free(), Some(2));
        reg.occupy(3, SessionRecord::new("u3", "GBPUSD", "H1"));
        assert_eq!(reg.find_free(), Some(2));
    }

    #[test]
    fn test_find_free_never_returns_occupied_slot() {
        let mut reg = Registry::new(5);
        for slot in [1, 2, 4] {
            reg.occupy(slot, SessionRecord::new(format!("u{slot}"), "EURUSD", "M15"));
        }
        while let Some(free) = reg.find_free() {
            assert!(reg.get(free).is_none());
            reg.occupy(free, SessionRecord::new(format!("u{free}"), "EURUSD", "M15"));
        }
        assert_eq!(reg.occupied_count(), 5);
    }

    #[test]
    fn test_full_registry_has_no_free_slot() {
        let mut reg = Registry::new(2);
        reg.occupy(1, SessionRecord::new("u1", "EURUSD", "M15"));
        reg.occupy(2, SessionRecord::new("u2", "EURUSD", "M15"));
        assert_eq!(reg.find_free(), None);
    }

    #[test]
    fn test_find_by_owner() {
        let mut reg = Registry::new(3);
        reg.occupy(2, SessionRecord::new("u2", "XAUUSD", "M5"));
        assert_eq!(reg.find_by_owner("u2"), Some(2));
        assert_eq!(reg.find_by_owner("u9"), None);
    }

    #[test]
    fn test_vacate_frees_the_slot() {
        let mut reg = Registry::new(2);
        reg.occupy(1, SessionRecord::new("u1", "EURUSD", "M15"));
        let taken = reg.vacate(1);
        assert_eq!(taken.unwrap().owner_id, "u1");
        assert!(reg.get(1).is_none());
        assert!(reg.vacate(1).is_none());
    }

    #[test]
    fn test_slot_range_check() {
        let reg = Registry::new(2);
        assert!(reg.contains(1));
        assert!(reg.contains(2));
        assert!(!reg.contains(0));
        assert!(!reg.contains(3));
    }
}
