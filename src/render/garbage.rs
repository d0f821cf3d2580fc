//! Deferred destruction ring.
//!
//! Resources released during a frame may still be referenced by command
//! buffers the GPU has not finished. They are pushed into the current slot
//! and handed back for destruction only once the ring has come all the way
//! around, i.e. after `slot_count()` calls to [`GarbageRing::advance`].

/// Default number of slots (double buffering).
pub const DEFAULT_GARBAGE_SLOTS: usize = 2;

/// N-slot deferred destruction queue.
#[derive(Debug, Clone)]
pub struct GarbageRing<T> {
    slots: Vec<Vec<T>>,
    current: usize,
}

impl<T> GarbageRing<T> {
    /// Create a ring with `slots` slots (at least one).
    pub fn new(slots: usize) -> Self {
        Self {
            slots: (0..slots.max(1)).map(|_| Vec::new()).collect(),
            current: 0,
        }
    }

    /// Queue `item` in the current slot.
    pub fn push(&mut self, item: T) {
        self.slots[self.current].push(item);
    }

    /// Move to the next slot and return everything queued there.
    ///
    /// Items returned were pushed `slot_count()` advances ago; the caller
    /// destroys them.
    pub fn advance(&mut self) -> Vec<T> {
        self.current = (self.current + 1) % self.slots.len();
        std::mem::take(&mut self.slots[self.current])
    }

    /// Empty every slot. Used at shutdown once the device is idle.
    pub fn drain_all(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.pending());
        for slot in &mut self.slots {
            drained.append(slot);
        }
        drained
    }

    /// Index of the slot new items go to.
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Number of items queued in slot `index` (0 if out of range).
    pub fn slot_len(&self, index: usize) -> usize {
        self.slots.get(index).map_or(0, Vec::len)
    }

    /// Items queued across all slots.
    pub fn pending(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl<T: PartialEq> GarbageRing<T> {
    /// Slot currently holding `item`, if any.
    pub fn slot_of(&self, item: &T) -> Option<usize> {
        self.slots.iter().position(|slot| slot.contains(item))
    }
}

impl<T> Default for GarbageRing<T> {
    fn default() -> Self {
        Self::new(DEFAULT_GARBAGE_SLOTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_slot_aging() {
        let mut ring = GarbageRing::default();
        assert_eq!(ring.current_slot(), 0);

        ring.push("x");
        assert_eq!(ring.slot_of(&"x"), Some(0));

        // first advance enters slot 1, x untouched
        assert!(ring.advance().is_empty());
        assert_eq!(ring.current_slot(), 1);
        assert_eq!(ring.slot_of(&"x"), Some(0));

        // second advance comes back around to slot 0
        assert_eq!(ring.advance(), vec!["x"]);
        assert_eq!(ring.current_slot(), 0);
        assert_eq!(ring.slot_of(&"x"), None);
        assert_eq!(ring.pending(), 0);
    }

    #[test]
    fn test_items_age_exactly_n_advances() {
        for n in 1..=4 {
            let mut ring = GarbageRing::new(n);
            ring.push(7u32);
            for _ in 0..n - 1 {
                assert!(ring.advance().is_empty());
            }
            assert_eq!(ring.advance(), vec![7]);
        }
    }

    #[test]
    fn test_zero_slots_clamped() {
        let mut ring = GarbageRing::new(0);
        assert_eq!(ring.slot_count(), 1);
        ring.push(1);
        assert_eq!(ring.advance(), vec![1]);
    }

    #[test]
    fn test_drain_all() {
        let mut ring = GarbageRing::new(3);
        ring.push(1);
        ring.advance();
        ring.push(2);
        ring.push(3);

        assert_eq!(ring.slot_len(0), 1);
        assert_eq!(ring.slot_len(1), 2);
        assert_eq!(ring.slot_len(9), 0);

        let mut drained = ring.drain_all();
        drained.sort_unstable();
        assert_eq!(drained, vec![1, 2, 3]);
        assert_eq!(ring.pending(), 0);
    }
}
