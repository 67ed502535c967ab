//! Handle table: small integers standing for sessions and objects.
//!
//! - Handle 0 is never issued; slot 0 stays empty for the table's lifetime.
//! - `lookup` and `release` clamp the slot index without branching on the
//!   handle value, so an out-of-range handle resolves to slot 0 instead of
//!   being bounds-tested against attacker-chosen data.

/// Capacity never grows past this many slots.
pub const MAX_CAPACITY: u32 = u32::MAX / 2;

#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Option<T>>,
    initial_capacity: u32,
    max_capacity: u32,
}

impl<T> HandleTable<T> {
    pub fn new(initial_capacity: u32) -> Self {
        Self::with_limit(initial_capacity, MAX_CAPACITY)
    }

    /// Table that refuses to grow past `max_capacity` slots.
    pub fn with_limit(initial_capacity: u32, max_capacity: u32) -> Self {
        Self {
            slots: Vec::new(),
            initial_capacity: initial_capacity.max(1),
            max_capacity: max_capacity.min(MAX_CAPACITY),
        }
    }

    /// Number of slots, including the reserved slot 0.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn grow(&mut self) -> Option<()> {
        let cur = self.slots.len() as u64;
        let next = if cur == 0 {
            u64::from(self.initial_capacity)
        } else {
            cur * 2
        };
        if next > u64::from(self.max_capacity) {
            tracing::warn!(capacity = cur, "handle table exhausted");
            return None;
        }

        let extra = (next - cur) as usize;
        self.slots.try_reserve_exact(extra).ok()?;
        self.slots.resize_with(next as usize, || None);
        tracing::debug!(capacity = next, "handle table grown");
        Some(())
    }

    /// Store `entry` and return its handle, `None` when the table cannot grow.
    pub fn acquire(&mut self, entry: T) -> Option<u32> {
        loop {
            let free = self
                .slots
                .iter()
                .enumerate()
                .skip(1)
                .find(|(_, s)| s.is_none())
                .map(|(i, _)| i);

            if let Some(idx) = free {
                let handle = u32::try_from(idx).ok()?;
                if let Some(slot) = self.slots.get_mut(idx) {
                    *slot = Some(entry);
                    return Some(handle);
                }
                return None;
            }
            self.grow()?;
        }
    }

    /// Branch-free clamp: any handle outside `1..capacity` maps to 0.
    fn guard_index(&self, handle: u32) -> usize {
        let max = self.slots.len() as u32;
        // all ones when the handle reads as a negative i32
        let mask_neg = ((handle as i32) >> 31) as u32;
        // all ones when handle >= max
        let mask_ovf = ((max.wrapping_sub(1).wrapping_sub(handle) as i32) >> 31) as u32;
        (handle & !mask_neg & !mask_ovf) as usize
    }

    pub fn lookup(&self, handle: u32) -> Option<&T> {
        let idx = self.guard_index(handle);
        self.slots.get(idx).and_then(|s| s.as_ref())
    }

    pub fn lookup_mut(&mut self, handle: u32) -> Option<&mut T> {
        let idx = self.guard_index(handle);
        self.slots.get_mut(idx).and_then(|s| s.as_mut())
    }

    /// Clear the slot and hand back its previous content.
    pub fn release(&mut self, handle: u32) -> Option<T> {
        let idx = self.guard_index(handle);
        self.slots.get_mut(idx).and_then(|s| s.take())
    }

    /// Live handles with their entries, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (i as u32, e)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|e| (i as u32, e)))
    }
}
