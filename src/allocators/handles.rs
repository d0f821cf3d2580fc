//! Generation-checked handles for renderer-owned resources.
//!
//! A [`SlotMap`] stores values in reusable slots. Each slot carries a
//! generation counter that is bumped when the slot is reused, so a stale
//! [`Handle`] to a reused slot resolves to nothing instead of aliasing the new
//! occupant.

use std::marker::PhantomData;

/// Generation counter for handle validation.
type Generation = u32;

/// A stable handle to a value stored in a [`SlotMap`].
#[derive(Debug)]
pub struct Handle<T> {
    index: u32,
    generation: Generation,
    _marker: PhantomData<fn() -> T>,
}

// Manual implementations to avoid T: Copy/Clone bounds
impl<T> Copy for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Handle<T> {
    /// Create a dangling handle (for default initialization).
    pub const fn dangling() -> Self {
        Self {
            index: u32::MAX,
            generation: 0,
            _marker: PhantomData,
        }
    }

    /// Check if this is a dangling/invalid handle.
    pub fn is_dangling(&self) -> bool {
        self.index == u32::MAX
    }

    /// Get the raw index (for debugging).
    pub fn raw_index(&self) -> u32 {
        self.index
    }

    /// Get the generation (for debugging).
    pub fn raw_generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::dangling()
    }
}

/// Internal slot for tracking values.
#[derive(Debug)]
struct Slot<T> {
    /// Current generation
    generation: Generation,
    /// Stored value, `None` while the slot is free
    value: Option<T>,
}

/// Slot storage addressed by generation-checked handles.
///
/// Single-owner: all access goes through `&self`/`&mut self`.
#[derive(Debug)]
pub struct SlotMap<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> SlotMap<T> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Store `value` and return its handle.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            return Handle {
                index,
                generation: slot.generation,
                _marker: PhantomData,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        Handle {
            index,
            generation: 1,
            _marker: PhantomData,
        }
    }

    /// Remove and return the value behind `handle`.
    ///
    /// Returns `None` for dangling or stale handles.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        let value = slot.value.take()?;
        self.free_list.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Resolve a handle.
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        if handle.is_dangling() {
            return None;
        }
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Resolve a handle mutably.
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slot_mut(handle)?.value.as_mut()
    }

    /// Check if a handle is valid.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the map holds no values.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove every value, yielding each with its handle.
    ///
    /// Freed slots are reused under a new generation, as after
    /// [`remove`](Self::remove).
    pub fn drain(&mut self) -> Vec<(Handle<T>, T)> {
        let mut drained = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                drained.push((
                    Handle {
                        index: index as u32,
                        generation: slot.generation,
                        _marker: PhantomData,
                    },
                    value,
                ));
                self.free_list.push(index as u32);
            }
        }
        self.len = 0;
        drained
    }

    /// Iterate over live handles and values.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Handle {
                        index: index as u32,
                        generation: slot.generation,
                        _marker: PhantomData,
                    },
                    value,
                )
            })
        })
    }

    fn slot_mut(&mut self, handle: Handle<T>) -> Option<&mut Slot<T>> {
        if handle.is_dangling() {
            return None;
        }
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }
}

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
