//! A [`SlotPool`] for storing records behind generation-checked handles.

use alloc::collections::TryReserveError;
use core::ops::{Index, IndexMut};

/// Slot counts are always rounded up to a multiple of this value,
/// so that bitmaps indexed by slot never straddle a partial 32-bit word.
pub const SLOT_GRANULARITY: usize = 32;

/// Rounds `count` up to the next multiple of [`SLOT_GRANULARITY`].
#[inline]
pub const fn round_up_to_granularity(count: usize) -> usize {
    count.div_ceil(SLOT_GRANULARITY) * SLOT_GRANULARITY
}

/// Marks the end of the freelist.
const NO_FREE_SLOT: u32 = u32::MAX;

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
enum SlotState<T> {
    Occupied(T),
    Vacant { next_free: u32 },
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

/// A fixed-capacity arena with an intrusive freelist and per-slot generations.
///
/// Allocation and freeing are O(1). Each vacant slot stores the index of the next vacant slot,
/// and the lowest-indexed slots of a fresh block are handed out first.
///
/// Records can be *retired* before they are freed. Retiring bumps the generation so that
/// outstanding handles stop resolving, while the record itself stays readable by index
/// until [`SlotPool::free`] reclaims the slot.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotPool<T> {
    slots: Vec<Slot<T>>,
    free_head: u32,
    len: usize,
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free_head: NO_FREE_SLOT,
            len: 0,
        }
    }
}

impl<T> SlotPool<T> {
    /// Creates a new [`SlotPool`] with room for at least `capacity` records.
    ///
    /// The capacity is rounded up to a multiple of [`SLOT_GRANULARITY`].
    pub fn with_capacity(capacity: usize) -> Self {
        let mut pool = Self::default();
        let capacity = round_up_to_granularity(capacity);
        pool.slots.reserve_exact(capacity);
        pool.push_vacant_slots(capacity);
        pool
    }

    /// Returns the number of slots, both occupied and vacant.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of occupied slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slots are occupied.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grows the pool to at least `capacity` slots. Existing indices are preserved.
    ///
    /// The new capacity is rounded up to a multiple of [`SLOT_GRANULARITY`].
    /// Never shrinks.
    pub fn try_grow(&mut self, capacity: usize) -> Result<(), TryReserveError> {
        let capacity = round_up_to_granularity(capacity);

        if capacity <= self.slots.len() {
            return Ok(());
        }

        let additional = capacity - self.slots.len();
        self.slots.try_reserve_exact(additional)?;
        self.push_vacant_slots(additional);

        Ok(())
    }

    fn push_vacant_slots(&mut self, additional: usize) {
        let start = self.slots.len() as u32;
        let end = start + additional as u32;

        // Chain the new slots in ascending order and put them in front of the existing freelist.
        for index in start..end {
            let next_free = if index + 1 < end {
                index + 1
            } else {
                self.free_head
            };
            self.slots.push(Slot {
                generation: 0,
                state: SlotState::Vacant { next_free },
            });
        }

        if additional > 0 {
            self.free_head = start;
        }
    }

    /// Inserts a record and returns its index and generation.
    ///
    /// Doubles the capacity if there are no vacant slots left.
    pub fn insert(&mut self, value: T) -> Result<(u32, u32), TryReserveError> {
        if self.free_head == NO_FREE_SLOT {
            let capacity = (self.slots.len() * 2).max(SLOT_GRANULARITY);
            self.try_grow(capacity)?;
        }

        let index = self.free_head;
        let slot = &mut self.slots[index as usize];

        let SlotState::Vacant { next_free } = slot.state else {
            panic!("Slot {index} is on the freelist but occupied");
        };

        self.free_head = next_free;
        slot.state = SlotState::Occupied(value);
        self.len += 1;

        Ok((index, slot.generation))
    }

    /// Returns a reference to the record at `index`, ignoring generations.
    #[inline]
    pub fn get(&self, index: u32) -> Option<&T> {
        match self.slots.get(index as usize).map(|slot| &slot.state) {
            Some(SlotState::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns a mutable reference to the record at `index`, ignoring generations.
    #[inline]
    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        match self.slots.get_mut(index as usize).map(|slot| &mut slot.state) {
            Some(SlotState::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns a reference to the record at `index` if its generation matches.
    #[inline]
    pub fn get_checked(&self, index: u32, generation: u32) -> Option<&T> {
        let slot = self.slots.get(index as usize)?;
        match &slot.state {
            SlotState::Occupied(value) if slot.generation == generation => Some(value),
            _ => None,
        }
    }

    /// Returns a mutable reference to the record at `index` if its generation matches.
    #[inline]
    pub fn get_checked_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        let slot = self.slots.get_mut(index as usize)?;
        match &mut slot.state {
            SlotState::Occupied(value) if slot.generation == generation => Some(value),
            _ => None,
        }
    }

    /// Returns the current generation of the slot at `index`.
    #[inline]
    pub fn generation(&self, index: u32) -> Option<u32> {
        self.slots.get(index as usize).map(|slot| slot.generation)
    }

    /// Invalidates all handles to the record at `index` without reclaiming the slot.
    ///
    /// Returns the record if the generation matched.
    pub fn retire(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        let slot = self.slots.get_mut(index as usize)?;
        match &mut slot.state {
            SlotState::Occupied(value) if slot.generation == generation => {
                slot.generation = slot.generation.wrapping_add(1);
                Some(value)
            }
            _ => None,
        }
    }

    /// Reclaims the slot at `index`, returning the record that was stored in it.
    pub fn free(&mut self, index: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;

        if matches!(slot.state, SlotState::Vacant { .. }) {
            return None;
        }

        let state = core::mem::replace(
            &mut slot.state,
            SlotState::Vacant {
                next_free: self.free_head,
            },
        );
        slot.generation = slot.generation.wrapping_add(1);
        self.free_head = index;
        self.len -= 1;

        match state {
            SlotState::Occupied(value) => Some(value),
            SlotState::Vacant { .. } => None,
        }
    }

    /// Returns an iterator over the indices and records of all occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.state {
                SlotState::Occupied(value) => Some((index as u32, value)),
                SlotState::Vacant { .. } => None,
            })
    }

    /// Returns the approximate number of heap bytes used by the pool.
    pub fn allocated_bytes(&self) -> usize {
        self.slots.capacity() * size_of::<Slot<T>>()
    }
}

impl<T> Index<u32> for SlotPool<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: u32) -> &T {
        self.get(index)
            .unwrap_or_else(|| panic!("Slot {index} is vacant"))
    }
}

impl<T> IndexMut<u32> for SlotPool<T> {
    #[inline]
    fn index_mut(&mut self, index: u32) -> &mut T {
        self.get_mut(index)
            .unwrap_or_else(|| panic!("Slot {index} is vacant"))
    }
}
