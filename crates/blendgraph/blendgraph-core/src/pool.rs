//! Generation-indexed object pools used per worker lane.
//!
//! A pool lends slots out through [`SlotHandle`]s carrying `(pool id, index, generation)`.
//! Freeing bumps the slot generation, so stale handles and handles from another lane's
//! pool are rejected instead of corrupting the free list. Slots are never shrunk; after
//! warm-up a frame performs no allocation.

use std::fmt;
use std::marker::PhantomData;

use crate::event::RefCountedData;
use crate::ids::alloc_pool_id;
use crate::skeleton::Pose;

/// Checkout handle into a [`SlotPool`].
pub struct SlotHandle<T> {
    pool: u32,
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SlotHandle<T> {
    #[inline]
    pub fn pool_id(&self) -> u32 {
        self.pool
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for SlotHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SlotHandle<T> {}

impl<T> PartialEq for SlotHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.pool == other.pool && self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for SlotHandle<T> {}

impl<T> fmt::Debug for SlotHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotHandle({}:{}@{})", self.pool, self.index, self.generation)
    }
}

pub type PoseHandle = SlotHandle<Pose>;
pub type RefDataHandle = SlotHandle<RefCountedData>;

struct Slot<T> {
    value: T,
    generation: u32,
    in_use: bool,
}

/// Usage counters. Diagnostic only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub used: usize,
    pub max_used: usize,
    pub total_requested: u64,
    pub total_freed: u64,
}

pub struct SlotPool<T> {
    id: u32,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    used: usize,
    max_used: usize,
    total_requested: u64,
    total_freed: u64,
}

impl<T: Default> SlotPool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut pool = Self {
            id: alloc_pool_id(),
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            used: 0,
            max_used: 0,
            total_requested: 0,
            total_freed: 0,
        };
        pool.grow(capacity);
        pool
    }

    fn grow(&mut self, count: usize) {
        for _ in 0..count {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                value: T::default(),
                generation: 0,
                in_use: false,
            });
            self.free.push(index);
        }
    }

    /// Check out a slot. The contents are whatever the previous user left behind;
    /// the caller must initialize them.
    pub fn request(&mut self) -> SlotHandle<T> {
        if self.free.is_empty() {
            let grow_by = self.slots.len().max(4);
            log::trace!("slot pool {} growing by {}", self.id, grow_by);
            self.grow(grow_by);
        }
        // grow() always leaves at least one free slot
        let index = self.free.pop().unwrap_or(0);
        let slot = &mut self.slots[index as usize];
        slot.in_use = true;
        self.used += 1;
        self.max_used = self.max_used.max(self.used);
        self.total_requested += 1;
        SlotHandle {
            pool: self.id,
            index,
            generation: slot.generation,
            _marker: PhantomData,
        }
    }
}

impl<T> SlotPool<T> {
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// True if `handle` refers to a live slot of this pool.
    pub fn owns(&self, handle: SlotHandle<T>) -> bool {
        handle.pool == self.id
            && self
                .slots
                .get(handle.index as usize)
                .is_some_and(|s| s.in_use && s.generation == handle.generation)
    }

    /// Return a slot. Foreign or stale handles are ignored; returns whether anything was freed.
    pub fn free(&mut self, handle: SlotHandle<T>) -> bool {
        if !self.owns(handle) {
            return false;
        }
        let slot = &mut self.slots[handle.index as usize];
        slot.in_use = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.used -= 1;
        self.total_freed += 1;
        true
    }

    /// Return every checked-out slot.
    pub fn free_all(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.in_use {
                slot.in_use = false;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                self.total_freed += 1;
            }
        }
        self.used = 0;
    }

    pub fn get(&self, handle: SlotHandle<T>) -> Option<&T> {
        if !self.owns(handle) {
            return None;
        }
        Some(&self.slots[handle.index as usize].value)
    }

    pub fn get_mut(&mut self, handle: SlotHandle<T>) -> Option<&mut T> {
        if !self.owns(handle) {
            return None;
        }
        Some(&mut self.slots[handle.index as usize].value)
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn max_used(&self) -> usize {
        self.max_used
    }

    pub fn reset_max_used(&mut self) {
        self.max_used = self.used;
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.slots.len(),
            used: self.used,
            max_used: self.max_used,
            total_requested: self.total_requested,
            total_freed: self.total_freed,
        }
    }
}

impl<T: Default> SlotPool<T> {
    /// Temporarily move a value out of its slot so it can be written while other slots
    /// are read. The slot holds `T::default()` until `restore` puts it back.
    pub(crate) fn take(&mut self, handle: SlotHandle<T>) -> Option<T> {
        self.get_mut(handle).map(std::mem::take)
    }

    pub(crate) fn restore(&mut self, handle: SlotHandle<T>, value: T) {
        if let Some(slot) = self.get_mut(handle) {
            *slot = value;
        }
    }
}

pub type PosePool = SlotPool<Pose>;
pub type RefDataPool = SlotPool<RefCountedData>;

impl SlotPool<Pose> {
    /// `dst = blend(a, b, t)`. Returns false if any handle is invalid.
    pub fn blend_into(&mut self, dst: PoseHandle, a: PoseHandle, b: PoseHandle, t: f32) -> bool {
        let Some(mut out) = self.take(dst) else {
            return false;
        };
        let ok = match (self.get(a), self.get(b)) {
            (Some(pa), Some(pb)) => {
                out.blend_from(pa, pb, t);
                true
            }
            _ => false,
        };
        self.restore(dst, out);
        ok
    }

    /// `dst = src`. Returns false if any handle is invalid.
    pub fn copy_into(&mut self, dst: PoseHandle, src: PoseHandle) -> bool {
        if dst == src {
            return self.owns(dst);
        }
        let Some(mut out) = self.take(dst) else {
            return false;
        };
        let ok = match self.get(src) {
            Some(p) => {
                out.copy_from(p);
                true
            }
            None => false,
        };
        self.restore(dst, out);
        ok
    }
}
