// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Indexed binary min-heap over dense `u32` ids.

const ABSENT: u32 = u32::MAX;

/// A binary min-heap keyed by dense ids, supporting priority updates and removal.
///
/// Each id may be present at most once. Entries are stored in parallel arrays,
/// with an `id → slot` index. Among equal priorities the pop order is
/// deterministic, but not FIFO.
#[derive(Debug, Clone, Default)]
pub struct MinHeap {
    ids: Vec<u32>,
    priorities: Vec<f64>,
    slots: Vec<u32>,
}

impl MinHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a heap for ids in `0..ids` without reallocating.
    pub fn with_capacity(ids: usize) -> Self {
        Self {
            ids: Vec::with_capacity(ids),
            priorities: Vec::with_capacity(ids),
            slots: vec![ABSENT; ids],
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.slots.get(id as usize).is_some_and(|&s| s != ABSENT)
    }

    /// Adds a new entry. The id must not be present.
    pub fn insert(&mut self, id: u32, priority: f64) {
        assert!(id != ABSENT, "reserved id");
        debug_assert!(!priority.is_nan());
        if id as usize >= self.slots.len() {
            let new_len = (id as usize + 1).max(self.slots.len() * 2);
            self.slots.resize(new_len, ABSENT);
        }
        assert!(!self.contains(id), "id {} already in the heap", id);

        let slot = self.ids.len();
        self.ids.push(id);
        self.priorities.push(priority);
        self.slots[id as usize] = slot as u32;
        self.sift_up(slot);
    }

    pub fn peek(&self) -> Option<(u32, f64)> {
        Some((*self.ids.first()?, self.priorities[0]))
    }

    pub fn peek_priority(&self) -> Option<f64> {
        self.priorities.first().copied()
    }

    pub fn pop(&mut self) -> Option<(u32, f64)> {
        let top = self.peek()?;
        self.remove_slot(0);
        Some(top)
    }

    /// Changes the priority of a present entry, in either direction.
    /// Returns false if the id is not in the heap.
    pub fn update(&mut self, id: u32, priority: f64) -> bool {
        if !self.contains(id) {
            return false;
        }

        let slot = self.slots[id as usize] as usize;
        let old = self.priorities[slot];
        self.priorities[slot] = priority;
        if priority < old {
            self.sift_up(slot);
        } else {
            self.sift_down(slot);
        }
        true
    }

    /// Inserts the id, or lowers its priority if already present with a higher one.
    pub fn push_or_decrease(&mut self, id: u32, priority: f64) {
        if !self.contains(id) {
            self.insert(id, priority);
        } else if priority < self.priorities[self.slots[id as usize] as usize] {
            self.update(id, priority);
        }
    }

    /// Returns false if the id is not in the heap.
    pub fn remove(&mut self, id: u32) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.remove_slot(self.slots[id as usize] as usize);
        true
    }

    /// Removes all entries, keeping the allocated capacity.
    pub fn clear(&mut self) {
        for &id in &self.ids {
            self.slots[id as usize] = ABSENT;
        }
        self.ids.clear();
        self.priorities.clear();
    }

    fn remove_slot(&mut self, slot: usize) {
        let last = self.ids.len() - 1;
        self.swap(slot, last);

        let id = self.ids.pop().unwrap_or(ABSENT);
        let removed_priority = self.priorities.pop().unwrap_or(f64::NAN);
        self.slots[id as usize] = ABSENT;

        if slot < self.ids.len() {
            if self.priorities[slot] < removed_priority {
                self.sift_up(slot);
            } else {
                self.sift_down(slot);
            }
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.ids.swap(a, b);
        self.priorities.swap(a, b);
        self.slots[self.ids[a] as usize] = a as u32;
        self.slots[self.ids[b] as usize] = b as u32;
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.priorities[slot] >= self.priorities[parent] {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.ids.len();
        loop {
            let left = 2 * slot + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.priorities[right] < self.priorities[left] {
                right
            } else {
                left
            };
            if self.priorities[child] >= self.priorities[slot] {
                break;
            }
            self.swap(slot, child);
            slot = child;
        }
    }
}
