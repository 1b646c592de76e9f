//
// alldiff-rs is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License  v3
// as published by the Free Software Foundation.
//
// mini-cp is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY.
// See the GNU Lesser General Public License  for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with mini-cp. If not, see http://www.gnu.org/licenses/lgpl-3.0.en.html
//
// Copyright (c)  2022 by X. Gillard
//

//! This module defines the data structures and utilities that are used to
//! save and restore data from the solver trail.
use super::*;

//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~ TRAIL DATA ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// This structure keeps track of the information about one given level: the
/// length of its trail and the count of each kind of resources that are managed
/// by the state manager
#[derive(Debug, Clone, Copy)]
struct Level {
    /// the length of the trail at the moment this layer was started
    trail_size: usize,
    /// how many integers have already been recorded ?
    integers: usize,
    /// how many sparse sets have already been recorded ?
    sparse_sets: usize,
    /// length of the sparse sets data (and index) arrays
    sparse_set_data: usize,
}

/// The state of an integer that can be saved and restored
#[derive(Debug, Clone, Copy)]
struct IntState {
    /// The identifier of the managed resource
    id: ReversibleInt,
    /// At what 'time' was this data modified to the point where it needed being saved ?
    ///
    /// # Note:
    /// This data was referred to as 'magic' in minicp and maxicp. Still I like to
    /// convey the idea that 'magic' is actually a monotonic clock  indicating the validity
    /// timestamp of the data.
    clock: usize,
    /// The value that will be restored in the managed data
    value: isize,
}

//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~ STATE MANAGER ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// A simple state manager that can manage integers and sparse sets. Every
/// other reversible structure of the solver (domains, matching cells, scc
/// tags, partition cursors ...) is ultimately built out of these two.
#[derive(Debug, Clone)]
pub struct TrailedStateManager {
    /// Monotonic clock, bumped by every `save_state`. An integer whose clock
    /// is older than this one must be trailed before being overwritten.
    clock: usize,
    /// The previous values that are saved on the trail (only integers ever
    /// need to be trailed: sparse sets are integers plus a permutation)
    trail: Vec<IntState>,
    /// Some book keeping to track what needs and what doesn't need
    /// to be restored upon manager `pop`. The root level is never saved, so
    /// this only holds the levels that can still be restored.
    levels: Vec<Level>,

    /// The current value of the various managed integers
    integers: Vec<IntState>,

    /// Holds the metadata about sparse sets
    sparse_sets: Vec<SparseSet>,
    /// Holds the actual content of the sparse sets
    sparse_set_data: Vec<usize>,
    /// Holds the indices of the data in a sparse set
    sparse_set_idx: Vec<usize>,
}
impl Default for TrailedStateManager {
    fn default() -> Self {
        Self::new()
    }
}
impl TrailedStateManager {
    /// Creates a new state manager positioned at the root level
    pub fn new() -> Self {
        Self {
            clock: 0,
            trail: vec![],
            levels: vec![],
            integers: vec![],
            sparse_sets: vec![],
            sparse_set_data: vec![],
            sparse_set_idx: vec![],
        }
    }
    /// Returns the number of levels that have been saved and not restored yet
    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}
impl StateManager for TrailedStateManager {}
//------------------------------------------------------------------------------
// Save and Restore management
//------------------------------------------------------------------------------
impl SaveAndRestore for TrailedStateManager {
    fn save_state(&mut self) {
        self.clock += 1;
        self.levels.push(Level {
            trail_size: self.trail.len(),
            integers: self.integers.len(),
            sparse_sets: self.sparse_sets.len(),
            sparse_set_data: self.sparse_set_data.len(),
        })
    }

    fn restore_state(&mut self) {
        let level = self
            .levels
            .pop()
            .expect("cannot pop above the root level of the state manager");

        for e in self.trail.drain(level.trail_size..).rev() {
            self.integers[e.id.0] = e;
        }
        // whatever was created after the level began simply vanishes
        self.integers.truncate(level.integers);
        self.sparse_sets.truncate(level.sparse_sets);
        self.sparse_set_data.truncate(level.sparse_set_data);
        self.sparse_set_idx.truncate(level.sparse_set_data);
        // a fresh clock makes sure nothing written from now on is mistaken
        // for a value that was already saved at the current level
        self.clock += 1;
    }
}
//------------------------------------------------------------------------------
// Int management
//------------------------------------------------------------------------------
impl IntManager for TrailedStateManager {
    fn manage_int(&mut self, value: isize) -> ReversibleInt {
        let id = ReversibleInt(self.integers.len());
        self.integers.push(IntState {
            id,
            clock: self.clock,
            value,
        });
        id
    }

    fn get_int(&self, id: ReversibleInt) -> isize {
        self.integers[id.0].value
    }

    fn set_int(&mut self, id: ReversibleInt, value: isize) -> isize {
        let curr = self.integers[id.0];
        if value != curr.value {
            if curr.clock < self.clock {
                self.trail.push(curr);
                self.integers[id.0] = IntState {
                    id,
                    clock: self.clock,
                    value,
                }
            } else {
                // already saved during this level
                self.integers[id.0].value = value;
            }
        }
        value
    }
}
//------------------------------------------------------------------------------
// Sparse sets management
//------------------------------------------------------------------------------
/// The information that needs to be maintained in order to deal with a
/// sparse set
#[derive(Debug, Clone, Copy)]
struct SparseSet {
    /// offset of the values
    val_offset: isize,
    /// start index of the sparse set (included)
    start: usize,
    /// capcity of the sparse set
    capa: usize,
    /// the current size of the sparse set
    size: ReversibleInt,
    /// the minimum value in the set (relative to the offset)
    min: ReversibleInt,
    /// the maximum value in the set (relative to the offset)
    max: ReversibleInt,
}
impl SparseSetManager for TrailedStateManager {
    fn manage_sparse_set(&mut self, n: usize, val_offset: isize) -> ReversibleSparseSet {
        let id = self.sparse_sets.len();
        let start = self.sparse_set_data.len();

        for i in 0..n {
            self.sparse_set_data.push(i);
            self.sparse_set_idx.push(start + i);
        }

        let size = self.manage_int(n as isize);
        let min = self.manage_int(0);
        let max = self.manage_int(n as isize - 1);

        self.sparse_sets.push(SparseSet {
            val_offset,
            start,
            capa: n,
            size,
            min,
            max,
        });
        ReversibleSparseSet(id)
    }

    fn sparse_set_size(&self, id: ReversibleSparseSet) -> usize {
        self.get_int(self.sparse_sets[id.0].size) as usize
    }

    fn sparse_set_get_min(&self, id: ReversibleSparseSet) -> Option<isize> {
        let ss = self.sparse_sets[id.0];
        if self.get_int(ss.size) <= 0 {
            None
        } else {
            Some(self.get_int(ss.min) + ss.val_offset)
        }
    }

    fn sparse_set_get_max(&self, id: ReversibleSparseSet) -> Option<isize> {
        let ss = self.sparse_sets[id.0];
        if self.get_int(ss.size) <= 0 {
            None
        } else {
            Some(self.get_int(ss.max) + ss.val_offset)
        }
    }

    fn sparse_set_contains(&self, id: ReversibleSparseSet, value: isize) -> bool {
        let ss = self.sparse_sets[id.0];
        let val = value - ss.val_offset;

        if val < 0 || val >= ss.capa as isize {
            false
        } else {
            let sz = self.get_int(ss.size) as usize;
            self.sparse_set_idx[ss.start + val as usize] < ss.start + sz
        }
    }

    fn sparse_set_remove(&mut self, id: ReversibleSparseSet, value: isize) -> bool {
        if !self.sparse_set_contains(id, value) {
            return false;
        }
        let ss = self.sparse_sets[id.0];
        let val = (value - ss.val_offset) as usize;
        let size = self.get_int(ss.size) as usize;

        let last = self.sparse_set_data[ss.start + size - 1];
        self.sparse_set_swap(ss.start + val, ss.start + last);

        let size = self.decrement(ss.size) as usize;
        self.sparse_set_update_bounds(ss, size, val);
        true
    }

    fn sparse_set_remove_all(&mut self, id: ReversibleSparseSet) {
        self.set_int(self.sparse_sets[id.0].size, 0);
    }

    fn sparse_set_remove_all_but(&mut self, id: ReversibleSparseSet, value: isize) {
        if !self.sparse_set_contains(id, value) {
            self.sparse_set_remove_all(id);
            return;
        }
        // moving the kept item in first position suffices
        let ss = self.sparse_sets[id.0];
        let val = (value - ss.val_offset) as usize;
        let first = self.sparse_set_data[ss.start];
        self.sparse_set_swap(ss.start + val, ss.start + first);

        self.set_int(ss.size, 1);
        self.set_int(ss.min, val as isize);
        self.set_int(ss.max, val as isize);
    }

    fn sparse_set_remove_below(&mut self, id: ReversibleSparseSet, val: isize) {
        if let (Some(min), Some(max)) = (self.sparse_set_get_min(id), self.sparse_set_get_max(id)) {
            if val > max {
                self.sparse_set_remove_all(id);
            } else {
                for x in min..val {
                    self.sparse_set_remove(id, x);
                }
            }
        }
    }

    fn sparse_set_remove_above(&mut self, id: ReversibleSparseSet, val: isize) {
        if let (Some(min), Some(max)) = (self.sparse_set_get_min(id), self.sparse_set_get_max(id)) {
            if val < min {
                self.sparse_set_remove_all(id);
            } else {
                for x in val + 1..=max {
                    self.sparse_set_remove(id, x);
                }
            }
        }
    }

    fn sparse_set_for_each<F: FnMut(isize)>(&self, id: ReversibleSparseSet, f: F) {
        let ss = self.sparse_sets[id.0];
        let len = self.get_int(ss.size) as usize;

        self.sparse_set_data[ss.start..ss.start + len]
            .iter()
            .map(|v| *v as isize + ss.val_offset)
            .for_each(f)
    }
}
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// private methods
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
impl TrailedStateManager {
    /// swaps the items whose index slots are a and b in the sparse set
    fn sparse_set_swap(&mut self, a: usize, b: usize) {
        let ia = self.sparse_set_idx[a];
        let ib = self.sparse_set_idx[b];
        self.sparse_set_data.swap(ia, ib);
        self.sparse_set_idx.swap(a, b)
    }
    /// keeps min and max up to date after `val` was removed and the set
    /// shrunk to `size` items
    fn sparse_set_update_bounds(&mut self, ss: SparseSet, size: usize, val: usize) {
        if size == 0 {
            return;
        }
        let content = &self.sparse_set_data[ss.start..ss.start + size];
        if self.get_int(ss.min) as usize == val {
            let min = content.iter().min().copied().unwrap_or(val);
            self.set_int(ss.min, min as isize);
        }
        let content = &self.sparse_set_data[ss.start..ss.start + size];
        if self.get_int(ss.max) as usize == val {
            let max = content.iter().max().copied().unwrap_or(val);
            self.set_int(ss.max, max as isize);
        }
    }
}

// #############################################################################
// ### UNIT TESTS ##############################################################
// #############################################################################
