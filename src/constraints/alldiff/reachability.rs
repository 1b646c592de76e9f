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

//! The variables that can be reached from a free value by an alternating
//! path. Their matched value may be given up for some free one, which makes
//! every edge leading to that value consistent.
//!
//! The reached set does not depend on the maximum matching at hand, and it can
//! only shrink as edges are removed or variables get fixed. Hence, once the
//! search has reached as many variables as it did the last time, it has found
//! them all.

use crate::asserts::gac_assert_simple;
use crate::prelude::*;

use super::partition::ValueGraph;
use super::Timestamp;

pub(super) struct Reachability {
    clock: Timestamp,
    reached: Vec<Timestamp>,
    /// values waiting to be expanded
    queue: Vec<usize>,
    /// how many variables were reached by the last search
    previous: ReversibleInt,
    free_values: usize,
}

impl Reachability {
    pub fn new<S: DomainStore + ?Sized>(store: &mut S, n_vars: usize) -> Self {
        Self {
            clock: Timestamp::default(),
            reached: vec![Timestamp::default(); n_vars],
            queue: vec![],
            previous: store.manage_int(n_vars as isize),
            free_values: 0,
        }
    }

    /// The number of free values found by the last search
    pub fn free_values(&self) -> usize {
        self.free_values
    }

    pub fn is_reached(&self, x: usize) -> bool {
        self.reached[x] == self.clock
    }

    /// Marks the variables that are reachable from a free value and returns
    /// how many of them there are
    pub fn compute(&mut self, graph: &ValueGraph, store: &mut dyn DomainStore) -> usize {
        self.clock = self.clock.inc();
        self.queue.clear();
        for v in 0..graph.n_values() {
            if graph.is_free(store, v) {
                self.queue.push(v);
            }
        }
        self.free_values = self.queue.len();

        let previous = store.get_int(self.previous) as usize;
        let limit = previous.min(graph.n_active(store));

        let mut count = 0;
        let mut head = 0;
        'bfs: while head < self.queue.len() && count < limit {
            let v = self.queue[head];
            head += 1;

            for k in 0..graph.live_count(store, v) {
                let y = graph.live_var(v, k);
                if self.reached[y] == self.clock || !graph.is_active(store, y) {
                    continue;
                }
                self.reached[y] = self.clock;
                count += 1;
                if count == limit {
                    break 'bfs;
                }
                if let Some(w) = graph.mate(store, y) {
                    self.queue.push(w);
                }
            }
        }

        gac_assert_simple!(count <= previous, "the reached set grew");
        store.set_int(self.previous, count as isize);
        count
    }
}
