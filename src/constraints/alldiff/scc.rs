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

//! Strongly connected components of the matching graph.
//!
//! The nodes are the active variables and there is an arc `x -> y` whenever
//! `y` may still take the value matched to `x`. Each component gets a tag
//! which is kept on the trail. As long as the matching does not change,
//! removing arcs can only split components: only the components that lost
//! something have to be recomputed, and their arcs never leave them.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::prelude::*;

use super::partition::ValueGraph;

const UNSET: usize = usize::MAX;
const OUTSIDE: isize = isize::MIN;

pub(super) struct SccAnalyzer {
    /// the component tag of each variable
    tags: Vec<ReversibleInt>,
    /// the next fresh tag
    next_tag: isize,

    /// tarjan's bookkeeping
    index: Vec<usize>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    /// the recursion stack: a variable and the next arc to explore
    calls: Vec<(usize, usize)>,

    /// arcs are only followed between variables of the same region
    region: Vec<isize>,
    /// the variables being (re)tagged
    members: Vec<usize>,
    affected: FxHashSet<isize>,
}

impl SccAnalyzer {
    pub fn new<S: DomainStore + ?Sized>(store: &mut S, n_vars: usize) -> Self {
        Self {
            tags: (0..n_vars).map(|_| store.manage_int(-1)).collect(),
            next_tag: 0,
            index: vec![UNSET; n_vars],
            lowlink: vec![UNSET; n_vars],
            on_stack: vec![false; n_vars],
            stack: Vec::with_capacity(n_vars),
            calls: Vec::with_capacity(n_vars),
            region: vec![OUTSIDE; n_vars],
            members: Vec::with_capacity(n_vars),
            affected: FxHashSet::default(),
        }
    }

    /// The tag of the component of x
    pub fn tag(&self, store: &dyn DomainStore, x: usize) -> isize {
        store.get_int(self.tags[x])
    }

    /// Tags the components of the whole graph
    pub fn full(&mut self, graph: &ValueGraph, store: &mut dyn DomainStore) {
        self.members.clear();
        self.members.extend_from_slice(graph.active_vars(store));
        for x in self.members.iter().copied() {
            self.region[x] = 0;
        }
        self.tarjan(graph, store);
    }

    /// Retags the components that contained one of the `touched` variables.
    /// This is only valid when the matching has not changed since the last
    /// time the tags were computed.
    pub fn incremental(
        &mut self,
        graph: &ValueGraph,
        store: &mut dyn DomainStore,
        touched: &[usize],
    ) {
        self.affected.clear();
        for x in touched.iter().copied() {
            self.affected.insert(self.tag(store, x));
        }

        self.members.clear();
        for x in graph.active_vars(store).iter().copied() {
            let tag = store.get_int(self.tags[x]);
            if self.affected.contains(&tag) {
                self.region[x] = tag;
                self.members.push(x);
            }
        }
        self.tarjan(graph, store);
    }

    /// Checks that the current tags describe the same components as a full
    /// pass would. The full pass overwrites the tags.
    pub fn tags_are_consistent(
        &mut self,
        graph: &ValueGraph,
        store: &mut dyn DomainStore,
    ) -> bool {
        let view: &dyn DomainStore = &*store;
        let active = graph.active_vars(view).to_vec();
        let before: Vec<isize> = active.iter().map(|x| self.tag(view, *x)).collect();
        self.full(graph, store);

        let mut forward = FxHashMap::default();
        let mut backward = FxHashMap::default();
        for (x, old) in active.iter().copied().zip(before) {
            let new = self.tag(store, x);
            let same_new = *forward.entry(old).or_insert(new) == new;
            let same_old = *backward.entry(new).or_insert(old) == old;
            if !(same_new && same_old) {
                return false;
            }
        }
        true
    }

    fn tarjan(&mut self, graph: &ValueGraph, store: &mut dyn DomainStore) {
        let mut counter = 0;
        for i in 0..self.members.len() {
            let root = self.members[i];
            if self.index[root] == UNSET {
                self.visit(graph, store, root, &mut counter);
            }
        }

        for x in self.members.iter().copied() {
            self.index[x] = UNSET;
            self.region[x] = OUTSIDE;
        }
    }

    fn open(&mut self, x: usize, counter: &mut usize) {
        self.index[x] = *counter;
        self.lowlink[x] = *counter;
        *counter += 1;
        self.on_stack[x] = true;
        self.stack.push(x);
        self.calls.push((x, 0));
    }

    fn visit(
        &mut self,
        graph: &ValueGraph,
        store: &mut dyn DomainStore,
        root: usize,
        counter: &mut usize,
    ) {
        self.open(root, counter);

        while let Some((x, k)) = self.calls.last().copied() {
            let mate = graph.mate(store, x);
            let arcs = mate.map_or(0, |v| graph.live_count(store, v));

            if let (Some(v), true) = (mate, k < arcs) {
                if let Some(top) = self.calls.last_mut() {
                    top.1 = k + 1;
                }
                let y = graph.live_var(v, k);
                if y == x || self.region[y] != self.region[x] {
                    continue;
                }
                if self.index[y] == UNSET {
                    self.open(y, counter);
                } else if self.on_stack[y] {
                    self.lowlink[x] = self.lowlink[x].min(self.index[y]);
                }
                continue;
            }

            self.calls.pop();
            if let Some((parent, _)) = self.calls.last().copied() {
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[x]);
            }
            if self.lowlink[x] == self.index[x] {
                let tag = self.next_tag;
                self.next_tag += 1;
                while let Some(y) = self.stack.pop() {
                    self.on_stack[y] = false;
                    store.set_int(self.tags[y], tag);
                    if y == x {
                        break;
                    }
                }
            }
        }
    }
}
