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

//! The value graph of the all different constraint.
//!
//! Variables and values are given dense ids at construction time. The edge
//! `(x, v)` exists iff `v` belonged to the initial domain of `x`; the edges
//! are stored once, in variable order, and every value keeps a permutation of
//! the edges that reach it. The first `live[v]` entries of that permutation
//! are the variables that may still take `v`. Removing an edge swaps it with
//! the last live entry and decrements the (trailed) cursor, which is all it
//! takes for a restoration to bring it back.
//!
//! The same trick is applied to the variables themselves: the first
//! `n_active` entries of `active` are the variables that are not fixed yet.
//! A grounded variable keeps its matching edge forever (in that branch).

use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::asserts::gac_assert_simple;
use crate::prelude::*;

/// What the synchronization of the value graph with the domains has changed
#[derive(Debug, Default, Clone)]
pub(super) struct RoundChanges {
    /// variables that lost at least one edge or got grounded
    pub touched: Vec<usize>,
    /// variables whose matching edge has been invalidated
    pub freed: Vec<usize>,
    /// number of variables that got grounded
    pub grounded: usize,
    /// a grounded variable got matched to its value
    pub rematched: bool,
    /// number of edges that were removed from the graph
    pub unlinked: usize,
}
impl RoundChanges {
    pub fn clear(&mut self) {
        self.touched.clear();
        self.freed.clear();
        self.grounded = 0;
        self.rematched = false;
        self.unlinked = 0;
    }
    pub fn is_empty(&self) -> bool {
        self.unlinked == 0 && self.grounded == 0 && self.freed.is_empty() && !self.rematched
    }
    /// true iff some matching edge has been modified
    pub fn matching_changed(&self) -> bool {
        self.rematched || !self.freed.is_empty()
    }
}

/// The variables that still need to be synchronized with their domains
#[derive(Debug, Clone)]
pub(super) struct VarQueue {
    items: Vec<usize>,
    queued: Vec<bool>,
}
impl VarQueue {
    pub fn new(n: usize) -> Self {
        Self {
            items: Vec::with_capacity(n),
            queued: vec![false; n],
        }
    }
    pub fn push(&mut self, x: usize) {
        if !self.queued[x] {
            self.queued[x] = true;
            self.items.push(x);
        }
    }
    pub fn pop(&mut self) -> Option<usize> {
        let x = self.items.pop()?;
        self.queued[x] = false;
        Some(x)
    }
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }
}

/// The bipartite variable/value graph along with the current matching
pub(super) struct ValueGraph {
    /// the decision variables (indexed by local id)
    vars: Vec<Variable>,
    /// the local ids of the variables sharing the same primitive variable
    routes: FxHashMap<Variable, Vec<usize>>,
    /// the primitive variable of each local variable
    primitive: Vec<Variable>,

    /// the distinct values (indexed by value id)
    values: Vec<isize>,
    /// the dense id of each value
    value_ids: FxHashMap<isize, usize>,

    /// the edges of variable x are var_start[x]..var_start[x+1]
    var_start: Vec<usize>,
    /// the variable of each edge
    edge_var: Vec<usize>,
    /// the value of each edge
    edge_val: Vec<usize>,

    /// the permutation of the edges reaching v starts at value_start[v]
    value_start: Vec<usize>,
    /// the per-value permutations of the edges
    adj: Vec<usize>,
    /// the position of each edge in `adj`
    slot: Vec<usize>,
    /// length of the live prefix of each value
    live: Vec<ReversibleInt>,
    /// total number of live edges
    n_live: ReversibleInt,

    /// the variables, not fixed ones first
    active: Vec<usize>,
    /// the position of each variable in `active`
    active_pos: Vec<usize>,
    /// how many variables are not fixed
    n_active: ReversibleInt,

    /// the value id matched to each variable (-1 when none)
    mate: Vec<ReversibleInt>,
    /// the variable matched to each value (-1 when none)
    owner: Vec<ReversibleInt>,
}

impl ValueGraph {
    /// Builds the value graph out of the current domains of `vars`
    pub fn new<S: DomainStore + ?Sized>(store: &mut S, vars: &[Variable]) -> Self {
        let n = vars.len();
        let mut routes: FxHashMap<Variable, Vec<usize>> = FxHashMap::default();
        let mut primitive = Vec::with_capacity(n);
        let mut values = vec![];
        let mut value_ids: FxHashMap<isize, usize> = FxHashMap::default();
        let mut var_start = Vec::with_capacity(n + 1);
        let mut edge_var = vec![];
        let mut edge_val = vec![];

        for (x, var) in vars.iter().copied().enumerate() {
            let prim = store.source_of_truth(var);
            routes.entry(prim).or_default().push(x);
            primitive.push(prim);

            var_start.push(edge_var.len());
            store.for_each_value(var, &mut |value| {
                let id = *value_ids.entry(value).or_insert_with(|| {
                    values.push(value);
                    values.len() - 1
                });
                edge_var.push(x);
                edge_val.push(id);
            });
        }
        var_start.push(edge_var.len());

        // counting sort of the edges by value
        let m = values.len();
        let mut value_start = vec![0; m + 1];
        for v in edge_val.iter().copied() {
            value_start[v + 1] += 1;
        }
        for v in 0..m {
            value_start[v + 1] += value_start[v];
        }
        let mut fill = value_start.clone();
        let mut adj = vec![0; edge_val.len()];
        let mut slot = vec![0; edge_val.len()];
        for (e, v) in edge_val.iter().copied().enumerate() {
            adj[fill[v]] = e;
            slot[e] = fill[v];
            fill[v] += 1;
        }

        let live = (0..m)
            .map(|v| store.manage_int((value_start[v + 1] - value_start[v]) as isize))
            .collect();
        let n_live = store.manage_int(edge_val.len() as isize);
        let n_active = store.manage_int(n as isize);
        let mate = (0..n).map(|_| store.manage_int(-1)).collect();
        let owner = (0..m).map(|_| store.manage_int(-1)).collect();

        Self {
            vars: vars.to_vec(),
            routes,
            primitive,
            values,
            value_ids,
            var_start,
            edge_var,
            edge_val,
            value_start,
            adj,
            slot,
            live,
            n_live,
            active: (0..n).collect(),
            active_pos: (0..n).collect(),
            n_active,
            mate,
            owner,
        }
    }

    //~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
    // Queries
    //~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
    pub fn n_vars(&self) -> usize {
        self.vars.len()
    }
    pub fn n_values(&self) -> usize {
        self.values.len()
    }
    pub fn var(&self, x: usize) -> Variable {
        self.vars[x]
    }
    pub fn value(&self, v: usize) -> isize {
        self.values[v]
    }
    /// The local ids of all the variables whose primitive is `var`
    pub fn route(&self, var: Variable) -> &[usize] {
        self.routes.get(&var).map_or(&[], Vec::as_slice)
    }
    pub fn edges_of(&self, x: usize) -> Range<usize> {
        self.var_start[x]..self.var_start[x + 1]
    }
    /// The value id at the end of edge e
    pub fn edge_value(&self, e: usize) -> usize {
        self.edge_val[e]
    }
    pub fn n_live(&self, store: &dyn DomainStore) -> usize {
        store.get_int(self.n_live) as usize
    }
    /// How many variables may still take value `v`
    pub fn live_count(&self, store: &dyn DomainStore, v: usize) -> usize {
        store.get_int(self.live[v]) as usize
    }
    /// The k-th variable that may still take value `v`
    pub fn live_var(&self, v: usize, k: usize) -> usize {
        self.edge_var[self.adj[self.value_start[v] + k]]
    }
    /// All the variables that may still take value `v`
    pub fn live_vars(&self, store: &dyn DomainStore, v: usize) -> impl Iterator<Item = usize> + '_ {
        let start = self.value_start[v];
        let end = start + self.live_count(store, v);
        self.adj[start..end].iter().map(move |e| self.edge_var[*e])
    }
    pub fn is_live(&self, store: &dyn DomainStore, e: usize) -> bool {
        let v = self.edge_val[e];
        self.slot[e] < self.value_start[v] + self.live_count(store, v)
    }
    pub fn n_active(&self, store: &dyn DomainStore) -> usize {
        store.get_int(self.n_active) as usize
    }
    pub fn is_active(&self, store: &dyn DomainStore, x: usize) -> bool {
        self.active_pos[x] < self.n_active(store)
    }
    /// The variables that are not fixed yet
    pub fn active_vars(&self, store: &dyn DomainStore) -> &[usize] {
        &self.active[..self.n_active(store)]
    }
    pub fn mate(&self, store: &dyn DomainStore, x: usize) -> Option<usize> {
        let v = store.get_int(self.mate[x]);
        (v >= 0).then_some(v as usize)
    }
    pub fn owner(&self, store: &dyn DomainStore, v: usize) -> Option<usize> {
        let x = store.get_int(self.owner[v]);
        (x >= 0).then_some(x as usize)
    }
    /// A free value is a value that is not matched but may still be taken by
    /// some variable
    pub fn is_free(&self, store: &dyn DomainStore, v: usize) -> bool {
        self.owner(store, v).is_none() && self.live_count(store, v) > 0
    }
    /// True iff every variable is matched through one of its live edges and
    /// the mate and owner cells agree with one another
    pub fn matching_is_consistent(&self, store: &dyn DomainStore) -> bool {
        (0..self.n_vars()).all(|x| match self.mate(store, x) {
            None => false,
            Some(v) => {
                self.owner(store, v) == Some(x)
                    && self.edges_of(x).any(|e| self.edge_val[e] == v && self.is_live(store, e))
            }
        })
    }

    //~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
    // Matching cells
    //~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
    /// Matches x with v. The previous partners of x and v are *not* released
    /// (an augmenting path rewrites them anyway)
    pub fn set_match(&self, store: &mut dyn DomainStore, x: usize, v: usize) {
        store.set_int(self.mate[x], v as isize);
        store.set_int(self.owner[v], x as isize);
    }
    /// Releases the matching edge of x (if any)
    pub fn unmatch(&self, store: &mut dyn DomainStore, x: usize) {
        if let Some(v) = self.mate(store, x) {
            store.set_int(self.mate[x], -1);
            if self.owner(store, v) == Some(x) {
                store.set_int(self.owner[v], -1);
            }
        }
    }

    //~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
    // Updates
    //~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
    /// Removes edge e from the live prefix of its value
    fn unlink(&mut self, store: &mut dyn DomainStore, e: usize) {
        let v = self.edge_val[e];
        let last = self.value_start[v] + self.live_count(store, v) - 1;
        let pos = self.slot[e];
        let other = self.adj[last];

        self.adj.swap(pos, last);
        self.slot[other] = pos;
        self.slot[e] = last;

        store.decrement(self.live[v]);
        store.decrement(self.n_live);
    }
    /// Moves x out of the active variables
    fn ground(&mut self, store: &mut dyn DomainStore, x: usize) {
        let last = self.n_active(store) - 1;
        let pos = self.active_pos[x];
        let other = self.active[last];

        self.active.swap(pos, last);
        self.active_pos[other] = pos;
        self.active_pos[x] = last;

        store.decrement(self.n_active);
    }
    /// Enqueues x and every other variable sharing its primitive variable
    pub fn enqueue(&self, queue: &mut VarQueue, x: usize) {
        for y in self.route(self.primitive[x]).iter().copied() {
            queue.push(y);
        }
    }

    /// Brings the graph back in line with the domains of the queued variables.
    /// Stale edges are removed, and every variable whose domain became a
    /// singleton is grounded: it gets matched to its value and that value is
    /// removed from all the other variables (which in turn get queued, until
    /// no new singleton shows up).
    pub fn synchronize(
        &mut self,
        store: &mut dyn DomainStore,
        queue: &mut VarQueue,
        changes: &mut RoundChanges,
    ) -> CPResult<()> {
        let mut neighbours = vec![];
        while let Some(x) = queue.pop() {
            if !self.is_active(store, x) {
                continue;
            }
            let var = self.vars[x];
            let mut touched = false;

            for e in self.edges_of(x) {
                let v = self.edge_val[e];
                if self.is_live(store, e) && !store.contains(var, self.values[v]) {
                    self.unlink(store, e);
                    changes.unlinked += 1;
                    touched = true;
                    if self.mate(store, x) == Some(v) {
                        self.unmatch(store, x);
                        changes.freed.push(x);
                    }
                }
            }

            if store.size(var) == 1 {
                touched = true;
                let value = store.min(var).ok_or(Inconsistency::DomainWipeout)?;
                let a = self.value_ids.get(&value).copied();
                gac_assert_simple!(a.is_some(), "a domain grew a value it never had");
                let Some(a) = a else { continue };

                if self.mate(store, x) != Some(a) {
                    if let Some(y) = self.owner(store, a) {
                        self.unmatch(store, y);
                        changes.freed.push(y);
                    }
                    self.unmatch(store, x);
                    self.set_match(store, x, a);
                    changes.rematched = true;
                }
                self.ground(store, x);
                changes.grounded += 1;

                neighbours.clear();
                neighbours.extend(self.live_vars(store, a).filter(|y| *y != x));
                for y in neighbours.iter().copied() {
                    store.remove(self.vars[y], value)?;
                    self.enqueue(queue, y);
                }
            }

            if touched {
                changes.touched.push(x);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_value_graph {
    use super::*;

    fn ivar(cp: &mut DefaultCpModel, val: &[isize]) -> Variable {
        let min = val.iter().copied().min().unwrap();
        let max = val.iter().copied().max().unwrap();
        let var = cp.new_int_var(min, max);
        for i in min..=max {
            if !val.contains(&i) {
                cp.remove(var, i).unwrap();
            }
        }
        var
    }

    fn live_values(cp: &DefaultCpModel, g: &ValueGraph, x: usize) -> Vec<isize> {
        let mut out: Vec<isize> = g
            .edges_of(x)
            .filter(|e| g.is_live(cp, *e))
            .map(|e| g.value(g.edge_val[e]))
            .collect();
        out.sort_unstable();
        out
    }

    fn sync(cp: &mut DefaultCpModel, g: &mut ValueGraph, xs: &[usize]) -> CPResult<RoundChanges> {
        let mut queue = VarQueue::new(g.n_vars());
        let mut changes = RoundChanges::default();
        for x in xs.iter().copied() {
            queue.push(x);
        }
        g.synchronize(cp, &mut queue, &mut changes)?;
        Ok(changes)
    }

    #[test]
    fn construction_builds_one_edge_per_initial_value() {
        let mut cp = DefaultCpModel::default();
        let x = ivar(&mut cp, &[1, 3]);
        let y = ivar(&mut cp, &[3, 4, 5]);
        let g = ValueGraph::new(&mut cp, &[x, y]);

        assert_eq!(2, g.n_vars());
        assert_eq!(4, g.n_values());
        assert_eq!(5, g.n_live(&cp));
        assert_eq!(2, g.n_active(&cp));
        assert_eq!(vec![1, 3], live_values(&cp, &g, 0));
        assert_eq!(vec![3, 4, 5], live_values(&cp, &g, 1));

        let three = g.value_ids[&3];
        assert_eq!(2, g.live_count(&cp, three));
        assert!(g.is_free(&cp, three));
    }

    #[test]
    fn stale_edges_are_unlinked_and_restored() {
        let mut cp = DefaultCpModel::default();
        let x = ivar(&mut cp, &[1, 2, 3]);
        let y = ivar(&mut cp, &[1, 2, 3]);
        let mut g = ValueGraph::new(&mut cp, &[x, y]);

        cp.save_state();
        cp.remove(x, 2).unwrap();
        let changes = sync(&mut cp, &mut g, &[0]).unwrap();
        assert_eq!(1, changes.unlinked);
        assert_eq!(vec![0], changes.touched);
        assert_eq!(vec![1, 3], live_values(&cp, &g, 0));
        assert_eq!(5, g.n_live(&cp));

        cp.restore_state();
        assert_eq!(vec![1, 2, 3], live_values(&cp, &g, 0));
        assert_eq!(6, g.n_live(&cp));
    }

    #[test]
    fn losing_the_matched_value_frees_the_variable() {
        let mut cp = DefaultCpModel::default();
        let x = ivar(&mut cp, &[1, 2, 3]);
        let mut g = ValueGraph::new(&mut cp, &[x]);
        let one = g.value_ids[&1];
        g.set_match(&mut cp, 0, one);

        cp.remove(x, 1).unwrap();
        let changes = sync(&mut cp, &mut g, &[0]).unwrap();
        assert_eq!(vec![0], changes.freed);
        assert_eq!(None, g.mate(&cp, 0));
        assert_eq!(None, g.owner(&cp, one));
    }

    #[test]
    fn singletons_cascade() {
        let mut cp = DefaultCpModel::default();
        let a = ivar(&mut cp, &[1, 2, 3, 4]);
        let b = ivar(&mut cp, &[1, 2]);
        let c = ivar(&mut cp, &[2, 3]);
        let d = ivar(&mut cp, &[3, 4]);
        let mut g = ValueGraph::new(&mut cp, &[a, b, c, d]);

        cp.fix(a, 1).unwrap();
        let changes = sync(&mut cp, &mut g, &[0]).unwrap();

        // a = 1 => b = 2 => c = 3 => d = 4
        assert_eq!(4, changes.grounded);
        assert!(changes.rematched);
        assert_eq!(0, g.n_active(&cp));
        assert_eq!(Some(4), cp.min(d));
        for x in 0..4 {
            assert_eq!(Some(g.value_ids[&(x as isize + 1)]), g.mate(&cp, x));
        }
    }

    #[test]
    fn a_cascade_can_wipe_out_a_domain() {
        let mut cp = DefaultCpModel::default();
        let a = ivar(&mut cp, &[1, 2]);
        let b = ivar(&mut cp, &[1]);
        let c = ivar(&mut cp, &[1]);
        let mut g = ValueGraph::new(&mut cp, &[a, b, c]);

        assert_eq!(
            Err(Inconsistency::DomainWipeout),
            sync(&mut cp, &mut g, &[1, 2]).map(|_| ())
        );
    }

    #[test]
    fn grounding_steals_the_value_from_its_previous_owner() {
        let mut cp = DefaultCpModel::default();
        let x = ivar(&mut cp, &[1, 2]);
        let y = ivar(&mut cp, &[1, 2]);
        let mut g = ValueGraph::new(&mut cp, &[x, y]);
        let one = g.value_ids[&1];
        let two = g.value_ids[&2];
        g.set_match(&mut cp, 0, one);
        g.set_match(&mut cp, 1, two);

        cp.fix(y, 1).unwrap();
        let changes = sync(&mut cp, &mut g, &[1]).unwrap();

        assert_eq!(Some(one), g.mate(&cp, 1));
        assert_eq!(Some(1), g.owner(&cp, one));
        // x was freed, then grounded to 2 by the cascade
        assert!(changes.freed.contains(&0));
        assert_eq!(Some(two), g.mate(&cp, 0));
        assert_eq!(Some(2), cp.min(x));
    }

    #[test]
    fn views_sharing_a_primitive_are_queued_together() {
        let mut cp = DefaultCpModel::default();
        let x = cp.new_int_var(0, 3);
        let y = cp.plus(x, 10);
        let g = ValueGraph::new(&mut cp, &[x, y]);

        let mut queue = VarQueue::new(2);
        g.enqueue(&mut queue, 0);
        let mut seen = vec![];
        while let Some(z) = queue.pop() {
            seen.push(z);
        }
        seen.sort_unstable();
        assert_eq!(vec![0, 1], seen);
        assert_eq!(&[0, 1], g.route(x));
    }
}
