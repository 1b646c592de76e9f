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

//! This module provides the implementation of an incremental maximum matching
//! algorithm. The matching itself lives in the value graph (on the trail), so
//! that a restoration brings back a valid matching for free. The only thing
//! this module has to do is to repair it after some of its edges were lost.
//!
//! The repair proceeds in rounds (a la Hopcroft-Karp). During a round, an
//! alternating path is searched from every free value towards an unmatched
//! variable. No variable is visited twice in a round, which makes the paths
//! vertex disjoint; they are all flipped once the round is over. A round that
//! does not find any path proves that no matching covers all the variables.

use crate::prelude::*;

use super::partition::ValueGraph;
use super::Timestamp;

/// The scratch memory used to look for augmenting paths
pub(super) struct Matcher {
    /// The current round
    clock: Timestamp,
    /// What round was each variable visited for the last time ?
    seen: Vec<Timestamp>,
    /// What round was each value expanded for the last time ?
    expanded: Vec<Timestamp>,
    /// The next live edge of each value that remains to be explored
    next_edge: Vec<usize>,
    /// The path being explored: the values ...
    path_values: Vec<usize>,
    /// ... and the variables that led from one value to the next
    path_vars: Vec<usize>,
    /// The (variable, value) edges entering the matching at the end of the round
    flips: Vec<(usize, usize)>,
}

impl Matcher {
    pub fn new(n_vars: usize, n_values: usize) -> Self {
        Self {
            clock: Timestamp::default(),
            seen: vec![Timestamp::default(); n_vars],
            expanded: vec![Timestamp::default(); n_values],
            next_edge: vec![0; n_values],
            path_values: Vec::with_capacity(n_values),
            path_vars: Vec::with_capacity(n_vars),
            flips: vec![],
        }
    }

    /// Matches every unmatched variable with the first free value it can
    /// take (if there is one)
    pub fn greedy(&mut self, graph: &ValueGraph, store: &mut dyn DomainStore) {
        for i in 0..graph.n_active(store) {
            let x = graph.active_vars(store)[i];
            if graph.mate(store, x).is_some() {
                continue;
            }
            let value = graph
                .edges_of(x)
                .filter(|e| graph.is_live(store, *e))
                .map(|e| graph.edge_value(e))
                .find(|v| graph.owner(store, *v).is_none());

            if let Some(v) = value {
                graph.set_match(store, x, v);
            }
        }
    }

    /// Extends the matching until it covers all the active variables and
    /// returns the number of augmenting paths that were needed.
    ///
    /// Fails with `NoMaximumMatching` when some variable cannot be matched.
    pub fn augment(&mut self, graph: &ValueGraph, store: &mut dyn DomainStore) -> CPResult<usize> {
        let mut unmatched = graph
            .active_vars(store)
            .iter()
            .filter(|x| graph.mate(store, **x).is_none())
            .count();

        let mut total = 0;
        while unmatched > 0 {
            self.clock = self.clock.inc();
            self.flips.clear();

            let mut found = 0;
            for v in 0..graph.n_values() {
                if found == unmatched {
                    break;
                }
                if graph.is_free(store, v) && self.find_path(graph, store, v) {
                    found += 1;
                }
            }
            if found == 0 {
                return Err(Inconsistency::NoMaximumMatching);
            }

            for (x, v) in self.flips.iter().copied() {
                graph.set_match(store, x, v);
            }
            unmatched -= found;
            total += found;
        }
        Ok(total)
    }

    /// Depth first search for an alternating path going from the free value
    /// `root` to an unmatched variable. The edges of a path that was found
    /// are recorded in `flips`.
    fn find_path(&mut self, graph: &ValueGraph, store: &dyn DomainStore, root: usize) -> bool {
        self.path_values.clear();
        self.path_vars.clear();
        self.expand(root);

        while let Some(v) = self.path_values.last().copied() {
            let mut deeper = false;
            while self.next_edge[v] < graph.live_count(store, v) {
                let y = graph.live_var(v, self.next_edge[v]);
                self.next_edge[v] += 1;
                if self.seen[y] == self.clock || !graph.is_active(store, y) {
                    continue;
                }
                self.seen[y] = self.clock;
                self.path_vars.push(y);

                match graph.mate(store, y) {
                    None => {
                        let vars = self.path_vars.iter().copied();
                        let values = self.path_values.iter().copied();
                        self.flips.extend(vars.zip(values));
                        return true;
                    }
                    Some(w) => {
                        self.expand(w);
                        deeper = true;
                        break;
                    }
                }
            }
            if !deeper {
                self.path_values.pop();
                self.path_vars.pop();
            }
        }
        false
    }

    fn expand(&mut self, v: usize) {
        if self.expanded[v] != self.clock {
            self.expanded[v] = self.clock;
            self.next_edge[v] = 0;
        }
        self.path_values.push(v);
    }
}

#[cfg(test)]
mod test_matcher {
    use crate::prelude::*;

    use super::super::partition::{RoundChanges, ValueGraph, VarQueue};
    use super::Matcher;

    #[test]
    fn greedy_then_augment_covers_all_variables() {
        let mut cp = DefaultCpModel::default();
        let vars = vec![
            ivar(&mut cp, &[1, 2]),
            ivar(&mut cp, &[1, 2]),
            ivar(&mut cp, &[1, 2, 3, 4]),
        ];
        let graph = ValueGraph::new(&mut cp, &vars);
        let mut matcher = Matcher::new(graph.n_vars(), graph.n_values());

        matcher.greedy(&graph, &mut cp);
        assert_eq!(Ok(0), matcher.augment(&graph, &mut cp));
        check(&cp, &graph, &vars);
    }

    #[test]
    fn augment_follows_alternating_paths() {
        let mut cp = DefaultCpModel::default();
        let vars = vec![
            ivar(&mut cp, &[1, 4, 5]),
            ivar(&mut cp, &[9, 10]),
            ivar(&mut cp, &[1, 4, 5, 8, 9]),
            ivar(&mut cp, &[1, 4, 5]),
            ivar(&mut cp, &[1, 4, 5, 8, 9]),
            ivar(&mut cp, &[1, 4, 5]),
        ];
        let graph = ValueGraph::new(&mut cp, &vars);
        let mut matcher = Matcher::new(graph.n_vars(), graph.n_values());

        // no greedy pass: one path per variable
        assert_eq!(Ok(6), matcher.augment(&graph, &mut cp));
        check(&cp, &graph, &vars);
    }

    #[test]
    fn a_lost_matching_edge_is_repaired() {
        let mut cp = DefaultCpModel::default();
        let vars = vec![
            ivar(&mut cp, &[1, 2]),
            ivar(&mut cp, &[1, 2, 3]),
            ivar(&mut cp, &[2, 3]),
        ];
        let mut graph = ValueGraph::new(&mut cp, &vars);
        let mut matcher = Matcher::new(graph.n_vars(), graph.n_values());
        matcher.greedy(&graph, &mut cp);
        matcher.augment(&graph, &mut cp).unwrap();

        cp.save_state();
        let x0 = graph.mate(&cp, 0).map(|v| graph.value(v)).unwrap();
        cp.remove(vars[0], x0).unwrap();

        let mut queue = VarQueue::new(3);
        let mut changes = RoundChanges::default();
        queue.push(0);
        graph.synchronize(&mut cp, &mut queue, &mut changes).unwrap();
        assert!(changes.matching_changed());

        assert_eq!(Ok(()), matcher.augment(&graph, &mut cp).map(|_| ()));
        check(&cp, &graph, &vars);

        cp.restore_state();
        assert_eq!(Some(x0), graph.mate(&cp, 0).map(|v| graph.value(v)));
    }

    #[test]
    fn pigeonhole_has_no_maximum_matching() {
        let mut cp = DefaultCpModel::default();
        let vars = vec![
            ivar(&mut cp, &[1, 4, 5]),
            ivar(&mut cp, &[1, 4, 5]),
            ivar(&mut cp, &[1, 4, 5]),
            ivar(&mut cp, &[1, 4, 5]),
            ivar(&mut cp, &[1, 4, 5, 8, 9]),
        ];
        let graph = ValueGraph::new(&mut cp, &vars);
        let mut matcher = Matcher::new(graph.n_vars(), graph.n_values());

        matcher.greedy(&graph, &mut cp);
        assert_eq!(
            Err(Inconsistency::NoMaximumMatching),
            matcher.augment(&graph, &mut cp)
        );
    }

    fn ivar(cp: &mut DefaultCpModel, val: &[isize]) -> Variable {
        let min = val.first().copied().unwrap();
        let max = val.last().copied().unwrap();
        let var = cp.new_int_var(min, max);

        let mut v = val.iter().copied();
        let mut k = v.next();
        for i in min..=max {
            if Some(i) == k {
                k = v.next();
            } else {
                cp.remove(var, i).unwrap();
            }
        }
        var
    }

    fn check(cp: &DefaultCpModel, graph: &ValueGraph, vars: &[Variable]) {
        assert!(graph.matching_is_consistent(cp));
        let mut values = vec![];
        for (x, var) in vars.iter().copied().enumerate() {
            let value = graph.value(graph.mate(cp, x).unwrap());
            assert!(cp.contains(var, value));
            values.push(value);
        }
        values.sort_unstable();
        values.dedup();
        assert_eq!(vars.len(), values.len());
    }
}
