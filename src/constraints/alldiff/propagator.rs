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

//! The domain consistent propagator of the all different constraint.
//!
//! Every execution loops over the same steps until nothing changes anymore:
//! 1. synchronize the value graph with the domains of the modified variables
//! 2. repair the maximum matching (when some matched edge was lost)
//! 3. tag the strongly connected components (incrementally when possible)
//! 4. find the variables reachable from a free value
//! 5. remove every edge that is neither matched, nor part of an alternating
//!    cycle, nor reachable from a free value.

use log::trace;

use crate::asserts::{gac_assert_advanced, gac_assert_simple};
use crate::prelude::*;

use super::matching::Matcher;
use super::partition::{RoundChanges, ValueGraph, VarQueue};
use super::reachability::Reachability;
use super::scc::SccAnalyzer;
use super::AllDifferentOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchingState {
    Unchanged,
    Repaired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SccMode {
    Full,
    Incremental,
}

/// Enforces the generalized arc consistency of `AllDifferent(vars)`
pub struct AllDifferentPropagator {
    options: AllDifferentOptions,
    graph: ValueGraph,
    matcher: Matcher,
    scc: SccAnalyzer,
    reach: Reachability,

    /// the variables whose domain must be synchronized with the graph
    queue: VarQueue,
    changes: RoundChanges,
    /// the deductions of the current round (local variable, value)
    removals: Vec<(usize, isize)>,
    fixes: Vec<(usize, isize)>,
    /// false until a first matching has been found
    initialized: bool,
}

impl AllDifferentPropagator {
    pub fn new<S: DomainStore + ?Sized>(
        store: &mut S,
        vars: &[Variable],
        options: AllDifferentOptions,
    ) -> Self {
        let graph = ValueGraph::new(store, vars);
        let n = graph.n_vars();
        Self {
            options,
            matcher: Matcher::new(n, graph.n_values()),
            scc: SccAnalyzer::new(store, n),
            reach: Reachability::new(store, n),
            queue: VarQueue::new(n),
            changes: RoundChanges::default(),
            removals: vec![],
            fixes: vec![],
            initialized: false,
            graph,
        }
    }
    /// The number of variables of the constraint
    pub fn n_vars(&self) -> usize {
        self.graph.n_vars()
    }
    /// The number of distinct values in the initial domains
    pub fn n_values(&self) -> usize {
        self.graph.n_values()
    }

    fn repair_matching(&mut self, store: &mut dyn DomainStore) -> CPResult<MatchingState> {
        if !self.initialized {
            self.matcher.greedy(&self.graph, store);
            self.matcher.augment(&self.graph, store)?;
            self.initialized = true;
            Ok(MatchingState::Repaired)
        } else if self.changes.matching_changed() {
            self.matcher.augment(&self.graph, store)?;
            Ok(MatchingState::Repaired)
        } else {
            Ok(MatchingState::Unchanged)
        }
    }

    /// When there are no free values, every value must be used. A value
    /// which only one active variable can take is thus assigned to it.
    fn permutation_shortcut(&mut self, store: &dyn DomainStore) {
        self.fixes.clear();
        if !self.options.permutation_shortcut || self.reach.free_values() > 0 {
            return;
        }
        for v in 0..self.graph.n_values() {
            if self.graph.live_count(store, v) != 1 {
                continue;
            }
            if let Some(x) = self.graph.owner(store, v) {
                if self.graph.is_active(store, x) && store.size(self.graph.var(x)) > 1 {
                    self.fixes.push((x, self.graph.value(v)));
                }
            }
        }
    }

    /// Collects the removals of all the edges `(y, M(x))` when x cannot give
    /// its value up and y is not in the component of x
    fn prune(&mut self, store: &dyn DomainStore) {
        self.removals.clear();
        for x in self.graph.active_vars(store).iter().copied() {
            if self.reach.is_reached(x) {
                continue;
            }
            let Some(a) = self.graph.mate(store, x) else {
                continue;
            };
            let tag = self.scc.tag(store, x);
            for y in self.graph.live_vars(store, a) {
                if y != x && self.graph.is_active(store, y) && self.scc.tag(store, y) != tag {
                    self.removals.push((y, self.graph.value(a)));
                }
            }
        }
    }
}

impl Propagator for AllDifferentPropagator {
    fn propagate(&mut self, store: &mut dyn DomainStore) -> CPResult<()> {
        let mut forced = !self.initialized;
        if forced {
            for x in 0..self.graph.n_vars() {
                self.queue.push(x);
            }
        }

        let mut restarted = false;
        loop {
            self.changes.clear();
            let before = self.graph.n_live(store);
            self.graph
                .synchronize(store, &mut self.queue, &mut self.changes)?;

            if !forced && self.changes.is_empty() {
                return Ok(());
            }
            if restarted {
                gac_assert_simple!(
                    self.graph.n_live(store) < before,
                    "a deduction did not remove any edge"
                );
            }

            let matching = self.repair_matching(store)?;
            gac_assert_advanced!(self.graph.matching_is_consistent(store));

            let mode = if self.options.scc_reuse && matching == MatchingState::Unchanged {
                SccMode::Incremental
            } else {
                SccMode::Full
            };
            match mode {
                SccMode::Full => self.scc.full(&self.graph, store),
                SccMode::Incremental => {
                    self.scc
                        .incremental(&self.graph, store, &self.changes.touched);
                    gac_assert_advanced!(
                        self.scc.tags_are_consistent(&self.graph, store),
                        "the incremental components differ from the full ones"
                    );
                }
            }

            self.reach.compute(&self.graph, store);
            self.permutation_shortcut(store);
            self.prune(store);

            if self.fixes.is_empty() && self.removals.is_empty() {
                return Ok(());
            }
            trace!(
                "alldiff round ({mode:?} scc, {matching:?} matching): {} fixes, {} removals",
                self.fixes.len(),
                self.removals.len()
            );

            for (x, value) in self.fixes.iter().copied() {
                store.fix(self.graph.var(x), value)?;
                self.graph.enqueue(&mut self.queue, x);
            }
            for (y, value) in self.removals.iter().copied() {
                store.remove(self.graph.var(y), value)?;
                self.graph.enqueue(&mut self.queue, y);
            }

            forced = false;
            restarted = true;
        }
    }

    fn notify(&mut self, variable: Variable) {
        for x in self.graph.route(variable).iter().copied() {
            self.queue.push(x);
        }
    }

    fn on_restore(&mut self) {
        self.queue.clear();
    }

    /// Suggests to assign the smallest unfixed domain to its matched value.
    /// The score favors the values that many other variables compete for.
    fn branching_hint(&self, store: &dyn DomainStore) -> Option<BranchingHint> {
        let x = self
            .graph
            .active_vars(store)
            .iter()
            .copied()
            .filter(|x| store.size(self.graph.var(*x)) > 1)
            .min_by_key(|x| store.size(self.graph.var(*x)))?;
        let a = self.graph.mate(store, x)?;
        let size = store.size(self.graph.var(x));

        Some(BranchingHint {
            variable: self.graph.var(x),
            value: self.graph.value(a),
            score: (self.graph.live_count(store, a) - 1) + (size - 1),
        })
    }
}

#[cfg(test)]
mod test_alldiff_propagator {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use crate::prelude::*;

    use super::AllDifferentPropagator;

    #[test]
    fn pigeonhole_fails() {
        let mut cp = DefaultCpModel::default();
        let x = vec![
            ivar(&mut cp, &[1, 2, 3]),
            ivar(&mut cp, &[1, 2, 3]),
            ivar(&mut cp, &[1, 2, 3]),
            ivar(&mut cp, &[1, 2, 3]),
        ];
        assert_eq!(
            Err(Inconsistency::NoMaximumMatching),
            cp.install(&AllDifferent::new(x))
        );
    }

    #[test]
    fn values_needed_elsewhere_are_removed() {
        for options in all_options() {
            let mut cp = DefaultCpModel::default();
            let x = vec![
                ivar(&mut cp, &[1, 2]),
                ivar(&mut cp, &[1, 2]),
                ivar(&mut cp, &[1, 2, 3]),
            ];
            assert_eq!(Ok(()), cp.install(&AllDifferent::with_options(x.clone(), options)));
            assert_eq!(vec![1, 2], domain(&cp, x[0]));
            assert_eq!(vec![1, 2], domain(&cp, x[1]));
            assert_eq!(vec![3], domain(&cp, x[2]));
        }
    }

    #[test]
    fn fixing_a_variable_cascades_through_a_permutation() {
        let mut cp = DefaultCpModel::default();
        let x: Vec<Variable> = (0..4).map(|_| cp.new_int_var(1, 4)).collect();
        assert_eq!(Ok(()), cp.install(&AllDifferent::new(x.clone())));

        assert_eq!(Ok(()), cp.fix(x[0], 1));
        assert_eq!(Ok(()), cp.fixpoint());
        for v in x.iter().skip(1).copied() {
            assert_eq!(vec![2, 3, 4], domain(&cp, v));
        }
    }

    #[test]
    fn values_of_a_closed_component_are_removed_from_outsiders() {
        for options in all_options() {
            let mut cp = DefaultCpModel::default();
            let x = vec![
                ivar(&mut cp, &[1, 2, 3, 4]),
                ivar(&mut cp, &[1, 2, 3, 4]),
                ivar(&mut cp, &[1, 2, 3, 4]),
                ivar(&mut cp, &[1, 2, 3, 4, 5]),
            ];
            let mut p = AllDifferentPropagator::new(&mut cp, &x, options);
            assert_eq!(Ok(()), p.propagate(&mut cp));
            assert_eq!(vec![1, 2, 3, 4, 5], domain(&cp, x[3]));

            // the value of x0 disappears from the first three variables, which
            // then use up the three remaining ones
            let lost = p.graph.mate(&cp, 0).map(|v| p.graph.value(v)).unwrap();
            for v in x.iter().take(3).copied() {
                assert_eq!(Ok(()), cp.remove(v, lost));
                p.notify(v);
            }
            assert_eq!(Ok(()), p.propagate(&mut cp));

            let mate = p.graph.mate(&cp, 0).map(|v| p.graph.value(v)).unwrap();
            assert_ne!(lost, mate);
            assert!(p.graph.matching_is_consistent(&cp));

            let closed: Vec<isize> = (1..=4).filter(|v| *v != lost).collect();
            for v in x.iter().take(3).copied() {
                assert_eq!(closed, domain(&cp, v));
            }
            assert_eq!(vec![lost, 5], domain(&cp, x[3]));
        }
    }

    #[test]
    fn propagation_is_idempotent() {
        let mut cp = DefaultCpModel::default();
        let x = vec![
            ivar(&mut cp, &[1, 2, 3, 4, 5]),
            ivar(&mut cp, &[2]),
            ivar(&mut cp, &[1, 2, 3, 4, 5]),
            ivar(&mut cp, &[1]),
            ivar(&mut cp, &[1, 2, 3, 4, 5, 6]),
        ];
        let constraint = AllDifferent::new(x.clone());
        assert_eq!(Ok(()), cp.install(&constraint));
        let first: Vec<Vec<isize>> = x.iter().map(|v| domain(&cp, *v)).collect();

        // a second copy of the constraint has nothing left to do
        assert_eq!(Ok(()), cp.install(&constraint));
        let second: Vec<Vec<isize>> = x.iter().map(|v| domain(&cp, *v)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn running_the_same_propagator_again_prunes_nothing() {
        for options in all_options() {
            let mut cp = DefaultCpModel::default();
            let x = vec![
                ivar(&mut cp, &[1, 2, 3, 4, 5]),
                ivar(&mut cp, &[2, 3]),
                ivar(&mut cp, &[2, 3]),
                ivar(&mut cp, &[1, 2, 3, 4]),
                ivar(&mut cp, &[1, 2, 3, 4, 5, 6]),
            ];
            let propagator = AllDifferentPropagator::new(&mut cp, &x, options);
            let c = cp.post(Box::new(propagator));
            for v in x.iter().copied() {
                cp.propagate_on(c, DomainCondition::DomainChanged(v));
            }
            cp.schedule(c);
            assert_eq!(Ok(()), cp.fixpoint());
            let first: Vec<Vec<isize>> = x.iter().map(|v| domain(&cp, *v)).collect();
            assert_eq!(vec![1, 4], first[3]);

            cp.schedule(c);
            assert_eq!(Ok(()), cp.fixpoint());
            let second: Vec<Vec<isize>> = x.iter().map(|v| domain(&cp, *v)).collect();
            assert_eq!(first, second);

            // same thing after a decision
            assert_eq!(Ok(()), cp.fix(x[3], 4));
            assert_eq!(Ok(()), cp.fixpoint());
            let third: Vec<Vec<isize>> = x.iter().map(|v| domain(&cp, *v)).collect();
            cp.schedule(c);
            assert_eq!(Ok(()), cp.fixpoint());
            let fourth: Vec<Vec<isize>> = x.iter().map(|v| domain(&cp, *v)).collect();
            assert_eq!(third, fourth);
        }
    }

    #[test]
    fn restoration_brings_back_the_exact_domains() {
        let mut cp = DefaultCpModel::default();
        let x: Vec<Variable> = (0..5).map(|_| cp.new_int_var(0, 5)).collect();
        assert_eq!(Ok(()), cp.install(&AllDifferent::new(x.clone())));
        let before: Vec<Vec<isize>> = x.iter().map(|v| domain(&cp, *v)).collect();

        cp.save_state();
        assert_eq!(Ok(()), cp.remove_above(x[0], 1));
        assert_eq!(Ok(()), cp.remove_above(x[1], 1));
        assert_eq!(Ok(()), cp.fixpoint());
        assert!(!cp.contains(x[2], 0));
        assert!(!cp.contains(x[2], 1));

        cp.save_state();
        assert_eq!(Ok(()), cp.fix(x[0], 0));
        assert_eq!(Ok(()), cp.fixpoint());
        assert_eq!(Some(1), cp.min(x[1]));
        cp.restore_state();
        cp.restore_state();

        let after: Vec<Vec<isize>> = x.iter().map(|v| domain(&cp, *v)).collect();
        assert_eq!(before, after);

        // and the propagator is still in working order
        assert_eq!(Ok(()), cp.fix(x[4], 5));
        assert_eq!(Ok(()), cp.fixpoint());
        for v in x.iter().take(4).copied() {
            assert!(!cp.contains(v, 5));
        }
    }

    #[test]
    fn views_on_the_same_variable_interact() {
        let mut cp = DefaultCpModel::default();
        let a = cp.new_int_var(0, 2);
        let b = cp.neg(a);
        assert_eq!(Ok(()), cp.install(&AllDifferent::new(vec![a, b])));

        cp.save_state();
        assert_eq!(Ok(()), cp.fix(a, 0));
        assert_eq!(Err(Inconsistency::DomainWipeout), cp.fixpoint());
        cp.restore_state();

        assert_eq!(Ok(()), cp.fix(a, 2));
        assert_eq!(Ok(()), cp.fixpoint());
        assert_eq!(Some(-2), cp.min(b));
    }

    #[test]
    fn test5() {
        let mut cp = DefaultCpModel::default();
        let x = vec![
            ivar(&mut cp, &[1, 2, 3, 4, 5]),
            ivar(&mut cp, &[2]),
            ivar(&mut cp, &[1, 2, 3, 4, 5]),
            ivar(&mut cp, &[1]),
            ivar(&mut cp, &[1, 2, 3, 4, 5, 6]),
            ivar(&mut cp, &[6, 7, 8]),
            ivar(&mut cp, &[3]),
            ivar(&mut cp, &[6, 7, 8, 9]),
            ivar(&mut cp, &[6, 7, 8]),
        ];
        assert_eq!(Ok(()), cp.install(&AllDifferent::new(x.clone())));

        assert_eq!(cp.size(x[0]), 2);
        assert_eq!(cp.size(x[2]), 2);
        assert_eq!(cp.min(x[4]), Some(6));
        assert_eq!(cp.min(x[7]), Some(9));
        assert_eq!(cp.min(x[8]), Some(7));
        assert_eq!(cp.max(x[8]), Some(8));
    }

    #[test]
    fn test7() {
        let mut cp = DefaultCpModel::default();
        let x = vec![
            ivar(&mut cp, &[3, 4]),
            ivar(&mut cp, &[1]),
            ivar(&mut cp, &[3, 4]),
            ivar(&mut cp, &[0]),
            ivar(&mut cp, &[3, 4, 5]),
            ivar(&mut cp, &[5, 6, 7]),
            ivar(&mut cp, &[2, 9, 10]),
            ivar(&mut cp, &[5, 6, 7, 8]),
            ivar(&mut cp, &[5, 6, 7]),
        ];
        assert_eq!(Ok(()), cp.install(&AllDifferent::new(x.clone())));

        assert!(!cp.contains(x[4], 3));
        assert!(!cp.contains(x[4], 4));
        assert!(!cp.contains(x[5], 5));
        assert!(!cp.contains(x[7], 5));
        assert!(!cp.contains(x[7], 6));
        assert!(!cp.contains(x[8], 5));
    }

    #[test]
    fn test8() {
        let mut cp = DefaultCpModel::default();
        let x = vec![
            ivar(&mut cp, &[0, 2, 3, 5]),
            ivar(&mut cp, &[4]),
            ivar(&mut cp, &[-1, 1]),
            ivar(&mut cp, &[-4, -2, 0, 2, 3]),
            ivar(&mut cp, &[-1]),
        ];
        assert_eq!(Ok(()), cp.install(&AllDifferent::new(x.clone())));

        assert!(!cp.contains(x[2], -1));
    }

    #[test]
    fn branching_hint_proposes_the_matched_value() {
        let mut cp = DefaultCpModel::default();
        let x = vec![
            ivar(&mut cp, &[1, 2, 3]),
            ivar(&mut cp, &[1, 2]),
            ivar(&mut cp, &[4]),
        ];
        assert_eq!(Ok(()), cp.install(&AllDifferent::new(x.clone())));

        let hint = cp.branching_hint().unwrap();
        assert_eq!(x[1], hint.variable);
        assert!(cp.contains(x[1], hint.value));
    }

    #[test]
    fn counts_all_permutations() {
        for options in all_options() {
            let mut cp = DefaultCpModel::default();
            let x: Vec<Variable> = (0..4).map(|_| cp.new_int_var(1, 4)).collect();
            assert_eq!(Ok(()), cp.install(&AllDifferent::with_options(x.clone(), options)));

            let stats = DepthFirstSearch::new(x).solve(&mut cp, |_| {});
            assert_eq!(24, stats.solutions);
            // propagation is complete: no branch ever fails
            assert_eq!(0, stats.failures);
        }
    }

    #[test]
    fn counts_the_solutions_of_nqueens() {
        for (n, expected) in [(4, 2), (5, 10), (6, 4), (8, 92)] {
            for branching in [Branching::FirstFail, Branching::Hinted] {
                let mut cp = DefaultCpModel::default();
                let q: Vec<Variable> = (0..n).map(|_| cp.new_int_var(0, n as isize - 1)).collect();
                let up: Vec<Variable> = (0..n).map(|i| cp.plus(q[i], i as isize)).collect();
                let down: Vec<Variable> = (0..n).map(|i| cp.sub(q[i], i as isize)).collect();
                assert_eq!(Ok(()), cp.install(&AllDifferent::new(q.clone())));
                assert_eq!(Ok(()), cp.install(&AllDifferent::new(up)));
                assert_eq!(Ok(()), cp.install(&AllDifferent::new(down)));

                let stats = DepthFirstSearch::new(q)
                    .with_branching(branching)
                    .solve(&mut cp, |_| {});
                assert_eq!(expected, stats.solutions);
            }
        }
    }

    #[test]
    fn filtering_is_domain_consistent() {
        let mut rng = SmallRng::seed_from_u64(0x0a11_d1ff);
        for _ in 0..200 {
            let n = rng.gen_range(2..=5);
            let options = all_options()[rng.gen_range(0..4)];
            let mut cp = DefaultCpModel::default();
            let x: Vec<Variable> = (0..n)
                .map(|_| {
                    let mut values: Vec<isize> = (0..6).filter(|_| rng.gen_bool(0.5)).collect();
                    if values.is_empty() {
                        values.push(rng.gen_range(0..6));
                    }
                    ivar(&mut cp, &values)
                })
                .collect();

            let snapshot: Vec<Vec<isize>> = x.iter().map(|v| domain(&cp, *v)).collect();
            let result = cp.install(&AllDifferent::with_options(x.clone(), options));
            check_against_oracle(&cp, &x, &snapshot, result);
            if result.is_err() {
                continue;
            }

            // then a few random dives
            for _ in 0..4 {
                cp.save_state();
                let snapshot: Vec<Vec<isize>> = x.iter().map(|v| domain(&cp, *v)).collect();
                let var = x[rng.gen_range(0..n)];
                let values = domain(&cp, var);
                let value = values[rng.gen_range(0..values.len())];
                let decision = if rng.gen_bool(0.5) {
                    cp.fix(var, value)
                } else {
                    cp.remove(var, value)
                };
                if decision.is_err() {
                    cp.restore_state();
                    break;
                }
                let mut snapshot = snapshot;
                for (i, v) in x.iter().copied().enumerate() {
                    if v == var {
                        snapshot[i] = domain(&cp, v);
                    }
                }
                let result = cp.fixpoint();
                check_against_oracle(&cp, &x, &snapshot, result);
                if result.is_err() {
                    cp.restore_state();
                    break;
                }
            }
        }
    }

    /// The domains after propagation must be exactly the values that belong to
    /// some solution of the domains before propagation
    fn check_against_oracle(
        cp: &DefaultCpModel,
        x: &[Variable],
        snapshot: &[Vec<isize>],
        result: CPResult<()>,
    ) {
        let mut supported = vec![vec![]; x.len()];
        let mut current = vec![];
        enumerate(snapshot, &mut current, &mut supported);

        if supported.iter().any(|s| s.is_empty()) {
            assert!(result.is_err(), "no solution but no failure for {snapshot:?}");
            return;
        }
        assert_eq!(Ok(()), result, "failure with solutions for {snapshot:?}");
        for (i, v) in x.iter().copied().enumerate() {
            supported[i].sort_unstable();
            supported[i].dedup();
            assert_eq!(supported[i], domain(cp, v), "wrong domain for {snapshot:?}");
        }
    }

    fn enumerate(domains: &[Vec<isize>], current: &mut Vec<isize>, supported: &mut [Vec<isize>]) {
        if current.len() == domains.len() {
            for (i, v) in current.iter().copied().enumerate() {
                supported[i].push(v);
            }
            return;
        }
        for v in domains[current.len()].iter().copied() {
            if !current.contains(&v) {
                current.push(v);
                enumerate(domains, current, supported);
                current.pop();
            }
        }
    }

    fn all_options() -> [AllDifferentOptions; 4] {
        let default = AllDifferentOptions::default();
        [
            default,
            default.with_scc_reuse(false),
            default.with_permutation_shortcut(false),
            default.with_scc_reuse(false).with_permutation_shortcut(false),
        ]
    }

    fn domain(cp: &DefaultCpModel, var: Variable) -> Vec<isize> {
        let mut values = vec![];
        cp.for_each_value(var, &mut |v| values.push(v));
        values.sort_unstable();
        values
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
}
