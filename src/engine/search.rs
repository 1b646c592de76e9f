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

//! This module provides a plain depth first search over a CP model. Each node
//! takes a binary decision `x = v` (left branch) or `x != v` (right branch);
//! the state of the model is saved before and restored after every branch.

use std::fmt;

use log::{debug, trace};

use super::{CPResult, CpModel, Variable};

/// How the search picks its next decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Branching {
    /// The unfixed variable with the smallest domain, assigned to its minimum
    #[default]
    FirstFail,
    /// Whatever the propagators suggest, first fail when they have no opinion
    Hinted,
}

/// Counters gathered while exploring the search tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStatistics {
    /// The number of nodes that have been visited
    pub nodes: usize,
    /// The number of branches that were closed by a failure
    pub failures: usize,
    /// The number of solutions found
    pub solutions: usize,
}
impl fmt::Display for SearchStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes: {} failures: {} solutions: {}",
            self.nodes, self.failures, self.solutions
        )
    }
}

/// A depth first search labeling a given set of decision variables
#[derive(Debug, Clone)]
pub struct DepthFirstSearch {
    variables: Vec<Variable>,
    branching: Branching,
    solution_limit: Option<usize>,
}
impl DepthFirstSearch {
    /// Creates a search that enumerates all the assignments of `variables`
    pub fn new(variables: Vec<Variable>) -> Self {
        Self {
            variables,
            branching: Branching::default(),
            solution_limit: None,
        }
    }
    /// Changes the way decisions are picked
    pub fn with_branching(mut self, branching: Branching) -> Self {
        self.branching = branching;
        self
    }
    /// Stops the search as soon as `limit` solutions were found
    pub fn with_solution_limit(mut self, limit: usize) -> Self {
        self.solution_limit = Some(limit);
        self
    }

    /// Explores the search tree and calls `on_solution` every time all the
    /// decision variables are fixed. The model is given back in the exact
    /// state it was found (after an initial fixpoint).
    pub fn solve<M, F>(&self, model: &mut M, mut on_solution: F) -> SearchStatistics
    where
        M: CpModel + ?Sized,
        F: FnMut(&M),
    {
        let mut stats = SearchStatistics::default();

        // state is only ever saved at fixpoint
        if model.fixpoint().is_err() {
            stats.failures += 1;
            debug!("the root node is inconsistent");
            return stats;
        }

        model.save_state();
        self.explore(model, &mut stats, &mut on_solution);
        model.restore_state();

        debug!("search complete: {stats}");
        stats
    }

    /// Visits one node of the search tree. Returns true when the search
    /// must stop.
    fn explore<M, F>(
        &self,
        model: &mut M,
        stats: &mut SearchStatistics,
        on_solution: &mut F,
    ) -> bool
    where
        M: CpModel + ?Sized,
        F: FnMut(&M),
    {
        stats.nodes += 1;
        let (x, v) = match self.next_decision(model) {
            None => {
                stats.solutions += 1;
                debug!("solution #{} after {} nodes", stats.solutions, stats.nodes);
                on_solution(&*model);
                return self.solution_limit.map_or(false, |l| stats.solutions >= l);
            }
            Some(decision) => decision,
        };

        trace!("branching on {x:?} = {v}");
        let stop = self.branch(model, stats, on_solution, |m| m.fix(x, v));
        if stop {
            return true;
        }
        self.branch(model, stats, on_solution, |m| m.remove(x, v))
    }

    /// Applies a decision in a fresh level, explores below it when it is
    /// consistent and restores the state
    fn branch<M, F, D>(
        &self,
        model: &mut M,
        stats: &mut SearchStatistics,
        on_solution: &mut F,
        decision: D,
    ) -> bool
    where
        M: CpModel + ?Sized,
        F: FnMut(&M),
        D: FnOnce(&mut M) -> CPResult<()>,
    {
        model.save_state();
        let stop = match decision(&mut *model).and_then(|_| model.fixpoint()) {
            Ok(()) => self.explore(model, stats, on_solution),
            Err(cause) => {
                trace!("failure: {cause}");
                stats.failures += 1;
                false
            }
        };
        model.restore_state();
        stop
    }

    /// Picks the next decision or returns None when all variables are fixed
    fn next_decision<M: CpModel + ?Sized>(&self, model: &M) -> Option<(Variable, isize)> {
        if self.branching == Branching::Hinted {
            if let Some(hint) = model.branching_hint() {
                if !model.is_fixed(hint.variable) && model.contains(hint.variable, hint.value) {
                    return Some((hint.variable, hint.value));
                }
            }
        }

        self.variables
            .iter()
            .copied()
            .filter(|x| !model.is_fixed(*x))
            .min_by_key(|x| model.size(*x))
            .and_then(|x| model.min(x).map(|v| (x, v)))
    }
}

#[cfg(test)]
mod test_search {
    use crate::prelude::*;

    #[test]
    fn enumerates_every_assignment_without_constraints() {
        let mut cp = DefaultCpModel::default();
        let x = cp.new_int_var(0, 2);
        let y = cp.new_int_var(0, 1);

        let mut seen = vec![];
        let stats = DepthFirstSearch::new(vec![x, y]).solve(&mut cp, |m| {
            seen.push((m.min(x).unwrap(), m.min(y).unwrap()));
        });

        assert_eq!(6, stats.solutions);
        assert_eq!(0, stats.failures);
        seen.sort_unstable();
        assert_eq!(vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1)], seen);
    }

    #[test]
    fn the_model_is_given_back_untouched() {
        let mut cp = DefaultCpModel::default();
        let x = cp.new_int_var(0, 3);
        let y = cp.new_int_var(0, 3);

        DepthFirstSearch::new(vec![x, y]).solve(&mut cp, |_| {});
        assert_eq!(4, cp.size(x));
        assert_eq!(4, cp.size(y));
    }

    #[test]
    fn solution_limit_stops_the_search() {
        let mut cp = DefaultCpModel::default();
        let x = cp.new_int_var(0, 9);

        let stats = DepthFirstSearch::new(vec![x])
            .with_solution_limit(3)
            .solve(&mut cp, |_| {});
        assert_eq!(3, stats.solutions);
    }

    #[test]
    fn failures_are_counted() {
        let mut cp = DefaultCpModel::default();
        let x = cp.new_int_var(0, 2);
        let c = cp.post(Box::new(move |dom: &mut dyn DomainStore| {
            if dom.is_fixed(x) && dom.min(x) == Some(1) {
                Err(Inconsistency::DomainWipeout)
            } else {
                Ok(())
            }
        }));
        cp.propagate_on(c, DomainCondition::IsFixed(x));

        let stats = DepthFirstSearch::new(vec![x]).solve(&mut cp, |_| {});
        assert_eq!(2, stats.solutions);
        assert_eq!(1, stats.failures);
    }
}
