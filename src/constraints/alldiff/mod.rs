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

//! This module provides the implementation of the domain consistent alldiff
//! constraint. The algorithm used to implement that constraint is described
//! in "A filtering algorithm for constraints of difference in CSPs" J-C. Régin,
//! AAAI-94.
//!
//! The propagator maintains a maximum matching between the variables and
//! their values, the strongly connected components of the graph induced by
//! that matching, and the set of variables reachable from a free value.
//! All of it lives on the trail and is repaired incrementally from one
//! execution to the next:
//!
//! * `partition` holds the value graph: for every value, the live prefix of
//!   the variables that may still take it, the active/grounded split of the
//!   variables and the matching cells;
//! * `matching` repairs the matching with batched augmenting paths;
//! * `scc` tags the strongly connected components (Tarjan);
//! * `reachability` finds the variables reachable from a free value;
//! * `propagator` glues everything together and prunes.

use log::debug;

use crate::prelude::*;

mod matching;
mod partition;
mod propagator;
mod reachability;
mod scc;

pub use propagator::AllDifferentPropagator;

/// The tuning knobs of the all different propagator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllDifferentOptions {
    /// When the matching did not change during a round, only recompute the
    /// strongly connected components that were touched
    pub scc_reuse: bool,
    /// When there are exactly as many usable values as active variables, a
    /// value that only one variable can take is assigned to that variable
    /// right away
    pub permutation_shortcut: bool,
}
impl Default for AllDifferentOptions {
    fn default() -> Self {
        Self {
            scc_reuse: true,
            permutation_shortcut: true,
        }
    }
}
impl AllDifferentOptions {
    pub fn with_scc_reuse(mut self, enabled: bool) -> Self {
        self.scc_reuse = enabled;
        self
    }
    pub fn with_permutation_shortcut(mut self, enabled: bool) -> Self {
        self.permutation_shortcut = enabled;
        self
    }
}

/// This constraint enforces that the the value affected to each variable be
/// different from the one affected to all other variables.
#[derive(Debug, Clone)]
pub struct AllDifferent {
    /// All these variables must take different values in the solution
    vars: Vec<Variable>,
    options: AllDifferentOptions,
}
impl AllDifferent {
    /// creates a new contraint
    pub fn new(vars: Vec<Variable>) -> Self {
        Self::with_options(vars, AllDifferentOptions::default())
    }
    /// creates a new constraint with a specific propagation setup
    pub fn with_options(vars: Vec<Variable>, options: AllDifferentOptions) -> Self {
        Self { vars, options }
    }
}
impl ModelingConstruct for AllDifferent {
    fn install(&self, cp: &mut dyn CpModel) -> CPResult<()> {
        let propagator = AllDifferentPropagator::new(&mut *cp, &self.vars, self.options);
        debug!(
            "all different over {} variables and {} values",
            propagator.n_vars(),
            propagator.n_values()
        );
        let propagator = cp.post(Box::new(propagator));

        for v in self.vars.iter().copied() {
            cp.propagate_on(propagator, DomainCondition::DomainChanged(v));
        }
        cp.schedule(propagator);
        cp.fixpoint()
    }
}

/// This "timestamp" implements a sort of 'monotonic clock' (a counter that
/// can only ever be incremented). Marking an item with the current timestamp
/// flags it as visited, and moving on to the next timestamp forgets all marks
/// at once.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Timestamp(usize);

impl Timestamp {
    /// Increments the value of the current timestamp
    fn inc(self) -> Self {
        Self(self.0 + 1)
    }
}
