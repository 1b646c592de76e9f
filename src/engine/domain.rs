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

//! This module provides the definition and implementation of the variables,
//! DomainStore and DomainBroker

use crate::{
    IntManager, ReversibleInt, ReversibleSparseSet, SaveAndRestore, StateManager,
    TrailedStateManager,
};

/// This is the kind of error that gets raised whenever a propagator fails
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq, Hash)]
pub enum Inconsistency {
    /// A removal has emptied the domain of some variable
    #[error("the domain of a variable has been wiped out")]
    DomainWipeout,
    /// There is no way to assign pairwise distinct values to the variables
    /// of an all different constraint
    #[error("no matching covers all the variables of an all different constraint")]
    NoMaximumMatching,
}

/// The result of a propagation operation. (Note: all propagation opertations
/// can fail, in which case they raise an Inconsistency error)
pub type CPResult<T> = Result<T, Inconsistency>;

/// An integer variable that can be used in a CP model
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(usize);

/// A domain store is the entity that gives a hook to propagators for modifying
/// the variables domains. (Note however that no propagator can directly access
/// the events associated with a given variable, nor decide to save or restore
/// the state of these domaims to a previous value. These are the
/// responsibilities devoted to a DomainBroker -- which is typically implemented
/// by the same structure as DomainStore; but it helps to split responsibilities).
///
/// A domain store is also an `IntManager`: the propagators keep their own
/// reversible data on the very same trail as the domains they filter.
pub trait DomainStore: IntManager {
    /// Creates a new integer variable covering the min..=max range of values
    fn new_int_var(&mut self, min: isize, max: isize) -> Variable;
    /// Returns the minimum value of the doman of this variable (if it exists)
    fn min(&self, var: Variable) -> Option<isize>;
    /// Returns the maximum value of the doman of this variable (if it exists)
    fn max(&self, var: Variable) -> Option<isize>;
    /// Returns the size of the domain of this variable
    fn size(&self, var: Variable) -> usize;
    /// Returns true iff the domain of the target `var` contains the specified `value`
    fn contains(&self, var: Variable, value: isize) -> bool;
    /// Returns true iff the value of the target variable is fixed/imposed
    fn is_fixed(&self, var: Variable) -> bool {
        self.size(var) == 1
    }
    /// Forces the value of this variable. It returns an Inconsistency error
    /// when fixing the value of the target variable is impossible
    fn fix(&mut self, var: Variable, value: isize) -> CPResult<()>;
    /// Removes the specified value from the domain of the target variable.
    /// An Inconsistency error is returned when the domain of the variable
    /// becomes empty because of this removal
    fn remove(&mut self, var: Variable, value: isize) -> CPResult<()>;
    /// Removes all value less than (<) the specified value from the domain
    /// of the target variable. An Inconsistency error is returned when the
    /// domain of the variable becomes empty because of this removal
    fn remove_below(&mut self, var: Variable, value: isize) -> CPResult<()>;
    /// Removes all value greater than (>) the specified value from the domain
    /// of the target variable. An Inconsistency error is returned when the
    /// domain of the variable becomes empty because of this removal
    fn remove_above(&mut self, var: Variable, value: isize) -> CPResult<()>;
    /// Calls `f` once for every value in the domain of `var` (in no
    /// particular order)
    fn for_each_value(&self, var: Variable, f: &mut dyn FnMut(isize));
    /// Returns the primitive variable that actually holds the domain of `var`
    /// (this is `var` itself when it is not a view)
    fn source_of_truth(&self, var: Variable) -> Variable;

    /// Returns a (view) variable corresponding to var * value
    fn mul(&mut self, var: Variable, value: isize) -> Variable;
    /// Returns a (view) variable corresponding to var + value
    fn plus(&mut self, var: Variable, value: isize) -> Variable;
    /// Returns a (view) variable corresponding to var - value
    fn sub(&mut self, var: Variable, value: isize) -> Variable {
        self.plus(var, -value)
    }
    /// Returns a (view) variable corresponding to -var (flips the sign)
    fn neg(&mut self, var: Variable) -> Variable;
}

/// An event that tells what happened to the domain of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainEvent {
    /// This is the variable impacted by a possible change in its domain
    pub variable: Variable,
    /// This flag is set when the domain of the variable has become fixed
    /// (That is, it only has one single value left in its domain)
    pub is_fixed: bool,
    /// This flag is set when the domain of a variable has become empty
    /// (this should somehow have triggered an Inconsistency error)
    pub is_empty: bool,
    /// This flag is set when the domain's minimum has changed
    pub min_changed: bool,
    /// This flag is set when the domain's maximum has changed
    pub max_changed: bool,
    /// This flag is set when a change has occured in the domain of the variable
    /// (this is the weakest of the requirements to set a flag)
    pub domain_changed: bool,
}
impl DomainEvent {
    fn new(variable: Variable) -> Self {
        Self {
            variable,
            is_fixed: false,
            is_empty: false,
            min_changed: false,
            max_changed: false,
            domain_changed: false,
        }
    }
    fn is_set(&self) -> bool {
        self.is_empty | self.is_fixed | self.max_changed | self.min_changed | self.domain_changed
    }
}

/// The domain borker is the facet of the domain store which is in charge of
/// tracking all changes occurring in the domain of the variables. A domain
/// broker is the object which is used by the solver to schedule the propagation
/// of the various propagators and listeners.
pub trait DomainBroker: SaveAndRestore {
    /// forgets all events that have happened on a variable
    fn clear_events(&mut self);
    /// goes over all the events that have occurred on the variables
    fn for_each_event<F: FnMut(DomainEvent)>(&self, f: F);
}

/// This is the type of domain store implementation you will likely want to use
/// in your solver.
pub type DefaultDomainStore = DomainStoreImpl<TrailedStateManager>;

/// All variables in a CP model are not primitive variables. Some of them are
/// *views* over other variables. This enumeration describes all supported
/// types of primitive variables and views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum VariableType {
    /// A primitive variable, hence not a view
    Primitive {
        index: usize,
        domain: ReversibleSparseSet,
    },
    /// A view that corresponds to x + offset
    OffsetView { x: Variable, offset: isize },
    /// A view that corresponds to x * coeff (coeff is always > 0)
    MultiplicationView { x: Variable, coeff: isize },
    /// A view that flips the sign of the target variable. It corresponds to -x.
    NegativeView { x: Variable },
}

/// This is a simple implementation of a domain store. It implements both the
/// DomainStore and the DomainBroker traits, which means it really is an entity
/// that encompasses the complete lifecycle of a variable (but has nothing to
/// do with the higher level constructs that *use* the events applied to these
/// variables)
pub struct DomainStoreImpl<T: StateManager> {
    /// The state manager in charge of saving/restoring the domains states
    state: T,
    /// How many variables are there right now ?
    n_vars: ReversibleInt,
    /// The information about all variables
    variables: Vec<VariableType>,
    /// How many events slots are there right now ? (How many primitive variables ?)
    n_events: ReversibleInt,
    /// The events attached to all primitive variables
    events: Vec<DomainEvent>,
}
impl<T: StateManager> DomainStoreImpl<T> {
    /// Creates a new instance of the domain store based on the given state
    /// manager
    pub fn new(state: T) -> Self {
        Self::from(state)
    }
    /// Returns a reference to the underlying state manager
    pub fn state_manager(&self) -> &T {
        &self.state
    }
    /// Returns a mutable reference to the underlying state manager
    pub fn state_manager_mut(&mut self) -> &mut T {
        &mut self.state
    }
}

impl<T: StateManager> From<T> for DomainStoreImpl<T> {
    fn from(mut state: T) -> Self {
        let n_vars = state.manage_int(0);
        let n_events = state.manage_int(0);
        Self {
            state,
            n_vars,
            n_events,
            variables: vec![],
            events: vec![],
        }
    }
}
impl<T: StateManager + Default> Default for DomainStoreImpl<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
//------------------------------------------------------------------------------
// Reversible integers of the propagators live on the same trail
//------------------------------------------------------------------------------
impl<T: StateManager> IntManager for DomainStoreImpl<T> {
    fn manage_int(&mut self, value: isize) -> ReversibleInt {
        self.state.manage_int(value)
    }

    fn get_int(&self, id: ReversibleInt) -> isize {
        self.state.get_int(id)
    }

    fn set_int(&mut self, id: ReversibleInt, value: isize) -> isize {
        self.state.set_int(id, value)
    }
}

impl<T: StateManager> DomainStore for DomainStoreImpl<T> {
    fn new_int_var(&mut self, min: isize, max: isize) -> Variable {
        let n = (max - min + 1).max(0) as usize;

        let evt_id = (self.state.increment(self.n_events) - 1) as usize;
        let domain = self.state.manage_sparse_set(n, min);
        let variable = self.push_variable(VariableType::Primitive {
            index: evt_id,
            domain,
        });
        self.events.push(DomainEvent::new(variable));
        variable
    }

    fn min(&self, var: Variable) -> Option<isize> {
        match self.variables[var.0] {
            VariableType::Primitive { domain, .. } => self.state.sparse_set_get_min(domain),
            VariableType::OffsetView { x, offset } => self.min(x).map(|v| v + offset),
            VariableType::MultiplicationView { x, coeff } => self.min(x).map(|v| v * coeff),
            VariableType::NegativeView { x } => self.max(x).map(|v| -v),
        }
    }

    fn max(&self, var: Variable) -> Option<isize> {
        match self.variables[var.0] {
            VariableType::Primitive { domain, .. } => self.state.sparse_set_get_max(domain),
            VariableType::OffsetView { x, offset } => self.max(x).map(|v| v + offset),
            VariableType::MultiplicationView { x, coeff } => self.max(x).map(|v| v * coeff),
            VariableType::NegativeView { x } => self.min(x).map(|v| -v),
        }
    }

    fn size(&self, var: Variable) -> usize {
        let dom = self.primitive_domain(var);
        self.state.sparse_set_size(dom)
    }

    fn contains(&self, var: Variable, value: isize) -> bool {
        match self.variables[var.0] {
            VariableType::Primitive { domain, .. } => self.state.sparse_set_contains(domain, value),
            VariableType::OffsetView { x, offset } => self.contains(x, value - offset),
            VariableType::NegativeView { x } => self.contains(x, -value),
            VariableType::MultiplicationView { x, coeff } => {
                value.rem_euclid(coeff) == 0 && self.contains(x, value.div_euclid(coeff))
            }
        }
    }

    fn fix(&mut self, var: Variable, value: isize) -> CPResult<()> {
        match self.variables[var.0] {
            VariableType::Primitive { index, domain } => self.primitive_fix(value, domain, index),
            VariableType::OffsetView { x, offset } => self.fix(x, value - offset),
            VariableType::NegativeView { x } => self.fix(x, -value),
            VariableType::MultiplicationView { x, coeff } => {
                if value.rem_euclid(coeff) == 0 {
                    self.fix(x, value.div_euclid(coeff))
                } else {
                    Err(Inconsistency::DomainWipeout)
                }
            }
        }
    }

    fn remove(&mut self, var: Variable, value: isize) -> CPResult<()> {
        match self.variables[var.0] {
            VariableType::Primitive { index, domain } => {
                self.primitive_remove(value, domain, index)
            }
            VariableType::OffsetView { x, offset } => self.remove(x, value - offset),
            VariableType::NegativeView { x } => self.remove(x, -value),
            VariableType::MultiplicationView { x, coeff } => {
                if value.rem_euclid(coeff) == 0 {
                    self.remove(x, value.div_euclid(coeff))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn remove_below(&mut self, var: Variable, value: isize) -> CPResult<()> {
        match self.variables[var.0] {
            VariableType::Primitive { index, domain } => {
                self.primitive_remove_below(value, domain, index)
            }
            VariableType::OffsetView { x, offset } => self.remove_below(x, value - offset),
            VariableType::NegativeView { x } => self.remove_above(x, -value),
            VariableType::MultiplicationView { x, coeff } => {
                // ceil(value / coeff)
                let q = value.div_euclid(coeff);
                let q = if value.rem_euclid(coeff) != 0 { q + 1 } else { q };
                self.remove_below(x, q)
            }
        }
    }

    fn remove_above(&mut self, var: Variable, value: isize) -> CPResult<()> {
        match self.variables[var.0] {
            VariableType::Primitive { index, domain } => {
                self.primitive_remove_above(value, domain, index)
            }
            VariableType::OffsetView { x, offset } => self.remove_above(x, value - offset),
            VariableType::NegativeView { x } => self.remove_below(x, -value),
            VariableType::MultiplicationView { x, coeff } => {
                self.remove_above(x, value.div_euclid(coeff))
            }
        }
    }

    fn for_each_value(&self, var: Variable, f: &mut dyn FnMut(isize)) {
        match self.variables[var.0] {
            VariableType::Primitive { domain, .. } => self.state.sparse_set_for_each(domain, f),
            VariableType::OffsetView { x, offset } => {
                self.for_each_value(x, &mut |v| f(v + offset))
            }
            VariableType::MultiplicationView { x, coeff } => {
                self.for_each_value(x, &mut |v| f(v * coeff))
            }
            VariableType::NegativeView { x } => self.for_each_value(x, &mut |v| f(-v)),
        }
    }

    fn source_of_truth(&self, var: Variable) -> Variable {
        match self.variables[var.0] {
            VariableType::Primitive { .. } => var,
            VariableType::OffsetView { x, .. } => self.source_of_truth(x),
            VariableType::MultiplicationView { x, .. } => self.source_of_truth(x),
            VariableType::NegativeView { x } => self.source_of_truth(x),
        }
    }

    fn mul(&mut self, var: Variable, coeff: isize) -> Variable {
        assert!(coeff != 0, "a multiplication view needs a non zero coefficient");
        if coeff == 1 {
            var
        } else if coeff < 0 {
            let neg = self.neg(var);
            self.mul(neg, -coeff)
        } else {
            self.push_variable(VariableType::MultiplicationView { x: var, coeff })
        }
    }

    fn plus(&mut self, var: Variable, value: isize) -> Variable {
        self.push_variable(VariableType::OffsetView {
            x: var,
            offset: value,
        })
    }

    fn neg(&mut self, var: Variable) -> Variable {
        self.push_variable(VariableType::NegativeView { x: var })
    }
}
impl<T: StateManager> SaveAndRestore for DomainStoreImpl<T> {
    fn save_state(&mut self) {
        self.state.save_state()
    }

    fn restore_state(&mut self) {
        self.state.restore_state();
        self.variables
            .truncate(self.state.get_int(self.n_vars) as usize);
        self.events
            .truncate(self.state.get_int(self.n_events) as usize);
        // whatever happened in the abandoned branch is irrelevant now
        self.clear_events();
    }
}
impl<T: StateManager> DomainBroker for DomainStoreImpl<T> {
    fn clear_events(&mut self) {
        for e in self.events.iter_mut() {
            *e = DomainEvent::new(e.variable);
        }
    }

    fn for_each_event<F: FnMut(DomainEvent)>(&self, f: F) {
        self.events
            .iter()
            .copied()
            .filter(DomainEvent::is_set)
            .for_each(f);
    }
}
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// private methods
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
impl<T: StateManager> DomainStoreImpl<T> {
    /// Registers a new variable (or view) and returns its identifier
    fn push_variable(&mut self, vt: VariableType) -> Variable {
        let id = (self.state.increment(self.n_vars) - 1) as usize;
        self.variables.push(vt);
        Variable(id)
    }
    /// This method returns primitive domain of the variable; that is it returns
    /// the domain of the source of truth of the said variable.
    fn primitive_domain(&self, var: Variable) -> ReversibleSparseSet {
        match self.variables[var.0] {
            VariableType::Primitive { domain, .. } => domain,
            VariableType::OffsetView { x, .. } => self.primitive_domain(x),
            VariableType::MultiplicationView { x, .. } => self.primitive_domain(x),
            VariableType::NegativeView { x } => self.primitive_domain(x),
        }
    }
    /// Fixes the value of a PRIMITIVE VAR whose domain and event id are given
    fn primitive_fix(
        &mut self,
        value: isize,
        dom: ReversibleSparseSet,
        evt: usize,
    ) -> CPResult<()> {
        if !self.state.sparse_set_contains(dom, value) {
            Err(Inconsistency::DomainWipeout)
        } else if self.state.sparse_set_size(dom) == 1 {
            // nothing to do
            Ok(())
        } else {
            let min_changed = self.state.sparse_set_get_min(dom) != Some(value);
            let max_changed = self.state.sparse_set_get_max(dom) != Some(value);
            self.state.sparse_set_remove_all_but(dom, value);

            let event = &mut self.events[evt];
            event.min_changed |= min_changed;
            event.max_changed |= max_changed;
            event.domain_changed = true;
            event.is_fixed = true;
            Ok(())
        }
    }
    /// Removes a single value from the domain of a PRIMITIVE VAR
    fn primitive_remove(
        &mut self,
        value: isize,
        dom: ReversibleSparseSet,
        evt: usize,
    ) -> CPResult<()> {
        if !self.state.sparse_set_contains(dom, value) {
            return Ok(());
        }
        let min_changed = self.state.sparse_set_get_min(dom) == Some(value);
        let max_changed = self.state.sparse_set_get_max(dom) == Some(value);

        self.state.sparse_set_remove(dom, value);
        let size = self.state.sparse_set_size(dom);

        let event = &mut self.events[evt];
        event.min_changed |= min_changed;
        event.max_changed |= max_changed;
        event.domain_changed = true;
        event.is_fixed |= size == 1;
        event.is_empty |= size == 0;

        if size == 0 {
            Err(Inconsistency::DomainWipeout)
        } else {
            Ok(())
        }
    }
    /// Removes all candidates less than a given value from the domain of a
    /// PRIMITIVE VARIABLE
    fn primitive_remove_below(
        &mut self,
        value: isize,
        dom: ReversibleSparseSet,
        evt: usize,
    ) -> CPResult<()> {
        match self.state.sparse_set_get_min(dom) {
            Some(min) if min < value => {
                self.state.sparse_set_remove_below(dom, value);
                self.record_bound_change(dom, evt, true)
            }
            _ => Ok(()),
        }
    }
    /// Removes all candidates greater than a given value from the domain of a
    /// PRIMITIVE VARIABLE
    fn primitive_remove_above(
        &mut self,
        value: isize,
        dom: ReversibleSparseSet,
        evt: usize,
    ) -> CPResult<()> {
        match self.state.sparse_set_get_max(dom) {
            Some(max) if max > value => {
                self.state.sparse_set_remove_above(dom, value);
                self.record_bound_change(dom, evt, false)
            }
            _ => Ok(()),
        }
    }
    /// Updates the event of a primitive variable whose lower (or upper) bound
    /// just moved and tells whether its domain got wiped out
    fn record_bound_change(
        &mut self,
        dom: ReversibleSparseSet,
        evt: usize,
        lower: bool,
    ) -> CPResult<()> {
        let size = self.state.sparse_set_size(dom);
        let event = &mut self.events[evt];
        event.domain_changed = true;
        if lower {
            event.min_changed = true;
        } else {
            event.max_changed = true;
        }
        match size {
            0 => {
                event.is_empty = true;
                Err(Inconsistency::DomainWipeout)
            }
            1 => {
                event.is_fixed = true;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod test_domainstoreimpl_views {
    use super::*;

    fn sorted(ds: &DefaultDomainStore, var: Variable) -> Vec<isize> {
        let mut out = vec![];
        ds.for_each_value(var, &mut |v| out.push(v));
        out.sort_unstable();
        out
    }

    #[test]
    fn offset_view_shifts_every_value() {
        let mut ds = DefaultDomainStore::default();
        let x = ds.new_int_var(0, 3);
        let y = ds.plus(x, 5);
        let z = ds.sub(x, 1);

        assert_eq!(vec![5, 6, 7, 8], sorted(&ds, y));
        assert_eq!(Some(-1), ds.min(z));
        assert_eq!(Some(2), ds.max(z));

        assert_eq!(Ok(()), ds.remove(y, 5));
        assert!(!ds.contains(x, 0));
        assert_eq!(Ok(()), ds.remove_above(z, 1));
        assert_eq!(vec![1, 2], sorted(&ds, x));
    }

    #[test]
    fn negative_view_swaps_the_bounds() {
        let mut ds = DefaultDomainStore::default();
        let x = ds.new_int_var(2, 6);
        let y = ds.neg(x);

        assert_eq!(Some(-6), ds.min(y));
        assert_eq!(Some(-2), ds.max(y));

        assert_eq!(Ok(()), ds.remove_below(y, -4));
        assert_eq!(vec![2, 3, 4], sorted(&ds, x));
        assert_eq!(Ok(()), ds.remove_above(y, -3));
        assert_eq!(vec![3, 4], sorted(&ds, x));
        assert_eq!(Ok(()), ds.fix(y, -4));
        assert_eq!(Some(4), ds.min(x));
    }

    #[test]
    fn multiplication_view_rounds_bounds_towards_the_domain() {
        let mut ds = DefaultDomainStore::default();
        let x = ds.new_int_var(-3, 3);
        let y = ds.mul(x, 3);

        assert!(ds.contains(y, -9));
        assert!(!ds.contains(y, 4));
        assert_eq!(Some(-9), ds.min(y));

        assert_eq!(Ok(()), ds.remove_below(y, -5));
        assert_eq!(Some(-1), ds.min(x));
        assert_eq!(Ok(()), ds.remove_above(y, 4));
        assert_eq!(Some(1), ds.max(x));
        assert_eq!(Ok(()), ds.remove(y, 4));
        assert_eq!(3, ds.size(x));
    }

    #[test]
    fn nested_views_compose_inner_first() {
        let mut ds = DefaultDomainStore::default();
        let x = ds.new_int_var(0, 2);
        let y = ds.mul(x, -2);
        let z = ds.plus(y, 1);

        assert_eq!(vec![-3, -1, 1], sorted(&ds, z));
        assert_eq!(Some(-3), ds.min(z));
        assert_eq!(Some(1), ds.max(z));

        assert_eq!(Ok(()), ds.fix(z, -1));
        assert_eq!(Some(1), ds.min(x));
        assert!(ds.is_fixed(x));
    }
}
