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

//! A lean constraint programming engine (trail, domains, propagation
//! fixpoint, depth first search) built around an incremental, domain
//! consistent propagator for the all different constraint.
//!
//! # Example
//! ```
//! use alldiff_rs::prelude::*;
//!
//! let mut cp = DefaultCpModel::default();
//! let x = cp.new_int_var(1, 2);
//! let y = cp.new_int_var(1, 2);
//! let z = cp.new_int_var(1, 3);
//!
//! assert_eq!(Ok(()), cp.install(&AllDifferent::new(vec![x, y, z])));
//! assert_eq!(Some(3), cp.min(z));
//! assert!(cp.is_fixed(z));
//! ```

mod asserts;

mod state;
pub use state::*;

mod engine;
pub use engine::*;

mod constraints;
pub use constraints::*;

/// Everything one needs to model and solve a problem
pub mod prelude {
    pub use crate::constraints::*;
    pub use crate::engine::*;
    pub use crate::state::*;
}
