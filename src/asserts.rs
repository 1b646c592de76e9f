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

//! Leveled assertions. The simple ones are cheap and always checked in debug
//! builds. The advanced ones cost a pass over the whole value graph and are
//! only checked when the `debug-checks` feature is turned on.

pub(crate) const GAC_ASSERT_SIMPLE: u8 = 1;
pub(crate) const GAC_ASSERT_ADVANCED: u8 = 2;

pub(crate) const GAC_ASSERT_LEVEL_DEFINITION: u8 = if cfg!(feature = "debug-checks") {
    GAC_ASSERT_ADVANCED
} else if cfg!(debug_assertions) {
    GAC_ASSERT_SIMPLE
} else {
    0
};

macro_rules! gac_assert_simple {
    ($($arg:tt)*) => {
        if $crate::asserts::GAC_ASSERT_LEVEL_DEFINITION >= $crate::asserts::GAC_ASSERT_SIMPLE {
            assert!($($arg)*);
        }
    };
}

macro_rules! gac_assert_advanced {
    ($($arg:tt)*) => {
        if $crate::asserts::GAC_ASSERT_LEVEL_DEFINITION >= $crate::asserts::GAC_ASSERT_ADVANCED {
            assert!($($arg)*);
        }
    };
}

pub(crate) use gac_assert_advanced;
pub(crate) use gac_assert_simple;
