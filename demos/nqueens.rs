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

//! Places n queens on an n x n board so that no two of them attack each other.
//!
//! Usage: `cargo run --example nqueens -- [n] [--all]`
//! (set `RUST_LOG=debug` to follow the search)

use alldiff_rs::prelude::*;

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let n = match args.next().map(|n| n.parse::<usize>()) {
        None => 8,
        Some(Ok(n)) => n,
        Some(Err(_)) => {
            println!("'n' is not a valid unsigned integer");
            return;
        }
    };
    let all = args.any(|a| a == "--all");

    if n < 1 {
        println!("Please provide an 'n > 0'");
        return;
    }

    let mut cp = DefaultCpModel::default();
    let queens = (0..n)
        .map(|_| cp.new_int_var(0, n as isize - 1))
        .collect::<Vec<_>>();
    let diag1 = queens
        .iter()
        .copied()
        .enumerate()
        .map(|(i, q)| cp.plus(q, i as isize))
        .collect::<Vec<_>>();
    let diag2 = queens
        .iter()
        .copied()
        .enumerate()
        .map(|(i, q)| cp.sub(q, i as isize))
        .collect::<Vec<_>>();

    for vars in [queens.clone(), diag1, diag2] {
        if cp.install(&AllDifferent::new(vars)).is_err() {
            println!("{n}-queens is unsatisfiable.");
            return;
        }
    }

    let mut search = DepthFirstSearch::new(queens.clone()).with_branching(Branching::Hinted);
    if !all {
        search = search.with_solution_limit(1);
    }

    let stats = search.solve(&mut cp, |model| {
        if all {
            return;
        }
        let row_separator = format!("{}+", "+---".repeat(n));
        for q in queens.iter().copied() {
            println!("{row_separator}");
            let queen_col = model.min(q).unwrap_or_default() as usize;
            for col in 0..n {
                let string = if queen_col == col { "| * " } else { "|   " };
                print!("{string}");
            }
            println!("|");
        }
        println!("{row_separator}");
    });

    if stats.solutions == 0 {
        println!("{n}-queens is unsatisfiable.");
    }
    println!("{stats}");
}
