// Journal domain logic: reductions over trade history, evaluation rules,
// CSV interchange, two-factor codes, education scoring and admin metrics.
//
// Everything here is synchronous and side-effect free apart from random
// generation in `two_factor`.

pub mod admin;
pub mod coach;
pub mod evaluation;
pub mod export;
pub mod filter;
pub mod leaderboard;
pub mod quiz;
pub mod stats;
pub mod two_factor;
