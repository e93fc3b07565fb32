#![forbid(unsafe_code)]

pub mod normalize;
pub mod simple;
pub mod solver;

pub use normalize::{Formula, Linear};
pub use simple::SimpleProver;
pub use solver::{Prover, SmtProfile, UnknownProfile};
#[cfg(feature = "z3")]
pub use solver::z3_prover::Z3Prover;
