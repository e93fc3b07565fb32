#![forbid(unsafe_code)]

//! Resource-sensitive checking of specified functions and procedures.
//!
//! The checker walks pure and impure expressions symbolically, tracking
//! ownership of memory as resources in a persistent [`Context`]. Calls and
//! returns consume specifications through the spine judgment, which requests
//! resources (packing predicates where needed) and discharges constraints
//! through a [`Solver`].

pub mod check;
pub mod config;
pub mod context;
pub mod error;
pub mod global;
pub mod memory;
pub mod merge;
pub mod pattern;
pub mod resources;
pub mod solver;
pub mod spine;

pub use check::{Checker, Inferred, check_function, check_procedure};
pub use config::{CheckerConfig, ConfigError, PROFILE_ENV};
pub use context::{Binding, Context};
pub use error::{ErrorKind, Explanation, OwnershipHistory, TypeError};
pub use global::Global;
pub use memory::{Loaded, StoreContribution};
pub use merge::{Fallible, merge_paths, merge_return_paths, merge_return_types};
pub use resources::Requested;
pub use solver::Solver;
