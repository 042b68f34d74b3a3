//! Type analysis
//!
//! Unification over types and units, capability enforcement, concretization
//! and the check session that ties them together.

pub mod checker;
pub mod concretize;
pub mod constraints;
pub mod unify;

pub use checker::{check_jelly, TypeChecker};
pub use concretize::Concretizer;
pub use constraints::{enforce, offers};
pub use unify::Unifier;
