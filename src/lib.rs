//! Unit-aware type inference for spreadsheet transformation expressions.
//!
//! Syntax nodes describe their types as [`JellyType`] templates. A
//! [`TypeChecker`] instantiates them with fresh variables, unifies types and
//! physical units, enforces capability constraints such as equality or
//! ordering, and finally concretizes the result into a [`ConcreteType`].

// Core modules
pub mod analysis;
pub mod core;
pub mod errors;
pub mod frontend;
pub mod infrastructure;
pub mod jelly;
pub mod registry;
pub mod units;

// Re-export commonly used items
pub use analysis::{check_jelly, Concretizer, TypeChecker, Unifier};
pub use core::{
    CapabilitySet, ConcreteType, CorrelationKey, TypeExpr, Unit, UnitExpr, Universe,
};
pub use errors::{Diagnostics, ErrorKind, TypeError};
pub use frontend::{cli_main, CheckOptions, Config};
pub use infrastructure::{check_batch, CheckResult};
pub use jelly::{parse_jelly, parse_unit, JellyType, ParseError};
pub use registry::{Registry, RegistryError, RegistrySnapshot, TypeContext};
pub use units::{canonicalize, conversion_factor, Canonical};
