//! Core type system components
//!
//! This module contains the type and unit domains the unifier works over,
//! the variable arena owned by a check, and the concrete types a check
//! produces.

pub mod capabilities;
pub mod concrete;
pub mod types;
pub mod units;
pub mod universe;

pub use capabilities::{CapabilitySet, MissingCapabilities};
pub use concrete::{ConcreteArg, ConcreteTag, ConcreteTagged, ConcreteType};
pub use types::{CorrelationKey, DateKind, TypeArg, TypeExpr, TypeVarId};
pub use units::{Powers, Unit, UnitExpr, UnitVarId};
pub use universe::Universe;
