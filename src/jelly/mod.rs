//! Jelly type templates and their text form

pub mod parser;
pub mod types;

pub use parser::{parse_jelly, parse_unit, ParseError};
pub use types::{
    ConcreteBindings, JellyArg, JellyBindings, JellyKind, JellyReferences, JellyType, JellyUnit,
};
