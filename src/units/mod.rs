//! Unit arithmetic and canonicalization

pub mod algebra;

pub use algebra::{canonicalize, canonicalize_expr, conversion_factor, convertible, Canonical};
