//! Canonical unit forms and conversion factors
//!
//! A declared unit either is a base unit or carries a definition: a rational
//! scale and a product over other declared units (`km = 1000 m`).
//! Canonicalizing replaces defined units by their definitions until only
//! base (or undeclared) names remain.

use crate::core::units::{Powers, Unit, UnitExpr};
use crate::errors::TypeError;
use crate::registry::Registry;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::One;
use tracing::trace;

/// Bound on substitution rounds. Declarations can only reference units
/// declared before them, so a well-formed registry needs at most one round
/// per definition depth.
const MAX_ROUNDS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    /// Factor converting a quantity in the original unit into the canonical one.
    pub scale: BigRational,
    pub unit: Unit,
}

pub fn canonicalize(unit: &Unit, registry: &dyn Registry) -> Result<Canonical, TypeError> {
    let mut scale = BigRational::one();
    let mut current = unit.clone();

    for round in 0..MAX_ROUNDS {
        let mut replaced = false;
        let mut next = Powers::new();

        for (name, exponent) in current.powers().iter() {
            let definition = registry
                .lookup_declared_unit(name)
                .and_then(|declaration| declaration.definition);
            match definition {
                Some(definition) => {
                    scale *= definition.scale.pow(exponent);
                    next = next.multiply(definition.base.raised_to(exponent).powers());
                    replaced = true;
                }
                None => next.add(name.clone(), exponent),
            }
        }

        current = Unit::from_powers(next);
        if !replaced {
            trace!(unit = %unit, canonical = %current, %scale, rounds = round, "canonicalized");
            return Ok(Canonical {
                scale,
                unit: current,
            });
        }
    }

    Err(TypeError::internal(format!(
        "unit {} does not reach a canonical form; the unit registry is inconsistent",
        unit
    )))
}

/// Canonicalizes the declared part of an expression, leaving variables alone.
pub fn canonicalize_expr(
    unit: &UnitExpr,
    registry: &dyn Registry,
) -> Result<(BigRational, UnitExpr), TypeError> {
    let canonical = canonicalize(unit.units(), registry)?;
    Ok((
        canonical.scale,
        UnitExpr::from_parts(canonical.unit, unit.vars().clone()),
    ))
}

/// Factor to multiply a quantity in `from` by to express it in `to`, or
/// `None` when the two are not dimensionally compatible.
pub fn conversion_factor(
    from: &Unit,
    to: &Unit,
    registry: &dyn Registry,
) -> Result<Option<BigRational>, TypeError> {
    let from = canonicalize(from, registry)?;
    let to = canonicalize(to, registry)?;
    if from.unit != to.unit {
        return Ok(None);
    }
    Ok(Some(from.scale / to.scale))
}

pub fn convertible(a: &Unit, b: &Unit, registry: &dyn Registry) -> Result<bool, TypeError> {
    Ok(conversion_factor(a, b, registry)?.is_some())
}

/// Parses a scale such as `1000`, `1/1000` or `0.3048`. Scales must be
/// strictly positive.
pub fn parse_scale(text: &str) -> Option<BigRational> {
    let text = text.trim();
    let scale = if let Some((numer, denom)) = text.split_once('/') {
        let numer: BigInt = numer.trim().parse().ok()?;
        let denom: BigInt = denom.trim().parse().ok()?;
        if denom == BigInt::from(0) {
            return None;
        }
        BigRational::new(numer, denom)
    } else if let Some((whole, fraction)) = text.split_once('.') {
        if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let digits: BigInt = format!("{}{}", whole, fraction).parse().ok()?;
        let denom = num_traits::pow(BigInt::from(10), fraction.len());
        BigRational::new(digits, denom)
    } else {
        BigRational::from_integer(text.parse().ok()?)
    };

    (scale > BigRational::from_integer(BigInt::from(0))).then_some(scale)
}
