//! Products of powers over declared units and unit variables
//!
//! [`Unit`] is a variable-free product of declared unit names (`m/s^2`).
//! [`UnitExpr`] additionally carries unit variables owned by a
//! [`Universe`](crate::core::universe::Universe); a lone variable is the
//! product `v^1` and the scalar unit is the empty product.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Exponents are kept within `-i32::MAX..=i32::MAX` so negation never overflows.
pub const MAX_EXPONENT: i32 = i32::MAX;

/// Integer exponents keyed by `K`, zero exponents never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Powers<K: Ord> {
    exponents: BTreeMap<K, i32>,
}

impl<K: Ord> Default for Powers<K> {
    fn default() -> Self {
        Self {
            exponents: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> Powers<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: K, exponent: i32) -> Self {
        let mut powers = Self::new();
        powers.add(key, exponent);
        powers
    }

    /// Adds to the exponent of `key`, saturating at the exponent bounds.
    pub fn add(&mut self, key: K, exponent: i32) {
        let entry = self.exponents.entry(key.clone()).or_insert(0);
        *entry = clamp(i64::from(*entry) + i64::from(exponent));
        if *entry == 0 {
            self.exponents.remove(&key);
        }
    }

    /// Like [`add`](Self::add) but `None` when the sum leaves the bounds.
    pub fn checked_add(&mut self, key: K, exponent: i32) -> Option<()> {
        let sum = checked(i64::from(self.get(&key)) + i64::from(exponent))?;
        if sum == 0 {
            self.exponents.remove(&key);
        } else {
            self.exponents.insert(key, sum);
        }
        Some(())
    }

    pub fn get(&self, key: &K) -> i32 {
        self.exponents.get(key).copied().unwrap_or(0)
    }

    pub fn remove(&mut self, key: &K) -> i32 {
        self.exponents.remove(key).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.exponents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exponents.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, i32)> {
        self.exponents.iter().map(|(k, e)| (k, *e))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.exponents.keys()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.exponents.contains_key(key)
    }

    pub fn multiply(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (key, exponent) in other.iter() {
            result.add(key.clone(), exponent);
        }
        result
    }

    pub fn checked_multiply(&self, other: &Self) -> Option<Self> {
        let mut result = self.clone();
        for (key, exponent) in other.iter() {
            result.checked_add(key.clone(), exponent)?;
        }
        Some(result)
    }

    /// Scales every exponent by `n`, saturating at the exponent bounds.
    pub fn raised_to(&self, n: i32) -> Self {
        if n == 0 {
            return Self::new();
        }
        Self {
            exponents: self
                .exponents
                .iter()
                .map(|(k, e)| (k.clone(), clamp(i64::from(*e) * i64::from(n))))
                .collect(),
        }
    }

    pub fn checked_raised_to(&self, n: i32) -> Option<Self> {
        if n == 0 {
            return Some(Self::new());
        }
        let exponents = self
            .exponents
            .iter()
            .map(|(k, e)| Some((k.clone(), checked(i64::from(*e) * i64::from(n))?)))
            .collect::<Option<_>>()?;
        Some(Self { exponents })
    }
}

fn clamp(exponent: i64) -> i32 {
    exponent.clamp(-i64::from(MAX_EXPONENT), i64::from(MAX_EXPONENT)) as i32
}

fn checked(exponent: i64) -> Option<i32> {
    i32::try_from(exponent)
        .ok()
        .filter(|e| e.unsigned_abs() <= MAX_EXPONENT as u32)
}

impl<K: Ord + Clone> FromIterator<(K, i32)> for Powers<K> {
    fn from_iter<I: IntoIterator<Item = (K, i32)>>(iter: I) -> Self {
        let mut powers = Self::new();
        for (key, exponent) in iter {
            powers.add(key, exponent);
        }
        powers
    }
}

/// Writes a product as `a*b^2/c/d^3`; `1` for the empty product and `1/s`
/// when only negative exponents are present.
pub(crate) fn write_product(
    f: &mut fmt::Formatter<'_>,
    factors: &[(String, i32)],
) -> fmt::Result {
    let positives: Vec<&(String, i32)> = factors.iter().filter(|(_, e)| *e > 0).collect();
    let negatives: Vec<&(String, i32)> = factors.iter().filter(|(_, e)| *e < 0).collect();

    if positives.is_empty() {
        write!(f, "1")?;
    }
    for (i, (name, exponent)) in positives.iter().enumerate() {
        if i > 0 {
            write!(f, "*")?;
        }
        write_factor(f, name, *exponent)?;
    }
    for (name, exponent) in negatives {
        write!(f, "/")?;
        write_factor(f, name, -exponent)?;
    }
    Ok(())
}

fn write_factor(f: &mut fmt::Formatter<'_>, name: &str, exponent: i32) -> fmt::Result {
    if exponent == 1 {
        write!(f, "{}", name)
    } else {
        write!(f, "{}^{}", name, exponent)
    }
}

/// Variable-free product of declared unit names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Unit {
    powers: Powers<String>,
}

impl Unit {
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            powers: Powers::single(name.into(), 1),
        }
    }

    pub fn from_powers(powers: Powers<String>) -> Self {
        Self { powers }
    }

    pub fn powers(&self) -> &Powers<String> {
        &self.powers
    }

    pub fn is_scalar(&self) -> bool {
        self.powers.is_empty()
    }

    pub fn exponent(&self, name: &str) -> i32 {
        self.powers.get(&name.to_string())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.powers.keys().map(String::as_str)
    }

    pub fn multiply(&self, other: &Unit) -> Unit {
        Unit::from_powers(self.powers.multiply(&other.powers))
    }

    pub fn divide(&self, other: &Unit) -> Unit {
        self.multiply(&other.reciprocal())
    }

    pub fn raised_to(&self, n: i32) -> Unit {
        Unit::from_powers(self.powers.raised_to(n))
    }

    pub fn reciprocal(&self) -> Unit {
        self.raised_to(-1)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factors: Vec<(String, i32)> =
            self.powers.iter().map(|(k, e)| (k.clone(), e)).collect();
        write_product(f, &factors)
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitVarId(pub(crate) u32);

impl UnitVarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UnitVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_u{}", self.0)
    }
}

/// Product of declared units and unit variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UnitExpr {
    units: Unit,
    vars: Powers<UnitVarId>,
}

impl UnitExpr {
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn var(id: UnitVarId) -> Self {
        Self {
            units: Unit::scalar(),
            vars: Powers::single(id, 1),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::from_unit(Unit::named(name))
    }

    pub fn from_unit(units: Unit) -> Self {
        Self {
            units,
            vars: Powers::new(),
        }
    }

    pub fn from_parts(units: Unit, vars: Powers<UnitVarId>) -> Self {
        Self { units, vars }
    }

    pub fn units(&self) -> &Unit {
        &self.units
    }

    pub fn vars(&self) -> &Powers<UnitVarId> {
        &self.vars
    }

    /// The variable when this expression is exactly `v^1`.
    pub fn as_var(&self) -> Option<UnitVarId> {
        if !self.units.is_scalar() || self.vars.len() != 1 {
            return None;
        }
        self.vars
            .iter()
            .next()
            .and_then(|(id, e)| (e == 1).then_some(*id))
    }

    pub fn is_scalar(&self) -> bool {
        self.units.is_scalar() && self.vars.is_empty()
    }

    pub fn is_ground(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn to_unit(&self) -> Option<Unit> {
        self.is_ground().then(|| self.units.clone())
    }

    pub fn contains_var(&self, id: UnitVarId) -> bool {
        self.vars.contains(&id)
    }

    pub fn multiply(&self, other: &UnitExpr) -> UnitExpr {
        UnitExpr {
            units: self.units.multiply(&other.units),
            vars: self.vars.multiply(&other.vars),
        }
    }

    pub fn divide(&self, other: &UnitExpr) -> UnitExpr {
        self.multiply(&other.raised_to(-1))
    }

    pub fn raised_to(&self, n: i32) -> UnitExpr {
        UnitExpr {
            units: self.units.raised_to(n),
            vars: self.vars.raised_to(n),
        }
    }

    /// Removes `id` from the product, returning its exponent.
    pub(crate) fn without_var(&self, id: UnitVarId) -> (i32, UnitExpr) {
        let mut rest = self.clone();
        let exponent = rest.vars.remove(&id);
        (exponent, rest)
    }

    /// Every exponent, declared units and variables alike.
    pub(crate) fn exponents(&self) -> impl Iterator<Item = i32> + '_ {
        self.units
            .powers()
            .iter()
            .map(|(_, e)| e)
            .chain(self.vars.iter().map(|(_, e)| e))
    }
}

impl From<Unit> for UnitExpr {
    fn from(unit: Unit) -> Self {
        UnitExpr::from_unit(unit)
    }
}

impl fmt::Display for UnitExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factors: Vec<(String, i32)> = self
            .units
            .powers()
            .iter()
            .map(|(k, e)| (k.clone(), e))
            .chain(self.vars.iter().map(|(v, e)| (v.to_string(), e)))
            .collect();
        write_product(f, &factors)
    }
}
