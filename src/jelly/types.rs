//! Jelly types: immutable type templates with named variables
//!
//! A jelly type is what a library signature or a user annotation declares.
//! It is instantiated once per use site into the unification domain, with
//! fresh variables, or into a [`ConcreteType`] once every variable is known.

use crate::core::concrete::{ConcreteArg, ConcreteTagged, ConcreteType};
use crate::core::types::{write_field_name, write_list, write_quoted, CorrelationKey, DateKind, TypeArg, TypeExpr};
use crate::core::units::{write_product, Powers, Unit, UnitExpr};
use crate::core::universe::Universe;
use crate::errors::{ErrorKind, TypeError};
use crate::jelly::parser::parse_jelly;
use crate::registry::{Registry, TypeParam};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// Unit template: declared unit names and named unit variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JellyUnit {
    pub units: Powers<String>,
    pub vars: Powers<String>,
}

impl JellyUnit {
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            units: Powers::single(name.into(), 1),
            vars: Powers::new(),
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self {
            units: Powers::new(),
            vars: Powers::single(name.into(), 1),
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.units.is_empty() && self.vars.is_empty()
    }

    pub fn multiply(&self, other: &JellyUnit) -> JellyUnit {
        JellyUnit {
            units: self.units.multiply(&other.units),
            vars: self.vars.multiply(&other.vars),
        }
    }

    pub fn raised_to(&self, n: i32) -> JellyUnit {
        JellyUnit {
            units: self.units.raised_to(n),
            vars: self.vars.raised_to(n),
        }
    }

    pub fn checked_multiply(&self, other: &JellyUnit) -> Option<JellyUnit> {
        Some(JellyUnit {
            units: self.units.checked_multiply(&other.units)?,
            vars: self.vars.checked_multiply(&other.vars)?,
        })
    }

    pub fn checked_raised_to(&self, n: i32) -> Option<JellyUnit> {
        Some(JellyUnit {
            units: self.units.checked_raised_to(n)?,
            vars: self.vars.checked_raised_to(n)?,
        })
    }

    /// The variable-free unit, if this template names no variables.
    pub fn to_unit(&self) -> Option<Unit> {
        self.vars
            .is_empty()
            .then(|| Unit::from_powers(self.units.clone()))
    }

    fn instantiate(&self, universe: &mut Universe, bindings: &mut JellyBindings) -> UnitExpr {
        let mut result = UnitExpr::from_unit(Unit::from_powers(self.units.clone()));
        for (name, exponent) in self.vars.iter() {
            let bound = bindings
                .units
                .entry(name.clone())
                .or_insert_with(|| UnitExpr::var(universe.fresh_unit_var()));
            result = result.multiply(&bound.raised_to(exponent));
        }
        result
    }

    fn instantiate_concrete(
        &self,
        bindings: &ConcreteBindings,
        registry: &dyn Registry,
    ) -> Result<Unit, TypeError> {
        for name in self.units.keys() {
            if registry.lookup_declared_unit(name).is_none() {
                return Err(TypeError::unknown_unit(name, &registry.unit_names()));
            }
        }
        let mut result = Unit::from_powers(self.units.clone());
        for (name, exponent) in self.vars.iter() {
            let bound = bindings.units.get(name).ok_or_else(|| {
                TypeError::new(ErrorKind::UnresolvedVariable {
                    name: format!("@UNITVAR {}", name),
                })
            })?;
            result = result.multiply(&bound.raised_to(exponent));
        }
        Ok(result)
    }
}

impl fmt::Display for JellyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factors: Vec<(String, i32)> = self
            .units
            .iter()
            .map(|(name, e)| (name.clone(), e))
            .chain(self.vars.iter().map(|(name, e)| (format!("@UNITVAR {}", name), e)))
            .collect();
        write_product(f, &factors)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JellyArg {
    Type(JellyType),
    Unit(JellyUnit),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JellyKind {
    Number(JellyUnit),
    Text,
    Boolean,
    Date(DateKind),
    TypeVar(String),
    Tuple(Vec<JellyType>),
    Array(Box<JellyType>),
    Function(Vec<JellyType>, Box<JellyType>),
    /// Fields in declaration order; duplicates are only rejected on
    /// instantiation.
    Record(Vec<(String, JellyType)>),
    Tagged(String, Vec<JellyArg>),
}

#[derive(Debug, Clone)]
pub struct JellyType {
    kind: JellyKind,
    key: CorrelationKey,
}

/// Equality is structural; correlation keys are ignored.
impl PartialEq for JellyType {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

/// Named variables bound during instantiation into the unification domain.
#[derive(Debug, Clone, Default)]
pub struct JellyBindings {
    pub types: HashMap<String, TypeExpr>,
    pub units: HashMap<String, UnitExpr>,
}

/// Named variables bound to concrete types and units.
#[derive(Debug, Clone, Default)]
pub struct ConcreteBindings {
    pub types: HashMap<String, ConcreteType>,
    pub units: HashMap<String, Unit>,
}

/// Names a jelly type mentions, used to validate registry declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JellyReferences {
    pub type_vars: BTreeSet<String>,
    pub unit_vars: BTreeSet<String>,
    pub units: BTreeSet<String>,
    pub tagged_types: BTreeSet<String>,
}

impl JellyType {
    pub fn new(kind: JellyKind) -> Self {
        Self::with_key(kind, CorrelationKey::fresh())
    }

    pub fn with_key(kind: JellyKind, key: CorrelationKey) -> Self {
        Self { kind, key }
    }

    pub fn kind(&self) -> &JellyKind {
        &self.kind
    }

    pub fn key(&self) -> CorrelationKey {
        self.key
    }

    pub fn number(unit: JellyUnit) -> Self {
        Self::new(JellyKind::Number(unit))
    }

    pub fn type_var(name: impl Into<String>) -> Self {
        Self::new(JellyKind::TypeVar(name.into()))
    }

    pub fn array(item: JellyType) -> Self {
        Self::new(JellyKind::Array(Box::new(item)))
    }

    pub fn function(params: Vec<JellyType>, result: JellyType) -> Self {
        Self::new(JellyKind::Function(params, Box::new(result)))
    }

    pub fn tagged(name: impl Into<String>, args: Vec<JellyArg>) -> Self {
        Self::new(JellyKind::Tagged(name.into(), args))
    }

    /// The textual save form, parsed back by [`parse_jelly`].
    pub fn save(&self) -> String {
        self.to_string()
    }

    pub fn references(&self) -> JellyReferences {
        let mut references = JellyReferences::default();
        self.collect_references(&mut references);
        references
    }

    /// Whether a function type appears anywhere in the template.
    pub fn contains_function(&self) -> bool {
        match &self.kind {
            JellyKind::Function(..) => true,
            JellyKind::Number(_)
            | JellyKind::Text
            | JellyKind::Boolean
            | JellyKind::Date(_)
            | JellyKind::TypeVar(_) => false,
            JellyKind::Tuple(items) => items.iter().any(JellyType::contains_function),
            JellyKind::Array(item) => item.contains_function(),
            JellyKind::Record(fields) => fields.iter().any(|(_, ty)| ty.contains_function()),
            JellyKind::Tagged(_, args) => args.iter().any(|arg| match arg {
                JellyArg::Type(ty) => ty.contains_function(),
                JellyArg::Unit(_) => false,
            }),
        }
    }

    fn collect_references(&self, out: &mut JellyReferences) {
        let collect_unit = |unit: &JellyUnit, out: &mut JellyReferences| {
            out.units.extend(unit.units.keys().cloned());
            out.unit_vars.extend(unit.vars.keys().cloned());
        };
        match &self.kind {
            JellyKind::Number(unit) => collect_unit(unit, out),
            JellyKind::Text | JellyKind::Boolean | JellyKind::Date(_) => {}
            JellyKind::TypeVar(name) => {
                out.type_vars.insert(name.clone());
            }
            JellyKind::Tuple(items) => items.iter().for_each(|item| item.collect_references(out)),
            JellyKind::Array(item) => item.collect_references(out),
            JellyKind::Function(params, result) => {
                params.iter().for_each(|param| param.collect_references(out));
                result.collect_references(out);
            }
            JellyKind::Record(fields) => fields.iter().for_each(|(_, ty)| ty.collect_references(out)),
            JellyKind::Tagged(name, args) => {
                out.tagged_types.insert(name.clone());
                for arg in args {
                    match arg {
                        JellyArg::Type(ty) => ty.collect_references(out),
                        JellyArg::Unit(unit) => collect_unit(unit, out),
                    }
                }
            }
        }
    }

    /// Rebuilds the template in the unification domain. Variables missing
    /// from `bindings` get fresh universe variables, recorded so that
    /// repeated names share one variable. Tagged references pass through
    /// unresolved.
    pub fn instantiate_type_expr(
        &self,
        universe: &mut Universe,
        bindings: &mut JellyBindings,
    ) -> Result<TypeExpr, TypeError> {
        Ok(match &self.kind {
            JellyKind::Number(unit) => TypeExpr::Number(unit.instantiate(universe, bindings)),
            JellyKind::Text => TypeExpr::Text,
            JellyKind::Boolean => TypeExpr::Boolean,
            JellyKind::Date(kind) => TypeExpr::Date(*kind),
            JellyKind::TypeVar(name) => bindings
                .types
                .entry(name.clone())
                .or_insert_with(|| universe.fresh_type_var())
                .clone(),
            JellyKind::Tuple(items) => TypeExpr::Tuple(
                items
                    .iter()
                    .map(|item| item.instantiate_type_expr(universe, bindings))
                    .collect::<Result<_, _>>()?,
            ),
            JellyKind::Array(item) => TypeExpr::array(item.instantiate_type_expr(universe, bindings)?),
            JellyKind::Function(params, result) => {
                let params = params
                    .iter()
                    .map(|param| param.instantiate_type_expr(universe, bindings))
                    .collect::<Result<_, _>>()?;
                TypeExpr::function(params, result.instantiate_type_expr(universe, bindings)?)
            }
            JellyKind::Record(fields) => {
                let mut record = BTreeMap::new();
                for (name, ty) in fields {
                    let ty = ty.instantiate_type_expr(universe, bindings)?;
                    if record.insert(name.clone(), ty).is_some() {
                        return Err(self.duplicate_field(name));
                    }
                }
                TypeExpr::Record(record)
            }
            JellyKind::Tagged(name, args) => TypeExpr::Tagged(
                name.clone(),
                args.iter()
                    .map(|arg| match arg {
                        JellyArg::Type(ty) => ty.instantiate_type_expr(universe, bindings).map(TypeArg::Type),
                        JellyArg::Unit(unit) => Ok(TypeArg::Unit(unit.instantiate(universe, bindings))),
                    })
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Builds the concrete type once every named variable is bound. Tagged
    /// names and unit names must be declared in `registry`.
    pub fn instantiate_concrete(
        &self,
        bindings: &ConcreteBindings,
        registry: &dyn Registry,
    ) -> Result<ConcreteType, TypeError> {
        let result = match &self.kind {
            JellyKind::Number(unit) => {
                ConcreteType::Number(unit.instantiate_concrete(bindings, registry)?)
            }
            JellyKind::Text => ConcreteType::Text,
            JellyKind::Boolean => ConcreteType::Boolean,
            JellyKind::Date(kind) => ConcreteType::Date(*kind),
            JellyKind::TypeVar(name) => bindings.types.get(name).cloned().ok_or_else(|| {
                TypeError::new(ErrorKind::UnresolvedVariable {
                    name: format!("@TYPEVAR {}", name),
                })
            })?,
            JellyKind::Tuple(items) => ConcreteType::Tuple(
                items
                    .iter()
                    .map(|item| item.instantiate_concrete(bindings, registry))
                    .collect::<Result<_, _>>()?,
            ),
            JellyKind::Array(item) => {
                ConcreteType::Array(Box::new(item.instantiate_concrete(bindings, registry)?))
            }
            JellyKind::Function(params, result) => ConcreteType::Function(
                params
                    .iter()
                    .map(|param| param.instantiate_concrete(bindings, registry))
                    .collect::<Result<_, _>>()?,
                Box::new(result.instantiate_concrete(bindings, registry)?),
            ),
            JellyKind::Record(fields) => {
                let mut record = BTreeMap::new();
                for (name, ty) in fields {
                    let ty = ty.instantiate_concrete(bindings, registry)?;
                    if record.insert(name.clone(), ty).is_some() {
                        return Err(self.duplicate_field(name));
                    }
                }
                ConcreteType::Record(record)
            }
            JellyKind::Tagged(name, args) => {
                let definition = registry
                    .lookup_tagged_type(name)
                    .ok_or_else(|| TypeError::unknown_type(name, &registry.tagged_type_names()))?;
                if definition.params.len() != args.len() {
                    return Err(TypeError::new(ErrorKind::ArityMismatch {
                        name: name.clone(),
                        expected: definition.params.len(),
                        found: args.len(),
                    }));
                }
                let mut seen = HashSet::new();
                if let Some(tag) = definition.tags.iter().find(|tag| !seen.insert(tag.name.as_str())) {
                    return Err(self.duplicate_field(&tag.name));
                }

                let args = definition
                    .params
                    .iter()
                    .zip(args)
                    .map(|(param, arg)| match (param, arg) {
                        (TypeParam::Type(_), JellyArg::Type(ty)) => {
                            ty.instantiate_concrete(bindings, registry).map(ConcreteArg::Type)
                        }
                        (TypeParam::Unit(_), JellyArg::Unit(unit)) => {
                            unit.instantiate_concrete(bindings, registry).map(ConcreteArg::Unit)
                        }
                        (param, arg) => Err(TypeError::mismatch(param.to_string(), arg.to_string())),
                    })
                    .collect::<Result<_, _>>()?;
                ConcreteType::Tagged(ConcreteTagged::new(name.clone(), args))
            }
        };
        Ok(result)
    }

    fn duplicate_field(&self, name: &str) -> TypeError {
        TypeError::new(ErrorKind::DuplicateField {
            name: name.to_string(),
        })
        .with_key(self.key)
    }
}

impl fmt::Display for JellyArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JellyArg::Type(ty) => write!(f, "({})", ty),
            JellyArg::Unit(unit) => write!(f, "{{{}}}", unit),
        }
    }
}

impl fmt::Display for JellyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            JellyKind::Number(unit) if unit.is_scalar() => write!(f, "NUMBER"),
            JellyKind::Number(unit) => write!(f, "NUMBER{{{}}}", unit),
            JellyKind::Text => write!(f, "TEXT"),
            JellyKind::Boolean => write!(f, "BOOLEAN"),
            JellyKind::Date(kind) => write!(f, "{}", kind),
            JellyKind::TypeVar(name) => write!(f, "@TYPEVAR {}", name),
            JellyKind::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            JellyKind::Array(item) => write!(f, "[{}]", item),
            JellyKind::Function(params, result) => {
                write!(f, "((")?;
                write_list(f, params)?;
                write!(f, ") -> {})", result)
            }
            JellyKind::Record(fields) => {
                write!(f, "RECORD{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_field_name(f, name)?;
                    write!(f, ": {}", ty)?;
                }
                write!(f, "}}")
            }
            JellyKind::Tagged(name, args) => {
                write!(f, "TAGGED ")?;
                write_quoted(f, name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for JellyType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.save())
    }
}

impl<'de> Deserialize<'de> for JellyType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_jelly(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeContext;

    fn jelly(text: &str) -> JellyType {
        parse_jelly(text).unwrap()
    }

    #[test]
    fn equality_ignores_correlation_keys() {
        let a = JellyType::new(JellyKind::Text);
        let b = JellyType::new(JellyKind::Text);
        assert_ne!(a.key(), b.key());
        assert_eq!(a, b);
    }

    #[test]
    fn repeated_names_share_one_variable() {
        let mut universe = Universe::new();
        let mut bindings = JellyBindings::default();
        let ty = jelly("((@TYPEVAR a, NUMBER{@UNITVAR u}) -> (@TYPEVAR a, NUMBER{@UNITVAR u^2}))")
            .instantiate_type_expr(&mut universe, &mut bindings)
            .unwrap();
        assert_eq!(universe.type_var_count(), 1);
        assert_eq!(universe.unit_var_count(), 1);
        assert_eq!(ty.to_string(), "((_t0, NUMBER{_u0}) -> (_t0, NUMBER{_u0^2}))");
    }

    #[test]
    fn each_instantiation_is_fresh() {
        let mut universe = Universe::new();
        let signature = jelly("((@TYPEVAR a) -> @TYPEVAR a)");
        let first = signature
            .instantiate_type_expr(&mut universe, &mut JellyBindings::default())
            .unwrap();
        let second = signature
            .instantiate_type_expr(&mut universe, &mut JellyBindings::default())
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(universe.type_var_count(), 2);
    }

    #[test]
    fn duplicate_record_fields_fail_instantiation() {
        let ty = jelly("RECORD{a: TEXT, a: NUMBER}");
        let err = ty
            .instantiate_type_expr(&mut Universe::new(), &mut JellyBindings::default())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateField { name: "a".into() });
        assert_eq!(err.keys, vec![ty.key()]);
    }

    #[test]
    fn concrete_instantiation_checks_the_registry() {
        let snapshot = TypeContext::with_builtins().snapshot();
        let registry = snapshot.as_ref();
        let mut bindings = ConcreteBindings::default();
        bindings.types.insert("t".into(), ConcreteType::Text);
        bindings.units.insert("u".into(), Unit::named("s"));

        let ty = jelly("(TAGGED \"Optional\" (@TYPEVAR t), NUMBER{m/@UNITVAR u})")
            .instantiate_concrete(&bindings, registry)
            .unwrap();
        assert_eq!(ty.to_string(), "(TAGGED \"Optional\" (TEXT), NUMBER{m/s})");

        let err = jelly("TAGGED \"Optinal\" (TEXT)")
            .instantiate_concrete(&bindings, registry)
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownType { .. }));
        assert_eq!(err.suggestions, vec!["Did you mean 'Optional'?".to_string()]);

        let err = jelly("NUMBER{parsec}").instantiate_concrete(&bindings, registry).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownUnit { .. }));

        let err = jelly("TAGGED \"Optional\"").instantiate_concrete(&bindings, registry).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ArityMismatch { expected: 1, found: 0, .. }));

        let err = jelly("@TYPEVAR missing").instantiate_concrete(&bindings, registry).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnresolvedVariable { .. }));
    }

    #[test]
    fn references_collect_every_name() {
        let refs = jelly("((NUMBER{km/@UNITVAR u}) -> TAGGED \"Optional\" (@TYPEVAR t))").references();
        assert_eq!(refs.units.into_iter().collect::<Vec<_>>(), vec!["km"]);
        assert_eq!(refs.unit_vars.into_iter().collect::<Vec<_>>(), vec!["u"]);
        assert_eq!(refs.type_vars.into_iter().collect::<Vec<_>>(), vec!["t"]);
        assert_eq!(refs.tagged_types.into_iter().collect::<Vec<_>>(), vec!["Optional"]);
    }

    #[test]
    fn function_types_are_found_at_any_depth() {
        assert!(jelly("RECORD{on_change: ((TEXT) -> BOOLEAN)}").contains_function());
        assert!(jelly("TAGGED \"Optional\" ([(() -> TEXT)])").contains_function());
        assert!(!jelly("(NUMBER{m}, [TEXT], @TYPEVAR t)").contains_function());
    }

    #[test]
    fn serde_uses_the_text_form() {
        let ty = jelly("[NUMBER{m/s^2}]");
        let json = serde_json::to_string(&ty).unwrap();
        assert_eq!(json, "\"[NUMBER{m/s^2}]\"");
        let back: JellyType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ty);
    }
}
