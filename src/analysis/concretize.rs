//! Resolving unification results into concrete types

use crate::core::concrete::{ConcreteArg, ConcreteTagged, ConcreteType};
use crate::core::types::{TypeArg, TypeExpr, TypeVarId};
use crate::core::units::{Unit, UnitExpr, UnitVarId};
use crate::core::universe::Universe;
use crate::errors::{ErrorKind, TypeError};
use crate::registry::{Registry, TypeParam};
use std::collections::HashSet;
use tracing::{debug, instrument};

pub struct Concretizer<'a> {
    universe: &'a Universe,
    registry: &'a dyn Registry,
    allow_defaulting: bool,
    visiting: HashSet<TypeVarId>,
}

impl<'a> Concretizer<'a> {
    pub fn new(universe: &'a Universe, registry: &'a dyn Registry, allow_defaulting: bool) -> Self {
        Self {
            universe,
            registry,
            allow_defaulting,
            visiting: HashSet::new(),
        }
    }

    /// Walks `ty` following links. A link cycle means unification let one
    /// through and is reported as an internal error.
    #[instrument(level = "debug", skip(self, ty), fields(ty = %ty))]
    pub fn concretize(&mut self, ty: &TypeExpr) -> Result<ConcreteType, TypeError> {
        let result = self.concretize_type(ty)?;
        debug!(concrete = %result, "concretized");
        Ok(result)
    }

    fn concretize_type(&mut self, ty: &TypeExpr) -> Result<ConcreteType, TypeError> {
        Ok(match ty {
            TypeExpr::Var(id) => return self.concretize_var(*id),
            TypeExpr::Number(unit) => ConcreteType::Number(self.concretize_unit(unit)?),
            TypeExpr::Text => ConcreteType::Text,
            TypeExpr::Boolean => ConcreteType::Boolean,
            TypeExpr::Date(kind) => ConcreteType::Date(*kind),
            TypeExpr::Tuple(items) => ConcreteType::Tuple(
                items
                    .iter()
                    .map(|item| self.concretize_type(item))
                    .collect::<Result<_, _>>()?,
            ),
            TypeExpr::Array(item) => ConcreteType::Array(Box::new(self.concretize_type(item)?)),
            TypeExpr::Function(params, result) => ConcreteType::Function(
                params
                    .iter()
                    .map(|param| self.concretize_type(param))
                    .collect::<Result<_, _>>()?,
                Box::new(self.concretize_type(result)?),
            ),
            TypeExpr::Record(fields) => ConcreteType::Record(
                fields
                    .iter()
                    .map(|(name, ty)| Ok((name.clone(), self.concretize_type(ty)?)))
                    .collect::<Result<_, TypeError>>()?,
            ),
            TypeExpr::Tagged(name, args) => ConcreteType::Tagged(self.concretize_tagged(name, args)?),
        })
    }

    fn concretize_var(&mut self, id: TypeVarId) -> Result<ConcreteType, TypeError> {
        let universe = self.universe;
        if let Some(target) = universe.type_link(id) {
            if !self.visiting.insert(id) {
                return Err(TypeError::internal(format!(
                    "type variable {} is part of a link cycle",
                    id
                )));
            }
            let result = self.concretize_type(target);
            self.visiting.remove(&id);
            return result;
        }

        let requirements: Vec<String> = universe
            .capabilities(id)
            .map(|caps| caps.names().map(String::from).collect())
            .unwrap_or_default();

        if self.allow_defaulting && requirements.is_empty() {
            debug!(var = %id, "defaulting to VOID");
            return Ok(ConcreteType::Void);
        }
        Err(TypeError::new(ErrorKind::AmbiguousType {
            var: id.to_string(),
            requirements,
        }))
    }

    fn concretize_unit(&mut self, unit: &UnitExpr) -> Result<Unit, TypeError> {
        let mut visiting = HashSet::new();
        let unit = self.substitute_unit(unit, &mut visiting)?;
        for name in unit.names() {
            if self.registry.lookup_declared_unit(name).is_none() {
                return Err(TypeError::unknown_unit(name, &self.registry.unit_names()));
            }
        }
        Ok(unit)
    }

    fn substitute_unit(
        &self,
        unit: &UnitExpr,
        visiting: &mut HashSet<UnitVarId>,
    ) -> Result<Unit, TypeError> {
        let mut result = unit.units().clone();
        for (id, exponent) in unit.vars().iter() {
            let value = match self.universe.unit_link(*id) {
                Some(target) => {
                    if !visiting.insert(*id) {
                        return Err(TypeError::internal(format!(
                            "unit variable {} is part of a link cycle",
                            id
                        )));
                    }
                    let value = self.substitute_unit(target, visiting)?;
                    visiting.remove(id);
                    value
                }
                None if self.allow_defaulting => {
                    debug!(var = %id, "defaulting unit to scalar");
                    Unit::scalar()
                }
                None => {
                    return Err(TypeError::new(ErrorKind::AmbiguousType {
                        var: id.to_string(),
                        requirements: Vec::new(),
                    }))
                }
            };
            result = result.multiply(&value.raised_to(exponent));
        }
        Ok(result)
    }

    fn concretize_tagged(&mut self, name: &str, args: &[TypeArg]) -> Result<ConcreteTagged, TypeError> {
        let definition = self
            .registry
            .lookup_tagged_type(name)
            .ok_or_else(|| TypeError::unknown_type(name, &self.registry.tagged_type_names()))?;
        if definition.params.len() != args.len() {
            return Err(TypeError::new(ErrorKind::ArityMismatch {
                name: name.to_string(),
                expected: definition.params.len(),
                found: args.len(),
            }));
        }

        let args = definition
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| match (param, arg) {
                (TypeParam::Type(_), TypeArg::Type(ty)) => self.concretize_type(ty).map(ConcreteArg::Type),
                (TypeParam::Unit(_), TypeArg::Unit(unit)) => {
                    self.concretize_unit(unit).map(ConcreteArg::Unit)
                }
                (param, arg) => Err(TypeError::mismatch(param.to_string(), arg.to_string())),
            })
            .collect::<Result<_, _>>()?;
        Ok(ConcreteTagged::new(name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::unify::Unifier;
    use crate::core::capabilities::{CapabilitySet, COMPARABLE};
    use crate::registry::TypeContext;

    #[test]
    fn ground_types_concretize_to_themselves() {
        let snapshot = TypeContext::with_builtins().snapshot();
        let universe = Universe::new();
        let ty = TypeExpr::function(
            vec![TypeExpr::record([("speed", TypeExpr::number(UnitExpr::named("km")))])],
            TypeExpr::Tagged("Optional".into(), vec![TypeArg::Type(TypeExpr::Text)]),
        );
        let concrete = Concretizer::new(&universe, snapshot.as_ref(), false)
            .concretize(&ty)
            .unwrap();
        assert_eq!(concrete.to_type_expr(), Some(ty));
    }

    #[test]
    fn defaulting_fills_unconstrained_variables() {
        let snapshot = TypeContext::with_builtins().snapshot();
        let mut universe = Universe::new();
        let t = universe.fresh_type_var();
        let u = UnitExpr::var(universe.fresh_unit_var());
        let ty = TypeExpr::Tuple(vec![t, TypeExpr::Number(u)]);

        let concrete = Concretizer::new(&universe, snapshot.as_ref(), true)
            .concretize(&ty)
            .unwrap();
        assert_eq!(
            concrete,
            ConcreteType::Tuple(vec![ConcreteType::Void, ConcreteType::scalar_number()])
        );

        let err = Concretizer::new(&universe, snapshot.as_ref(), false)
            .concretize(&ty)
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::AmbiguousType { .. }));
    }

    #[test]
    fn constrained_variables_stay_ambiguous() {
        let snapshot = TypeContext::with_builtins().snapshot();
        let mut universe = Universe::new();
        let t = universe.fresh_type_var_with(CapabilitySet::require(COMPARABLE, "max"));
        let err = Concretizer::new(&universe, snapshot.as_ref(), true)
            .concretize(&TypeExpr::Var(t))
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::AmbiguousType {
                var: t.to_string(),
                requirements: vec![COMPARABLE.to_string()],
            }
        );
    }

    #[test]
    fn bound_variables_resolve_through_links() {
        let snapshot = TypeContext::with_builtins().snapshot();
        let mut universe = Universe::new();
        let t = universe.fresh_type_var();
        Unifier::new(&mut universe)
            .unify(&t, &TypeExpr::array(TypeExpr::Boolean))
            .unwrap();
        let concrete = Concretizer::new(&universe, snapshot.as_ref(), false)
            .concretize(&t)
            .unwrap();
        assert_eq!(concrete.to_string(), "[BOOLEAN]");
    }

    #[test]
    fn link_cycles_are_internal_errors() {
        let snapshot = TypeContext::with_builtins().snapshot();
        let mut universe = Universe::new();
        let a = universe.fresh_type_var_with(CapabilitySet::empty());
        let b = universe.fresh_type_var_with(CapabilitySet::empty());
        universe.force_link_type(a, TypeExpr::array(TypeExpr::Var(b)));
        universe.force_link_type(b, TypeExpr::Var(a));

        let err = Concretizer::new(&universe, snapshot.as_ref(), true)
            .concretize(&TypeExpr::Var(a))
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn undeclared_names_are_rejected() {
        let snapshot = TypeContext::with_builtins().snapshot();
        let universe = Universe::new();
        let mut concretizer = Concretizer::new(&universe, snapshot.as_ref(), true);

        let err = concretizer
            .concretize(&TypeExpr::number(UnitExpr::named("furlong")))
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownUnit { .. }));

        let err = concretizer
            .concretize(&TypeExpr::Tagged("Optional".into(), vec![]))
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ArityMismatch { .. }));
    }
}
