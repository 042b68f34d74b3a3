//! Unification of types and units
//!
//! Types unify structurally. Units unify as elements of the free abelian
//! group over declared unit names: `a = b` is solved as `a / b = 1`, one
//! variable at a time.

use crate::analysis::constraints;
use crate::core::types::{TypeArg, TypeExpr, TypeVarId};
use crate::core::units::{Powers, Unit, UnitExpr, UnitVarId};
use crate::core::universe::Universe;
use crate::errors::{ErrorKind, TypeError};
use crate::registry::Registry;
use crate::units::algebra;
use tracing::{debug, trace};

pub struct Unifier<'a> {
    universe: &'a mut Universe,
    registry: Option<&'a dyn Registry>,
}

impl<'a> Unifier<'a> {
    pub fn new(universe: &'a mut Universe) -> Self {
        Self {
            universe,
            registry: None,
        }
    }

    /// With a registry, unit mismatches between convertible units carry the
    /// conversion factor as a suggestion.
    pub fn with_registry(universe: &'a mut Universe, registry: &'a dyn Registry) -> Self {
        Self {
            universe,
            registry: Some(registry),
        }
    }

    /// Unifies `a` with `b`, returning the unified type. On failure the
    /// innermost mismatching pair is reported, with `a` and `b` as context.
    pub fn unify(&mut self, a: &TypeExpr, b: &TypeExpr) -> Result<TypeExpr, TypeError> {
        trace!(a = %a, b = %b, "unify");
        self.unify_types(a, b).map_err(|e| {
            let outer_a = self.universe.render(a);
            let outer_b = self.universe.render(b);
            e.with_context(outer_a, outer_b)
        })
    }

    fn unify_types(&mut self, a: &TypeExpr, b: &TypeExpr) -> Result<TypeExpr, TypeError> {
        let a = self.universe.prune(a);
        let b = self.universe.prune(b);

        match (&a, &b) {
            (TypeExpr::Var(x), TypeExpr::Var(y)) if x == y => Ok(a),
            (TypeExpr::Var(x), TypeExpr::Var(y)) => {
                let (survivor, linked) = if x < y { (*x, *y) } else { (*y, *x) };
                self.merge_vars(survivor, linked)
            }
            (TypeExpr::Var(x), _) => self.bind(*x, &b),
            (_, TypeExpr::Var(y)) => self.bind(*y, &a),

            (TypeExpr::Number(ua), TypeExpr::Number(ub)) => {
                self.unify_units(ua, ub)?;
                Ok(a)
            }
            (TypeExpr::Text, TypeExpr::Text) | (TypeExpr::Boolean, TypeExpr::Boolean) => Ok(a),
            (TypeExpr::Date(ka), TypeExpr::Date(kb)) if ka == kb => Ok(a),

            (TypeExpr::Tuple(xs), TypeExpr::Tuple(ys)) if xs.len() == ys.len() => {
                for (x, y) in xs.iter().zip(ys) {
                    self.unify_types(x, y)?;
                }
                Ok(a)
            }
            (TypeExpr::Array(x), TypeExpr::Array(y)) => {
                self.unify_types(x, y)?;
                Ok(a)
            }
            (TypeExpr::Function(pa, ra), TypeExpr::Function(pb, rb)) if pa.len() == pb.len() => {
                for (x, y) in pa.iter().zip(pb) {
                    self.unify_types(x, y)?;
                }
                self.unify_types(ra, rb)?;
                Ok(a)
            }
            (TypeExpr::Record(fa), TypeExpr::Record(fb))
                if fa.len() == fb.len() && fa.keys().eq(fb.keys()) =>
            {
                for (x, y) in fa.values().zip(fb.values()) {
                    self.unify_types(x, y)?;
                }
                Ok(a)
            }
            (TypeExpr::Tagged(na, aa), TypeExpr::Tagged(nb, ab))
                if na == nb && aa.len() == ab.len() =>
            {
                for (x, y) in aa.iter().zip(ab) {
                    match (x, y) {
                        (TypeArg::Type(x), TypeArg::Type(y)) => {
                            self.unify_types(x, y)?;
                        }
                        (TypeArg::Unit(x), TypeArg::Unit(y)) => self.unify_units(x, y)?,
                        _ => return Err(self.mismatch(&a, &b)),
                    }
                }
                Ok(a)
            }

            _ => Err(self.mismatch(&a, &b)),
        }
    }

    fn mismatch(&mut self, a: &TypeExpr, b: &TypeExpr) -> TypeError {
        TypeError::mismatch(self.universe.render(a), self.universe.render(b))
    }

    /// Links the higher-numbered variable to the lower one and moves its
    /// requirements onto the survivor.
    fn merge_vars(&mut self, survivor: TypeVarId, linked: TypeVarId) -> Result<TypeExpr, TypeError> {
        let moved = self
            .universe
            .capabilities(linked)
            .cloned()
            .unwrap_or_default();
        self.universe.add_capabilities(survivor, &moved)?;
        self.universe.link_type(linked, TypeExpr::Var(survivor))?;
        trace!(linked = %linked, survivor = %survivor, "merged variables");
        Ok(TypeExpr::Var(survivor))
    }

    /// Binds an unbound variable to a constructed type: occurs check, then
    /// the variable's requirements against the type, then the link.
    fn bind(&mut self, var: TypeVarId, ty: &TypeExpr) -> Result<TypeExpr, TypeError> {
        if self.occurs(var, ty) {
            return Err(TypeError::new(ErrorKind::CyclicType {
                var: var.to_string(),
                ty: self.universe.render(ty),
            }));
        }

        let required = self.universe.capabilities(var).cloned().unwrap_or_default();
        constraints::enforce(self.universe, &required, ty)?;

        self.universe.link_type(var, ty.clone())?;
        trace!(var = %var, ty = %ty, "bound");
        Ok(ty.clone())
    }

    fn occurs(&mut self, var: TypeVarId, ty: &TypeExpr) -> bool {
        let ty = self.universe.prune(ty);
        match &ty {
            TypeExpr::Var(id) => *id == var,
            _ => ty
                .type_children()
                .into_iter()
                .any(|child| self.occurs(var, child)),
        }
    }

    /// Solves `a = b` over units. Structural: `km` and `m` do not unify even
    /// though they are convertible.
    pub fn unify_units(&mut self, a: &UnitExpr, b: &UnitExpr) -> Result<(), TypeError> {
        let a = self.universe.prune_unit(a);
        let b = self.universe.prune_unit(b);
        if a == b {
            return Ok(());
        }

        let solved = self.solve_unit_identity(a.divide(&b))?;
        if solved {
            trace!(a = %a, b = %b, "units unified");
            return Ok(());
        }

        // Reported as pruned before solving; a failed reduction leaves
        // intermediate variables behind.
        Err(self.unit_mismatch(&a, &b))
    }

    /// Kennedy's algorithm for `quotient = 1`. Returns `Ok(false)` when the
    /// equation has no solution.
    fn solve_unit_identity(&mut self, quotient: UnitExpr) -> Result<bool, TypeError> {
        let mut quotient = quotient;
        loop {
            quotient = self.universe.prune_unit(&quotient);

            let Some((var, exponent)) = quotient
                .vars()
                .iter()
                .min_by_key(|(id, e)| (e.abs(), **id))
                .map(|(id, e)| (*id, e))
            else {
                return Ok(quotient.is_scalar());
            };

            let (_, rest) = quotient.without_var(var);

            if rest.exponents().all(|e| e % exponent == 0) {
                // var^exponent * rest = 1
                let value = map_exponents(&rest, |e| -e / exponent);
                self.bind_unit(var, value)?;
                return Ok(true);
            }

            if quotient.vars().len() == 1 {
                return Ok(false);
            }

            // var = fresh * rest^(-(e div exponent)) leaves fresh^exponent with
            // every other exponent reduced modulo `exponent`.
            let fresh = self.universe.fresh_unit_var();
            let value = UnitExpr::var(fresh)
                .multiply(&map_exponents(&rest, |e| -e.div_euclid(exponent)));
            debug!(var = %var, fresh = %fresh, "introducing unit variable");
            self.bind_unit(var, value)?;
        }
    }

    fn bind_unit(&mut self, var: UnitVarId, value: UnitExpr) -> Result<(), TypeError> {
        let value = self.universe.prune_unit(&value);
        if value.contains_var(var) {
            return Err(TypeError::new(ErrorKind::CyclicType {
                var: var.to_string(),
                ty: value.to_string(),
            }));
        }
        trace!(var = %var, unit = %value, "bound unit");
        self.universe.link_unit(var, value)
    }

    fn unit_mismatch(&mut self, a: &UnitExpr, b: &UnitExpr) -> TypeError {
        let mut convertible = false;
        let mut suggestion = None;

        if let (Some(registry), Some(ua), Some(ub)) = (self.registry, a.to_unit(), b.to_unit()) {
            match algebra::conversion_factor(&ua, &ub, registry) {
                Ok(Some(factor)) => {
                    convertible = true;
                    suggestion = Some(format!(
                        "multiply by {} to convert {} to {}",
                        factor,
                        display_unit(&ua),
                        display_unit(&ub)
                    ));
                }
                Ok(None) => {}
                Err(e) => return e,
            }
        }

        let error = TypeError::new(ErrorKind::UnitMismatch {
            expected: a.to_string(),
            found: b.to_string(),
            convertible,
        });
        match suggestion {
            Some(suggestion) => error.with_suggestion(suggestion),
            None => error,
        }
    }
}

fn map_exponents(unit: &UnitExpr, f: impl Fn(i32) -> i32) -> UnitExpr {
    let units: Powers<String> = unit
        .units()
        .powers()
        .iter()
        .map(|(name, e)| (name.clone(), f(e)))
        .collect();
    let vars: Powers<UnitVarId> = unit.vars().iter().map(|(id, e)| (*id, f(e))).collect();
    UnitExpr::from_parts(Unit::from_powers(units), vars)
}

fn display_unit(unit: &Unit) -> String {
    if unit.is_scalar() {
        "a scalar".to_string()
    } else {
        unit.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capabilities::{CapabilitySet, EQUATABLE};
    use crate::registry::TypeContext;

    fn unit(factors: &[(&str, i32)]) -> UnitExpr {
        UnitExpr::from_unit(Unit::from_powers(
            factors.iter().map(|(n, e)| (n.to_string(), *e)).collect(),
        ))
    }

    #[test]
    fn variable_binds_to_constructed_type() {
        let mut universe = Universe::new();
        let v = universe.fresh_type_var();
        let result = Unifier::new(&mut universe).unify(&v, &TypeExpr::Text).unwrap();
        assert_eq!(result, TypeExpr::Text);
        assert_eq!(universe.resolve(&v), TypeExpr::Text);
    }

    #[test]
    fn higher_variable_links_to_lower() {
        let mut universe = Universe::new();
        let low = universe.fresh_type_var_with(CapabilitySet::empty());
        let high = universe.fresh_type_var_with(CapabilitySet::require(EQUATABLE, "="));
        let result = Unifier::new(&mut universe)
            .unify(&TypeExpr::Var(high), &TypeExpr::Var(low))
            .unwrap();
        assert_eq!(result, TypeExpr::Var(low));
        assert!(universe.is_type_bound(high));
        assert!(universe.capabilities(low).unwrap().contains(EQUATABLE));
    }

    #[test]
    fn occurs_check_rejects_cycles() {
        let mut universe = Universe::new();
        let v = universe.fresh_type_var();
        let err = Unifier::new(&mut universe)
            .unify(&v, &TypeExpr::array(TypeExpr::Tuple(vec![TypeExpr::Text, v.clone()])))
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CyclicType { .. }));
    }

    #[test]
    fn nested_mismatch_reports_inner_and_outer_pairs() {
        let mut universe = Universe::new();
        let a = TypeExpr::array(TypeExpr::Tuple(vec![TypeExpr::Text, TypeExpr::Boolean]));
        let b = TypeExpr::array(TypeExpr::Tuple(vec![TypeExpr::Text, TypeExpr::Text]));
        let err = Unifier::new(&mut universe).unify(&a, &b).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Mismatch {
                expected: "BOOLEAN".into(),
                found: "TEXT".into(),
                context: Some(("[(TEXT, BOOLEAN)]".into(), "[(TEXT, TEXT)]".into())),
            }
        );
    }

    #[test]
    fn capability_violation_on_bind() {
        let mut universe = Universe::new();
        let v = universe.fresh_type_var_with(CapabilitySet::require(EQUATABLE, "operator ="));
        let f = TypeExpr::function(vec![], TypeExpr::Text);
        let err = Unifier::new(&mut universe).unify(&TypeExpr::Var(v), &f).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MissingCapability { .. }));
        assert!(!universe.is_type_bound(v));
    }

    #[test]
    fn records_need_the_same_fields() {
        let mut universe = Universe::new();
        let a = TypeExpr::record([("x", TypeExpr::Text)]);
        let b = TypeExpr::record([("y", TypeExpr::Text)]);
        assert!(Unifier::new(&mut universe).unify(&a, &b).is_err());
    }

    #[test]
    fn tagged_operand_kinds_must_agree() {
        let mut universe = Universe::new();
        let a = TypeExpr::Tagged("T".into(), vec![TypeArg::Type(TypeExpr::Text)]);
        let b = TypeExpr::Tagged("T".into(), vec![TypeArg::Unit(UnitExpr::named("m"))]);
        assert!(Unifier::new(&mut universe).unify(&a, &b).is_err());
    }

    #[test]
    fn unit_variable_solves_against_product() {
        let mut universe = Universe::new();
        let u = universe.fresh_unit_var();
        let speed = unit(&[("m", 1), ("s", -1)]);
        Unifier::new(&mut universe)
            .unify_units(&UnitExpr::var(u), &speed)
            .unwrap();
        assert_eq!(universe.prune_unit(&UnitExpr::var(u)), speed);
    }

    #[test]
    fn squared_variable_needs_even_exponents() {
        let mut universe = Universe::new();
        let u = universe.fresh_unit_var();
        let squared = UnitExpr::var(u).raised_to(2);

        let area = unit(&[("m", 2)]);
        Unifier::new(&mut universe).unify_units(&squared, &area).unwrap();
        assert_eq!(universe.prune_unit(&UnitExpr::var(u)), UnitExpr::named("m"));

        let v = universe.fresh_unit_var();
        let err = Unifier::new(&mut universe)
            .unify_units(&UnitExpr::var(v).raised_to(2), &UnitExpr::named("m"))
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnitMismatch { convertible: false, .. }));
    }

    #[test]
    fn coupled_variables_are_reduced() {
        // u^2 * v^3 = m^6 has the solution u = m^3 * w^3, v = w^-2
        let mut universe = Universe::new();
        let u = universe.fresh_unit_var();
        let v = universe.fresh_unit_var();
        let lhs = UnitExpr::var(u).raised_to(2).multiply(&UnitExpr::var(v).raised_to(3));
        let rhs = unit(&[("m", 6)]);
        Unifier::new(&mut universe).unify_units(&lhs, &rhs).unwrap();

        let check = universe.prune_unit(&lhs);
        assert_eq!(check, rhs);
    }

    #[test]
    fn failed_reductions_report_the_original_units() {
        // u^2 * v^4 = m has no solution, found only after introducing w
        let mut universe = Universe::new();
        let u = universe.fresh_unit_var();
        let v = universe.fresh_unit_var();
        let lhs = UnitExpr::var(u).raised_to(2).multiply(&UnitExpr::var(v).raised_to(4));
        let err = Unifier::new(&mut universe)
            .unify_units(&lhs, &UnitExpr::named("m"))
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnitMismatch {
                expected: "_u0^2*_u1^4".to_string(),
                found: "m".to_string(),
                convertible: false,
            }
        );
    }

    #[test]
    fn convertible_units_still_mismatch() {
        let snapshot = TypeContext::with_builtins().snapshot();
        let mut universe = Universe::new();
        let err = Unifier::with_registry(&mut universe, snapshot.as_ref())
            .unify(
                &TypeExpr::number(UnitExpr::named("km")),
                &TypeExpr::number(UnitExpr::named("m")),
            )
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnitMismatch { convertible: true, .. }));
        assert_eq!(err.suggestions, vec!["multiply by 1000 to convert km to m".to_string()]);
    }
}
