//! Index-based arena of type and unit variables
//!
//! A `Universe` owns every variable created during one type-checking pass.
//! Variables are addressed by integer handles; linking a variable is a cell
//! update and pruning compresses link chains lazily on read.

use crate::core::capabilities::CapabilitySet;
use crate::core::types::{TypeArg, TypeExpr, TypeVarId};
use crate::core::units::{Powers, UnitExpr, UnitVarId};
use crate::errors::TypeError;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum TypeCell {
    Unbound(CapabilitySet),
    Link(TypeExpr),
}

#[derive(Debug, Clone)]
enum UnitCell {
    Unbound,
    Link(UnitExpr),
}

#[derive(Debug, Default)]
pub struct Universe {
    types: Vec<TypeCell>,
    units: Vec<UnitCell>,
}

impl Universe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_type_var(&mut self) -> TypeExpr {
        TypeExpr::Var(self.fresh_type_var_with(CapabilitySet::empty()))
    }

    pub fn fresh_type_var_with(&mut self, capabilities: CapabilitySet) -> TypeVarId {
        let id = TypeVarId(self.types.len() as u32);
        self.types.push(TypeCell::Unbound(capabilities));
        id
    }

    pub fn fresh_unit_var(&mut self) -> UnitVarId {
        let id = UnitVarId(self.units.len() as u32);
        self.units.push(UnitCell::Unbound);
        id
    }

    pub fn type_var_count(&self) -> usize {
        self.types.len()
    }

    pub fn unit_var_count(&self) -> usize {
        self.units.len()
    }

    /// Requirements of an unbound variable; `None` once it is linked.
    pub fn capabilities(&self, id: TypeVarId) -> Option<&CapabilitySet> {
        match self.types.get(id.index()) {
            Some(TypeCell::Unbound(caps)) => Some(caps),
            _ => None,
        }
    }

    pub fn is_type_bound(&self, id: TypeVarId) -> bool {
        matches!(self.types.get(id.index()), Some(TypeCell::Link(_)))
    }

    pub fn is_unit_bound(&self, id: UnitVarId) -> bool {
        matches!(self.units.get(id.index()), Some(UnitCell::Link(_)))
    }

    /// Raw link of a variable, without following or compressing chains.
    pub(crate) fn type_link(&self, id: TypeVarId) -> Option<&TypeExpr> {
        match self.types.get(id.index()) {
            Some(TypeCell::Link(target)) => Some(target),
            _ => None,
        }
    }

    pub(crate) fn unit_link(&self, id: UnitVarId) -> Option<&UnitExpr> {
        match self.units.get(id.index()) {
            Some(UnitCell::Link(target)) => Some(target),
            _ => None,
        }
    }

    pub(crate) fn add_capabilities(
        &mut self,
        id: TypeVarId,
        extra: &CapabilitySet,
    ) -> Result<(), TypeError> {
        match self.types.get_mut(id.index()) {
            Some(TypeCell::Unbound(caps)) => {
                *caps = caps.union(extra);
                Ok(())
            }
            Some(TypeCell::Link(_)) => Err(TypeError::internal(format!(
                "adding capabilities to linked variable {}",
                id
            ))),
            None => Err(unknown_var(id.to_string())),
        }
    }

    /// Links an unbound variable. A linked variable never reverts.
    pub(crate) fn link_type(&mut self, id: TypeVarId, target: TypeExpr) -> Result<(), TypeError> {
        match self.types.get_mut(id.index()) {
            Some(cell @ TypeCell::Unbound(_)) => {
                *cell = TypeCell::Link(target);
                Ok(())
            }
            Some(TypeCell::Link(_)) => {
                Err(TypeError::internal(format!("variable {} linked twice", id)))
            }
            None => Err(unknown_var(id.to_string())),
        }
    }

    pub(crate) fn link_unit(&mut self, id: UnitVarId, target: UnitExpr) -> Result<(), TypeError> {
        match self.units.get_mut(id.index()) {
            Some(cell @ UnitCell::Unbound) => {
                *cell = UnitCell::Link(target);
                Ok(())
            }
            Some(UnitCell::Link(_)) => {
                Err(TypeError::internal(format!("unit variable {} linked twice", id)))
            }
            None => Err(unknown_var(id.to_string())),
        }
    }

    /// Follows top-level links to the current representative, compressing
    /// the chain. Stops at a repeated variable instead of looping; the
    /// concretizer reports such a cycle as an internal error.
    pub fn prune(&mut self, ty: &TypeExpr) -> TypeExpr {
        let TypeExpr::Var(start) = ty else {
            return ty.clone();
        };

        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = TypeExpr::Var(*start);
        let mut cyclic = false;
        while let TypeExpr::Var(id) = current {
            if !seen.insert(id) {
                cyclic = true;
                break;
            }
            match self.types.get(id.index()) {
                Some(TypeCell::Link(next)) => {
                    chain.push(id);
                    current = next.clone();
                }
                _ => break,
            }
        }

        if chain.len() > 1 && !cyclic {
            for id in chain {
                self.types[id.index()] = TypeCell::Link(current.clone());
            }
        }
        current
    }

    /// Substitutes every linked unit variable, compressing each variable's
    /// link to its fully substituted form.
    pub fn prune_unit(&mut self, unit: &UnitExpr) -> UnitExpr {
        let mut visiting = HashSet::new();
        self.prune_unit_with(unit, &mut visiting)
    }

    fn prune_unit_with(&mut self, unit: &UnitExpr, visiting: &mut HashSet<UnitVarId>) -> UnitExpr {
        if unit.vars().keys().all(|id| !self.is_unit_bound(*id)) {
            return unit.clone();
        }

        let mut result = UnitExpr::from_parts(unit.units().clone(), Powers::new());
        for (id, exponent) in unit.vars().iter() {
            let id = *id;
            let linked = match self.units.get(id.index()) {
                Some(UnitCell::Link(target)) => Some(target.clone()),
                _ => None,
            };
            let resolved = match linked {
                Some(target) if visiting.insert(id) => {
                    let resolved = self.prune_unit_with(&target, visiting);
                    visiting.remove(&id);
                    self.units[id.index()] = UnitCell::Link(resolved.clone());
                    resolved
                }
                _ => UnitExpr::var(id),
            };
            result = result.multiply(&resolved.raised_to(exponent));
        }
        result
    }

    /// Deep substitution of every linked variable, for display and for
    /// handing results back to callers.
    pub fn resolve(&mut self, ty: &TypeExpr) -> TypeExpr {
        let mut visiting = HashSet::new();
        self.resolve_with(ty, &mut visiting)
    }

    fn resolve_with(&mut self, ty: &TypeExpr, visiting: &mut HashSet<TypeVarId>) -> TypeExpr {
        let pruned = self.prune(ty);
        if let TypeExpr::Var(id) = pruned {
            return TypeExpr::Var(id);
        }
        if let TypeExpr::Var(id) = ty {
            if !visiting.insert(*id) {
                return ty.clone();
            }
        }
        let result = match pruned {
            TypeExpr::Var(id) => TypeExpr::Var(id),
            TypeExpr::Number(unit) => TypeExpr::Number(self.prune_unit(&unit)),
            TypeExpr::Text => TypeExpr::Text,
            TypeExpr::Boolean => TypeExpr::Boolean,
            TypeExpr::Date(kind) => TypeExpr::Date(kind),
            TypeExpr::Tuple(items) => TypeExpr::Tuple(
                items.iter().map(|item| self.resolve_with(item, visiting)).collect(),
            ),
            TypeExpr::Array(item) => TypeExpr::array(self.resolve_with(&item, visiting)),
            TypeExpr::Function(params, result) => TypeExpr::function(
                params.iter().map(|p| self.resolve_with(p, visiting)).collect(),
                self.resolve_with(&result, visiting),
            ),
            TypeExpr::Tagged(name, args) => TypeExpr::Tagged(
                name,
                args.iter()
                    .map(|arg| match arg {
                        TypeArg::Type(ty) => TypeArg::Type(self.resolve_with(ty, visiting)),
                        TypeArg::Unit(unit) => TypeArg::Unit(self.prune_unit(unit)),
                    })
                    .collect(),
            ),
            TypeExpr::Record(fields) => TypeExpr::Record(
                fields
                    .iter()
                    .map(|(name, ty)| (name.clone(), self.resolve_with(ty, visiting)))
                    .collect(),
            ),
        };
        if let TypeExpr::Var(id) = ty {
            visiting.remove(id);
        }
        result
    }

    pub fn render(&mut self, ty: &TypeExpr) -> String {
        self.resolve(ty).to_string()
    }

    pub fn render_unit(&mut self, unit: &UnitExpr) -> String {
        self.prune_unit(unit).to_string()
    }

    /// Links a variable without any checks, to build corrupt states that
    /// the concretizer must detect.
    #[cfg(test)]
    pub(crate) fn force_link_type(&mut self, id: TypeVarId, target: TypeExpr) {
        self.types[id.index()] = TypeCell::Link(target);
    }
}

fn unknown_var(name: String) -> TypeError {
    TypeError::internal(format!("variable {} does not belong to this universe", name))
}
