//! Capability requirements on types
//!
//! A requirement on an unbound variable is deferred: it is merged into the
//! variable's set and checked once the variable is linked. A requirement on
//! a constructed type is checked against the constructor's declared
//! capabilities and then pushed down to its type children where the
//! constructor only offers a capability when its contents do.

use crate::core::capabilities::CapabilitySet;
use crate::core::types::TypeExpr;
use crate::core::universe::Universe;
use crate::errors::TypeError;
use tracing::trace;

pub fn enforce(
    universe: &mut Universe,
    required: &CapabilitySet,
    ty: &TypeExpr,
) -> Result<(), TypeError> {
    if required.is_empty() {
        return Ok(());
    }

    let ty = universe.prune(ty);
    if let TypeExpr::Var(id) = ty {
        trace!(var = %id, capabilities = %required, "deferring capabilities");
        return universe.add_capabilities(id, required);
    }

    if let Some(missing) = required.check_satisfied_by(ty.declared_capabilities().iter().copied()) {
        let rendered = universe.render(&ty);
        return Err(missing.into_error(rendered));
    }

    if ty.capabilities_depend_on_children() {
        for child in ty.type_children() {
            enforce(universe, required, child)?;
        }
    }
    Ok(())
}

/// Whether `ty` offers `capability` as far as it is known. Unbound variables
/// count as offering it.
pub fn offers(universe: &mut Universe, ty: &TypeExpr, capability: &str) -> bool {
    let ty = universe.prune(ty);
    if ty.is_var() {
        return true;
    }
    if !ty.declared_capabilities().contains(&capability) {
        return false;
    }
    !ty.capabilities_depend_on_children()
        || ty
            .type_children()
            .into_iter()
            .all(|child| offers(universe, child, capability))
}
