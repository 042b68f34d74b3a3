//! Check sessions
//!
//! A [`TypeChecker`] owns the variable universe of one check and exposes the
//! operations syntax nodes use while the caller walks an expression:
//! instantiating signatures, unifying operands, requiring capabilities,
//! applying functions and finally concretizing the result.

use crate::analysis::concretize::Concretizer;
use crate::analysis::constraints;
use crate::analysis::unify::Unifier;
use crate::core::capabilities::CapabilitySet;
use crate::core::concrete::ConcreteType;
use crate::core::types::{CorrelationKey, TypeArg, TypeExpr};
use crate::core::units::UnitExpr;
use crate::core::universe::Universe;
use crate::errors::{Diagnostics, ErrorKind, TypeError};
use crate::frontend::config::CheckOptions;
use crate::jelly::{JellyBindings, JellyType};
use crate::registry::{Registry, TypeParam};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct TypeChecker {
    universe: Universe,
    registry: Arc<dyn Registry>,
    options: CheckOptions,
    errors: Diagnostics,
}

impl TypeChecker {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self::with_options(registry, CheckOptions::default())
    }

    pub fn with_options(registry: Arc<dyn Registry>, options: CheckOptions) -> Self {
        debug!(?options, "creating type checker");
        Self {
            universe: Universe::new(),
            registry,
            errors: Diagnostics::with_limit(options.max_errors),
            options,
        }
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    pub fn registry(&self) -> &dyn Registry {
        self.registry.as_ref()
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn universe_mut(&mut self) -> &mut Universe {
        &mut self.universe
    }

    pub fn fresh_type_var(&mut self) -> TypeExpr {
        self.universe.fresh_type_var()
    }

    pub fn fresh_type_var_requiring(&mut self, capability: &str, origin: &str) -> TypeExpr {
        TypeExpr::Var(
            self.universe
                .fresh_type_var_with(CapabilitySet::require(capability, origin)),
        )
    }

    pub fn fresh_unit_var(&mut self) -> UnitExpr {
        UnitExpr::var(self.universe.fresh_unit_var())
    }

    /// Instantiates a signature with fresh variables for this use site.
    pub fn instantiate(&mut self, jelly: &JellyType) -> Result<TypeExpr, TypeError> {
        self.instantiate_with(jelly, &mut JellyBindings::default())
    }

    /// Instantiates with shared bindings, so variable names used by several
    /// templates denote the same variable.
    pub fn instantiate_with(
        &mut self,
        jelly: &JellyType,
        bindings: &mut JellyBindings,
    ) -> Result<TypeExpr, TypeError> {
        let result = jelly.instantiate_type_expr(&mut self.universe, bindings);
        self.escalate(result)
    }

    pub fn unify(&mut self, a: &TypeExpr, b: &TypeExpr) -> Result<TypeExpr, TypeError> {
        let result = Unifier::with_registry(&mut self.universe, self.registry.as_ref()).unify(a, b);
        self.escalate(result)
    }

    /// Like [`unify`](Self::unify), tagging any error with the keys of the
    /// syntax that produced `a` and `b`.
    pub fn unify_keyed(
        &mut self,
        a: &TypeExpr,
        b: &TypeExpr,
        keys: &[CorrelationKey],
    ) -> Result<TypeExpr, TypeError> {
        self.unify(a, b).map_err(|e| e.with_keys(keys))
    }

    pub fn unify_units(&mut self, a: &UnitExpr, b: &UnitExpr) -> Result<(), TypeError> {
        let result =
            Unifier::with_registry(&mut self.universe, self.registry.as_ref()).unify_units(a, b);
        self.escalate(result)
    }

    /// Requires `ty` to offer `capability`, for operators such as `=`.
    pub fn require_capability(
        &mut self,
        ty: &TypeExpr,
        capability: &str,
        origin: &str,
    ) -> Result<(), TypeError> {
        let required = CapabilitySet::require(capability, origin);
        let result = constraints::enforce(&mut self.universe, &required, ty);
        self.escalate(result)
    }

    /// Applies a function type to argument types and returns the result
    /// type. An unknown callee is unified with a fresh function type.
    pub fn apply_function(
        &mut self,
        function: &TypeExpr,
        args: &[TypeExpr],
    ) -> Result<TypeExpr, TypeError> {
        let callee = self.universe.prune(function);
        match &callee {
            TypeExpr::Var(_) => {
                let result = self.fresh_type_var();
                let expected = TypeExpr::function(args.to_vec(), result.clone());
                self.unify(&callee, &expected)?;
                Ok(self.universe.prune(&result))
            }
            TypeExpr::Function(params, result) => {
                if params.len() != args.len() {
                    return Err(TypeError::new(ErrorKind::ArityMismatch {
                        name: self.universe.render(&callee),
                        expected: params.len(),
                        found: args.len(),
                    }));
                }
                for (param, arg) in params.iter().zip(args) {
                    self.unify(param, arg)?;
                }
                Ok(self.universe.prune(result))
            }
            _ => Err(TypeError::new(ErrorKind::NotAFunction {
                ty: self.universe.render(&callee),
            })),
        }
    }

    /// Type of `TypeName.Tag` with fresh variables for the type parameters,
    /// together with the tag's payload type if it has one.
    pub fn tag_constructor(
        &mut self,
        type_name: &str,
        tag_name: &str,
    ) -> Result<(TypeExpr, Option<TypeExpr>), TypeError> {
        let definition = self.registry.lookup_tagged_type(type_name).ok_or_else(|| {
            TypeError::unknown_type(type_name, &self.registry.tagged_type_names())
        })?;
        let (_, tag) = definition
            .tag(tag_name)
            .ok_or_else(|| TypeError::no_such_tag(type_name, tag_name, &definition.tag_names()))?;

        let mut bindings = JellyBindings::default();
        let args = definition
            .params
            .iter()
            .map(|param| match param {
                TypeParam::Type(name) => {
                    let var = self.universe.fresh_type_var();
                    bindings.types.insert(name.clone(), var.clone());
                    TypeArg::Type(var)
                }
                TypeParam::Unit(name) => {
                    let var = UnitExpr::var(self.universe.fresh_unit_var());
                    bindings.units.insert(name.clone(), var.clone());
                    TypeArg::Unit(var)
                }
            })
            .collect();

        let payload = match &tag.payload {
            Some(payload) => Some(self.instantiate_with(payload, &mut bindings)?),
            None => None,
        };
        Ok((TypeExpr::Tagged(type_name.to_string(), args), payload))
    }

    /// Checks `TypeName.Tag(payload)` (or `TypeName.Tag` without one) and
    /// returns the constructed type.
    #[instrument(level = "debug", skip(self, payload))]
    pub fn construct_tag(
        &mut self,
        type_name: &str,
        tag_name: &str,
        payload: Option<&TypeExpr>,
    ) -> Result<TypeExpr, TypeError> {
        let (constructed, expected) = self.tag_constructor(type_name, tag_name)?;
        match (expected, payload) {
            (Some(expected), Some(payload)) => {
                self.unify(&expected, payload)?;
            }
            (None, None) => {}
            (expected, payload) => {
                return Err(TypeError::new(ErrorKind::ArityMismatch {
                    name: format!("{}.{}", type_name, tag_name),
                    expected: usize::from(expected.is_some()),
                    found: usize::from(payload.is_some()),
                }));
            }
        }
        Ok(self.universe.resolve(&constructed))
    }

    /// Type of `record.field` for a record whose shape is known.
    pub fn record_field(&mut self, ty: &TypeExpr, field: &str) -> Result<TypeExpr, TypeError> {
        match self.universe.prune(ty) {
            TypeExpr::Record(fields) => match fields.get(field) {
                Some(field_ty) => Ok(field_ty.clone()),
                None => {
                    let names: Vec<String> = fields.keys().cloned().collect();
                    let rendered = self.universe.render(ty);
                    Err(TypeError::no_such_field(rendered, field, &names))
                }
            },
            TypeExpr::Var(id) => Err(TypeError::new(ErrorKind::AmbiguousType {
                var: id.to_string(),
                requirements: vec![format!("field '{}'", field)],
            })),
            other => {
                let rendered = self.universe.render(&other);
                Err(TypeError::no_such_field(rendered, field, &[]))
            }
        }
    }

    pub fn resolve(&mut self, ty: &TypeExpr) -> TypeExpr {
        self.universe.resolve(ty)
    }

    pub fn render(&mut self, ty: &TypeExpr) -> String {
        self.universe.render(ty)
    }

    /// Resolves `ty` into a concrete type, defaulting if the session allows it.
    pub fn concretize(&mut self, ty: &TypeExpr) -> Result<ConcreteType, TypeError> {
        let result = Concretizer::new(
            &self.universe,
            self.registry.as_ref(),
            self.options.allow_defaulting,
        )
        .concretize(ty);
        self.escalate(result)
    }

    /// Concrete type of a jelly template whose variables are all bound in
    /// this session.
    pub fn concretize_jelly(
        &mut self,
        jelly: &JellyType,
        bindings: &mut JellyBindings,
    ) -> Result<ConcreteType, TypeError> {
        let ty = self.instantiate_with(jelly, bindings)?;
        self.concretize(&ty).map_err(|e| e.with_key(jelly.key()))
    }

    pub fn report(&mut self, error: TypeError) {
        if !self.errors.push(error) && self.errors.dropped() == 1 {
            warn!(limit = self.options.max_errors, "error limit reached, dropping further errors");
        }
    }

    /// Unwraps a result, reporting the error if there is one.
    pub fn record<T>(&mut self, result: Result<T, TypeError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.report(error);
                None
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[TypeError] {
        self.errors.as_slice()
    }

    /// Errors reported past the limit and not kept.
    pub fn dropped_errors(&self) -> usize {
        self.errors.dropped()
    }

    pub fn into_errors(self) -> Vec<TypeError> {
        self.errors.into_vec()
    }

    fn escalate<T>(&self, result: Result<T, TypeError>) -> Result<T, TypeError> {
        result.map_err(|e| e.escalate(self.options.panic_on_internal_error))
    }
}

/// Instantiates `jelly` in a fresh session and concretizes it.
pub fn check_jelly(
    jelly: &JellyType,
    registry: Arc<dyn Registry>,
    options: CheckOptions,
) -> Result<ConcreteType, TypeError> {
    let mut checker = TypeChecker::with_options(registry, options);
    checker.concretize_jelly(jelly, &mut JellyBindings::default())
}
