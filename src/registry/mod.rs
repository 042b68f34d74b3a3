//! Declared units and tagged-type definitions
//!
//! Checks read declarations through the [`Registry`] trait. [`TypeContext`]
//! is the mutable front: every declaration publishes a fresh immutable
//! [`RegistrySnapshot`], so a check that grabbed a snapshot keeps a
//! consistent view while new units are declared elsewhere.

pub mod file;

use crate::core::units::Unit;
use crate::jelly::{parse_jelly, JellyType};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Signed;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Definition of a derived unit: `1 name = scale × base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDefinition {
    pub scale: BigRational,
    pub base: Unit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDeclaration {
    pub name: String,
    /// `None` for base units.
    pub definition: Option<UnitDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeParam {
    Type(String),
    Unit(String),
}

impl TypeParam {
    pub fn name(&self) -> &str {
        match self {
            TypeParam::Type(name) | TypeParam::Unit(name) => name,
        }
    }
}

impl fmt::Display for TypeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeParam::Type(name) => write!(f, "@TYPEVAR {}", name),
            TypeParam::Unit(name) => write!(f, "@UNITVAR {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagDefinition {
    pub name: String,
    pub payload: Option<JellyType>,
}

impl TagDefinition {
    pub fn nullary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
        }
    }

    pub fn with_payload(name: impl Into<String>, payload: JellyType) -> Self {
        Self {
            name: name.into(),
            payload: Some(payload),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedTypeDefinition {
    pub name: String,
    pub params: Vec<TypeParam>,
    pub tags: Vec<TagDefinition>,
}

impl TaggedTypeDefinition {
    pub fn tag(&self, name: &str) -> Option<(usize, &TagDefinition)> {
        self.tags.iter().enumerate().find(|(_, tag)| tag.name == name)
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|tag| tag.name.clone()).collect()
    }
}

/// Read-only view of declarations consulted during a check.
pub trait Registry: Send + Sync {
    fn lookup_tagged_type(&self, name: &str) -> Option<Arc<TaggedTypeDefinition>>;

    fn lookup_declared_unit(&self, name: &str) -> Option<UnitDeclaration>;

    /// Names for "did you mean" suggestions.
    fn tagged_type_names(&self) -> Vec<String>;

    fn unit_names(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    units: HashMap<String, UnitDeclaration>,
    tagged: HashMap<String, Arc<TaggedTypeDefinition>>,
}

impl RegistrySnapshot {
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn tagged_type_count(&self) -> usize {
        self.tagged.len()
    }
}

impl Registry for RegistrySnapshot {
    fn lookup_tagged_type(&self, name: &str) -> Option<Arc<TaggedTypeDefinition>> {
        self.tagged.get(name).cloned()
    }

    fn lookup_declared_unit(&self, name: &str) -> Option<UnitDeclaration> {
        self.units.get(name).cloned()
    }

    fn tagged_type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tagged.keys().cloned().collect();
        names.sort();
        names
    }

    fn unit_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.units.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateUnit(String),
    DuplicateType(String),
    UnknownUnit { unit: String, referenced_by: String },
    UnknownType { ty: String, referenced_by: String },
    DuplicateTag { ty: String, tag: String },
    DuplicateParam { ty: String, param: String },
    UnboundParam { ty: String, param: String },
    InvalidScale { unit: String, scale: String },
    FunctionPayload { ty: String, tag: String },
    Parse { what: String, message: String },
    Unresolved(Vec<String>),
    Io(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateUnit(name) => write!(f, "unit '{}' is already declared", name),
            Self::DuplicateType(name) => write!(f, "type '{}' is already declared", name),
            Self::UnknownUnit { unit, referenced_by } => {
                write!(f, "unknown unit '{}' referenced by '{}'", unit, referenced_by)
            }
            Self::UnknownType { ty, referenced_by } => {
                write!(f, "unknown type '{}' referenced by '{}'", ty, referenced_by)
            }
            Self::DuplicateTag { ty, tag } => {
                write!(f, "type '{}' declares tag '{}' twice", ty, tag)
            }
            Self::DuplicateParam { ty, param } => {
                write!(f, "type '{}' declares parameter '{}' twice", ty, param)
            }
            Self::UnboundParam { ty, param } => {
                write!(f, "type '{}' uses undeclared parameter '{}'", ty, param)
            }
            Self::InvalidScale { unit, scale } => {
                write!(f, "unit '{}' has invalid scale '{}'", unit, scale)
            }
            Self::FunctionPayload { ty, tag } => {
                write!(f, "tag '{}' of type '{}' carries a function payload", tag, ty)
            }
            Self::Parse { what, message } => write!(f, "cannot parse {}: {}", what, message),
            Self::Unresolved(names) => {
                write!(f, "declarations reference each other or missing names: {}", names.join(", "))
            }
            Self::Io(message) => write!(f, "I/O error: {}", message),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Mutable registry shared by a session. Declarations copy the current
/// snapshot, modify the copy and publish it.
#[derive(Debug, Default)]
pub struct TypeContext {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context pre-populated with common SI units and `Optional`.
    pub fn with_builtins() -> Self {
        let context = Self::new();
        context.install_builtins();
        context
    }

    fn install_builtins(&self) {
        let mut snapshot = RegistrySnapshot::default();
        for base in ["m", "s", "kg"] {
            snapshot.units.insert(
                base.to_string(),
                UnitDeclaration {
                    name: base.to_string(),
                    definition: None,
                },
            );
        }
        let derived = [
            ("km", 1000, 1, "m"),
            ("g", 1, 1000, "kg"),
            ("min", 60, 1, "s"),
            ("h", 3600, 1, "s"),
        ];
        for (name, numer, denom, base) in derived {
            snapshot.units.insert(
                name.to_string(),
                UnitDeclaration {
                    name: name.to_string(),
                    definition: Some(UnitDefinition {
                        scale: BigRational::new(BigInt::from(numer), BigInt::from(denom)),
                        base: Unit::named(base),
                    }),
                },
            );
        }

        let optional = TaggedTypeDefinition {
            name: "Optional".to_string(),
            params: vec![TypeParam::Type("t".to_string())],
            tags: vec![
                TagDefinition::nullary("None"),
                TagDefinition::with_payload("Is", typevar_payload("t")),
            ],
        };
        snapshot
            .tagged
            .insert(optional.name.clone(), Arc::new(optional));

        *self.current.write() = Arc::new(snapshot);
    }

    /// The current immutable view. Later declarations do not affect it.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().clone()
    }

    pub fn declare_base_unit(&self, name: &str) -> Result<(), RegistryError> {
        self.publish(|snapshot| {
            if snapshot.units.contains_key(name) {
                return Err(RegistryError::DuplicateUnit(name.to_string()));
            }
            snapshot.units.insert(
                name.to_string(),
                UnitDeclaration {
                    name: name.to_string(),
                    definition: None,
                },
            );
            Ok(())
        })
    }

    /// Declares `1 name = scale × base` for a positive `scale`. Every unit in
    /// `base` must already be declared, which keeps the declaration graph
    /// acyclic.
    pub fn declare_unit(
        &self,
        name: &str,
        scale: BigRational,
        base: Unit,
    ) -> Result<(), RegistryError> {
        if !scale.is_positive() {
            return Err(RegistryError::InvalidScale {
                unit: name.to_string(),
                scale: scale.to_string(),
            });
        }
        self.publish(|snapshot| {
            if snapshot.units.contains_key(name) {
                return Err(RegistryError::DuplicateUnit(name.to_string()));
            }
            if let Some(missing) = base.names().find(|unit| !snapshot.units.contains_key(*unit)) {
                return Err(RegistryError::UnknownUnit {
                    unit: missing.to_string(),
                    referenced_by: name.to_string(),
                });
            }
            snapshot.units.insert(
                name.to_string(),
                UnitDeclaration {
                    name: name.to_string(),
                    definition: Some(UnitDefinition { scale, base }),
                },
            );
            Ok(())
        })
    }

    /// Declares a tagged type. Payloads are data: they may not contain
    /// function types, may reference the type itself, and otherwise only
    /// tagged types and units that are already declared.
    pub fn declare_tagged(&self, definition: TaggedTypeDefinition) -> Result<(), RegistryError> {
        self.publish(|snapshot| {
            validate_tagged(snapshot, &definition)?;
            snapshot
                .tagged
                .insert(definition.name.clone(), Arc::new(definition));
            Ok(())
        })
    }

    fn publish<F>(&self, update: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut RegistrySnapshot) -> Result<(), RegistryError>,
    {
        let mut current = self.current.write();
        let mut next = RegistrySnapshot::clone(&current);
        update(&mut next)?;
        debug!(
            units = next.units.len(),
            tagged_types = next.tagged.len(),
            "published registry snapshot"
        );
        *current = Arc::new(next);
        Ok(())
    }
}

fn typevar_payload(name: &str) -> JellyType {
    JellyType::new(crate::jelly::JellyKind::TypeVar(name.to_string()))
}

fn validate_tagged(
    snapshot: &RegistrySnapshot,
    definition: &TaggedTypeDefinition,
) -> Result<(), RegistryError> {
    let ty = &definition.name;
    if snapshot.tagged.contains_key(ty) {
        return Err(RegistryError::DuplicateType(ty.clone()));
    }

    let mut params = HashSet::new();
    for param in &definition.params {
        if !params.insert(param.clone()) {
            return Err(RegistryError::DuplicateParam {
                ty: ty.clone(),
                param: param.name().to_string(),
            });
        }
    }

    let mut tags = HashSet::new();
    for tag in &definition.tags {
        if !tags.insert(tag.name.as_str()) {
            return Err(RegistryError::DuplicateTag {
                ty: ty.clone(),
                tag: tag.name.clone(),
            });
        }
        let Some(payload) = &tag.payload else {
            continue;
        };
        if payload.contains_function() {
            return Err(RegistryError::FunctionPayload {
                ty: ty.clone(),
                tag: tag.name.clone(),
            });
        }

        let references = payload.references();
        for var in references.type_vars {
            if !params.contains(&TypeParam::Type(var.clone())) {
                return Err(RegistryError::UnboundParam { ty: ty.clone(), param: var });
            }
        }
        for var in references.unit_vars {
            if !params.contains(&TypeParam::Unit(var.clone())) {
                return Err(RegistryError::UnboundParam { ty: ty.clone(), param: var });
            }
        }
        for unit in references.units {
            if !snapshot.units.contains_key(&unit) {
                return Err(RegistryError::UnknownUnit {
                    unit,
                    referenced_by: ty.clone(),
                });
            }
        }
        for tagged in references.tagged_types {
            if &tagged != ty && !snapshot.tagged.contains_key(&tagged) {
                return Err(RegistryError::UnknownType {
                    ty: tagged,
                    referenced_by: ty.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Parses `@TYPEVAR name` or `@UNITVAR name`.
pub fn parse_type_param(text: &str) -> Result<TypeParam, RegistryError> {
    let text = text.trim();
    let parse_error = || RegistryError::Parse {
        what: format!("type parameter '{}'", text),
        message: "expected '@TYPEVAR name' or '@UNITVAR name'".to_string(),
    };
    let (marker, name) = text.split_once(char::is_whitespace).ok_or_else(parse_error)?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(parse_error());
    }
    match marker {
        "@TYPEVAR" => Ok(TypeParam::Type(name.to_string())),
        "@UNITVAR" => Ok(TypeParam::Unit(name.to_string())),
        _ => Err(parse_error()),
    }
}

/// Parses a tag payload in jelly text form.
pub fn parse_payload(ty: &str, tag: &str, text: &str) -> Result<JellyType, RegistryError> {
    parse_jelly(text).map_err(|e| RegistryError::Parse {
        what: format!("payload of {}.{}", ty, tag),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_do_not_see_later_declarations() {
        let context = TypeContext::new();
        context.declare_base_unit("m").unwrap();
        let before = context.snapshot();
        context
            .declare_unit("ft", BigRational::new(3048.into(), 10000.into()), Unit::named("m"))
            .unwrap();

        assert!(before.lookup_declared_unit("ft").is_none());
        assert!(context.snapshot().lookup_declared_unit("ft").is_some());
    }

    #[test]
    fn derived_units_must_reference_declared_units() {
        let context = TypeContext::new();
        let err = context
            .declare_unit("km", BigRational::from_integer(1000.into()), Unit::named("m"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownUnit {
                unit: "m".into(),
                referenced_by: "km".into()
            }
        );
    }

    #[test]
    fn scales_must_be_positive() {
        let context = TypeContext::with_builtins();
        for scale in [0, -3] {
            let err = context
                .declare_unit("null", BigRational::from_integer(scale.into()), Unit::named("m"))
                .unwrap_err();
            assert!(matches!(err, RegistryError::InvalidScale { .. }));
        }
        assert!(context.snapshot().lookup_declared_unit("null").is_none());
    }

    #[test]
    fn duplicate_declarations_are_rejected() {
        let context = TypeContext::with_builtins();
        assert_eq!(
            context.declare_base_unit("m"),
            Err(RegistryError::DuplicateUnit("m".into()))
        );
        let optional = context.snapshot().lookup_tagged_type("Optional").unwrap();
        assert_eq!(
            context.declare_tagged((*optional).clone()),
            Err(RegistryError::DuplicateType("Optional".into()))
        );
    }

    #[test]
    fn tagged_payloads_are_validated() {
        let context = TypeContext::with_builtins();
        let unbound = TaggedTypeDefinition {
            name: "Box".into(),
            params: vec![],
            tags: vec![TagDefinition::with_payload("Full", parse_jelly("@TYPEVAR t").unwrap())],
        };
        assert!(matches!(
            context.declare_tagged(unbound),
            Err(RegistryError::UnboundParam { .. })
        ));

        let twice = TaggedTypeDefinition {
            name: "Flag".into(),
            params: vec![],
            tags: vec![TagDefinition::nullary("On"), TagDefinition::nullary("On")],
        };
        assert!(matches!(
            context.declare_tagged(twice),
            Err(RegistryError::DuplicateTag { .. })
        ));

        let callback = TaggedTypeDefinition {
            name: "Callback".into(),
            params: vec![],
            tags: vec![TagDefinition::with_payload(
                "F",
                parse_jelly("[((NUMBER) -> NUMBER)]").unwrap(),
            )],
        };
        assert_eq!(
            context.declare_tagged(callback),
            Err(RegistryError::FunctionPayload {
                ty: "Callback".into(),
                tag: "F".into()
            })
        );
    }

    #[test]
    fn recursive_definitions_may_reference_themselves() {
        let context = TypeContext::with_builtins();
        let list = TaggedTypeDefinition {
            name: "List".into(),
            params: vec![TypeParam::Type("t".into())],
            tags: vec![
                TagDefinition::nullary("Empty"),
                TagDefinition::with_payload(
                    "Cons",
                    parse_jelly("(@TYPEVAR t, TAGGED \"List\" (@TYPEVAR t))").unwrap(),
                ),
            ],
        };
        context.declare_tagged(list).unwrap();
        assert_eq!(context.snapshot().tagged_type_names(), vec!["List", "Optional"]);
    }

    #[test]
    fn type_params_parse() {
        assert_eq!(parse_type_param("@TYPEVAR t"), Ok(TypeParam::Type("t".into())));
        assert_eq!(parse_type_param(" @UNITVAR u "), Ok(TypeParam::Unit("u".into())));
        assert!(parse_type_param("t").is_err());
        assert!(parse_type_param("@TYPEVAR").is_err());
    }
}
