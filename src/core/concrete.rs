//! Variable-free types handed to the evaluator

use crate::core::types::{write_field_name, write_list, write_quoted, DateKind, TypeArg, TypeExpr};
use crate::core::units::{Unit, UnitExpr};
use crate::errors::{ErrorKind, TypeError};
use crate::jelly::ConcreteBindings;
use crate::registry::{Registry, TypeParam};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcreteType {
    Number(Unit),
    Text,
    Boolean,
    Date(DateKind),
    Tuple(Vec<ConcreteType>),
    Array(Box<ConcreteType>),
    Function(Vec<ConcreteType>, Box<ConcreteType>),
    Record(BTreeMap<String, ConcreteType>),
    Tagged(ConcreteTagged),
    /// Bottom type, only ever produced by defaulting an unconstrained variable.
    Void,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcreteArg {
    Type(ConcreteType),
    Unit(Unit),
}

/// A tagged type applied to concrete arguments. Tags are resolved on demand
/// so recursive definitions (a list whose tail is the list itself) stay
/// finite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteTagged {
    pub name: String,
    pub args: Vec<ConcreteArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteTag {
    pub name: String,
    pub index: usize,
    pub payload: Option<ConcreteType>,
}

impl ConcreteTagged {
    pub fn new(name: impl Into<String>, args: Vec<ConcreteArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Instantiates every tag of the definition with this type's arguments.
    pub fn tags(&self, registry: &dyn Registry) -> Result<Vec<ConcreteTag>, TypeError> {
        let definition = registry
            .lookup_tagged_type(&self.name)
            .ok_or_else(|| TypeError::unknown_type(&self.name, &registry.tagged_type_names()))?;

        if definition.params.len() != self.args.len() {
            return Err(TypeError::new(ErrorKind::ArityMismatch {
                name: self.name.clone(),
                expected: definition.params.len(),
                found: self.args.len(),
            }));
        }

        let mut bindings = ConcreteBindings::default();
        for (param, arg) in definition.params.iter().zip(&self.args) {
            match (param, arg) {
                (TypeParam::Type(name), ConcreteArg::Type(ty)) => {
                    bindings.types.insert(name.clone(), ty.clone());
                }
                (TypeParam::Unit(name), ConcreteArg::Unit(unit)) => {
                    bindings.units.insert(name.clone(), unit.clone());
                }
                (param, arg) => {
                    return Err(TypeError::mismatch(param.to_string(), arg.to_string()));
                }
            }
        }

        let mut seen = HashSet::new();
        definition
            .tags
            .iter()
            .enumerate()
            .map(|(index, tag)| {
                if !seen.insert(tag.name.as_str()) {
                    return Err(TypeError::new(ErrorKind::DuplicateField {
                        name: tag.name.clone(),
                    }));
                }
                let payload = tag
                    .payload
                    .as_ref()
                    .map(|payload| payload.instantiate_concrete(&bindings, registry))
                    .transpose()?;
                Ok(ConcreteTag {
                    name: tag.name.clone(),
                    index,
                    payload,
                })
            })
            .collect()
    }
}

impl ConcreteType {
    pub fn scalar_number() -> Self {
        ConcreteType::Number(Unit::scalar())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, ConcreteType::Void)
    }

    /// Lifts back into the unification domain; `None` when the type contains
    /// `Void`, which has no counterpart there.
    pub fn to_type_expr(&self) -> Option<TypeExpr> {
        Some(match self {
            ConcreteType::Number(unit) => TypeExpr::Number(UnitExpr::from_unit(unit.clone())),
            ConcreteType::Text => TypeExpr::Text,
            ConcreteType::Boolean => TypeExpr::Boolean,
            ConcreteType::Date(kind) => TypeExpr::Date(*kind),
            ConcreteType::Tuple(items) => TypeExpr::Tuple(
                items.iter().map(ConcreteType::to_type_expr).collect::<Option<_>>()?,
            ),
            ConcreteType::Array(item) => TypeExpr::array(item.to_type_expr()?),
            ConcreteType::Function(params, result) => TypeExpr::function(
                params.iter().map(ConcreteType::to_type_expr).collect::<Option<_>>()?,
                result.to_type_expr()?,
            ),
            ConcreteType::Record(fields) => TypeExpr::Record(
                fields
                    .iter()
                    .map(|(name, ty)| ty.to_type_expr().map(|ty| (name.clone(), ty)))
                    .collect::<Option<_>>()?,
            ),
            ConcreteType::Tagged(tagged) => TypeExpr::Tagged(
                tagged.name.clone(),
                tagged
                    .args
                    .iter()
                    .map(|arg| match arg {
                        ConcreteArg::Type(ty) => ty.to_type_expr().map(TypeArg::Type),
                        ConcreteArg::Unit(unit) => Some(TypeArg::Unit(unit.clone().into())),
                    })
                    .collect::<Option<_>>()?,
            ),
            ConcreteType::Void => return None,
        })
    }
}

impl fmt::Display for ConcreteArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteArg::Type(ty) => write!(f, "({})", ty),
            ConcreteArg::Unit(unit) => write!(f, "{{{}}}", unit),
        }
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteType::Number(unit) if unit.is_scalar() => write!(f, "NUMBER"),
            ConcreteType::Number(unit) => write!(f, "NUMBER{{{}}}", unit),
            ConcreteType::Text => write!(f, "TEXT"),
            ConcreteType::Boolean => write!(f, "BOOLEAN"),
            ConcreteType::Date(kind) => write!(f, "{}", kind),
            ConcreteType::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            ConcreteType::Array(item) => write!(f, "[{}]", item),
            ConcreteType::Function(params, result) => {
                write!(f, "((")?;
                write_list(f, params)?;
                write!(f, ") -> {})", result)
            }
            ConcreteType::Record(fields) => {
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
            ConcreteType::Tagged(tagged) => {
                write!(f, "TAGGED ")?;
                write_quoted(f, &tagged.name)?;
                for arg in &tagged.args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            ConcreteType::Void => write!(f, "VOID"),
        }
    }
}

impl Serialize for ConcreteType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
