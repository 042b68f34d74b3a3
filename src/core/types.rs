use crate::core::capabilities;
use crate::core::units::UnitExpr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Opaque identity token linking a type back to the syntax that produced it.
/// The engine only copies keys into diagnostics; it never inspects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationKey(u64);

impl CorrelationKey {
    pub fn fresh() -> Self {
        CorrelationKey(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVarId(pub(crate) u32);

impl TypeVarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateKind {
    YearMonthDay,
    YearMonth,
    TimeOfDay,
    DateTime,
    DateTimeZoned,
}

impl DateKind {
    pub const ALL: [DateKind; 5] = [
        DateKind::YearMonthDay,
        DateKind::YearMonth,
        DateKind::TimeOfDay,
        DateKind::DateTime,
        DateKind::DateTimeZoned,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            DateKind::YearMonthDay => "YEARMONTHDAY",
            DateKind::YearMonth => "YEARMONTH",
            DateKind::TimeOfDay => "TIMEOFDAY",
            DateKind::DateTime => "DATETIME",
            DateKind::DateTimeZoned => "DATETIMEZONED",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<DateKind> {
        Self::ALL.into_iter().find(|kind| kind.keyword() == keyword)
    }
}

impl fmt::Display for DateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Operand of a tagged type: either a value type or a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeArg {
    Type(TypeExpr),
    Unit(UnitExpr),
}

/// A type in the unification domain. Variables live in a
/// [`Universe`](crate::core::universe::Universe); everything else is a
/// constructed type with a fixed set of declared capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Var(TypeVarId),
    Number(UnitExpr),
    Text,
    Boolean,
    Date(DateKind),
    Tuple(Vec<TypeExpr>),
    Array(Box<TypeExpr>),
    Function(Vec<TypeExpr>, Box<TypeExpr>),
    Tagged(String, Vec<TypeArg>),
    Record(BTreeMap<String, TypeExpr>),
}

impl TypeExpr {
    pub fn number(unit: impl Into<UnitExpr>) -> TypeExpr {
        TypeExpr::Number(unit.into())
    }

    pub fn scalar_number() -> TypeExpr {
        TypeExpr::Number(UnitExpr::scalar())
    }

    pub fn array(item: TypeExpr) -> TypeExpr {
        TypeExpr::Array(Box::new(item))
    }

    pub fn function(params: Vec<TypeExpr>, result: TypeExpr) -> TypeExpr {
        TypeExpr::Function(params, Box::new(result))
    }

    pub fn record<I, S>(fields: I) -> TypeExpr
    where
        I: IntoIterator<Item = (S, TypeExpr)>,
        S: Into<String>,
    {
        TypeExpr::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_var(&self) -> bool {
        matches!(self, TypeExpr::Var(_))
    }

    pub fn as_var(&self) -> Option<TypeVarId> {
        match self {
            TypeExpr::Var(id) => Some(*id),
            _ => None,
        }
    }

    /// Capabilities this constructor offers. Variables offer none of their
    /// own; their requirements are tracked by the universe instead.
    pub fn declared_capabilities(&self) -> &'static [&'static str] {
        match self {
            TypeExpr::Var(_) | TypeExpr::Function(..) => &[],
            TypeExpr::Number(_)
            | TypeExpr::Text
            | TypeExpr::Boolean
            | TypeExpr::Date(_)
            | TypeExpr::Tuple(_)
            | TypeExpr::Array(_)
            | TypeExpr::Tagged(..)
            | TypeExpr::Record(_) => capabilities::ALL,
        }
    }

    /// Whether the declared capabilities hold only if every type child
    /// offers them too.
    pub fn capabilities_depend_on_children(&self) -> bool {
        matches!(
            self,
            TypeExpr::Tuple(_) | TypeExpr::Array(_) | TypeExpr::Tagged(..) | TypeExpr::Record(_)
        )
    }

    /// Direct value-type children in declaration order.
    pub fn type_children(&self) -> Vec<&TypeExpr> {
        match self {
            TypeExpr::Var(_)
            | TypeExpr::Number(_)
            | TypeExpr::Text
            | TypeExpr::Boolean
            | TypeExpr::Date(_) => Vec::new(),
            TypeExpr::Tuple(items) => items.iter().collect(),
            TypeExpr::Array(item) => vec![item.as_ref()],
            TypeExpr::Function(params, result) => {
                params.iter().chain(std::iter::once(result.as_ref())).collect()
            }
            TypeExpr::Tagged(_, args) => args
                .iter()
                .filter_map(|arg| match arg {
                    TypeArg::Type(ty) => Some(ty),
                    TypeArg::Unit(_) => None,
                })
                .collect(),
            TypeExpr::Record(fields) => fields.values().collect(),
        }
    }
}

/// Writes `items` separated by `, `.
pub(crate) fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Writes a record field name, quoting it unless it is a plain identifier.
pub(crate) fn write_field_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let plain = name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !is_keyword(name);
    if plain {
        write!(f, "{}", name)
    } else {
        write_quoted(f, name)
    }
}

pub(crate) fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in text.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

pub(crate) fn is_keyword(word: &str) -> bool {
    matches!(word, "NUMBER" | "TEXT" | "BOOLEAN" | "RECORD" | "TAGGED" | "VOID")
        || DateKind::from_keyword(word).is_some()
}

impl fmt::Display for TypeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeArg::Type(ty) => write!(f, "({})", ty),
            TypeArg::Unit(unit) => write!(f, "{{{}}}", unit),
        }
    }
}

/// Raw rendering; variables print as `_t3`/`_u7` without being resolved.
/// Use [`Universe::render`](crate::core::universe::Universe::render) for
/// diagnostics.
impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Var(id) => write!(f, "{}", id),
            TypeExpr::Number(unit) => {
                if unit.is_scalar() {
                    write!(f, "NUMBER")
                } else {
                    write!(f, "NUMBER{{{}}}", unit)
                }
            }
            TypeExpr::Text => write!(f, "TEXT"),
            TypeExpr::Boolean => write!(f, "BOOLEAN"),
            TypeExpr::Date(kind) => write!(f, "{}", kind),
            TypeExpr::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            TypeExpr::Array(item) => write!(f, "[{}]", item),
            TypeExpr::Function(params, result) => {
                write!(f, "((")?;
                write_list(f, params)?;
                write!(f, ") -> {})", result)
            }
            TypeExpr::Tagged(name, args) => {
                write!(f, "TAGGED ")?;
                write_quoted(f, name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            TypeExpr::Record(fields) => {
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
        }
    }
}
