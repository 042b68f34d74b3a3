//! Diagnostics produced by the inference engine
//!
//! Every user-facing failure is a [`TypeError`] value carrying an [`ErrorKind`],
//! the correlation keys of the syntax it implicates and optional hints. Engine
//! invariant violations use [`ErrorKind::Internal`].

use crate::core::types::CorrelationKey;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    Mismatch {
        expected: String,
        found: String,
        /// Outermost pair being unified when the inner mismatch was found.
        context: Option<(String, String)>,
    },
    UnitMismatch { expected: String, found: String, convertible: bool },
    CyclicType { var: String, ty: String },
    MissingCapability { ty: String, missing: Vec<String>, origins: Vec<String> },
    UnknownType { name: String },
    UnknownUnit { name: String },
    DuplicateField { name: String },
    ArityMismatch { name: String, expected: usize, found: usize },
    AmbiguousType { var: String, requirements: Vec<String> },
    UnresolvedVariable { name: String },
    NoSuchTag { ty: String, tag: String },
    NoSuchField { ty: String, field: String },
    NotAFunction { ty: String },
    Internal { detail: String },
}

impl ErrorKind {
    pub fn is_internal(&self) -> bool {
        matches!(self, ErrorKind::Internal { .. })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch { expected, found, context } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)?;
                if let Some((outer_a, outer_b)) = context {
                    if outer_a != expected || outer_b != found {
                        write!(f, " (while unifying {} with {})", outer_a, outer_b)?;
                    }
                }
                Ok(())
            }
            Self::UnitMismatch { expected, found, convertible } => {
                if *convertible {
                    write!(
                        f,
                        "Unit mismatch: {} and {} are convertible but not identical",
                        expected, found
                    )
                } else {
                    write!(f, "Unit mismatch: expected {}, found {}", expected, found)
                }
            }
            Self::CyclicType { var, ty } => {
                write!(f, "Cyclic type: {} occurs in {}", var, ty)
            }
            Self::MissingCapability { ty, missing, origins } => {
                write!(f, "Type {} does not support {}", ty, missing.join(" or "))?;
                if !origins.is_empty() {
                    write!(f, " ({})", origins.join(", "))?;
                }
                Ok(())
            }
            Self::UnknownType { name } => write!(f, "Unknown type: {}", name),
            Self::UnknownUnit { name } => write!(f, "Unknown unit: {}", name),
            Self::DuplicateField { name } => write!(f, "Duplicate field: {}", name),
            Self::ArityMismatch { name, expected, found } => write!(
                f,
                "Wrong number of type arguments for {}: expected {}, found {}",
                name, expected, found
            ),
            Self::AmbiguousType { var, requirements } => {
                write!(f, "Ambiguous type: {} could not be determined", var)?;
                if !requirements.is_empty() {
                    write!(f, " (must support {})", requirements.join(" and "))?;
                }
                Ok(())
            }
            Self::UnresolvedVariable { name } => {
                write!(f, "Unresolved type variable: {}", name)
            }
            Self::NoSuchTag { ty, tag } => write!(f, "Type {} has no tag '{}'", ty, tag),
            Self::NoSuchField { ty, field } => {
                write!(f, "Type {} has no field '{}'", ty, field)
            }
            Self::NotAFunction { ty } => write!(f, "Type {} is not a function", ty),
            Self::Internal { detail } => write!(f, "internal error: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeError {
    #[serde(flatten)]
    pub kind: ErrorKind,
    pub message: String,
    pub keys: Vec<CorrelationKey>,
    pub suggestions: Vec<String>,
}

impl TypeError {
    pub fn new(kind: ErrorKind) -> Self {
        let message = kind.to_string();
        Self {
            kind,
            message,
            keys: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: CorrelationKey) -> Self {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
        self
    }

    pub fn with_keys(mut self, keys: &[CorrelationKey]) -> Self {
        for key in keys {
            self = self.with_key(*key);
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Records the outermost operands of a failed unification, keeping the
    /// innermost pair as the primary report.
    pub fn with_context(mut self, outer_a: String, outer_b: String) -> Self {
        if let ErrorKind::Mismatch { context, .. } = &mut self.kind {
            *context = Some((outer_a, outer_b));
            self.message = self.kind.to_string();
        }
        self
    }

    pub fn mismatch(expected: String, found: String) -> Self {
        Self::new(ErrorKind::Mismatch {
            expected,
            found,
            context: None,
        })
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal {
            detail: detail.into(),
        })
    }

    pub fn unknown_type(name: &str, candidates: &[String]) -> Self {
        let error = Self::new(ErrorKind::UnknownType {
            name: name.to_string(),
        });
        error.with_suggestions(did_you_mean(name, candidates))
    }

    pub fn unknown_unit(name: &str, candidates: &[String]) -> Self {
        let error = Self::new(ErrorKind::UnknownUnit {
            name: name.to_string(),
        });
        error.with_suggestions(did_you_mean(name, candidates))
    }

    pub fn no_such_tag(ty: &str, tag: &str, candidates: &[String]) -> Self {
        let error = Self::new(ErrorKind::NoSuchTag {
            ty: ty.to_string(),
            tag: tag.to_string(),
        });
        error.with_suggestions(did_you_mean(tag, candidates))
    }

    pub fn no_such_field(ty: String, field: &str, candidates: &[String]) -> Self {
        let error = Self::new(ErrorKind::NoSuchField {
            ty,
            field: field.to_string(),
        });
        error.with_suggestions(did_you_mean(field, candidates))
    }

    pub fn is_internal(&self) -> bool {
        self.kind.is_internal()
    }

    /// Logs an internal error and, when `fatal` is set, aborts. Internal
    /// errors must never be mistaken for a successful check.
    pub fn escalate(self, fatal: bool) -> Self {
        if self.is_internal() {
            tracing::error!(error = %self.kind, "engine invariant violated");
            if fatal {
                panic!("{}", self.kind);
            }
        }
        self
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  hint: {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for TypeError {}

/// Errors reported by one check, kept up to `limit`; later ones are only
/// counted.
#[derive(Debug, Default)]
pub struct Diagnostics {
    kept: Vec<TypeError>,
    limit: usize,
    dropped: usize,
}

impl Diagnostics {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            kept: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    /// Returns `false` once the limit is reached and the error was dropped.
    pub fn push(&mut self, error: TypeError) -> bool {
        if self.kept.len() < self.limit {
            self.kept.push(error);
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn as_slice(&self) -> &[TypeError] {
        &self.kept
    }

    pub fn into_vec(self) -> Vec<TypeError> {
        self.kept
    }
}

fn did_you_mean(target: &str, candidates: &[String]) -> Vec<String> {
    find_similar_names(target, candidates, 2)
        .iter()
        .take(3)
        .map(|s| format!("Did you mean '{}'?", s))
        .collect()
}

/// Compute Levenshtein distance for "did you mean" suggestions
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, ca) in a_chars.iter().enumerate() {
        let mut current = vec![i + 1; b_chars.len() + 1];
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        previous = current;
    }

    previous[b_chars.len()]
}

/// Find similar names for "did you mean" suggestions
pub fn find_similar_names(target: &str, candidates: &[String], max_distance: usize) -> Vec<String> {
    let mut results: Vec<(String, usize)> = candidates
        .iter()
        .map(|c| (c.clone(), levenshtein_distance(target, c)))
        .filter(|(_, dist)| *dist <= max_distance && *dist > 0)
        .collect();

    results.sort_by(|(a, da), (b, db)| da.cmp(db).then_with(|| a.cmp(b)));
    results.into_iter().map(|(name, _)| name).collect()
}
