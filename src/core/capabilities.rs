//! Capability ("type class") requirements carried by type variables
//!
//! A [`CapabilitySet`] is immutable: every operation returns a new set. Each
//! required capability remembers where the requirement came from so that a
//! failed check can say which operator or function asked for it.

use crate::errors::{ErrorKind, TypeError};
use std::collections::BTreeMap;
use std::fmt;

pub const EQUATABLE: &str = "Equatable";
pub const COMPARABLE: &str = "Comparable";
pub const SHOWABLE: &str = "Showable";
pub const READABLE: &str = "Readable";

/// Every capability a value type can offer.
pub const ALL: &[&str] = &[COMPARABLE, EQUATABLE, READABLE, SHOWABLE];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    required: BTreeMap<String, Vec<String>>,
}

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn require(name: impl Into<String>, origin: impl Into<String>) -> Self {
        let mut required = BTreeMap::new();
        required.insert(name.into(), vec![origin.into()]);
        Self { required }
    }

    /// Merges by capability name, concatenating provenance for names present
    /// in both sets.
    pub fn union(&self, other: &Self) -> Self {
        let mut required = self.required.clone();
        for (name, origins) in &other.required {
            required
                .entry(name.clone())
                .or_default()
                .extend(origins.iter().cloned());
        }
        Self { required }
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    pub fn len(&self) -> usize {
        self.required.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.required.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.required.keys().map(String::as_str)
    }

    pub fn origins_of(&self, name: &str) -> &[String] {
        self.required.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `None` when `provided` covers every required name.
    pub fn check_satisfied_by<'a, I>(&self, provided: I) -> Option<MissingCapabilities>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let provided: Vec<&str> = provided.into_iter().collect();
        let missing: Vec<String> = self
            .required
            .keys()
            .filter(|name| !provided.contains(&name.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            return None;
        }

        let origins = missing
            .iter()
            .flat_map(|name| {
                self.origins_of(name)
                    .iter()
                    .map(move |origin| format!("{} needed by {}", name, origin))
            })
            .collect();
        Some(MissingCapabilities { missing, origins })
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.names().collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Outcome of a failed [`CapabilitySet::check_satisfied_by`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCapabilities {
    pub missing: Vec<String>,
    pub origins: Vec<String>,
}

impl MissingCapabilities {
    pub fn into_error(self, ty: String) -> TypeError {
        TypeError::new(ErrorKind::MissingCapability {
            ty,
            missing: self.missing,
            origins: self.origins,
        })
    }
}
