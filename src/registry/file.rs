//! TOML registry files
//!
//! ```toml
//! [[unit]]
//! name = "ft"
//! scale = "0.3048"
//! base = "m"
//!
//! [[type]]
//! name = "Either"
//! params = ["@TYPEVAR a", "@TYPEVAR b"]
//! tag = [
//!     { name = "Left", payload = "@TYPEVAR a" },
//!     { name = "Right", payload = "@TYPEVAR b" },
//! ]
//! ```
//!
//! Entries may appear in any order; they are declared once everything they
//! reference is declared.

use crate::jelly::{parse_unit, JellyType};
use crate::registry::{
    parse_type_param, Registry, RegistryError, TagDefinition, TaggedTypeDefinition, TypeContext,
};
use crate::units::algebra::parse_scale;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryFile {
    #[serde(default, rename = "unit")]
    pub units: Vec<UnitEntry>,

    #[serde(default, rename = "type")]
    pub types: Vec<TypeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitEntry {
    pub name: String,

    /// Absent for base units.
    #[serde(default)]
    pub scale: Option<String>,

    #[serde(default)]
    pub base: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeEntry {
    pub name: String,

    #[serde(default)]
    pub params: Vec<String>,

    #[serde(default, rename = "tag")]
    pub tags: Vec<TagEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub name: String,

    #[serde(default)]
    pub payload: Option<JellyType>,
}

impl RegistryFile {
    pub fn parse(content: &str) -> Result<Self, RegistryError> {
        toml::from_str(content).map_err(|e| RegistryError::Parse {
            what: "registry file".to_string(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = fs::read_to_string(path)
            .map_err(|e| RegistryError::Io(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Declares every entry into `context`.
    pub fn declare_into(&self, context: &TypeContext) -> Result<(), RegistryError> {
        let mut pending_units: Vec<&UnitEntry> = self.units.iter().collect();
        while !pending_units.is_empty() {
            let declared = context.snapshot();
            let (ready, blocked): (Vec<&UnitEntry>, Vec<&UnitEntry>) =
                pending_units.into_iter().partition(|entry| {
                    unit_dependencies(entry)
                        .iter()
                        .all(|dep| declared.lookup_declared_unit(dep).is_some())
                });
            if ready.is_empty() {
                return Err(RegistryError::Unresolved(
                    blocked.iter().map(|entry| entry.name.clone()).collect(),
                ));
            }
            for entry in ready {
                declare_unit(context, entry)?;
            }
            pending_units = blocked;
        }

        let mut definitions = self
            .types
            .iter()
            .map(type_definition)
            .collect::<Result<Vec<_>, _>>()?;
        while !definitions.is_empty() {
            let declared = context.snapshot();
            let (ready, blocked): (Vec<_>, Vec<_>) =
                definitions.into_iter().partition(|definition| {
                    referenced_types(definition).iter().all(|name| {
                        name == &definition.name
                            || declared.lookup_tagged_type(name).is_some()
                    })
                });
            if ready.is_empty() {
                return Err(RegistryError::Unresolved(
                    blocked.iter().map(|definition| definition.name.clone()).collect(),
                ));
            }
            for definition in ready {
                debug!(ty = %definition.name, tags = definition.tags.len(), "declaring tagged type");
                context.declare_tagged(definition)?;
            }
            definitions = blocked;
        }

        info!(
            units = self.units.len(),
            types = self.types.len(),
            "registry file declared"
        );
        Ok(())
    }
}

/// Loads a registry file into a context that already holds the builtins.
pub fn load(path: &Path) -> Result<TypeContext, RegistryError> {
    let context = TypeContext::with_builtins();
    RegistryFile::load(path)?.declare_into(&context)?;
    Ok(context)
}

fn unit_dependencies(entry: &UnitEntry) -> Vec<String> {
    entry
        .base
        .as_deref()
        .and_then(|base| parse_unit(base).ok())
        .map(|unit| unit.units.keys().cloned().collect())
        .unwrap_or_default()
}

fn declare_unit(context: &TypeContext, entry: &UnitEntry) -> Result<(), RegistryError> {
    let base = match &entry.base {
        None => {
            if entry.scale.is_some() {
                return Err(RegistryError::Parse {
                    what: format!("unit '{}'", entry.name),
                    message: "a scale needs a base unit".to_string(),
                });
            }
            debug!(unit = %entry.name, "declaring base unit");
            return context.declare_base_unit(&entry.name);
        }
        Some(base) => base,
    };

    let parse_error = |message: String| RegistryError::Parse {
        what: format!("base of unit '{}'", entry.name),
        message,
    };
    let base = parse_unit(base)
        .map_err(|e| parse_error(e.to_string()))?
        .to_unit()
        .ok_or_else(|| parse_error("unit variables are not allowed here".to_string()))?;

    let scale_text = entry.scale.as_deref().unwrap_or("1");
    let scale = parse_scale(scale_text).ok_or_else(|| RegistryError::InvalidScale {
        unit: entry.name.clone(),
        scale: scale_text.to_string(),
    })?;

    debug!(unit = %entry.name, %scale, %base, "declaring derived unit");
    context.declare_unit(&entry.name, scale, base)
}

fn type_definition(entry: &TypeEntry) -> Result<TaggedTypeDefinition, RegistryError> {
    let params = entry
        .params
        .iter()
        .map(|param| parse_type_param(param))
        .collect::<Result<Vec<_>, _>>()?;
    let tags = entry
        .tags
        .iter()
        .map(|tag| TagDefinition {
            name: tag.name.clone(),
            payload: tag.payload.clone(),
        })
        .collect();
    Ok(TaggedTypeDefinition {
        name: entry.name.clone(),
        params,
        tags,
    })
}

fn referenced_types(definition: &TaggedTypeDefinition) -> HashSet<String> {
    definition
        .tags
        .iter()
        .filter_map(|tag| tag.payload.as_ref())
        .flat_map(|payload| payload.references().tagged_types)
        .collect()
}
