//! VO Registry
//!
//! Loads the VO metadata file (`VOs.json`), exposes its entities in file
//! order, and writes updated cumulative counters back on request.
//!
//! File layout:
//!
//! ```json
//! [ { "vos": [ { "vo": [ { "Name": "...", "Type": "htc", "Active": "Y",
//!                          "SLA_start": "2023/01", "SLA_end": "2025/12",
//!                          "CPU/h": 0 } ] } ] } ]
//! ```

pub mod entity;

pub use entity::{Entity, RegistryDate, SkipReason};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VoList {
    vo: Vec<Entity>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VoGroup {
    vos: Vec<VoList>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Registry load/save failures. All of them are fatal at startup.
#[derive(Debug)]
pub enum RegistryError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Duplicate {
        name: String,
        type_tag: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "registry file {:?}: {}", path, source),
            Self::Parse(e) => write!(f, "malformed registry: {}", e),
            Self::Duplicate { name, type_tag } => {
                write!(f, "VO '{}' listed twice with type '{}'", name, type_tag)
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(e) => Some(e),
            Self::Duplicate { .. } => None,
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    groups: Vec<VoGroup>,
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json(&text)?;
        info!(path = ?path, entities = registry.len(), "VO registry loaded");
        Ok(registry)
    }

    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        let registry = Self {
            groups: serde_json::from_str(text)?,
        };
        registry.check_unique()?;
        Ok(registry)
    }

    pub fn to_json(&self) -> Result<String, RegistryError> {
        Ok(serde_json::to_string_pretty(&self.groups)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let mut text = self.to_json()?;
        text.push('\n');
        std::fs::write(path, text).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = ?path, "VO registry written");
        Ok(())
    }

    /// Entities in file order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.groups
            .iter()
            .flat_map(|g| g.vos.iter())
            .flat_map(|list| list.vo.iter())
    }

    fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.groups
            .iter_mut()
            .flat_map(|g| g.vos.iter_mut())
            .flat_map(|list| list.vo.iter_mut())
    }

    pub fn entity_mut(&mut self, name: &str, type_tag: &str) -> Option<&mut Entity> {
        self.entities_mut()
            .find(|e| e.name == name && e.type_tag == type_tag)
    }

    pub fn len(&self) -> usize {
        self.entities().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entities().next().is_none()
    }

    fn check_unique(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for e in self.entities() {
            if !seen.insert((e.name.as_str(), e.type_tag.as_str())) {
                return Err(RegistryError::Duplicate {
                    name: e.name.clone(),
                    type_tag: e.type_tag.clone(),
                });
            }
        }
        Ok(())
    }
}
