use crate::props::{canonicalize, parse_list, Props};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};
use tidepool_base::{err_kind, ErrorKind, Result};
use tracing::debug;

const PATH: &str = "PATH";
const MEMORY: &str = "MEMORY";
const MEMBERS: &str = "MEMBERS";
const MODE: &str = "MODE";
const KEYS: &[&str] = &[PATH, MEMORY, MEMBERS, MODE];

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StoreLocation {
    // A redb file.
    Path(PathBuf),
    // A named in-memory store, live while anyone holds it.
    Memory(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    Embedded,
    Remote,
}

/// How to reach a row store. Two configs that canonicalize the same
/// name the same store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreConfig {
    pub location: StoreLocation,
    pub members: Vec<String>,
    pub mode: AccessMode,
}

impl StoreConfig {
    pub fn memory(name: impl Into<String>) -> Self {
        StoreConfig {
            location: StoreLocation::Memory(name.into()),
            members: vec!["local".to_string()],
            mode: AccessMode::Embedded,
        }
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            location: StoreLocation::Path(path.into()),
            ..StoreConfig::memory("")
        }
    }

    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_members(mut self, members: Vec<String>) -> Self {
        self.members = members;
        self
    }

    pub fn from_props<K, V>(props: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let props = canonicalize(props, KEYS)?;
        let location = match (props.get(PATH), props.get(MEMORY)) {
            (Some(p), None) if !p.is_empty() => StoreLocation::Path(PathBuf::from(p)),
            (None, Some(m)) => StoreLocation::Memory(m.clone()),
            _ => {
                return Err(err_kind(
                    ErrorKind::Config,
                    format!("exactly one of {} or {} must be set", PATH, MEMORY),
                ))
            }
        };
        let mode = match props.get(MODE).map(|m| m.to_ascii_lowercase()) {
            None => AccessMode::Embedded,
            Some(m) if m == "embedded" => AccessMode::Embedded,
            Some(m) if m == "remote" => AccessMode::Remote,
            Some(m) => {
                return Err(err_kind(
                    ErrorKind::Config,
                    format!("{} must be embedded or remote, got '{}'", MODE, m),
                ))
            }
        };
        let mut members = parse_list(&props, MEMBERS)?;
        if members.is_empty() {
            members.push("local".to_string());
        }
        let cfg = StoreConfig {
            location,
            members,
            mode,
        };
        debug!(target: "tidepool", config = %cfg, "parsed store config");
        Ok(cfg)
    }

    pub fn to_props(&self) -> Props {
        let mut p = Props::new();
        match &self.location {
            StoreLocation::Path(path) => p.insert(PATH.to_string(), path.display().to_string()),
            StoreLocation::Memory(name) => p.insert(MEMORY.to_string(), name.clone()),
        };
        p.insert(MEMBERS.to_string(), self.members.join(","));
        let mode = match self.mode {
            AccessMode::Embedded => "embedded",
            AccessMode::Remote => "remote",
        };
        p.insert(MODE.to_string(), mode.to_string());
        p
    }
}

// `KEY=value;...` over the canonical props, in key order.
impl fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.to_props().iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}
