//! Name mapping between source and target tenancy levels
//!
//! Orgs, applications and collections are renamed independently. Each
//! dimension is built from repeated `source:target` pairs given on the
//! command line; anything without an entry maps to itself.

use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Which tenancy level a mapping applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    Org,
    App,
    Collection,
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingKind::Org => write!(f, "Org"),
            MappingKind::App => write!(f, "App"),
            MappingKind::Collection => write!(f, "Collection"),
        }
    }
}

/// Source name to target name lookup for one dimension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMap {
    entries: HashMap<String, String>,
}

impl NameMap {
    /// Build a map from `source:target` pairs
    ///
    /// Pairs that do not split into exactly two non-empty parts are logged
    /// and skipped. A later pair for the same source name wins.
    pub fn from_pairs<S: AsRef<str>>(kind: MappingKind, pairs: &[S]) -> Self {
        let mut entries = HashMap::with_capacity(pairs.len());

        for pair in pairs {
            let pair = pair.as_ref();
            match parse_pair(pair) {
                Some((from, to)) => {
                    debug!(kind = %kind, from = from, to = to, "Adding name mapping");
                    entries.insert(from.to_string(), to.to_string());
                }
                None => {
                    warn!(kind = %kind, mapping = pair, "Skipping malformed mapping");
                }
            }
        }

        Self { entries }
    }

    /// Resolve a source name to its target name, defaulting to identity
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.entries.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Number of explicit mappings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if every name maps to itself
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split `a:b` into its two halves
fn parse_pair(pair: &str) -> Option<(&str, &str)> {
    let mut parts = pair.split(':');
    let from = parts.next()?;
    let to = parts.next()?;

    if parts.next().is_some() || from.is_empty() || to.is_empty() {
        return None;
    }

    Some((from, to))
}

/// The three independent name maps used when writing to the target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    pub org: NameMap,
    pub app: NameMap,
    pub collection: NameMap,
}

impl MappingTable {
    /// Build all three maps from their pair lists
    pub fn from_pairs<S: AsRef<str>>(org: &[S], app: &[S], collection: &[S]) -> Self {
        Self {
            org: NameMap::from_pairs(MappingKind::Org, org),
            app: NameMap::from_pairs(MappingKind::App, app),
            collection: NameMap::from_pairs(MappingKind::Collection, collection),
        }
    }

    pub fn target_org<'a>(&'a self, org: &'a str) -> &'a str {
        self.org.resolve(org)
    }

    pub fn target_app<'a>(&'a self, app: &'a str) -> &'a str {
        self.app.resolve(app)
    }

    pub fn target_collection<'a>(&'a self, collection: &'a str) -> &'a str {
        self.collection.resolve(collection)
    }
}
