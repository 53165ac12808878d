//! Lazy type-graph resolution, memoized per class-loading scope.
//!
//! Only headers and method shapes are parsed (via `ClassSummary`), never
//! bodies. Multiple threads may resolve concurrently; a race on the same
//! type parses twice and either write wins, which is equivalent. There is
//! no lock around the whole resolve path.

use std::sync::Arc;

use dashmap::DashMap;
use jweave_classfile::ClassSummary;
use tracing::{debug, warn};

use crate::error::{Result, WeaveError};

/// Where a scope's class bytes come from. Implemented by the host's
/// class-loading scope lookup (or the sandbox's class store in tests).
pub trait ClassSource: Send + Sync {
    /// Raw class-file bytes for an internal name, if locatable.
    fn class_bytes(&self, internal_name: &str) -> Option<Vec<u8>>;
}

impl<F> ClassSource for F
where
    F: Fn(&str) -> Option<Vec<u8>> + Send + Sync,
{
    fn class_bytes(&self, internal_name: &str) -> Option<Vec<u8>> {
        self(internal_name)
    }
}

/// A resolved type, or a placeholder for one whose bytes could not be
/// located. `Missing` terminates its branch of the ancestor walk; matchers
/// filter it out.
#[derive(Debug, Clone)]
pub enum ParsedType {
    Known(Arc<ClassSummary>),
    Missing(String),
}

impl ParsedType {
    pub fn name(&self) -> &str {
        match self {
            ParsedType::Known(summary) => &summary.name,
            ParsedType::Missing(name) => name,
        }
    }

    pub fn summary(&self) -> Option<&ClassSummary> {
        match self {
            ParsedType::Known(summary) => Some(summary),
            ParsedType::Missing(_) => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ParsedType::Missing(_))
    }
}

/// Per-scope resolver: parsed types and complete ancestor chains.
pub struct TypeHierarchy {
    source: Arc<dyn ClassSource>,
    types: DashMap<String, ParsedType>,
    chains: DashMap<String, Arc<[ParsedType]>>,
}

impl TypeHierarchy {
    pub fn new(source: Arc<dyn ClassSource>) -> Self {
        Self {
            source,
            types: DashMap::new(),
            chains: DashMap::new(),
        }
    }

    /// Record a unit's own shape before it is defined by the host, so other
    /// units loading concurrently can already see it.
    pub fn register(&self, summary: ClassSummary) -> Arc<ClassSummary> {
        let summary = Arc::new(summary);
        self.types.insert(
            summary.name.clone(),
            ParsedType::Known(Arc::clone(&summary)),
        );
        // A chain resolved before this type arrived would pin it as missing.
        self.chains.remove(&summary.name);
        summary
    }

    fn lookup(&self, name: &str) -> ParsedType {
        if let Some(existing) = self.types.get(name) {
            return existing.value().clone();
        }
        let parsed = match self.source.class_bytes(name) {
            Some(bytes) => match ClassSummary::parse(&bytes) {
                Ok(summary) => ParsedType::Known(Arc::new(summary)),
                Err(e) => {
                    warn!(class = name, error = %e, "ancestor failed to parse; treating as missing");
                    ParsedType::Missing(name.to_string())
                }
            },
            None => {
                debug!(class = name, "no bytes for type in this scope");
                ParsedType::Missing(name.to_string())
            }
        };
        self.types
            .entry(name.to_string())
            .or_insert(parsed)
            .value()
            .clone()
    }

    /// Full ancestor chain: self, then the super-type chain, then each
    /// declared interface's chain. Duplicates permitted. `Missing` entries
    /// stay in the chain. Circular inheritance is a typed error.
    pub fn resolve(&self, name: &str) -> Result<Arc<[ParsedType]>> {
        let mut visiting = Vec::new();
        self.resolve_inner(name, &mut visiting)
    }

    fn resolve_inner(&self, name: &str, visiting: &mut Vec<String>) -> Result<Arc<[ParsedType]>> {
        if let Some(chain) = self.chains.get(name) {
            return Ok(chain.value().clone());
        }
        if visiting.iter().any(|n| n == name) {
            return Err(WeaveError::CircularInheritance(name.to_string()));
        }
        visiting.push(name.to_string());

        let entry = self.lookup(name);
        let mut chain: Vec<ParsedType> = vec![entry.clone()];
        if let ParsedType::Known(summary) = &entry {
            if let Some(super_name) = &summary.super_name {
                chain.extend_from_slice(&self.resolve_inner(super_name, visiting)?);
            }
            for iface in &summary.interfaces {
                chain.extend_from_slice(&self.resolve_inner(iface, visiting)?);
            }
        }

        visiting.pop();
        let chain: Arc<[ParsedType]> = chain.into();
        self.chains.insert(name.to_string(), Arc::clone(&chain));
        Ok(chain)
    }
}
