//! Fail-open rewrite boundary and the per-scope weaver registry.
//!
//! `Weaver::rewrite` is the call a host makes for every class definition.
//! It must never take the host down: parse errors, weave errors, and even
//! panics inside the pipeline all degrade to "use the original bytes" with
//! a logged event. A scope is one isolated class universe (one sandbox, one
//! loader); each gets its own resolver and outcome cache but shares the
//! catalog and the counters.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::class_pass;
use crate::error::WeaveError;
use crate::hierarchy::{ClassSource, TypeHierarchy};
use crate::stats::WeaveStats;

/// Identifies one weaving scope inside a [`WeaverRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u64);

pub struct Weaver {
    catalog: Arc<Catalog>,
    hierarchy: TypeHierarchy,
    stats: WeaveStats,
    // Definitions repeated under one name reuse their first outcome, so a
    // class already carrying hooks is never woven a second time.
    outcomes: DashMap<String, Option<Vec<u8>>>,
}

impl Weaver {
    pub fn new(catalog: Arc<Catalog>, source: Arc<dyn ClassSource>) -> Weaver {
        Weaver::with_stats(catalog, source, WeaveStats::default())
    }

    pub fn with_stats(
        catalog: Arc<Catalog>,
        source: Arc<dyn ClassSource>,
        stats: WeaveStats,
    ) -> Weaver {
        Weaver {
            catalog,
            hierarchy: TypeHierarchy::new(source),
            stats,
            outcomes: DashMap::new(),
        }
    }

    pub fn stats(&self) -> &WeaveStats {
        &self.stats
    }

    /// Rewrites one class definition. `None` means the host should keep the
    /// bytes it already has. This never returns an error and never unwinds.
    pub fn rewrite(&self, declared_name: Option<&str>, bytes: &[u8]) -> Option<Vec<u8>> {
        self.stats.record_class_seen();

        if let Some(name) = declared_name {
            if let Some(cached) = self.outcomes.get(name) {
                debug!(class = name, "repeated definition; reusing previous outcome");
                return match cached.value() {
                    Some(woven) => {
                        self.stats.record_class_woven();
                        Some(woven.clone())
                    }
                    None => {
                        self.stats.record_class_unchanged();
                        None
                    }
                };
            }
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            class_pass::rewrite_class(&self.catalog, &self.hierarchy, &self.stats, bytes)
        }));
        let (outcome, settled) = match result {
            Ok(Ok(outcome)) => (outcome, true),
            Ok(Err(error)) => {
                if matches!(error, WeaveError::ClassFile(_)) {
                    self.stats.record_parse_failure();
                }
                warn!(
                    class = declared_name.unwrap_or("<unnamed>"),
                    %error,
                    "weaving failed; class left unchanged"
                );
                (None, false)
            }
            Err(_) => {
                warn!(
                    class = declared_name.unwrap_or("<unnamed>"),
                    "weaving panicked; class left unchanged"
                );
                (None, false)
            }
        };

        match &outcome {
            Some(_) => self.stats.record_class_woven(),
            None => self.stats.record_class_unchanged(),
        }
        // Failed attempts stay uncached so a corrected redefinition gets a
        // fresh pass.
        if settled {
            if let Some(name) = declared_name {
                self.outcomes.insert(name.to_string(), outcome.clone());
            }
        }
        outcome
    }

    /// Fallible variant of [`Weaver::rewrite`] for build-step tools that
    /// report failures instead of falling open. Skips the per-name outcome
    /// cache; panics inside the pipeline surface as [`WeaveError::Internal`].
    pub fn try_rewrite(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>, WeaveError> {
        self.stats.record_class_seen();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            class_pass::rewrite_class(&self.catalog, &self.hierarchy, &self.stats, bytes)
        }));
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => Err(WeaveError::Internal("weaving panicked".to_string())),
        };
        if let Err(error) = &outcome {
            if matches!(error, WeaveError::ClassFile(_)) {
                self.stats.record_parse_failure();
            }
        }
        match &outcome {
            Ok(Some(_)) => self.stats.record_class_woven(),
            _ => self.stats.record_class_unchanged(),
        }
        outcome
    }
}

/// Host-facing collection of live scopes. Scopes are retired explicitly;
/// there is no level of indirection that would let a forgotten scope keep
/// its class universe alive.
pub struct WeaverRegistry {
    catalog: Arc<Catalog>,
    stats: WeaveStats,
    next_scope: AtomicU64,
    scopes: RwLock<HashMap<ScopeId, Arc<Weaver>>>,
}

impl WeaverRegistry {
    pub fn new(catalog: Catalog) -> WeaverRegistry {
        WeaverRegistry {
            catalog: Arc::new(catalog),
            stats: WeaveStats::default(),
            next_scope: AtomicU64::new(1),
            scopes: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a scope around the host's class lookup function.
    pub fn scope(&self, source: Arc<dyn ClassSource>) -> ScopeId {
        let id = ScopeId(self.next_scope.fetch_add(1, Ordering::Relaxed));
        let weaver = Arc::new(Weaver::with_stats(
            self.catalog.clone(),
            source,
            self.stats.clone(),
        ));
        self.scopes.write().insert(id, weaver);
        id
    }

    pub fn weaver(&self, scope: ScopeId) -> Option<Arc<Weaver>> {
        self.scopes.read().get(&scope).cloned()
    }

    /// Drops the scope's resolver and caches. Returns false when the scope
    /// was already gone.
    pub fn retire_scope(&self, scope: ScopeId) -> bool {
        self.scopes.write().remove(&scope).is_some()
    }

    /// Rewrite through a scope, returning usable bytes unconditionally. An
    /// unknown scope passes the input through.
    pub fn rewrite(&self, scope: ScopeId, declared_name: Option<&str>, bytes: &[u8]) -> Vec<u8> {
        let weaver = self.weaver(scope);
        match weaver {
            Some(weaver) => weaver
                .rewrite(declared_name, bytes)
                .unwrap_or_else(|| bytes.to_vec()),
            None => {
                warn!(scope = scope.0, "rewrite through retired scope; passing through");
                bytes.to_vec()
            }
        }
    }

    pub fn stats(&self) -> &WeaveStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AdviceDef, ArgPatterns, Binding, HookRef, HookSlot, Pattern};
    use jweave_classfile::{flags, opcodes as op, ClassBuilder, CodeBody, Insn};

    fn no_source() -> Arc<dyn ClassSource> {
        Arc::new(|_: &str| -> Option<Vec<u8>> { None })
    }

    fn work_class() -> Vec<u8> {
        let mut code = CodeBody::new(2, 2);
        code.instructions.push(Insn::Var {
            opcode: op::ILOAD,
            index: 1,
        });
        code.instructions.push(Insn::Op(op::IRETURN));
        ClassBuilder::new("demo/Foo")
            .default_ctor()
            .method(flags::ACC_PUBLIC, "work", "(I)I", code)
            .bytes()
            .unwrap()
    }

    fn foo_catalog() -> Catalog {
        Catalog::builder()
            .advice(AdviceDef {
                label: "probe".to_string(),
                type_pattern: Pattern::exact("demo.Foo"),
                method_pattern: Pattern::exact("work"),
                args: ArgPatterns::any(),
                capture_nested: true,
                timer_label: None,
                hooks: vec![(
                    HookSlot::OnBefore,
                    HookRef::new(
                        "h/H",
                        "before",
                        "(Ljava/lang/String;)V",
                        vec![Binding::MethodName],
                    ),
                )],
            })
            .build()
            .catalog
    }

    #[test]
    fn test_corrupt_bytes_fail_open() {
        let weaver = Weaver::new(Arc::new(foo_catalog()), no_source());
        assert!(weaver.rewrite(Some("demo/Broken"), &[0xDE, 0xAD, 0xBE, 0xEF]).is_none());
        let snapshot = weaver.stats().snapshot();
        assert_eq!(snapshot.parse_failures, 1);
        assert_eq!(snapshot.classes_unchanged, 1);
        assert_eq!(snapshot.classes_woven, 0);
    }

    #[test]
    fn test_repeated_definition_is_woven_once() {
        let weaver = Weaver::new(Arc::new(foo_catalog()), no_source());
        let bytes = work_class();
        let first = weaver.rewrite(Some("demo/Foo"), &bytes).expect("woven");
        let second = weaver.rewrite(Some("demo/Foo"), &bytes).expect("woven");
        assert_eq!(first, second);
        // the pipeline itself only ran once
        assert_eq!(weaver.stats().snapshot().methods_woven, 1);
        assert_eq!(weaver.stats().snapshot().classes_woven, 2);
    }

    #[test]
    fn test_unmatched_catalog_leaves_bytes_alone() {
        let weaver = Weaver::new(Arc::new(Catalog::builder().build().catalog), no_source());
        assert!(weaver.rewrite(Some("demo/Foo"), &work_class()).is_none());
    }

    #[test]
    fn test_try_rewrite_surfaces_the_failure() {
        let weaver = Weaver::new(Arc::new(foo_catalog()), no_source());
        let err = weaver.try_rewrite(&[0xDE, 0xAD]).expect_err("corrupt input");
        assert!(matches!(err, WeaveError::ClassFile(_)));
        assert_eq!(weaver.stats().snapshot().parse_failures, 1);

        let woven = weaver.try_rewrite(&work_class()).expect("weave");
        assert!(woven.is_some());
    }

    #[test]
    fn test_registry_scope_lifecycle() {
        let registry = WeaverRegistry::new(foo_catalog());
        let scope = registry.scope(no_source());
        let bytes = work_class();

        let woven = registry.rewrite(scope, Some("demo/Foo"), &bytes);
        assert_ne!(woven, bytes);

        assert!(registry.retire_scope(scope));
        assert!(!registry.retire_scope(scope));

        // retired scope degrades to pass-through
        let after = registry.rewrite(scope, Some("demo/Foo"), &bytes);
        assert_eq!(after, bytes);
    }
}
