//! Class-file weaving engine: pointcut catalog, type-hierarchy resolution,
//! and bytecode rewriting.
//!
//! The crate is a pipeline. A [`Catalog`] describes what to intercept and
//! which static hooks to call; a [`TypeHierarchy`] resolves ancestry through
//! the host's [`ClassSource`]; the [`Weaver`] runs the class and method
//! passes over raw class bytes and hands back rewritten bytes, failing open
//! on any internal error. Hosts with several isolated class universes manage
//! them through a [`WeaverRegistry`].
//!
//! Woven code links against one support class, `jweave/runtime/FlowGuard`
//! (see [`runtime`]); providing it is the host's job.

pub mod catalog;
mod class_pass;
pub mod error;
pub mod hierarchy;
mod matcher;
mod method_pass;
pub mod runtime;
pub mod stats;
mod weaver;

pub use catalog::schema::load_catalog;
pub use catalog::{
    Advice, AdviceDef, ArgPattern, ArgPatterns, Binding, Catalog, CatalogBuild, CatalogBuilder,
    Diagnostic, HookRef, HookSlot, Mixin, Pattern,
};
pub use error::{Result, WeaveError};
pub use hierarchy::{ClassSource, ParsedType, TypeHierarchy};
pub use stats::{StatsSnapshot, WeaveStats};
pub use weaver::{ScopeId, Weaver, WeaverRegistry};
