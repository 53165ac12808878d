//! jweave: class-file weaving for runtime-attached instrumentation.
//!
//! Three crates under one roof:
//!
//! - [`classfile`]: parse, decode, and re-emit JVM class files, preserving
//!   everything the rewriter does not touch byte-for-byte
//! - [`engine`]: advice catalogs, type/method matching, and the weaving
//!   passes behind the fail-open [`Weaver`] boundary
//! - [`sandbox`]: a small interpreter that links woven classes and runs
//!   them against native hook implementations
//!
//! The `jweave` binary fronts all of it: batch weaving for build steps,
//! class inspection, catalog validation, and sandbox runs.

pub use jweave_classfile as classfile;
pub use jweave_core as engine;
pub use jweave_sandbox as sandbox;

pub use jweave_core::{load_catalog, Catalog, CatalogBuild, StatsSnapshot, Weaver, WeaverRegistry};
pub use jweave_sandbox::Sandbox;
