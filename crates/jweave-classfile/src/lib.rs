//! JVM class-file parsing, bytecode decoding, and emission.
//!
//! This crate owns the wire format and nothing else: no matching, no
//! rewriting policy. It offers three levels of access, cheapest first:
//!
//! - [`ClassSummary`]: names, flags, supertypes, and method shapes, with
//!   every attribute payload skipped. Used to walk type hierarchies.
//! - [`ClassFile`]: the full structure with attributes preserved raw.
//!   Method bodies stay as raw `Code` payloads until explicitly decoded.
//! - [`CodeBody`]: a linear instruction list with branch targets resolved
//!   to labels, safe to splice without offset bookkeeping. Encoding fixes
//!   offsets back up, re-padding switches and widening `goto` as needed.
//!
//! The emit-side constant pool is seeded from the parse-side pool and only
//! ever appends, so raw payloads keep their embedded indices.

pub mod builder;
pub mod class;
pub mod code;
pub mod descriptor;
pub mod error;
pub mod flags;
pub mod opcodes;
pub mod pool;
mod reader;
pub mod summary;

pub use builder::ClassBuilder;
pub use class::{ClassFile, FieldInfo, MethodBody, MethodInfo, RawAttribute};
pub use code::{iconst, CodeBody, ExceptionHandler, Insn, Label, LdcValue};
pub use descriptor::{FieldType, MethodDescriptor};
pub use error::{ClassFileError, Result};
pub use pool::{Constant, ConstantPool, PoolBuilder};
pub use summary::{ClassSummary, MethodShape};
