//! A deliberately small class-file interpreter for exercising woven
//! bytecode without a JVM.
//!
//! The [`Sandbox`] registers class bytes, routes each one through a
//! [`jweave_core::Weaver`] on first use, and executes method bodies over the
//! `jweave-classfile` instruction model. Methods the sandbox does not load
//! (wrapper types, throwable constructors, the `jweave/runtime/FlowGuard`
//! contract, and test hooks) resolve through a [`NativeRegistry`] of Rust
//! closures. A [`HookLog`] threaded through probe natives records firing
//! order for assertions.
//!
//! Single-threaded by construction; values are `Rc`-shared so a rethrown
//! throwable is observably the same object the test threw.

mod error;
mod hooklog;
mod interp;
mod loader;
mod natives;
mod value;

pub use error::{Result, VmError};
pub use hooklog::HookLog;
pub use loader::{LoadedClass, Sandbox};
pub use natives::{NativeFn, NativeRegistry};
pub use value::{Obj, ObjRef, Payload, Value};
