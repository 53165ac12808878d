//! Interpreter error taxonomy.

use thiserror::Error;

use crate::value::ObjRef;

pub type Result<T> = std::result::Result<T, VmError>;

fn thrown_class(obj: &ObjRef) -> String {
    obj.borrow().class.clone()
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    ClassFile(#[from] jweave_classfile::ClassFileError),

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("method not found: {owner}.{name}{descriptor}")]
    MethodNotFound {
        owner: String,
        name: String,
        descriptor: String,
    },

    #[error("no native bound for {owner}.{name}{descriptor}")]
    NativeMissing {
        owner: String,
        name: String,
        descriptor: String,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("operand type mismatch at {0}")]
    TypeMismatch(&'static str),

    #[error("call depth limit exceeded")]
    DepthLimit,

    #[error("invalid bundle: {0}")]
    Bundle(String),

    /// An exception object that escaped the outermost frame. Carries the
    /// object itself so callers can assert on identity.
    #[error("uncaught exception: {}", thrown_class(.0))]
    Thrown(ObjRef),
}
