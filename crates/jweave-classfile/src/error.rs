//! Error taxonomy for class-file parsing and emission.
//!
//! Malformed input must never panic: arbitrary application classes flow
//! through the weaver, and a bad byte stream has to surface as a typed
//! error the caller can downgrade to a pass-through.

use thiserror::Error;

use crate::code::Label;

/// Errors raised while reading or writing class-file structures.
#[derive(Debug, Error)]
pub enum ClassFileError {
    /// Input ended before a structure was complete.
    #[error("unexpected end of class file at offset {0}")]
    UnexpectedEof(usize),

    /// The 0xCAFEBABE magic was missing.
    #[error("bad class file magic {0:#010x}")]
    BadMagic(u32),

    /// A constant pool entry used a tag we do not recognize.
    #[error("unknown constant pool tag {0}")]
    BadConstantTag(u8),

    /// A constant pool index was out of range or referenced the wrong kind
    /// of entry.
    #[error("invalid constant pool index {0}")]
    BadPoolIndex(u16),

    /// The constant pool grew past the u16 index space during emission.
    #[error("constant pool exceeds 65535 entries")]
    PoolOverflow,

    /// An opcode outside the standard table was encountered.
    #[error("unknown opcode {opcode:#04x} at code offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u32 },

    /// A branch or exception-table entry pointed between instructions.
    #[error("branch target {0} is not an instruction boundary")]
    BadBranchTarget(u32),

    /// A conditional branch could not be encoded in a 16-bit offset.
    /// Only `goto` is widened automatically.
    #[error("conditional branch to {0:?} exceeds the 16-bit offset range")]
    BranchOutOfRange(Label),

    /// A label referenced during emission was never placed in the body.
    #[error("unplaced label {0:?}")]
    UnboundLabel(Label),

    /// A method body grew past the 65535-byte code limit.
    #[error("method body exceeds 65535 bytes after rewrite")]
    CodeTooLarge,

    /// A field or method descriptor did not follow the grammar.
    #[error("malformed descriptor `{0}`")]
    BadDescriptor(String),

    /// Structure-level inconsistency not covered by a more specific variant.
    #[error("malformed class file: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ClassFileError>;
