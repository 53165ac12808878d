//! Fluent construction of small classes, mostly for fixtures and
//! synthesized helper types.

use crate::class::{ClassFile, FieldInfo, MethodBody, MethodInfo};
use crate::code::{CodeBody, Insn};
use crate::error::Result;
use crate::flags;
use crate::opcodes as op;

pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    /// Public class extending `java/lang/Object`, class-file version 52.
    pub fn new(name: &str) -> Self {
        Self {
            class: ClassFile::new(name, "java/lang/Object", 52),
        }
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.class.access_flags = flags;
        self
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.class.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.class.interfaces.push(interface.to_string());
        self
    }

    pub fn field(mut self, access_flags: u16, name: &str, descriptor: &str) -> Self {
        self.class.fields.push(FieldInfo {
            access_flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            attributes: Vec::new(),
        });
        self
    }

    pub fn method(mut self, access_flags: u16, name: &str, descriptor: &str, code: CodeBody) -> Self {
        self.class.methods.push(MethodInfo {
            access_flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            body: Some(MethodBody::Decoded(code)),
            attributes: Vec::new(),
        });
        self
    }

    /// Abstract or native method: a shape without a body.
    pub fn declared_method(mut self, access_flags: u16, name: &str, descriptor: &str) -> Self {
        self.class.methods.push(MethodInfo {
            access_flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            body: None,
            attributes: Vec::new(),
        });
        self
    }

    /// `public <init>()V` delegating to the current superclass.
    pub fn default_ctor(self) -> Self {
        let super_name = self
            .class
            .super_name
            .clone()
            .unwrap_or_else(|| "java/lang/Object".to_string());
        let mut code = CodeBody::new(1, 1);
        code.instructions.push(Insn::Var {
            opcode: op::ALOAD,
            index: 0,
        });
        code.instructions.push(Insn::Invoke {
            opcode: op::INVOKESPECIAL,
            owner: super_name,
            name: "<init>".to_string(),
            descriptor: "()V".to_string(),
            interface: false,
        });
        code.instructions.push(Insn::Op(op::RETURN));
        self.method(flags::ACC_PUBLIC, "<init>", "()V", code)
    }

    pub fn finish(self) -> ClassFile {
        self.class
    }

    pub fn bytes(self) -> Result<Vec<u8>> {
        self.class.emit()
    }
}
