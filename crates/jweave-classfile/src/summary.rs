//! Shallow class parse: names, flags, supertypes, and method shapes only.
//!
//! Hierarchy resolution touches many classes it will never rewrite, so this
//! skips every attribute payload instead of materializing them.

use crate::error::{ClassFileError, Result};
use crate::pool::ConstantPool;
use crate::reader::Reader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodShape {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub access_flags: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub methods: Vec<MethodShape>,
}

fn skip_attributes(r: &mut Reader<'_>) -> Result<()> {
    let count = r.read_u2()?;
    for _ in 0..count {
        r.skip(2)?;
        let len = r.read_u4()? as usize;
        r.skip(len)?;
    }
    Ok(())
}

impl ClassSummary {
    pub fn parse(data: &[u8]) -> Result<ClassSummary> {
        let mut r = Reader::new(data);
        let magic = r.read_u4()?;
        if magic != 0xCAFE_BABE {
            return Err(ClassFileError::BadMagic(magic));
        }
        r.skip(4)?; // versions
        let pool = ConstantPool::parse(&mut r)?;
        let access_flags = r.read_u2()?;
        let name = pool.class_name(r.read_u2()?)?.to_string();
        let super_index = r.read_u2()?;
        let super_name = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?.to_string())
        };

        let iface_count = r.read_u2()?;
        let mut interfaces = Vec::with_capacity(iface_count as usize);
        for _ in 0..iface_count {
            interfaces.push(pool.class_name(r.read_u2()?)?.to_string());
        }

        let field_count = r.read_u2()?;
        for _ in 0..field_count {
            r.skip(6)?; // flags, name, descriptor
            skip_attributes(&mut r)?;
        }

        let method_count = r.read_u2()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let access_flags = r.read_u2()?;
            let name = pool.utf8(r.read_u2()?)?.to_string();
            let descriptor = pool.utf8(r.read_u2()?)?.to_string();
            skip_attributes(&mut r)?;
            methods.push(MethodShape {
                access_flags,
                name,
                descriptor,
            });
        }

        Ok(ClassSummary {
            access_flags,
            name,
            super_name,
            interfaces,
            methods,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & crate::flags::ACC_INTERFACE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassFile, MethodBody, MethodInfo};
    use crate::code::{CodeBody, Insn};
    use crate::flags;
    use crate::opcodes as op;

    #[test]
    fn test_summary_sees_shapes_without_payloads() {
        let mut class = ClassFile::new("demo/Shape", "demo/Base", 52);
        class.interfaces.push("demo/Iface".to_string());
        let mut code = CodeBody::new(1, 2);
        code.instructions.push(Insn::Op(op::RETURN));
        class.methods.push(MethodInfo {
            access_flags: flags::ACC_PUBLIC,
            name: "poke".to_string(),
            descriptor: "(I)V".to_string(),
            body: Some(MethodBody::Decoded(code)),
            attributes: Vec::new(),
        });
        let bytes = class.emit().unwrap();

        let summary = ClassSummary::parse(&bytes).unwrap();
        assert_eq!(summary.name, "demo/Shape");
        assert_eq!(summary.super_name.as_deref(), Some("demo/Base"));
        assert_eq!(summary.interfaces, vec!["demo/Iface".to_string()]);
        assert_eq!(summary.methods.len(), 1);
        assert_eq!(summary.methods[0].name, "poke");
        assert_eq!(summary.methods[0].descriptor, "(I)V");
        assert!(!summary.is_interface());
    }
}
